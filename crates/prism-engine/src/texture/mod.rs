//! Texture sources and sub-rectangle views.
//!
//! A [`BaseTexture`] owns pixel data and a process-unique id the renderer keys
//! its GPU cache on. A [`Texture`] is a frame into a base texture plus the
//! original (untrimmed) size and an optional trim rectangle, as produced by
//! atlas packers.

mod base;
mod frame;

pub use base::BaseTexture;
pub use frame::{Texture, TextureUvs};

pub use crate::device::ScaleMode;
