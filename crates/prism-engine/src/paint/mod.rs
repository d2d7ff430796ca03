//! Paint model shared between the scene and the renderers.
//!
//! Scope:
//! - color representation (premultiplied alpha)
//! - blend modes and the factors devices apply for them
//!
//! Geometry types remain in `coords`.

pub mod blend;
pub mod color;

pub use blend::{BlendFactor, BlendMode};
pub use color::Color;
