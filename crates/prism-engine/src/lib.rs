//! Prism engine: a 2D scene renderer over a small graphics-device abstraction.
//!
//! The [`render::Renderer`] owns a [`device::GpuDevice`] (wgpu or the CPU
//! reference device), binds render targets, dispatches scene objects to
//! pluggable object renderers and survives context loss by tagging every GPU
//! handle with a context generation.

pub mod coords;
pub mod device;
pub mod error;
pub mod logging;
pub mod paint;
pub mod render;
pub mod scene;
pub mod texture;

pub use error::{RenderError, RenderResult};
