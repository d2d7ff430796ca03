//! wgpu implementation of [`GpuDevice`](crate::device::GpuDevice).
//!
//! This module is responsible for:
//! - creating the wgpu Instance/Adapter/Device/Queue without a window
//! - owning an offscreen default framebuffer the host can present or read back
//! - compiling programs into pipelines keyed by vertex layout and blend mode

mod context;
mod device;
mod init;
mod pipeline;
mod readback;

pub use context::Gpu;
pub use device::{COLOR_FORMAT, WgpuDevice};
pub use init::GpuInit;
