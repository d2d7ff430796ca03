//! Graphics device abstraction and its backends.
//!
//! This module is responsible for:
//! - the [`GpuDevice`] interface the renderer drives
//! - handles and context generations used to detect stale resources
//! - a CPU reference device ([`SoftwareDevice`]) and a wgpu device ([`WgpuDevice`])

mod api;
mod handle;
pub mod software;
pub mod gpu;

pub use api::{
    AttributeDesc, AttributePointer, BufferKind, BufferUsage, ClipVertex, CpuVertexFn, DrawCall,
    GpuDevice, MAX_VERTEX_ATTRIBUTES, ProgramDesc, ScaleMode, TextureDesc, UniformDesc, UniformKind,
    UniformSet, UniformValue, VertexBinding, VertexInputs,
};
pub use handle::{ContextGeneration, GenerationSlot, GpuHandle, Tagged};
pub use software::{DeviceCounters, SoftwareDevice};
pub use gpu::{Gpu, GpuInit, WgpuDevice};
