//! Renderer core and its managers.
//!
//! Conventions:
//! - world and target coordinates are logical pixels, top-left origin, +Y down
//! - a target's projection maps its source frame to clip space, row 0 on top
//! - every GPU handle is tagged with the context generation it was created in

mod context_event;
mod ctx;
mod extract;
mod object_renderer;
mod options;
pub mod particles;
mod renderer;
mod shader;
mod stats;
mod target;
mod texture_gc;
mod texture_manager;

pub use context_event::{ContextEvent, ContextEventKind};
pub use ctx::{MAX_TEXTURE_UNITS, RenderContext, RenderState};
pub use object_renderer::{ObjectRenderer, PluginHandle, PluginId, RenderObject};
pub use options::RendererOptions;
pub use particles::{ParticleBuffer, ParticleRenderer};
pub use renderer::{RenderTargetId, Renderer, RendererState};
pub use shader::Shader;
pub use stats::FrameStats;
pub use target::{MaskId, MaskStack, RenderTarget};
pub use texture_gc::{GcMode, TextureGarbageCollector, TextureGcConfig};
pub use texture_manager::TextureManager;
