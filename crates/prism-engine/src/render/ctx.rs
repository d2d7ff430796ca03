use crate::coords::Matrix;
use crate::device::{ContextGeneration, DrawCall, GpuDevice, GpuHandle};
use crate::error::{RenderError, RenderResult};
use crate::paint::BlendMode;
use crate::texture::BaseTexture;

use super::{FrameStats, RenderTarget, Shader, TextureManager};

/// Number of texture units tracked by [`RenderState`].
pub const MAX_TEXTURE_UNITS: usize = 8;

/// Cached device state shared by every plugin in a context generation.
#[derive(Debug, Clone, Default)]
pub struct RenderState {
    pub blend_mode: BlendMode,
    /// Base texture uid bound to each unit.
    pub bound_textures: [Option<u64>; MAX_TEXTURE_UNITS],
    pub current_program: Option<GpuHandle>,
}

impl RenderState {
    pub fn reset(&mut self) {
        *self = Self::default();
    }

    /// Uids that must survive a texture GC sweep.
    pub fn pinned_textures(&self) -> Vec<u64> {
        self.bound_textures.iter().flatten().copied().collect()
    }
}

/// Everything an [`ObjectRenderer`](super::ObjectRenderer) may touch while
/// drawing: the device, the active target, textures and shared state.
pub struct RenderContext<'a> {
    pub(crate) device: &'a mut dyn GpuDevice,
    pub(crate) generation: ContextGeneration,
    pub(crate) target: &'a RenderTarget,
    pub(crate) textures: &'a mut TextureManager,
    pub(crate) gc_count: u64,
    pub(crate) state: &'a mut RenderState,
    pub(crate) stats: &'a mut FrameStats,
}

impl<'a> RenderContext<'a> {
    #[inline]
    pub fn device(&mut self) -> &mut dyn GpuDevice {
        &mut *self.device
    }

    #[inline]
    pub fn generation(&self) -> ContextGeneration {
        self.generation
    }

    /// Projection of the active render target, transform included.
    #[inline]
    pub fn projection(&self) -> Matrix {
        self.target.projection()
    }

    #[inline]
    pub fn target(&self) -> &RenderTarget {
        self.target
    }

    #[inline]
    pub fn blend_mode(&self) -> BlendMode {
        self.state.blend_mode
    }

    pub fn set_blend_mode(&mut self, mode: BlendMode) {
        self.state.blend_mode = mode;
    }

    #[inline]
    pub fn stats_mut(&mut self) -> &mut FrameStats {
        self.stats
    }

    /// Uploads `base` if needed and records it as bound to `unit`.
    pub fn bind_texture(&mut self, base: &BaseTexture, unit: usize) -> RenderResult<GpuHandle> {
        let slot = self.state.bound_textures.get_mut(unit).ok_or_else(|| {
            RenderError::InvalidResource(format!("texture unit {unit} out of range"))
        })?;
        let before = self.textures.upload_count();
        let handle = self.textures.update_texture(&mut *self.device, self.generation, base, self.gc_count)?;
        if self.textures.upload_count() != before {
            self.stats.texture_uploads += 1;
        }
        *slot = Some(base.uid());
        Ok(handle)
    }

    /// Compiles `shader` for this generation if needed and makes it current.
    pub fn bind_shader(&mut self, shader: &mut Shader) -> RenderResult<GpuHandle> {
        let program = shader.program(&mut *self.device, self.generation)?;
        self.state.current_program = Some(program);
        Ok(program)
    }

    pub fn draw(&mut self, call: &DrawCall<'_>) -> RenderResult<()> {
        self.device.draw(call)?;
        self.stats.draw_calls += 1;
        Ok(())
    }
}
