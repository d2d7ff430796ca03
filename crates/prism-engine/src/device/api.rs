use std::any::Any;

use crate::coords::Viewport;
use crate::error::RenderResult;
use crate::paint::{BlendMode, Color};

use super::GpuHandle;

/// Maximum number of vertex attribute locations a program may use.
pub const MAX_VERTEX_ATTRIBUTES: usize = 8;

/// Texture filtering.
#[derive(Debug, Copy, Clone, Default, PartialEq, Eq, Hash)]
pub enum ScaleMode {
    #[default]
    Linear,
    Nearest,
}

/// Parameters for a texture upload.
///
/// `pixels` are premultiplied RGBA8, rows top-first, `width * height * 4` bytes.
#[derive(Debug, Copy, Clone)]
pub struct TextureDesc<'a> {
    pub width: u32,
    pub height: u32,
    pub pixels: &'a [u8],
    pub scale_mode: ScaleMode,
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum BufferKind {
    Vertex,
    Index,
}

/// Upload frequency hint.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum BufferUsage {
    /// Written rarely (static particle attributes, index data).
    Static,
    /// Rewritten every frame.
    Dynamic,
}

// ── programs ──────────────────────────────────────────────────────────────

#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum UniformKind {
    Float,
    Vec4,
    Mat3,
}

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct UniformDesc {
    pub name: &'static str,
    pub kind: UniformKind,
}

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct AttributeDesc {
    pub name: &'static str,
    pub location: u32,
    pub components: u32,
}

/// CPU evaluation of a program's vertex stage, used by the software device.
pub type CpuVertexFn = fn(&VertexInputs, &UniformSet) -> ClipVertex;

/// Description of a shader program.
///
/// GPU backends compile `wgsl` (entry points `vs_main` / `fs_main`, uniform
/// block at group 0 with members declared in `uniforms` order, textures and
/// samplers at group 1). The software device runs `cpu_vertex` and a fixed
/// fragment stage: `texture(uv) * color`.
#[derive(Debug)]
pub struct ProgramDesc {
    pub label: &'static str,
    pub wgsl: &'static str,
    pub attributes: &'static [AttributeDesc],
    pub uniforms: &'static [UniformDesc],
    pub samplers: &'static [&'static str],
    pub cpu_vertex: CpuVertexFn,
}

/// Attribute values gathered for one vertex, indexed by location.
#[derive(Debug, Copy, Clone, Default)]
pub struct VertexInputs {
    values: [[f32; 4]; MAX_VERTEX_ATTRIBUTES],
}

impl VertexInputs {
    pub fn set(&mut self, location: u32, components: &[f32]) {
        if let Some(slot) = self.values.get_mut(location as usize) {
            for (dst, src) in slot.iter_mut().zip(components) {
                *dst = *src;
            }
        }
    }

    #[inline]
    pub fn float(&self, location: u32) -> f32 {
        self.values.get(location as usize).map_or(0.0, |v| v[0])
    }

    #[inline]
    pub fn vec2(&self, location: u32) -> [f32; 2] {
        self.values.get(location as usize).map_or([0.0; 2], |v| [v[0], v[1]])
    }

    #[inline]
    pub fn vec4(&self, location: u32) -> [f32; 4] {
        self.values.get(location as usize).copied().unwrap_or_default()
    }
}

/// Output of the CPU vertex stage: clip-space position plus varyings.
#[derive(Debug, Copy, Clone, Default, PartialEq)]
pub struct ClipVertex {
    pub position: [f32; 2],
    pub uv: [f32; 2],
    /// Premultiplied tint applied to the sampled texel.
    pub color: [f32; 4],
}

#[derive(Debug, Copy, Clone, PartialEq)]
pub enum UniformValue {
    Float(f32),
    Vec4([f32; 4]),
    Mat3([f32; 9]),
}

impl UniformValue {
    pub fn kind(&self) -> UniformKind {
        match self {
            UniformValue::Float(_) => UniformKind::Float,
            UniformValue::Vec4(_) => UniformKind::Vec4,
            UniformValue::Mat3(_) => UniformKind::Mat3,
        }
    }
}

/// Named uniform values for one draw.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct UniformSet {
    values: Vec<(&'static str, UniformValue)>,
}

impl UniformSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&mut self, name: &'static str, value: UniformValue) {
        match self.values.iter_mut().find(|(n, _)| *n == name) {
            Some((_, v)) => *v = value,
            None => self.values.push((name, value)),
        }
    }

    pub fn get(&self, name: &str) -> Option<UniformValue> {
        self.values.iter().find(|(n, _)| *n == name).map(|(_, v)| *v)
    }

    pub fn float(&self, name: &str) -> Option<f32> {
        match self.get(name)? {
            UniformValue::Float(v) => Some(v),
            _ => None,
        }
    }

    pub fn mat3(&self, name: &str) -> Option<[f32; 9]> {
        match self.get(name)? {
            UniformValue::Mat3(m) => Some(m),
            _ => None,
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = (&'static str, UniformValue)> + '_ {
        self.values.iter().copied()
    }
}

// ── draws ─────────────────────────────────────────────────────────────────

/// Where one attribute lives inside an interleaved vertex buffer.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub struct AttributePointer {
    pub location: u32,
    pub components: u32,
    /// Byte offset inside one vertex.
    pub offset: u32,
}

/// An interleaved vertex buffer bound for a draw.
#[derive(Debug, Copy, Clone)]
pub struct VertexBinding<'a> {
    pub buffer: GpuHandle,
    /// Bytes per vertex.
    pub stride: u32,
    pub attributes: &'a [AttributePointer],
}

/// Indexed triangle-list draw with u16 indices.
#[derive(Debug, Copy, Clone)]
pub struct DrawCall<'a> {
    pub program: GpuHandle,
    pub uniforms: &'a UniformSet,
    /// One texture per program sampler, in declaration order.
    pub textures: &'a [GpuHandle],
    pub vertex_buffers: &'a [VertexBinding<'a>],
    pub index_buffer: GpuHandle,
    pub index_count: u32,
    pub blend_mode: BlendMode,
}

// ── device ────────────────────────────────────────────────────────────────

/// Graphics device the renderer drives.
///
/// The model is a small immediate-mode state machine: a bound framebuffer,
/// a viewport and an optional scissor box, plus resources addressed by
/// [`GpuHandle`]. While the context is lost every call except deletes fails
/// with [`RenderError::ContextLost`](crate::RenderError::ContextLost); deletes
/// are no-ops.
pub trait GpuDevice: Any {
    fn backend_name(&self) -> &'static str;

    fn is_lost(&self) -> bool;

    /// Re-acquires the context after a loss. All previously issued handles stay invalid.
    fn reacquire(&mut self) -> RenderResult<()>;

    fn default_framebuffer_size(&self) -> (u32, u32);
    fn resize_default_framebuffer(&mut self, width: u32, height: u32) -> RenderResult<()>;

    fn create_texture(&mut self, desc: &TextureDesc<'_>) -> RenderResult<GpuHandle>;
    fn delete_texture(&mut self, texture: GpuHandle) -> RenderResult<()>;

    fn create_framebuffer(&mut self, width: u32, height: u32, stencil: bool) -> RenderResult<GpuHandle>;
    /// Reallocates storage; contents are undefined afterwards.
    fn resize_framebuffer(&mut self, framebuffer: GpuHandle, width: u32, height: u32) -> RenderResult<()>;
    fn delete_framebuffer(&mut self, framebuffer: GpuHandle) -> RenderResult<()>;
    /// `None` binds the default framebuffer.
    fn bind_framebuffer(&mut self, framebuffer: Option<GpuHandle>) -> RenderResult<()>;

    fn set_viewport(&mut self, viewport: Viewport) -> RenderResult<()>;
    fn set_scissor(&mut self, scissor: Option<Viewport>) -> RenderResult<()>;
    /// Clears the bound framebuffer (restricted to the scissor box when one is set).
    fn clear(&mut self, color: Color, stencil: bool) -> RenderResult<()>;

    fn create_program(&mut self, desc: &'static ProgramDesc) -> RenderResult<GpuHandle>;
    fn delete_program(&mut self, program: GpuHandle) -> RenderResult<()>;

    fn create_buffer(&mut self, kind: BufferKind, usage: BufferUsage, size: usize) -> RenderResult<GpuHandle>;
    fn write_buffer(&mut self, buffer: GpuHandle, offset: usize, data: &[u8]) -> RenderResult<()>;
    fn delete_buffer(&mut self, buffer: GpuHandle) -> RenderResult<()>;

    fn draw(&mut self, call: &DrawCall<'_>) -> RenderResult<()>;

    /// Reads premultiplied RGBA8 rows (top-first) from a framebuffer.
    fn read_pixels(&mut self, framebuffer: Option<GpuHandle>, region: Viewport) -> RenderResult<Vec<u8>>;

    fn as_any(&self) -> &dyn Any;
    fn as_any_mut(&mut self) -> &mut dyn Any;
}
