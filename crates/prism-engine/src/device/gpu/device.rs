use std::any::Any;
use std::collections::HashMap;

use crate::coords::Viewport;
use crate::device::{
    BufferKind, BufferUsage, DrawCall, GpuDevice, GpuHandle, ProgramDesc, ScaleMode, TextureDesc,
};
use crate::error::{RenderError, RenderResult};
use crate::paint::Color;

use super::pipeline::{PipelineKey, Program};
use super::{Gpu, GpuInit, readback};

/// Color format of every texture and framebuffer (premultiplied RGBA8).
pub const COLOR_FORMAT: wgpu::TextureFormat = wgpu::TextureFormat::Rgba8Unorm;

struct SampledTexture {
    _texture: wgpu::Texture,
    view: wgpu::TextureView,
    scale_mode: ScaleMode,
}

struct ColorTarget {
    texture: wgpu::Texture,
    view: wgpu::TextureView,
    width: u32,
    height: u32,
}

impl ColorTarget {
    fn new(device: &wgpu::Device, width: u32, height: u32, label: &'static str) -> Self {
        let texture = device.create_texture(&wgpu::TextureDescriptor {
            label: Some(label),
            size: wgpu::Extent3d { width: width.max(1), height: height.max(1), depth_or_array_layers: 1 },
            mip_level_count: 1,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format: COLOR_FORMAT,
            usage: wgpu::TextureUsages::RENDER_ATTACHMENT
                | wgpu::TextureUsages::TEXTURE_BINDING
                | wgpu::TextureUsages::COPY_SRC,
            view_formats: &[],
        });
        let view = texture.create_view(&wgpu::TextureViewDescriptor::default());
        Self { texture, view, width: width.max(1), height: height.max(1) }
    }

    fn bounds(&self) -> Viewport {
        Viewport::from_size(self.width, self.height)
    }
}

struct Buffer {
    buffer: wgpu::Buffer,
    size: u64,
    kind: BufferKind,
}

struct Samplers {
    linear: wgpu::Sampler,
    nearest: wgpu::Sampler,
}

impl Samplers {
    fn new(device: &wgpu::Device) -> Self {
        let make = |label, filter| {
            device.create_sampler(&wgpu::SamplerDescriptor {
                label: Some(label),
                address_mode_u: wgpu::AddressMode::ClampToEdge,
                address_mode_v: wgpu::AddressMode::ClampToEdge,
                address_mode_w: wgpu::AddressMode::ClampToEdge,
                mag_filter: filter,
                min_filter: filter,
                mipmap_filter: wgpu::MipmapFilterMode::Nearest,
                ..Default::default()
            })
        };
        Self {
            linear: make("prism linear sampler", wgpu::FilterMode::Linear),
            nearest: make("prism nearest sampler", wgpu::FilterMode::Nearest),
        }
    }

    fn get(&self, mode: ScaleMode) -> &wgpu::Sampler {
        match mode {
            ScaleMode::Linear => &self.linear,
            ScaleMode::Nearest => &self.nearest,
        }
    }
}

/// wgpu-backed device rendering into offscreen textures.
///
/// Each draw and clear is recorded into its own encoder and submitted right
/// away, so uniform writes stay ordered with the draws that read them.
/// Stencil attachments are not allocated by this backend.
pub struct WgpuDevice {
    gpu: Gpu,
    default_target: ColorTarget,
    textures: HashMap<GpuHandle, SampledTexture>,
    framebuffers: HashMap<GpuHandle, ColorTarget>,
    buffers: HashMap<GpuHandle, Buffer>,
    programs: HashMap<GpuHandle, Program>,
    samplers: Samplers,

    next_id: u32,
    bound: Option<GpuHandle>,
    viewport: Viewport,
    scissor: Option<Viewport>,
}

impl WgpuDevice {
    pub fn new(gpu: Gpu, width: u32, height: u32) -> Self {
        let default_target = ColorTarget::new(gpu.device(), width, height, "prism default framebuffer");
        let samplers = Samplers::new(gpu.device());
        Self {
            gpu,
            default_target,
            textures: HashMap::new(),
            framebuffers: HashMap::new(),
            buffers: HashMap::new(),
            programs: HashMap::new(),
            samplers,
            next_id: 1,
            bound: None,
            viewport: Viewport::from_size(width, height),
            scissor: None,
        }
    }

    /// Creates an adapter + device and wraps it, blocking on wgpu's async requests.
    pub fn new_headless(width: u32, height: u32, init: GpuInit) -> RenderResult<Self> {
        let gpu = pollster::block_on(Gpu::new_headless(init))
            .map_err(|e| RenderError::ContextCreation(format!("{e:#}")))?;
        Ok(Self::new(gpu, width, height))
    }

    pub fn gpu(&self) -> &Gpu {
        &self.gpu
    }

    /// The texture backing the default framebuffer (for presentation or copies).
    pub fn default_framebuffer_texture(&self) -> &wgpu::Texture {
        &self.default_target.texture
    }

    /// Destroys the underlying device, as a driver reset would.
    pub fn lose_context(&mut self) {
        self.gpu.destroy_device();
    }

    fn ensure_live(&self) -> RenderResult<()> {
        if self.gpu.is_lost() {
            return Err(RenderError::ContextLost);
        }
        Ok(())
    }

    fn mint(&mut self) -> GpuHandle {
        let handle = GpuHandle::from_raw(self.next_id);
        self.next_id += 1;
        handle
    }

    fn bound_target(&self) -> RenderResult<&ColorTarget> {
        match self.bound {
            None => Ok(&self.default_target),
            Some(h) => self
                .framebuffers
                .get(&h)
                .ok_or(RenderError::InvalidHandle { kind: "framebuffer", handle: h }),
        }
    }

    fn submit(&self, encoder: wgpu::CommandEncoder) {
        self.gpu.queue().submit(std::iter::once(encoder.finish()));
    }
}

impl GpuDevice for WgpuDevice {
    fn backend_name(&self) -> &'static str {
        "wgpu"
    }

    fn is_lost(&self) -> bool {
        self.gpu.is_lost()
    }

    fn reacquire(&mut self) -> RenderResult<()> {
        pollster::block_on(self.gpu.recreate_device())
            .map_err(|e| RenderError::ContextCreation(format!("{e:#}")))?;

        self.textures.clear();
        self.framebuffers.clear();
        self.buffers.clear();
        self.programs.clear();

        let device = self.gpu.device();
        self.default_target =
            ColorTarget::new(device, self.default_target.width, self.default_target.height, "prism default framebuffer");
        self.samplers = Samplers::new(device);
        self.bound = None;
        self.scissor = None;
        self.viewport = self.default_target.bounds();
        Ok(())
    }

    fn default_framebuffer_size(&self) -> (u32, u32) {
        (self.default_target.width, self.default_target.height)
    }

    fn resize_default_framebuffer(&mut self, width: u32, height: u32) -> RenderResult<()> {
        self.ensure_live()?;
        self.default_target = ColorTarget::new(self.gpu.device(), width, height, "prism default framebuffer");
        Ok(())
    }

    fn create_texture(&mut self, desc: &TextureDesc<'_>) -> RenderResult<GpuHandle> {
        self.ensure_live()?;
        let expected = desc.width as usize * desc.height as usize * 4;
        if desc.width == 0 || desc.height == 0 || desc.pixels.len() != expected {
            return Err(RenderError::InvalidResource(format!(
                "texture {}x{} with {} bytes of data",
                desc.width,
                desc.height,
                desc.pixels.len()
            )));
        }

        let size = wgpu::Extent3d { width: desc.width, height: desc.height, depth_or_array_layers: 1 };
        let texture = self.gpu.device().create_texture(&wgpu::TextureDescriptor {
            label: Some("prism texture"),
            size,
            mip_level_count: 1,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format: COLOR_FORMAT,
            usage: wgpu::TextureUsages::TEXTURE_BINDING | wgpu::TextureUsages::COPY_DST,
            view_formats: &[],
        });

        self.gpu.queue().write_texture(
            wgpu::TexelCopyTextureInfo {
                texture: &texture,
                mip_level: 0,
                origin: wgpu::Origin3d::ZERO,
                aspect: wgpu::TextureAspect::All,
            },
            desc.pixels,
            wgpu::TexelCopyBufferLayout {
                offset: 0,
                bytes_per_row: Some(4 * desc.width),
                rows_per_image: Some(desc.height),
            },
            size,
        );

        let view = texture.create_view(&wgpu::TextureViewDescriptor::default());
        let handle = self.mint();
        self.textures.insert(handle, SampledTexture { _texture: texture, view, scale_mode: desc.scale_mode });
        Ok(handle)
    }

    fn delete_texture(&mut self, texture: GpuHandle) -> RenderResult<()> {
        if self.gpu.is_lost() {
            return Ok(());
        }
        self.textures
            .remove(&texture)
            .map(drop)
            .ok_or(RenderError::InvalidHandle { kind: "texture", handle: texture })
    }

    fn create_framebuffer(&mut self, width: u32, height: u32, stencil: bool) -> RenderResult<GpuHandle> {
        self.ensure_live()?;
        if stencil {
            log::debug!("WgpuDevice: stencil attachments are not allocated; mask stack is tracked only");
        }
        let target = ColorTarget::new(self.gpu.device(), width, height, "prism framebuffer");
        let handle = self.mint();
        self.framebuffers.insert(handle, target);
        Ok(handle)
    }

    fn resize_framebuffer(&mut self, framebuffer: GpuHandle, width: u32, height: u32) -> RenderResult<()> {
        self.ensure_live()?;
        if !self.framebuffers.contains_key(&framebuffer) {
            return Err(RenderError::InvalidHandle { kind: "framebuffer", handle: framebuffer });
        }
        let target = ColorTarget::new(self.gpu.device(), width, height, "prism framebuffer");
        self.framebuffers.insert(framebuffer, target);
        Ok(())
    }

    fn delete_framebuffer(&mut self, framebuffer: GpuHandle) -> RenderResult<()> {
        if self.gpu.is_lost() {
            return Ok(());
        }
        if self.bound == Some(framebuffer) {
            self.bound = None;
        }
        self.framebuffers
            .remove(&framebuffer)
            .map(drop)
            .ok_or(RenderError::InvalidHandle { kind: "framebuffer", handle: framebuffer })
    }

    fn bind_framebuffer(&mut self, framebuffer: Option<GpuHandle>) -> RenderResult<()> {
        self.ensure_live()?;
        if let Some(h) = framebuffer {
            if !self.framebuffers.contains_key(&h) {
                return Err(RenderError::InvalidHandle { kind: "framebuffer", handle: h });
            }
        }
        self.bound = framebuffer;
        Ok(())
    }

    fn set_viewport(&mut self, viewport: Viewport) -> RenderResult<()> {
        self.ensure_live()?;
        self.viewport = viewport;
        Ok(())
    }

    fn set_scissor(&mut self, scissor: Option<Viewport>) -> RenderResult<()> {
        self.ensure_live()?;
        self.scissor = scissor;
        Ok(())
    }

    fn clear(&mut self, color: Color, _stencil: bool) -> RenderResult<()> {
        self.ensure_live()?;
        let target = self.bound_target()?;
        if self.scissor.is_some_and(|s| s != target.bounds()) {
            log::trace!("WgpuDevice: scissored clear widened to the whole target");
        }

        let mut encoder = self.gpu.device().create_command_encoder(&wgpu::CommandEncoderDescriptor {
            label: Some("prism clear encoder"),
        });
        {
            let _pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
                label: Some("prism clear pass"),
                color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                    view: &target.view,
                    resolve_target: None,
                    ops: wgpu::Operations {
                        load: wgpu::LoadOp::Clear(wgpu::Color {
                            r: color.r as f64,
                            g: color.g as f64,
                            b: color.b as f64,
                            a: color.a as f64,
                        }),
                        store: wgpu::StoreOp::Store,
                    },
                    depth_slice: None,
                })],
                depth_stencil_attachment: None,
                timestamp_writes: None,
                occlusion_query_set: None,
                multiview_mask: None,
            });
        }
        self.submit(encoder);
        Ok(())
    }

    fn create_program(&mut self, desc: &'static ProgramDesc) -> RenderResult<GpuHandle> {
        self.ensure_live()?;
        let program = Program::new(self.gpu.device(), desc);
        let handle = self.mint();
        self.programs.insert(handle, program);
        log::debug!("WgpuDevice: compiled program `{}`", desc.label);
        Ok(handle)
    }

    fn delete_program(&mut self, program: GpuHandle) -> RenderResult<()> {
        if self.gpu.is_lost() {
            return Ok(());
        }
        self.programs
            .remove(&program)
            .map(drop)
            .ok_or(RenderError::InvalidHandle { kind: "program", handle: program })
    }

    fn create_buffer(&mut self, kind: BufferKind, _usage: BufferUsage, size: usize) -> RenderResult<GpuHandle> {
        self.ensure_live()?;
        let size = (size as u64).next_multiple_of(wgpu::COPY_BUFFER_ALIGNMENT).max(wgpu::COPY_BUFFER_ALIGNMENT);
        let usage = match kind {
            BufferKind::Vertex => wgpu::BufferUsages::VERTEX,
            BufferKind::Index => wgpu::BufferUsages::INDEX,
        } | wgpu::BufferUsages::COPY_DST;

        let buffer = self.gpu.device().create_buffer(&wgpu::BufferDescriptor {
            label: Some(match kind {
                BufferKind::Vertex => "prism vbo",
                BufferKind::Index => "prism ibo",
            }),
            size,
            usage,
            mapped_at_creation: false,
        });
        let handle = self.mint();
        self.buffers.insert(handle, Buffer { buffer, size, kind });
        Ok(handle)
    }

    fn write_buffer(&mut self, buffer: GpuHandle, offset: usize, data: &[u8]) -> RenderResult<()> {
        self.ensure_live()?;
        let b = self
            .buffers
            .get(&buffer)
            .ok_or(RenderError::InvalidHandle { kind: "buffer", handle: buffer })?;
        let end = (offset + data.len()) as u64;
        if end > b.size || offset as u64 % wgpu::COPY_BUFFER_ALIGNMENT != 0 || data.len() as u64 % wgpu::COPY_BUFFER_ALIGNMENT != 0 {
            return Err(RenderError::InvalidResource(format!(
                "unaligned or overrunning write of {} bytes at {offset} (buffer is {} bytes)",
                data.len(),
                b.size
            )));
        }
        self.gpu.queue().write_buffer(&b.buffer, offset as u64, data);
        Ok(())
    }

    fn delete_buffer(&mut self, buffer: GpuHandle) -> RenderResult<()> {
        if self.gpu.is_lost() {
            return Ok(());
        }
        self.buffers
            .remove(&buffer)
            .map(drop)
            .ok_or(RenderError::InvalidHandle { kind: "buffer", handle: buffer })
    }

    fn draw(&mut self, call: &DrawCall<'_>) -> RenderResult<()> {
        self.ensure_live()?;

        let target = match self.bound {
            None => &self.default_target,
            Some(h) => self
                .framebuffers
                .get(&h)
                .ok_or(RenderError::InvalidHandle { kind: "framebuffer", handle: h })?,
        };
        let viewport = self.viewport.clamp_to(target.bounds());
        let scissor = self.scissor.map_or(viewport, |s| s.clamp_to(viewport));
        if viewport.is_empty() || scissor.is_empty() || call.index_count == 0 {
            return Ok(());
        }

        let device = self.gpu.device();
        let program = self
            .programs
            .get_mut(&call.program)
            .ok_or(RenderError::InvalidHandle { kind: "program", handle: call.program })?;

        if call.textures.len() != program.desc.samplers.len() {
            return Err(RenderError::InvalidResource(format!(
                "program `{}` samples {} textures, draw bound {}",
                program.desc.label,
                program.desc.samplers.len(),
                call.textures.len()
            )));
        }

        let mut sampled = Vec::with_capacity(call.textures.len());
        for h in call.textures {
            let t = self
                .textures
                .get(h)
                .ok_or(RenderError::InvalidHandle { kind: "texture", handle: *h })?;
            sampled.push((&t.view, self.samplers.get(t.scale_mode)));
        }

        let mut vertex_buffers = Vec::with_capacity(call.vertex_buffers.len());
        for binding in call.vertex_buffers {
            let b = self
                .buffers
                .get(&binding.buffer)
                .filter(|b| b.kind == BufferKind::Vertex)
                .ok_or(RenderError::InvalidHandle { kind: "vertex buffer", handle: binding.buffer })?;
            vertex_buffers.push(&b.buffer);
        }

        let index_buffer = self
            .buffers
            .get(&call.index_buffer)
            .filter(|b| b.kind == BufferKind::Index && u64::from(call.index_count) * 2 <= b.size)
            .ok_or(RenderError::InvalidHandle { kind: "index buffer", handle: call.index_buffer })?;

        program.write_uniforms(self.gpu.queue(), call.uniforms)?;
        let texture_group = program.texture_bind_group(device, &sampled);
        let key = PipelineKey::for_call(call);
        program.ensure_pipeline(device, &key);
        let program = &*program;
        let pipeline = program
            .pipeline(&key)
            .ok_or_else(|| RenderError::Device(format!("pipeline for `{}` missing", program.desc.label)))?;

        let mut encoder = device.create_command_encoder(&wgpu::CommandEncoderDescriptor {
            label: Some("prism draw encoder"),
        });
        {
            let mut rpass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
                label: Some("prism draw pass"),
                color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                    view: &target.view,
                    resolve_target: None,
                    ops: wgpu::Operations {
                        load: wgpu::LoadOp::Load,
                        store: wgpu::StoreOp::Store,
                    },
                    depth_slice: None,
                })],
                depth_stencil_attachment: None,
                timestamp_writes: None,
                occlusion_query_set: None,
                multiview_mask: None,
            });

            rpass.set_viewport(
                viewport.x as f32,
                viewport.y as f32,
                viewport.width as f32,
                viewport.height as f32,
                0.0,
                1.0,
            );
            rpass.set_scissor_rect(scissor.x, scissor.y, scissor.width, scissor.height);
            rpass.set_pipeline(pipeline);
            rpass.set_bind_group(0, &program.uniform_bind_group, &[]);
            rpass.set_bind_group(1, &texture_group, &[]);
            for (slot, buffer) in vertex_buffers.iter().enumerate() {
                rpass.set_vertex_buffer(slot as u32, buffer.slice(..));
            }
            rpass.set_index_buffer(index_buffer.buffer.slice(..), wgpu::IndexFormat::Uint16);
            rpass.draw_indexed(0..call.index_count, 0, 0..1);
        }
        self.gpu.queue().submit(std::iter::once(encoder.finish()));
        Ok(())
    }

    fn read_pixels(&mut self, framebuffer: Option<GpuHandle>, region: Viewport) -> RenderResult<Vec<u8>> {
        self.ensure_live()?;
        let target = match framebuffer {
            None => &self.default_target,
            Some(h) => self
                .framebuffers
                .get(&h)
                .ok_or(RenderError::InvalidHandle { kind: "framebuffer", handle: h })?,
        };
        if region.clamp_to(target.bounds()) != region {
            return Err(RenderError::InvalidResource(format!(
                "read region {region:?} exceeds framebuffer {}x{}",
                target.width, target.height
            )));
        }
        readback::read_texture(self.gpu.device(), self.gpu.queue(), &target.texture, region)
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}
