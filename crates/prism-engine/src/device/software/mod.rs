//! CPU reference implementation of [`GpuDevice`].
//!
//! Deterministic and headless: the vertex stage runs on the CPU and every draw
//! is filled immediately by `vello_cpu` into premultiplied RGBA8 surfaces. It
//! also simulates context loss so recovery paths can be exercised without a GPU.

mod raster;

use std::any::Any;
use std::collections::HashMap;

use crate::coords::Viewport;
use crate::device::{
    BufferKind, BufferUsage, ClipVertex, DrawCall, GpuDevice, GpuHandle, ProgramDesc, TextureDesc,
    VertexInputs,
};
use crate::error::{RenderError, RenderResult};
use crate::paint::Color;

use raster::{Rasterizer, Surface, Texture};

/// Operation counters, reset with [`SoftwareDevice::reset_counters`].
#[derive(Debug, Copy, Clone, Default, PartialEq, Eq)]
pub struct DeviceCounters {
    pub draw_calls: u64,
    pub triangles: u64,
    /// Pixels whose value a draw changed.
    pub pixels_written: u64,
    pub texture_uploads: u64,
    pub buffer_writes: u64,
    pub programs_created: u64,
    pub clears: u64,
}

struct Framebuffer {
    color: Surface,
    stencil: Option<Vec<u8>>,
}

impl Framebuffer {
    fn new(width: u32, height: u32, stencil: bool) -> Self {
        Self {
            color: Surface::new(width, height),
            stencil: stencil.then(|| vec![0; width as usize * height as usize]),
        }
    }

    fn resize(&mut self, width: u32, height: u32) {
        self.color.resize(width, height);
        if let Some(stencil) = self.stencil.as_mut() {
            *stencil = vec![0; width as usize * height as usize];
        }
    }
}

struct Buffer {
    kind: BufferKind,
    data: Vec<u8>,
}

/// Software rasterizing device.
pub struct SoftwareDevice {
    default_framebuffer: Framebuffer,
    textures: HashMap<GpuHandle, Texture>,
    framebuffers: HashMap<GpuHandle, Framebuffer>,
    buffers: HashMap<GpuHandle, Buffer>,
    programs: HashMap<GpuHandle, &'static ProgramDesc>,

    next_id: u32,
    bound: Option<GpuHandle>,
    viewport: Viewport,
    scissor: Option<Viewport>,
    raster: Rasterizer,

    lost: bool,
    counters: DeviceCounters,
}

impl SoftwareDevice {
    /// Creates a device whose default framebuffer is `width x height` physical pixels.
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            default_framebuffer: Framebuffer::new(width, height, true),
            textures: HashMap::new(),
            framebuffers: HashMap::new(),
            buffers: HashMap::new(),
            programs: HashMap::new(),
            next_id: 1,
            bound: None,
            viewport: Viewport::from_size(width, height),
            scissor: None,
            raster: Rasterizer::default(),
            lost: false,
            counters: DeviceCounters::default(),
        }
    }

    /// Simulates a context loss: every resource is dropped and calls start failing.
    pub fn lose_context(&mut self) {
        log::debug!("SoftwareDevice: simulating context loss");
        self.lost = true;
        self.textures.clear();
        self.framebuffers.clear();
        self.buffers.clear();
        self.programs.clear();
        self.bound = None;
        self.scissor = None;
        let (w, h) = self.default_framebuffer_size();
        self.default_framebuffer = Framebuffer::new(w, h, true);
    }

    pub fn counters(&self) -> DeviceCounters {
        self.counters
    }

    pub fn reset_counters(&mut self) {
        self.counters = DeviceCounters::default();
    }

    /// Pixel of the default framebuffer, premultiplied RGBA8.
    pub fn pixel(&self, x: u32, y: u32) -> Option<[u8; 4]> {
        self.default_framebuffer.color.pixel(x, y)
    }

    /// Pixel of an offscreen framebuffer.
    pub fn framebuffer_pixel(&self, framebuffer: GpuHandle, x: u32, y: u32) -> Option<[u8; 4]> {
        self.framebuffers.get(&framebuffer)?.color.pixel(x, y)
    }

    pub fn live_textures(&self) -> usize {
        self.textures.len()
    }

    pub fn live_buffers(&self) -> usize {
        self.buffers.len()
    }

    pub fn has_texture(&self, texture: GpuHandle) -> bool {
        self.textures.contains_key(&texture)
    }

    pub fn bound_framebuffer(&self) -> Option<GpuHandle> {
        self.bound
    }

    pub fn viewport(&self) -> Viewport {
        self.viewport
    }

    pub fn scissor(&self) -> Option<Viewport> {
        self.scissor
    }

    fn ensure_live(&self) -> RenderResult<()> {
        if self.lost {
            return Err(RenderError::ContextLost);
        }
        Ok(())
    }

    fn mint(&mut self) -> GpuHandle {
        let handle = GpuHandle::from_raw(self.next_id);
        self.next_id += 1;
        handle
    }

    fn bound_framebuffer_mut(&mut self) -> RenderResult<&mut Framebuffer> {
        match self.bound {
            None => Ok(&mut self.default_framebuffer),
            Some(h) => self
                .framebuffers
                .get_mut(&h)
                .ok_or(RenderError::InvalidHandle { kind: "framebuffer", handle: h }),
        }
    }

    /// Runs the vertex stage for `call`, one output per index.
    fn shade_vertices(&self, call: &DrawCall<'_>, program: &ProgramDesc) -> RenderResult<Vec<ClipVertex>> {
        let index_buffer = self
            .buffers
            .get(&call.index_buffer)
            .filter(|b| b.kind == BufferKind::Index)
            .ok_or(RenderError::InvalidHandle { kind: "index buffer", handle: call.index_buffer })?;

        let count = call.index_count as usize;
        if count * 2 > index_buffer.data.len() {
            return Err(RenderError::InvalidResource(format!(
                "draw of {count} indices overruns index buffer of {} bytes",
                index_buffer.data.len()
            )));
        }

        let mut bindings = Vec::with_capacity(call.vertex_buffers.len());
        for binding in call.vertex_buffers {
            let buffer = self
                .buffers
                .get(&binding.buffer)
                .filter(|b| b.kind == BufferKind::Vertex)
                .ok_or(RenderError::InvalidHandle { kind: "vertex buffer", handle: binding.buffer })?;
            bindings.push((binding, buffer.data.as_slice()));
        }

        let mut out = Vec::with_capacity(count);
        let mut components = [0.0f32; 4];

        for chunk in index_buffer.data[..count * 2].chunks_exact(2) {
            let index = u16::from_ne_bytes([chunk[0], chunk[1]]) as usize;
            let mut inputs = VertexInputs::default();

            for (binding, data) in &bindings {
                let base = index * binding.stride as usize;
                for attr in binding.attributes {
                    let n = (attr.components as usize).min(4);
                    for (k, slot) in components.iter_mut().take(n).enumerate() {
                        let at = base + attr.offset as usize + k * 4;
                        let bytes = data.get(at..at + 4).ok_or_else(|| {
                            RenderError::InvalidResource(format!(
                                "vertex {index} reads past the end of buffer {}",
                                binding.buffer.raw()
                            ))
                        })?;
                        *slot = f32::from_ne_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]);
                    }
                    inputs.set(attr.location, &components[..n]);
                }
            }

            out.push((program.cpu_vertex)(&inputs, call.uniforms));
        }

        Ok(out)
    }
}

impl GpuDevice for SoftwareDevice {
    fn backend_name(&self) -> &'static str {
        "software"
    }

    fn is_lost(&self) -> bool {
        self.lost
    }

    fn reacquire(&mut self) -> RenderResult<()> {
        if self.lost {
            log::debug!("SoftwareDevice: context reacquired");
        }
        self.lost = false;
        self.bound = None;
        self.scissor = None;
        let (w, h) = self.default_framebuffer_size();
        self.viewport = Viewport::from_size(w, h);
        Ok(())
    }

    fn default_framebuffer_size(&self) -> (u32, u32) {
        (self.default_framebuffer.color.width, self.default_framebuffer.color.height)
    }

    fn resize_default_framebuffer(&mut self, width: u32, height: u32) -> RenderResult<()> {
        self.ensure_live()?;
        self.default_framebuffer.resize(width, height);
        Ok(())
    }

    fn create_texture(&mut self, desc: &TextureDesc<'_>) -> RenderResult<GpuHandle> {
        self.ensure_live()?;
        let expected = desc.width as usize * desc.height as usize * 4;
        if desc.pixels.len() != expected {
            return Err(RenderError::InvalidResource(format!(
                "texture data is {} bytes, expected {expected}",
                desc.pixels.len()
            )));
        }
        let texture = Texture::new(desc.width, desc.height, desc.pixels.to_vec(), desc.scale_mode)?;
        let handle = self.mint();
        self.textures.insert(handle, texture);
        self.counters.texture_uploads += 1;
        Ok(handle)
    }

    fn delete_texture(&mut self, texture: GpuHandle) -> RenderResult<()> {
        if self.lost {
            return Ok(());
        }
        self.textures
            .remove(&texture)
            .map(drop)
            .ok_or(RenderError::InvalidHandle { kind: "texture", handle: texture })
    }

    fn create_framebuffer(&mut self, width: u32, height: u32, stencil: bool) -> RenderResult<GpuHandle> {
        self.ensure_live()?;
        let handle = self.mint();
        self.framebuffers.insert(handle, Framebuffer::new(width, height, stencil));
        Ok(handle)
    }

    fn resize_framebuffer(&mut self, framebuffer: GpuHandle, width: u32, height: u32) -> RenderResult<()> {
        self.ensure_live()?;
        let fb = self
            .framebuffers
            .get_mut(&framebuffer)
            .ok_or(RenderError::InvalidHandle { kind: "framebuffer", handle: framebuffer })?;
        fb.resize(width, height);
        Ok(())
    }

    fn delete_framebuffer(&mut self, framebuffer: GpuHandle) -> RenderResult<()> {
        if self.lost {
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

    fn clear(&mut self, color: Color, stencil: bool) -> RenderResult<()> {
        self.ensure_live()?;
        let scissor = self.scissor;
        let rgba = color.to_rgba8();
        let fb = self.bound_framebuffer_mut()?;
        let region = scissor.unwrap_or(fb.color.bounds());
        fb.color.fill(region, rgba);
        if stencil {
            if let Some(s) = fb.stencil.as_mut() {
                s.fill(0);
            }
        }
        self.counters.clears += 1;
        Ok(())
    }

    fn create_program(&mut self, desc: &'static ProgramDesc) -> RenderResult<GpuHandle> {
        self.ensure_live()?;
        let handle = self.mint();
        self.programs.insert(handle, desc);
        self.counters.programs_created += 1;
        log::trace!("SoftwareDevice: program `{}` -> {}", desc.label, handle.raw());
        Ok(handle)
    }

    fn delete_program(&mut self, program: GpuHandle) -> RenderResult<()> {
        if self.lost {
            return Ok(());
        }
        self.programs
            .remove(&program)
            .map(drop)
            .ok_or(RenderError::InvalidHandle { kind: "program", handle: program })
    }

    fn create_buffer(&mut self, kind: BufferKind, _usage: BufferUsage, size: usize) -> RenderResult<GpuHandle> {
        self.ensure_live()?;
        let handle = self.mint();
        self.buffers.insert(handle, Buffer { kind, data: vec![0; size] });
        Ok(handle)
    }

    fn write_buffer(&mut self, buffer: GpuHandle, offset: usize, data: &[u8]) -> RenderResult<()> {
        self.ensure_live()?;
        let b = self
            .buffers
            .get_mut(&buffer)
            .ok_or(RenderError::InvalidHandle { kind: "buffer", handle: buffer })?;
        let end = offset + data.len();
        if end > b.data.len() {
            return Err(RenderError::InvalidResource(format!(
                "write of {} bytes at {offset} overruns buffer of {} bytes",
                data.len(),
                b.data.len()
            )));
        }
        b.data[offset..end].copy_from_slice(data);
        self.counters.buffer_writes += 1;
        Ok(())
    }

    fn delete_buffer(&mut self, buffer: GpuHandle) -> RenderResult<()> {
        if self.lost {
            return Ok(());
        }
        self.buffers
            .remove(&buffer)
            .map(drop)
            .ok_or(RenderError::InvalidHandle { kind: "buffer", handle: buffer })
    }

    fn draw(&mut self, call: &DrawCall<'_>) -> RenderResult<()> {
        self.ensure_live()?;
        let program = *self
            .programs
            .get(&call.program)
            .ok_or(RenderError::InvalidHandle { kind: "program", handle: call.program })?;

        let vertices = self.shade_vertices(call, program)?;

        let Self { textures, framebuffers, default_framebuffer, raster, bound, viewport, scissor, .. } = self;
        let texture = match call.textures.first() {
            Some(h) => Some(textures.get(h).ok_or(RenderError::InvalidHandle { kind: "texture", handle: *h })?),
            None => None,
        };
        let fb = match *bound {
            None => default_framebuffer,
            Some(h) => framebuffers
                .get_mut(&h)
                .ok_or(RenderError::InvalidHandle { kind: "framebuffer", handle: h })?,
        };

        let mut clip = viewport.clamp_to(fb.color.bounds());
        if let Some(scissor) = *scissor {
            clip = clip.clamp_to(scissor);
        }

        let fill = raster.draw(&mut fb.color, *viewport, clip, &vertices, texture, call.blend_mode)?;

        self.counters.draw_calls += 1;
        self.counters.triangles += fill.triangles;
        self.counters.pixels_written += fill.pixels_changed;
        Ok(())
    }

    fn read_pixels(&mut self, framebuffer: Option<GpuHandle>, region: Viewport) -> RenderResult<Vec<u8>> {
        self.ensure_live()?;
        let surface = match framebuffer {
            None => &self.default_framebuffer.color,
            Some(h) => &self
                .framebuffers
                .get(&h)
                .ok_or(RenderError::InvalidHandle { kind: "framebuffer", handle: h })?
                .color,
        };
        let clamped = region.clamp_to(surface.bounds());
        if clamped != region {
            return Err(RenderError::InvalidResource(format!(
                "read region {region:?} exceeds framebuffer {}x{}",
                surface.width, surface.height
            )));
        }
        Ok(surface.read(region))
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::device::{AttributeDesc, AttributePointer, UniformSet, VertexBinding};
    use crate::paint::BlendMode;

    fn passthrough(input: &VertexInputs, _: &UniformSet) -> ClipVertex {
        ClipVertex { position: input.vec2(0), uv: [0.0, 0.0], color: input.vec4(1) }
    }

    static FLAT: ProgramDesc = ProgramDesc {
        label: "flat",
        wgsl: "",
        attributes: &[
            AttributeDesc { name: "aPosition", location: 0, components: 2 },
            AttributeDesc { name: "aColor", location: 1, components: 4 },
        ],
        uniforms: &[],
        samplers: &[],
        cpu_vertex: passthrough,
    };

    fn upload_quad(dev: &mut SoftwareDevice, color: [f32; 4]) -> (GpuHandle, GpuHandle) {
        let mut verts: Vec<f32> = Vec::new();
        for (x, y) in [(-1.0, 1.0), (1.0, 1.0), (1.0, -1.0), (-1.0, -1.0)] {
            verts.extend_from_slice(&[x, y]);
            verts.extend_from_slice(&color);
        }
        let indices: [u16; 6] = [0, 1, 2, 0, 2, 3];

        let vb = dev.create_buffer(BufferKind::Vertex, BufferUsage::Static, verts.len() * 4).unwrap();
        dev.write_buffer(vb, 0, bytemuck::cast_slice(&verts)).unwrap();
        let ib = dev.create_buffer(BufferKind::Index, BufferUsage::Static, 12).unwrap();
        dev.write_buffer(ib, 0, bytemuck::cast_slice(&indices)).unwrap();
        (vb, ib)
    }

    fn draw_quad(dev: &mut SoftwareDevice, vb: GpuHandle, ib: GpuHandle) -> RenderResult<()> {
        let program = dev.create_program(&FLAT)?;
        let uniforms = UniformSet::new();
        let attrs = [
            AttributePointer { location: 0, components: 2, offset: 0 },
            AttributePointer { location: 1, components: 4, offset: 8 },
        ];
        let bindings = [VertexBinding { buffer: vb, stride: 24, attributes: &attrs }];
        dev.draw(&DrawCall {
            program,
            uniforms: &uniforms,
            textures: &[],
            vertex_buffers: &bindings,
            index_buffer: ib,
            index_count: 6,
            blend_mode: BlendMode::Normal,
        })
    }

    #[test]
    fn clear_then_draw_fills_viewport() {
        let mut dev = SoftwareDevice::new(4, 4);
        dev.clear(Color::from_hex(0x0000ff, 1.0), true).unwrap();
        let (vb, ib) = upload_quad(&mut dev, [0.0, 1.0, 0.0, 1.0]);
        dev.set_viewport(Viewport::new(0, 0, 2, 2)).unwrap();
        draw_quad(&mut dev, vb, ib).unwrap();

        assert_eq!(dev.pixel(0, 0), Some([0, 255, 0, 255]));
        assert_eq!(dev.pixel(1, 1), Some([0, 255, 0, 255]));
        assert_eq!(dev.pixel(2, 2), Some([0, 0, 255, 255]));
        assert_eq!(dev.counters().draw_calls, 1);
        assert_eq!(dev.counters().triangles, 2);
    }

    #[test]
    fn scissored_clear_only_touches_box() {
        let mut dev = SoftwareDevice::new(4, 4);
        dev.set_scissor(Some(Viewport::new(1, 1, 1, 1))).unwrap();
        dev.clear(Color::white(), false).unwrap();
        assert_eq!(dev.pixel(1, 1), Some([255; 4]));
        assert_eq!(dev.pixel(0, 0), Some([0; 4]));
    }

    #[test]
    fn offscreen_framebuffer_is_isolated() {
        let mut dev = SoftwareDevice::new(4, 4);
        let fb = dev.create_framebuffer(2, 2, false).unwrap();
        dev.bind_framebuffer(Some(fb)).unwrap();
        dev.clear(Color::white(), false).unwrap();
        assert_eq!(dev.framebuffer_pixel(fb, 1, 1), Some([255; 4]));
        assert_eq!(dev.pixel(1, 1), Some([0; 4]));
        assert_eq!(dev.read_pixels(Some(fb), Viewport::from_size(2, 2)).unwrap(), vec![255; 16]);
    }

    #[test]
    fn lost_context_rejects_calls_and_drops_resources() {
        let mut dev = SoftwareDevice::new(4, 4);
        let (vb, ib) = upload_quad(&mut dev, [1.0; 4]);
        dev.lose_context();

        assert_eq!(draw_quad(&mut dev, vb, ib), Err(RenderError::ContextLost));
        assert_eq!(dev.delete_buffer(vb), Ok(()));

        dev.reacquire().unwrap();
        assert!(matches!(
            dev.write_buffer(vb, 0, &[0; 4]),
            Err(RenderError::InvalidHandle { .. })
        ));
    }

    #[test]
    fn handles_are_never_reused() {
        let mut dev = SoftwareDevice::new(1, 1);
        let a = dev.create_buffer(BufferKind::Vertex, BufferUsage::Dynamic, 4).unwrap();
        dev.delete_buffer(a).unwrap();
        let b = dev.create_buffer(BufferKind::Vertex, BufferUsage::Dynamic, 4).unwrap();
        assert_ne!(a, b);
    }

    #[test]
    fn overrunning_index_count_is_rejected() {
        let mut dev = SoftwareDevice::new(2, 2);
        let (vb, _) = upload_quad(&mut dev, [1.0; 4]);
        let ib = dev.create_buffer(BufferKind::Index, BufferUsage::Static, 6).unwrap();
        assert!(matches!(draw_quad(&mut dev, vb, ib), Err(RenderError::InvalidResource(_))));
    }
}
