use crate::device::{AttributePointer, BufferKind, BufferUsage, GpuDevice, GpuHandle, VertexBinding};
use crate::error::RenderResult;
use crate::scene::{ParticleProperties, Sprite};

use super::program::ParticleProperty;

/// One interleaved vertex stream plus its CPU staging arena.
#[derive(Debug)]
struct Stream {
    properties: Vec<ParticleProperty>,
    pointers: Vec<AttributePointer>,
    /// Floats per vertex.
    stride: usize,
    data: Vec<f32>,
    buffer: Option<GpuHandle>,
}

impl Stream {
    fn new(
        device: &mut dyn GpuDevice,
        mut properties: Vec<ParticleProperty>,
        usage: BufferUsage,
        size: usize,
    ) -> RenderResult<Self> {
        let mut stride = 0;
        for p in &mut properties {
            p.offset = stride;
            stride += p.components;
        }
        let pointers = properties
            .iter()
            .map(|p| AttributePointer { location: p.location, components: p.components, offset: p.offset * 4 })
            .collect();

        let stride = stride as usize;
        let data = vec![0.0; size * 4 * stride];
        let buffer = if stride > 0 {
            Some(device.create_buffer(BufferKind::Vertex, usage, data.len() * 4)?)
        } else {
            None
        };
        Ok(Self { properties, pointers, stride, data, buffer })
    }

    fn upload(&mut self, device: &mut dyn GpuDevice, sprites: &[Sprite]) -> RenderResult<()> {
        let Some(buffer) = self.buffer else {
            return Ok(());
        };
        for p in &self.properties {
            (p.upload)(sprites, &mut self.data, self.stride, p.offset as usize);
        }
        let used = sprites.len() * 4 * self.stride;
        device.write_buffer(buffer, 0, bytemuck::cast_slice(&self.data[..used]))
    }

    fn binding(&self) -> Option<VertexBinding<'_>> {
        self.buffer.map(|buffer| VertexBinding {
            buffer,
            stride: (self.stride * 4) as u32,
            attributes: &self.pointers,
        })
    }

    fn destroy(&mut self, device: &mut dyn GpuDevice) -> RenderResult<()> {
        match self.buffer.take() {
            Some(b) => device.delete_buffer(b),
            None => Ok(()),
        }
    }
}

/// GPU storage for one `batch_size` chunk of a particle container.
///
/// Attributes are split into a dynamic stream, rewritten every frame, and a
/// static stream, rewritten only when the container asks for it. Both share
/// a quad index buffer.
#[derive(Debug)]
pub struct ParticleBuffer {
    size: usize,
    dynamic: Stream,
    statik: Stream,
    index_buffer: GpuHandle,
}

impl ParticleBuffer {
    pub(crate) fn new(
        device: &mut dyn GpuDevice,
        table: &[ParticleProperty],
        flags: &ParticleProperties,
        size: usize,
    ) -> RenderResult<Self> {
        let (dynamic, statik): (Vec<_>, Vec<_>) = table.iter().copied().partition(|p| p.kind.is_dynamic(flags));

        let indices = create_indices_for_quads(size);
        let index_bytes: &[u8] = bytemuck::cast_slice(&indices);
        let index_buffer = device.create_buffer(BufferKind::Index, BufferUsage::Static, index_bytes.len())?;
        device.write_buffer(index_buffer, 0, index_bytes)?;

        Ok(Self {
            size,
            dynamic: Stream::new(device, dynamic, BufferUsage::Dynamic, size)?,
            statik: Stream::new(device, statik, BufferUsage::Static, size)?,
            index_buffer,
        })
    }

    /// Sprite capacity.
    #[inline]
    pub fn size(&self) -> usize {
        self.size
    }

    #[inline]
    pub fn index_buffer(&self) -> GpuHandle {
        self.index_buffer
    }

    /// Rewrites the dynamic attributes of the first `sprites.len()` quads.
    pub(crate) fn upload_dynamic(&mut self, device: &mut dyn GpuDevice, sprites: &[Sprite]) -> RenderResult<()> {
        self.dynamic.upload(device, &sprites[..sprites.len().min(self.size)])
    }

    /// Rewrites the static attributes of the first `sprites.len()` quads.
    pub(crate) fn upload_static(&mut self, device: &mut dyn GpuDevice, sprites: &[Sprite]) -> RenderResult<()> {
        self.statik.upload(device, &sprites[..sprites.len().min(self.size)])
    }

    pub fn bindings(&self) -> Vec<VertexBinding<'_>> {
        self.dynamic.binding().into_iter().chain(self.statik.binding()).collect()
    }

    /// Deletes the device buffers. Only valid in the generation they were made in.
    pub fn destroy(&mut self, device: &mut dyn GpuDevice) -> RenderResult<()> {
        self.dynamic.destroy(device)?;
        self.statik.destroy(device)?;
        device.delete_buffer(self.index_buffer)
    }
}

/// Two triangles per quad: `[j, j+1, j+2, j, j+2, j+3]` for `j = 4 * quad`.
pub(crate) fn create_indices_for_quads(size: usize) -> Vec<u16> {
    let mut indices = Vec::with_capacity(size * 6);
    for quad in 0..size {
        let j = (quad * 4) as u16;
        indices.extend_from_slice(&[j, j + 1, j + 2, j, j + 2, j + 3]);
    }
    indices
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::device::SoftwareDevice;
    use crate::render::particles::program::property_table;

    #[test]
    fn quad_indices() {
        assert_eq!(create_indices_for_quads(2), vec![0, 1, 2, 0, 2, 3, 4, 5, 6, 4, 6, 7]);
    }

    #[test]
    fn largest_batch_fits_u16_indices() {
        let indices = create_indices_for_quads(16384);
        assert_eq!(indices.len(), 16384 * 6);
        assert_eq!(indices.iter().copied().max(), Some(u16::MAX));
    }

    #[test]
    fn streams_are_laid_out_by_flags() {
        let mut dev = SoftwareDevice::new(1, 1);
        let buf = ParticleBuffer::new(&mut dev, &property_table(), &ParticleProperties::default(), 4).unwrap();
        // position(2) + rotation(1) + alpha(1) dynamic, vertices(2) + uvs(2) static.
        assert_eq!(buf.dynamic.stride, 4);
        assert_eq!(buf.statik.stride, 4);
        let bindings = buf.bindings();
        assert_eq!(bindings.len(), 2);
        assert_eq!(bindings[0].stride, 16);
        assert_eq!(bindings[0].attributes[1].offset, 8);
    }

    #[test]
    fn all_dynamic_has_no_static_stream() {
        let mut dev = SoftwareDevice::new(1, 1);
        let flags = ParticleProperties { vertices: true, position: true, rotation: true, uvs: true, alpha: true };
        let buf = ParticleBuffer::new(&mut dev, &property_table(), &flags, 4).unwrap();
        assert_eq!(buf.bindings().len(), 1);
        assert_eq!(buf.bindings()[0].stride, 32);
    }
}
