//! Texture readback from GPU to CPU.

use std::sync::mpsc::channel;

use crate::coords::Viewport;
use crate::error::{RenderError, RenderResult};

/// Copies `region` of an RGBA8 texture into a tight, row-major buffer.
///
/// Rows are staged with `bytes_per_row` padded to wgpu's copy alignment and
/// unpadded on the CPU.
pub(super) fn read_texture(
    device: &wgpu::Device,
    queue: &wgpu::Queue,
    texture: &wgpu::Texture,
    region: Viewport,
) -> RenderResult<Vec<u8>> {
    if region.is_empty() {
        return Ok(Vec::new());
    }

    let row_bytes = region.width * 4;
    let padded_bpr = row_bytes.div_ceil(wgpu::COPY_BYTES_PER_ROW_ALIGNMENT) * wgpu::COPY_BYTES_PER_ROW_ALIGNMENT;

    let staging = device.create_buffer(&wgpu::BufferDescriptor {
        label: Some("prism readback"),
        size: u64::from(padded_bpr) * u64::from(region.height),
        usage: wgpu::BufferUsages::COPY_DST | wgpu::BufferUsages::MAP_READ,
        mapped_at_creation: false,
    });

    let mut encoder = device.create_command_encoder(&wgpu::CommandEncoderDescriptor {
        label: Some("prism readback encoder"),
    });
    encoder.copy_texture_to_buffer(
        wgpu::TexelCopyTextureInfo {
            texture,
            mip_level: 0,
            origin: wgpu::Origin3d { x: region.x, y: region.y, z: 0 },
            aspect: wgpu::TextureAspect::All,
        },
        wgpu::TexelCopyBufferInfo {
            buffer: &staging,
            layout: wgpu::TexelCopyBufferLayout {
                offset: 0,
                bytes_per_row: Some(padded_bpr),
                rows_per_image: Some(region.height),
            },
        },
        wgpu::Extent3d {
            width: region.width,
            height: region.height,
            depth_or_array_layers: 1,
        },
    );
    queue.submit(std::iter::once(encoder.finish()));

    let slice = staging.slice(..);
    let (sender, receiver) = channel();
    slice.map_async(wgpu::MapMode::Read, move |res| {
        drop(sender.send(res));
    });

    device
        .poll(wgpu::PollType::wait_indefinitely())
        .map_err(|e| RenderError::Device(format!("device poll failed: {e}")))?;

    receiver
        .recv()
        .map_err(|_| RenderError::Device("readback callback dropped".to_owned()))?
        .map_err(|e| RenderError::Device(format!("readback map failed: {e}")))?;

    let mapped = slice.get_mapped_range();
    let mut data = Vec::with_capacity(row_bytes as usize * region.height as usize);
    for row in mapped.chunks(padded_bpr as usize).take(region.height as usize) {
        data.extend_from_slice(&row[..row_bytes as usize]);
    }
    drop(mapped);
    staging.unmap();

    Ok(data)
}
