//! Pixel readback from render targets.

use crate::coords::Viewport;
use crate::error::{RenderError, RenderResult};

use super::{RenderTargetId, Renderer};

impl Renderer {
    /// Reads a target's pixels: premultiplied RGBA8, rows top-first, in
    /// device pixels. `None` reads the root target.
    ///
    /// Pending draws are flushed first. Fails with
    /// [`RenderError::ContextLost`] while the context is lost.
    pub fn extract_pixels(&mut self, target: Option<RenderTargetId>) -> RenderResult<Vec<u8>> {
        let (_, _, data) = self.extract(target)?;
        Ok(data)
    }

    /// Reads a target into an image with straight (non-premultiplied) alpha.
    pub fn extract_image(&mut self, target: Option<RenderTargetId>) -> RenderResult<image::RgbaImage> {
        let (width, height, mut data) = self.extract(target)?;
        unpremultiply(&mut data);
        image::RgbaImage::from_raw(width, height, data)
            .ok_or_else(|| RenderError::Device("readback returned a short buffer".to_owned()))
    }

    fn extract(&mut self, target: Option<RenderTargetId>) -> RenderResult<(u32, u32, Vec<u8>)> {
        self.flush()?;
        if self.state() != super::RendererState::Active {
            return Err(RenderError::ContextLost);
        }

        let id = target.unwrap_or(RenderTargetId::ROOT);
        let generation = self.generation();
        let rt = self
            .render_target(id)
            .ok_or_else(|| RenderError::InvalidResource(format!("render target {id:?} does not exist")))?;
        let (width, height) = rt.physical_size();
        let framebuffer = match rt.framebuffer(generation) {
            Some(fb) => Some(fb),
            None if rt.is_root() => None,
            None => {
                return Err(RenderError::InvalidResource(format!(
                    "render target {id:?} has not been drawn to in this context"
                )));
            }
        };

        let (device, _) = self.device_and_generation()?;
        let data = device.read_pixels(framebuffer, Viewport::from_size(width, height))?;
        log::debug!("extract: read {width}x{height} from {id:?}");
        Ok((width, height, data))
    }
}

fn unpremultiply(data: &mut [u8]) {
    for px in data.chunks_exact_mut(4) {
        let a = px[3] as u32;
        if a == 0 || a == 255 {
            continue;
        }
        for c in &mut px[..3] {
            *c = ((*c as u32 * 255 + a / 2) / a).min(255) as u8;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unpremultiply_restores_straight_alpha() {
        let mut px = [64, 32, 0, 128, 10, 20, 30, 0, 1, 2, 3, 255];
        unpremultiply(&mut px);
        assert_eq!(px, [128, 64, 0, 128, 10, 20, 30, 0, 1, 2, 3, 255]);
    }
}
