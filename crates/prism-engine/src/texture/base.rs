use std::sync::atomic::{AtomicU64, Ordering};

use crate::error::{RenderError, RenderResult};
use crate::paint::Color;

use super::ScaleMode;

static NEXT_UID: AtomicU64 = AtomicU64::new(1);

/// Pixel source shared by any number of [`Texture`](super::Texture) frames.
///
/// Pixels are premultiplied RGBA8, rows top-first. The data is immutable; a
/// changed image is a new `BaseTexture` with a new uid.
#[derive(Debug)]
pub struct BaseTexture {
    uid: u64,
    width: u32,
    height: u32,
    pixels: Vec<u8>,
    scale_mode: ScaleMode,
}

impl BaseTexture {
    /// Wraps premultiplied RGBA8 pixels.
    pub fn from_rgba8(width: u32, height: u32, pixels: Vec<u8>) -> RenderResult<Self> {
        let expected = width as usize * height as usize * 4;
        if pixels.len() != expected {
            return Err(RenderError::InvalidResource(format!(
                "base texture {width}x{height} needs {expected} bytes, got {}",
                pixels.len()
            )));
        }
        if width == 0 || height == 0 {
            return Err(RenderError::InvalidResource(format!(
                "base texture has empty size {width}x{height}"
            )));
        }
        Ok(Self {
            uid: NEXT_UID.fetch_add(1, Ordering::Relaxed),
            width,
            height,
            pixels,
            scale_mode: ScaleMode::default(),
        })
    }

    /// Premultiplies straight-alpha RGBA8 pixels.
    pub fn from_straight_rgba8(width: u32, height: u32, mut pixels: Vec<u8>) -> RenderResult<Self> {
        for px in pixels.chunks_exact_mut(4) {
            let a = px[3] as u32;
            for c in &mut px[..3] {
                *c = ((*c as u32 * a + 127) / 255) as u8;
            }
        }
        Self::from_rgba8(width, height, pixels)
    }

    /// A `width x height` texture filled with one color.
    pub fn solid(width: u32, height: u32, color: Color) -> RenderResult<Self> {
        let rgba = color.to_rgba8();
        let pixels = rgba.repeat(width as usize * height as usize);
        Self::from_rgba8(width, height, pixels)
    }

    /// Copies a decoded (straight alpha) image.
    pub fn from_image(image: &image::RgbaImage) -> RenderResult<Self> {
        Self::from_straight_rgba8(image.width(), image.height(), image.as_raw().clone())
    }

    #[must_use]
    pub fn with_scale_mode(mut self, scale_mode: ScaleMode) -> Self {
        self.scale_mode = scale_mode;
        self
    }

    #[inline]
    pub fn uid(&self) -> u64 {
        self.uid
    }

    #[inline]
    pub fn width(&self) -> u32 {
        self.width
    }

    #[inline]
    pub fn height(&self) -> u32 {
        self.height
    }

    #[inline]
    pub fn pixels(&self) -> &[u8] {
        &self.pixels
    }

    #[inline]
    pub fn scale_mode(&self) -> ScaleMode {
        self.scale_mode
    }
}
