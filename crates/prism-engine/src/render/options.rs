use crate::paint::Color;

use super::TextureGcConfig;

/// Renderer construction parameters.
///
/// Defaults:
/// - `800 x 600` logical pixels at resolution 1
/// - opaque black background, cleared before every frame
/// - automatic texture GC (see [`TextureGcConfig`])
#[derive(Debug, Clone)]
pub struct RendererOptions {
    pub width: u32,
    pub height: u32,
    /// Device pixels per logical pixel.
    pub resolution: f32,
    pub background_color: Color,
    /// When set, the background is cleared to transparent instead.
    pub transparent: bool,
    pub clear_before_render: bool,
    pub texture_gc: TextureGcConfig,
}

impl Default for RendererOptions {
    fn default() -> Self {
        Self {
            width: 800,
            height: 600,
            resolution: 1.0,
            background_color: Color::black(),
            transparent: false,
            clear_before_render: true,
            texture_gc: TextureGcConfig::default(),
        }
    }
}

impl RendererOptions {
    pub fn with_size(mut self, width: u32, height: u32) -> Self {
        self.width = width;
        self.height = height;
        self
    }

    pub fn with_background(mut self, color: Color) -> Self {
        self.background_color = color;
        self
    }

    /// Color the root target clears to.
    pub fn clear_color(&self) -> Color {
        if self.transparent { Color::transparent() } else { self.background_color }
    }

    /// Size of the default framebuffer in device pixels.
    pub fn physical_size(&self) -> (u32, u32) {
        (
            (self.width as f32 * self.resolution).round() as u32,
            (self.height as f32 * self.resolution).round() as u32,
        )
    }
}
