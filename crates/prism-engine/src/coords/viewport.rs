/// Pixel rectangle on a framebuffer (top-left origin, physical pixels).
///
/// Used for device viewports, scissor boxes and readback regions.
#[derive(Debug, Copy, Clone, Default, PartialEq, Eq, Hash)]
pub struct Viewport {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

impl Viewport {
    #[inline]
    pub const fn new(x: u32, y: u32, width: u32, height: u32) -> Self {
        Self { x, y, width, height }
    }

    #[inline]
    pub const fn from_size(width: u32, height: u32) -> Self {
        Self { x: 0, y: 0, width, height }
    }

    #[inline]
    pub fn is_empty(self) -> bool {
        self.width == 0 || self.height == 0
    }

    #[inline]
    pub fn right(self) -> u32 {
        self.x.saturating_add(self.width)
    }

    #[inline]
    pub fn bottom(self) -> u32 {
        self.y.saturating_add(self.height)
    }

    /// Intersection of two pixel rectangles; empty overlap yields an empty viewport.
    pub fn clamp_to(self, bounds: Viewport) -> Viewport {
        let x0 = self.x.max(bounds.x);
        let y0 = self.y.max(bounds.y);
        let x1 = self.right().min(bounds.right());
        let y1 = self.bottom().min(bounds.bottom());
        if x1 <= x0 || y1 <= y0 {
            return Viewport::new(x0.min(x1), y0.min(y1), 0, 0);
        }
        Viewport::new(x0, y0, x1 - x0, y1 - y0)
    }
}
