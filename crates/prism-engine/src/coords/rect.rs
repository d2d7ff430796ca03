use super::{Vec2, Viewport};

/// Axis-aligned rectangle in logical pixels (top-left origin).
///
/// Used for texture frames, trims and render-target frames.
#[derive(Debug, Copy, Clone, Default, PartialEq)]
pub struct Rect {
    pub origin: Vec2,
    pub size: Vec2,
}

impl Rect {
    #[inline]
    pub const fn new(x: f32, y: f32, w: f32, h: f32) -> Self {
        Self {
            origin: Vec2::new(x, y),
            size: Vec2::new(w, h),
        }
    }

    #[inline]
    pub const fn from_size(w: f32, h: f32) -> Self {
        Self::new(0.0, 0.0, w, h)
    }

    #[inline]
    pub fn x(self) -> f32 {
        self.origin.x
    }

    #[inline]
    pub fn y(self) -> f32 {
        self.origin.y
    }

    #[inline]
    pub fn width(self) -> f32 {
        self.size.x
    }

    #[inline]
    pub fn height(self) -> f32 {
        self.size.y
    }

    #[inline]
    pub fn max(self) -> Vec2 {
        Vec2::new(self.origin.x + self.size.x, self.origin.y + self.size.y)
    }

    #[inline]
    pub fn is_empty(self) -> bool {
        self.size.x <= 0.0 || self.size.y <= 0.0
    }

    /// Half-open containment: [min, max).
    #[inline]
    pub fn contains(self, p: Vec2) -> bool {
        p.x >= self.origin.x
            && p.y >= self.origin.y
            && p.x < self.origin.x + self.size.x
            && p.y < self.origin.y + self.size.y
    }

    /// True when `other` lies entirely inside `self` (edges may touch).
    #[inline]
    pub fn contains_rect(self, other: Rect) -> bool {
        let a = self.max();
        let b = other.max();
        other.origin.x >= self.origin.x
            && other.origin.y >= self.origin.y
            && b.x <= a.x
            && b.y <= a.y
    }

    #[inline]
    pub fn intersect(self, other: Rect) -> Option<Rect> {
        let x0 = self.origin.x.max(other.origin.x);
        let y0 = self.origin.y.max(other.origin.y);
        let x1 = self.max().x.min(other.max().x);
        let y1 = self.max().y.min(other.max().y);

        let w = x1 - x0;
        let h = y1 - y0;

        if w <= 0.0 || h <= 0.0 {
            None
        } else {
            Some(Rect::new(x0, y0, w, h))
        }
    }

    /// Scales origin and size uniformly (logical px -> physical px).
    #[inline]
    pub fn scaled(self, factor: f32) -> Rect {
        Rect::from_origin_size(self.origin * factor, self.size * factor)
    }

    #[inline]
    pub const fn from_origin_size(origin: Vec2, size: Vec2) -> Self {
        Self { origin, size }
    }

    /// Converts to a physical pixel rectangle at `resolution`.
    ///
    /// Edges are rounded to the nearest pixel; negative coordinates clamp to 0.
    pub fn to_viewport(self, resolution: f32) -> Viewport {
        let s = self.scaled(resolution);
        let x0 = s.origin.x.round().max(0.0);
        let y0 = s.origin.y.round().max(0.0);
        let x1 = s.max().x.round().max(x0);
        let y1 = s.max().y.round().max(y0);
        Viewport::new(x0 as u32, y0 as u32, (x1 - x0) as u32, (y1 - y0) as u32)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn r(x: f32, y: f32, w: f32, h: f32) -> Rect { Rect::new(x, y, w, h) }

    // ── contains ──────────────────────────────────────────────────────────

    #[test]
    fn contains_top_left_inclusive_bottom_right_exclusive() {
        let rect = r(0.0, 0.0, 10.0, 10.0);
        assert!(rect.contains(Vec2::new(0.0, 0.0)));
        assert!(!rect.contains(Vec2::new(10.0, 10.0)));
    }

    #[test]
    fn contains_rect_touching_edges() {
        let outer = r(0.0, 0.0, 10.0, 10.0);
        assert!(outer.contains_rect(r(0.0, 0.0, 10.0, 10.0)));
        assert!(outer.contains_rect(r(2.0, 3.0, 6.0, 4.0)));
        assert!(!outer.contains_rect(r(5.0, 5.0, 6.0, 1.0)));
    }

    // ── intersect ─────────────────────────────────────────────────────────

    #[test]
    fn intersect_overlapping() {
        let i = r(0.0, 0.0, 10.0, 10.0).intersect(r(5.0, 5.0, 10.0, 10.0)).unwrap();
        assert_eq!(i, r(5.0, 5.0, 5.0, 5.0));
    }

    #[test]
    fn intersect_touching_edge_returns_none() {
        assert!(r(0.0, 0.0, 10.0, 10.0).intersect(r(10.0, 0.0, 10.0, 10.0)).is_none());
    }

    // ── to_viewport ───────────────────────────────────────────────────────

    #[test]
    fn to_viewport_applies_resolution() {
        assert_eq!(r(1.0, 2.0, 10.0, 20.0).to_viewport(2.0), Viewport::new(2, 4, 20, 40));
    }

    #[test]
    fn to_viewport_clamps_negative_origin() {
        let v = r(-5.0, -5.0, 10.0, 10.0).to_viewport(1.0);
        assert_eq!(v, Viewport::new(0, 0, 5, 5));
    }
}
