//! Triangle fills for the software device, rasterized by `vello_cpu`.
//!
//! Framebuffers are plain premultiplied RGBA8 rows. A draw snapshots the bound
//! surface as the backdrop, fills every triangle as a path on top of it with
//! the draw's blend mode, then copies the clip region back. Textured triangles
//! use an image paint whose transform maps texel space onto the triangle.
//!
//! Consecutive triangles sharing one paint are filled as a single path, so the
//! diagonal of a quad is covered once.

use std::sync::Arc;

use vello_cpu::kurbo::{Affine, BezPath, Point, Rect};
use vello_cpu::peniko::color::PremulRgba8;
use vello_cpu::peniko::{self, Compose, ImageQuality, ImageSampler, Mix};
use vello_cpu::{Image, ImageSource, Pixmap, RenderContext};

use crate::coords::Viewport;
use crate::device::{ClipVertex, ScaleMode};
use crate::error::{RenderError, RenderResult};
use crate::paint::BlendMode;

/// Premultiplied RGBA8 image, rows top-first.
#[derive(Debug, Clone)]
pub(crate) struct Surface {
    pub width: u32,
    pub height: u32,
    pub pixels: Vec<u8>,
}

impl Surface {
    pub fn new(width: u32, height: u32) -> Self {
        Self { width, height, pixels: vec![0; width as usize * height as usize * 4] }
    }

    #[inline]
    pub fn bounds(&self) -> Viewport {
        Viewport::from_size(self.width, self.height)
    }

    /// Reallocates storage; contents are reset to transparent.
    pub fn resize(&mut self, width: u32, height: u32) {
        *self = Self::new(width, height);
    }

    #[inline]
    fn offset(&self, x: u32, y: u32) -> usize {
        (y as usize * self.width as usize + x as usize) * 4
    }

    pub fn pixel(&self, x: u32, y: u32) -> Option<[u8; 4]> {
        if x >= self.width || y >= self.height {
            return None;
        }
        let i = self.offset(x, y);
        Some([self.pixels[i], self.pixels[i + 1], self.pixels[i + 2], self.pixels[i + 3]])
    }

    pub fn fill(&mut self, region: Viewport, rgba: [u8; 4]) {
        let r = region.clamp_to(self.bounds());
        for y in r.y..r.bottom() {
            for x in r.x..r.right() {
                let i = self.offset(x, y);
                self.pixels[i..i + 4].copy_from_slice(&rgba);
            }
        }
    }

    /// Copies `region` (already clamped by the caller) into a tight buffer.
    pub fn read(&self, region: Viewport) -> Vec<u8> {
        let mut out = Vec::with_capacity(region.width as usize * region.height as usize * 4);
        for y in region.y..region.bottom() {
            let start = self.offset(region.x, y);
            let end = start + region.width as usize * 4;
            out.extend_from_slice(&self.pixels[start..end]);
        }
        out
    }

    /// Overwrites `region` from a full-size RGBA8 buffer. Returns the number
    /// of pixels whose value changed.
    fn copy_from(&mut self, src: &[u8], region: Viewport) -> u64 {
        let mut changed = 0;
        for y in region.y..region.bottom() {
            for x in region.x..region.right() {
                let i = self.offset(x, y);
                if self.pixels[i..i + 4] != src[i..i + 4] {
                    self.pixels[i..i + 4].copy_from_slice(&src[i..i + 4]);
                    changed += 1;
                }
            }
        }
        changed
    }
}

/// An uploaded texture: the premultiplied texels and their `vello_cpu` pixmap.
pub(crate) struct Texture {
    width: u32,
    height: u32,
    pixels: Vec<u8>,
    pixmap: Arc<Pixmap>,
    scale_mode: ScaleMode,
}

impl Texture {
    pub fn new(width: u32, height: u32, pixels: Vec<u8>, scale_mode: ScaleMode) -> RenderResult<Self> {
        let pixmap = Arc::new(pixmap_from_premul(width, height, &pixels)?);
        Ok(Self { width, height, pixels, pixmap, scale_mode })
    }

    #[inline]
    pub fn size(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    /// Image paint with every texel multiplied by the premultiplied `tint`.
    fn paint(&self, tint: [f32; 4]) -> RenderResult<Image> {
        let pixmap = if tint == [1.0; 4] {
            self.pixmap.clone()
        } else {
            let tinted: Vec<u8> = self
                .pixels
                .chunks_exact(4)
                .flat_map(|px| std::array::from_fn::<u8, 4, _>(|i| (px[i] as f32 * tint[i]).round() as u8))
                .collect();
            Arc::new(pixmap_from_premul(self.width, self.height, &tinted)?)
        };
        Ok(image_paint(pixmap, quality(self.scale_mode)))
    }
}

/// Result of one [`Rasterizer::draw`].
#[derive(Debug, Copy, Clone, Default)]
pub(crate) struct Fill {
    pub triangles: u64,
    pub pixels_changed: u64,
}

/// Triangles filled together with one paint.
struct Group {
    path: BezPath,
    paint_transform: Affine,
    tint: [f32; 4],
}

/// Owns the `vello_cpu` context, reused while the target size is unchanged.
#[derive(Default)]
pub(crate) struct Rasterizer {
    ctx: Option<RenderContext>,
}

impl Rasterizer {
    /// Fills clip-space `vertices` (three per triangle) into `target`,
    /// restricted to `clip`.
    pub fn draw(
        &mut self,
        target: &mut Surface,
        viewport: Viewport,
        clip: Viewport,
        vertices: &[ClipVertex],
        texture: Option<&Texture>,
        blend: BlendMode,
    ) -> RenderResult<Fill> {
        let mut fill = Fill { triangles: (vertices.len() / 3) as u64, pixels_changed: 0 };
        let clip = clip.clamp_to(target.bounds());
        let groups = group_triangles(vertices, viewport, texture);
        if clip.is_empty() || groups.is_empty() {
            return Ok(fill);
        }

        let backdrop = Arc::new(pixmap_from_premul(target.width, target.height, &target.pixels)?);
        let (w, h) = (backdrop.width(), backdrop.height());
        let mut ctx = match self.ctx.take() {
            Some(ctx) if ctx.width() == w && ctx.height() == h => ctx,
            _ => RenderContext::new(w, h),
        };
        ctx.reset();

        ctx.set_transform(Affine::IDENTITY);
        ctx.set_paint_transform(Affine::IDENTITY);
        ctx.set_blend_mode(peniko::BlendMode::default());
        ctx.set_paint(image_paint(backdrop, ImageQuality::Low));
        ctx.fill_rect(&Rect::new(0.0, 0.0, f64::from(w), f64::from(h)));

        ctx.set_blend_mode(blend_mode(blend));
        let mut tinted: Vec<([f32; 4], Image)> = Vec::new();
        for group in &groups {
            match texture {
                Some(tex) => {
                    let paint = match tinted.iter().find(|(t, _)| *t == group.tint) {
                        Some((_, paint)) => paint.clone(),
                        None => {
                            let paint = tex.paint(group.tint)?;
                            tinted.push((group.tint, paint.clone()));
                            paint
                        }
                    };
                    ctx.set_paint_transform(group.paint_transform);
                    ctx.set_paint(paint);
                }
                None => {
                    ctx.set_paint_transform(Affine::IDENTITY);
                    ctx.set_paint(solid(group.tint));
                }
            }
            ctx.fill_path(&group.path);
        }

        ctx.flush();
        let mut out = Pixmap::new(w, h);
        ctx.render_to_pixmap(&mut out);
        self.ctx = Some(ctx);

        fill.pixels_changed = target.copy_from(out.data_as_u8_slice(), clip);
        Ok(fill)
    }
}

fn pixmap_from_premul(width: u32, height: u32, bytes: &[u8]) -> RenderResult<Pixmap> {
    let too_large = |dim: u32| RenderError::InvalidResource(format!("surface dimension {dim} exceeds {}", u16::MAX));
    let w = u16::try_from(width).map_err(|_| too_large(width))?;
    let h = u16::try_from(height).map_err(|_| too_large(height))?;
    let pixels = bytes
        .chunks_exact(4)
        .map(|px| PremulRgba8::from_u8_array([px[0], px[1], px[2], px[3]]))
        .collect();
    Ok(Pixmap::from_parts_with_opacity(pixels, w, h, true))
}

fn image_paint(pixmap: Arc<Pixmap>, quality: ImageQuality) -> Image {
    Image {
        image: ImageSource::Pixmap(pixmap),
        sampler: ImageSampler { quality, ..ImageSampler::default() },
    }
}

/// Nearest maps to point sampling, Linear to bilinear. Edges clamp.
fn quality(scale_mode: ScaleMode) -> ImageQuality {
    match scale_mode {
        ScaleMode::Nearest => ImageQuality::Low,
        ScaleMode::Linear => ImageQuality::Medium,
    }
}

fn blend_mode(mode: BlendMode) -> peniko::BlendMode {
    match mode {
        BlendMode::Normal => peniko::BlendMode::default(),
        BlendMode::Add => peniko::BlendMode::new(Mix::Normal, Compose::Plus),
        BlendMode::Multiply => peniko::BlendMode::new(Mix::Multiply, Compose::SrcOver),
        BlendMode::Screen => peniko::BlendMode::new(Mix::Screen, Compose::SrcOver),
    }
}

/// Straight-alpha color for a premultiplied tint.
fn solid(tint: [f32; 4]) -> peniko::Color {
    let a = tint[3].clamp(0.0, 1.0);
    let channel = |c: f32| {
        let straight = if a > 0.0 { (c / a).clamp(0.0, 1.0) } else { 0.0 };
        (straight * 255.0).round() as u8
    };
    peniko::Color::from_rgba8(channel(tint[0]), channel(tint[1]), channel(tint[2]), (a * 255.0).round() as u8)
}

/// Maps a clip-space position into window pixels (row 0 at the top).
#[inline]
fn to_window(p: [f32; 2], viewport: Viewport) -> Point {
    Point::new(
        f64::from(viewport.x) + f64::from(p[0] + 1.0) * 0.5 * f64::from(viewport.width),
        f64::from(viewport.y) + f64::from(1.0 - p[1]) * 0.5 * f64::from(viewport.height),
    )
}

#[inline]
fn signed_area(p: [Point; 3]) -> f64 {
    (p[1].x - p[0].x) * (p[2].y - p[0].y) - (p[2].x - p[0].x) * (p[1].y - p[0].y)
}

/// Affine taking texel coordinates of `v` onto window points `p`.
///
/// `None` when the UV triangle is degenerate.
fn texel_to_window(v: [&ClipVertex; 3], p: [Point; 3], texture: &Texture) -> Option<Affine> {
    let (tw, th) = texture.size();
    let t: [Point; 3] =
        std::array::from_fn(|i| Point::new(f64::from(v[i].uv[0]) * f64::from(tw), f64::from(v[i].uv[1]) * f64::from(th)));

    let (t1, t2) = (t[1] - t[0], t[2] - t[0]);
    let (p1, p2) = (p[1] - p[0], p[2] - p[0]);
    let det = t1.x * t2.y - t2.x * t1.y;
    if det == 0.0 || !det.is_finite() {
        return None;
    }

    let a = (p1.x * t2.y - p2.x * t1.y) / det;
    let c = (p2.x * t1.x - p1.x * t2.x) / det;
    let b = (p1.y * t2.y - p2.y * t1.y) / det;
    let d = (p2.y * t1.x - p1.y * t2.x) / det;
    let e = p[0].x - (a * t[0].x + c * t[0].y);
    let f = p[0].y - (b * t[0].x + d * t[0].y);
    Some(Affine::new([a, b, c, d, e, f]))
}

fn same_affine(x: Affine, y: Affine) -> bool {
    x.as_coeffs()
        .iter()
        .zip(y.as_coeffs())
        .all(|(a, b)| (a - b).abs() <= 1e-6 * (1.0 + a.abs().max(b.abs())))
}

/// Flat shading: the mean of the three vertex tints.
fn flat_tint(v: [&ClipVertex; 3]) -> [f32; 4] {
    std::array::from_fn(|i| ((v[0].color[i] + v[1].color[i] + v[2].color[i]) / 3.0).clamp(0.0, 1.0))
}

fn group_triangles(vertices: &[ClipVertex], viewport: Viewport, texture: Option<&Texture>) -> Vec<Group> {
    let mut groups: Vec<Group> = Vec::new();

    for tri in vertices.chunks_exact(3) {
        let mut v = [&tri[0], &tri[1], &tri[2]];
        let mut p = [
            to_window(v[0].position, viewport),
            to_window(v[1].position, viewport),
            to_window(v[2].position, viewport),
        ];
        let area = signed_area(p);
        if area == 0.0 || !area.is_finite() {
            continue;
        }
        // One winding for every triangle, so merged paths never cancel.
        if area < 0.0 {
            v.swap(1, 2);
            p.swap(1, 2);
        }

        let paint_transform = match texture {
            Some(tex) => match texel_to_window(v, p, tex) {
                Some(affine) => affine,
                None => continue,
            },
            None => Affine::IDENTITY,
        };
        let tint = flat_tint(v);

        let merge = groups
            .last()
            .is_some_and(|g| g.tint == tint && same_affine(g.paint_transform, paint_transform));
        if !merge {
            groups.push(Group { path: BezPath::new(), paint_transform, tint });
        }
        if let Some(group) = groups.last_mut() {
            group.path.move_to(p[0]);
            group.path.line_to(p[1]);
            group.path.line_to(p[2]);
            group.path.close_path();
        }
    }

    groups
}

#[cfg(test)]
mod tests {
    use super::*;

    fn vertex(x: f32, y: f32, u: f32, v: f32) -> ClipVertex {
        ClipVertex { position: [x, y], uv: [u, v], color: [0.5, 0.0, 0.0, 0.5] }
    }

    /// Full-clip quad as two triangles sharing the diagonal.
    fn quad() -> Vec<ClipVertex> {
        let a = vertex(-1.0, 1.0, 0.0, 0.0);
        let b = vertex(1.0, 1.0, 1.0, 0.0);
        let c = vertex(1.0, -1.0, 1.0, 1.0);
        let d = vertex(-1.0, -1.0, 0.0, 1.0);
        vec![a, b, c, a, c, d]
    }

    fn draw(target: &mut Surface, clip: Viewport, vertices: &[ClipVertex], texture: Option<&Texture>) -> Fill {
        let vp = target.bounds();
        Rasterizer::default()
            .draw(target, vp, clip, vertices, texture, BlendMode::Normal)
            .unwrap()
    }

    #[test]
    fn quad_diagonal_is_filled_once() {
        let mut s = Surface::new(8, 8);
        let clip = s.bounds();
        let fill = draw(&mut s, clip, &quad(), None);
        assert_eq!(fill.triangles, 2);
        assert_eq!(fill.pixels_changed, 64);
        // Half-alpha red over transparent: a seam drawn twice would be darker.
        for y in 0..8 {
            for x in 0..8 {
                let px = s.pixel(x, y).unwrap();
                assert!(px[0].abs_diff(128) <= 1 && px[1] == 0 && px[3].abs_diff(128) <= 1, "{px:?} at ({x}, {y})");
            }
        }
    }

    #[test]
    fn winding_does_not_matter() {
        let mut cw = Surface::new(4, 4);
        let mut ccw = Surface::new(4, 4);
        let clip = cw.bounds();
        let (a, b, c) = (vertex(-1.0, 1.0, 0.0, 0.0), vertex(1.0, 1.0, 0.0, 0.0), vertex(-1.0, -1.0, 0.0, 0.0));
        draw(&mut cw, clip, &[a, b, c], None);
        draw(&mut ccw, clip, &[a, c, b], None);
        assert_eq!(cw.pixels, ccw.pixels);
    }

    #[test]
    fn clip_rect_limits_writes() {
        let mut s = Surface::new(8, 8);
        let fill = draw(&mut s, Viewport::new(2, 2, 2, 3), &quad(), None);
        assert_eq!(fill.pixels_changed, 6);
        assert_eq!(s.pixel(0, 0), Some([0, 0, 0, 0]));
        assert_ne!(s.pixel(2, 2), Some([0, 0, 0, 0]));
    }

    #[test]
    fn backdrop_outside_the_triangles_is_kept() {
        let mut s = Surface::new(4, 4);
        s.fill(s.bounds(), [0, 0, 255, 255]);
        let tri = [vertex(-1.0, 1.0, 0.0, 0.0), vertex(0.0, 1.0, 0.0, 0.0), vertex(-1.0, 0.0, 0.0, 0.0)];
        let clip = s.bounds();
        draw(&mut s, clip, &tri, None);
        assert_eq!(s.pixel(3, 3), Some([0, 0, 255, 255]));
    }

    #[test]
    fn nearest_sampling_maps_texels_onto_the_quad() {
        let pixels = vec![255, 0, 0, 255, 0, 0, 255, 255];
        let tex = Texture::new(2, 1, pixels, ScaleMode::Nearest).unwrap();
        let mut s = Surface::new(4, 1);
        let mut vertices = quad();
        for v in &mut vertices {
            v.color = [1.0; 4];
        }
        let clip = s.bounds();
        draw(&mut s, clip, &vertices, Some(&tex));

        assert_eq!(s.pixel(0, 0), Some([255, 0, 0, 255]));
        assert_eq!(s.pixel(1, 0), Some([255, 0, 0, 255]));
        assert_eq!(s.pixel(2, 0), Some([0, 0, 255, 255]));
        assert_eq!(s.pixel(3, 0), Some([0, 0, 255, 255]));
    }

    #[test]
    fn degenerate_triangles_draw_nothing() {
        let mut s = Surface::new(4, 4);
        let flat = [vertex(0.0, 0.0, 0.0, 0.0); 3];
        let clip = s.bounds();
        let fill = draw(&mut s, clip, &flat, None);
        assert_eq!(fill.triangles, 1);
        assert_eq!(fill.pixels_changed, 0);
    }

    #[test]
    fn texel_affine_maps_uv_corners() {
        let tex = Texture::new(2, 2, vec![0; 16], ScaleMode::Nearest).unwrap();
        let (a, b, c) = (vertex(-1.0, 1.0, 0.0, 0.0), vertex(1.0, 1.0, 1.0, 0.0), vertex(1.0, -1.0, 1.0, 1.0));
        let vp = Viewport::from_size(10, 10);
        let p = [to_window(a.position, vp), to_window(b.position, vp), to_window(c.position, vp)];
        let m = texel_to_window([&a, &b, &c], p, &tex).unwrap();
        let far = m * Point::new(2.0, 2.0);
        assert!((far.x - 10.0).abs() < 1e-9 && (far.y - 10.0).abs() < 1e-9);
    }
}
