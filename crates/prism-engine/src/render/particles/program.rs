//! Particle shader program and the per-attribute upload table.

use crate::coords::Matrix;
use crate::device::{AttributeDesc, ClipVertex, ProgramDesc, UniformDesc, UniformKind, UniformSet, VertexInputs};
use crate::scene::{ParticleProperties, Sprite};

pub(crate) const VERTEX: u32 = 0;
pub(crate) const POSITION: u32 = 1;
pub(crate) const ROTATION: u32 = 2;
pub(crate) const UV: u32 = 3;
pub(crate) const COLOR: u32 = 4;

pub(crate) const PROJECTION_MATRIX: &str = "projectionMatrix";
pub(crate) const ALPHA: &str = "uAlpha";

pub(crate) static PARTICLE_PROGRAM: ProgramDesc = ProgramDesc {
    label: "particle",
    wgsl: include_str!("particles.wgsl"),
    attributes: &[
        AttributeDesc { name: "aVertexPosition", location: VERTEX, components: 2 },
        AttributeDesc { name: "aPositionCoord", location: POSITION, components: 2 },
        AttributeDesc { name: "aRotation", location: ROTATION, components: 1 },
        AttributeDesc { name: "aTextureCoord", location: UV, components: 2 },
        AttributeDesc { name: "aColor", location: COLOR, components: 1 },
    ],
    uniforms: &[
        UniformDesc { name: PROJECTION_MATRIX, kind: UniformKind::Mat3 },
        UniformDesc { name: ALPHA, kind: UniformKind::Float },
    ],
    samplers: &["uSampler"],
    cpu_vertex: particle_vertex,
};

fn particle_vertex(input: &VertexInputs, uniforms: &UniformSet) -> ClipVertex {
    let [vx, vy] = input.vec2(VERTEX);
    let [px, py] = input.vec2(POSITION);
    let (sin, cos) = input.float(ROTATION).sin_cos();
    let x = vx * cos - vy * sin + px;
    let y = vx * sin + vy * cos + py;

    // Column-major, as uploaded with `to_array(true)`.
    let m = uniforms
        .mat3(PROJECTION_MATRIX)
        .unwrap_or_else(|| Matrix::IDENTITY.to_array(true));
    let alpha = input.float(COLOR) * uniforms.float(ALPHA).unwrap_or(1.0);

    ClipVertex {
        position: [m[0] * x + m[3] * y + m[6], m[1] * x + m[4] * y + m[7]],
        uv: input.vec2(UV),
        color: [alpha; 4],
    }
}

/// Writes one attribute for `sprites` into a stride-interleaved arena.
///
/// `stride` and `offset` are in floats; each sprite fills four vertices.
pub(crate) type UploadFn = fn(sprites: &[Sprite], out: &mut [f32], stride: usize, offset: usize);

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub(crate) enum PropertyKind {
    Vertices,
    Position,
    Rotation,
    Uvs,
    Alpha,
}

impl PropertyKind {
    pub fn is_dynamic(self, flags: &ParticleProperties) -> bool {
        match self {
            PropertyKind::Vertices => flags.vertices,
            PropertyKind::Position => flags.position,
            PropertyKind::Rotation => flags.rotation,
            PropertyKind::Uvs => flags.uvs,
            PropertyKind::Alpha => flags.alpha,
        }
    }
}

/// One row of the upload table.
#[derive(Debug, Copy, Clone)]
pub(crate) struct ParticleProperty {
    pub kind: PropertyKind,
    pub location: u32,
    pub components: u32,
    pub upload: UploadFn,
    /// Float offset inside the owning stream; set when a buffer lays out its streams.
    pub offset: u32,
}

pub(crate) fn property_table() -> Vec<ParticleProperty> {
    let row = |kind: PropertyKind, location: u32, components: u32, upload: UploadFn| ParticleProperty {
        kind,
        location,
        components,
        upload,
        offset: 0,
    };
    vec![
        row(PropertyKind::Vertices, VERTEX, 2, upload_vertices),
        row(PropertyKind::Position, POSITION, 2, upload_position),
        row(PropertyKind::Rotation, ROTATION, 1, upload_rotation),
        row(PropertyKind::Uvs, UV, 2, upload_uvs),
        row(PropertyKind::Alpha, COLOR, 1, upload_alpha),
    ]
}

/// Quad corner offsets from the sprite origin, scaled.
///
/// Trimmed frames are placed inside the original footprint so trimmed and
/// untrimmed versions of one image land on the same pixels.
pub(crate) fn quad_corners(sprite: &Sprite) -> [[f32; 2]; 4] {
    let texture = sprite.texture();
    let orig = texture.orig();
    let anchor = sprite.anchor;

    let (w0, w1, h0, h1) = match texture.trim() {
        Some(trim) => {
            let w1 = trim.x() - anchor.x * orig.width();
            let h1 = trim.y() - anchor.y * orig.height();
            (w1 + trim.width(), w1, h1 + trim.height(), h1)
        }
        None => (
            orig.width() * (1.0 - anchor.x),
            -orig.width() * anchor.x,
            orig.height() * (1.0 - anchor.y),
            -orig.height() * anchor.y,
        ),
    };

    let s = sprite.transform.scale;
    [[w1 * s.x, h1 * s.y], [w0 * s.x, h1 * s.y], [w0 * s.x, h0 * s.y], [w1 * s.x, h0 * s.y]]
}

fn upload_vertices(sprites: &[Sprite], out: &mut [f32], stride: usize, mut offset: usize) {
    for sprite in sprites {
        for (k, corner) in quad_corners(sprite).iter().enumerate() {
            let at = offset + stride * k;
            out[at] = corner[0];
            out[at + 1] = corner[1];
        }
        offset += stride * 4;
    }
}

fn upload_position(sprites: &[Sprite], out: &mut [f32], stride: usize, mut offset: usize) {
    for sprite in sprites {
        let p = sprite.transform.position;
        for k in 0..4 {
            out[offset + stride * k] = p.x;
            out[offset + stride * k + 1] = p.y;
        }
        offset += stride * 4;
    }
}

fn upload_rotation(sprites: &[Sprite], out: &mut [f32], stride: usize, mut offset: usize) {
    for sprite in sprites {
        for k in 0..4 {
            out[offset + stride * k] = sprite.transform.rotation;
        }
        offset += stride * 4;
    }
}

fn upload_uvs(sprites: &[Sprite], out: &mut [f32], stride: usize, mut offset: usize) {
    for sprite in sprites {
        for (k, uv) in sprite.texture().uvs().corners().iter().enumerate() {
            out[offset + stride * k] = uv[0];
            out[offset + stride * k + 1] = uv[1];
        }
        offset += stride * 4;
    }
}

fn upload_alpha(sprites: &[Sprite], out: &mut [f32], stride: usize, mut offset: usize) {
    for sprite in sprites {
        for k in 0..4 {
            out[offset + stride * k] = sprite.alpha;
        }
        offset += stride * 4;
    }
}

#[cfg(test)]
mod tests {
    use std::rc::Rc;

    use super::*;
    use crate::coords::{Rect, Vec2};
    use crate::device::UniformValue;
    use crate::paint::Color;
    use crate::texture::{BaseTexture, Texture};

    fn sprite_with(texture: Texture, anchor: Vec2, scale: Vec2) -> Sprite {
        let mut s = Sprite::new(texture);
        s.anchor = anchor;
        s.transform.scale = scale;
        s
    }

    fn base(w: u32, h: u32) -> Rc<BaseTexture> {
        Rc::new(BaseTexture::solid(w, h, Color::white()).unwrap())
    }

    // ── quad geometry ─────────────────────────────────────────────────────

    #[test]
    fn untrimmed_quad_is_centered_by_anchor() {
        let s = sprite_with(Texture::from_base(base(10, 4)), Vec2::splat(0.5), Vec2::splat(1.0));
        assert_eq!(quad_corners(&s), [[-5.0, -2.0], [5.0, -2.0], [5.0, 2.0], [-5.0, 2.0]]);
    }

    #[test]
    fn scale_multiplies_every_corner() {
        let s = sprite_with(Texture::from_base(base(2, 2)), Vec2::zero(), Vec2::new(3.0, -1.0));
        assert_eq!(quad_corners(&s), [[0.0, 0.0], [6.0, 0.0], [6.0, -2.0], [0.0, -2.0]]);
    }

    #[test]
    fn trimmed_quad_sits_inside_original_footprint() {
        // 8x8 image whose opaque 4x2 region starts at (3, 5).
        let tex = Texture::new(
            base(4, 2),
            Rect::new(0.0, 0.0, 4.0, 2.0),
            Rect::from_size(8.0, 8.0),
            Some(Rect::new(3.0, 5.0, 4.0, 2.0)),
        )
        .unwrap();
        let s = sprite_with(tex, Vec2::splat(0.5), Vec2::splat(1.0));
        assert_eq!(quad_corners(&s), [[-1.0, 1.0], [3.0, 1.0], [3.0, 3.0], [-1.0, 3.0]]);
    }

    // ── uploads ───────────────────────────────────────────────────────────

    #[test]
    fn uploads_respect_stride_and_offset() {
        let mut s = sprite_with(Texture::from_base(base(1, 1)), Vec2::zero(), Vec2::splat(1.0));
        s.transform.position = Vec2::new(7.0, 8.0);
        s.transform.rotation = 0.25;
        s.alpha = 0.5;

        let stride = 5;
        let mut out = vec![0.0; stride * 4];
        upload_position(std::slice::from_ref(&s), &mut out, stride, 0);
        upload_rotation(std::slice::from_ref(&s), &mut out, stride, 2);
        upload_alpha(std::slice::from_ref(&s), &mut out, stride, 3);
        for k in 0..4 {
            assert_eq!(&out[k * stride..k * stride + 4], &[7.0, 8.0, 0.25, 0.5]);
        }
    }

    #[test]
    fn uv_corners_follow_quad_order() {
        let s = sprite_with(Texture::from_base(base(1, 1)), Vec2::zero(), Vec2::splat(1.0));
        let mut out = vec![0.0; 8];
        upload_uvs(std::slice::from_ref(&s), &mut out, 2, 0);
        assert_eq!(out, vec![0.0, 0.0, 1.0, 0.0, 1.0, 1.0, 0.0, 1.0]);
    }

    // ── cpu vertex stage ──────────────────────────────────────────────────

    #[test]
    fn cpu_vertex_rotates_then_translates_then_projects() {
        let mut inputs = VertexInputs::default();
        inputs.set(VERTEX, &[1.0, 0.0]);
        inputs.set(POSITION, &[10.0, 20.0]);
        inputs.set(ROTATION, &[std::f32::consts::FRAC_PI_2]);
        inputs.set(UV, &[0.5, 0.25]);
        inputs.set(COLOR, &[0.5]);

        let mut uniforms = UniformSet::new();
        let proj = Matrix::new(2.0, 0.0, 0.0, 2.0, 1.0, 0.0);
        uniforms.set(PROJECTION_MATRIX, UniformValue::Mat3(proj.to_array(true)));
        uniforms.set(ALPHA, UniformValue::Float(0.5));

        let v = particle_vertex(&inputs, &uniforms);
        assert!((v.position[0] - 21.0).abs() < 1e-4);
        assert!((v.position[1] - 42.0).abs() < 1e-4);
        assert_eq!(v.uv, [0.5, 0.25]);
        assert_eq!(v.color, [0.25; 4]);
    }

    #[test]
    fn default_properties_split_static_and_dynamic() {
        let flags = ParticleProperties::default();
        let dynamic: Vec<_> = property_table()
            .into_iter()
            .filter(|p| p.kind.is_dynamic(&flags))
            .map(|p| p.kind)
            .collect();
        assert_eq!(dynamic, vec![PropertyKind::Position, PropertyKind::Rotation, PropertyKind::Alpha]);
    }
}
