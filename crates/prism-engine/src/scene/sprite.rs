use crate::coords::Vec2;
use crate::texture::Texture;

use super::Transform;

/// Flat per-particle state read by the particle batcher.
///
/// Only `position`, `scale` and `rotation` of the transform are used;
/// particles have no pivot, skew or children.
#[derive(Debug, Clone)]
pub struct Sprite {
    pub transform: Transform,
    /// Normalized origin inside the texture's original footprint.
    pub anchor: Vec2,
    pub alpha: f32,
    texture: Texture,
}

impl Sprite {
    pub fn new(texture: Texture) -> Self {
        Self {
            transform: Transform::default(),
            anchor: Vec2::zero(),
            alpha: 1.0,
            texture,
        }
    }

    #[inline]
    pub fn texture(&self) -> &Texture {
        &self.texture
    }

    /// Swaps the texture. Inside a particle container the static attributes
    /// must be invalidated for the change to show up.
    pub fn set_texture(&mut self, texture: Texture) {
        self.texture = texture;
    }
}
