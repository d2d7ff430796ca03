use crate::coords::Matrix;
use crate::device::GenerationSlot;
use crate::error::{RenderError, RenderResult};
use crate::paint::BlendMode;
use crate::render::particles::{ParticleBufferSet, ParticleRenderer};
use crate::render::Renderer;

use super::{DisplayObject, Sprite, Transform};

pub const DEFAULT_MAX_SIZE: usize = 1500;
pub const DEFAULT_BATCH_SIZE: usize = 16384;
/// Largest chunk addressable with u16 indices (4 vertices per quad).
pub const MAX_BATCH_SIZE: usize = 16384;

/// Which particle attributes are re-uploaded every frame.
///
/// Static attributes are uploaded once per chunk and again only after the
/// container is invalidated.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct ParticleProperties {
    /// Quad geometry from texture size, trim, anchor and scale.
    pub vertices: bool,
    pub position: bool,
    pub rotation: bool,
    pub uvs: bool,
    pub alpha: bool,
}

impl Default for ParticleProperties {
    fn default() -> Self {
        Self { vertices: false, position: true, rotation: true, uvs: false, alpha: true }
    }
}

/// A flat list of sprites sharing one base texture, drawn in batches.
///
/// Children are not transformed individually: each sprite's position,
/// rotation and scale are streamed to the GPU and the container's world
/// transform is applied once for the whole batch.
pub struct ParticleContainer {
    pub transform: Transform,
    pub alpha: f32,
    pub visible: bool,
    pub blend_mode: BlendMode,

    pub(crate) children: Vec<Sprite>,
    pub(crate) max_size: usize,
    pub(crate) batch_size: usize,
    pub(crate) properties: ParticleProperties,
    /// First chunk whose static attributes must be uploaded.
    pub(crate) buffer_to_update: usize,
    pub(crate) buffers: GenerationSlot<ParticleBufferSet>,

    pub(crate) world_transform: Matrix,
    pub(crate) world_alpha: f32,
}

impl Default for ParticleContainer {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_SIZE)
    }
}

impl ParticleContainer {
    /// A container drawing at most `max_size` children.
    pub fn new(max_size: usize) -> Self {
        let max_size = max_size.max(1);
        Self {
            transform: Transform::default(),
            alpha: 1.0,
            visible: true,
            blend_mode: BlendMode::Normal,
            children: Vec::new(),
            max_size,
            batch_size: DEFAULT_BATCH_SIZE.min(max_size),
            properties: ParticleProperties::default(),
            buffer_to_update: 0,
            buffers: GenerationSlot::default(),
            world_transform: Matrix::IDENTITY,
            world_alpha: 1.0,
        }
    }

    /// Sets the chunk size, clamped to `1..=MAX_BATCH_SIZE` and to `max_size`.
    ///
    /// Live buffers laid out for the previous size stay owned by the
    /// container; the next render releases them before allocating new ones.
    #[must_use]
    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        let batch_size = batch_size.clamp(1, MAX_BATCH_SIZE).min(self.max_size);
        if batch_size != self.batch_size {
            self.batch_size = batch_size;
            self.buffer_to_update = 0;
        }
        self
    }

    #[must_use]
    pub fn with_properties(mut self, properties: ParticleProperties) -> Self {
        self.set_properties(properties);
        self
    }

    #[inline]
    pub fn max_size(&self) -> usize {
        self.max_size
    }

    #[inline]
    pub fn batch_size(&self) -> usize {
        self.batch_size
    }

    #[inline]
    pub fn properties(&self) -> ParticleProperties {
        self.properties
    }

    /// Changes the dynamic/static split. Buffers are rebuilt on the next render.
    pub fn set_properties(&mut self, properties: ParticleProperties) {
        if properties != self.properties {
            self.properties = properties;
            self.buffer_to_update = 0;
        }
    }

    /// Number of chunks the container is split into.
    pub fn chunk_count(&self) -> usize {
        self.max_size.div_ceil(self.batch_size)
    }

    /// First chunk whose static attributes are stale.
    #[inline]
    pub fn static_watermark(&self) -> usize {
        self.buffer_to_update
    }

    pub fn children(&self) -> &[Sprite] {
        &self.children
    }

    /// Mutable access for per-frame updates of dynamic attributes.
    ///
    /// Changes to static attributes need [`invalidate_static`](Self::invalidate_static).
    pub fn children_mut(&mut self) -> &mut [Sprite] {
        &mut self.children
    }

    pub fn len(&self) -> usize {
        self.children.len()
    }

    pub fn is_empty(&self) -> bool {
        self.children.is_empty()
    }

    pub fn add_child(&mut self, sprite: Sprite) -> usize {
        self.children.push(sprite);
        let index = self.children.len() - 1;
        self.on_children_change(index);
        index
    }

    pub fn insert_child(&mut self, index: usize, sprite: Sprite) -> RenderResult<()> {
        if index > self.children.len() {
            return Err(RenderError::InvalidResource(format!(
                "child index {index} out of bounds ({} children)",
                self.children.len()
            )));
        }
        self.children.insert(index, sprite);
        self.on_children_change(index);
        Ok(())
    }

    pub fn remove_child(&mut self, index: usize) -> Option<Sprite> {
        if index >= self.children.len() {
            return None;
        }
        let sprite = self.children.remove(index);
        self.on_children_change(index);
        Some(sprite)
    }

    pub fn clear_children(&mut self) {
        self.children.clear();
        self.on_children_change(0);
    }

    /// Marks static attributes stale from child `from` onwards.
    pub fn invalidate_static(&mut self, from: usize) {
        self.on_children_change(from);
    }

    fn on_children_change(&mut self, smallest_index: usize) {
        let chunk = smallest_index / self.batch_size;
        if chunk < self.buffer_to_update {
            self.buffer_to_update = chunk;
        }
    }

    /// Deletes this container's GPU buffers.
    ///
    /// Buffers from an earlier context generation are simply dropped.
    pub fn release_buffers(&mut self, renderer: &mut Renderer) -> RenderResult<()> {
        let (device, generation) = renderer.device_and_generation()?;
        let live = self.buffers.is_live(generation);
        if let Some((_, mut set)) = self.buffers.take() {
            if live {
                for b in &mut set.buffers {
                    b.destroy(device)?;
                }
            }
        }
        self.buffer_to_update = 0;
        Ok(())
    }
}

impl DisplayObject for ParticleContainer {
    fn update_transform(&mut self, parent: &Matrix, parent_alpha: f32) {
        self.world_transform = self.transform.world_matrix(parent);
        self.world_alpha = self.alpha * parent_alpha;
    }

    fn world_transform(&self) -> Matrix {
        self.world_transform
    }

    fn world_alpha(&self) -> f32 {
        self.world_alpha
    }

    fn visible(&self) -> bool {
        self.visible
    }

    fn render_using(&mut self, renderer: &mut Renderer) -> RenderResult<()> {
        if !self.visible || self.world_alpha <= 0.0 || self.children.is_empty() {
            return Ok(());
        }
        let plugin = renderer
            .plugin::<ParticleRenderer>(ParticleRenderer::NAME)
            .ok_or(RenderError::UnknownPlugin(ParticleRenderer::NAME))?;
        renderer.render_object(plugin, self)
    }
}

#[cfg(test)]
mod tests {
    use std::rc::Rc;

    use super::*;
    use crate::paint::Color;
    use crate::texture::{BaseTexture, Texture};

    fn sprite() -> Sprite {
        let base = Rc::new(BaseTexture::solid(1, 1, Color::white()).unwrap());
        Sprite::new(Texture::from_base(base))
    }

    #[test]
    fn batch_size_is_clamped() {
        assert_eq!(ParticleContainer::new(100).batch_size(), 100);
        assert_eq!(ParticleContainer::new(100).with_batch_size(0).batch_size(), 1);
        assert_eq!(ParticleContainer::new(100_000).with_batch_size(1 << 20).batch_size(), MAX_BATCH_SIZE);
        assert_eq!(ParticleContainer::default().max_size(), DEFAULT_MAX_SIZE);
    }

    #[test]
    fn chunk_count_rounds_up() {
        assert_eq!(ParticleContainer::new(40).with_batch_size(10).chunk_count(), 4);
        assert_eq!(ParticleContainer::new(41).with_batch_size(10).chunk_count(), 5);
    }

    #[test]
    fn children_changes_lower_the_watermark() {
        let mut c = ParticleContainer::new(40).with_batch_size(10);
        c.buffer_to_update = 4;
        for _ in 0..25 {
            c.add_child(sprite());
        }
        // The first add (index 0) already lowered it to chunk 0.
        assert_eq!(c.static_watermark(), 0);

        c.buffer_to_update = 4;
        c.remove_child(23);
        assert_eq!(c.static_watermark(), 2);
        c.invalidate_static(15);
        assert_eq!(c.static_watermark(), 1);
        assert!(c.insert_child(30, sprite()).is_err());
    }

    #[test]
    fn changing_properties_resets_the_watermark() {
        let mut c = ParticleContainer::new(10);
        c.buffer_to_update = 1;
        c.set_properties(ParticleProperties::default());
        assert_eq!(c.static_watermark(), 1);
        c.set_properties(ParticleProperties { uvs: true, ..ParticleProperties::default() });
        assert_eq!(c.static_watermark(), 0);
    }
}
