//! Scene-graph contract consumed by the renderer.
//!
//! This module is responsible for:
//! - the [`DisplayObject`] trait: transform update plus `render_using`
//! - a plain [`Container`] for grouping objects
//! - [`ParticleContainer`], a flat list of [`Sprite`]s drawn in batches

mod container;
mod display;
mod particle_container;
mod sprite;
mod transform;

pub use container::Container;
pub use display::DisplayObject;
pub use particle_container::{DEFAULT_BATCH_SIZE, DEFAULT_MAX_SIZE, MAX_BATCH_SIZE, ParticleContainer, ParticleProperties};
pub use sprite::Sprite;
pub use transform::Transform;
