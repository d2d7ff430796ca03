//! Batched rendering of particle containers.
//!
//! Every sprite of a container becomes one quad. Quads are packed into
//! `batch_size` chunks, each backed by a [`ParticleBuffer`] and drawn with a
//! single indexed draw call.

mod buffer;
mod program;
mod renderer;

pub use buffer::ParticleBuffer;
pub use renderer::ParticleRenderer;

pub(crate) use program::quad_corners;

use crate::scene::ParticleProperties;

/// The buffers of one container, with the flags and chunk size they were
/// laid out for.
#[derive(Debug)]
pub(crate) struct ParticleBufferSet {
    pub properties: ParticleProperties,
    pub batch_size: usize,
    pub buffers: Vec<ParticleBuffer>,
}
