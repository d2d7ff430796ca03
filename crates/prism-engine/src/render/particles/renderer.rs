use std::any::Any;

use crate::device::{ContextGeneration, DrawCall, GpuDevice, UniformValue};
use crate::error::{RenderError, RenderResult};
use crate::render::{ObjectRenderer, RenderContext, RenderObject, Shader};
use crate::scene::ParticleContainer;

use super::ParticleBufferSet;
use super::buffer::ParticleBuffer;
use super::program::{self, ParticleProperty};

/// Object renderer for [`ParticleContainer`]s.
///
/// Draws immediately in [`render`](RenderObject::render); `flush` has
/// nothing to do.
#[derive(Debug, Default)]
pub struct ParticleRenderer {
    shader: Option<Shader>,
    properties: Vec<ParticleProperty>,
}

impl ParticleRenderer {
    pub const NAME: &'static str = "particle";

    pub fn new() -> Self {
        Self::default()
    }

    fn shader_mut(&mut self) -> RenderResult<&mut Shader> {
        self.shader
            .as_mut()
            .ok_or_else(|| RenderError::Device("particle shader used before context setup".to_owned()))
    }
}

impl ObjectRenderer for ParticleRenderer {
    fn name(&self) -> &'static str {
        Self::NAME
    }

    fn on_context_change(&mut self, _ctx: &mut RenderContext<'_>) -> RenderResult<()> {
        self.shader = Some(Shader::new(&program::PARTICLE_PROGRAM));
        self.properties = program::property_table();
        Ok(())
    }

    fn start(&mut self, ctx: &mut RenderContext<'_>) -> RenderResult<()> {
        let shader = self.shader_mut()?;
        ctx.bind_shader(shader)?;
        Ok(())
    }

    fn destroy(&mut self, device: &mut dyn GpuDevice, generation: ContextGeneration) {
        if let Some(mut shader) = self.shader.take() {
            if let Err(e) = shader.destroy(device, generation) {
                log::warn!("ParticleRenderer: failed to release shader: {e}");
            }
        }
        self.properties.clear();
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}

impl RenderObject<ParticleContainer> for ParticleRenderer {
    fn render(&mut self, ctx: &mut RenderContext<'_>, container: &mut ParticleContainer) -> RenderResult<()> {
        let total = container.children.len().min(container.max_size);
        if total == 0 {
            return Ok(());
        }
        let children = &container.children[..total];

        let base = children[0].texture().base().clone();
        if let Some(i) = children.iter().position(|c| c.texture().base().uid() != base.uid()) {
            log::warn!("ParticleRenderer: child {i} uses another base texture; container skipped");
            return Err(RenderError::BatchConstraint(format!(
                "particle child {i} does not share base texture {}",
                base.uid()
            )));
        }

        let generation = ctx.generation();
        let batch_size = container.batch_size;
        let flags = container.properties;

        // Buffers from a dead generation are gone with it; live ones laid out
        // for other flags or another chunk size are released first.
        let mut fresh = !container.buffers.is_live(generation);
        if let Some(set) = container.buffers.get_mut(generation) {
            if set.properties != flags || set.batch_size != batch_size {
                for b in &mut set.buffers {
                    b.destroy(ctx.device())?;
                }
                container.buffers.take();
                fresh = true;
            }
        }
        let table = &self.properties;
        let set = container.buffers.get_or_try_insert(generation, || {
            let chunks = container.max_size.div_ceil(batch_size);
            let mut buffers = Vec::with_capacity(chunks);
            for _ in 0..chunks {
                buffers.push(ParticleBuffer::new(ctx.device(), table, &flags, batch_size)?);
            }
            log::debug!("ParticleRenderer: allocated {chunks} buffers of {batch_size} quads");
            Ok::<_, RenderError>(ParticleBufferSet { properties: flags, batch_size, buffers })
        })?;
        if fresh {
            container.buffer_to_update = 0;
        }

        ctx.set_blend_mode(container.blend_mode);

        let mut m = container.world_transform;
        m.prepend(&ctx.projection());

        let shader = self.shader_mut()?;
        let program = ctx.bind_shader(shader)?;
        shader.set_uniform(program::PROJECTION_MATRIX, UniformValue::Mat3(m.to_array(true)));
        shader.set_uniform(program::ALPHA, UniformValue::Float(container.world_alpha));

        let textures = [ctx.bind_texture(&base, 0)?];
        let blend_mode = ctx.blend_mode();
        let watermark = container.buffer_to_update;

        for (j, chunk) in children.chunks(batch_size).enumerate() {
            let Some(buffer) = set.buffers.get_mut(j) else { break };

            buffer.upload_dynamic(ctx.device(), chunk)?;
            ctx.stats_mut().dynamic_uploads += 1;

            if j == watermark {
                buffer.upload_static(ctx.device(), chunk)?;
                ctx.stats_mut().static_uploads += 1;
                container.buffer_to_update = j + 1;
            }

            let bindings = buffer.bindings();
            ctx.draw(&DrawCall {
                program,
                uniforms: shader.uniforms(),
                textures: &textures,
                vertex_buffers: &bindings,
                index_buffer: buffer.index_buffer(),
                index_count: (chunk.len() * 6) as u32,
                blend_mode,
            })?;
        }

        log::trace!("ParticleRenderer: drew {total} particles");
        Ok(())
    }
}
