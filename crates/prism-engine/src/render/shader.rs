use crate::device::{ContextGeneration, GpuDevice, GpuHandle, ProgramDesc, Tagged, UniformSet, UniformValue};
use crate::error::RenderResult;

/// A program description plus the uniform values it is drawn with.
///
/// The compiled program is tagged with its context generation and rebuilt
/// lazily after a context restore.
#[derive(Debug)]
pub struct Shader {
    desc: &'static ProgramDesc,
    program: Option<Tagged>,
    uniforms: UniformSet,
}

impl Shader {
    pub fn new(desc: &'static ProgramDesc) -> Self {
        Self { desc, program: None, uniforms: UniformSet::new() }
    }

    #[inline]
    pub fn desc(&self) -> &'static ProgramDesc {
        self.desc
    }

    /// Compiled program for `generation`, compiling it if needed.
    pub fn program(&mut self, device: &mut dyn GpuDevice, generation: ContextGeneration) -> RenderResult<GpuHandle> {
        if let Some(handle) = self.program.and_then(|t| t.live(generation)) {
            return Ok(handle);
        }
        let handle = device.create_program(self.desc)?;
        log::debug!("Shader: compiled `{}` for generation {}", self.desc.label, generation.get());
        self.program = Some(Tagged::new(generation, handle));
        Ok(handle)
    }

    #[inline]
    pub fn is_live(&self, generation: ContextGeneration) -> bool {
        self.program.is_some_and(|t| t.generation == generation)
    }

    pub fn set_uniform(&mut self, name: &'static str, value: UniformValue) {
        self.uniforms.set(name, value);
    }

    #[inline]
    pub fn uniforms(&self) -> &UniformSet {
        &self.uniforms
    }

    pub fn destroy(&mut self, device: &mut dyn GpuDevice, generation: ContextGeneration) -> RenderResult<()> {
        match self.program.take().and_then(|t| t.live(generation)) {
            Some(handle) => device.delete_program(handle),
            None => Ok(()),
        }
    }
}
