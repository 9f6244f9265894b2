use std::cell::Cell;
use std::rc::Rc;

use ahash::{HashMap, HashMapExt};
use tracing::{debug, trace};

use crate::context::{DrawCall, GlobalUniforms, ProgramSource, RenderContext};
use crate::draw_image::DrawImageRequest;
use crate::error::{ContextError, PipelineError};
use crate::id::{ProgramHandle, ShaderId};
use crate::uniforms::Uniforms;

/// Upload state of a shader.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShaderState {
    /// Excluded from shader chains. Drawing with it is an error.
    Inactive,
    /// The uniform bag must be uploaded with the next draw.
    Dirty,
    /// The program already holds the current uniform values.
    Pristine,
}

impl ShaderState {
    pub fn is_active(self) -> bool {
        self != ShaderState::Inactive
    }
}

/// A compiled program plus its uniform bag and upload state.
///
/// Writes through [`Shader::uniforms_mut`] mark an active shader [`ShaderState::Dirty`]:
/// the bag carries an observer installed at construction that flips the shared state cell.
#[derive(Debug)]
pub struct Shader {
    program: ProgramHandle,
    source: ProgramSource,
    uniforms: Uniforms,
    state: Rc<Cell<ShaderState>>,
}

impl Shader {
    pub fn new(program: ProgramHandle, source: ProgramSource, mut uniforms: Uniforms) -> Self {
        let state = Rc::new(Cell::new(ShaderState::Dirty));

        let observed = Rc::clone(&state);
        uniforms.set_observer(Some(Rc::new(move |_: &str| {
            if observed.get().is_active() {
                observed.set(ShaderState::Dirty);
            }
        })));

        Self {
            program,
            source,
            uniforms,
            state,
        }
    }

    pub fn state(&self) -> ShaderState {
        self.state.get()
    }

    pub fn is_active(&self) -> bool {
        self.state().is_active()
    }

    /// Puts the shader back into chains. Its uniforms are re-sent on the next draw.
    pub fn activate(&mut self) {
        self.state.set(ShaderState::Dirty);
    }

    pub fn deactivate(&mut self) {
        self.state.set(ShaderState::Inactive);
    }

    /// Records a successful upload. No-op while inactive.
    pub fn set_pristine(&mut self) {
        if self.is_active() {
            self.state.set(ShaderState::Pristine);
        }
    }

    pub fn program(&self) -> ProgramHandle {
        self.program
    }

    pub fn source(&self) -> &ProgramSource {
        &self.source
    }

    pub fn uniforms(&self) -> &Uniforms {
        &self.uniforms
    }

    pub fn uniforms_mut(&mut self) -> &mut Uniforms {
        &mut self.uniforms
    }

    /// Swaps in a program compiled on another context. The old handle is not deleted.
    pub(crate) fn retarget(&mut self, program: ProgramHandle) {
        self.program = program;
        if self.is_active() {
            self.state.set(ShaderState::Dirty);
        }
    }
}

/// Every shader the pipeline knows about, keyed by [`ShaderId`].
#[derive(Debug, Default)]
pub struct ShaderLibrary {
    shaders: HashMap<ShaderId, Shader>,
    next_id: u64,
}

impl ShaderLibrary {
    pub fn new() -> Self {
        Self {
            shaders: HashMap::new(),
            next_id: 0,
        }
    }

    /// Compiles `source` on `ctx` and registers the resulting shader.
    pub fn load_shader(
        &mut self,
        ctx: &mut impl RenderContext,
        source: ProgramSource,
        uniforms: Uniforms,
    ) -> Result<ShaderId, ContextError> {
        let program = ctx.compile_program(&source)?;

        self.next_id += 1;
        let id = ShaderId(self.next_id);
        debug!("Loaded shader {} ({}) as program {}", id, source.label, program);

        self.shaders.insert(id, Shader::new(program, source, uniforms));
        Ok(id)
    }

    pub fn get(&self, id: ShaderId) -> Option<&Shader> {
        self.shaders.get(&id)
    }

    pub fn get_mut(&mut self, id: ShaderId) -> Option<&mut Shader> {
        self.shaders.get_mut(&id)
    }

    /// Looks a shader up, failing with [`PipelineError::UnknownShader`].
    pub fn shader(&self, id: ShaderId) -> Result<&Shader, PipelineError> {
        self.get(id).ok_or(PipelineError::UnknownShader(id))
    }

    pub fn shader_mut(&mut self, id: ShaderId) -> Result<&mut Shader, PipelineError> {
        self.get_mut(id).ok_or(PipelineError::UnknownShader(id))
    }

    pub fn is_active(&self, id: ShaderId) -> bool {
        self.get(id).is_some_and(Shader::is_active)
    }

    pub fn unload_shader(&mut self, ctx: &mut impl RenderContext, id: ShaderId) -> Option<Shader> {
        let shader = self.shaders.remove(&id)?;
        ctx.delete_program(shader.program);
        Some(shader)
    }

    pub fn len(&self) -> usize {
        self.shaders.len()
    }

    pub fn is_empty(&self) -> bool {
        self.shaders.is_empty()
    }

    /// Deletes the native program of every shader. The shaders stay registered and are
    /// unusable until [`ShaderLibrary::recompile_all`].
    pub(crate) fn release_programs(&mut self, ctx: &mut impl RenderContext) {
        for shader in self.shaders.values() {
            ctx.delete_program(shader.program);
        }
    }

    /// Compiles every shader again on `ctx`. Ids, uniform bags and activation survive.
    ///
    /// Either every shader is retargeted or, on failure, none is.
    pub fn recompile_all(&mut self, ctx: &mut impl RenderContext) -> Result<(), ContextError> {
        let programs = self.compile_all(ctx)?;
        self.retarget_all(programs);
        Ok(())
    }

    /// Compiles every shader's source on `ctx` without touching the library.
    ///
    /// On failure the programs already compiled are deleted from `ctx` before the error is
    /// returned.
    pub(crate) fn compile_all(
        &self,
        ctx: &mut impl RenderContext,
    ) -> Result<Vec<(ShaderId, ProgramHandle)>, ContextError> {
        let mut programs = Vec::with_capacity(self.shaders.len());
        for (&id, shader) in &self.shaders {
            match ctx.compile_program(&shader.source) {
                Ok(program) => programs.push((id, program)),
                Err(error) => {
                    for (_, program) in programs {
                        ctx.delete_program(program);
                    }
                    return Err(error);
                }
            }
        }
        Ok(programs)
    }

    /// Points each listed shader at its new program.
    pub(crate) fn retarget_all(&mut self, programs: Vec<(ShaderId, ProgramHandle)>) {
        for (id, program) in programs {
            if let Some(shader) = self.shaders.get_mut(&id) {
                debug!("Recompiled shader {} as program {}", id, program);
                shader.retarget(program);
            }
        }
    }

    /// Draws `request` into the bound framebuffer with the request's shader.
    ///
    /// Uniforms travel with the draw only while the shader is dirty. On success the shader
    /// becomes pristine.
    pub fn draw_image(
        &mut self,
        ctx: &mut impl RenderContext,
        request: &DrawImageRequest,
        globals: &GlobalUniforms,
    ) -> Result<(), PipelineError> {
        let shader = self.shader_mut(request.shader)?;

        let uniforms = match shader.state() {
            ShaderState::Inactive => return Err(PipelineError::InactiveShader(request.shader)),
            ShaderState::Dirty => Some(&shader.uniforms),
            ShaderState::Pristine => None,
        };

        trace!(
            "Drawing texture {} with shader {} (upload: {})",
            request.texture,
            request.shader,
            uniforms.is_some()
        );

        ctx.draw(&DrawCall {
            program: shader.program,
            uniforms,
            globals,
            texture: request.texture,
            geometry: request.quad(),
        })?;

        shader.set_pristine();
        Ok(())
    }
}
