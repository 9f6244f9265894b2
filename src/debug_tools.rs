use std::collections::BTreeMap;

use tracing::{debug, trace};

use crate::color::Color;
use crate::context::{DrawCall, ProgramSource, RenderContext};
use crate::error::{ContextError, ResourceKind};
use crate::id::{FramebufferHandle, ProgramHandle, TextureHandle};

/// Wraps a context, tracing every call and counting calls per operation.
///
/// Useful to see what a frame actually sends to the driver:
///
/// ```
/// use pinta::{DebugContext, PipelineConfig, RenderPipeline, SoftwareContext};
///
/// let context = DebugContext::new(SoftwareContext::new(8, 8), "frame-trace");
/// let mut pipeline = RenderPipeline::new(context, PipelineConfig::default())?;
/// pipeline.draw_frame()?;
///
/// assert_eq!(pipeline.context().calls("clear_framebuffer"), 2);
/// # Ok::<(), pinta::PipelineError>(())
/// ```
pub struct DebugContext<C> {
    inner: C,
    label: &'static str,
    calls: BTreeMap<&'static str, usize>,
    program_quota: Option<usize>,
}

impl<C: RenderContext> DebugContext<C> {
    pub fn new(inner: C, label: &'static str) -> Self {
        Self {
            inner,
            label,
            calls: BTreeMap::new(),
            program_quota: None,
        }
    }

    /// Makes `compile_program` fail with [`ContextError::ResourceCreation`] once `programs`
    /// more programs have been compiled. Simulates a driver running out of program objects.
    pub fn with_program_quota(mut self, programs: usize) -> Self {
        self.program_quota = Some(programs);
        self
    }

    pub fn inner(&self) -> &C {
        &self.inner
    }

    pub fn inner_mut(&mut self) -> &mut C {
        &mut self.inner
    }

    pub fn into_inner(self) -> C {
        self.inner
    }

    /// How many times `operation` (a [`RenderContext`] method name) was called.
    pub fn calls(&self, operation: &str) -> usize {
        self.calls.get(operation).copied().unwrap_or(0)
    }

    /// Call counts of every operation seen so far, sorted by name.
    pub fn call_counts(&self) -> impl Iterator<Item = (&'static str, usize)> + '_ {
        self.calls.iter().map(|(name, count)| (*name, *count))
    }

    pub fn reset_counts(&mut self) {
        self.calls.clear();
    }

    /// Logs the call counts at debug level.
    pub fn log_summary(&self) {
        for (operation, count) in &self.calls {
            debug!("[{}] {}: {}", self.label, operation, count);
        }
    }

    fn record(&mut self, operation: &'static str) {
        *self.calls.entry(operation).or_default() += 1;
    }
}

impl<C: RenderContext> RenderContext for DebugContext<C> {
    fn create_framebuffer(&mut self) -> Result<FramebufferHandle, ContextError> {
        self.record("create_framebuffer");
        let result = self.inner.create_framebuffer();
        trace!("[{}] create_framebuffer -> {:?}", self.label, result);
        result
    }

    fn create_texture(&mut self) -> Result<TextureHandle, ContextError> {
        self.record("create_texture");
        let result = self.inner.create_texture();
        trace!("[{}] create_texture -> {:?}", self.label, result);
        result
    }

    fn attach_texture_to_framebuffer(
        &mut self,
        texture: TextureHandle,
        framebuffer: FramebufferHandle,
    ) -> Result<(), ContextError> {
        self.record("attach_texture_to_framebuffer");
        trace!(
            "[{}] attach texture {} to framebuffer {}",
            self.label,
            texture,
            framebuffer
        );
        self.inner.attach_texture_to_framebuffer(texture, framebuffer)
    }

    fn bind_framebuffer(
        &mut self,
        framebuffer: Option<FramebufferHandle>,
        viewport: Option<(u32, u32)>,
    ) -> Result<(), ContextError> {
        self.record("bind_framebuffer");
        trace!(
            "[{}] bind framebuffer {:?} with viewport {:?}",
            self.label,
            framebuffer,
            viewport
        );
        self.inner.bind_framebuffer(framebuffer, viewport)
    }

    fn specify_texture_image(
        &mut self,
        texture: TextureHandle,
        width: u32,
        height: u32,
        data: Option<&[u8]>,
    ) -> Result<(), ContextError> {
        self.record("specify_texture_image");
        trace!(
            "[{}] texture {} is {}x{} ({})",
            self.label,
            texture,
            width,
            height,
            if data.is_some() { "with data" } else { "empty" }
        );
        self.inner
            .specify_texture_image(texture, width, height, data)
    }

    fn clear_framebuffer(
        &mut self,
        framebuffer: Option<FramebufferHandle>,
        color: Color,
    ) -> Result<(), ContextError> {
        self.record("clear_framebuffer");
        trace!("[{}] clear {:?} to {}", self.label, framebuffer, color.key());
        self.inner.clear_framebuffer(framebuffer, color)
    }

    fn compile_program(&mut self, source: &ProgramSource) -> Result<ProgramHandle, ContextError> {
        self.record("compile_program");
        let result = match self.program_quota.as_mut() {
            Some(0) => Err(ContextError::ResourceCreation(ResourceKind::Program)),
            Some(left) => {
                *left -= 1;
                self.inner.compile_program(source)
            }
            None => self.inner.compile_program(source),
        };
        trace!("[{}] compile `{}` -> {:?}", self.label, source.label, result);
        result
    }

    fn draw(&mut self, call: &DrawCall<'_>) -> Result<(), ContextError> {
        self.record("draw");
        trace!(
            "[{}] draw program {} with texture {}{}",
            self.label,
            call.program,
            call.texture,
            if call.uniforms.is_some() { ", uploading uniforms" } else { "" }
        );
        self.inner.draw(call)
    }

    fn read_pixel(
        &mut self,
        x: u32,
        y: u32,
        framebuffer: Option<FramebufferHandle>,
    ) -> Result<Color, ContextError> {
        self.record("read_pixel");
        let result = self.inner.read_pixel(x, y, framebuffer);
        trace!(
            "[{}] read ({}, {}) of {:?} -> {:?}",
            self.label,
            x,
            y,
            framebuffer,
            result
        );
        result
    }

    fn delete_texture(&mut self, texture: TextureHandle) {
        self.record("delete_texture");
        trace!("[{}] delete texture {}", self.label, texture);
        self.inner.delete_texture(texture);
    }

    fn delete_framebuffer(&mut self, framebuffer: FramebufferHandle) {
        self.record("delete_framebuffer");
        trace!("[{}] delete framebuffer {}", self.label, framebuffer);
        self.inner.delete_framebuffer(framebuffer);
    }

    fn delete_program(&mut self, program: ProgramHandle) {
        self.record("delete_program");
        trace!("[{}] delete program {}", self.label, program);
        self.inner.delete_program(program);
    }

    fn drawing_buffer_size(&self) -> (u32, u32) {
        self.inner.drawing_buffer_size()
    }

    fn resize_drawing_buffer(&mut self, width: u32, height: u32) -> Result<(), ContextError> {
        self.record("resize_drawing_buffer");
        trace!("[{}] resize drawing buffer to {}x{}", self.label, width, height);
        self.inner.resize_drawing_buffer(width, height)
    }
}

/// Reads a whole target back, row by row. Slow; meant for inspecting the mask layer or a
/// scratch target in tests and debugging sessions.
pub fn snapshot_target(
    ctx: &mut impl RenderContext,
    framebuffer: Option<FramebufferHandle>,
    size: (u32, u32),
) -> Result<Vec<Color>, ContextError> {
    let mut pixels = Vec::with_capacity(size.0 as usize * size.1 as usize);
    for y in 0..size.1 {
        for x in 0..size.0 {
            pixels.push(ctx.read_pixel(x, y, framebuffer)?);
        }
    }
    Ok(pixels)
}
