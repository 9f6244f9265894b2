//! The per-frame driver.
//!
//! A frame is built by the scene-graph walk through [`RenderPipeline::enqueue_renderable`],
//! [`RenderPipeline::enqueue_sprite`], [`RenderPipeline::open_container`] and
//! [`RenderPipeline::close_container`], then painted by [`RenderPipeline::draw_frame`].
//! Between frames the engine may probe the mask layer with
//! [`RenderPipeline::probe_position`].
//!
//! ```
//! use pinta::{
//!     DrawImageRequest, ObjectId, PipelineConfig, RenderContext, RenderPipeline, SoftwareContext,
//!     Sprite,
//! };
//!
//! let mut pipeline = RenderPipeline::new(SoftwareContext::new(64, 64), PipelineConfig::default())?;
//! let texture = pipeline.context_mut().upload_texture(1, 1, &[255, 0, 0, 255])?;
//!
//! let request = DrawImageRequest::new(pipeline.sprite_shader(), texture, (1, 1), (8.0, 8.0))
//!     .destination_size(16.0, 16.0);
//! pipeline.enqueue_sprite([8.0, 8.0], Sprite::new(request).with_object(ObjectId(42)));
//!
//! let stats = pipeline.draw_frame()?;
//! assert_eq!(stats.leaves_drawn, 1);
//! assert_eq!(pipeline.probe_position(10.0, 10.0)?, Some(ObjectId(42)));
//! assert_eq!(pipeline.probe_position(40.0, 40.0)?, None);
//! # Ok::<(), pinta::PipelineError>(())
//! ```

#[cfg(feature = "frame_stats_logging")]
use tracing::debug;
use tracing::info;

use crate::config::PipelineConfig;
use crate::context::{GlobalUniforms, ProgramSource, RenderContext};
use crate::error::PipelineError;
use crate::id::{ObjectId, ShaderId};
use crate::renderer::{FrameStats, MaskLayer, RenderQueue, Renderer, Sprite, WorldPoint};
use crate::shader::ShaderLibrary;
use crate::uniforms::Uniforms;

/// Render queue plus everything it draws with.
pub struct RenderPipeline<C: RenderContext + 'static> {
    queue: RenderQueue<Renderer<C>>,
    renderer: Renderer<C>,
}

impl<C: RenderContext + 'static> RenderPipeline<C> {
    pub fn new(mut context: C, config: PipelineConfig) -> Result<Self, PipelineError> {
        if let Some((width, height)) = config.canvas_size() {
            context.resize_drawing_buffer(width, height)?;
        }

        let renderer = Renderer::new(context, config.picking, config.clear_color)?;
        let (width, height) = renderer.context.drawing_buffer_size();
        info!(
            "Render pipeline ready: {}x{} canvas, picking {}",
            width,
            height,
            if config.picking { "on" } else { "off" }
        );

        Ok(Self {
            queue: RenderQueue::new(),
            renderer,
        })
    }

    pub fn context(&self) -> &C {
        self.renderer.context()
    }

    pub fn context_mut(&mut self) -> &mut C {
        self.renderer.context_mut()
    }

    pub fn renderer(&self) -> &Renderer<C> {
        &self.renderer
    }

    pub fn shaders(&self) -> &ShaderLibrary {
        self.renderer.shaders()
    }

    pub fn shaders_mut(&mut self) -> &mut ShaderLibrary {
        self.renderer.shaders_mut()
    }

    pub fn mask(&self) -> Option<&MaskLayer> {
        self.renderer.mask()
    }

    pub fn queue(&self) -> &RenderQueue<Renderer<C>> {
        &self.queue
    }

    pub fn globals(&self) -> &GlobalUniforms {
        self.renderer.globals()
    }

    /// Built-in shader that draws a texture unchanged.
    pub fn sprite_shader(&self) -> ShaderId {
        self.renderer.sprite_shader()
    }

    /// Compiles a shader on the current context.
    pub fn load_shader(
        &mut self,
        source: ProgramSource,
        uniforms: Uniforms,
    ) -> Result<ShaderId, PipelineError> {
        let renderer = &mut self.renderer;
        Ok(renderer
            .shaders
            .load_shader(&mut renderer.context, source, uniforms)?)
    }

    pub fn clear_render_queue(&mut self) {
        self.queue.clear_render_queue();
    }

    /// Queues an arbitrary draw. It receives the renderer and the shaders inherited from the
    /// enclosing containers.
    pub fn enqueue_renderable<F>(&mut self, position: impl Into<WorldPoint>, draw: F)
    where
        F: FnOnce(&mut Renderer<C>, &[ShaderId]) -> Result<(), PipelineError> + 'static,
    {
        self.queue.enqueue_renderable(position, draw);
    }

    /// Queues a sprite: post-processing, the canvas draw and, when it has an object id, the
    /// mask stamp.
    pub fn enqueue_sprite(&mut self, position: impl Into<WorldPoint>, sprite: Sprite) {
        self.queue.enqueue_renderable(
            position,
            move |renderer: &mut Renderer<C>, inherited: &[ShaderId]| {
                renderer.draw_sprite(&sprite, inherited)
            },
        );
    }

    pub fn open_container(&mut self, position: impl Into<WorldPoint>, shaders: &[ShaderId]) {
        self.queue.open_container(position, shaders);
    }

    pub fn close_container(&mut self) -> Result<(), PipelineError> {
        self.queue.close_container()
    }

    /// Clears the canvas and the mask, paints the queue and empties it.
    ///
    /// On error the rest of the frame is skipped; the queue is empty either way.
    pub fn draw_frame(&mut self) -> Result<FrameStats, PipelineError> {
        if let Err(error) = self.renderer.begin_frame() {
            self.queue.clear_render_queue();
            return Err(error.into());
        }

        let queue_stats = self.queue.draw_frame(&mut self.renderer)?;
        let stats = self.renderer.finish_frame(queue_stats);

        #[cfg(feature = "frame_stats_logging")]
        debug!(
            "Frame: {} leaves, {} containers, {} shader passes, {} objects masked",
            stats.leaves_drawn,
            stats.containers_visited,
            stats.shader_passes,
            stats.objects_masked
        );

        Ok(stats)
    }

    /// Object drawn last at canvas pixel `(x, y)` in the previous frame.
    ///
    /// Always `None` with picking disabled or outside the canvas.
    pub fn probe_position(&mut self, x: f32, y: f32) -> Result<Option<ObjectId>, PipelineError> {
        let renderer = &mut self.renderer;
        match renderer.mask.as_mut() {
            Some(mask) => Ok(mask.probe_position(&mut renderer.context, x, y)?),
            None => Ok(None),
        }
    }

    /// Resizes the canvas and the mask layer.
    pub fn resize(&mut self, width: u32, height: u32) -> Result<(), PipelineError> {
        Ok(self.renderer.resize((width, height))?)
    }

    /// Time in seconds exposed to shaders as `globals.time`.
    pub fn set_time(&mut self, time: f32) {
        self.renderer.globals.time = time;
    }

    /// Re-targets the pipeline to `context` and returns the previous one.
    ///
    /// Shaders are compiled on the new context first, under their old ids. If any compile
    /// fails, `context` is dropped and the pipeline keeps running on the old one untouched.
    /// Otherwise native resources of the old context are deleted; scratch and mask targets
    /// are recreated on demand, and the mask keeps its owners until the next frame clears it.
    pub fn set_context(&mut self, mut context: C) -> Result<C, PipelineError> {
        let programs = self.renderer.shaders.compile_all(&mut context)?;

        self.renderer.release_resources();
        let previous = std::mem::replace(&mut self.renderer.context, context);

        let renderer = &mut self.renderer;
        renderer.shaders.retarget_all(programs);

        let size = renderer.context.drawing_buffer_size();
        renderer.globals = renderer.globals.with_resolution(size);
        if let Some(mask) = renderer.mask.as_mut() {
            mask.resize(&mut renderer.context, size)?;
        }

        info!(
            "Re-targeted pipeline to a new context: {}x{} canvas, {} shaders",
            size.0,
            size.1,
            renderer.shaders.len()
        );
        Ok(previous)
    }

    /// Consumes the pipeline, handing back its context.
    pub fn into_context(self) -> C {
        self.renderer.context
    }
}

#[cfg(test)]
mod tests {
    use std::cell::RefCell;
    use std::rc::Rc;

    use super::*;
    use crate::color::Color;
    use crate::debug_tools::DebugContext;
    use crate::draw_image::DrawImageRequest;
    use crate::error::{ContextError, ResourceKind};
    use crate::software::SoftwareContext;

    fn pipeline() -> RenderPipeline<SoftwareContext> {
        RenderPipeline::new(SoftwareContext::new(16, 16), PipelineConfig::default()).unwrap()
    }

    #[test]
    fn config_canvas_size_resizes_the_context() {
        let pipeline = RenderPipeline::new(
            SoftwareContext::new(4, 4),
            PipelineConfig::default().with_canvas_size(40, 30),
        )
        .unwrap();

        assert_eq!(pipeline.context().drawing_buffer_size(), (40, 30));
        assert_eq!(pipeline.mask().unwrap().size(), (40, 30));
        assert_eq!(pipeline.globals().resolution, [40.0, 30.0]);
    }

    #[test]
    fn picking_can_be_disabled() {
        let mut pipeline = RenderPipeline::new(
            SoftwareContext::new(16, 16),
            PipelineConfig::default().with_picking(false),
        )
        .unwrap();
        let texture = pipeline
            .context_mut()
            .upload_texture(1, 1, &[255, 255, 255, 255])
            .unwrap();
        let request = DrawImageRequest::new(pipeline.sprite_shader(), texture, (1, 1), (0.0, 0.0))
            .destination_size(16.0, 16.0);
        pipeline.enqueue_sprite([0.0, 0.0], Sprite::new(request).with_object(ObjectId(1)));

        let stats = pipeline.draw_frame().unwrap();

        assert!(pipeline.mask().is_none());
        assert_eq!(stats.objects_masked, 0);
        assert_eq!(pipeline.probe_position(4.0, 4.0).unwrap(), None);
    }

    #[test]
    fn renderables_receive_the_renderer() {
        let mut pipeline = pipeline();
        let seen = Rc::new(RefCell::new(None));
        let sink = seen.clone();
        pipeline.enqueue_renderable(
            [0.0, 0.0],
            move |renderer: &mut Renderer<SoftwareContext>, _: &[ShaderId]| {
                *sink.borrow_mut() = Some(renderer.context().drawing_buffer_size());
                Ok(())
            },
        );

        pipeline.draw_frame().unwrap();

        assert_eq!(*seen.borrow(), Some((16, 16)));
    }

    #[test]
    fn frames_start_from_the_clear_color() {
        let mut pipeline = RenderPipeline::new(
            SoftwareContext::new(4, 4),
            PipelineConfig::default().with_clear_color(Some(Color::rgb(0, 0, 255))),
        )
        .unwrap();

        pipeline.draw_frame().unwrap();

        let pixel = pipeline.context_mut().read_pixel(2, 2, None).unwrap();
        assert_eq!(pixel, Color::rgb(0, 0, 255));
    }

    #[test]
    fn set_time_reaches_the_globals() {
        let mut pipeline = pipeline();
        pipeline.set_time(1.5);
        assert_eq!(pipeline.globals().time, 1.5);
    }

    #[test]
    fn resize_updates_canvas_mask_and_globals() {
        let mut pipeline = pipeline();
        pipeline.resize(20, 10).unwrap();

        assert_eq!(pipeline.context().drawing_buffer_size(), (20, 10));
        assert_eq!(pipeline.mask().unwrap().size(), (20, 10));
        assert_eq!(pipeline.globals().resolution, [20.0, 10.0]);
    }

    #[test]
    fn failed_retarget_keeps_the_current_context() {
        let mut pipeline = RenderPipeline::new(
            DebugContext::new(SoftwareContext::new(16, 16), "current"),
            PipelineConfig::default(),
        )
        .unwrap();
        let sprite = pipeline.sprite_shader();
        let white = pipeline
            .context_mut()
            .upload_texture(1, 1, &[255, 255, 255, 255])
            .unwrap();
        let request = DrawImageRequest::new(sprite, white, (1, 1), (0.0, 0.0))
            .destination_size(16.0, 16.0);
        pipeline.enqueue_sprite([0.0, 0.0], Sprite::new(request.clone()).with_object(ObjectId(1)));
        pipeline.draw_frame().unwrap();

        let programs_before = pipeline.context().inner().live_programs();
        let textures_before = pipeline.context().inner().live_textures();
        let sprite_program = pipeline.shaders().shader(sprite).unwrap().program();
        let sprite_state = pipeline.shaders().shader(sprite).unwrap().state();
        assert!(pipeline.shaders().len() >= 2);

        let starved = DebugContext::new(SoftwareContext::new(32, 32), "starved").with_program_quota(1);
        let Err(error) = pipeline.set_context(starved) else {
            panic!("compiling past the program quota must fail");
        };

        assert!(matches!(
            error,
            PipelineError::Context(ContextError::ResourceCreation(ResourceKind::Program))
        ));
        assert_eq!(pipeline.context().drawing_buffer_size(), (16, 16));
        assert_eq!(pipeline.globals().resolution, [16.0, 16.0]);
        assert_eq!(pipeline.context().inner().live_programs(), programs_before);
        assert_eq!(pipeline.context().inner().live_textures(), textures_before);
        assert_eq!(pipeline.shaders().shader(sprite).unwrap().program(), sprite_program);
        assert_eq!(pipeline.shaders().shader(sprite).unwrap().state(), sprite_state);

        pipeline.enqueue_sprite([0.0, 0.0], Sprite::new(request).with_object(ObjectId(2)));
        pipeline.draw_frame().unwrap();

        let pixel = pipeline.context_mut().read_pixel(8, 8, None).unwrap();
        assert_eq!(pixel, Color::WHITE);
        assert_eq!(pipeline.probe_position(8.0, 8.0).unwrap(), Some(ObjectId(2)));
    }
}
