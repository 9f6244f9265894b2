use smallvec::SmallVec;
use tracing::{debug, trace, warn};

use crate::color::Color;
use crate::context::{GlobalUniforms, RenderContext};
use crate::draw_image::DrawImageRequest;
use crate::error::{ContextError, PipelineError};
use crate::id::{FramebufferHandle, ObjectId, ShaderId, TextureHandle};
use crate::shader::ShaderLibrary;

mod color_allocator;
mod compositor;
mod draw_queue;
mod mask;
mod traversal;

pub use color_allocator::{ColorAllocator, COLOR_CAPACITY};
pub use compositor::{Composited, RenderTarget, ShaderPipeline};
pub use draw_queue::{DrawFn, QueueStats, RenderQueue, ShaderChain, WorldPoint, WorldSpace};
pub use mask::MaskLayer;

use traversal::{execute_level, plan_paint_order};

/// A textured quad queued for drawing, with its own post-processing chain and an optional
/// pick identity.
#[derive(Debug, Clone)]
pub struct Sprite {
    pub request: DrawImageRequest,
    pub shaders: ShaderChain,
    pub object: Option<ObjectId>,
}

impl Sprite {
    pub fn new(request: DrawImageRequest) -> Self {
        Self {
            request,
            shaders: ShaderChain::new(),
            object: None,
        }
    }

    pub fn with_shaders(mut self, shaders: &[ShaderId]) -> Self {
        self.shaders = ShaderChain::from_slice(shaders);
        self
    }

    /// Makes the sprite pickable as `object`.
    pub fn with_object(mut self, object: ObjectId) -> Self {
        self.object = Some(object);
        self
    }
}

/// What one frame did.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FrameStats {
    pub leaves_drawn: usize,
    pub containers_visited: usize,
    pub shader_passes: usize,
    pub objects_masked: usize,
}

/// Draw-time state handed to every queued leaf: the context and everything that renders
/// through it.
pub struct Renderer<C: RenderContext> {
    pub(crate) context: C,
    pub(crate) shaders: ShaderLibrary,
    pub(crate) compositor: ShaderPipeline,
    pub(crate) mask: Option<MaskLayer>,
    pub(crate) sprite_shader: ShaderId,
    pub(crate) globals: GlobalUniforms,
    pub(crate) clear_color: Option<Color>,
    frame: FrameStats,
}

impl<C: RenderContext> Renderer<C> {
    pub(crate) fn new(
        mut context: C,
        picking: bool,
        clear_color: Option<Color>,
    ) -> Result<Self, ContextError> {
        let mut shaders = ShaderLibrary::new();
        let sprite_shader = shaders.load_shader(
            &mut context,
            crate::context::ProgramSource::sprite(),
            crate::uniforms::Uniforms::new(),
        )?;

        let canvas_size = context.drawing_buffer_size();
        let mask = if picking {
            Some(MaskLayer::new(&mut context, &mut shaders, canvas_size)?)
        } else {
            None
        };

        Ok(Self {
            context,
            shaders,
            compositor: ShaderPipeline::new(),
            mask,
            sprite_shader,
            globals: GlobalUniforms::new(canvas_size, 0.0),
            clear_color,
            frame: FrameStats::default(),
        })
    }

    pub fn context(&self) -> &C {
        &self.context
    }

    pub fn context_mut(&mut self) -> &mut C {
        &mut self.context
    }

    pub fn shaders(&self) -> &ShaderLibrary {
        &self.shaders
    }

    pub fn shaders_mut(&mut self) -> &mut ShaderLibrary {
        &mut self.shaders
    }

    pub fn mask(&self) -> Option<&MaskLayer> {
        self.mask.as_ref()
    }

    pub fn globals(&self) -> &GlobalUniforms {
        &self.globals
    }

    /// Built-in shader that draws a texture unchanged.
    pub fn sprite_shader(&self) -> ShaderId {
        self.sprite_shader
    }

    /// Draws `request` onto the canvas as is.
    pub fn draw_image(&mut self, request: &DrawImageRequest) -> Result<(), PipelineError> {
        let canvas_size = self.context.drawing_buffer_size();
        self.context.bind_framebuffer(None, Some(canvas_size))?;
        let globals = self.globals.with_resolution(canvas_size);
        self.shaders.draw_image(&mut self.context, request, &globals)
    }

    /// Post-processes, draws and stamps one sprite.
    ///
    /// The effective chain is the sprite's own shaders followed by `inherited`.
    pub fn draw_sprite(
        &mut self,
        sprite: &Sprite,
        inherited: &[ShaderId],
    ) -> Result<(), PipelineError> {
        let mut chain = sprite.shaders.clone();
        chain.extend_from_slice(inherited);

        let composited = self.compositor.apply(
            &mut self.context,
            &mut self.shaders,
            sprite.request.texture,
            sprite.request.texture_size(),
            &chain,
            &self.globals,
        )?;
        self.frame.shader_passes += composited.passes;

        let request = sprite.request.clone().with_texture(composited.texture);
        self.draw_image(&request)?;

        if let (Some(object), Some(mask)) = (sprite.object, self.mask.as_mut()) {
            mask.add_object_to_mask_layer(
                &mut self.context,
                &mut self.shaders,
                object,
                &request,
                &self.globals,
            )?;
            self.frame.objects_masked += 1;
        }

        Ok(())
    }

    /// Clears the canvas and the mask for a new frame.
    pub(crate) fn begin_frame(&mut self) -> Result<(), ContextError> {
        self.frame = FrameStats::default();

        if let Some(color) = self.clear_color {
            self.context.clear_framebuffer(None, color)?;
        }
        if let Some(mask) = self.mask.as_mut() {
            mask.clear_mask_layer(&mut self.context)?;
        }
        Ok(())
    }

    pub(crate) fn finish_frame(&mut self, queue: QueueStats) -> FrameStats {
        self.frame.leaves_drawn = queue.leaves_drawn;
        self.frame.containers_visited = queue.containers_visited;
        self.frame
    }

    /// Deletes every native resource the renderer owns on its current context.
    pub(crate) fn release_resources(&mut self) {
        self.compositor.release(&mut self.context);
        if let Some(mask) = self.mask.as_mut() {
            mask.release(&mut self.context);
        }
        self.shaders.release_programs(&mut self.context);
    }

    pub(crate) fn resize(&mut self, size: (u32, u32)) -> Result<(), ContextError> {
        self.context.resize_drawing_buffer(size.0, size.1)?;
        self.globals = self.globals.with_resolution(size);
        if let Some(mask) = self.mask.as_mut() {
            mask.resize(&mut self.context, size)?;
        }
        debug!("Resized canvas to {}x{}", size.0, size.1);
        Ok(())
    }
}
