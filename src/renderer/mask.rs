use ahash::{HashMap, HashMapExt};

use super::color_allocator::ColorAllocator;
use super::compositor::{ensure_target, RenderTarget};
use super::*;
use crate::color::ColorKey;
use crate::context::ProgramSource;
use crate::uniforms::Uniforms;

/// Hidden render target for color-ID picking.
///
/// Every stamped object is drawn a second time in a flat color nobody else holds since the
/// last [`MaskLayer::clear_mask_layer`]. Reading one pixel back then tells which object
/// painted it last.
#[derive(Debug)]
pub struct MaskLayer {
    target: Option<RenderTarget>,
    size: (u32, u32),
    shader: ShaderId,
    allocator: ColorAllocator,
    /// Color taken for a stamp that failed. The next stamp reuses it.
    pending: Option<Color>,
    owners: HashMap<ColorKey, ObjectId>,
}

impl MaskLayer {
    /// Loads the flat-color shader into `shaders`. The target itself is created lazily.
    pub fn new(
        ctx: &mut impl RenderContext,
        shaders: &mut ShaderLibrary,
        size: (u32, u32),
    ) -> Result<Self, ContextError> {
        let shader = shaders.load_shader(
            ctx,
            ProgramSource::flat_color(),
            Uniforms::new().with("u_color", Color::BLACK),
        )?;

        Ok(Self {
            target: None,
            size,
            shader,
            allocator: ColorAllocator::new(),
            pending: None,
            owners: HashMap::new(),
        })
    }

    pub fn size(&self) -> (u32, u32) {
        self.size
    }

    /// The flat-color shader stamps are drawn with.
    pub fn shader(&self) -> ShaderId {
        self.shader
    }

    pub fn target(&self) -> Option<&RenderTarget> {
        self.target.as_ref()
    }

    /// Objects stamped since the last clear.
    pub fn object_count(&self) -> usize {
        self.owners.len()
    }

    pub fn owner_of(&self, color: Color) -> Option<ObjectId> {
        self.owners.get(&color.key()).copied()
    }

    /// Clears the target to transparent, forgets every owner and restarts color allocation.
    pub fn clear_mask_layer(&mut self, ctx: &mut impl RenderContext) -> Result<(), ContextError> {
        let target = ensure_target(&mut self.target, ctx, self.size, "mask")?;
        ctx.clear_framebuffer(Some(target.framebuffer), Color::TRANSPARENT)?;
        self.owners.clear();
        self.allocator.reset();
        self.pending = None;
        Ok(())
    }

    /// Draws `request`'s geometry into the mask in a fresh color owned by `object`.
    ///
    /// Coverage comes from the request's texture: texels with zero alpha are not stamped.
    /// Fails with [`PipelineError::ColorSpaceExhausted`] once every color is taken. A stamp
    /// that fails for any other reason gives its color to the next stamp.
    pub fn add_object_to_mask_layer(
        &mut self,
        ctx: &mut impl RenderContext,
        shaders: &mut ShaderLibrary,
        object: ObjectId,
        request: &DrawImageRequest,
        globals: &GlobalUniforms,
    ) -> Result<Color, PipelineError> {
        let color = match self.pending.or_else(|| self.allocator.next_color()) {
            Some(color) => color,
            None => {
                return Err(PipelineError::ColorSpaceExhausted {
                    allocated: self.allocator.allocated(),
                })
            }
        };
        self.pending = Some(color);

        shaders
            .shader_mut(self.shader)?
            .uniforms_mut()
            .set("u_color", color);

        let target = ensure_target(&mut self.target, ctx, self.size, "mask")?;
        target.bind(ctx)?;
        let stamp = request.clone().with_shader(self.shader);
        shaders.draw_image(ctx, &stamp, &globals.with_resolution(self.size))?;

        trace!("Stamped object {} into the mask as {}", object, color.key());
        self.pending = None;
        self.owners.insert(color.key(), object);
        Ok(color)
    }

    /// Object whose stamp covers pixel `(x, y)`, if any.
    pub fn probe_position(
        &mut self,
        ctx: &mut impl RenderContext,
        x: f32,
        y: f32,
    ) -> Result<Option<ObjectId>, ContextError> {
        let (width, height) = self.size;
        if !(x >= 0.0 && y >= 0.0 && x < width as f32 && y < height as f32) {
            warn!("Probe at ({}, {}) is outside the {}x{} mask", x, y, width, height);
            return Ok(None);
        }

        let Some(target) = self.target else {
            return Ok(None);
        };

        let pixel = ctx.read_pixel(x as u32, y as u32, Some(target.framebuffer))?;
        if pixel.alpha() == 0 {
            return Ok(None);
        }

        let owner = self.owners.get(&pixel.key()).copied();
        trace!("Probe at ({}, {}) read {} -> {:?}", x, y, pixel.key(), owner);
        Ok(owner)
    }

    /// Changes the mask size. The contents are dropped; owners stay until the next clear.
    pub fn resize(
        &mut self,
        ctx: &mut impl RenderContext,
        size: (u32, u32),
    ) -> Result<(), ContextError> {
        self.size = size;
        if let Some(target) = self.target.as_mut() {
            target.resize(ctx, size)?;
        }
        Ok(())
    }

    /// Deletes the GPU target. It is recreated on the next clear or stamp.
    pub fn release(&mut self, ctx: &mut impl RenderContext) {
        if let Some(target) = self.target.take() {
            target.release(ctx);
        }
    }
}
