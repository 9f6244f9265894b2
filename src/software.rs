//! Deterministic CPU implementation of [`RenderContext`].
//!
//! Textures are RGBA8 with premultiplied alpha, sampled nearest. Quads are rasterized by
//! mapping each covered pixel center back into the unit square, so rotated and flipped
//! draws hit exactly the texels a GPU would at the same sample positions. Programs run
//! their [`CpuFragment`](crate::CpuFragment).

use ahash::{HashMap, HashMapExt};
use euclid::Point2D;
use tracing::{debug, trace};

use crate::color::Color;
use crate::context::{
    validate_texture_data, BlendMode, DrawCall, FragmentInput, ProgramSource, RenderContext,
};
use crate::error::{ContextError, ResourceKind};
use crate::id::{FramebufferHandle, HandleAllocator, ProgramHandle, TextureHandle};
use crate::uniforms::Uniforms;

#[derive(Debug, Clone, Default)]
struct Texture {
    width: u32,
    height: u32,
    pixels: Vec<u8>,
}

impl Texture {
    fn new(width: u32, height: u32, data: Option<&[u8]>) -> Self {
        let pixels = match data {
            Some(bytes) => bytes.to_vec(),
            None => vec![0; width as usize * height as usize * 4],
        };
        Self {
            width,
            height,
            pixels,
        }
    }

    fn offset(&self, x: u32, y: u32) -> usize {
        (y as usize * self.width as usize + x as usize) * 4
    }

    fn pixel(&self, x: u32, y: u32) -> Color {
        let offset = self.offset(x, y);
        let mut rgba = [0; 4];
        rgba.copy_from_slice(&self.pixels[offset..offset + 4]);
        Color(rgba)
    }

    fn set_pixel(&mut self, x: u32, y: u32, color: Color) {
        let offset = self.offset(x, y);
        self.pixels[offset..offset + 4].copy_from_slice(&color.0);
    }

    fn fill(&mut self, color: Color) {
        for pixel in self.pixels.chunks_exact_mut(4) {
            pixel.copy_from_slice(&color.0);
        }
    }

    /// Nearest-neighbor sample with clamp-to-edge addressing.
    fn sample(&self, uv: [f32; 2]) -> [f32; 4] {
        if self.width == 0 || self.height == 0 {
            return [0.0; 4];
        }
        let texel = |coordinate: f32, extent: u32| {
            ((coordinate * extent as f32).floor().max(0.0) as u32).min(extent - 1)
        };
        self.pixel(texel(uv[0], self.width), texel(uv[1], self.height))
            .normalize()
    }
}

#[derive(Debug, Default)]
struct Framebuffer {
    texture: Option<TextureHandle>,
}

#[derive(Debug)]
struct Program {
    source: ProgramSource,
    /// Values of the last upload. Draws without uniforms run against these.
    uploaded: Option<Uniforms>,
}

/// Call counters of a [`SoftwareContext`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SoftwareStats {
    pub framebuffers_created: usize,
    pub textures_created: usize,
    pub programs_compiled: usize,
    pub uniform_uploads: usize,
    pub draws: usize,
    pub fragments_written: usize,
    pub clears: usize,
    pub pixel_reads: usize,
}

/// CPU reference context. Needs no GPU and produces identical output on every platform.
#[derive(Debug)]
pub struct SoftwareContext {
    handles: HandleAllocator,
    canvas: Texture,
    textures: HashMap<TextureHandle, Texture>,
    framebuffers: HashMap<FramebufferHandle, Framebuffer>,
    programs: HashMap<ProgramHandle, Program>,
    bound: Option<FramebufferHandle>,
    viewport: Option<(u32, u32)>,
    stats: SoftwareStats,
}

impl SoftwareContext {
    /// Creates a context whose drawing buffer is `width` x `height` transparent pixels.
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            handles: HandleAllocator::default(),
            canvas: Texture::new(width, height, None),
            textures: HashMap::new(),
            framebuffers: HashMap::new(),
            programs: HashMap::new(),
            bound: None,
            viewport: None,
            stats: SoftwareStats::default(),
        }
    }

    pub fn stats(&self) -> SoftwareStats {
        self.stats
    }

    pub fn live_textures(&self) -> usize {
        self.textures.len()
    }

    pub fn live_framebuffers(&self) -> usize {
        self.framebuffers.len()
    }

    pub fn live_programs(&self) -> usize {
        self.programs.len()
    }

    /// Tightly packed RGBA8 contents of the drawing buffer.
    pub fn canvas_pixels(&self) -> &[u8] {
        &self.canvas.pixels
    }

    /// Tightly packed RGBA8 contents of a texture.
    pub fn texture_pixels(&self, texture: TextureHandle) -> Option<&[u8]> {
        self.textures.get(&texture).map(|texture| texture.pixels.as_slice())
    }

    pub fn texture_size(&self, texture: TextureHandle) -> Option<(u32, u32)> {
        self.textures
            .get(&texture)
            .map(|texture| (texture.width, texture.height))
    }

    /// Texture a framebuffer renders into. `None` stands for the canvas.
    fn target_texture(
        &self,
        framebuffer: Option<FramebufferHandle>,
    ) -> Result<Option<TextureHandle>, ContextError> {
        let Some(framebuffer) = framebuffer else {
            return Ok(None);
        };
        let attached = self
            .framebuffers
            .get(&framebuffer)
            .ok_or(ContextError::UnknownFramebuffer(framebuffer))?
            .texture
            .ok_or(ContextError::IncompleteFramebuffer(framebuffer))?;
        if !self.textures.contains_key(&attached) {
            return Err(ContextError::UnknownTexture(attached));
        }
        Ok(Some(attached))
    }

    fn texture_mut(&mut self, target: Option<TextureHandle>) -> Result<&mut Texture, ContextError> {
        match target {
            None => Ok(&mut self.canvas),
            Some(handle) => self
                .textures
                .get_mut(&handle)
                .ok_or(ContextError::UnknownTexture(handle)),
        }
    }

    fn texture(&self, target: Option<TextureHandle>) -> Result<&Texture, ContextError> {
        match target {
            None => Ok(&self.canvas),
            Some(handle) => self
                .textures
                .get(&handle)
                .ok_or(ContextError::UnknownTexture(handle)),
        }
    }

    fn upload_uniforms(
        program: &mut Program,
        handle: ProgramHandle,
        uniforms: Option<&Uniforms>,
        stats: &mut SoftwareStats,
    ) -> Result<(), ContextError> {
        match uniforms {
            Some(uniforms) => {
                uniforms.pack(&program.source.uniforms)?;
                uniforms.textures(&program.source.uniforms)?;
                program.uploaded = Some(uniforms.clone());
                stats.uniform_uploads += 1;
                trace!("Uploaded {} uniforms to program {}", uniforms.len(), handle);
                Ok(())
            }
            None if program.uploaded.is_none() && !program.source.uniforms.is_empty() => {
                Err(ContextError::UniformMismatch {
                    name: program.source.uniforms[0].name.to_string(),
                    reason: format!("program {handle} was drawn before any upload"),
                })
            }
            None => Ok(()),
        }
    }
}

impl RenderContext for SoftwareContext {
    fn create_framebuffer(&mut self) -> Result<FramebufferHandle, ContextError> {
        let handle = FramebufferHandle(self.handles.next());
        self.framebuffers.insert(handle, Framebuffer::default());
        self.stats.framebuffers_created += 1;
        Ok(handle)
    }

    fn create_texture(&mut self) -> Result<TextureHandle, ContextError> {
        let handle = TextureHandle(self.handles.next());
        self.textures.insert(handle, Texture::default());
        self.stats.textures_created += 1;
        Ok(handle)
    }

    fn attach_texture_to_framebuffer(
        &mut self,
        texture: TextureHandle,
        framebuffer: FramebufferHandle,
    ) -> Result<(), ContextError> {
        if !self.textures.contains_key(&texture) {
            return Err(ContextError::UnknownTexture(texture));
        }
        let framebuffer_state = self
            .framebuffers
            .get_mut(&framebuffer)
            .ok_or(ContextError::UnknownFramebuffer(framebuffer))?;
        framebuffer_state.texture = Some(texture);
        Ok(())
    }

    fn bind_framebuffer(
        &mut self,
        framebuffer: Option<FramebufferHandle>,
        viewport: Option<(u32, u32)>,
    ) -> Result<(), ContextError> {
        if let Some(handle) = framebuffer {
            if !self.framebuffers.contains_key(&handle) {
                return Err(ContextError::UnknownFramebuffer(handle));
            }
        }
        self.bound = framebuffer;
        self.viewport = viewport;
        Ok(())
    }

    fn specify_texture_image(
        &mut self,
        texture: TextureHandle,
        width: u32,
        height: u32,
        data: Option<&[u8]>,
    ) -> Result<(), ContextError> {
        validate_texture_data(width, height, data)?;
        let slot = self
            .textures
            .get_mut(&texture)
            .ok_or(ContextError::UnknownTexture(texture))?;
        *slot = Texture::new(width, height, data);
        Ok(())
    }

    fn clear_framebuffer(
        &mut self,
        framebuffer: Option<FramebufferHandle>,
        color: Color,
    ) -> Result<(), ContextError> {
        let target = self.target_texture(framebuffer)?;
        self.texture_mut(target)?.fill(color);
        self.stats.clears += 1;
        Ok(())
    }

    fn compile_program(&mut self, source: &ProgramSource) -> Result<ProgramHandle, ContextError> {
        if source.cpu_fragment.is_none() {
            return Err(ContextError::ProgramCompilation(format!(
                "program `{}` has no CPU fragment stage",
                source.label
            )));
        }

        let handle = ProgramHandle(self.handles.next());
        self.programs.insert(
            handle,
            Program {
                source: source.clone(),
                uploaded: None,
            },
        );
        self.stats.programs_compiled += 1;
        debug!("Compiled software program {} ({})", handle, source.label);
        Ok(handle)
    }

    fn draw(&mut self, call: &DrawCall<'_>) -> Result<(), ContextError> {
        let target_handle = self.target_texture(self.bound)?;
        if target_handle == Some(call.texture) {
            return Err(ContextError::UniformMismatch {
                name: "t_input".into(),
                reason: format!("texture {} is also the render target", call.texture),
            });
        }
        if !self.textures.contains_key(&call.texture) {
            return Err(ContextError::UnknownTexture(call.texture));
        }

        let program = self
            .programs
            .get_mut(&call.program)
            .ok_or(ContextError::UnknownProgram(call.program))?;
        Self::upload_uniforms(program, call.program, call.uniforms, &mut self.stats)?;

        let program = &self.programs[&call.program];
        let empty = Uniforms::new();
        let uniforms = program.uploaded.as_ref().unwrap_or(&empty);
        let blend = program.source.blend;
        let Some(fragment) = program.source.cpu_fragment else {
            return Err(ContextError::ProgramCompilation(format!(
                "program `{}` has no CPU fragment stage",
                program.source.label
            )));
        };

        let mut target = match target_handle {
            Some(handle) => self
                .textures
                .remove(&handle)
                .ok_or(ContextError::UnknownTexture(handle))?,
            None => std::mem::take(&mut self.canvas),
        };

        let textures = &self.textures;
        let sampler = |texture: TextureHandle, uv: [f32; 2]| {
            textures
                .get(&texture)
                .map_or([0.0; 4], |texture| texture.sample(uv))
        };
        let input = &textures[&call.texture];

        let (viewport_width, viewport_height) =
            self.viewport.unwrap_or((target.width, target.height));
        let width = viewport_width.min(target.width);
        let height = viewport_height.min(target.height);

        let bounds = call.geometry.bounds();
        let x_start = bounds.min.x.floor().max(0.0) as u32;
        let y_start = bounds.min.y.floor().max(0.0) as u32;
        let x_end = (bounds.max.x.ceil().max(0.0) as u32).min(width);
        let y_end = (bounds.max.y.ceil().max(0.0) as u32).min(height);

        let mut written = 0;
        for y in y_start..y_end {
            for x in x_start..x_end {
                let center = Point2D::new(x as f32 + 0.5, y as f32 + 0.5);
                let Some(uv) = call.geometry.uv_at(center) else {
                    continue;
                };
                let uv = uv.to_array();

                let fragment_input = FragmentInput {
                    uv,
                    texel: input.sample(uv),
                    uniforms,
                    globals: call.globals,
                    sampler: &sampler,
                };
                let Some(color) = fragment(&fragment_input) else {
                    continue;
                };

                let blended = match blend {
                    BlendMode::Replace => color,
                    BlendMode::PremultipliedOver => {
                        let destination = target.pixel(x, y).normalize();
                        let keep = 1.0 - color[3].clamp(0.0, 1.0);
                        std::array::from_fn(|channel| color[channel] + destination[channel] * keep)
                    }
                };
                target.set_pixel(x, y, Color::from_normalized(blended));
                written += 1;
            }
        }

        match target_handle {
            Some(handle) => {
                self.textures.insert(handle, target);
            }
            None => self.canvas = target,
        }

        self.stats.draws += 1;
        self.stats.fragments_written += written;
        trace!(
            "Software draw with program {} wrote {} fragments",
            call.program,
            written
        );
        Ok(())
    }

    fn read_pixel(
        &mut self,
        x: u32,
        y: u32,
        framebuffer: Option<FramebufferHandle>,
    ) -> Result<Color, ContextError> {
        let target = self.target_texture(framebuffer)?;
        let texture = self.texture(target)?;
        if x >= texture.width || y >= texture.height {
            return Err(ContextError::Readback(format!(
                "pixel ({x}, {y}) is outside the {}x{} target",
                texture.width, texture.height
            )));
        }
        let pixel = texture.pixel(x, y);
        self.stats.pixel_reads += 1;
        Ok(pixel)
    }

    fn delete_texture(&mut self, texture: TextureHandle) {
        self.textures.remove(&texture);
    }

    fn delete_framebuffer(&mut self, framebuffer: FramebufferHandle) {
        self.framebuffers.remove(&framebuffer);
        if self.bound == Some(framebuffer) {
            self.bound = None;
            self.viewport = None;
        }
    }

    fn delete_program(&mut self, program: ProgramHandle) {
        self.programs.remove(&program);
    }

    fn drawing_buffer_size(&self) -> (u32, u32) {
        (self.canvas.width, self.canvas.height)
    }

    fn resize_drawing_buffer(&mut self, width: u32, height: u32) -> Result<(), ContextError> {
        if width == 0 || height == 0 {
            return Err(ContextError::ResourceCreation(ResourceKind::Framebuffer));
        }
        self.canvas = Texture::new(width, height, None);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::f32::consts::FRAC_PI_2;

    use super::*;
    use crate::context::GlobalUniforms;
    use crate::draw_image::DrawImageRequest;
    use crate::id::ShaderId;

    fn draw(ctx: &mut SoftwareContext, program: ProgramHandle, request: &DrawImageRequest) {
        ctx.draw(&DrawCall {
            program,
            uniforms: Some(&Uniforms::new()),
            globals: &GlobalUniforms::default(),
            texture: request.texture,
            geometry: request.quad(),
        })
        .unwrap();
    }

    /// 2x2 texture: red, green / blue, white.
    fn quadrants(ctx: &mut SoftwareContext) -> TextureHandle {
        #[rustfmt::skip]
        let pixels = [
            255, 0, 0, 255,   0, 255, 0, 255,
            0, 0, 255, 255,   255, 255, 255, 255,
        ];
        ctx.upload_texture(2, 2, &pixels).unwrap()
    }

    #[test]
    fn draws_scale_textures_with_nearest_sampling() {
        let mut ctx = SoftwareContext::new(8, 8);
        let program = ctx.compile_program(&ProgramSource::sprite()).unwrap();
        let texture = quadrants(&mut ctx);

        let request = DrawImageRequest::new(ShaderId(1), texture, (2, 2), (0.0, 0.0))
            .destination_size(8.0, 8.0);
        draw(&mut ctx, program, &request);

        assert_eq!(ctx.read_pixel(1, 1, None).unwrap(), Color::rgb(255, 0, 0));
        assert_eq!(ctx.read_pixel(6, 1, None).unwrap(), Color::rgb(0, 255, 0));
        assert_eq!(ctx.read_pixel(1, 6, None).unwrap(), Color::rgb(0, 0, 255));
        assert_eq!(ctx.read_pixel(7, 7, None).unwrap(), Color::WHITE);
    }

    #[test]
    fn rotation_and_flip_move_texels() {
        let mut ctx = SoftwareContext::new(8, 8);
        let program = ctx.compile_program(&ProgramSource::sprite()).unwrap();
        let texture = quadrants(&mut ctx);

        let rotated = DrawImageRequest::new(ShaderId(1), texture, (2, 2), (8.0, 0.0))
            .destination_size(8.0, 8.0)
            .rotation(FRAC_PI_2);
        draw(&mut ctx, program, &rotated);
        // A quarter turn around the top-right corner swings the quad onto the canvas with
        // the red quadrant in the top-right.
        assert_eq!(ctx.read_pixel(6, 1, None).unwrap(), Color::rgb(255, 0, 0));
        assert_eq!(ctx.read_pixel(6, 6, None).unwrap(), Color::rgb(0, 255, 0));

        let flipped = DrawImageRequest::new(ShaderId(1), texture, (2, 2), (0.0, 0.0))
            .destination_size(8.0, 8.0)
            .flip_y(true);
        draw(&mut ctx, program, &flipped);
        assert_eq!(ctx.read_pixel(1, 1, None).unwrap(), Color::rgb(0, 0, 255));
        assert_eq!(ctx.read_pixel(1, 6, None).unwrap(), Color::rgb(255, 0, 0));
    }

    #[test]
    fn premultiplied_over_blends_with_the_target() {
        let mut ctx = SoftwareContext::new(2, 2);
        let program = ctx.compile_program(&ProgramSource::sprite()).unwrap();
        ctx.clear_framebuffer(None, Color::rgb(0, 0, 255)).unwrap();
        let half_red = ctx.upload_texture(1, 1, &[128, 0, 0, 128]).unwrap();

        let request = DrawImageRequest::new(ShaderId(1), half_red, (1, 1), (0.0, 0.0));
        draw(&mut ctx, program, &request);

        assert_eq!(ctx.read_pixel(0, 0, None).unwrap(), Color::rgb(128, 0, 127));
        assert_eq!(ctx.read_pixel(1, 1, None).unwrap(), Color::rgb(0, 0, 255));
    }

    #[test]
    fn draws_respect_the_viewport() {
        let mut ctx = SoftwareContext::new(8, 8);
        let program = ctx.compile_program(&ProgramSource::sprite()).unwrap();
        let texture = ctx.upload_texture(1, 1, &[255, 255, 255, 255]).unwrap();
        ctx.bind_framebuffer(None, Some((4, 4))).unwrap();

        let request = DrawImageRequest::new(ShaderId(1), texture, (1, 1), (0.0, 0.0))
            .destination_size(8.0, 8.0);
        draw(&mut ctx, program, &request);

        assert_eq!(ctx.read_pixel(3, 3, None).unwrap(), Color::WHITE);
        assert_eq!(ctx.read_pixel(5, 5, None).unwrap(), Color::TRANSPARENT);
    }

    #[test]
    fn framebuffers_render_into_their_texture() {
        let mut ctx = SoftwareContext::new(4, 4);
        let program = ctx.compile_program(&ProgramSource::sprite()).unwrap();
        let source = ctx.upload_texture(1, 1, &[0, 255, 0, 255]).unwrap();
        let framebuffer = ctx.create_framebuffer().unwrap();
        let target = ctx.create_texture().unwrap();
        ctx.specify_texture_image(target, 2, 2, None).unwrap();
        ctx.attach_texture_to_framebuffer(target, framebuffer).unwrap();
        ctx.bind_framebuffer(Some(framebuffer), None).unwrap();

        let request = DrawImageRequest::new(ShaderId(1), source, (1, 1), (0.0, 0.0))
            .destination_size(2.0, 2.0);
        draw(&mut ctx, program, &request);

        assert_eq!(
            ctx.read_pixel(1, 1, Some(framebuffer)).unwrap(),
            Color::rgb(0, 255, 0)
        );
        assert_eq!(ctx.read_pixel(1, 1, None).unwrap(), Color::TRANSPARENT);
        assert_eq!(ctx.texture_pixels(target).unwrap()[..4], [0, 255, 0, 255]);
    }

    #[test]
    fn incomplete_framebuffers_are_rejected() {
        let mut ctx = SoftwareContext::new(4, 4);
        let framebuffer = ctx.create_framebuffer().unwrap();

        let result = ctx.clear_framebuffer(Some(framebuffer), Color::WHITE);
        assert!(matches!(result, Err(ContextError::IncompleteFramebuffer(_))));
    }

    #[test]
    fn drawing_into_the_input_texture_is_rejected() {
        let mut ctx = SoftwareContext::new(4, 4);
        let program = ctx.compile_program(&ProgramSource::sprite()).unwrap();
        let framebuffer = ctx.create_framebuffer().unwrap();
        let texture = ctx.upload_texture(1, 1, &[0, 0, 0, 255]).unwrap();
        ctx.attach_texture_to_framebuffer(texture, framebuffer).unwrap();
        ctx.bind_framebuffer(Some(framebuffer), None).unwrap();

        let result = ctx.draw(&DrawCall {
            program,
            uniforms: None,
            globals: &GlobalUniforms::default(),
            texture,
            geometry: DrawImageRequest::new(ShaderId(1), texture, (1, 1), (0.0, 0.0)).quad(),
        });
        assert!(result.is_err());
    }

    #[test]
    fn programs_with_uniforms_need_an_upload_before_drawing() {
        let mut ctx = SoftwareContext::new(4, 4);
        let program = ctx.compile_program(&ProgramSource::flat_color()).unwrap();
        let texture = ctx.upload_texture(1, 1, &[0, 0, 0, 255]).unwrap();
        let geometry = DrawImageRequest::new(ShaderId(1), texture, (1, 1), (0.0, 0.0)).quad();
        let globals = GlobalUniforms::default();

        let result = ctx.draw(&DrawCall {
            program,
            uniforms: None,
            globals: &globals,
            texture,
            geometry,
        });
        assert!(matches!(result, Err(ContextError::UniformMismatch { .. })));

        let uniforms = Uniforms::new().with("u_color", Color::rgb(10, 20, 30));
        for upload in [Some(&uniforms), None] {
            ctx.draw(&DrawCall {
                program,
                uniforms: upload,
                globals: &globals,
                texture,
                geometry,
            })
            .unwrap();
        }
        assert_eq!(ctx.stats().uniform_uploads, 1);
        assert_eq!(ctx.read_pixel(0, 0, None).unwrap(), Color::rgb(10, 20, 30));
    }

    #[test]
    fn texture_data_must_match_dimensions() {
        let mut ctx = SoftwareContext::new(4, 4);
        let result = ctx.upload_texture(2, 2, &[0; 12]);
        assert!(matches!(
            result,
            Err(ContextError::TextureDataSize {
                expected: 16,
                actual: 12
            })
        ));
    }

    #[test]
    fn programs_need_a_cpu_stage() {
        let mut ctx = SoftwareContext::new(4, 4);
        let result = ctx.compile_program(&ProgramSource::new("gpu_only", "fn fs_main() {}"));
        assert!(matches!(result, Err(ContextError::ProgramCompilation(_))));
    }

    #[test]
    fn reads_outside_the_target_fail() {
        let mut ctx = SoftwareContext::new(4, 4);
        assert!(matches!(
            ctx.read_pixel(4, 0, None),
            Err(ContextError::Readback(_))
        ));
    }
}
