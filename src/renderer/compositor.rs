use super::*;

/// An off-screen framebuffer with its color texture.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RenderTarget {
    pub framebuffer: FramebufferHandle,
    pub texture: TextureHandle,
    pub size: (u32, u32),
}

impl RenderTarget {
    pub(crate) fn create(
        ctx: &mut impl RenderContext,
        size: (u32, u32),
        label: &'static str,
    ) -> Result<Self, ContextError> {
        let framebuffer = ctx.create_framebuffer()?;
        let texture = ctx.create_texture()?;
        ctx.specify_texture_image(texture, size.0, size.1, None)?;
        ctx.attach_texture_to_framebuffer(texture, framebuffer)?;

        debug!(
            "Created {} target {}x{} (framebuffer {}, texture {})",
            label, size.0, size.1, framebuffer, texture
        );

        Ok(Self {
            framebuffer,
            texture,
            size,
        })
    }

    /// Reallocates the texture storage when the size changed, dropping its contents.
    pub(crate) fn resize(
        &mut self,
        ctx: &mut impl RenderContext,
        size: (u32, u32),
    ) -> Result<(), ContextError> {
        if self.size != size {
            ctx.specify_texture_image(self.texture, size.0, size.1, None)?;
            self.size = size;
        }
        Ok(())
    }

    pub(crate) fn release(self, ctx: &mut impl RenderContext) {
        ctx.delete_framebuffer(self.framebuffer);
        ctx.delete_texture(self.texture);
    }

    /// Binds the target, with a viewport covering all of it.
    pub(crate) fn bind(&self, ctx: &mut impl RenderContext) -> Result<(), ContextError> {
        ctx.bind_framebuffer(Some(self.framebuffer), Some(self.size))
    }
}

/// Returns the target in `slot`, creating it or resizing it to `size` first.
pub(crate) fn ensure_target(
    slot: &mut Option<RenderTarget>,
    ctx: &mut impl RenderContext,
    size: (u32, u32),
    label: &'static str,
) -> Result<RenderTarget, ContextError> {
    match slot {
        Some(target) => {
            target.resize(ctx, size)?;
            Ok(*target)
        }
        None => {
            let target = RenderTarget::create(ctx, size, label)?;
            *slot = Some(target);
            Ok(target)
        }
    }
}

/// Result of [`ShaderPipeline::apply`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Composited {
    /// The processed image. When passes ran, this is the compositor's output texture and it
    /// stays valid until the next `apply`.
    pub texture: TextureHandle,
    pub size: (u32, u32),
    pub passes: usize,
}

/// Applies shader chains to textures through three persistent scratch targets.
///
/// Passes alternate between the two ping-pong targets so no pass reads the texture it writes.
/// The last pass always lands in the output target. Targets are created on first use and
/// follow the size of the source texture.
#[derive(Debug, Default)]
pub struct ShaderPipeline {
    ping: Option<RenderTarget>,
    pong: Option<RenderTarget>,
    output: Option<RenderTarget>,
}

impl ShaderPipeline {
    pub fn new() -> Self {
        Self::default()
    }

    /// Runs `chain` over `source`, skipping inactive shaders.
    ///
    /// With nothing to run, `source` comes back untouched and no target is allocated.
    /// Leaves the framebuffer of the last pass bound.
    pub fn apply(
        &mut self,
        ctx: &mut impl RenderContext,
        shaders: &mut ShaderLibrary,
        source: TextureHandle,
        size: (u32, u32),
        chain: &[ShaderId],
        globals: &GlobalUniforms,
    ) -> Result<Composited, PipelineError> {
        let mut active: SmallVec<[ShaderId; 4]> = SmallVec::new();
        for &id in chain {
            if shaders.shader(id)?.is_active() {
                active.push(id);
            }
        }

        if active.is_empty() {
            return Ok(Composited {
                texture: source,
                size,
                passes: 0,
            });
        }

        let globals = globals.with_resolution(size);
        let last = active.len() - 1;
        let mut input = source;

        for (index, &shader) in active.iter().enumerate() {
            let (slot, label) = if index == last {
                (&mut self.output, "compositor output")
            } else if index % 2 == 0 {
                (&mut self.ping, "compositor ping")
            } else {
                (&mut self.pong, "compositor pong")
            };
            let target = ensure_target(slot, ctx, size, label)?;

            trace!(
                "Compositor pass {} with shader {}: texture {} -> {}",
                index,
                shader,
                input,
                target.texture
            );

            target.bind(ctx)?;
            ctx.clear_framebuffer(Some(target.framebuffer), Color::TRANSPARENT)?;
            let request = DrawImageRequest::new(shader, input, size, (0.0, 0.0));
            shaders.draw_image(ctx, &request, &globals)?;

            input = target.texture;
        }

        Ok(Composited {
            texture: input,
            size,
            passes: active.len(),
        })
    }

    /// Scratch targets currently allocated.
    pub fn targets(&self) -> impl Iterator<Item = &RenderTarget> {
        [&self.ping, &self.pong, &self.output]
            .into_iter()
            .filter_map(Option::as_ref)
    }

    /// Deletes the scratch targets. They are recreated on the next `apply`.
    pub fn release(&mut self, ctx: &mut impl RenderContext) {
        for target in [self.ping.take(), self.pong.take(), self.output.take()]
            .into_iter()
            .flatten()
        {
            target.release(ctx);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::ProgramSource;
    use crate::software::SoftwareContext;
    use crate::uniforms::Uniforms;

    fn add_channel() -> ProgramSource {
        ProgramSource::new("add_red", "").with_cpu_fragment(|input| {
            let [r, g, b, a] = input.texel;
            Some([(r + 0.2).min(1.0), g, b, a])
        })
    }

    struct Fixture {
        ctx: SoftwareContext,
        shaders: ShaderLibrary,
        source: TextureHandle,
        compositor: ShaderPipeline,
    }

    fn fixture() -> Fixture {
        let mut ctx = SoftwareContext::new(16, 16);
        let source = ctx.upload_texture(2, 2, &[0, 0, 0, 255].repeat(4)).unwrap();
        Fixture {
            ctx,
            shaders: ShaderLibrary::new(),
            source,
            compositor: ShaderPipeline::new(),
        }
    }

    impl Fixture {
        fn load(&mut self, count: usize) -> Vec<ShaderId> {
            (0..count)
                .map(|_| {
                    self.shaders
                        .load_shader(&mut self.ctx, add_channel(), Uniforms::new())
                        .unwrap()
                })
                .collect()
        }

        fn apply(&mut self, chain: &[ShaderId]) -> Composited {
            self.compositor
                .apply(
                    &mut self.ctx,
                    &mut self.shaders,
                    self.source,
                    (2, 2),
                    chain,
                    &GlobalUniforms::default(),
                )
                .unwrap()
        }
    }

    #[test]
    fn empty_chain_returns_the_source_without_allocating() {
        let mut fx = fixture();
        let created = fx.ctx.stats().framebuffers_created;

        let result = fx.apply(&[]);

        assert_eq!(result.texture, fx.source);
        assert_eq!(result.passes, 0);
        assert_eq!(fx.ctx.stats().framebuffers_created, created);
        assert_eq!(fx.compositor.targets().count(), 0);
    }

    #[test]
    fn all_inactive_chain_is_a_no_op() {
        let mut fx = fixture();
        let ids = fx.load(2);
        for &id in &ids {
            fx.shaders.get_mut(id).unwrap().deactivate();
        }

        let result = fx.apply(&ids);

        assert_eq!(result.texture, fx.source);
        assert_eq!(fx.ctx.stats().framebuffers_created, 0);
        assert_eq!(fx.ctx.stats().draws, 0);
    }

    #[test]
    fn single_pass_writes_straight_to_the_output_target() {
        let mut fx = fixture();
        let ids = fx.load(1);

        let result = fx.apply(&ids);

        assert_eq!(result.passes, 1);
        assert_ne!(result.texture, fx.source);
        assert_eq!(fx.compositor.targets().count(), 1);
        assert_eq!(fx.compositor.output.map(|t| t.texture), Some(result.texture));
    }

    #[test]
    fn passes_apply_in_sequence_through_ping_pong_targets() {
        let mut fx = fixture();
        let ids = fx.load(3);

        let result = fx.apply(&ids);
        assert_eq!(result.passes, 3);
        assert_eq!(fx.compositor.targets().count(), 3);

        let framebuffer = fx.compositor.output.unwrap().framebuffer;
        let pixel = fx.ctx.read_pixel(1, 1, Some(framebuffer)).unwrap();
        assert_eq!(pixel, Color::rgb(153, 0, 0));
    }

    #[test]
    fn inactive_shaders_are_skipped_inside_a_chain() {
        let mut fx = fixture();
        let ids = fx.load(3);
        fx.shaders.get_mut(ids[1]).unwrap().deactivate();

        let result = fx.apply(&ids);

        assert_eq!(result.passes, 2);
        let framebuffer = fx.compositor.output.unwrap().framebuffer;
        let pixel = fx.ctx.read_pixel(0, 0, Some(framebuffer)).unwrap();
        assert_eq!(pixel, Color::rgb(102, 0, 0));
    }

    #[test]
    fn targets_persist_across_calls() {
        let mut fx = fixture();
        let ids = fx.load(2);

        fx.apply(&ids);
        let created = fx.ctx.stats().framebuffers_created;
        fx.apply(&ids);

        assert_eq!(fx.ctx.stats().framebuffers_created, created);
    }

    #[test]
    fn unknown_shaders_fail() {
        let mut fx = fixture();
        let result = fx.compositor.apply(
            &mut fx.ctx,
            &mut fx.shaders,
            fx.source,
            (2, 2),
            &[ShaderId(404)],
            &GlobalUniforms::default(),
        );
        assert!(matches!(result, Err(PipelineError::UnknownShader(_))));
    }

    #[test]
    fn release_deletes_every_target() {
        let mut fx = fixture();
        let ids = fx.load(3);
        fx.apply(&ids);

        fx.compositor.release(&mut fx.ctx);

        assert_eq!(fx.compositor.targets().count(), 0);
        assert_eq!(fx.ctx.live_framebuffers(), 0);
    }
}
