//! The driver-layer contract the render core is written against.
//!
//! The core never talks to a graphics API directly. Everything it needs (render targets,
//! programs, one draw call, one pixel read) goes through [`RenderContext`]. The crate ships
//! [`SoftwareContext`](crate::SoftwareContext), a CPU reference implementation, and
//! [`WgpuContext`](crate::WgpuContext).

use std::borrow::Cow;
use std::fmt;

use crate::color::Color;
use crate::draw_image::QuadGeometry;
use crate::error::ContextError;
use crate::id::{FramebufferHandle, ProgramHandle, TextureHandle};
use crate::uniforms::{UniformKind, UniformValue, Uniforms};

/// Engine-wide uniforms sent with every draw. `resolution` always matches the bound target.
#[repr(C)]
#[derive(Copy, Clone, Debug, Default, PartialEq, bytemuck::Pod, bytemuck::Zeroable)]
pub struct GlobalUniforms {
    pub resolution: [f32; 2],
    pub time: f32,
    pub _padding: f32,
}

impl GlobalUniforms {
    pub fn new(resolution: (u32, u32), time: f32) -> Self {
        Self {
            resolution: [resolution.0 as f32, resolution.1 as f32],
            time,
            _padding: 0.0,
        }
    }

    pub(crate) fn with_resolution(mut self, resolution: (u32, u32)) -> Self {
        self.resolution = [resolution.0 as f32, resolution.1 as f32];
        self
    }
}

/// How fragment output is combined with the target.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum BlendMode {
    /// `src + dst * (1 - src.a)`, for premultiplied colors.
    #[default]
    PremultipliedOver,
    /// Overwrite the destination.
    Replace,
}

/// One entry of a program's uniform layout.
#[derive(Debug, Clone, PartialEq)]
pub struct UniformSlot {
    pub name: Cow<'static, str>,
    pub kind: UniformKind,
}

impl UniformSlot {
    pub fn new(name: impl Into<Cow<'static, str>>, kind: UniformKind) -> Self {
        Self {
            name: name.into(),
            kind,
        }
    }
}

/// What a fragment function sees in the software context.
pub struct FragmentInput<'a> {
    /// Texture coordinate of the fragment, top-left origin.
    pub uv: [f32; 2],
    /// The input texture sampled at `uv`, premultiplied.
    pub texel: [f32; 4],
    pub uniforms: &'a Uniforms,
    pub globals: &'a GlobalUniforms,
    pub(crate) sampler: &'a dyn Fn(TextureHandle, [f32; 2]) -> [f32; 4],
}

impl FragmentInput<'_> {
    /// Reads a float uniform, `0.0` when unset or of another kind.
    pub fn float(&self, name: &str) -> f32 {
        match self.uniforms.get(name) {
            Some(UniformValue::Float(value)) => *value,
            _ => 0.0,
        }
    }

    /// Reads a `vec4` uniform, transparent black when unset or of another kind.
    pub fn vec4(&self, name: &str) -> [f32; 4] {
        match self.uniforms.get(name) {
            Some(UniformValue::Vec4(value)) => *value,
            _ => [0.0; 4],
        }
    }

    /// Samples the texture bound to a texture uniform.
    pub fn sample(&self, name: &str, uv: [f32; 2]) -> [f32; 4] {
        match self.uniforms.get(name) {
            Some(UniformValue::Texture(texture)) => (self.sampler)(*texture, uv),
            _ => [0.0; 4],
        }
    }
}

/// CPU fragment stage. `None` discards the fragment.
pub type CpuFragment = fn(&FragmentInput<'_>) -> Option<[f32; 4]>;

/// Portable description of a shader program.
///
/// GPU contexts compile `wgsl_fragment`; the software context runs `cpu_fragment`. The WGSL
/// body is appended to a preamble that declares, in this order:
///
/// - `VertexOutput { position, uv }` and the vertex entry point,
/// - `t_input` / `s_input` at `@group(0)` bindings 0 and 1,
/// - `globals: Globals { resolution: vec2<f32>, time: f32 }` at `@group(1) @binding(0)`.
///
/// Programs with non-texture uniform slots must declare `struct Params` themselves and bind
/// it at `@group(1) @binding(1)`; each scalar or vector slot occupies a `vec4<f32>` field
/// and matrices use `mat3x3<f32>` / `mat4x4<f32>`. Texture slots are bound at `@group(2)`,
/// one binding per slot in declaration order, sampled with `s_input`. The fragment entry
/// point is `fs_main(in: VertexOutput) -> @location(0) vec4<f32>`.
#[derive(Clone)]
pub struct ProgramSource {
    pub label: Cow<'static, str>,
    pub wgsl_fragment: Cow<'static, str>,
    pub cpu_fragment: Option<CpuFragment>,
    pub uniforms: Vec<UniformSlot>,
    pub blend: BlendMode,
}

impl ProgramSource {
    pub fn new(label: impl Into<Cow<'static, str>>, wgsl_fragment: impl Into<Cow<'static, str>>) -> Self {
        Self {
            label: label.into(),
            wgsl_fragment: wgsl_fragment.into(),
            cpu_fragment: None,
            uniforms: Vec::new(),
            blend: BlendMode::default(),
        }
    }

    pub fn with_cpu_fragment(mut self, fragment: CpuFragment) -> Self {
        self.cpu_fragment = Some(fragment);
        self
    }

    pub fn with_uniform(mut self, name: impl Into<Cow<'static, str>>, kind: UniformKind) -> Self {
        self.uniforms.push(UniformSlot::new(name, kind));
        self
    }

    pub fn with_blend(mut self, blend: BlendMode) -> Self {
        self.blend = blend;
        self
    }

    pub fn has_params(&self) -> bool {
        self.uniforms.iter().any(|slot| slot.kind != UniformKind::Texture)
    }

    pub fn texture_slot_count(&self) -> usize {
        self.uniforms
            .iter()
            .filter(|slot| slot.kind == UniformKind::Texture)
            .count()
    }

    /// Draws the input texture unchanged.
    pub fn sprite() -> Self {
        Self::new("sprite", SPRITE_FS).with_cpu_fragment(|input| Some(input.texel))
    }

    /// Writes `u_color` wherever the input texture has coverage. Used for mask stamping.
    pub fn flat_color() -> Self {
        Self::new("flat_color", FLAT_COLOR_FS)
            .with_uniform("u_color", UniformKind::Vec4)
            .with_blend(BlendMode::Replace)
            .with_cpu_fragment(|input| {
                if input.texel[3] <= 0.0 {
                    return None;
                }
                let [r, g, b, _] = input.vec4("u_color");
                Some([r, g, b, 1.0])
            })
    }
}

impl fmt::Debug for ProgramSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProgramSource")
            .field("label", &self.label)
            .field("cpu_fragment", &self.cpu_fragment.is_some())
            .field("uniforms", &self.uniforms)
            .field("blend", &self.blend)
            .finish_non_exhaustive()
    }
}

const SPRITE_FS: &str = r#"
@fragment
fn fs_main(in: VertexOutput) -> @location(0) vec4<f32> {
    return textureSample(t_input, s_input, in.uv);
}
"#;

const FLAT_COLOR_FS: &str = r#"
struct Params {
    color: vec4<f32>,
}
@group(1) @binding(1) var<uniform> params: Params;

@fragment
fn fs_main(in: VertexOutput) -> @location(0) vec4<f32> {
    let texel = textureSample(t_input, s_input, in.uv);
    if (texel.a <= 0.0) {
        discard;
    }
    return vec4<f32>(params.color.rgb, 1.0);
}
"#;

/// A single draw into the currently bound framebuffer.
#[derive(Debug, Clone, Copy)]
pub struct DrawCall<'a> {
    pub program: ProgramHandle,
    /// The shader's uniform bag when it must be uploaded before drawing. `None` means the
    /// values uploaded with an earlier draw of this program are still current.
    pub uniforms: Option<&'a Uniforms>,
    pub globals: &'a GlobalUniforms,
    pub texture: TextureHandle,
    pub geometry: QuadGeometry,
}

/// Immediate-mode render context.
///
/// Coordinates are in pixels with a top-left origin, for drawing and for read-back alike.
/// `None` in place of a framebuffer means the default drawing buffer (the canvas).
pub trait RenderContext {
    fn create_framebuffer(&mut self) -> Result<FramebufferHandle, ContextError>;

    /// Creates an empty general-purpose texture. Give it storage with
    /// [`RenderContext::specify_texture_image`].
    fn create_texture(&mut self) -> Result<TextureHandle, ContextError>;

    fn attach_texture_to_framebuffer(
        &mut self,
        texture: TextureHandle,
        framebuffer: FramebufferHandle,
    ) -> Result<(), ContextError>;

    /// Makes `framebuffer` the target of subsequent draws. `viewport` defaults to the full
    /// size of the target.
    fn bind_framebuffer(
        &mut self,
        framebuffer: Option<FramebufferHandle>,
        viewport: Option<(u32, u32)>,
    ) -> Result<(), ContextError>;

    /// (Re)allocates the texture's storage. `data` is tightly packed premultiplied RGBA8;
    /// without it the texture is cleared to transparent.
    fn specify_texture_image(
        &mut self,
        texture: TextureHandle,
        width: u32,
        height: u32,
        data: Option<&[u8]>,
    ) -> Result<(), ContextError>;

    fn clear_framebuffer(
        &mut self,
        framebuffer: Option<FramebufferHandle>,
        color: Color,
    ) -> Result<(), ContextError>;

    fn compile_program(&mut self, source: &ProgramSource) -> Result<ProgramHandle, ContextError>;

    /// Issues one draw into the bound framebuffer.
    fn draw(&mut self, call: &DrawCall<'_>) -> Result<(), ContextError>;

    fn read_pixel(
        &mut self,
        x: u32,
        y: u32,
        framebuffer: Option<FramebufferHandle>,
    ) -> Result<Color, ContextError>;

    fn delete_texture(&mut self, texture: TextureHandle);

    fn delete_framebuffer(&mut self, framebuffer: FramebufferHandle);

    fn delete_program(&mut self, program: ProgramHandle);

    fn drawing_buffer_size(&self) -> (u32, u32);

    fn resize_drawing_buffer(&mut self, width: u32, height: u32) -> Result<(), ContextError>;

    /// Creates a texture and fills it in one go.
    fn upload_texture(
        &mut self,
        width: u32,
        height: u32,
        data: &[u8],
    ) -> Result<TextureHandle, ContextError> {
        let texture = self.create_texture()?;
        self.specify_texture_image(texture, width, height, Some(data))?;
        Ok(texture)
    }
}

/// Checks that `data` holds exactly `width * height` RGBA8 pixels.
pub(crate) fn validate_texture_data(
    width: u32,
    height: u32,
    data: Option<&[u8]>,
) -> Result<(), ContextError> {
    let expected = width as usize * height as usize * 4;
    match data {
        Some(bytes) if bytes.len() != expected => Err(ContextError::TextureDataSize {
            expected,
            actual: bytes.len(),
        }),
        _ => Ok(()),
    }
}
