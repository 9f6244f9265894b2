//! Frame render queue, multi-pass shader compositor and color-ID picking for 2D engines.
//!
//! A [`RenderPipeline`] collects drawables while the engine walks its scene graph, paints
//! them in world-space Y order when the frame is drawn, runs every sprite through the
//! post-processing shaders of its enclosing containers, and stamps pickable objects into a
//! hidden mask layer that [`RenderPipeline::probe_position`] reads back.
//!
//! Everything renders through the [`RenderContext`] trait. [`WgpuContext`] drives a GPU;
//! [`SoftwareContext`] is a deterministic CPU reference used by the tests.

pub use wgpu;

mod color;
mod config;
mod context;
mod debug_tools;
mod draw_image;
mod error;
mod id;
mod pipeline;
mod renderer;
mod shader;
mod software;
mod uniforms;
mod util;
mod wgpu_context;

pub use color::{Color, ColorKey};
pub use config::PipelineConfig;
pub use context::{
    BlendMode, CpuFragment, DrawCall, FragmentInput, GlobalUniforms, ProgramSource,
    RenderContext, UniformSlot,
};
pub use debug_tools::{snapshot_target, DebugContext};
pub use draw_image::{
    DrawImageRequest, PixelPoint, PixelSpace, QuadGeometry, QuadVertex, SourceRect, UnitSpace,
    UvPoint, UvSpace,
};
pub use error::{ContextError, PipelineError, ResourceKind};
pub use id::{FramebufferHandle, ObjectId, ProgramHandle, ShaderId, TextureHandle};
pub use pipeline::RenderPipeline;
pub use renderer::{
    ColorAllocator, Composited, DrawFn, FrameStats, MaskLayer, QueueStats, RenderQueue,
    RenderTarget, Renderer, ShaderChain, ShaderPipeline, Sprite, WorldPoint, WorldSpace,
    COLOR_CAPACITY,
};
pub use shader::{Shader, ShaderLibrary, ShaderState};
pub use software::{SoftwareContext, SoftwareStats};
pub use uniforms::{UniformKind, UniformValue, Uniforms};
pub use util::{normalize_rgba_color, premultiply_rgba8_inplace};
pub use wgpu_context::{WgpuContext, CANVAS_FORMAT};
