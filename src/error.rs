use std::fmt;

use thiserror::Error;

use crate::id::{FramebufferHandle, ProgramHandle, ShaderId, TextureHandle};

/// Kind of native resource a context failed to create.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResourceKind {
    Framebuffer,
    Texture,
    Program,
}

impl fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ResourceKind::Framebuffer => "framebuffer",
            ResourceKind::Texture => "texture",
            ResourceKind::Program => "shader program",
        };
        f.write_str(name)
    }
}

/// Errors raised by a [`RenderContext`](crate::RenderContext) implementation.
#[derive(Debug, Clone, Error)]
pub enum ContextError {
    #[error("failed to create {0}")]
    ResourceCreation(ResourceKind),
    #[error("texture {0} does not exist")]
    UnknownTexture(TextureHandle),
    #[error("framebuffer {0} does not exist")]
    UnknownFramebuffer(FramebufferHandle),
    #[error("program {0} does not exist")]
    UnknownProgram(ProgramHandle),
    #[error("framebuffer {0} has no texture attached")]
    IncompleteFramebuffer(FramebufferHandle),
    #[error("shader program compilation failed: {0}")]
    ProgramCompilation(String),
    #[error("uniform `{name}` cannot be bound: {reason}")]
    UniformMismatch { name: String, reason: String },
    #[error("texture data is {actual} bytes, expected {expected}")]
    TextureDataSize { expected: usize, actual: usize },
    #[error("pixel readback failed: {0}")]
    Readback(String),
}

/// Errors surfaced by the render core. All of them abort the current operation; the next
/// frame starts clean.
#[derive(Debug, Clone, Error)]
pub enum PipelineError {
    /// `close_container` was called while only the implicit root level was open.
    #[error("close_container called without a matching open_container")]
    ContainerStackUnderflow,
    #[error("cannot render with inactive shader {0}")]
    InactiveShader(ShaderId),
    /// The mask layer handed out every color it can encode since the last clear.
    #[error("mask layer color space exhausted after {allocated} objects")]
    ColorSpaceExhausted { allocated: u64 },
    #[error("shader {0} is not loaded")]
    UnknownShader(ShaderId),
    #[error(transparent)]
    Context(#[from] ContextError),
}
