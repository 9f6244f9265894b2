use std::fmt;
use std::hash::Hash;

/// Identity of a shader loaded into a [`ShaderLibrary`](crate::ShaderLibrary).
///
/// Ids survive re-targeting the pipeline to a new context; only the native program behind
/// them is recreated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ShaderId(pub u64);

/// Engine-side identity of a pickable object. The mask layer hands these back from probes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ObjectId(pub u64);

/// Opaque framebuffer handle issued by a [`RenderContext`](crate::RenderContext).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct FramebufferHandle(pub u64);

/// Opaque texture handle issued by a [`RenderContext`](crate::RenderContext).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TextureHandle(pub u64);

/// Opaque compiled-program handle issued by a [`RenderContext`](crate::RenderContext).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ProgramHandle(pub u64);

macro_rules! display_inner {
    ($($ty:ty),*) => {
        $(
            impl fmt::Display for $ty {
                fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                    write!(f, "{}", self.0)
                }
            }
        )*
    };
}

display_inner!(ShaderId, ObjectId, FramebufferHandle, TextureHandle, ProgramHandle);

/// Monotonic handle source shared by the bundled contexts. Zero is never issued so a
/// zeroed handle can't alias a live resource.
#[derive(Debug, Default)]
pub(crate) struct HandleAllocator {
    last: u64,
}

impl HandleAllocator {
    pub(crate) fn next(&mut self) -> u64 {
        self.last += 1;
        self.last
    }
}
