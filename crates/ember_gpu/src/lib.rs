//! # ember_gpu - GPU abstraction and render-state cache
//!
//! The rest of the engine never talks to a graphics API directly. It goes
//! through:
//! - typed handles ([`ProgramHandle`], [`BufferHandle`], [`TextureHandle`],
//!   [`VertexArrayHandle`]),
//! - the [`RenderDevice`] trait covering buffer/texture/program creation
//!   and the draw primitives,
//! - the [`RenderStateCache`] which shadows all observable pipeline state
//!   and filters redundant calls before they reach the device.
//!
//! [`HeadlessDevice`] is a recording backend used by the test suite; a real
//! OpenGL backend would implement the same trait.

pub mod device;
pub mod handle;
pub mod state;
pub mod state_cache;
pub mod thread_guard;

pub use device::{DeviceCounters, HeadlessDevice, RenderDevice};
pub use handle::{BufferHandle, BufferTarget, ProgramHandle, TextureHandle, VertexArrayHandle};
pub use state::{
    BlendMode, CullFace, DepthFunc, ScissorRect, TextureDesc, TextureFilter, TextureFormat,
    TextureWrap, Viewport,
};
pub use state_cache::{RenderStateCache, StateCacheStats};
pub use thread_guard::ThreadGuard;
