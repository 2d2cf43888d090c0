//! Render device trait and the headless recording backend
//!
//! `RenderDevice` is the narrow seam between the engine and a graphics
//! API: object creation, raw binds, fixed-function state and the draw
//! primitives. Redundancy filtering lives in `RenderStateCache`, not here;
//! backends execute exactly what they are told.

use crate::handle::{BufferHandle, BufferTarget, ProgramHandle, TextureHandle, VertexArrayHandle};
use crate::state::{BlendMode, CullFace, DepthFunc, ScissorRect, TextureDesc, Viewport};
use crate::thread_guard::ThreadGuard;
use ember_core::{Error, Result};
use ember_math::Color;
use parking_lot::Mutex;
use std::collections::BTreeMap;

/// The GPU seam. All calls must happen on the thread that created the
/// device; backends are expected to assert this in debug builds.
pub trait RenderDevice: Send + Sync {
    // ---- object creation / destruction ----
    fn create_buffer(&self, target: BufferTarget, data: &[u8]) -> Result<BufferHandle>;
    fn update_buffer(&self, handle: BufferHandle, data: &[u8]) -> Result<()>;
    fn destroy_buffer(&self, handle: BufferHandle);
    fn create_vertex_array(&self) -> Result<VertexArrayHandle>;
    fn destroy_vertex_array(&self, handle: VertexArrayHandle);
    fn create_texture(&self, desc: &TextureDesc, pixels: &[u8]) -> Result<TextureHandle>;
    fn destroy_texture(&self, handle: TextureHandle);
    fn create_program(&self, vertex_src: &str, fragment_src: &str) -> Result<ProgramHandle>;
    fn destroy_program(&self, handle: ProgramHandle);

    // ---- raw binds (filtered by the state cache) ----
    fn bind_program(&self, handle: ProgramHandle);
    fn bind_vertex_array(&self, handle: VertexArrayHandle);
    fn bind_buffer(&self, target: BufferTarget, handle: BufferHandle);
    fn bind_texture(&self, unit: u32, handle: TextureHandle);

    // ---- fixed-function state ----
    fn set_blend_mode(&self, mode: BlendMode);
    fn set_cull_face(&self, mode: CullFace);
    fn set_depth_test(&self, enabled: bool);
    fn set_depth_write(&self, enabled: bool);
    fn set_depth_func(&self, func: DepthFunc);
    fn set_scissor_enabled(&self, enabled: bool);
    fn set_scissor_rect(&self, rect: ScissorRect);
    fn set_viewport(&self, viewport: Viewport);
    fn set_clear_color(&self, color: Color);

    // ---- frame operations ----
    fn clear(&self, color: bool, depth: bool, stencil: bool);
    fn draw_indexed(&self, index_count: u32);
    fn draw_indexed_instanced(&self, index_count: u32, instance_count: u32);
    fn present(&self);
}

/// Raw call counters, exposed for tests and statistics
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct DeviceCounters {
    pub draw_calls: u64,
    pub instanced_draw_calls: u64,
    pub instances_drawn: u64,
    pub buffers_created: u64,
    pub textures_created: u64,
    pub programs_created: u64,
    pub bind_calls: u64,
    pub state_calls: u64,
    pub clears: u64,
    pub presents: u64,
}

#[derive(Default)]
struct HeadlessState {
    counters: DeviceCounters,
    next_handle: u32,
    buffers: BTreeMap<u32, usize>,
    clear_color: Color,
    framebuffer_color: Color,
    viewport: Viewport,
    // Injectable failures for the fallback-path tests
    fail_buffer_creation: bool,
    fail_texture_creation: bool,
    fail_program_creation: bool,
}

/// Recording backend. Allocates handles sequentially, tracks the simulated
/// framebuffer clear color, and can be told to fail allocations so the
/// batcher's fallback paths can be exercised without a GPU.
pub struct HeadlessDevice {
    guard: ThreadGuard,
    state: Mutex<HeadlessState>,
}

impl HeadlessDevice {
    pub fn new() -> Self {
        Self {
            guard: ThreadGuard::new(),
            state: Mutex::new(HeadlessState {
                framebuffer_color: Color::BLACK,
                clear_color: Color::BLACK,
                ..Default::default()
            }),
        }
    }

    /// Snapshot of the raw call counters
    pub fn counters(&self) -> DeviceCounters {
        self.state.lock().counters
    }

    /// Reset counters between test phases
    pub fn reset_counters(&self) {
        self.state.lock().counters = DeviceCounters::default();
    }

    /// Color left in the simulated framebuffer by the last clear
    pub fn framebuffer_color(&self) -> Color {
        self.state.lock().framebuffer_color
    }

    /// Current viewport
    pub fn viewport(&self) -> Viewport {
        self.state.lock().viewport
    }

    /// Make the next buffer creation fail (one-shot)
    pub fn fail_next_buffer_creation(&self) {
        self.state.lock().fail_buffer_creation = true;
    }

    /// Make the next texture creation fail (one-shot)
    pub fn fail_next_texture_creation(&self) {
        self.state.lock().fail_texture_creation = true;
    }

    /// Make the next program creation fail (one-shot)
    pub fn fail_next_program_creation(&self) {
        self.state.lock().fail_program_creation = true;
    }

    fn allocate(state: &mut HeadlessState) -> u32 {
        state.next_handle += 1;
        state.next_handle
    }
}

impl Default for HeadlessDevice {
    fn default() -> Self {
        Self::new()
    }
}

impl RenderDevice for HeadlessDevice {
    fn create_buffer(&self, _target: BufferTarget, data: &[u8]) -> Result<BufferHandle> {
        self.guard.check("create_buffer");
        let mut state = self.state.lock();
        if state.fail_buffer_creation {
            state.fail_buffer_creation = false;
            return Err(Error::UploadFailed("buffer allocation failed".into()));
        }
        let raw = Self::allocate(&mut state);
        state.buffers.insert(raw, data.len());
        state.counters.buffers_created += 1;
        Ok(BufferHandle::new(raw))
    }

    fn update_buffer(&self, handle: BufferHandle, data: &[u8]) -> Result<()> {
        self.guard.check("update_buffer");
        let mut state = self.state.lock();
        match state.buffers.get_mut(&handle.raw()) {
            Some(size) => {
                *size = data.len();
                Ok(())
            }
            None => Err(Error::InvalidArgument(format!(
                "update of unknown buffer {handle:?}"
            ))),
        }
    }

    fn destroy_buffer(&self, handle: BufferHandle) {
        self.state.lock().buffers.remove(&handle.raw());
    }

    fn create_vertex_array(&self) -> Result<VertexArrayHandle> {
        self.guard.check("create_vertex_array");
        let mut state = self.state.lock();
        let raw = Self::allocate(&mut state);
        Ok(VertexArrayHandle::new(raw))
    }

    fn destroy_vertex_array(&self, _handle: VertexArrayHandle) {}

    fn create_texture(&self, desc: &TextureDesc, pixels: &[u8]) -> Result<TextureHandle> {
        self.guard.check("create_texture");
        let mut state = self.state.lock();
        if state.fail_texture_creation {
            state.fail_texture_creation = false;
            return Err(Error::UploadFailed("texture allocation failed".into()));
        }
        if desc.width == 0 || desc.height == 0 {
            return Err(Error::InvalidArgument("zero-sized texture".into()));
        }
        if !pixels.is_empty() && pixels.len() < desc.byte_size() {
            return Err(Error::UploadFailed(format!(
                "texture data too small: {} < {}",
                pixels.len(),
                desc.byte_size()
            )));
        }
        let raw = Self::allocate(&mut state);
        state.counters.textures_created += 1;
        Ok(TextureHandle::new(raw))
    }

    fn destroy_texture(&self, _handle: TextureHandle) {}

    fn create_program(&self, vertex_src: &str, fragment_src: &str) -> Result<ProgramHandle> {
        self.guard.check("create_program");
        let mut state = self.state.lock();
        if state.fail_program_creation {
            state.fail_program_creation = false;
            return Err(Error::UploadFailed("program link failed".into()));
        }
        if vertex_src.is_empty() || fragment_src.is_empty() {
            return Err(Error::InvalidArgument("empty shader source".into()));
        }
        let raw = Self::allocate(&mut state);
        state.counters.programs_created += 1;
        Ok(ProgramHandle::new(raw))
    }

    fn destroy_program(&self, _handle: ProgramHandle) {}

    fn bind_program(&self, _handle: ProgramHandle) {
        self.state.lock().counters.bind_calls += 1;
    }

    fn bind_vertex_array(&self, _handle: VertexArrayHandle) {
        self.state.lock().counters.bind_calls += 1;
    }

    fn bind_buffer(&self, _target: BufferTarget, _handle: BufferHandle) {
        self.state.lock().counters.bind_calls += 1;
    }

    fn bind_texture(&self, _unit: u32, _handle: TextureHandle) {
        self.state.lock().counters.bind_calls += 1;
    }

    fn set_blend_mode(&self, _mode: BlendMode) {
        self.state.lock().counters.state_calls += 1;
    }

    fn set_cull_face(&self, _mode: CullFace) {
        self.state.lock().counters.state_calls += 1;
    }

    fn set_depth_test(&self, _enabled: bool) {
        self.state.lock().counters.state_calls += 1;
    }

    fn set_depth_write(&self, _enabled: bool) {
        self.state.lock().counters.state_calls += 1;
    }

    fn set_depth_func(&self, _func: DepthFunc) {
        self.state.lock().counters.state_calls += 1;
    }

    fn set_scissor_enabled(&self, _enabled: bool) {
        self.state.lock().counters.state_calls += 1;
    }

    fn set_scissor_rect(&self, _rect: ScissorRect) {
        self.state.lock().counters.state_calls += 1;
    }

    fn set_viewport(&self, viewport: Viewport) {
        let mut state = self.state.lock();
        state.viewport = viewport;
        state.counters.state_calls += 1;
    }

    fn set_clear_color(&self, color: Color) {
        let mut state = self.state.lock();
        state.clear_color = color;
        state.counters.state_calls += 1;
    }

    fn clear(&self, color: bool, _depth: bool, _stencil: bool) {
        self.guard.check("clear");
        let mut state = self.state.lock();
        if color {
            state.framebuffer_color = state.clear_color;
        }
        state.counters.clears += 1;
    }

    fn draw_indexed(&self, _index_count: u32) {
        self.guard.check("draw_indexed");
        let mut state = self.state.lock();
        state.counters.draw_calls += 1;
        state.counters.instances_drawn += 1;
    }

    fn draw_indexed_instanced(&self, _index_count: u32, instance_count: u32) {
        self.guard.check("draw_indexed_instanced");
        let mut state = self.state.lock();
        state.counters.draw_calls += 1;
        state.counters.instanced_draw_calls += 1;
        state.counters.instances_drawn += instance_count as u64;
    }

    fn present(&self) {
        self.guard.check("present");
        self.state.lock().counters.presents += 1;
    }
}
