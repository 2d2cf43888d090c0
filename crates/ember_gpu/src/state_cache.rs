//! Render-state cache
//!
//! Shadows every piece of observable pipeline state and drops redundant
//! calls before they reach the device. Each cached slot carries a
//! generation stamp; bumping the cache generation at frame start forces
//! the first write of every slot through, so external code touching the
//! context between frames cannot leave the shadow copy stale.

use crate::device::RenderDevice;
use crate::handle::{BufferHandle, BufferTarget, ProgramHandle, TextureHandle, VertexArrayHandle};
use crate::state::{BlendMode, CullFace, DepthFunc, ScissorRect, Viewport};
use ember_math::Color;

const MAX_TEXTURE_UNITS: usize = 16;

/// A shadowed value plus the generation it was last pushed to the device in
#[derive(Clone, Copy, Debug)]
struct Slot<T> {
    value: T,
    generation: u64,
}

impl<T: Default> Default for Slot<T> {
    fn default() -> Self {
        Self {
            value: T::default(),
            generation: 0,
        }
    }
}

impl<T: Copy + PartialEq> Slot<T> {
    /// True when the device must be touched for `value` in `generation`
    fn stale(&self, value: T, generation: u64) -> bool {
        self.generation != generation || self.value != value
    }

    fn store(&mut self, value: T, generation: u64) {
        self.value = value;
        self.generation = generation;
    }
}

/// Per-category redundancy statistics
#[derive(Clone, Copy, Debug, Default, serde::Serialize, serde::Deserialize)]
pub struct StateCacheStats {
    pub applied: u64,
    pub skipped: u64,
}

/// Shadow of all observable device state. One instance per device; all
/// state changes go through here.
pub struct RenderStateCache {
    generation: u64,
    program: Slot<ProgramHandle>,
    vertex_array: Slot<VertexArrayHandle>,
    array_buffer: Slot<BufferHandle>,
    element_buffer: Slot<BufferHandle>,
    textures: [Slot<TextureHandle>; MAX_TEXTURE_UNITS],
    blend: Slot<BlendMode>,
    cull: Slot<CullFace>,
    depth_test: Slot<bool>,
    depth_write: Slot<bool>,
    depth_func: Slot<DepthFunc>,
    scissor_enabled: Slot<bool>,
    scissor_rect: Slot<ScissorRect>,
    viewport: Slot<Viewport>,
    clear_color: Slot<Color>,
    stats: StateCacheStats,
}

macro_rules! cached_set {
    ($self:ident, $slot:ident, $value:expr, $apply:expr) => {{
        if $self.$slot.stale($value, $self.generation) {
            $apply;
            $self.$slot.store($value, $self.generation);
            $self.stats.applied += 1;
            true
        } else {
            $self.stats.skipped += 1;
            false
        }
    }};
}

impl RenderStateCache {
    pub fn new() -> Self {
        Self {
            // Generation 1 so zero-initialized slots are always stale
            generation: 1,
            program: Slot::default(),
            vertex_array: Slot::default(),
            array_buffer: Slot::default(),
            element_buffer: Slot::default(),
            textures: [Slot::default(); MAX_TEXTURE_UNITS],
            blend: Slot::default(),
            cull: Slot::default(),
            depth_test: Slot::default(),
            depth_write: Slot::default(),
            depth_func: Slot::default(),
            scissor_enabled: Slot::default(),
            scissor_rect: Slot::default(),
            viewport: Slot::default(),
            clear_color: Slot {
                value: Color::BLACK,
                generation: 0,
            },
            stats: StateCacheStats::default(),
        }
    }

    /// Invalidate every slot. The next write of each state goes through to
    /// the device regardless of the shadowed value. Called at frame start.
    pub fn begin_frame(&mut self) {
        self.generation += 1;
    }

    /// Forget everything, including statistics. Used after context loss.
    pub fn reset(&mut self) {
        *self = Self::new();
    }

    pub fn stats(&self) -> StateCacheStats {
        self.stats
    }

    /// Currently bound program, as shadowed
    pub fn current_program(&self) -> ProgramHandle {
        if self.program.generation == self.generation {
            self.program.value
        } else {
            ProgramHandle::NULL
        }
    }

    pub fn bind_program(&mut self, device: &dyn RenderDevice, handle: ProgramHandle) -> bool {
        cached_set!(self, program, handle, device.bind_program(handle))
    }

    pub fn bind_vertex_array(
        &mut self,
        device: &dyn RenderDevice,
        handle: VertexArrayHandle,
    ) -> bool {
        cached_set!(self, vertex_array, handle, device.bind_vertex_array(handle))
    }

    pub fn bind_buffer(
        &mut self,
        device: &dyn RenderDevice,
        target: BufferTarget,
        handle: BufferHandle,
    ) -> bool {
        match target {
            BufferTarget::Array => {
                cached_set!(self, array_buffer, handle, device.bind_buffer(target, handle))
            }
            BufferTarget::ElementArray => {
                cached_set!(self, element_buffer, handle, device.bind_buffer(target, handle))
            }
        }
    }

    pub fn bind_texture(
        &mut self,
        device: &dyn RenderDevice,
        unit: u32,
        handle: TextureHandle,
    ) -> bool {
        let slot = match self.textures.get_mut(unit as usize) {
            Some(slot) => slot,
            None => {
                log::warn!("texture unit {unit} out of range, ignoring bind");
                return false;
            }
        };
        if slot.stale(handle, self.generation) {
            device.bind_texture(unit, handle);
            slot.store(handle, self.generation);
            self.stats.applied += 1;
            true
        } else {
            self.stats.skipped += 1;
            false
        }
    }

    pub fn set_blend_mode(&mut self, device: &dyn RenderDevice, mode: BlendMode) -> bool {
        cached_set!(self, blend, mode, device.set_blend_mode(mode))
    }

    pub fn set_cull_face(&mut self, device: &dyn RenderDevice, mode: CullFace) -> bool {
        cached_set!(self, cull, mode, device.set_cull_face(mode))
    }

    pub fn set_depth_test(&mut self, device: &dyn RenderDevice, enabled: bool) -> bool {
        cached_set!(self, depth_test, enabled, device.set_depth_test(enabled))
    }

    pub fn set_depth_write(&mut self, device: &dyn RenderDevice, enabled: bool) -> bool {
        cached_set!(self, depth_write, enabled, device.set_depth_write(enabled))
    }

    pub fn set_depth_func(&mut self, device: &dyn RenderDevice, func: DepthFunc) -> bool {
        cached_set!(self, depth_func, func, device.set_depth_func(func))
    }

    pub fn set_scissor_enabled(&mut self, device: &dyn RenderDevice, enabled: bool) -> bool {
        cached_set!(
            self,
            scissor_enabled,
            enabled,
            device.set_scissor_enabled(enabled)
        )
    }

    pub fn set_scissor_rect(&mut self, device: &dyn RenderDevice, rect: ScissorRect) -> bool {
        cached_set!(self, scissor_rect, rect, device.set_scissor_rect(rect))
    }

    pub fn set_viewport(&mut self, device: &dyn RenderDevice, viewport: Viewport) -> bool {
        cached_set!(self, viewport, viewport, device.set_viewport(viewport))
    }

    pub fn set_clear_color(&mut self, device: &dyn RenderDevice, color: Color) -> bool {
        cached_set!(self, clear_color, color, device.set_clear_color(color))
    }
}

impl Default for RenderStateCache {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::device::HeadlessDevice;

    #[test]
    fn test_redundant_calls_skipped() {
        let device = HeadlessDevice::new();
        let mut cache = RenderStateCache::new();
        cache.begin_frame();

        assert!(cache.set_blend_mode(&device, BlendMode::Alpha));
        assert!(!cache.set_blend_mode(&device, BlendMode::Alpha));
        assert!(cache.set_blend_mode(&device, BlendMode::Opaque));
        assert_eq!(device.counters().state_calls, 2);
        assert_eq!(cache.stats().skipped, 1);
    }

    #[test]
    fn test_new_frame_forces_rebind() {
        let device = HeadlessDevice::new();
        let mut cache = RenderStateCache::new();
        cache.begin_frame();

        let program = ProgramHandle::new(3);
        assert!(cache.bind_program(&device, program));
        assert!(!cache.bind_program(&device, program));

        cache.begin_frame();
        // Same value, but the slot is stale in the new generation
        assert!(cache.bind_program(&device, program));
        assert_eq!(device.counters().bind_calls, 2);
    }

    #[test]
    fn test_texture_units_cached_independently() {
        let device = HeadlessDevice::new();
        let mut cache = RenderStateCache::new();
        cache.begin_frame();

        let tex = TextureHandle::new(5);
        assert!(cache.bind_texture(&device, 0, tex));
        assert!(cache.bind_texture(&device, 1, tex));
        assert!(!cache.bind_texture(&device, 0, tex));
        assert_eq!(device.counters().bind_calls, 2);
    }

    #[test]
    fn test_out_of_range_texture_unit() {
        let device = HeadlessDevice::new();
        let mut cache = RenderStateCache::new();
        cache.begin_frame();
        assert!(!cache.bind_texture(&device, 99, TextureHandle::new(1)));
        assert_eq!(device.counters().bind_calls, 0);
    }

    #[test]
    fn test_buffer_targets_cached_separately() {
        let device = HeadlessDevice::new();
        let mut cache = RenderStateCache::new();
        cache.begin_frame();

        let buf = BufferHandle::new(2);
        assert!(cache.bind_buffer(&device, BufferTarget::Array, buf));
        assert!(cache.bind_buffer(&device, BufferTarget::ElementArray, buf));
        assert!(!cache.bind_buffer(&device, BufferTarget::Array, buf));
    }

    #[test]
    fn test_reset_clears_stats() {
        let device = HeadlessDevice::new();
        let mut cache = RenderStateCache::new();
        cache.begin_frame();
        cache.set_depth_test(&device, true);
        cache.reset();
        assert_eq!(cache.stats().applied, 0);
        assert_eq!(cache.current_program(), ProgramHandle::NULL);
    }
}
