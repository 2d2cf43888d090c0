//! Renderer facade
//!
//! Owns the device, the layer registry, the state cache and the batcher.
//! Render systems submit [`Renderable`]s during the update pass; the
//! frame loop is `begin_frame`, submissions, `flush_render_queue`,
//! `end_frame`, `present`.

use crate::batching::{
    Batch, BatchList, BatchPath, BatchingManager, BatchingMode, InstanceData, QueueItem,
};
use crate::camera::ActiveCamera;
use crate::layer::{LayerOverrides, LayerRegistry, LayerType};
use crate::light::LightFrame;
use crate::lod::LodLevel;
use crate::renderable::{Renderable, RenderablePayload};
use crate::sort_key::{hash_overrides, pipeline_flags, MaterialSortKey, SortKey};
use crate::stats::FrameStats;
use ember_asset::{primitives, LoaderStatsSnapshot, Material, Mesh, Shader, Texture, UploadState};
use ember_core::FrameTimer;
use ember_gpu::{BufferTarget, DepthFunc, RenderDevice, RenderStateCache, StateCacheStats};
use ember_math::Color;
use parking_lot::{Mutex, RwLock};
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::Arc;

/// Top-level renderer. All methods take `&self`; interior state is
/// behind locks so systems can share it through an `Arc`.
pub struct Renderer {
    device: Arc<dyn RenderDevice>,
    layers: RwLock<LayerRegistry>,
    batching: Mutex<BatchingManager>,
    state_cache: Mutex<RenderStateCache>,
    queue: Mutex<Vec<Renderable>>,
    stats: Mutex<FrameStats>,
    last_stats: Mutex<FrameStats>,
    camera: Mutex<Option<ActiveCamera>>,
    lights: Mutex<LightFrame>,
    clear_color: Mutex<Color>,
    active_layer_mask: AtomicU32,
    timer: Mutex<FrameTimer>,
    /// Shared unit quad drawn for sprites
    quad: Arc<Mesh>,
    in_frame: AtomicBool,
}

impl Renderer {
    pub fn new(device: Arc<dyn RenderDevice>) -> Self {
        let mut layers = LayerRegistry::new();
        layers.set_default_layers();
        Self {
            device,
            layers: RwLock::new(layers),
            batching: Mutex::new(BatchingManager::new()),
            state_cache: Mutex::new(RenderStateCache::new()),
            queue: Mutex::new(Vec::new()),
            stats: Mutex::new(FrameStats::default()),
            last_stats: Mutex::new(FrameStats::default()),
            camera: Mutex::new(None),
            lights: Mutex::new(LightFrame::default()),
            clear_color: Mutex::new(Color::new(0.1, 0.1, 0.15, 1.0)),
            active_layer_mask: AtomicU32::new(u32::MAX),
            timer: Mutex::new(FrameTimer::new()),
            quad: Arc::new(primitives::unit_quad("renderer.sprite_quad")),
            in_frame: AtomicBool::new(false),
        }
    }

    pub fn device(&self) -> &Arc<dyn RenderDevice> {
        &self.device
    }

    /// Access the layer registry under its lock
    pub fn with_layers<R>(&self, f: impl FnOnce(&mut LayerRegistry) -> R) -> R {
        f(&mut self.layers.write())
    }

    // ---- frame loop ----

    /// Start a frame: reset statistics, invalidate the state cache and
    /// clear the backbuffer. Returns the frame delta in seconds.
    pub fn begin_frame(&self) -> f32 {
        if self.in_frame.swap(true, Ordering::AcqRel) {
            log::warn!("begin_frame called twice without end_frame");
        }
        let delta = self.timer.lock().tick();
        *self.stats.lock() = FrameStats::default();

        let mut cache = self.state_cache.lock();
        cache.begin_frame();
        cache.set_clear_color(self.device.as_ref(), *self.clear_color.lock());
        self.device.clear(true, true, false);
        delta
    }

    /// Snapshot this frame's statistics
    pub fn end_frame(&self) {
        *self.last_stats.lock() = *self.stats.lock();
        self.in_frame.store(false, Ordering::Release);
    }

    pub fn present(&self) {
        self.device.present();
    }

    pub fn clear(&self, color: bool, depth: bool, stencil: bool) {
        self.device.clear(color, depth, stencil);
    }

    pub fn set_clear_color(&self, color: Color) {
        *self.clear_color.lock() = color;
    }

    pub fn clear_color(&self) -> Color {
        *self.clear_color.lock()
    }

    pub fn delta_seconds(&self) -> f32 {
        self.timer.lock().delta_seconds()
    }

    pub fn fps(&self) -> f32 {
        self.timer.lock().fps()
    }

    // ---- configuration ----

    pub fn set_batching_mode(&self, mode: BatchingMode) {
        self.batching.lock().set_mode(mode);
    }

    pub fn batching_mode(&self) -> BatchingMode {
        self.batching.lock().mode()
    }

    pub fn set_lod_instancing_enabled(&self, enabled: bool) {
        self.batching.lock().set_lod_instancing_enabled(enabled);
    }

    pub fn set_lod_instancing_batch_size(&self, size: usize) {
        self.batching.lock().set_lod_instancing_batch_size(size);
    }

    pub fn pending_instance_count(&self) -> usize {
        self.batching.lock().pending_instance_count()
    }

    /// Global AND-mask over layer mask bits; layers whose bit is cleared
    /// are skipped at flush regardless of camera masks
    pub fn set_active_layer_mask(&self, mask: u32) {
        self.active_layer_mask.store(mask, Ordering::Relaxed);
    }

    pub fn active_layer_mask(&self) -> u32 {
        self.active_layer_mask.load(Ordering::Relaxed)
    }

    // ---- per-frame shared snapshots ----

    pub fn set_active_camera(&self, camera: Option<ActiveCamera>) {
        *self.camera.lock() = camera;
    }

    pub fn active_camera(&self) -> Option<ActiveCamera> {
        self.camera.lock().clone()
    }

    pub fn set_light_frame(&self, lights: LightFrame) {
        *self.lights.lock() = lights;
    }

    pub fn light_frame(&self) -> LightFrame {
        self.lights.lock().clone()
    }

    // ---- statistics ----

    pub fn stats(&self) -> FrameStats {
        *self.stats.lock()
    }

    pub fn last_frame_stats(&self) -> FrameStats {
        *self.last_stats.lock()
    }

    pub fn state_cache_stats(&self) -> StateCacheStats {
        self.state_cache.lock().stats()
    }

    /// Count items a system rejected before submission
    pub fn note_culled(&self, count: u64) {
        self.stats.lock().culled += count;
    }

    pub fn note_lod_level(&self, level: LodLevel) {
        self.stats.lock().count_lod(level);
    }

    /// Fold loader statistics into this frame's counters
    pub fn merge_loader_stats(&self, snapshot: &LoaderStatsSnapshot) {
        let mut stats = self.stats.lock();
        stats.worker_processed = snapshot.processed as u64;
        stats.worker_max_queue_depth = snapshot.max_queue_depth as u64;
        stats.worker_wait_time_ms = snapshot.wait_time_ms;
    }

    // ---- submission ----

    pub fn submit_renderable(&self, renderable: Renderable) {
        self.queue.lock().push(renderable);
    }

    pub fn queued_count(&self) -> usize {
        self.queue.lock().len()
    }

    /// Sort, batch and draw everything submitted since the last flush
    pub fn flush_render_queue(&self) {
        let drained: Vec<Renderable> = std::mem::take(&mut *self.queue.lock());
        let mut items = self.build_queue_items(drained);
        items.sort_by(|a, b| a.key.cmp(&b.key));

        let mut batching = self.batching.lock();
        let list = batching.build_batches(&items);
        let mut cache = self.state_cache.lock();
        self.issue_batches(&items, &list, &mut batching, &mut cache);

        let mut stats = self.stats.lock();
        stats.batch_count += list.batches.len() as u64;
        stats.lod_instancing_groups += list.lod_groups as u64;
        stats.lod_deferred_instances += list.deferred_instances as u64;
        stats.fallback_batches += batching.take_fallback_batches();
        debug_assert!(stats.invariant_holds());
    }

    /// Resolve layer and material state into sort keys, dropping items
    /// on missing, disabled or masked-out layers
    fn build_queue_items(&self, drained: Vec<Renderable>) -> Vec<QueueItem> {
        let layers = self.layers.read();
        let camera = self.camera.lock().clone();
        let mask = self.active_layer_mask.load(Ordering::Relaxed);
        let mut stats = self.stats.lock();
        stats.submitted += drained.len() as u64;

        let mut items = Vec::with_capacity(drained.len());
        for (index, renderable) in drained.into_iter().enumerate() {
            if !renderable.header.visible {
                stats.culled += 1;
                continue;
            }
            let layer_id = renderable.header.layer;
            let (descriptor, state) = match (layers.descriptor(layer_id), layers.state(layer_id)) {
                (Some(d), Some(s)) => (d, s),
                _ => {
                    log::warn!("dropping renderable on unregistered layer {layer_id:?}");
                    stats.culled += 1;
                    continue;
                }
            };
            if !state.enabled || descriptor.mask_bit() & mask == 0 {
                stats.culled += 1;
                continue;
            }

            let material = self.material_key(&renderable, &state.overrides, descriptor.layer_type);
            let depth_key = match &camera {
                Some(camera) => {
                    let world_pos = renderable.header.world_matrix.translation();
                    SortKey::depth_key_for(camera.view_depth(world_pos))
                }
                None => 0,
            };
            let key = SortKey {
                layer_priority: descriptor.priority,
                sort_bias: descriptor.sort_bias,
                policy: descriptor.sort_policy,
                material,
                depth_key,
                sort_order: renderable.header.sort_order,
                texture_id: texture_id_of(&renderable),
                submission_index: index as u32,
            };
            items.push(QueueItem { renderable, key });
        }
        items
    }

    /// Pipeline identity for one item: material hints layered under the
    /// layer overrides, or a precomputed key when the submitter set one
    fn material_key(
        &self,
        renderable: &Renderable,
        overrides: &LayerOverrides,
        layer_type: LayerType,
    ) -> MaterialSortKey {
        if let Some(key) = renderable.header.sort_key {
            return key;
        }
        let mut key = match renderable.mesh_and_material() {
            Some((_, material)) => {
                let hints = material.render_state();
                MaterialSortKey {
                    blend_mode: hints.blend_mode,
                    cull_face: hints.cull_face,
                    depth_test: hints.depth_test,
                    depth_write: hints.depth_write,
                    shader_id: material
                        .shader()
                        .map(|s| s.program().raw())
                        .unwrap_or(0),
                    material_id: material.stable_id(),
                    ..Default::default()
                }
            }
            // Sprites and text blend in screen space
            None => MaterialSortKey {
                blend_mode: ember_gpu::BlendMode::Alpha,
                depth_test: false,
                ..Default::default()
            },
        };
        if let Some(blend) = overrides.blend_mode {
            key.blend_mode = blend;
        }
        if let Some(cull) = overrides.cull_face {
            key.cull_face = cull;
        }
        if let Some(depth_test) = overrides.depth_test {
            key.depth_test = depth_test;
        }
        if let Some(depth_write) = overrides.depth_write {
            key.depth_write = depth_write;
        }
        if layer_type != LayerType::World {
            key.screen_space = true;
            key.pipeline_flags |= pipeline_flags::SCREEN_SPACE;
        }
        key.override_hash = renderable.header.overrides.hash();
        key
    }

    fn issue_batches(
        &self,
        items: &[QueueItem],
        list: &BatchList,
        batching: &mut BatchingManager,
        cache: &mut RenderStateCache,
    ) {
        for batch in &list.batches {
            let Some(&first_index) = batch.indices.first() else {
                continue;
            };
            let first = &items[first_index];
            self.apply_layer_state(cache, first);
            let shader = self.apply_pipeline(cache, first);

            match batch.path {
                BatchPath::Individual => {
                    self.draw_individual(cache, items, batch, batching, shader.as_deref(), false);
                }
                BatchPath::CpuMerge => {
                    self.draw_cpu_merged(cache, items, batch, batching, shader.as_deref());
                }
                BatchPath::Instanced => {
                    self.draw_instanced(cache, items, batch, batching, shader.as_deref());
                }
            }
        }
    }

    fn apply_layer_state(&self, cache: &mut RenderStateCache, item: &QueueItem) {
        let layers = self.layers.read();
        let Some(state) = layers.state(item.renderable.header.layer) else {
            return;
        };
        let device = self.device.as_ref();
        if let Some(viewport) = state.viewport {
            cache.set_viewport(device, viewport);
        }
        match state.scissor {
            Some(rect) => {
                cache.set_scissor_enabled(device, true);
                cache.set_scissor_rect(device, rect);
            }
            None => {
                cache.set_scissor_enabled(device, false);
            }
        }
        if let Some(func) = state.overrides.depth_func {
            cache.set_depth_func(device, func);
        } else {
            cache.set_depth_func(device, DepthFunc::default());
        }
    }

    /// Push blend/cull/depth state and bind the item's program and
    /// textures. Returns the shader driving per-draw uniforms.
    fn apply_pipeline(&self, cache: &mut RenderStateCache, item: &QueueItem) -> Option<Arc<Shader>> {
        let device = self.device.as_ref();
        let key = &item.key.material;
        cache.set_blend_mode(device, key.blend_mode);
        cache.set_cull_face(device, key.cull_face);
        cache.set_depth_test(device, key.depth_test);
        cache.set_depth_write(device, key.depth_write);

        match &item.renderable.payload {
            RenderablePayload::Sprite { texture, .. } => {
                if texture.is_uploaded() || texture.upload(device).is_ok() {
                    cache.bind_texture(device, 0, texture.handle());
                }
                None
            }
            RenderablePayload::Text {
                texture, shader, ..
            } => {
                if texture.is_uploaded() || texture.upload(device).is_ok() {
                    cache.bind_texture(device, 0, texture.handle());
                }
                if let Some(shader) = shader {
                    cache.bind_program(device, shader.program());
                }
                shader.clone()
            }
            _ => {
                let (_, material) = item.renderable.mesh_and_material()?;
                self.bind_material(cache, &material, &item.renderable.header.overrides)
            }
        }
    }

    fn bind_material(
        &self,
        cache: &mut RenderStateCache,
        material: &Arc<Material>,
        overrides: &crate::renderable::InstanceOverrides,
    ) -> Option<Arc<Shader>> {
        let device = self.device.as_ref();
        let shader = material.shader()?;
        cache.bind_program(device, shader.program());

        let mut unit = 0u32;
        material.for_each_texture(|name, texture| {
            if texture.is_uploaded() || texture.upload(device).is_ok() {
                cache.bind_texture(device, unit, texture.handle());
                shader.set_int(name, unit as i32);
            }
            unit += 1;
        });
        if let Some(texture) = &overrides.texture {
            if texture.is_uploaded() || texture.upload(device).is_ok() {
                cache.bind_texture(device, 0, texture.handle());
            }
        }

        let mut diffuse = material.diffuse_color();
        if let Some(tint) = overrides.tint {
            diffuse = diffuse * tint;
        }
        if let Some(opacity) = overrides.opacity {
            diffuse.a *= opacity.clamp(0.0, 1.0);
        }
        shader.set_color("u_diffuse_color", diffuse);
        shader.set_float("u_opacity", material.opacity());
        self.push_camera_uniforms(&shader);
        Some(shader)
    }

    fn push_camera_uniforms(&self, shader: &Shader) {
        if let Some(camera) = self.camera.lock().as_ref() {
            shader.set_mat4("u_view", &camera.view);
            shader.set_mat4("u_projection", &camera.projection);
        }
    }

    fn item_mesh(&self, renderable: &Renderable) -> Option<Arc<Mesh>> {
        match &renderable.payload {
            RenderablePayload::Sprite { .. } => Some(Arc::clone(&self.quad)),
            RenderablePayload::Text { mesh, .. } => Some(Arc::clone(mesh)),
            _ => renderable.mesh_and_material().map(|(mesh, _)| mesh),
        }
    }

    /// Upload on first use; skip items whose mesh cannot reach the GPU
    fn ensure_uploaded(&self, mesh: &Mesh) -> bool {
        match mesh.upload_state() {
            UploadState::Uploaded => true,
            UploadState::NotUploaded => match mesh.upload(self.device.as_ref()) {
                Ok(()) => true,
                Err(e) => {
                    log::warn!("upload of '{}' failed: {e}", mesh.name());
                    false
                }
            },
            UploadState::Uploading | UploadState::Failed => false,
        }
    }

    fn draw_individual(
        &self,
        cache: &mut RenderStateCache,
        items: &[QueueItem],
        batch: &Batch,
        batching: &mut BatchingManager,
        shader: Option<&Shader>,
        fallback: bool,
    ) {
        let device = self.device.as_ref();
        let mut stats = self.stats.lock();
        for &index in &batch.indices {
            let item = &items[index];
            if let RenderablePayload::Sprite { texture, instances } = &item.renderable.payload {
                self.draw_sprite_batch(cache, batching, texture, instances, fallback, &mut stats);
                continue;
            }
            let Some(mesh) = self.item_mesh(&item.renderable) else {
                stats.culled += 1;
                continue;
            };
            if !self.ensure_uploaded(&mesh) {
                stats.culled += 1;
                continue;
            }
            cache.bind_vertex_array(device, mesh.gpu().vertex_array);
            if let Some(shader) = shader {
                shader.set_mat4("u_model", &item.renderable.header.world_matrix);
            }
            device.draw_indexed(mesh.index_count() as u32);
            stats.draw_calls += 1;
            if fallback {
                stats.fallback_draw_calls += 1;
            }
        }
    }

    /// Issue one pre-built sprite group as a single instanced quad draw.
    /// The instance buffer is cached per texture and reused across frames.
    fn draw_sprite_batch(
        &self,
        cache: &mut RenderStateCache,
        batching: &mut BatchingManager,
        texture: &Arc<Texture>,
        instances: &[InstanceData],
        fallback: bool,
        stats: &mut FrameStats,
    ) {
        if instances.is_empty() {
            return;
        }
        let device = self.device.as_ref();
        if !self.ensure_uploaded(&self.quad) {
            stats.culled += instances.len() as u64;
            return;
        }
        let cache_key = hash_overrides(&[
            Arc::as_ptr(texture) as usize as u64,
            Arc::as_ptr(&self.quad) as usize as u64,
        ]);
        let buffer = match batching.upload_instances(device, cache_key, instances) {
            Ok(buffer) => buffer,
            Err(e) => {
                log::warn!("sprite instance upload failed: {e}");
                batching.note_fallback();
                stats.culled += instances.len() as u64;
                return;
            }
        };
        cache.bind_vertex_array(device, self.quad.gpu().vertex_array);
        cache.bind_buffer(device, BufferTarget::Array, buffer);
        device.draw_indexed_instanced(self.quad.index_count() as u32, instances.len() as u32);
        stats.draw_calls += 1;
        if fallback {
            stats.fallback_draw_calls += 1;
        } else {
            stats.instanced_draw_calls += 1;
            stats.instanced_instances += instances.len() as u64;
        }
    }

    fn draw_cpu_merged(
        &self,
        cache: &mut RenderStateCache,
        items: &[QueueItem],
        batch: &Batch,
        batching: &mut BatchingManager,
        shader: Option<&Shader>,
    ) {
        let device = self.device.as_ref();
        let merged = match batching.merge_cpu(items, batch) {
            Ok(mesh) => mesh,
            Err(e) => {
                log::warn!("CPU merge failed, drawing individually: {e}");
                batching.note_fallback();
                self.draw_individual(cache, items, batch, batching, shader, true);
                return;
            }
        };
        if merged.upload(device).is_err() {
            batching.note_fallback();
            self.draw_individual(cache, items, batch, batching, shader, true);
            return;
        }
        cache.bind_vertex_array(device, merged.gpu().vertex_array);
        if let Some(shader) = shader {
            // Vertices are pre-transformed
            shader.set_mat4("u_model", &ember_math::Mat4::IDENTITY);
        }
        device.draw_indexed(merged.index_count() as u32);

        let mut stats = self.stats.lock();
        stats.draw_calls += 1;
        stats.batched_draw_calls += 1;
        stats.batched_triangles += merged.triangle_count() as u64;
        stats.batched_vertices += merged.vertex_count() as u64;
        drop(stats);
        // The merged mesh lives for this draw only
        merged.destroy_gpu(device);
    }

    fn draw_instanced(
        &self,
        cache: &mut RenderStateCache,
        items: &[QueueItem],
        batch: &Batch,
        batching: &mut BatchingManager,
        shader: Option<&Shader>,
    ) {
        let device = self.device.as_ref();
        let first = &items[batch.indices[0]];
        let Some(mesh) = self.item_mesh(&first.renderable) else {
            batching.note_fallback();
            self.draw_individual(cache, items, batch, batching, shader, true);
            return;
        };
        if !self.ensure_uploaded(&mesh) {
            batching.note_fallback();
            self.draw_individual(cache, items, batch, batching, shader, true);
            return;
        }

        let instances: Vec<InstanceData> = batch
            .indices
            .iter()
            .map(|&index| InstanceData::from_matrix(&items[index].renderable.header.world_matrix))
            .collect();
        let key = &first.key.material;
        let lod_bits = batch
            .lod_group
            .map(|g| g.asset_id ^ ((g.level as u64) << 56))
            .unwrap_or(0);
        let cache_key = hash_overrides(&[
            key.shader_id as u64,
            key.material_id as u64,
            Arc::as_ptr(&mesh) as usize as u64,
            lod_bits,
        ]);

        let buffer = match batching.upload_instances(device, cache_key, &instances) {
            Ok(buffer) => buffer,
            Err(e) => {
                log::warn!("instance upload failed, drawing individually: {e}");
                batching.note_fallback();
                self.draw_individual(cache, items, batch, batching, shader, true);
                return;
            }
        };
        cache.bind_vertex_array(device, mesh.gpu().vertex_array);
        cache.bind_buffer(device, BufferTarget::Array, buffer);
        if let Some(shader) = shader {
            shader.set_mat4("u_model", &ember_math::Mat4::IDENTITY);
        }
        let count = instances.len() as u32;
        device.draw_indexed_instanced(mesh.index_count() as u32, count);

        let mut stats = self.stats.lock();
        stats.draw_calls += 1;
        stats.instanced_draw_calls += 1;
        stats.instanced_instances += count as u64;
        if batch.lod_group.is_some() {
            stats.lod_instancing_draw_calls += 1;
            stats.lod_instancing_instances += count as u64;
        }
    }

    /// Drop cached GPU objects owned by the renderer (shutdown, context
    /// loss). Resource-owned objects are destroyed by their owners.
    pub fn release_gpu_resources(&self) {
        let device = self.device.as_ref();
        self.batching.lock().release_buffers(device);
        self.quad.destroy_gpu(device);
        self.state_cache.lock().reset();
    }
}

fn texture_id_of(renderable: &Renderable) -> u32 {
    match &renderable.payload {
        RenderablePayload::Sprite { texture, .. } | RenderablePayload::Text { texture, .. } => {
            texture.handle().raw()
        }
        _ => renderable
            .header
            .overrides
            .texture
            .as_ref()
            .map(|t| t.handle().raw())
            .unwrap_or(0),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::layer::LayerId;
    use ember_gpu::HeadlessDevice;
    use ember_math::Mat4;

    fn renderer() -> (Arc<HeadlessDevice>, Renderer) {
        let device = Arc::new(HeadlessDevice::new());
        let renderer = Renderer::new(Arc::<HeadlessDevice>::clone(&device));
        (device, renderer)
    }

    #[test]
    fn test_empty_frame_only_clears() {
        let (device, renderer) = renderer();
        renderer.begin_frame();
        renderer.flush_render_queue();
        renderer.end_frame();

        let stats = renderer.last_frame_stats();
        assert_eq!(stats.draw_calls, 0);
        assert_eq!(stats.batch_count, 0);
        assert_eq!(device.counters().clears, 1);
        assert_eq!(device.framebuffer_color(), renderer.clear_color());
    }

    #[test]
    fn test_disabled_layer_culls_submissions() {
        let (_, renderer) = renderer();
        renderer.with_layers(|layers| {
            layers.set_enabled(LayerId::WORLD_MIDGROUND, false);
        });
        renderer.begin_frame();
        renderer.submit_renderable(Renderable::mesh(
            Arc::new(primitives::unit_cube("c")),
            Arc::new(Material::new("m")),
            Mat4::IDENTITY,
            LayerId::WORLD_MIDGROUND,
        ));
        renderer.flush_render_queue();
        renderer.end_frame();

        let stats = renderer.last_frame_stats();
        assert_eq!(stats.submitted, 1);
        assert_eq!(stats.culled, 1);
        assert_eq!(stats.draw_calls, 0);
    }

    #[test]
    fn test_layer_mask_gates_flush() {
        let (_, renderer) = renderer();
        // world.midground sits on mask bit 1
        renderer.set_active_layer_mask(!(1 << 1));
        renderer.begin_frame();
        renderer.submit_renderable(Renderable::mesh(
            Arc::new(primitives::unit_cube("c")),
            Arc::new(Material::new("m")),
            Mat4::IDENTITY,
            LayerId::WORLD_MIDGROUND,
        ));
        renderer.flush_render_queue();
        renderer.end_frame();
        assert_eq!(renderer.last_frame_stats().culled, 1);
    }

    #[test]
    fn test_identical_submissions_collapse_to_one_instanced_draw() {
        let (device, renderer) = renderer();
        let mesh = Arc::new(primitives::unit_cube("cube"));
        let material = Arc::new(Material::new("mat"));
        material.set_shader(Arc::new(Shader::from_program(
            "s",
            ember_gpu::ProgramHandle::new(1),
        )));

        renderer.begin_frame();
        for i in 0..200 {
            renderer.submit_renderable(Renderable::mesh(
                Arc::clone(&mesh),
                Arc::clone(&material),
                Mat4::from_translation(ember_math::Vec3::new(i as f32, 0.0, 0.0)),
                LayerId::WORLD_MIDGROUND,
            ));
        }
        renderer.flush_render_queue();
        renderer.end_frame();

        let stats = renderer.last_frame_stats();
        assert_eq!(stats.submitted, 200);
        assert_eq!(stats.batch_count, 1);
        assert_eq!(stats.instanced_draw_calls, 1);
        assert_eq!(stats.instanced_instances, 200);
        assert_eq!(device.counters().instanced_draw_calls, 1);
        assert!(stats.invariant_holds());
    }

    #[test]
    fn test_per_instance_tints_fall_back_to_individual_draws() {
        let (_, renderer) = renderer();
        let mesh = Arc::new(primitives::unit_cube("cube"));
        let material = Arc::new(Material::new("mat"));
        material.set_shader(Arc::new(Shader::from_program(
            "s",
            ember_gpu::ProgramHandle::new(1),
        )));

        renderer.begin_frame();
        for i in 0..50 {
            let mut renderable = Renderable::mesh(
                Arc::clone(&mesh),
                Arc::clone(&material),
                Mat4::IDENTITY,
                LayerId::WORLD_MIDGROUND,
            );
            renderable.header.overrides.tint =
                Some(Color::rgb(i as f32 / 50.0, 0.2, 0.2));
            renderer.submit_renderable(renderable);
        }
        renderer.flush_render_queue();
        renderer.end_frame();

        let stats = renderer.last_frame_stats();
        assert_eq!(stats.instanced_draw_calls, 0);
        assert_eq!(stats.draw_calls, 50);
        assert!(stats.invariant_holds());
    }

    #[test]
    fn test_buffer_failure_falls_back_and_keeps_invariant() {
        let (device, renderer) = renderer();
        let mesh = Arc::new(primitives::unit_cube("cube"));
        // Pre-upload so the injected failure hits the instance buffer
        mesh.upload(device.as_ref()).unwrap();
        let material = Arc::new(Material::new("mat"));

        renderer.begin_frame();
        for _ in 0..10 {
            renderer.submit_renderable(Renderable::mesh(
                Arc::clone(&mesh),
                Arc::clone(&material),
                Mat4::IDENTITY,
                LayerId::WORLD_MIDGROUND,
            ));
        }
        device.fail_next_buffer_creation();
        renderer.flush_render_queue();
        renderer.end_frame();

        let stats = renderer.last_frame_stats();
        assert_eq!(stats.instanced_draw_calls, 0);
        assert_eq!(stats.fallback_draw_calls, 10);
        assert_eq!(stats.fallback_batches, 1);
        assert_eq!(stats.draw_calls, 10);
        assert!(stats.invariant_holds());
    }

    #[test]
    fn test_sprite_batch_draws_once_instanced() {
        let (device, renderer) = renderer();
        let texture = Arc::new(Texture::solid("atlas", [255; 4]));
        let instances: Vec<InstanceData> = (0..100)
            .map(|i| {
                InstanceData::from_matrix(&Mat4::from_translation(ember_math::Vec3::new(
                    i as f32, 0.0, 0.0,
                )))
            })
            .collect();

        renderer.begin_frame();
        renderer.submit_renderable(Renderable::sprite_batch(
            texture,
            instances,
            LayerId::UI_CONTENT,
        ));
        renderer.flush_render_queue();
        renderer.end_frame();

        let stats = renderer.last_frame_stats();
        assert_eq!(stats.batch_count, 1);
        assert_eq!(stats.draw_calls, 1);
        assert_eq!(stats.instanced_draw_calls, 1);
        assert_eq!(stats.instanced_instances, 100);
        assert_eq!(device.counters().instances_drawn, 100);
        assert!(stats.invariant_holds());
    }

    #[test]
    fn test_cpu_merge_single_draw() {
        let (_, renderer) = renderer();
        renderer.set_batching_mode(BatchingMode::CpuMerge);
        let mesh = Arc::new(primitives::unit_cube("cube"));
        let material = Arc::new(Material::new("mat"));

        renderer.begin_frame();
        for _ in 0..3 {
            renderer.submit_renderable(Renderable::mesh(
                Arc::clone(&mesh),
                Arc::clone(&material),
                Mat4::IDENTITY,
                LayerId::WORLD_MIDGROUND,
            ));
        }
        renderer.flush_render_queue();
        renderer.end_frame();

        let stats = renderer.last_frame_stats();
        assert_eq!(stats.draw_calls, 1);
        assert_eq!(stats.batched_draw_calls, 1);
        assert_eq!(stats.batched_triangles, 36);
    }
}
