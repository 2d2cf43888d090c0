//! Draw batching
//!
//! Walks the sorted submission list and forms contiguous runs keyed by
//! the full pipeline identity. Eligible opaque runs collapse into a CPU
//! merge or an instanced draw; transparent items and items with
//! per-instance overrides always draw individually in submission order.
//!
//! Per-frame instance caps apply to LOD groups: at most
//! `lod_instancing_batch_size` instances of one `(asset, level)` pair are
//! emitted per frame, the remainder is deferred and surfaced through
//! [`pending_instance_count`](BatchingManager::pending_instance_count).

use crate::renderable::{LodGroup, Renderable, RenderableKind};
use crate::sort_key::SortKey;
use ember_asset::{Mesh, Vertex};
use ember_core::Result;
use ember_gpu::{BufferHandle, BufferTarget, RenderDevice};
use ember_math::Mat4;
use std::collections::HashMap;
use std::sync::Arc;

/// How the render queue collapses compatible runs
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub enum BatchingMode {
    Disabled,
    /// Concatenate geometry with matrices applied on the CPU
    CpuMerge,
    #[default]
    GpuInstancing,
}

/// A sorted submission plus its key, the batcher's input unit
pub struct QueueItem {
    pub renderable: Renderable,
    pub key: SortKey,
}

/// Per-instance data uploaded for instanced draws
#[derive(Clone, Copy, Debug, bytemuck::Pod, bytemuck::Zeroable)]
#[repr(C)]
pub struct InstanceData {
    pub model: [f32; 16],
    pub tint: [f32; 4],
    pub uv_rect: [f32; 4],
}

impl InstanceData {
    pub fn new(model: [f32; 16], uv_rect: [f32; 4], tint: [f32; 4]) -> Self {
        Self {
            model,
            tint,
            uv_rect,
        }
    }

    pub fn from_matrix(model: &Mat4) -> Self {
        Self::new(model.to_array(), [0.0, 0.0, 1.0, 1.0], [1.0, 1.0, 1.0, 1.0])
    }
}

/// How one batch's items get drawn
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BatchPath {
    /// One draw per item, submission order
    Individual,
    /// Single draw of a transient merged mesh
    CpuMerge,
    /// Single instanced draw
    Instanced,
}

/// A contiguous run of items sharing a pipeline identity
pub struct Batch {
    /// Indices into the sorted item slice, submission order
    pub indices: Vec<usize>,
    pub path: BatchPath,
    /// Set when the run belongs to one LOD group
    pub lod_group: Option<LodGroup>,
}

/// Output of one batching pass
pub struct BatchList {
    pub batches: Vec<Batch>,
    /// Instances pushed past the per-group cap into the next frame
    pub deferred_instances: usize,
    pub lod_groups: usize,
}

/// Identity that must match for two items to share a batch
#[derive(Clone, PartialEq, Eq, Hash)]
struct RunKey {
    layer_priority: u32,
    kind: RenderableKind,
    shader_id: u32,
    material_id: u32,
    mesh_ptr: usize,
    override_hash: u64,
    blend_cull_depth: (u8, u8, bool, bool),
    screen_space: bool,
    transparent: bool,
    lod_group: Option<LodGroup>,
}

fn run_key(item: &QueueItem) -> RunKey {
    let mesh_ptr = item
        .renderable
        .mesh_and_material()
        .map(|(mesh, _)| Arc::as_ptr(&mesh) as usize)
        .unwrap_or(0);
    let material = item.key.material;
    RunKey {
        layer_priority: item.key.layer_priority,
        kind: item.renderable.kind(),
        shader_id: material.shader_id,
        material_id: material.material_id,
        mesh_ptr,
        override_hash: material.override_hash,
        blend_cull_depth: (
            material.blend_mode as u8,
            material.cull_face as u8,
            material.depth_test,
            material.depth_write,
        ),
        screen_space: material.screen_space,
        transparent: material.is_translucent(),
        lod_group: item.renderable.header.lod_group,
    }
}

/// Batching policy and instance-buffer cache
pub struct BatchingManager {
    mode: BatchingMode,
    lod_instancing_enabled: bool,
    lod_instancing_batch_size: usize,
    pending_instances: usize,
    instance_buffers: HashMap<u64, BufferHandle>,
    /// Start of the kept instance window per overflowing LOD group
    lod_cursors: HashMap<LodGroup, usize>,
    fallback_batches: u64,
}

impl Default for BatchingManager {
    fn default() -> Self {
        Self {
            mode: BatchingMode::default(),
            lod_instancing_enabled: true,
            lod_instancing_batch_size: 100,
            pending_instances: 0,
            instance_buffers: HashMap::new(),
            lod_cursors: HashMap::new(),
            fallback_batches: 0,
        }
    }
}

impl BatchingManager {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn mode(&self) -> BatchingMode {
        self.mode
    }

    pub fn set_mode(&mut self, mode: BatchingMode) {
        self.mode = mode;
    }

    pub fn set_lod_instancing_enabled(&mut self, enabled: bool) {
        self.lod_instancing_enabled = enabled;
    }

    pub fn lod_instancing_enabled(&self) -> bool {
        self.lod_instancing_enabled
    }

    pub fn set_lod_instancing_batch_size(&mut self, size: usize) {
        self.lod_instancing_batch_size = size.max(1);
    }

    pub fn lod_instancing_batch_size(&self) -> usize {
        self.lod_instancing_batch_size
    }

    /// Backlog deferred by the per-group cap in the last pass
    pub fn pending_instance_count(&self) -> usize {
        self.pending_instances
    }

    /// Batches counted as fallbacks since the last pass
    pub fn take_fallback_batches(&mut self) -> u64 {
        std::mem::take(&mut self.fallback_batches)
    }

    /// Split the sorted items into batches per the active mode
    pub fn build_batches(&mut self, items: &[QueueItem]) -> BatchList {
        self.pending_instances = 0;
        let mut batches = Vec::new();
        let mut lod_groups = 0;
        let mut deferred = 0;

        let mut run_start = 0;
        while run_start < items.len() {
            let key = run_key(&items[run_start]);
            let mut run_end = run_start + 1;
            while run_end < items.len() && run_key(&items[run_end]) == key {
                run_end += 1;
            }
            let mut indices: Vec<usize> = (run_start..run_end).collect();
            let path = self.classify(&items[run_start], indices.len());

            if path == BatchPath::Instanced && self.lod_instancing_enabled {
                if let Some(group) = key.lod_group {
                    lod_groups += 1;
                    let cap = self.lod_instancing_batch_size;
                    let len = indices.len();
                    if len > cap {
                        // Rotate the kept window per group across frames
                        // so the deferred tail drains instead of starving
                        // behind the head of the run
                        let start = self.lod_cursors.get(&group).copied().unwrap_or(0) % len;
                        indices.rotate_left(start);
                        indices.truncate(cap);
                        deferred += len - cap;
                        self.lod_cursors.insert(group, (start + cap) % len);
                    } else {
                        self.lod_cursors.remove(&group);
                    }
                }
            }
            batches.push(Batch {
                indices,
                path,
                lod_group: key.lod_group,
            });
            run_start = run_end;
        }
        self.pending_instances = deferred;
        BatchList {
            batches,
            deferred_instances: deferred,
            lod_groups,
        }
    }

    fn classify(&self, first: &QueueItem, run_len: usize) -> BatchPath {
        if run_len < 2 || self.mode == BatchingMode::Disabled {
            return BatchPath::Individual;
        }
        // Transparent items draw individually in submission order
        if first.key.material.is_translucent() || first.renderable.is_transparent() {
            return BatchPath::Individual;
        }
        // Per-instance overrides change the pipeline hash; the run key
        // keeps identical overrides together but any override disables
        // collapsing
        if !first.renderable.header.overrides.is_empty() {
            return BatchPath::Individual;
        }
        let Some((mesh, _)) = first.renderable.mesh_and_material() else {
            return BatchPath::Individual;
        };
        if mesh.index_count() == 0 {
            return BatchPath::Individual;
        }
        match self.mode {
            BatchingMode::CpuMerge => BatchPath::CpuMerge,
            BatchingMode::GpuInstancing => BatchPath::Instanced,
            BatchingMode::Disabled => BatchPath::Individual,
        }
    }

    /// Concatenate a run into a transient mesh with matrices applied on
    /// the CPU. Fails when any item lost its mesh since batching.
    pub fn merge_cpu(&mut self, items: &[QueueItem], batch: &Batch) -> Result<Mesh> {
        let mut vertices: Vec<Vertex> = Vec::new();
        let mut indices: Vec<u32> = Vec::new();
        for &index in &batch.indices {
            let item = &items[index];
            let Some((mesh, _)) = item.renderable.mesh_and_material() else {
                return Err(ember_core::Error::ResourceUnavailable(
                    "mesh vanished during CPU merge".into(),
                ));
            };
            let world = &item.renderable.header.world_matrix;
            let base = vertices.len() as u32;
            mesh.access_data(|src_vertices, src_indices| {
                vertices.extend(src_vertices.iter().map(|v| {
                    let mut out = *v;
                    out.position = world.transform_point(v.position);
                    out.normal = world.transform_vector(v.normal).normalize_or(v.normal);
                    out
                }));
                indices.extend(src_indices.iter().map(|i| i + base));
            });
        }
        Ok(Mesh::with_data("cpu_merge", vertices, indices))
    }

    /// Create or update the cached instance buffer for a batch. The key
    /// is the batch's pipeline hash; buffers are reused across frames.
    pub fn upload_instances(
        &mut self,
        device: &dyn RenderDevice,
        cache_key: u64,
        instances: &[InstanceData],
    ) -> Result<BufferHandle> {
        let bytes = bytemuck::cast_slice(instances);
        if let Some(&buffer) = self.instance_buffers.get(&cache_key) {
            device.update_buffer(buffer, bytes)?;
            return Ok(buffer);
        }
        let buffer = device.create_buffer(BufferTarget::Array, bytes)?;
        self.instance_buffers.insert(cache_key, buffer);
        Ok(buffer)
    }

    /// Count a failed batch path for statistics
    pub fn note_fallback(&mut self) {
        self.fallback_batches += 1;
    }

    /// Drop cached instance buffers (context loss, shutdown)
    pub fn release_buffers(&mut self, device: &dyn RenderDevice) {
        for (_, buffer) in self.instance_buffers.drain() {
            device.destroy_buffer(buffer);
        }
    }
}
