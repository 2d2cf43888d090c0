//! Two-stage async resource loader
//!
//! Worker threads drain a priority queue and do only CPU-safe work:
//! file I/O, parsing, pixel decoding, vertex construction. Results land on
//! a completion channel that the device thread drains via
//! [`process_completed_tasks`](AsyncLoader::process_completed_tasks),
//! which performs the GPU upload, registers the resource and fires the
//! completion callback.
//!
//! Priorities are a max-heap; ties resolve in submission order.
//! Cancellation is cooperative: the flag is checked when a worker picks
//! the task up and again at finalization, so a cancel issued any time
//! before the drain is honored.

use crate::manager::ResourceManager;
use crate::material::Material;
use crate::mesh::{Mesh, Vertex};
use crate::model::{Model, ModelPart};
use crate::obj;
use crate::texture::Texture;
use crossbeam_channel::{Receiver, Sender};
use ember_core::{Error, Result};
use ember_gpu::RenderDevice;
use parking_lot::Mutex;
use std::collections::{BinaryHeap, HashMap};
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Instant;

/// Identifier for a submitted load task
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TaskId(u64);

/// Terminal status delivered to completion callbacks
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LoadStatus {
    Success,
    Failed,
    Cancelled,
}

/// The resource produced by a successful load
#[derive(Clone, Debug)]
pub enum LoadedResource {
    Mesh(Arc<Mesh>),
    Texture(Arc<Texture>),
    Model(Arc<Model>),
}

/// Passed to the completion callback on the device thread
#[derive(Debug)]
pub struct LoadOutcome {
    pub status: LoadStatus,
    pub name: String,
    pub resource: Option<LoadedResource>,
    pub error: Option<String>,
}

pub type LoadCallback = Box<dyn FnOnce(LoadOutcome) + Send + 'static>;

/// CPU-side work a worker runs for one task
pub enum TaskWork {
    /// Produce a mesh (not yet uploaded)
    Mesh(Box<dyn FnOnce() -> Result<Mesh> + Send + 'static>),
    /// Produce a texture (not yet uploaded)
    Texture(Box<dyn FnOnce() -> Result<Texture> + Send + 'static>),
    /// Produce named mesh groups assembled into a model at finalization
    Model(Box<dyn FnOnce() -> Result<Vec<Mesh>> + Send + 'static>),
}

enum CpuPayload {
    Mesh(Mesh),
    Texture(Texture),
    Model(Vec<Mesh>),
}

struct QueuedTask {
    id: TaskId,
    seq: u64,
    priority: f32,
    name: String,
    register: bool,
    work: TaskWork,
    callback: Option<LoadCallback>,
    cancel: Arc<AtomicBool>,
    submitted_at: Instant,
}

impl PartialEq for QueuedTask {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other).is_eq()
    }
}

impl Eq for QueuedTask {}

impl PartialOrd for QueuedTask {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for QueuedTask {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        // Max-heap: highest priority first, earliest submission on ties
        self.priority
            .total_cmp(&other.priority)
            .then_with(|| other.seq.cmp(&self.seq))
    }
}

struct FinishedTask {
    id: TaskId,
    name: String,
    register: bool,
    callback: Option<LoadCallback>,
    cancel: Arc<AtomicBool>,
    result: Result<CpuPayload>,
}

#[derive(Default)]
struct LoaderStats {
    processed: AtomicUsize,
    loading: AtomicUsize,
    max_queue_depth: AtomicUsize,
    wait_time_micros: AtomicU64,
}

struct Shared {
    queue: Mutex<BinaryHeap<QueuedTask>>,
    finished_tx: Sender<FinishedTask>,
    finished_rx: Receiver<FinishedTask>,
    stats: LoaderStats,
}

enum Ticket {
    Work,
    Stop,
}

/// Snapshot of loader queue statistics
#[derive(Clone, Copy, Debug, Default, serde::Serialize, serde::Deserialize)]
pub struct LoaderStatsSnapshot {
    pub pending: usize,
    pub loading: usize,
    pub waiting_upload: usize,
    pub processed: usize,
    pub max_queue_depth: usize,
    pub wait_time_ms: f64,
}

/// Async loader service. Create once, `initialize` to spawn workers,
/// `shutdown` to join them.
pub struct AsyncLoader {
    manager: Arc<ResourceManager>,
    shared: Arc<Shared>,
    tickets_tx: Sender<Ticket>,
    tickets_rx: Receiver<Ticket>,
    workers: Mutex<Vec<JoinHandle<()>>>,
    cancel_flags: Mutex<HashMap<TaskId, Arc<AtomicBool>>>,
    next_id: AtomicU64,
    next_seq: AtomicU64,
}

impl AsyncLoader {
    pub fn new(manager: Arc<ResourceManager>) -> Self {
        let (finished_tx, finished_rx) = crossbeam_channel::unbounded();
        let (tickets_tx, tickets_rx) = crossbeam_channel::unbounded();
        Self {
            manager,
            shared: Arc::new(Shared {
                queue: Mutex::new(BinaryHeap::new()),
                finished_tx,
                finished_rx,
                stats: LoaderStats::default(),
            }),
            tickets_tx,
            tickets_rx,
            workers: Mutex::new(Vec::new()),
            cancel_flags: Mutex::new(HashMap::new()),
            next_id: AtomicU64::new(1),
            next_seq: AtomicU64::new(0),
        }
    }

    /// Spawn worker threads. Defaults to half the available parallelism,
    /// at least one.
    pub fn initialize(&self, worker_count: Option<usize>) -> Result<()> {
        let mut workers = self.workers.lock();
        if !workers.is_empty() {
            return Err(Error::AlreadyInitialized("async loader"));
        }
        let count = worker_count.unwrap_or_else(|| {
            std::thread::available_parallelism()
                .map(|n| (n.get() / 2).max(1))
                .unwrap_or(1)
        });
        for i in 0..count {
            let shared = Arc::clone(&self.shared);
            let tickets_rx = self.tickets_rx.clone();
            let handle = std::thread::Builder::new()
                .name(format!("asset-loader-{i}"))
                .spawn(move || worker_loop(shared, tickets_rx))
                .map_err(|e| Error::Io(format!("spawn loader worker: {e}")))?;
            workers.push(handle);
        }
        log::info!("async loader started with {count} workers");
        Ok(())
    }

    pub fn is_initialized(&self) -> bool {
        !self.workers.lock().is_empty()
    }

    /// Join workers after their in-flight CPU work, then discard the
    /// waiting-upload queue and any unstarted tasks.
    pub fn shutdown(&self) {
        let mut workers = self.workers.lock();
        if workers.is_empty() {
            return;
        }
        for _ in workers.iter() {
            let _ = self.tickets_tx.send(Ticket::Stop);
        }
        for handle in workers.drain(..) {
            if handle.join().is_err() {
                log::error!("loader worker panicked during shutdown");
            }
        }
        let dropped_pending = self.shared.queue.lock().len();
        self.shared.queue.lock().clear();
        let mut dropped_uploads = 0;
        while self.shared.finished_rx.try_recv().is_ok() {
            dropped_uploads += 1;
        }
        self.cancel_flags.lock().clear();
        if dropped_pending + dropped_uploads > 0 {
            log::info!(
                "async loader shutdown discarded {dropped_pending} pending and \
                 {dropped_uploads} waiting-upload tasks"
            );
        }
    }

    // ---- submission ----

    /// Queue arbitrary CPU-side work. `register` controls whether the
    /// finished resource is added to the resource manager under `name`.
    pub fn submit(
        &self,
        name: impl Into<String>,
        work: TaskWork,
        register: bool,
        callback: Option<LoadCallback>,
        priority: f32,
    ) -> Result<TaskId> {
        if !self.is_initialized() {
            return Err(Error::NotInitialized("async loader"));
        }
        if priority.is_nan() {
            return Err(Error::InvalidArgument("NaN task priority".into()));
        }
        let id = TaskId(self.next_id.fetch_add(1, Ordering::Relaxed));
        let cancel = Arc::new(AtomicBool::new(false));
        self.cancel_flags.lock().insert(id, Arc::clone(&cancel));
        let task = QueuedTask {
            id,
            seq: self.next_seq.fetch_add(1, Ordering::Relaxed),
            priority,
            name: name.into(),
            register,
            work,
            callback,
            cancel,
            submitted_at: Instant::now(),
        };
        {
            let mut queue = self.shared.queue.lock();
            queue.push(task);
            let depth = queue.len();
            self.shared
                .stats
                .max_queue_depth
                .fetch_max(depth, Ordering::Relaxed);
        }
        let _ = self.tickets_tx.send(Ticket::Work);
        Ok(id)
    }

    /// Load an OBJ file as a single mesh (all groups merged)
    pub fn load_mesh_async(
        &self,
        path: impl Into<PathBuf>,
        name: impl Into<String>,
        callback: Option<LoadCallback>,
        priority: f32,
    ) -> Result<TaskId> {
        let path = path.into();
        let mesh_name = name.into();
        let work_name = mesh_name.clone();
        self.submit(
            mesh_name,
            TaskWork::Mesh(Box::new(move || load_obj_merged(&path, &work_name))),
            true,
            callback,
            priority,
        )
    }

    /// Decode an image file into a texture
    pub fn load_texture_async(
        &self,
        path: impl Into<PathBuf>,
        name: impl Into<String>,
        callback: Option<LoadCallback>,
        priority: f32,
    ) -> Result<TaskId> {
        let path = path.into();
        let tex_name = name.into();
        let work_name = tex_name.clone();
        self.submit(
            tex_name,
            TaskWork::Texture(Box::new(move || Texture::from_file(work_name, &path))),
            true,
            callback,
            priority,
        )
    }

    /// Load an OBJ file as a model with one part per group
    pub fn load_model_async(
        &self,
        path: impl Into<PathBuf>,
        name: impl Into<String>,
        callback: Option<LoadCallback>,
        priority: f32,
    ) -> Result<TaskId> {
        let path = path.into();
        let model_name = name.into();
        let work_name = model_name.clone();
        self.submit(
            model_name,
            TaskWork::Model(Box::new(move || load_obj_groups(&path, &work_name))),
            true,
            callback,
            priority,
        )
    }

    /// Request cooperative cancellation. Returns false for unknown or
    /// already-finalized tasks.
    pub fn cancel(&self, id: TaskId) -> bool {
        match self.cancel_flags.lock().get(&id) {
            Some(flag) => {
                flag.store(true, Ordering::Release);
                true
            }
            None => false,
        }
    }

    // ---- main-thread drain ----

    /// Finalize up to `max_per_call` finished tasks: upload to the GPU,
    /// register, fire callbacks. Device thread only. Returns the number
    /// finalized.
    pub fn process_completed_tasks(&self, device: &dyn RenderDevice, max_per_call: usize) -> usize {
        let mut finalized = 0;
        while finalized < max_per_call {
            let Ok(task) = self.shared.finished_rx.try_recv() else {
                break;
            };
            self.finalize(device, task);
            finalized += 1;
        }
        finalized
    }

    fn finalize(&self, device: &dyn RenderDevice, task: FinishedTask) {
        self.cancel_flags.lock().remove(&task.id);
        self.shared.stats.processed.fetch_add(1, Ordering::Relaxed);
        let outcome = if task.cancel.load(Ordering::Acquire) {
            LoadOutcome {
                status: LoadStatus::Cancelled,
                name: task.name.clone(),
                resource: None,
                error: None,
            }
        } else {
            match task.result {
                Err(e) => LoadOutcome {
                    status: LoadStatus::Failed,
                    name: task.name.clone(),
                    resource: None,
                    error: Some(e.to_string()),
                },
                Ok(payload) => self.upload_and_register(device, &task.name, task.register, payload),
            }
        };
        if outcome.status != LoadStatus::Success {
            log::debug!("load '{}' finished {:?}", outcome.name, outcome.status);
        }
        if let Some(callback) = task.callback {
            callback(outcome);
        }
    }

    fn upload_and_register(
        &self,
        device: &dyn RenderDevice,
        name: &str,
        register: bool,
        payload: CpuPayload,
    ) -> LoadOutcome {
        let uploaded: Result<LoadedResource> = match payload {
            CpuPayload::Mesh(mesh) => mesh.upload(device).map(|_| {
                let mesh = Arc::new(mesh);
                if register {
                    self.manager.register_mesh(name, Arc::clone(&mesh));
                }
                LoadedResource::Mesh(mesh)
            }),
            CpuPayload::Texture(texture) => texture.upload(device).map(|_| {
                let texture = Arc::new(texture);
                if register {
                    self.manager.register_texture(name, Arc::clone(&texture));
                }
                LoadedResource::Texture(texture)
            }),
            CpuPayload::Model(meshes) => {
                let material = Arc::new(Material::new(format!("{name}.material")));
                let mut parts = Vec::with_capacity(meshes.len());
                let mut failure = None;
                for mesh in meshes {
                    if let Err(e) = mesh.upload(device) {
                        failure = Some(e);
                        break;
                    }
                    let part_name = mesh.name().to_string();
                    parts.push(ModelPart::new(part_name, Arc::new(mesh), Arc::clone(&material)));
                }
                match failure {
                    Some(e) => Err(e),
                    None => {
                        let model = Arc::new(Model::with_parts(name, parts));
                        if register {
                            self.manager.register_model(name, Arc::clone(&model));
                        }
                        Ok(LoadedResource::Model(model))
                    }
                }
            }
        };
        match uploaded {
            Ok(resource) => LoadOutcome {
                status: LoadStatus::Success,
                name: name.to_string(),
                resource: Some(resource),
                error: None,
            },
            Err(e) => LoadOutcome {
                status: LoadStatus::Failed,
                name: name.to_string(),
                resource: None,
                error: Some(e.to_string()),
            },
        }
    }

    // ---- statistics ----

    pub fn pending_count(&self) -> usize {
        self.shared.queue.lock().len()
    }

    pub fn loading_count(&self) -> usize {
        self.shared.stats.loading.load(Ordering::Relaxed)
    }

    pub fn waiting_upload_count(&self) -> usize {
        self.shared.finished_rx.len()
    }

    pub fn stats(&self) -> LoaderStatsSnapshot {
        LoaderStatsSnapshot {
            pending: self.pending_count(),
            loading: self.loading_count(),
            waiting_upload: self.waiting_upload_count(),
            processed: self.shared.stats.processed.load(Ordering::Relaxed),
            max_queue_depth: self.shared.stats.max_queue_depth.load(Ordering::Relaxed),
            wait_time_ms: self.shared.stats.wait_time_micros.load(Ordering::Relaxed) as f64
                / 1000.0,
        }
    }

    pub fn print_statistics(&self) {
        let s = self.stats();
        log::info!(
            "loader: pending={} loading={} waiting_upload={} processed={} \
             max_depth={} wait={:.1}ms",
            s.pending,
            s.loading,
            s.waiting_upload,
            s.processed,
            s.max_queue_depth,
            s.wait_time_ms
        );
    }
}

impl Drop for AsyncLoader {
    fn drop(&mut self) {
        self.shutdown();
    }
}

fn worker_loop(shared: Arc<Shared>, tickets: Receiver<Ticket>) {
    while let Ok(ticket) = tickets.recv() {
        if matches!(ticket, Ticket::Stop) {
            break;
        }
        let Some(task) = shared.queue.lock().pop() else {
            continue;
        };
        shared
            .stats
            .wait_time_micros
            .fetch_add(task.submitted_at.elapsed().as_micros() as u64, Ordering::Relaxed);
        shared.stats.loading.fetch_add(1, Ordering::Relaxed);

        let result = if task.cancel.load(Ordering::Acquire) {
            Err(Error::Cancelled)
        } else {
            match task.work {
                TaskWork::Mesh(work) => work().map(CpuPayload::Mesh),
                TaskWork::Texture(work) => work().map(CpuPayload::Texture),
                TaskWork::Model(work) => work().map(CpuPayload::Model),
            }
        };
        // Cancelled-while-running still reports Cancelled at finalization
        // via the flag; a worker error otherwise reports Failed.
        let result = match result {
            Err(Error::Cancelled) => {
                task.cancel.store(true, Ordering::Release);
                Err(Error::Cancelled)
            }
            other => other,
        };
        shared.stats.loading.fetch_sub(1, Ordering::Relaxed);
        let finished = FinishedTask {
            id: task.id,
            name: task.name,
            register: task.register,
            callback: task.callback,
            cancel: task.cancel,
            result,
        };
        if shared.finished_tx.send(finished).is_err() {
            break;
        }
    }
}

fn load_obj_merged(path: &std::path::Path, name: &str) -> Result<Mesh> {
    let text = std::fs::read_to_string(path)
        .map_err(|e| Error::Io(format!("read {}: {e}", path.display())))?;
    let groups = obj::parse_obj(&text)?;
    let mut vertices: Vec<Vertex> = Vec::new();
    let mut indices: Vec<u32> = Vec::new();
    for group in groups {
        let base = vertices.len() as u32;
        vertices.extend(group.vertices);
        indices.extend(group.indices.iter().map(|i| i + base));
    }
    Ok(Mesh::with_data(name, vertices, indices))
}

fn load_obj_groups(path: &std::path::Path, name: &str) -> Result<Vec<Mesh>> {
    let text = std::fs::read_to_string(path)
        .map_err(|e| Error::Io(format!("read {}: {e}", path.display())))?;
    let groups = obj::parse_obj(&text)?;
    Ok(groups
        .into_iter()
        .map(|g| Mesh::with_data(format!("{name}.{}", g.name), g.vertices, g.indices))
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::primitives;
    use ember_gpu::HeadlessDevice;
    use std::sync::atomic::AtomicUsize;

    fn cube_work(n: usize) -> TaskWork {
        TaskWork::Mesh(Box::new(move || Ok(primitives::unit_cube(format!("cube{n}")))))
    }

    fn drain(loader: &AsyncLoader, device: &HeadlessDevice, expected: usize) {
        let deadline = Instant::now() + std::time::Duration::from_secs(5);
        let mut done = 0;
        while done < expected {
            assert!(Instant::now() < deadline, "drain timed out at {done}/{expected}");
            done += loader.process_completed_tasks(device, 16);
            std::thread::yield_now();
        }
    }

    #[test]
    fn test_submit_before_initialize_fails() {
        let loader = AsyncLoader::new(Arc::new(ResourceManager::new()));
        assert!(loader
            .submit("x", cube_work(0), false, None, 1.0)
            .is_err());
    }

    #[test]
    fn test_load_registers_and_calls_back() {
        let manager = Arc::new(ResourceManager::new());
        let loader = AsyncLoader::new(Arc::clone(&manager));
        loader.initialize(Some(2)).unwrap();
        let device = HeadlessDevice::new();

        let successes = Arc::new(AtomicUsize::new(0));
        for n in 0..8 {
            let successes = Arc::clone(&successes);
            loader
                .submit(
                    format!("cube{n}"),
                    cube_work(n),
                    true,
                    Some(Box::new(move |outcome| {
                        assert_eq!(outcome.status, LoadStatus::Success);
                        assert!(matches!(outcome.resource, Some(LoadedResource::Mesh(_))));
                        successes.fetch_add(1, Ordering::Relaxed);
                    })),
                    1.0,
                )
                .unwrap();
        }
        drain(&loader, &device, 8);
        assert_eq!(successes.load(Ordering::Relaxed), 8);
        assert_eq!(manager.list_meshes().len(), 8);
        loader.shutdown();
    }

    #[test]
    fn test_cancelled_task_not_registered() {
        let manager = Arc::new(ResourceManager::new());
        // Single worker so queued tasks sit long enough to cancel
        let loader = AsyncLoader::new(Arc::clone(&manager));
        loader.initialize(Some(1)).unwrap();
        let device = HeadlessDevice::new();

        let cancelled = Arc::new(AtomicUsize::new(0));
        let mut ids = Vec::new();
        for n in 0..10 {
            let cancelled = Arc::clone(&cancelled);
            let id = loader
                .submit(
                    format!("cube{n}"),
                    cube_work(n),
                    true,
                    Some(Box::new(move |outcome| {
                        if outcome.status == LoadStatus::Cancelled {
                            cancelled.fetch_add(1, Ordering::Relaxed);
                        }
                    })),
                    1.0,
                )
                .unwrap();
            ids.push(id);
        }
        for id in &ids {
            assert!(loader.cancel(*id));
        }
        drain(&loader, &device, 10);
        assert_eq!(cancelled.load(Ordering::Relaxed), 10);
        assert!(manager.list_meshes().is_empty());
        loader.shutdown();
    }

    #[test]
    fn test_failed_cpu_work_reports_error() {
        let manager = Arc::new(ResourceManager::new());
        let loader = AsyncLoader::new(Arc::clone(&manager));
        loader.initialize(Some(1)).unwrap();
        let device = HeadlessDevice::new();

        let failed = Arc::new(AtomicUsize::new(0));
        let failed2 = Arc::clone(&failed);
        loader
            .submit(
                "broken",
                TaskWork::Mesh(Box::new(|| Err(Error::Io("no such file".into())))),
                true,
                Some(Box::new(move |outcome| {
                    assert_eq!(outcome.status, LoadStatus::Failed);
                    assert!(outcome.error.unwrap().contains("no such file"));
                    failed2.fetch_add(1, Ordering::Relaxed);
                })),
                1.0,
            )
            .unwrap();
        drain(&loader, &device, 1);
        assert_eq!(failed.load(Ordering::Relaxed), 1);
        assert!(!manager.has_mesh("broken"));
        loader.shutdown();
    }

    #[test]
    fn test_priority_order_with_fifo_tiebreak() {
        let mut heap = BinaryHeap::new();
        for (seq, priority) in [(0u64, 1.0f32), (1, 5.0), (2, 5.0), (3, 0.5)] {
            heap.push(QueuedTask {
                id: TaskId(seq),
                seq,
                priority,
                name: String::new(),
                register: false,
                work: cube_work(0),
                callback: None,
                cancel: Arc::new(AtomicBool::new(false)),
                submitted_at: Instant::now(),
            });
        }
        let order: Vec<u64> = std::iter::from_fn(|| heap.pop().map(|t| t.seq)).collect();
        assert_eq!(order, vec![1, 2, 0, 3]);
    }

    #[test]
    fn test_double_initialize_rejected() {
        let loader = AsyncLoader::new(Arc::new(ResourceManager::new()));
        loader.initialize(Some(1)).unwrap();
        assert!(loader.initialize(Some(1)).is_err());
        loader.shutdown();
    }

    #[test]
    fn test_stats_track_processed() {
        let manager = Arc::new(ResourceManager::new());
        let loader = AsyncLoader::new(Arc::clone(&manager));
        loader.initialize(Some(2)).unwrap();
        let device = HeadlessDevice::new();
        for n in 0..4 {
            loader.submit(format!("c{n}"), cube_work(n), false, None, 1.0).unwrap();
        }
        drain(&loader, &device, 4);
        let stats = loader.stats();
        assert_eq!(stats.processed, 4);
        assert!(stats.max_queue_depth >= 1);
        assert_eq!(stats.pending, 0);
        loader.shutdown();
    }

    #[test]
    fn test_stats_snapshot_serializes() {
        let snapshot = LoaderStatsSnapshot {
            pending: 2,
            processed: 9,
            ..Default::default()
        };
        let json = serde_json::to_string(&snapshot).unwrap();
        let restored: LoaderStatsSnapshot = serde_json::from_str(&json).unwrap();
        assert_eq!(restored.pending, 2);
        assert_eq!(restored.processed, 9);
    }
}
