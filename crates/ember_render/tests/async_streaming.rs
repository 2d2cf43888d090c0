//! Async streaming under load: many submissions, a burst of cancels,
//! then a main-thread drain that uploads and registers the survivors.

use ember_asset::{
    primitives, AsyncLoader, LoadOutcome, LoadStatus, ResourceManager, TaskId, TaskWork,
};
use ember_gpu::HeadlessDevice;
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::{Duration, Instant};

fn drain(loader: &AsyncLoader, device: &HeadlessDevice, expected: usize) -> usize {
    let deadline = Instant::now() + Duration::from_secs(10);
    let mut finalized = 0;
    while finalized < expected {
        finalized += loader.process_completed_tasks(device, 16);
        if finalized < expected {
            assert!(Instant::now() < deadline, "drain timed out at {finalized}");
            std::thread::sleep(Duration::from_millis(2));
        }
    }
    finalized
}

#[test]
fn fifty_loads_with_ten_cancels_register_forty_meshes() {
    let manager = Arc::new(ResourceManager::new());
    let loader = AsyncLoader::new(Arc::clone(&manager));
    loader.initialize(Some(4)).unwrap();
    let device = HeadlessDevice::new();

    let outcomes: Arc<Mutex<Vec<(String, LoadStatus)>>> = Arc::new(Mutex::new(Vec::new()));
    let mut ids: Vec<TaskId> = Vec::new();
    for i in 0..50 {
        let name = format!("streamed_{i}");
        let mesh_name = name.clone();
        let sink = Arc::clone(&outcomes);
        let id = loader
            .submit(
                name,
                TaskWork::Mesh(Box::new(move || {
                    Ok(primitives::uv_sphere(&mesh_name, 8, 16))
                })),
                true,
                Some(Box::new(move |outcome: LoadOutcome| {
                    sink.lock().push((outcome.name, outcome.status));
                })),
                1.0,
            )
            .unwrap();
        ids.push(id);
    }
    // Cancel every fifth task; the flag is honored at finalization even
    // when a worker already produced the mesh
    let cancelled: Vec<TaskId> = ids.iter().copied().step_by(5).collect();
    assert_eq!(cancelled.len(), 10);
    for id in &cancelled {
        assert!(loader.cancel(*id));
    }

    let finalized = drain(&loader, &device, 50);
    assert_eq!(finalized, 50);

    let outcomes = outcomes.lock();
    let successes = outcomes
        .iter()
        .filter(|(_, s)| *s == LoadStatus::Success)
        .count();
    let cancels = outcomes
        .iter()
        .filter(|(_, s)| *s == LoadStatus::Cancelled)
        .count();
    assert_eq!(successes, 40);
    assert_eq!(cancels, 10);

    // Only the survivors were uploaded and registered
    assert_eq!(manager.list_meshes().len(), 40);
    for (i, id) in ids.iter().enumerate() {
        let name = format!("streamed_{i}");
        let expect_cancelled = cancelled.contains(id);
        assert_eq!(manager.has_mesh(&name), !expect_cancelled, "{name}");
        if let Some(mesh) = manager.get_mesh(&name) {
            assert!(mesh.is_uploaded());
        }
    }

    let stats = loader.stats();
    assert_eq!(stats.processed, 50);
    assert!(stats.max_queue_depth > 0);
    loader.shutdown();
}

#[test]
fn priority_order_controls_finalization_order() {
    let manager = Arc::new(ResourceManager::new());
    let loader = AsyncLoader::new(Arc::clone(&manager));
    // One worker so queue order is observable
    loader.initialize(Some(1)).unwrap();
    let device = HeadlessDevice::new();

    let order: Arc<Mutex<Vec<String>>> = Arc::new(Mutex::new(Vec::new()));
    // Hold the worker busy so later submissions pile up in the heap
    let gate = Arc::new(Mutex::new(()));
    let hold = gate.lock();
    let gate_task = Arc::clone(&gate);
    loader
        .submit(
            "gate",
            TaskWork::Mesh(Box::new(move || {
                drop(gate_task.lock());
                Ok(primitives::unit_cube("gate"))
            })),
            false,
            None,
            10.0,
        )
        .unwrap();

    for (name, priority) in [("low", 0.0f32), ("high", 5.0), ("mid", 2.0)] {
        let sink = Arc::clone(&order);
        loader
            .submit(
                name,
                TaskWork::Mesh(Box::new(move || Ok(primitives::unit_cube(name)))),
                false,
                Some(Box::new(move |outcome: LoadOutcome| {
                    sink.lock().push(outcome.name);
                })),
                priority,
            )
            .unwrap();
    }
    std::thread::sleep(Duration::from_millis(20));
    drop(hold);

    drain(&loader, &device, 4);
    assert_eq!(*order.lock(), vec!["high", "mid", "low"]);
    loader.shutdown();
}

#[test]
fn failed_work_reports_failure_and_registers_nothing() {
    let manager = Arc::new(ResourceManager::new());
    let loader = AsyncLoader::new(Arc::clone(&manager));
    loader.initialize(Some(1)).unwrap();
    let device = HeadlessDevice::new();

    let status: Arc<Mutex<Option<LoadStatus>>> = Arc::new(Mutex::new(None));
    let sink = Arc::clone(&status);
    loader
        .submit(
            "broken",
            TaskWork::Mesh(Box::new(|| {
                Err(ember_core::Error::Io("no such archive".into()))
            })),
            true,
            Some(Box::new(move |outcome: LoadOutcome| {
                *sink.lock() = Some(outcome.status);
                assert!(outcome.error.is_some());
            })),
            1.0,
        )
        .unwrap();

    drain(&loader, &device, 1);
    assert_eq!(*status.lock(), Some(LoadStatus::Failed));
    assert!(!manager.has_mesh("broken"));
    loader.shutdown();
}
