//! System trait and priority scheduler
//!
//! Systems are registered with a fixed priority and run sequentially in
//! ascending priority order, one virtual call per system per frame.
//! Registration order breaks ties, so two systems at the same priority
//! keep their relative order.

use crate::world::World;
use std::any::Any;

pub trait System: Send {
    fn name(&self) -> &str;

    /// Smaller runs earlier
    fn priority(&self) -> i32;

    fn update(&mut self, world: &mut World, dt: f32);

    /// For downcasting via [`Scheduler::get_mut`]
    fn as_any_mut(&mut self) -> &mut dyn Any;
}

/// Priority-ordered system registry
#[derive(Default)]
pub struct Scheduler {
    systems: Vec<Box<dyn System>>,
}

impl Scheduler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert keeping the list sorted by priority; stable for equals
    pub fn register(&mut self, system: Box<dyn System>) {
        let pos = self
            .systems
            .partition_point(|s| s.priority() <= system.priority());
        log::debug!(
            "system '{}' registered at priority {}",
            system.name(),
            system.priority()
        );
        self.systems.insert(pos, system);
    }

    /// Run every system in priority order
    pub fn update(&mut self, world: &mut World, dt: f32) {
        for system in &mut self.systems {
            system.update(world, dt);
        }
    }

    /// Fetch a registered system by concrete type
    pub fn get_mut<T: System + 'static>(&mut self) -> Option<&mut T> {
        self.systems
            .iter_mut()
            .find_map(|s| s.as_any_mut().downcast_mut())
    }

    pub fn len(&self) -> usize {
        self.systems.len()
    }

    pub fn is_empty(&self) -> bool {
        self.systems.is_empty()
    }

    /// (name, priority) pairs in execution order
    pub fn list(&self) -> Vec<(String, i32)> {
        self.systems
            .iter()
            .map(|s| (s.name().to_string(), s.priority()))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Recorder {
        name: &'static str,
        priority: i32,
        log: std::sync::Arc<parking_lot::Mutex<Vec<&'static str>>>,
    }

    impl System for Recorder {
        fn name(&self) -> &str {
            self.name
        }

        fn priority(&self) -> i32 {
            self.priority
        }

        fn update(&mut self, _world: &mut World, _dt: f32) {
            self.log.lock().push(self.name);
        }

        fn as_any_mut(&mut self) -> &mut dyn Any {
            self
        }
    }

    #[test]
    fn test_priority_order_with_stable_ties() {
        let log = std::sync::Arc::new(parking_lot::Mutex::new(Vec::new()));
        let mut scheduler = Scheduler::new();
        for (name, priority) in [("render", 100), ("transform", 10), ("lod_a", 95), ("lod_b", 95)]
        {
            scheduler.register(Box::new(Recorder {
                name,
                priority,
                log: log.clone(),
            }));
        }
        let mut world = World::new();
        scheduler.update(&mut world, 0.016);
        assert_eq!(*log.lock(), vec!["transform", "lod_a", "lod_b", "render"]);
    }

    #[test]
    fn test_get_by_type() {
        let mut scheduler = Scheduler::new();
        scheduler.register(Box::new(Recorder {
            name: "r",
            priority: 1,
            log: Default::default(),
        }));
        assert!(scheduler.get_mut::<Recorder>().is_some());
        assert_eq!(scheduler.len(), 1);
    }
}
