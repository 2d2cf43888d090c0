//! # ember_ecs - entities, components, systems
//!
//! A deliberately small entity-component layer:
//! - generational [`Entity`] handles, stale ones rejected everywhere,
//! - per-type dense stores with presence bitmaps; queries intersect
//!   bitmaps and iterate in ascending slot order,
//! - a [`Scheduler`] running [`System`]s serially by priority,
//! - [`TransformComponent`] with entity-handle parent links, orphan
//!   clearing and cycle rejection.
//!
//! # Example
//! ```ignore
//! let mut world = World::new();
//! let e = world.create_entity("crate", true);
//! world.add_component(e, TransformComponent::new(Vec3::new(0.0, 1.0, 0.0)))?;
//! let mut scheduler = Scheduler::new();
//! scheduler.register(Box::new(TransformSystem::new()));
//! scheduler.update(&mut world, dt);
//! ```

pub mod entity;
pub mod store;
pub mod system;
pub mod transform;
pub mod world;

pub use entity::Entity;
pub use store::{Bitmap, Component};
pub use system::{Scheduler, System};
pub use transform::{set_parent, TransformComponent, TransformStats, TransformSystem};
pub use world::{shared_world, EntityInfo, SharedWorld, World};
