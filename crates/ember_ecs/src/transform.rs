//! Transform component and hierarchy system
//!
//! Parents are stored as entity handles, never pointers. Stale parents
//! are cleared during the transform pass each frame; cycle creation is
//! rejected at `set_parent` time with an ancestor walk.

use crate::entity::Entity;
use crate::system::System;
use crate::world::World;
use ember_core::{Error, Result};
use ember_math::{Mat4, Quat, Vec3};

/// Local TRS, parent link and cached matrices
#[derive(Clone, Debug)]
pub struct TransformComponent {
    pub position: Vec3,
    pub rotation: Quat,
    pub scale: Vec3,
    parent: Entity,
    local_matrix: Mat4,
    world_matrix: Mat4,
    dirty: bool,
}

impl Default for TransformComponent {
    fn default() -> Self {
        Self {
            position: Vec3::ZERO,
            rotation: Quat::IDENTITY,
            scale: Vec3::ONE,
            parent: Entity::INVALID,
            local_matrix: Mat4::IDENTITY,
            world_matrix: Mat4::IDENTITY,
            dirty: true,
        }
    }
}

impl TransformComponent {
    pub fn new(position: Vec3) -> Self {
        Self {
            position,
            dirty: true,
            ..Default::default()
        }
    }

    pub fn set_position(&mut self, position: Vec3) {
        self.position = position;
        self.dirty = true;
    }

    pub fn set_rotation(&mut self, rotation: Quat) {
        self.rotation = rotation.normalize();
        self.dirty = true;
    }

    /// Euler angles in degrees, the public-boundary convention
    pub fn set_euler_degrees(&mut self, x: f32, y: f32, z: f32) {
        self.set_rotation(Quat::from_euler_degrees(x, y, z));
    }

    pub fn set_scale(&mut self, scale: Vec3) {
        self.scale = scale;
        self.dirty = true;
    }

    pub fn parent(&self) -> Entity {
        self.parent
    }

    pub(crate) fn clear_parent(&mut self) {
        self.parent = Entity::INVALID;
        self.dirty = true;
    }

    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    pub fn mark_dirty(&mut self) {
        self.dirty = true;
    }

    /// Cached local matrix; valid after the transform pass
    pub fn local_matrix(&self) -> Mat4 {
        self.local_matrix
    }

    /// Cached world matrix; valid after the transform pass
    pub fn world_matrix(&self) -> Mat4 {
        self.world_matrix
    }

    pub fn world_position(&self) -> Vec3 {
        self.world_matrix.translation()
    }

    fn recompute_local(&mut self) {
        self.local_matrix = Mat4::from_trs(self.position, self.rotation, self.scale);
    }
}

/// Re-parent `child` under `parent` (or detach with `Entity::INVALID`).
/// Rejects self-parenting, dead parents and any link that would create a
/// cycle.
pub fn set_parent(world: &mut World, child: Entity, parent: Entity) -> Result<()> {
    if child == parent {
        return Err(Error::InvalidArgument(format!(
            "{child:?} cannot be its own parent"
        )));
    }
    if parent.is_valid() {
        if !world.is_valid(parent) {
            return Err(Error::InvalidArgument(format!(
                "parent {parent:?} is not alive"
            )));
        }
        // Walk up from the prospective parent; finding `child` means the
        // link would close a cycle.
        let mut cursor = parent;
        let mut depth = 0;
        while cursor.is_valid() {
            if cursor == child {
                return Err(Error::InvalidArgument(format!(
                    "parenting {child:?} under {parent:?} would create a cycle"
                )));
            }
            cursor = world
                .get_component::<TransformComponent>(cursor)
                .map(|t| t.parent())
                .unwrap_or(Entity::INVALID);
            depth += 1;
            if depth > 10_000 {
                return Err(Error::InvalidArgument("transform chain too deep".into()));
            }
        }
    }
    let transform = world
        .get_component_mut::<TransformComponent>(child)
        .ok_or_else(|| Error::InvalidArgument(format!("{child:?} has no transform")))?;
    transform.parent = parent;
    transform.dirty = true;
    Ok(())
}

/// Per-frame counters from the transform pass
#[derive(Clone, Copy, Debug, Default, serde::Serialize, serde::Deserialize)]
pub struct TransformStats {
    pub updated: usize,
    pub orphans_cleared: usize,
}

/// Recomputes local and world matrices each frame. Priority 10, runs
/// before everything that reads world matrices.
#[derive(Default)]
pub struct TransformSystem {
    stats: TransformStats,
}

impl TransformSystem {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn stats(&self) -> TransformStats {
        self.stats
    }
}

impl System for TransformSystem {
    fn name(&self) -> &str {
        "transform"
    }

    fn priority(&self) -> i32 {
        10
    }

    fn update(&mut self, world: &mut World, _dt: f32) {
        self.stats = TransformStats::default();
        let entities = world.query::<TransformComponent>();

        // Pass 1: clear stale parents and refresh dirty local matrices
        for &entity in &entities {
            let parent = match world.get_component::<TransformComponent>(entity) {
                Some(t) => t.parent(),
                None => continue,
            };
            let stale = parent.is_valid() && !world.is_valid(parent);
            if let Some(t) = world.get_component_mut::<TransformComponent>(entity) {
                if stale {
                    t.clear_parent();
                    self.stats.orphans_cleared += 1;
                }
                if t.dirty {
                    t.recompute_local();
                    self.stats.updated += 1;
                }
            }
        }

        // Pass 2: world = parent world * local, walking each parent chain.
        // Parents were validated above, so the chain walk only sees live
        // handles; a depth guard covers malformed data anyway.
        for &entity in &entities {
            let world_matrix = compose_world(world, entity, 0);
            if let Some(t) = world.get_component_mut::<TransformComponent>(entity) {
                t.world_matrix = world_matrix;
                t.dirty = false;
            }
        }
    }

    fn as_any_mut(&mut self) -> &mut dyn std::any::Any {
        self
    }
}

fn compose_world(world: &World, entity: Entity, depth: u32) -> Mat4 {
    let Some(transform) = world.get_component::<TransformComponent>(entity) else {
        return Mat4::IDENTITY;
    };
    let local = if transform.dirty {
        Mat4::from_trs(transform.position, transform.rotation, transform.scale)
    } else {
        transform.local_matrix
    };
    let parent = transform.parent();
    if !parent.is_valid() || !world.is_valid(parent) || depth > 256 {
        return local;
    }
    compose_world(world, parent, depth + 1) * local
}

#[cfg(test)]
mod tests {
    use super::*;

    fn world_with_system() -> (World, TransformSystem) {
        let mut world = World::new();
        world.register_component::<TransformComponent>();
        (world, TransformSystem::new())
    }

    #[test]
    fn test_local_matrix_trs() {
        let (mut world, mut system) = world_with_system();
        let e = world.create_entity("e", true);
        world
            .add_component(e, TransformComponent::new(Vec3::new(1.0, 2.0, 3.0)))
            .unwrap();
        system.update(&mut world, 0.0);
        let t = world.get_component::<TransformComponent>(e).unwrap();
        assert_eq!(t.world_position(), Vec3::new(1.0, 2.0, 3.0));
        assert!(!t.is_dirty());
    }

    #[test]
    fn test_child_follows_parent() {
        let (mut world, mut system) = world_with_system();
        let parent = world.create_entity("parent", true);
        let child = world.create_entity("child", true);
        world
            .add_component(parent, TransformComponent::new(Vec3::new(10.0, 0.0, 0.0)))
            .unwrap();
        world
            .add_component(child, TransformComponent::new(Vec3::new(0.0, 5.0, 0.0)))
            .unwrap();
        set_parent(&mut world, child, parent).unwrap();
        system.update(&mut world, 0.0);
        let t = world.get_component::<TransformComponent>(child).unwrap();
        assert_eq!(t.world_position(), Vec3::new(10.0, 5.0, 0.0));
    }

    #[test]
    fn test_parent_destruction_orphans_child() {
        let (mut world, mut system) = world_with_system();
        let parent = world.create_entity("parent", true);
        let child = world.create_entity("child", true);
        world
            .add_component(parent, TransformComponent::new(Vec3::new(10.0, 0.0, 0.0)))
            .unwrap();
        world
            .add_component(child, TransformComponent::new(Vec3::new(0.0, 5.0, 0.0)))
            .unwrap();
        set_parent(&mut world, child, parent).unwrap();
        system.update(&mut world, 0.0);

        world.destroy_entity(parent);
        system.update(&mut world, 0.0);
        let t = world.get_component::<TransformComponent>(child).unwrap();
        assert!(!t.parent().is_valid());
        // World matrix collapses to local
        assert_eq!(t.world_position(), Vec3::new(0.0, 5.0, 0.0));
        assert_eq!(t.world_matrix(), t.local_matrix());
        assert_eq!(system.stats().orphans_cleared, 1);
    }

    #[test]
    fn test_cycle_rejected() {
        let (mut world, mut system) = world_with_system();
        let a = world.create_entity("a", true);
        let b = world.create_entity("b", true);
        let c = world.create_entity("c", true);
        for e in [a, b, c] {
            world.add_component(e, TransformComponent::default()).unwrap();
        }
        set_parent(&mut world, b, a).unwrap();
        set_parent(&mut world, c, b).unwrap();
        assert!(set_parent(&mut world, a, c).is_err());
        assert!(set_parent(&mut world, a, a).is_err());
        system.update(&mut world, 0.0);
    }

    #[test]
    fn test_detach() {
        let (mut world, mut system) = world_with_system();
        let parent = world.create_entity("p", true);
        let child = world.create_entity("c", true);
        world
            .add_component(parent, TransformComponent::new(Vec3::new(3.0, 0.0, 0.0)))
            .unwrap();
        world.add_component(child, TransformComponent::default()).unwrap();
        set_parent(&mut world, child, parent).unwrap();
        system.update(&mut world, 0.0);
        set_parent(&mut world, child, Entity::INVALID).unwrap();
        system.update(&mut world, 0.0);
        let t = world.get_component::<TransformComponent>(child).unwrap();
        assert_eq!(t.world_position(), Vec3::ZERO);
    }
}
