//! The entity-component world
//!
//! All entity slots and component stores live here; the scheduler passes
//! `&mut World` to each system in turn, so access is serial and needs no
//! per-store locking. Hosts that share the world across modules wrap it
//! in [`SharedWorld`].

use crate::entity::{Entity, EntityAllocator};
use crate::store::{AnyStore, Bitmap, Component, ComponentStore};
use ember_core::{Error, Result};
use parking_lot::Mutex;
use std::any::TypeId;
use std::collections::HashMap;
use std::sync::Arc;

/// World behind the single world-wide mutex
pub type SharedWorld = Arc<Mutex<World>>;

/// Built-in component every entity carries
#[derive(Clone, Debug)]
pub struct EntityInfo {
    pub name: String,
    pub active: bool,
}

/// Entity and component container
#[derive(Default)]
pub struct World {
    allocator: EntityAllocator,
    stores: HashMap<TypeId, Box<dyn AnyStore>>,
}

impl World {
    pub fn new() -> Self {
        let mut world = Self::default();
        world.register_component::<EntityInfo>();
        world
    }

    /// Ensure a store exists for `T`. Idempotent.
    pub fn register_component<T: Component>(&mut self) {
        self.stores
            .entry(TypeId::of::<T>())
            .or_insert_with(|| Box::new(ComponentStore::<T>::default()));
    }

    fn store<T: Component>(&self) -> Option<&ComponentStore<T>> {
        self.stores
            .get(&TypeId::of::<T>())
            .and_then(|s| s.as_any().downcast_ref())
    }

    fn store_mut<T: Component>(&mut self) -> Option<&mut ComponentStore<T>> {
        self.stores
            .get_mut(&TypeId::of::<T>())
            .and_then(|s| s.as_any_mut().downcast_mut())
    }

    // ---- entities ----

    pub fn create_entity(&mut self, name: impl Into<String>, active: bool) -> Entity {
        let entity = self.allocator.allocate();
        let info = EntityInfo {
            name: name.into(),
            active,
        };
        if let Some(store) = self.store_mut::<EntityInfo>() {
            store.insert(entity.index() as usize, info);
        }
        entity
    }

    /// Destroy an entity and every component it holds. Stale handles are
    /// rejected and return false.
    pub fn destroy_entity(&mut self, entity: Entity) -> bool {
        if !self.allocator.is_live(entity) {
            return false;
        }
        let slot = entity.index() as usize;
        for store in self.stores.values_mut() {
            store.remove_slot(slot);
        }
        self.allocator.free(entity)
    }

    /// Live check: structural validity plus matching slot generation
    pub fn is_valid(&self, entity: Entity) -> bool {
        self.allocator.is_live(entity)
    }

    pub fn entity_count(&self) -> usize {
        self.allocator.live_count()
    }

    pub fn entity_name(&self, entity: Entity) -> Option<String> {
        self.get_component::<EntityInfo>(entity)
            .map(|info| info.name.clone())
    }

    pub fn is_active(&self, entity: Entity) -> bool {
        self.get_component::<EntityInfo>(entity)
            .map(|info| info.active)
            .unwrap_or(false)
    }

    pub fn set_active(&mut self, entity: Entity, active: bool) {
        if let Some(info) = self.get_component_mut::<EntityInfo>(entity) {
            info.active = active;
        }
    }

    // ---- components ----

    /// Attach a component, registering the store on first use. Fails on
    /// stale handles.
    pub fn add_component<T: Component>(&mut self, entity: Entity, value: T) -> Result<()> {
        if !self.allocator.is_live(entity) {
            return Err(Error::InvalidArgument(format!(
                "add_component on dead {entity:?}"
            )));
        }
        self.register_component::<T>();
        if let Some(store) = self.store_mut::<T>() {
            store.insert(entity.index() as usize, value);
        }
        Ok(())
    }

    pub fn get_component<T: Component>(&self, entity: Entity) -> Option<&T> {
        if !self.allocator.is_live(entity) {
            return None;
        }
        self.store::<T>()?.get(entity.index() as usize)
    }

    pub fn get_component_mut<T: Component>(&mut self, entity: Entity) -> Option<&mut T> {
        if !self.allocator.is_live(entity) {
            return None;
        }
        self.store_mut::<T>()?.get_mut(entity.index() as usize)
    }

    pub fn has_component<T: Component>(&self, entity: Entity) -> bool {
        self.allocator.is_live(entity)
            && self
                .store::<T>()
                .map(|s| s.contains(entity.index() as usize))
                .unwrap_or(false)
    }

    pub fn remove_component<T: Component>(&mut self, entity: Entity) -> Option<T> {
        if !self.allocator.is_live(entity) {
            return None;
        }
        self.store_mut::<T>()?.remove(entity.index() as usize)
    }

    // ---- queries ----

    fn bitmap_of(&self, type_id: TypeId) -> Option<&Bitmap> {
        self.stores.get(&type_id).map(|s| s.bitmap())
    }

    fn entities_from_bitmaps(&self, type_ids: &[TypeId]) -> Vec<Entity> {
        let mut maps = Vec::with_capacity(type_ids.len());
        for id in type_ids {
            match self.bitmap_of(*id) {
                Some(map) => maps.push(map),
                None => return Vec::new(),
            }
        }
        Bitmap::intersect_iter(&maps)
            .filter_map(|slot| self.entity_at_slot(slot))
            .collect()
    }

    fn entity_at_slot(&self, slot: usize) -> Option<Entity> {
        // Components are removed at destroy time, so a set presence bit
        // implies a live slot; rebuild the handle from the live generation.
        let generation = self.allocator.generation_of(slot)?;
        Some(Entity::new(slot as u32, generation))
    }

    /// Entities holding `T`, ascending slot order
    pub fn query<T: Component>(&self) -> Vec<Entity> {
        self.entities_from_bitmaps(&[TypeId::of::<T>()])
    }

    /// Entities holding both `A` and `B`, ascending slot order
    pub fn query2<A: Component, B: Component>(&self) -> Vec<Entity> {
        self.entities_from_bitmaps(&[TypeId::of::<A>(), TypeId::of::<B>()])
    }

    /// Entities holding `A`, `B` and `C`, ascending slot order
    pub fn query3<A: Component, B: Component, C: Component>(&self) -> Vec<Entity> {
        self.entities_from_bitmaps(&[TypeId::of::<A>(), TypeId::of::<B>(), TypeId::of::<C>()])
    }

    /// Remove every entity and component, keeping registered stores
    pub fn clear(&mut self) {
        for store in self.stores.values_mut() {
            store.clear();
        }
        self.allocator.clear();
    }
}

/// Convenience constructor for the shared form
pub fn shared_world() -> SharedWorld {
    Arc::new(Mutex::new(World::new()))
}
