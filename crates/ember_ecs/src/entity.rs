//! Generational entity handles
//!
//! An entity is an index into the world's slot array plus the generation
//! the slot had when the handle was issued. Destroying an entity bumps
//! the slot generation, so stale handles compare unequal and are rejected
//! everywhere.

use std::collections::VecDeque;

/// Handle to one entity. 64 bits: slot index + generation.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[derive(serde::Serialize, serde::Deserialize)]
pub struct Entity {
    index: u32,
    generation: u32,
}

impl Entity {
    /// The null handle; never valid in any world
    pub const INVALID: Self = Self {
        index: u32::MAX,
        generation: 0,
    };

    pub(crate) const fn new(index: u32, generation: u32) -> Self {
        Self { index, generation }
    }

    #[inline]
    pub fn index(&self) -> u32 {
        self.index
    }

    #[inline]
    pub fn generation(&self) -> u32 {
        self.generation
    }

    /// Structurally valid (not the null handle). Liveness is a world
    /// question, see `World::is_valid`.
    #[inline]
    pub fn is_valid(&self) -> bool {
        self.index != u32::MAX
    }
}

impl Default for Entity {
    fn default() -> Self {
        Self::INVALID
    }
}

impl std::fmt::Debug for Entity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.is_valid() {
            write!(f, "Entity({}v{})", self.index, self.generation)
        } else {
            write!(f, "Entity(invalid)")
        }
    }
}

/// Slot-reusing allocator backing a world's entity set
#[derive(Default)]
pub(crate) struct EntityAllocator {
    generations: Vec<u32>,
    alive: Vec<bool>,
    free: VecDeque<u32>,
    live_count: usize,
}

impl EntityAllocator {
    pub fn allocate(&mut self) -> Entity {
        self.live_count += 1;
        if let Some(index) = self.free.pop_front() {
            self.alive[index as usize] = true;
            return Entity::new(index, self.generations[index as usize]);
        }
        let index = self.generations.len() as u32;
        self.generations.push(0);
        self.alive.push(true);
        Entity::new(index, 0)
    }

    /// Returns false for stale or never-issued handles
    pub fn free(&mut self, entity: Entity) -> bool {
        if !self.is_live(entity) {
            return false;
        }
        let slot = entity.index() as usize;
        self.alive[slot] = false;
        self.generations[slot] = self.generations[slot].wrapping_add(1);
        self.free.push_back(entity.index());
        self.live_count -= 1;
        true
    }

    pub fn is_live(&self, entity: Entity) -> bool {
        let slot = entity.index() as usize;
        entity.is_valid()
            && slot < self.generations.len()
            && self.alive[slot]
            && self.generations[slot] == entity.generation()
    }

    pub fn live_count(&self) -> usize {
        self.live_count
    }

    /// Generation of a live slot, or `None` when the slot is dead
    pub fn generation_of(&self, slot: usize) -> Option<u32> {
        (slot < self.generations.len() && self.alive[slot]).then(|| self.generations[slot])
    }

    pub fn clear(&mut self) {
        for (slot, alive) in self.alive.iter_mut().enumerate() {
            if *alive {
                *alive = false;
                self.generations[slot] = self.generations[slot].wrapping_add(1);
                self.free.push_back(slot as u32);
            }
        }
        self.live_count = 0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_slot_reuse_bumps_generation() {
        let mut alloc = EntityAllocator::default();
        let a = alloc.allocate();
        assert!(alloc.free(a));
        let b = alloc.allocate();
        assert_eq!(a.index(), b.index());
        assert_ne!(a.generation(), b.generation());
        assert!(!alloc.is_live(a));
        assert!(alloc.is_live(b));
    }

    #[test]
    fn test_double_free_rejected() {
        let mut alloc = EntityAllocator::default();
        let a = alloc.allocate();
        assert!(alloc.free(a));
        assert!(!alloc.free(a));
        assert_eq!(alloc.live_count(), 0);
    }

    #[test]
    fn test_invalid_never_live() {
        let alloc = EntityAllocator::default();
        assert!(!alloc.is_live(Entity::INVALID));
        assert!(!Entity::INVALID.is_valid());
        assert_eq!(Entity::default(), Entity::INVALID);
    }
}
