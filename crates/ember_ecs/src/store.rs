//! Per-type component storage
//!
//! Each component type gets a dense slot-indexed array plus a presence
//! bitmap. Queries intersect bitmaps word by word, then walk set bits in
//! ascending slot order, which fixes the iteration order for every system.

use std::any::Any;

/// Marker trait for component data
pub trait Component: Send + Sync + 'static {}

impl<T: Send + Sync + 'static> Component for T {}

/// 64-bit-word presence bitmap
#[derive(Clone, Default)]
pub struct Bitmap {
    words: Vec<u64>,
}

impl Bitmap {
    pub fn set(&mut self, bit: usize) {
        let word = bit / 64;
        if word >= self.words.len() {
            self.words.resize(word + 1, 0);
        }
        self.words[word] |= 1 << (bit % 64);
    }

    pub fn clear(&mut self, bit: usize) {
        if let Some(word) = self.words.get_mut(bit / 64) {
            *word &= !(1 << (bit % 64));
        }
    }

    pub fn get(&self, bit: usize) -> bool {
        self.words
            .get(bit / 64)
            .map(|w| w & (1 << (bit % 64)) != 0)
            .unwrap_or(false)
    }

    pub fn words(&self) -> &[u64] {
        &self.words
    }

    /// Ascending indices of bits set in every given bitmap
    pub fn intersect_iter<'a>(maps: &'a [&'a Bitmap]) -> impl Iterator<Item = usize> + 'a {
        let word_count = maps.iter().map(|m| m.words.len()).min().unwrap_or(0);
        (0..word_count).flat_map(move |wi| {
            let mut word = maps.iter().fold(u64::MAX, |acc, m| acc & m.words[wi]);
            std::iter::from_fn(move || {
                if word == 0 {
                    return None;
                }
                let bit = word.trailing_zeros() as usize;
                word &= word - 1;
                Some(wi * 64 + bit)
            })
        })
    }
}

/// Type-erased store interface used by the world
pub(crate) trait AnyStore: Send + Sync {
    fn remove_slot(&mut self, slot: usize);
    fn bitmap(&self) -> &Bitmap;
    fn clear(&mut self);
    fn as_any(&self) -> &dyn Any;
    fn as_any_mut(&mut self) -> &mut dyn Any;
}

/// Dense array + presence bitmap for one component type
pub(crate) struct ComponentStore<T: Component> {
    slots: Vec<Option<T>>,
    present: Bitmap,
}

impl<T: Component> Default for ComponentStore<T> {
    fn default() -> Self {
        Self {
            slots: Vec::new(),
            present: Bitmap::default(),
        }
    }
}

impl<T: Component> ComponentStore<T> {
    pub fn insert(&mut self, slot: usize, value: T) {
        if slot >= self.slots.len() {
            self.slots.resize_with(slot + 1, || None);
        }
        self.slots[slot] = Some(value);
        self.present.set(slot);
    }

    pub fn get(&self, slot: usize) -> Option<&T> {
        self.slots.get(slot).and_then(|s| s.as_ref())
    }

    pub fn get_mut(&mut self, slot: usize) -> Option<&mut T> {
        self.slots.get_mut(slot).and_then(|s| s.as_mut())
    }

    pub fn remove(&mut self, slot: usize) -> Option<T> {
        self.present.clear(slot);
        self.slots.get_mut(slot).and_then(|s| s.take())
    }

    pub fn contains(&self, slot: usize) -> bool {
        self.present.get(slot)
    }
}

impl<T: Component> AnyStore for ComponentStore<T> {
    fn remove_slot(&mut self, slot: usize) {
        self.remove(slot);
    }

    fn bitmap(&self) -> &Bitmap {
        &self.present
    }

    fn clear(&mut self) {
        self.slots.clear();
        self.present = Bitmap::default();
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}
