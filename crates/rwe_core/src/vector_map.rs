//! Generational slot map with stable, typed ids.
//!
//! An id packs `(index << 8) | generation`. Removing an element bumps the
//! slot's 8-bit generation so stale ids look up to `None`. Iteration always
//! runs in slot-index order, which is identical on every peer.

use std::cmp::Ordering;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::marker::PhantomData;

use serde::{Deserialize, Serialize};

const GENERATION_BITS: u32 = 8;
const GENERATION_MASK: u32 = (1 << GENERATION_BITS) - 1;

/// A typed handle into a [`VectorMap`].
#[derive(Serialize, Deserialize)]
#[serde(transparent, bound = "")]
pub struct OpaqueId<Tag> {
    value: u32,
    #[serde(skip)]
    marker: PhantomData<fn() -> Tag>,
}

impl<Tag> OpaqueId<Tag> {
    /// Wrap a raw packed value.
    #[must_use]
    pub const fn from_raw(value: u32) -> Self {
        Self {
            value,
            marker: PhantomData,
        }
    }

    const fn from_parts(index: u32, generation: u8) -> Self {
        Self::from_raw((index << GENERATION_BITS) | generation as u32)
    }

    /// Raw packed value.
    #[must_use]
    pub const fn value(self) -> u32 {
        self.value
    }

    /// Slot index.
    #[must_use]
    pub const fn index(self) -> usize {
        (self.value >> GENERATION_BITS) as usize
    }

    /// Slot generation.
    #[must_use]
    pub const fn generation(self) -> u8 {
        (self.value & GENERATION_MASK) as u8
    }
}

impl<Tag> Clone for OpaqueId<Tag> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<Tag> Copy for OpaqueId<Tag> {}

impl<Tag> PartialEq for OpaqueId<Tag> {
    fn eq(&self, other: &Self) -> bool {
        self.value == other.value
    }
}

impl<Tag> Eq for OpaqueId<Tag> {}

impl<Tag> PartialOrd for OpaqueId<Tag> {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl<Tag> Ord for OpaqueId<Tag> {
    fn cmp(&self, other: &Self) -> Ordering {
        self.value.cmp(&other.value)
    }
}

impl<Tag> Hash for OpaqueId<Tag> {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.value.hash(state);
    }
}

impl<Tag> fmt::Debug for OpaqueId<Tag> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}:{}", self.index(), self.generation())
    }
}

impl<Tag> fmt::Display for OpaqueId<Tag> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.value)
    }
}

#[derive(Debug, Clone)]
struct Slot<T> {
    generation: u8,
    value: Option<T>,
}

/// Slot map keyed by [`OpaqueId<Tag>`].
#[derive(Debug, Clone)]
pub struct VectorMap<T, Tag> {
    slots: Vec<Slot<T>>,
    free: Vec<u32>,
    len: usize,
    marker: PhantomData<fn() -> Tag>,
}

impl<T, Tag> Default for VectorMap<T, Tag> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T, Tag> VectorMap<T, Tag> {
    /// Create an empty map.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            slots: Vec::new(),
            free: Vec::new(),
            len: 0,
            marker: PhantomData,
        }
    }

    /// Number of live elements.
    #[must_use]
    pub const fn len(&self) -> usize {
        self.len
    }

    /// True if there are no live elements.
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Id the next insertion will return.
    #[must_use]
    pub fn next_id(&self) -> OpaqueId<Tag> {
        match self.free.last() {
            Some(&index) => OpaqueId::from_parts(index, self.slots[index as usize].generation),
            None => OpaqueId::from_parts(self.slots.len() as u32, 0),
        }
    }

    /// Insert a value, reusing the most recently freed slot.
    pub fn insert(&mut self, value: T) -> OpaqueId<Tag> {
        self.len += 1;
        if let Some(index) = self.free.pop() {
            let slot = &mut self.slots[index as usize];
            slot.value = Some(value);
            return OpaqueId::from_parts(index, slot.generation);
        }
        let index = self.slots.len() as u32;
        self.slots.push(Slot {
            generation: 0,
            value: Some(value),
        });
        OpaqueId::from_parts(index, 0)
    }

    /// Insert a value built from its own id.
    pub fn insert_with(&mut self, f: impl FnOnce(OpaqueId<Tag>) -> T) -> OpaqueId<Tag> {
        let id = self.next_id();
        let inserted = self.insert(f(id));
        debug_assert_eq!(id, inserted);
        inserted
    }

    fn slot(&self, id: OpaqueId<Tag>) -> Option<&Slot<T>> {
        self.slots
            .get(id.index())
            .filter(|slot| slot.generation == id.generation())
    }

    /// Look up a live element.
    #[must_use]
    pub fn get(&self, id: OpaqueId<Tag>) -> Option<&T> {
        self.slot(id).and_then(|slot| slot.value.as_ref())
    }

    /// Look up a live element mutably.
    pub fn get_mut(&mut self, id: OpaqueId<Tag>) -> Option<&mut T> {
        self.slots
            .get_mut(id.index())
            .filter(|slot| slot.generation == id.generation())
            .and_then(|slot| slot.value.as_mut())
    }

    /// True if `id` refers to a live element.
    #[must_use]
    pub fn contains(&self, id: OpaqueId<Tag>) -> bool {
        self.get(id).is_some()
    }

    /// Remove an element. Its id, and any copy of it, becomes stale.
    pub fn remove(&mut self, id: OpaqueId<Tag>) -> Option<T> {
        let slot = self
            .slots
            .get_mut(id.index())
            .filter(|slot| slot.generation == id.generation())?;
        let value = slot.value.take()?;
        slot.generation = slot.generation.wrapping_add(1);
        self.free.push(id.index() as u32);
        self.len -= 1;
        Some(value)
    }

    /// Live elements in slot order.
    pub fn iter(&self) -> impl Iterator<Item = (OpaqueId<Tag>, &T)> {
        self.slots.iter().enumerate().filter_map(|(index, slot)| {
            slot.value
                .as_ref()
                .map(|value| (OpaqueId::from_parts(index as u32, slot.generation), value))
        })
    }

    /// Live elements in slot order, mutably.
    pub fn iter_mut(&mut self) -> impl Iterator<Item = (OpaqueId<Tag>, &mut T)> {
        self.slots.iter_mut().enumerate().filter_map(|(index, slot)| {
            let generation = slot.generation;
            slot.value
                .as_mut()
                .map(|value| (OpaqueId::from_parts(index as u32, generation), value))
        })
    }

    /// Ids of live elements in slot order.
    #[must_use]
    pub fn ids(&self) -> Vec<OpaqueId<Tag>> {
        self.iter().map(|(id, _)| id).collect()
    }

    /// Live values in slot order.
    pub fn values(&self) -> impl Iterator<Item = &T> {
        self.iter().map(|(_, value)| value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    enum TestTag {}
    type TestId = OpaqueId<TestTag>;

    #[test]
    fn test_insert_and_lookup() {
        let mut map: VectorMap<&str, TestTag> = VectorMap::new();
        let a = map.insert("a");
        let b = map.insert("b");
        assert_eq!(map.get(a), Some(&"a"));
        assert_eq!(map.get(b), Some(&"b"));
        assert_eq!(map.len(), 2);
        assert_eq!(a.index(), 0);
        assert_eq!(b.value(), 1 << 8);
    }

    #[test]
    fn test_stale_id_after_reuse() {
        let mut map: VectorMap<u32, TestTag> = VectorMap::new();
        let first = map.insert(1);
        assert_eq!(map.remove(first), Some(1));
        let second = map.insert(2);
        assert_eq!(second.index(), first.index());
        assert_eq!(second.generation(), 1);
        assert_eq!(map.get(first), None);
        assert_eq!(map.get(second), Some(&2));
        assert_eq!(map.remove(first), None);
    }

    #[test]
    fn test_generation_wraps() {
        let mut map: VectorMap<u32, TestTag> = VectorMap::new();
        let mut id = map.insert(0);
        for i in 1..=256 {
            map.remove(id);
            id = map.insert(i);
        }
        assert_eq!(id.generation(), 0);
        assert_eq!(map.get(id), Some(&256));
    }

    #[test]
    fn test_iteration_is_in_slot_order() {
        let mut map: VectorMap<u32, TestTag> = VectorMap::new();
        let ids: Vec<TestId> = (0..5).map(|i| map.insert(i)).collect();
        map.remove(ids[1]);
        map.remove(ids[3]);
        let values: Vec<u32> = map.values().copied().collect();
        assert_eq!(values, vec![0, 2, 4]);
        let reused = map.insert(9);
        assert_eq!(reused.index(), 3);
        let values: Vec<u32> = map.values().copied().collect();
        assert_eq!(values, vec![0, 2, 9, 4]);
    }

    #[test]
    fn test_insert_with_sees_its_id() {
        let mut map: VectorMap<TestId, TestTag> = VectorMap::new();
        let id = map.insert_with(|id| id);
        assert_eq!(map.get(id), Some(&id));
    }
}
