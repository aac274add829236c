//! Stable integer handles and the per-category allocator that backs them.
//!
//! §4.A: "ID allocation: one vector per variant category (struct, object,
//! fragment). A new entity takes the lowest free index from the free list,
//! else grows the vector." §9's mapping notes ask for typed handle wrappers
//! with generation counters in place of the original's raw pointers/indices,
//! to catch stale handles in debug builds — this module is that wrapper.

use std::cmp::Reverse;
use std::collections::BinaryHeap;
use std::marker::PhantomData;

use crate::error::SimError;

/// A generational handle into a [`Pool`]. `Tag` is a zero-sized marker type
/// distinguishing e.g. `Index<StructTag>` from `Index<ObjectTag>` at the
/// type level, even though both are a `(u32, u32)` pair underneath.
pub struct Index<Tag> {
    pub slot: u32,
    pub generation: u32,
    _marker: PhantomData<fn() -> Tag>,
}

impl<Tag> Index<Tag> {
    fn new(slot: u32, generation: u32) -> Self {
        Self {
            slot,
            generation,
            _marker: PhantomData,
        }
    }

    /// Reconstruct a handle from its raw `(slot, generation)` pair. Used at
    /// boundaries that only carry the pair across as plain integers (the
    /// Lua scripting boundary, §6) rather than going through [`Pool`]'s
    /// allocator; [`Pool::get`]'s generation check still rejects it if the
    /// slot has since been freed and reused.
    pub const fn from_raw(slot: u32, generation: u32) -> Self {
        Self::new(slot, generation)
    }
}

impl<Tag> Clone for Index<Tag> {
    fn clone(&self) -> Self {
        *self
    }
}
impl<Tag> Copy for Index<Tag> {}
impl<Tag> PartialEq for Index<Tag> {
    fn eq(&self, other: &Self) -> bool {
        self.slot == other.slot && self.generation == other.generation
    }
}
impl<Tag> Eq for Index<Tag> {}
impl<Tag> std::hash::Hash for Index<Tag> {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        self.slot.hash(state);
        self.generation.hash(state);
    }
}
impl<Tag> std::fmt::Debug for Index<Tag> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Index({}, gen {})", self.slot, self.generation)
    }
}

struct Slot<T> {
    generation: u32,
    value: Option<T>,
}

/// A free-list-backed vector: `alloc` reuses the lowest freed slot before
/// growing, `free` clears the slot and records it as reusable, and a
/// compile-time `cap` bounds the vector's growth (`CapacityExceeded`).
pub struct Pool<Tag, T> {
    slots: Vec<Slot<T>>,
    free: BinaryHeap<Reverse<u32>>,
    cap: u32,
    kind_name: &'static str,
    _marker: PhantomData<fn() -> Tag>,
}

impl<Tag, T> Pool<Tag, T> {
    pub fn new(cap: u32, kind_name: &'static str) -> Self {
        Self {
            slots: Vec::new(),
            free: BinaryHeap::new(),
            cap,
            kind_name,
            _marker: PhantomData,
        }
    }

    pub fn alloc(&mut self, value: T) -> Result<Index<Tag>, SimError> {
        if let Some(Reverse(slot)) = self.free.pop() {
            let s = &mut self.slots[slot as usize];
            debug_assert!(s.value.is_none(), "reused slot was not empty");
            s.generation = s.generation.wrapping_add(1);
            s.value = Some(value);
            return Ok(Index::new(slot, s.generation));
        }

        if self.slots.len() as u32 >= self.cap {
            return Err(SimError::CapacityExceeded {
                kind: self.kind_name,
                cap: self.cap,
            });
        }

        let slot = self.slots.len() as u32;
        self.slots.push(Slot {
            generation: 0,
            value: Some(value),
        });
        Ok(Index::new(slot, 0))
    }

    /// Remove the value at `id`, if `id` is still live. Returns the removed
    /// value, or `None` if `id` was stale (wrong generation) or already free.
    pub fn free(&mut self, id: Index<Tag>) -> Option<T> {
        let slot = self.slots.get_mut(id.slot as usize)?;
        if slot.generation != id.generation || slot.value.is_none() {
            return None;
        }
        let value = slot.value.take();
        self.free.push(Reverse(id.slot));
        value
    }

    pub fn get(&self, id: Index<Tag>) -> Option<&T> {
        let slot = self.slots.get(id.slot as usize)?;
        if slot.generation != id.generation {
            return None;
        }
        slot.value.as_ref()
    }

    pub fn get_mut(&mut self, id: Index<Tag>) -> Option<&mut T> {
        let slot = self.slots.get_mut(id.slot as usize)?;
        if slot.generation != id.generation {
            return None;
        }
        slot.value.as_mut()
    }

    pub fn contains(&self, id: Index<Tag>) -> bool {
        self.get(id).is_some()
    }

    /// Iterate over all live `(id, value)` pairs, in slot order.
    pub fn iter(&self) -> impl Iterator<Item = (Index<Tag>, &T)> {
        self.slots.iter().enumerate().filter_map(|(i, s)| {
            s.value
                .as_ref()
                .map(|v| (Index::new(i as u32, s.generation), v))
        })
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = (Index<Tag>, &mut T)> {
        self.slots.iter_mut().enumerate().filter_map(|(i, s)| {
            let generation = s.generation;
            s.value
                .as_mut()
                .map(|v| (Index::new(i as u32, generation), v))
        })
    }

    /// Number of live entries.
    pub fn live_count(&self) -> usize {
        self.slots.iter().filter(|s| s.value.is_some()).count()
    }

    /// Total number of ever-allocated slots (live + freed), for the
    /// mass-conservation-of-ids property (§8).
    pub fn ever_allocated(&self) -> usize {
        self.slots.len()
    }

    pub fn free_count(&self) -> usize {
        self.free.len()
    }
}

/// Marker types distinguishing the three id categories of §4.A.
pub struct StructTag;
pub struct ObjectTag;
pub struct FragTag;

pub type StructId = Index<StructTag>;
pub type ObjectId = Index<ObjectTag>;
pub type FragId = Index<FragTag>;

#[cfg(test)]
mod tests {
    use super::*;

    struct DummyTag;

    #[test]
    fn alloc_reuses_lowest_freed_slot() {
        let mut pool: Pool<DummyTag, i32> = Pool::new(16, "dummy");
        let a = pool.alloc(1).unwrap();
        let b = pool.alloc(2).unwrap();
        let _c = pool.alloc(3).unwrap();
        pool.free(b);
        pool.free(a);
        // lowest freed slot (a.slot == 0) must be reused first
        let d = pool.alloc(4).unwrap();
        assert_eq!(d.slot, a.slot);
        assert_ne!(d.generation, a.generation);
    }

    #[test]
    fn stale_handle_does_not_resolve_after_reuse() {
        let mut pool: Pool<DummyTag, i32> = Pool::new(16, "dummy");
        let a = pool.alloc(1).unwrap();
        pool.free(a);
        let b = pool.alloc(2).unwrap();
        assert_eq!(a.slot, b.slot);
        assert!(pool.get(a).is_none());
        assert_eq!(*pool.get(b).unwrap(), 2);
    }

    #[test]
    fn capacity_exceeded_is_reported() {
        let mut pool: Pool<DummyTag, i32> = Pool::new(2, "dummy");
        pool.alloc(1).unwrap();
        pool.alloc(2).unwrap();
        let err = pool.alloc(3).unwrap_err();
        match err {
            SimError::CapacityExceeded { kind, cap } => {
                assert_eq!(kind, "dummy");
                assert_eq!(cap, 2);
            }
            _ => panic!("wrong error kind"),
        }
    }

    #[test]
    fn mass_conservation_of_ids() {
        let mut pool: Pool<DummyTag, i32> = Pool::new(16, "dummy");
        let a = pool.alloc(1).unwrap();
        let _b = pool.alloc(2).unwrap();
        pool.free(a);
        // live + free == ever_allocated
        assert_eq!(pool.live_count() + pool.free_count(), pool.ever_allocated());
    }
}
