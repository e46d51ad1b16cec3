//! Integer id allocation with a free list.

use std::collections::BTreeSet;
use std::fmt::Debug;
use std::hash::Hash;

/// Integer types usable as ids.
pub trait IdValue: Copy + Ord + Hash + Debug {
    fn from_index(index: usize) -> Self;
    fn index(self) -> usize;
}

macro_rules! impl_id_value {
    ($($t:ty),*) => {
        $(
            impl IdValue for $t {
                fn from_index(index: usize) -> Self {
                    index as $t
                }

                fn index(self) -> usize {
                    self as usize
                }
            }
        )*
    };
}

impl_id_value!(u32, u64, usize);

/// Hands out ids from `0` upwards and recycles released ones.
///
/// Released ids are reused (smallest first) only while the free set is
/// small relative to the high-water mark, `free * 2 < last_id`. Past that
/// point fresh ids are handed out and the holes are left for compaction.
#[derive(Clone, Debug)]
pub struct IdProvider<T: IdValue> {
    last_id: T,
    free: BTreeSet<T>,
}

impl<T: IdValue> Default for IdProvider<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: IdValue> IdProvider<T> {
    pub fn new() -> Self {
        Self {
            last_id: T::from_index(0),
            free: BTreeSet::new(),
        }
    }

    /// Allocates an id.
    pub fn get_new_id(&mut self) -> T {
        if !self.free.is_empty() && self.free.len() * 2 < self.last_id.index() {
            if let Some(id) = self.free.pop_first() {
                return id;
            }
        }
        let id = self.last_id;
        self.last_id = T::from_index(id.index() + 1);
        id
    }

    /// Allocates `preferred` if it is free, otherwise any id.
    pub fn get_new_id_preferring(&mut self, preferred: T) -> T {
        if self.free.remove(&preferred) {
            return preferred;
        }
        if preferred == self.last_id {
            self.last_id = T::from_index(preferred.index() + 1);
            return preferred;
        }
        self.get_new_id()
    }

    /// Returns an id to the pool. Returns false if it was not allocated.
    pub fn release_id(&mut self, id: T) -> bool {
        if id >= self.last_id {
            tracing::warn!(?id, "released an id that was never allocated");
            return false;
        }
        if !self.free.insert(id) {
            tracing::warn!(?id, "released an id twice");
            return false;
        }
        true
    }

    /// Next never-used id.
    pub fn last_id(&self) -> T {
        self.last_id
    }

    /// Number of ids currently handed out.
    pub fn allocated_count(&self) -> usize {
        self.last_id.index() - self.free.len()
    }

    pub fn free_count(&self) -> usize {
        self.free.len()
    }

    /// Marks `0..count` allocated and forgets every released id.
    ///
    /// Used after the id space has been compacted.
    pub fn reset(&mut self, count: usize) {
        self.last_id = T::from_index(count);
        self.free.clear();
    }
}
