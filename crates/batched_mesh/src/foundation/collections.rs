//! Specialized collection types

use std::collections::BTreeSet;

/// Free list with lowest-id-first recycling
///
/// Slots are addressed by dense `u32` ids. Removing an item leaves a hole and
/// records its id in an ordered free set; the next insert fills the lowest
/// hole before minting a new id at the end. The number of slots ever minted
/// (live or free) is the list's high-water mark.
#[derive(Debug, Clone)]
pub struct FreeList<T> {
    items: Vec<Option<T>>,
    free_ids: BTreeSet<u32>,
}

impl<T> FreeList<T> {
    /// Create a new free list
    pub fn new() -> Self {
        Self {
            items: Vec::new(),
            free_ids: BTreeSet::new(),
        }
    }

    /// Id the next [`insert`](Self::insert) will return
    pub fn next_id(&self) -> u32 {
        self.free_ids
            .first()
            .copied()
            .unwrap_or(self.items.len() as u32)
    }

    /// Insert an item and return its id
    pub fn insert(&mut self, item: T) -> u32 {
        if let Some(id) = self.free_ids.pop_first() {
            self.items[id as usize] = Some(item);
            id
        } else {
            let id = self.items.len() as u32;
            self.items.push(Some(item));
            id
        }
    }

    /// Remove an item by id
    pub fn remove(&mut self, id: u32) -> Option<T> {
        let item = self.items.get_mut(id as usize)?.take()?;
        self.free_ids.insert(id);
        Some(item)
    }

    /// Get an item by id
    pub fn get(&self, id: u32) -> Option<&T> {
        self.items.get(id as usize)?.as_ref()
    }

    /// Get a mutable reference to an item by id
    pub fn get_mut(&mut self, id: u32) -> Option<&mut T> {
        self.items.get_mut(id as usize)?.as_mut()
    }

    /// Whether `id` refers to a live item
    pub fn contains(&self, id: u32) -> bool {
        self.get(id).is_some()
    }

    /// Number of slots ever minted, live or free
    pub fn slot_count(&self) -> usize {
        self.items.len()
    }

    /// Number of live items
    pub fn live_count(&self) -> usize {
        self.items.len() - self.free_ids.len()
    }

    /// Number of recycled ids waiting for reuse
    pub fn free_count(&self) -> usize {
        self.free_ids.len()
    }

    /// Slot count once every trailing free slot has been dropped
    pub fn trimmed_slot_count(&self) -> usize {
        let mut len = self.items.len();
        for &id in self.free_ids.iter().rev() {
            if id as usize + 1 != len {
                break;
            }
            len -= 1;
        }
        len
    }

    /// Drop trailing free slots so the high-water mark only covers live tail items
    pub fn trim_trailing_free(&mut self) {
        while let Some(&last) = self.free_ids.last() {
            if last as usize + 1 != self.items.len() {
                break;
            }
            self.free_ids.pop_last();
            self.items.pop();
        }
    }

    /// Iterate live items in ascending id order
    pub fn iter(&self) -> impl Iterator<Item = (u32, &T)> {
        self.items
            .iter()
            .enumerate()
            .filter_map(|(id, item)| item.as_ref().map(|item| (id as u32, item)))
    }

    /// Iterate live items mutably in ascending id order
    pub fn iter_mut(&mut self) -> impl Iterator<Item = (u32, &mut T)> {
        self.items
            .iter_mut()
            .enumerate()
            .filter_map(|(id, item)| item.as_mut().map(|item| (id as u32, item)))
    }

    /// Recycled ids in ascending order
    pub fn free_ids(&self) -> impl Iterator<Item = u32> + '_ {
        self.free_ids.iter().copied()
    }
}

impl<T> Default for FreeList<T> {
    fn default() -> Self {
        Self::new()
    }
}
