//! Fixed-Capacity Slab Pool
//!
//! ## Overview
//!
//! A slab hands out slots from a statically sized array. Both engines use it
//! for anything whose count must stay bounded: client requests, internal
//! events and outgoing sample batches.
//!
//! ```text
//! SlabPool<T, 6>
//! ┌──────┬──────┬──────┬──────┬──────┬──────┐
//! │ Some │ None │ Some │ Some │ None │ None │
//! └──────┴──────┴──────┴──────┴──────┴──────┘
//!    0      1      2      3      4      5
//!           ↑
//!        next alloc takes the lowest free slot
//! ```
//!
//! ## Ownership
//!
//! Items go in by value and come back out by value from [`SlabPool::free`],
//! so a consumer that takes an item has necessarily released its slot. There
//! is no separate free callback to forget.
//!
//! ## Failure
//!
//! A full slab returns the rejected item to the caller, like
//! `heapless::Vec::push`. Allocation failure is an expected outcome, not a
//! panic.

/// Index of an occupied slot
pub type SlotIndex = usize;

/// Fixed-capacity pool of `N` slots
pub struct SlabPool<T, const N: usize> {
    slots: [Option<T>; N],
    used: usize,
}

impl<T, const N: usize> SlabPool<T, N> {
    /// Create an empty pool
    pub fn new() -> Self {
        Self {
            slots: core::array::from_fn(|_| None),
            used: 0,
        }
    }

    /// Store `item` in the lowest free slot
    ///
    /// Returns the item back if every slot is occupied.
    pub fn alloc(&mut self, item: T) -> Result<SlotIndex, T> {
        match self.slots.iter().position(Option::is_none) {
            Some(idx) => {
                self.slots[idx] = Some(item);
                self.used += 1;
                Ok(idx)
            }
            None => Err(item),
        }
    }

    /// Release a slot, handing its item back
    pub fn free(&mut self, idx: SlotIndex) -> Option<T> {
        let item = self.slots.get_mut(idx)?.take()?;
        self.used -= 1;
        Some(item)
    }

    /// Borrow the item in a slot
    pub fn get(&self, idx: SlotIndex) -> Option<&T> {
        self.slots.get(idx)?.as_ref()
    }

    /// Mutably borrow the item in a slot
    pub fn get_mut(&mut self, idx: SlotIndex) -> Option<&mut T> {
        self.slots.get_mut(idx)?.as_mut()
    }

    /// Iterate occupied slots in index order
    pub fn iter(&self) -> impl Iterator<Item = (SlotIndex, &T)> {
        self.slots
            .iter()
            .enumerate()
            .filter_map(|(idx, slot)| slot.as_ref().map(|item| (idx, item)))
    }

    /// Iterate occupied slots mutably in index order
    pub fn iter_mut(&mut self) -> impl Iterator<Item = (SlotIndex, &mut T)> {
        self.slots
            .iter_mut()
            .enumerate()
            .filter_map(|(idx, slot)| slot.as_mut().map(|item| (idx, item)))
    }

    /// First occupied slot whose item matches
    pub fn position<F: FnMut(&T) -> bool>(&self, mut pred: F) -> Option<SlotIndex> {
        self.iter().find(|(_, item)| pred(item)).map(|(idx, _)| idx)
    }

    /// Free every slot whose item fails `keep`, returning how many were freed
    pub fn retain<F: FnMut(&T) -> bool>(&mut self, mut keep: F) -> usize {
        let mut freed = 0;
        for slot in self.slots.iter_mut() {
            if slot.as_ref().is_some_and(|item| !keep(item)) {
                *slot = None;
                freed += 1;
            }
        }
        self.used -= freed;
        freed
    }

    /// Number of occupied slots
    pub fn len(&self) -> usize {
        self.used
    }

    /// True when no slot is occupied
    pub fn is_empty(&self) -> bool {
        self.used == 0
    }

    /// True when every slot is occupied
    pub fn is_full(&self) -> bool {
        self.used == N
    }

    /// Total number of slots
    pub const fn capacity(&self) -> usize {
        N
    }
}

impl<T, const N: usize> Default for SlabPool<T, N> {
    fn default() -> Self {
        Self::new()
    }
}
