//! Free-slot bitset for the sensor descriptor table

/// One bit per descriptor slot, set while the slot is in use
#[derive(Debug, Clone, Copy, Default)]
pub struct SlotBitset {
    bits: u64,
    len: u32,
}

impl SlotBitset {
    /// Bitset tracking `len` slots (at most 64)
    pub const fn new(len: usize) -> Self {
        debug_assert!(len <= 64);
        Self { bits: 0, len: len as u32 }
    }

    /// Claim the lowest clear bit
    pub fn find_clear_and_set(&mut self) -> Option<usize> {
        let idx = self.bits.trailing_ones();
        if idx >= self.len {
            return None;
        }
        self.bits |= 1 << idx;
        Some(idx as usize)
    }

    /// Release a slot
    pub fn clear(&mut self, idx: usize) {
        if idx < self.len as usize {
            self.bits &= !(1 << idx);
        }
    }

    /// Whether a slot is claimed
    pub fn is_set(&self, idx: usize) -> bool {
        idx < self.len as usize && self.bits & (1 << idx) != 0
    }

    /// Number of claimed slots
    pub fn count(&self) -> usize {
        self.bits.count_ones() as usize
    }
}
