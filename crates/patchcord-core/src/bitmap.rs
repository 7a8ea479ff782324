//! Growable slot bitmaps.
//!
//! [`SlotBitmap`] is the value type used for both halves of attribute
//! dispatch: the set of slots a listener is interested in, and the set of
//! slots that changed since the listener's last flush.
//!
//! Storage is a vector of 32-bit blocks that starts at one block and doubles
//! on demand, but never past the bitmap's *ceiling*. Setting a bit at or past
//! the ceiling is an error rather than a silent reallocation, so code that
//! pre-sizes bitmaps off the audio thread keeps a hard bound on memory.
//!
//! ```rust
//! use patchcord_core::SlotBitmap;
//!
//! let mut changed = SlotBitmap::new();
//! changed.set_bit(12, true).unwrap();
//! changed.set_bit(19, true).unwrap();
//! assert_eq!(changed.highest_set_bit(), 19);
//! assert!(changed.set_bit(45, true).is_err());
//! ```

use core::fmt;
use core::ops::Index;
use std::sync::atomic::{AtomicU32, Ordering};

use crate::error::DispatchError;

/// Bits per storage block.
pub const BLOCK_BITS: usize = 32;

/// Ceiling used by [`SlotBitmap::new`].
pub const DEFAULT_CEILING: usize = BLOCK_BITS;

/// Largest ceiling a bitmap accepts; bigger requests are clamped to it.
pub const MAX_CEILING: usize = usize::MAX / BLOCK_BITS * BLOCK_BITS;

/// Round a bit count up to whole blocks (at least one).
#[inline]
const fn blocks_for(bits: usize) -> usize {
    if bits == 0 { 1 } else { bits.div_ceil(BLOCK_BITS) }
}

/// A bit set keyed by slot index with bounded geometric growth.
///
/// Equality compares the set bits only: two bitmaps with the same bits but
/// different backing sizes or ceilings are equal.
#[derive(Clone)]
pub struct SlotBitmap {
    blocks: Vec<u32>,
    /// Addressable bits, always a whole number of blocks.
    ceiling: usize,
}

impl SlotBitmap {
    /// Create an empty bitmap with the default ceiling of 32 bits.
    pub fn new() -> Self {
        Self::with_ceiling(DEFAULT_CEILING)
    }

    /// Create an empty bitmap that can address `ceiling` bits.
    ///
    /// The ceiling is rounded up to a whole number of blocks; a ceiling of
    /// zero is treated as one block and one past [`MAX_CEILING`] is clamped.
    /// Only one block is allocated up front.
    pub fn with_ceiling(ceiling: usize) -> Self {
        Self {
            blocks: vec![0; 1],
            ceiling: blocks_for(ceiling.min(MAX_CEILING)) * BLOCK_BITS,
        }
    }

    /// Build a bitmap from a list of slots.
    pub fn from_slots(slots: &[usize], ceiling: usize) -> Result<Self, DispatchError> {
        let mut bitmap = Self::with_ceiling(ceiling);
        for &slot in slots {
            bitmap.set_bit(slot, true)?;
        }
        Ok(bitmap)
    }

    /// Number of addressable bits.
    #[inline]
    pub fn ceiling(&self) -> usize {
        self.ceiling
    }

    /// Set or clear a bit.
    ///
    /// Grows the backing storage (doubling, capped at the ceiling) when a set
    /// bit lands past the allocated range. Clearing a bit that was never
    /// allocated is a no-op.
    pub fn set_bit(&mut self, index: usize, value: bool) -> Result<(), DispatchError> {
        if index >= self.ceiling {
            return Err(DispatchError::OutOfRange {
                index,
                ceiling: self.ceiling,
            });
        }

        let block = index / BLOCK_BITS;
        let mask = 1u32 << (index % BLOCK_BITS);

        if block >= self.blocks.len() {
            if !value {
                return Ok(());
            }
            self.grow_to(block + 1);
        }

        if value {
            self.blocks[block] |= mask;
        } else {
            self.blocks[block] &= !mask;
        }
        Ok(())
    }

    /// Read a bit without growing. Bits past the allocated range read `false`.
    #[inline]
    pub fn get(&self, index: usize) -> bool {
        self.blocks
            .get(index / BLOCK_BITS)
            .is_some_and(|b| b & (1 << (index % BLOCK_BITS)) != 0)
    }

    /// Whether no bit is set.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.blocks.iter().all(|&b| b == 0)
    }

    /// Clear every bit. The allocation is kept for reuse.
    pub fn clear(&mut self) {
        self.blocks.fill(0);
    }

    /// Index of the highest set bit, or 0 when empty.
    pub fn highest_set_bit(&self) -> usize {
        self.blocks
            .iter()
            .enumerate()
            .rev()
            .find(|(_, b)| **b != 0)
            .map_or(0, |(i, b)| i * BLOCK_BITS + (BLOCK_BITS - 1 - b.leading_zeros() as usize))
    }

    /// Bytes of backing storage currently allocated.
    #[inline]
    pub fn num_bytes(&self) -> usize {
        self.blocks.len() * core::mem::size_of::<u32>()
    }

    /// Number of set bits.
    pub fn count_ones(&self) -> usize {
        self.blocks.iter().map(|b| b.count_ones() as usize).sum()
    }

    /// Whether any bit is set in both bitmaps.
    pub fn intersects(&self, other: &SlotBitmap) -> bool {
        self.blocks
            .iter()
            .zip(other.blocks.iter())
            .any(|(a, b)| a & b != 0)
    }

    /// OR another bitmap into this one.
    ///
    /// Fails without modifying `self` if `other` has a bit past this
    /// bitmap's ceiling.
    pub fn merge(&mut self, other: &SlotBitmap) -> Result<(), DispatchError> {
        if other.is_empty() {
            return Ok(());
        }
        let highest = other.highest_set_bit();
        if highest >= self.ceiling {
            return Err(DispatchError::OutOfRange {
                index: highest,
                ceiling: self.ceiling,
            });
        }
        for (i, &b) in other.blocks.iter().enumerate().filter(|(_, b)| **b != 0) {
            self.merge_block(i, b);
        }
        Ok(())
    }

    /// Iterate over set bits in ascending order.
    pub fn iter(&self) -> SetBits<'_> {
        SetBits {
            blocks: &self.blocks,
            block: 0,
            current: self.blocks.first().copied().unwrap_or(0),
        }
    }

    /// OR a raw block in. The caller guarantees `block` is under the ceiling.
    pub(crate) fn merge_block(&mut self, block: usize, bits: u32) {
        if block >= self.blocks.len() {
            self.grow_to(block + 1);
        }
        self.blocks[block] |= bits;
    }

    fn grow_to(&mut self, min_blocks: usize) {
        let max_blocks = self.ceiling / BLOCK_BITS;
        let new_len = (self.blocks.len() * 2).max(min_blocks).min(max_blocks);
        self.blocks.resize(new_len, 0);
    }
}

impl Default for SlotBitmap {
    fn default() -> Self {
        Self::new()
    }
}

impl PartialEq for SlotBitmap {
    fn eq(&self, other: &Self) -> bool {
        let len = self.blocks.len().max(other.blocks.len());
        (0..len).all(|i| {
            self.blocks.get(i).copied().unwrap_or(0) == other.blocks.get(i).copied().unwrap_or(0)
        })
    }
}

impl Eq for SlotBitmap {}

impl Index<usize> for SlotBitmap {
    type Output = bool;

    fn index(&self, index: usize) -> &bool {
        if self.get(index) { &true } else { &false }
    }
}

impl fmt::Debug for SlotBitmap {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SlotBitmap")
            .field("ceiling", &self.ceiling)
            .field("set", &self.iter().collect::<Vec<_>>())
            .finish()
    }
}

impl<'a> IntoIterator for &'a SlotBitmap {
    type Item = usize;
    type IntoIter = SetBits<'a>;

    fn into_iter(self) -> SetBits<'a> {
        self.iter()
    }
}

/// Iterator over the set bits of a [`SlotBitmap`].
#[derive(Debug, Clone)]
pub struct SetBits<'a> {
    blocks: &'a [u32],
    block: usize,
    current: u32,
}

impl Iterator for SetBits<'_> {
    type Item = usize;

    fn next(&mut self) -> Option<usize> {
        while self.current == 0 {
            self.block += 1;
            self.current = *self.blocks.get(self.block)?;
        }
        let bit = self.current.trailing_zeros() as usize;
        // Clear lowest set bit
        self.current &= self.current - 1;
        Some(self.block * BLOCK_BITS + bit)
    }
}

/// Fixed-size bitmap written from any thread without locking.
///
/// Sized once when a listener registers; producers `fetch_or` bits in,
/// the flushing thread swaps whole blocks out.
pub(crate) struct AtomicSlotBitmap {
    blocks: Box<[AtomicU32]>,
}

impl AtomicSlotBitmap {
    pub(crate) fn with_bits(bits: usize) -> Self {
        Self {
            blocks: (0..blocks_for(bits)).map(|_| AtomicU32::new(0)).collect(),
        }
    }

    /// Addressable bits.
    pub(crate) fn bits(&self) -> usize {
        self.blocks.len() * BLOCK_BITS
    }

    /// Set a bit. Returns `false` (and does nothing) when out of range.
    #[inline]
    pub(crate) fn set(&self, index: usize) -> bool {
        match self.blocks.get(index / BLOCK_BITS) {
            Some(block) => {
                block.fetch_or(1 << (index % BLOCK_BITS), Ordering::AcqRel);
                true
            }
            None => false,
        }
    }

    /// Move every set bit into `out`, leaving this bitmap empty.
    pub(crate) fn take_into(&self, out: &mut SlotBitmap) {
        for (i, block) in self.blocks.iter().enumerate() {
            let bits = block.swap(0, Ordering::AcqRel);
            if bits != 0 {
                out.merge_block(i, bits);
            }
        }
    }

    pub(crate) fn clear(&self) {
        for block in self.blocks.iter() {
            block.store(0, Ordering::Release);
        }
    }

    #[cfg(test)]
    fn is_empty(&self) -> bool {
        self.blocks.iter().all(|b| b.load(Ordering::Acquire) == 0)
    }
}

impl fmt::Debug for AtomicSlotBitmap {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AtomicSlotBitmap")
            .field("bits", &self.bits())
            .finish_non_exhaustive()
    }
}
