//! Lock-free max-with-index reduction cell.
//!
//! A single `AtomicU64` packs a candidate's f32 gain in the low word and its
//! u32 index in the high word. Writers race through a compare-and-swap loop;
//! the cell always holds the largest gain seen together with the index that
//! carried it. Equal gains resolve to the smaller index, so the reduction is
//! deterministic regardless of writer interleaving.

use std::sync::atomic::{AtomicU64, Ordering};

#[inline]
fn pack(gain: f32, index: u32) -> u64 {
    ((index as u64) << 32) | gain.to_bits() as u64
}

#[inline]
fn unpack(bits: u64) -> (f32, u32) {
    (f32::from_bits(bits as u32), (bits >> 32) as u32)
}

/// A per-leaf `(best gain, best index)` reduction cell.
#[derive(Debug)]
pub struct GainCell {
    bits: AtomicU64,
}

impl Default for GainCell {
    fn default() -> Self {
        Self::new()
    }
}

impl GainCell {
    /// A zeroed cell: gain 0.0, index 0.
    pub fn new() -> Self {
        Self {
            bits: AtomicU64::new(0),
        }
    }

    /// Reset to the zeroed state. Done once per feature pass.
    #[inline]
    pub fn reset(&self) {
        self.bits.store(0, Ordering::Relaxed);
    }

    /// Install `(gain, index)` if `gain` exceeds the stored gain, or matches
    /// it with a smaller index.
    ///
    /// Loops until the swap succeeds or the observed value already beats the
    /// candidate. NaN candidates never replace anything.
    #[inline]
    pub fn propose(&self, gain: f32, index: u32) {
        let mut current = self.bits.load(Ordering::Relaxed);
        loop {
            let (current_gain, current_index) = unpack(current);
            let wins = gain > current_gain || (gain == current_gain && index < current_index);
            if !wins {
                return;
            }
            match self.bits.compare_exchange_weak(
                current,
                pack(gain, index),
                Ordering::Relaxed,
                Ordering::Relaxed,
            ) {
                Ok(_) => return,
                Err(observed) => current = observed,
            }
        }
    }

    /// Read the current `(gain, index)`.
    #[inline]
    pub fn load(&self) -> (f32, u32) {
        unpack(self.bits.load(Ordering::Relaxed))
    }
}

// =============================================================================
// Tests
// =============================================================================
