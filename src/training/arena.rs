//! Per-slot scratch storage for the sort and scan primitives.
//!
//! One arena per pipeline slot. Buffers grow to the largest size any pass has
//! requested and never shrink, so steady-state passes allocate nothing.

use super::stats::{LeafIndex, SplitStat};

/// Grow-only scratch buffers for one pipeline slot.
#[derive(Debug)]
pub struct ScratchArena<L, S> {
    sort_keys: Vec<L>,
    sort_vals: Vec<u32>,
    partials: Vec<S>,
}

impl<L: LeafIndex, S: SplitStat> ScratchArena<L, S> {
    pub fn new() -> Self {
        Self {
            sort_keys: Vec::new(),
            sort_vals: Vec::new(),
            partials: Vec::new(),
        }
    }

    /// Ping-pong buffers for the radix sort, at least `n` elements each.
    pub fn sort_buffers(&mut self, n: usize) -> (&mut [L], &mut [u32]) {
        if self.sort_keys.len() < n {
            self.sort_keys.resize(n, L::default());
        }
        if self.sort_vals.len() < n {
            self.sort_vals.resize(n, 0);
        }
        (&mut self.sort_keys[..n], &mut self.sort_vals[..n])
    }

    /// Per-chunk partial sums for the prefix scan, at least `n` elements.
    pub fn partials(&mut self, n: usize) -> &mut [S] {
        if self.partials.len() < n {
            self.partials.resize(n, S::default());
        }
        &mut self.partials[..n]
    }

    /// Current footprint in bytes.
    pub fn capacity_bytes(&self) -> usize {
        self.sort_keys.capacity() * std::mem::size_of::<L>()
            + self.sort_vals.capacity() * std::mem::size_of::<u32>()
            + self.partials.capacity() * std::mem::size_of::<S>()
    }
}

impl<L: LeafIndex, S: SplitStat> Default for ScratchArena<L, S> {
    fn default() -> Self {
        Self::new()
    }
}
