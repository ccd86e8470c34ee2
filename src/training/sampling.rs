//! Per-level column sampling.
//!
//! Each level considers a random permutation prefix of the column ids, sized
//! by `colsample_bytree * colsample_bylevel * columns`. Sampling is seeded
//! from `(seed, tree, level)` so a fixed seed reproduces the same trees.

use rand::prelude::*;
use rand_xoshiro::Xoshiro256PlusPlus;

/// Samples the column subset evaluated at one tree level.
#[derive(Debug, Clone)]
pub struct ColumnSampler {
    n_columns: usize,
    take: usize,
    seed: u64,
}

impl ColumnSampler {
    /// `take` must already be validated to be at least 1.
    pub fn new(n_columns: usize, take: usize, seed: u64) -> Self {
        debug_assert!(take >= 1 && take <= n_columns);
        Self {
            n_columns,
            take,
            seed,
        }
    }

    /// Number of columns evaluated per level.
    #[inline]
    pub fn take(&self) -> usize {
        self.take
    }

    /// Sample the column ids for one level of one tree.
    ///
    /// Returns sorted ids for cache-friendly access; consumers rely on the
    /// order being deterministic, not on what it is.
    pub fn sample_level(&self, tree: u64, level: u32) -> Vec<u32> {
        if self.take == self.n_columns {
            return (0..self.n_columns as u32).collect();
        }

        let seed = self
            .seed
            .wrapping_add(tree.wrapping_mul(0x9E3779B97F4A7C15))
            .wrapping_add((level as u64).wrapping_mul(0x517CC1B727220A95));
        let mut rng = Xoshiro256PlusPlus::seed_from_u64(seed);

        // Partial Fisher-Yates: only the prefix is needed.
        let mut ids: Vec<u32> = (0..self.n_columns as u32).collect();
        for i in 0..self.take {
            let j = rng.gen_range(i..self.n_columns);
            ids.swap(i, j);
        }
        ids.truncate(self.take);
        ids.sort_unstable();
        ids
    }
}

// =============================================================================
// Tests
// =============================================================================
