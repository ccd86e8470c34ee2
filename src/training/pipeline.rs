//! Per-feature split-finding pipeline.
//!
//! One [`PipelineSlot`] holds every buffer a feature pass needs; the level
//! driver keeps `overlap` slots in a ring, each served by its own worker
//! thread, so several features are in flight at once. A pass over a dense
//! feature runs, strictly in order:
//!
//! 1. reset the per-leaf result cells;
//! 2. borrow the column (or copy a non-resident column into staging);
//! 3. permute the row-to-leaf map into feature-value order;
//! 4. stable radix sort of `(leaf, row)` on the low `level + 1` leaf bits —
//!    rows are now grouped by leaf, value-ordered inside each leaf;
//! 5. permute gradients into sorted order;
//! 6. permute feature values into sorted order behind a `-inf` sentinel;
//! 7. one global exclusive prefix scan of the gradients;
//! 8. the gain kernel: every sort position proposes its candidate split to
//!    its leaf's [`GainCell`];
//! 9. collect the per-leaf winners into the result sent back to the driver.
//!
//! Sparse features reduce to a per-leaf gradient total over the rows where
//! the feature is true; gain evaluation for those happens driver-side.

use rayon::prelude::*;

use super::arena::ScratchArena;
use super::argmax::GainCell;
use super::gain::GainParams;
use super::scan::{exclusive_scan_into, scan_partials_len};
use super::sort::radix_sort_pairs;
use super::stats::{LeafIndex, SplitStat};
use crate::data::DataMatrix;

// =============================================================================
// Level context
// =============================================================================

/// Everything a feature pass reads, fixed for the duration of one level.
pub struct LevelCtx<'a, L, S: SplitStat> {
    pub data: &'a DataMatrix,
    /// Gradient elements for the tree being grown, one per row.
    pub grads: &'a [S::Input],
    /// Current leaf of every row.
    pub row_to_leaf: &'a [L],
    /// Prefix sums of per-leaf gradient totals; length `n_leaves + 1`.
    pub parent_sum: &'a [S],
    /// Prefix sums of per-leaf row counts; length `n_leaves + 1`.
    pub parent_count: &'a [u64],
    /// Per sparse column (local id), per leaf: number of true rows.
    pub sparse_stat: &'a [Vec<u64>],
    /// Current tree level; leaves are `[0, 2^level)`.
    pub level: u32,
    pub gain: GainParams,
}

impl<L, S: SplitStat> LevelCtx<'_, L, S> {
    #[inline]
    pub fn n_leaves(&self) -> usize {
        1usize << self.level
    }
}

// =============================================================================
// Results
// =============================================================================

/// Per-leaf winner of a dense feature pass, as read from the result cells.
#[derive(Debug, Clone, Copy)]
pub struct DenseCandidate<S> {
    /// Best gain; 0 means no positive-gain candidate proposed.
    pub gain: f32,
    /// Sort position of the winning candidate.
    pub index: u32,
    /// Scanned gradient prefix at that position.
    pub prefix: S,
    /// Feature values straddling the split point.
    pub value_lo: f32,
    pub value_hi: f32,
}

/// What a slot sends back to the driver for one feature.
#[derive(Debug)]
pub enum SlotResult<S> {
    Dense {
        fid: u32,
        candidates: Vec<DenseCandidate<S>>,
    },
    Sparse {
        fid: u32,
        /// Per leaf: gradient total over rows where the feature is true.
        true_sums: Vec<S>,
    },
}

// =============================================================================
// PipelineSlot
// =============================================================================

/// Buffers for one in-flight feature pass. All row-sized buffers are reused
/// across features, levels and trees.
pub struct PipelineSlot<L, S: SplitStat> {
    segments: Vec<L>,
    positions: Vec<u32>,
    fvalue: Vec<f32>,
    grad_sorted: Vec<S::Input>,
    prefix: Vec<S>,
    cells: Vec<GainCell>,
    staged_values: Vec<f32>,
    staged_rows: Vec<u32>,
    scratch: ScratchArena<L, S>,
}

impl<L: LeafIndex, S: SplitStat> PipelineSlot<L, S> {
    pub fn new(n_rows: usize) -> Self {
        Self {
            segments: Vec::with_capacity(n_rows),
            positions: Vec::with_capacity(n_rows),
            fvalue: Vec::with_capacity(n_rows + 1),
            grad_sorted: Vec::with_capacity(n_rows),
            prefix: Vec::with_capacity(n_rows),
            cells: Vec::new(),
            staged_values: Vec::new(),
            staged_rows: Vec::new(),
            scratch: ScratchArena::new(),
        }
    }

    /// Run one feature pass.
    pub fn run(&mut self, fid: u32, ctx: &LevelCtx<'_, L, S>) -> SlotResult<S> {
        if ctx.data.is_dense(fid) {
            self.run_dense(fid, ctx)
        } else {
            self.run_sparse(fid, ctx)
        }
    }

    fn run_dense(&mut self, fid: u32, ctx: &LevelCtx<'_, L, S>) -> SlotResult<S> {
        let n = ctx.data.n_rows();
        let n_leaves = ctx.n_leaves();
        let Self {
            segments,
            positions,
            fvalue,
            grad_sorted,
            prefix,
            cells,
            staged_values,
            staged_rows,
            scratch,
        } = self;

        if cells.len() < n_leaves {
            cells.resize_with(n_leaves, GainCell::new);
        }
        for cell in &cells[..n_leaves] {
            cell.reset();
        }

        let column = ctx.data.dense_column(fid);
        let (values, index): (&[f32], &[u32]) = if column.resident {
            (&column.values, &column.sorted_index)
        } else {
            staged_values.clear();
            staged_values.extend_from_slice(&column.values);
            staged_rows.clear();
            staged_rows.extend_from_slice(&column.sorted_index);
            (staged_values.as_slice(), staged_rows.as_slice())
        };

        // Leaf of each row, in ascending-feature-value order.
        segments.clear();
        segments.resize(n, L::default());
        positions.clear();
        positions.extend_from_slice(index);
        segments
            .par_iter_mut()
            .zip(index.par_iter())
            .for_each(|(seg, &row)| *seg = ctx.row_to_leaf[row as usize]);

        // Group by leaf; stability preserves value order inside each leaf.
        let (scratch_keys, scratch_vals) = scratch.sort_buffers(n);
        radix_sort_pairs(segments, positions, ctx.level + 1, scratch_keys, scratch_vals);

        grad_sorted.clear();
        grad_sorted.resize(n, S::Input::default());
        grad_sorted
            .par_iter_mut()
            .zip(positions.par_iter())
            .for_each(|(g, &row)| *g = ctx.grads[row as usize]);

        // Sorted values behind a sentinel: position 0 means "split before the
        // first row", which no equal-value test can select as a real split.
        fvalue.clear();
        fvalue.resize(n + 1, 0.0);
        fvalue[0] = f32::NEG_INFINITY;
        fvalue[1..]
            .par_iter_mut()
            .zip(positions.par_iter())
            .for_each(|(v, &row)| *v = values[row as usize]);

        // Global scan; per-leaf prefixes are recovered by subtracting the
        // parent prefix, which is valid only because of the grouping above.
        prefix.clear();
        prefix.resize(n, S::default());
        let partials = scratch.partials(scan_partials_len(n));
        exclusive_scan_into::<S>(grad_sorted, prefix, partials);

        let segments = &segments[..n];
        let prefix_ro = &prefix[..n];
        let fvalue_ro = &fvalue[..];
        let cells_ro = &cells[..n_leaves];
        let gain = ctx.gain;

        (0..n).into_par_iter().for_each(|i| {
            if fvalue_ro[i + 1] == fvalue_ro[i] {
                // No split inside a run of equal values.
                return;
            }
            let seg = segments[i].to_usize();
            let left = prefix_ro[i] - ctx.parent_sum[seg];
            let left_count = i as u64 - ctx.parent_count[seg];
            let total = ctx.parent_sum[seg + 1] - ctx.parent_sum[seg];
            let total_count = ctx.parent_count[seg + 1] - ctx.parent_count[seg];

            let g = gain.split_gain(left, left_count, total, total_count) as f32;
            if g > 0.0 {
                cells_ro[seg].propose(g, i as u32);
            }
        });

        let candidates = cells_ro
            .iter()
            .map(|cell| {
                let (gain, index) = cell.load();
                let i = index as usize;
                DenseCandidate {
                    gain,
                    index,
                    prefix: prefix_ro[i],
                    value_lo: fvalue_ro[i],
                    value_hi: fvalue_ro[i + 1],
                }
            })
            .collect();

        SlotResult::Dense { fid, candidates }
    }

    fn run_sparse(&mut self, fid: u32, ctx: &LevelCtx<'_, L, S>) -> SlotResult<S> {
        let n_leaves = ctx.n_leaves();
        let local = fid as usize - ctx.data.n_dense();
        let counts = &ctx.sparse_stat[local];
        let Self {
            segments,
            positions,
            grad_sorted,
            staged_rows,
            scratch,
            ..
        } = self;

        let column = ctx.data.sparse_column(fid);
        let rows: &[u32] = if column.resident {
            &column.rows
        } else {
            staged_rows.clear();
            staged_rows.extend_from_slice(&column.rows);
            staged_rows.as_slice()
        };
        let m = rows.len();

        // Same sort-and-group dance as the dense path, over the true rows only.
        segments.clear();
        segments.resize(m, L::default());
        positions.clear();
        positions.extend_from_slice(rows);
        segments
            .par_iter_mut()
            .zip(rows.par_iter())
            .for_each(|(seg, &row)| *seg = ctx.row_to_leaf[row as usize]);

        let (scratch_keys, scratch_vals) = scratch.sort_buffers(m);
        radix_sort_pairs(segments, positions, ctx.level + 1, scratch_keys, scratch_vals);

        grad_sorted.clear();
        grad_sorted.resize(m, S::Input::default());
        grad_sorted
            .par_iter_mut()
            .zip(positions.par_iter())
            .for_each(|(g, &row)| *g = ctx.grads[row as usize]);

        // Each leaf owns a contiguous slice whose length is its true-count.
        let mut offsets = Vec::with_capacity(n_leaves + 1);
        let mut running = 0usize;
        offsets.push(0);
        for &c in counts.iter() {
            running += c as usize;
            offsets.push(running);
        }
        debug_assert_eq!(running, m);

        let grad_sorted = &grad_sorted[..m];
        let true_sums: Vec<S> = (0..n_leaves)
            .into_par_iter()
            .map(|leaf| {
                grad_sorted[offsets[leaf]..offsets[leaf + 1]]
                    .iter()
                    .fold(S::default(), |acc, &x| acc + S::from_input(x))
            })
            .collect();

        SlotResult::Sparse { fid, true_sums }
    }
}

// =============================================================================
// Tests
// =============================================================================
