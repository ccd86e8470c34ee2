//! Per-tree driver: grows one regression tree level by level.
//!
//! The driver owns the row-to-leaf map, the per-leaf statistics and the
//! per-sparse-column true-counts, all of which live for one tree. Each level
//! it materializes the parent prefix arrays, delegates split finding to
//! [`run_level`], then propagates statistics to the children, rewrites the
//! row-to-leaf map and rebuilds the sparse counts. After the last split level
//! it writes leaf weights and folds the tree's contribution into the margins.

use ndarray::ArrayViewMut1;
use rayon::prelude::*;

use super::gain::GainParams;
use super::level::{run_level, BestSplit};
use super::pipeline::{LevelCtx, PipelineSlot};
use super::sampling::ColumnSampler;
use super::stats::{LeafIndex, SplitStat};
use crate::config::TreeParams;
use crate::data::DataMatrix;
use crate::tree::{goes_left, heap_offset, RegTree};

/// Aggregate statistics of one leaf at the current level.
#[derive(Debug, Clone, Copy)]
pub struct NodeStat<S> {
    pub count: u64,
    pub sum: S,
}

/// Grows trees of a fixed depth over one dataset.
pub struct TreeDriver<'a, L, S: SplitStat> {
    data: &'a DataMatrix,
    depth: u32,
    eta: f32,
    gain: GainParams,
    sampler: ColumnSampler,
    row_to_leaf: Vec<L>,
    node_stats: Vec<NodeStat<S>>,
    best: Vec<BestSplit<S>>,
    parent_sum: Vec<S>,
    parent_count: Vec<u64>,
    sparse_stat: Vec<Vec<u64>>,
}

impl<'a, L: LeafIndex, S: SplitStat> TreeDriver<'a, L, S> {
    pub fn new(data: &'a DataMatrix, params: &TreeParams, seed: u64) -> Self {
        let take = params.level_sample_size(data.n_columns());
        Self {
            data,
            depth: params.depth,
            eta: params.eta,
            gain: GainParams::from_tree_params(params),
            sampler: ColumnSampler::new(data.n_columns(), take, seed),
            row_to_leaf: Vec::new(),
            node_stats: Vec::new(),
            best: Vec::new(),
            parent_sum: Vec::new(),
            parent_count: Vec::new(),
            sparse_stat: Vec::new(),
        }
    }

    /// Grow one tree against the given gradient slice and fold its leaf
    /// weights into the label's margins.
    pub fn grow(
        &mut self,
        slots: &mut [PipelineSlot<L, S>],
        grads: &[S::Input],
        tree_index: u64,
        mut margins: ArrayViewMut1<'_, f32>,
    ) -> RegTree {
        let n = self.data.n_rows();
        debug_assert_eq!(grads.len(), n);

        // Every row starts in leaf 0; the root statistic is reduced from
        // per-thread partial sums.
        self.row_to_leaf.clear();
        self.row_to_leaf.resize(n, L::default());
        let total = grads
            .par_iter()
            .map(|&g| S::from_input(g))
            .reduce(S::default, |a, b| a + b);
        self.node_stats.clear();
        self.node_stats.push(NodeStat {
            count: n as u64,
            sum: total,
        });

        // Root-level sparse counts are just the column lengths.
        self.sparse_stat.clear();
        for sid in 0..self.data.n_sparse() {
            let fid = (self.data.n_dense() + sid) as u32;
            self.sparse_stat
                .push(vec![self.data.sparse_column(fid).rows.len() as u64]);
        }

        let mut tree = RegTree::new(self.depth);

        for level in 0..self.depth - 1 {
            let n_leaves = 1usize << level;

            self.parent_sum.clear();
            self.parent_sum.push(S::default());
            self.parent_count.clear();
            self.parent_count.push(0);
            let mut sum_acc = S::default();
            let mut count_acc = 0u64;
            for stat in &self.node_stats {
                sum_acc = sum_acc + stat.sum;
                count_acc += stat.count;
                self.parent_sum.push(sum_acc);
                self.parent_count.push(count_acc);
            }

            let features = self.sampler.sample_level(tree_index, level);

            self.best.clear();
            self.best.resize(n_leaves, BestSplit::default());
            let ctx = LevelCtx {
                data: self.data,
                grads,
                row_to_leaf: &self.row_to_leaf,
                parent_sum: &self.parent_sum,
                parent_count: &self.parent_count,
                sparse_stat: &self.sparse_stat,
                level,
                gain: self.gain,
            };
            run_level(slots, &ctx, &features, &mut self.best);

            let offset = heap_offset(level);
            for (k, b) in self.best.iter().enumerate() {
                tree.set_split(offset + k, b.fid as u32, b.split_value, b.split_by_true);
            }

            // Left child takes the chosen side, right child the remainder.
            let mut next = Vec::with_capacity(n_leaves * 2);
            for (k, b) in self.best.iter().enumerate() {
                let parent = &self.node_stats[k];
                next.push(NodeStat {
                    count: b.count,
                    sum: b.sum,
                });
                next.push(NodeStat {
                    count: parent.count - b.count,
                    sum: parent.sum - b.sum,
                });
            }
            self.node_stats = next;

            let data = self.data;
            let best = &self.best;
            self.row_to_leaf
                .par_iter_mut()
                .enumerate()
                .for_each(|(row, leaf)| {
                    let k = leaf.to_usize();
                    let b = &best[k];
                    let left = goes_left(data, row, b.fid as u32, b.split_value, b.split_by_true);
                    *leaf = L::from_usize(2 * k + usize::from(!left));
                });

            if level + 1 < self.depth - 1 && self.data.n_sparse() > 0 {
                self.rebuild_sparse_stat(n_leaves * 2);
            }
        }

        let n_final = 1usize << (self.depth - 1);
        debug_assert_eq!(self.node_stats.len(), n_final);
        for (leaf, stat) in self.node_stats.iter().enumerate() {
            let weight = self.gain.leaf_weight(&stat.sum, stat.count) * self.eta;
            tree.set_leaf_weight(leaf, weight);
        }

        for (margin, leaf) in margins.iter_mut().zip(self.row_to_leaf.iter()) {
            *margin += tree.leaf_weight(leaf.to_usize());
        }

        tree
    }

    /// Recount true rows per (sparse column, leaf) with one scan over the
    /// rows: per-thread tables, merged at the end.
    fn rebuild_sparse_stat(&mut self, n_leaves: usize) {
        let n_dense = self.data.n_dense();
        let n_sparse = self.data.n_sparse();
        let data = self.data;
        let row_to_leaf = &self.row_to_leaf;

        let fresh = || vec![vec![0u64; n_leaves]; n_sparse];
        self.sparse_stat = (0..data.n_rows())
            .into_par_iter()
            .fold(fresh, |mut table, row| {
                let leaf = row_to_leaf[row].to_usize();
                for &fid in data.row_features(row) {
                    table[fid as usize - n_dense][leaf] += 1;
                }
                table
            })
            .reduce(fresh, |mut a, b| {
                for (col_a, col_b) in a.iter_mut().zip(b) {
                    for (cell_a, cell_b) in col_a.iter_mut().zip(col_b) {
                        *cell_a += cell_b;
                    }
                }
                a
            });
    }

    #[cfg(test)]
    fn leaf_stats(&self) -> &[NodeStat<S>] {
        &self.node_stats
    }

    #[cfg(test)]
    fn final_leaves(&self) -> &[L] {
        &self.row_to_leaf
    }
}

// =============================================================================
// Tests
// =============================================================================
