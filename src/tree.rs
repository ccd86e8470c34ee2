//! Regression tree and ensemble representation.
//!
//! Trees are perfect binary heaps of fixed depth. Internal nodes store
//! `(feature, threshold, split_by_true)`; leaves at the last level store a
//! weight. Degenerate nodes (no useful split was found during training) carry
//! a `+inf` threshold, which routes every row left without consulting the
//! feature column.

use ndarray::Array2;
use serde::{Deserialize, Serialize};

use crate::data::DataMatrix;
use crate::objective::Objective;

/// First node index of a heap level.
#[inline]
pub fn heap_offset(level: u32) -> usize {
    (1usize << level) - 1
}

/// Child node index in the heap.
#[inline]
pub fn child_node(node: usize, is_left: bool) -> usize {
    2 * node + if is_left { 1 } else { 2 }
}

/// Routing decision for one row at one split.
#[inline]
pub(crate) fn goes_left(
    data: &DataMatrix,
    row: usize,
    fid: u32,
    threshold: f32,
    split_by_true: bool,
) -> bool {
    if split_by_true {
        data.row_has_feature(row, fid)
    } else if threshold == f32::INFINITY {
        // Degenerate split: everything flows left, including datasets where
        // the stored feature id has no dense column to look at.
        true
    } else {
        data.dense_value(fid, row) <= threshold
    }
}

// =============================================================================
// RegTree
// =============================================================================

/// A trained regression tree of fixed depth.
///
/// Structure-of-arrays storage over the full heap; split fields are unused at
/// leaf positions and weights are unused at internal positions.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegTree {
    depth: u32,
    split_fids: Vec<u32>,
    split_thresholds: Vec<f32>,
    split_by_true: Vec<bool>,
    weights: Vec<f32>,
}

impl RegTree {
    /// Create an empty tree; splits and weights are filled in during growth.
    pub fn new(depth: u32) -> Self {
        let n_nodes = (1usize << depth) - 1;
        Self {
            depth,
            split_fids: vec![0; n_nodes],
            split_thresholds: vec![f32::INFINITY; n_nodes],
            split_by_true: vec![false; n_nodes],
            weights: vec![0.0; n_nodes],
        }
    }

    /// Tree depth; leaves live at level `depth - 1`.
    #[inline]
    pub fn depth(&self) -> u32 {
        self.depth
    }

    /// Number of heap nodes.
    #[inline]
    pub fn n_nodes(&self) -> usize {
        self.split_fids.len()
    }

    /// Number of leaves.
    #[inline]
    pub fn n_leaves(&self) -> usize {
        1usize << (self.depth - 1)
    }

    /// Record a split at an internal node.
    pub(crate) fn set_split(&mut self, node: usize, fid: u32, threshold: f32, by_true: bool) {
        self.split_fids[node] = fid;
        self.split_thresholds[node] = threshold;
        self.split_by_true[node] = by_true;
    }

    /// Record a leaf weight by leaf index within the last level.
    pub(crate) fn set_leaf_weight(&mut self, leaf: usize, weight: f32) {
        let node = heap_offset(self.depth - 1) + leaf;
        self.weights[node] = weight;
    }

    /// Leaf weight by leaf index within the last level.
    #[inline]
    pub fn leaf_weight(&self, leaf: usize) -> f32 {
        self.weights[heap_offset(self.depth - 1) + leaf]
    }

    /// Split feature id at a node.
    #[inline]
    pub fn split_fid(&self, node: usize) -> u32 {
        self.split_fids[node]
    }

    /// Split threshold at a node.
    #[inline]
    pub fn split_threshold(&self, node: usize) -> f32 {
        self.split_thresholds[node]
    }

    /// Whether the node splits on sparse-feature membership.
    #[inline]
    pub fn is_split_by_true(&self, node: usize) -> bool {
        self.split_by_true[node]
    }

    /// Predict the raw (margin-space) score for one row.
    pub fn predict_row(&self, data: &DataMatrix, row: usize) -> f32 {
        let mut node = 0usize;
        for _ in 0..self.depth - 1 {
            let left = goes_left(
                data,
                row,
                self.split_fids[node],
                self.split_thresholds[node],
                self.split_by_true[node],
            );
            node = child_node(node, left);
        }
        self.weights[node]
    }

    /// Add this tree's raw scores to a margin slice, one element per row.
    pub fn predict_into(&self, data: &DataMatrix, out: &mut [f32]) {
        debug_assert_eq!(out.len(), data.n_rows());
        for (row, margin) in out.iter_mut().enumerate() {
            *margin += self.predict_row(data, row);
        }
    }
}

// =============================================================================
// Ensemble
// =============================================================================

/// A trained boosted ensemble: trees with label assignments and the internal
/// base score they were grown against.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Ensemble {
    trees: Vec<RegTree>,
    tree_labels: Vec<u32>,
    labels_count: u32,
    /// Base margin per label (already in internal space).
    base_margin: Vec<f32>,
    objective: Objective,
}

impl Ensemble {
    pub(crate) fn new(labels_count: u32, base_margin: Vec<f32>, objective: Objective) -> Self {
        debug_assert_eq!(base_margin.len(), labels_count as usize);
        Self {
            trees: Vec::new(),
            tree_labels: Vec::new(),
            labels_count,
            base_margin,
            objective,
        }
    }

    pub(crate) fn push_tree(&mut self, tree: RegTree, label: u32) {
        debug_assert!(label < self.labels_count);
        self.trees.push(tree);
        self.tree_labels.push(label);
    }

    /// Number of trees.
    #[inline]
    pub fn n_trees(&self) -> usize {
        self.trees.len()
    }

    /// Number of output labels.
    #[inline]
    pub fn labels_count(&self) -> u32 {
        self.labels_count
    }

    /// The objective this ensemble was trained with.
    #[inline]
    pub fn objective(&self) -> Objective {
        self.objective
    }

    /// Get a tree by index.
    #[inline]
    pub fn tree(&self, idx: usize) -> &RegTree {
        &self.trees[idx]
    }

    /// Iterate over trees with their label assignments.
    pub fn trees_with_labels(&self) -> impl Iterator<Item = (&RegTree, u32)> {
        self.trees
            .iter()
            .zip(self.tree_labels.iter())
            .map(|(t, &l)| (t, l))
    }

    /// Predict output-space scores for every row.
    ///
    /// Returns shape `[labels_count, n_rows]`.
    pub fn predict(&self, data: &DataMatrix) -> Array2<f32> {
        let n_rows = data.n_rows();
        let mut margins = Array2::zeros((self.labels_count as usize, n_rows));
        for (label, mut row) in margins.outer_iter_mut().enumerate() {
            row.fill(self.base_margin[label]);
        }

        for (tree, label) in self.trees_with_labels() {
            let mut row = margins.row_mut(label as usize);
            for (r, margin) in row.iter_mut().enumerate() {
                *margin += tree.predict_row(data, r);
            }
        }

        margins.mapv_inplace(|m| self.objective.from_internal(m));
        margins
    }
}

// =============================================================================
// Tests
// =============================================================================
