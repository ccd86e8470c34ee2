//! Training configuration: tree parameters and engine parameters.

use serde::{Deserialize, Serialize};

use crate::objective::Objective;

// =============================================================================
// TreeParams
// =============================================================================

/// Parameters controlling tree structure, regularization and sampling.
///
/// Note that node storage grows as `2^depth`: trees are perfect binary heaps,
/// so very deep trees are expensive regardless of how many splits are useful.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct TreeParams {
    /// Tree depth. `depth - 1` levels of splits are performed; leaves live at
    /// level `depth - 1`. Valid range is `[2, 63]`.
    pub depth: u32,
    /// Minimum rows per child for a split to be considered.
    pub min_leaf_size: u64,
    /// Minimum sum of hessians per child (ignored by gradient-only objectives).
    pub min_child_weight: f32,
    /// Minimum loss reduction to split. Reserved; currently not part of the
    /// gain computation.
    pub gamma: f32,
    /// L2 regularization on leaf weights.
    pub lambda: f32,
    /// L1 regularization on leaf weights.
    pub alpha: f32,
    /// Learning rate (shrinkage) applied to leaf weights.
    pub eta: f32,
    /// Fraction of columns considered per tree, in `(0, 1]`.
    pub colsample_bytree: f32,
    /// Fraction of the tree's columns considered per level, in `(0, 1]`.
    pub colsample_bylevel: f32,
    /// Base score in output space; converted to an internal margin at startup.
    pub initial_y: f32,
    /// Number of output labels (1 for regression/binary, K for one-vs-all).
    pub labels_count: u32,
    /// Loss function.
    pub objective: Objective,
}

impl Default for TreeParams {
    fn default() -> Self {
        Self {
            depth: 6,
            min_leaf_size: 1,
            min_child_weight: 1.0,
            gamma: 0.0,
            lambda: 1.0,
            alpha: 0.0,
            eta: 0.3,
            colsample_bytree: 1.0,
            colsample_bylevel: 1.0,
            initial_y: 0.0,
            labels_count: 1,
            objective: Objective::LinearRegression,
        }
    }
}

// =============================================================================
// EngineParams
// =============================================================================

/// Parameters controlling the execution engine rather than the model.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct EngineParams {
    /// Random seed for feature sampling.
    pub seed: u64,
    /// Number of pipeline slots, i.e. how many feature passes are in flight
    /// concurrently. Clamped to at least 1.
    pub overlap: usize,
    /// Accumulate gradient sums in f64 instead of f32.
    pub double_precision: bool,
    /// Byte budget for column residency. `None` queries available system
    /// memory; 90% of the budget is usable by columns.
    pub memory_limit: Option<u64>,
    /// Log residency and per-round progress at info level.
    pub verbose: bool,
}

impl Default for EngineParams {
    fn default() -> Self {
        Self {
            seed: 42,
            overlap: 2,
            double_precision: false,
            memory_limit: None,
            verbose: false,
        }
    }
}

impl EngineParams {
    /// Number of pipeline slots, never zero.
    #[inline]
    pub fn overlap_depth(&self) -> usize {
        self.overlap.max(1)
    }
}

// =============================================================================
// Validation
// =============================================================================

/// Configuration errors, reported at trainer construction. Fatal.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ConfigError {
    #[error("unsupported depth {0}: must be in [2, 63]")]
    UnsupportedDepth(u32),
    #[error("column sampling too small: {sampled} of {columns} columns at {stage}")]
    SamplingTooSmall {
        stage: &'static str,
        sampled: usize,
        columns: usize,
    },
    #[error("labels_count must be at least 1")]
    NoLabels,
    #[error("colsample ratio {value} out of range (0, 1] for {name}")]
    InvalidColsample { name: &'static str, value: f32 },
}

impl TreeParams {
    /// Validate against a dataset with `columns` feature columns.
    pub fn validate(&self, columns: usize) -> Result<(), ConfigError> {
        // depth + 1 bits of leaf id must fit in the widest sort key (u64).
        if self.depth < 2 || self.depth > 63 {
            return Err(ConfigError::UnsupportedDepth(self.depth));
        }
        if self.labels_count == 0 {
            return Err(ConfigError::NoLabels);
        }
        for (name, value) in [
            ("colsample_bytree", self.colsample_bytree),
            ("colsample_bylevel", self.colsample_bylevel),
        ] {
            if !(value > 0.0 && value <= 1.0) {
                return Err(ConfigError::InvalidColsample { name, value });
            }
        }

        let by_tree = (self.colsample_bytree * columns as f32).floor() as usize;
        if by_tree == 0 {
            return Err(ConfigError::SamplingTooSmall {
                stage: "colsample_bytree",
                sampled: by_tree,
                columns,
            });
        }
        let by_level =
            (self.colsample_bytree * self.colsample_bylevel * columns as f32).floor() as usize;
        if by_level == 0 {
            return Err(ConfigError::SamplingTooSmall {
                stage: "colsample_bylevel",
                sampled: by_level,
                columns,
            });
        }
        Ok(())
    }

    /// Number of columns sampled per level.
    pub(crate) fn level_sample_size(&self, columns: usize) -> usize {
        (self.colsample_bytree * self.colsample_bylevel * columns as f32).floor() as usize
    }
}

// =============================================================================
// Tests
// =============================================================================
