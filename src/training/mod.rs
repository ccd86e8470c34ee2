//! Training infrastructure.
//!
//! The split finder is generic along three axes, chosen once per training run:
//!
//! - leaf-id width ([`stats::LeafIndex`]): the smallest unsigned integer
//!   holding `depth + 1` bits, which keeps the radix sort passes short;
//! - gradient statistic ([`stats::SplitStat`]): scalar gradient sums for
//!   gradient-only objectives, gradient/hessian pairs otherwise;
//! - accumulator precision: `f32` or `f64` sums, selected by
//!   `EngineParams::double_precision`.
//!
//! Module map:
//!
//! - [`stats`] - gradient statistics and leaf-id widths
//! - [`gain`] - regularized split gain and leaf weights
//! - [`argmax`] - packed atomic max-with-index cell
//! - [`sort`] / [`scan`] / [`arena`] - sort, prefix-scan and scratch primitives
//! - [`sampling`] - per-level column sampling
//! - [`pipeline`] - per-feature split-finding pipeline and slot buffers
//! - [`level`] - per-level driver: slot ring scheduling and split selection
//! - [`grow`] - per-tree driver: stats propagation, row partitioning, leaves
//! - [`trainer`] - the boosting loop

pub mod arena;
pub mod argmax;
pub mod gain;
pub mod grow;
pub mod level;
pub mod pipeline;
pub mod sampling;
pub mod scan;
pub mod sort;
pub mod stats;
pub mod trainer;

pub use trainer::{TrainError, Trainer};
