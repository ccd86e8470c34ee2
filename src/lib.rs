//! thicket: gradient boosted decision trees with a pipelined split finder.
//!
//! Trees are grown level by level. For every level, candidate features are
//! streamed through a ring of pipeline slots: each slot sorts the rows of one
//! feature by (leaf, feature order), runs a single global prefix scan over the
//! permuted gradients, and evaluates every candidate threshold in parallel,
//! reducing per leaf through a packed atomic argmax cell. Slot work runs on
//! dedicated worker threads so several features are in flight at once; the
//! driver consumes results strictly in issue order.
//!
//! # Key Types
//!
//! - [`Trainer`] - boosting loop: gradients in, trees out
//! - [`DataMatrix`] / [`DataMatrixBuilder`] - dense + binary-sparse columns
//! - [`TreeParams`] / [`EngineParams`] - configuration
//! - [`Objective`] - loss functions producing gradients
//! - [`RegTree`] / [`Ensemble`] - trained model
//!
//! # Example
//!
//! ```ignore
//! use thicket::{DataMatrixBuilder, EngineParams, Objective, Trainer, TreeParams};
//!
//! let data = DataMatrixBuilder::new(4)
//!     .dense(vec![1.0, 2.0, 3.0, 4.0])
//!     .build()?;
//! let params = TreeParams { depth: 2, ..Default::default() };
//! let mut trainer = Trainer::new(data, vec![0.0, 0.0, 1.0, 1.0], params, EngineParams::default())?;
//! trainer.train(10);
//! let preds = trainer.predict_training_data();
//! ```

pub mod config;
pub mod data;
pub mod objective;
pub mod training;
pub mod tree;

// High-level entry points
pub use training::{Trainer, TrainError};

// Configuration
pub use config::{ConfigError, EngineParams, TreeParams};

// Data handling
pub use data::{DataError, DataMatrix, DataMatrixBuilder};

// Objectives and model
pub use objective::Objective;
pub use tree::{Ensemble, RegTree};
