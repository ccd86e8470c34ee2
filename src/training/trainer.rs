//! The boosting loop.
//!
//! Owns the dataset, the per-label margins and the growing ensemble. Each
//! round refreshes the gradient buffer from the objective and grows one tree
//! per label against that label's gradient slice.
//!
//! The split-finding core is monomorphized over leaf-id width and gradient
//! statistic; the concrete instantiation is selected here, once, when
//! training starts.

use log::info;
use ndarray::Array2;
use sysinfo::System;

use super::grow::TreeDriver;
use super::pipeline::PipelineSlot;
use super::stats::{
    leaf_width_for_depth, GradHessSum, GradSum, LeafIndex, LeafWidth, SplitStat,
};
use crate::config::{ConfigError, EngineParams, TreeParams};
use crate::data::DataMatrix;
use crate::objective::{update_gradients, GradElem};
use crate::tree::Ensemble;

// =============================================================================
// Errors
// =============================================================================

/// Errors reported when a trainer is constructed. Fatal; training never
/// starts.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum TrainError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("targets length {got} does not match dataset rows {expected}")]
    TargetsLengthMismatch { expected: usize, got: usize },
    #[error("dataset has no rows")]
    EmptyDataset,
}

// =============================================================================
// Trainer
// =============================================================================

/// Gradient boosting trainer.
#[derive(Debug)]
pub struct Trainer {
    data: DataMatrix,
    targets: Vec<f32>,
    params: TreeParams,
    engine: EngineParams,
    /// Internal-space predictions, shape `[labels_count, n_rows]`.
    margins: Array2<f32>,
    ensemble: Ensemble,
    trees_grown: u64,
}

impl Trainer {
    /// Validate the configuration, plan column residency and set up margins.
    pub fn new(
        mut data: DataMatrix,
        targets: Vec<f32>,
        params: TreeParams,
        engine: EngineParams,
    ) -> Result<Self, TrainError> {
        params.validate(data.n_columns())?;
        if data.n_rows() == 0 {
            return Err(TrainError::EmptyDataset);
        }
        if targets.len() != data.n_rows() {
            return Err(TrainError::TargetsLengthMismatch {
                expected: data.n_rows(),
                got: targets.len(),
            });
        }

        let budget = engine.memory_limit.unwrap_or_else(available_memory);
        data.plan_residency(budget, engine.verbose);

        let labels = params.labels_count as usize;
        let base = params.objective.into_internal(params.initial_y);
        let margins = Array2::from_elem((labels, data.n_rows()), base);
        let ensemble = Ensemble::new(params.labels_count, vec![base; labels], params.objective);

        Ok(Self {
            data,
            targets,
            params,
            engine,
            margins,
            ensemble,
            trees_grown: 0,
        })
    }

    /// Run `n_rounds` boosting rounds, growing `labels_count` trees per round.
    pub fn train(&mut self, n_rounds: u32) {
        match leaf_width_for_depth(self.params.depth) {
            LeafWidth::U8 => self.train_with_width::<u8>(n_rounds),
            LeafWidth::U16 => self.train_with_width::<u16>(n_rounds),
            LeafWidth::U32 => self.train_with_width::<u32>(n_rounds),
            LeafWidth::U64 => self.train_with_width::<u64>(n_rounds),
        }
    }

    fn train_with_width<L: LeafIndex>(&mut self, n_rounds: u32) {
        match (
            self.params.objective.uses_hessian(),
            self.engine.double_precision,
        ) {
            (false, false) => self.boost::<L, GradSum<f32>>(n_rounds),
            (false, true) => self.boost::<L, GradSum<f64>>(n_rounds),
            (true, false) => self.boost::<L, GradHessSum<f32>>(n_rounds),
            (true, true) => self.boost::<L, GradHessSum<f64>>(n_rounds),
        }
    }

    fn boost<L: LeafIndex, S: SplitStat>(&mut self, n_rounds: u32)
    where
        S::Input: GradElem,
    {
        let n = self.data.n_rows();
        let labels = self.params.labels_count as usize;

        // Slot buffers live for the whole training call and are reused
        // across features, levels, trees and rounds.
        let mut slots: Vec<PipelineSlot<L, S>> = (0..self.engine.overlap_depth())
            .map(|_| PipelineSlot::new(n))
            .collect();
        let mut grads: Vec<S::Input> = vec![S::Input::default(); labels * n];
        let mut driver = TreeDriver::<L, S>::new(&self.data, &self.params, self.engine.seed);

        for round in 0..n_rounds {
            update_gradients(
                self.params.objective,
                self.margins.view(),
                &self.targets,
                &mut grads,
            );

            for label in 0..labels {
                let slice = &grads[label * n..(label + 1) * n];
                let tree = driver.grow(
                    &mut slots,
                    slice,
                    self.trees_grown,
                    self.margins.row_mut(label),
                );
                self.ensemble.push_tree(tree, label as u32);
                self.trees_grown += 1;
            }

            if self.engine.verbose {
                info!(
                    "round {}: ensemble has {} trees",
                    round,
                    self.ensemble.n_trees()
                );
            }
        }
    }

    /// The trained ensemble.
    pub fn ensemble(&self) -> &Ensemble {
        &self.ensemble
    }

    /// Consume the trainer, keeping only the model.
    pub fn into_ensemble(self) -> Ensemble {
        self.ensemble
    }

    /// Predict output-space scores for an external dataset.
    pub fn predict(&self, data: &DataMatrix) -> Array2<f32> {
        self.ensemble.predict(data)
    }

    /// Output-space predictions for the training rows, taken from the margins
    /// maintained during boosting.
    pub fn predict_training_data(&self) -> Array2<f32> {
        let objective = self.params.objective;
        self.margins.mapv(|m| objective.from_internal(m))
    }
}

fn available_memory() -> u64 {
    let mut sys = System::new();
    sys.refresh_memory();
    sys.available_memory()
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::DataMatrixBuilder;
    use crate::objective::Objective;

    fn small_regression() -> (DataMatrix, Vec<f32>) {
        let n = 64;
        let x: Vec<f32> = (0..n).map(|i| i as f32 / 8.0).collect();
        let y: Vec<f32> = x.iter().map(|&v| 2.0 * v + 1.0).collect();
        let data = DataMatrixBuilder::new(n).dense(x).build().unwrap();
        (data, y)
    }

    #[test]
    fn rejects_mismatched_targets() {
        let (data, _) = small_regression();
        let err = Trainer::new(
            data,
            vec![1.0, 2.0],
            TreeParams::default(),
            EngineParams::default(),
        )
        .unwrap_err();
        assert_eq!(
            err,
            TrainError::TargetsLengthMismatch {
                expected: 64,
                got: 2
            }
        );
    }

    #[test]
    fn rejects_bad_config() {
        let (data, y) = small_regression();
        let params = TreeParams {
            depth: 1,
            ..Default::default()
        };
        let err = Trainer::new(data, y, params, EngineParams::default()).unwrap_err();
        assert!(matches!(err, TrainError::Config(ConfigError::UnsupportedDepth(1))));
    }

    #[test]
    fn training_reduces_squared_error() {
        let (data, y) = small_regression();
        let params = TreeParams {
            depth: 4,
            eta: 0.5,
            lambda: 0.0,
            ..Default::default()
        };
        let mut trainer = Trainer::new(data, y.clone(), params, EngineParams::default()).unwrap();

        let error = |preds: &Array2<f32>| -> f32 {
            preds
                .row(0)
                .iter()
                .zip(y.iter())
                .map(|(&p, &t)| (p - t) * (p - t))
                .sum()
        };

        let before = error(&trainer.predict_training_data());
        trainer.train(20);
        let after = error(&trainer.predict_training_data());

        assert!(after < before * 0.05, "before {before}, after {after}");
        assert_eq!(trainer.ensemble().n_trees(), 20);
    }

    #[test]
    fn multiclass_grows_one_tree_per_label() {
        let n = 30;
        let x: Vec<f32> = (0..n).map(|i| i as f32).collect();
        let y: Vec<f32> = (0..n).map(|i| (i / 10) as f32).collect();
        let data = DataMatrixBuilder::new(n).dense(x).build().unwrap();

        let params = TreeParams {
            depth: 3,
            labels_count: 3,
            objective: Objective::SoftMaxOneVsAll,
            initial_y: 0.5,
            ..Default::default()
        };
        let mut trainer = Trainer::new(data, y.clone(), params, EngineParams::default()).unwrap();
        trainer.train(5);

        assert_eq!(trainer.ensemble().n_trees(), 15);
        assert_eq!(trainer.ensemble().labels_count(), 3);

        // Each class should score highest on its own block of rows.
        let preds = trainer.predict_training_data();
        for (row, &target) in y.iter().enumerate() {
            let mut best_class = 0;
            let mut best_score = f32::NEG_INFINITY;
            for class in 0..3 {
                if preds[[class, row]] > best_score {
                    best_score = preds[[class, row]];
                    best_class = class;
                }
            }
            assert_eq!(best_class, target as usize, "row {row}");
        }
    }
}
