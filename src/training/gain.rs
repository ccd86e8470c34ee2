//! Regularized split gain and leaf weights.
//!
//! The gain of splitting `total` into `left` and `right = total - left` is
//!
//! ```text
//! gain = q(L) + q(R) - q(T)      where q(G) = G² / (H + lambda)
//! ```
//!
//! with `H` the hessian sum, or the row count for gradient-only statistics.
//! A split is feasible only when both children carry at least `min_leaf` rows
//! and at least `min_hess` hessian mass; infeasible candidates score zero.
//! Leaf weights apply L1 soft-thresholding on top of the same denominator.

use serde::{Deserialize, Serialize};

use super::stats::SplitStat;
use crate::config::TreeParams;

/// Regularization and feasibility parameters for split evaluation.
#[derive(Clone, Copy, Debug, Serialize, Deserialize)]
pub struct GainParams {
    /// L2 regularization.
    pub lambda: f32,
    /// L1 regularization (leaf weights only).
    pub alpha: f32,
    /// Minimum rows per child.
    pub min_leaf: u64,
    /// Minimum hessian mass per child.
    pub min_hess: f32,
    /// Reserved: minimum loss reduction. Not part of the gain.
    pub gamma: f32,
}

impl GainParams {
    pub fn from_tree_params(params: &TreeParams) -> Self {
        Self {
            lambda: params.lambda,
            alpha: params.alpha,
            min_leaf: params.min_leaf_size,
            min_hess: params.min_child_weight,
            gamma: params.gamma,
        }
    }

    /// The quadratic score `G² / (H + lambda)` of one side.
    #[inline]
    pub fn side_score<S: SplitStat>(&self, stat: &S, count: u64) -> f64 {
        let g = stat.grad();
        let h = stat.hess().unwrap_or(count as f64);
        let denom = h + self.lambda as f64;
        if denom <= 0.0 {
            return 0.0;
        }
        g * g / denom
    }

    /// Gain of assigning `left` out of `total` to the left child.
    ///
    /// Returns 0 when the feasibility predicate fails. Symmetric under
    /// left/right exchange.
    #[inline]
    pub fn split_gain<S: SplitStat>(
        &self,
        left: S,
        left_count: u64,
        total: S,
        total_count: u64,
    ) -> f64 {
        let right = total - left;
        let right_count = total_count - left_count;

        if left_count < self.min_leaf || right_count < self.min_leaf {
            return 0.0;
        }
        // Hessian guards collapse to true for gradient-only statistics.
        if let (Some(hl), Some(hr)) = (left.hess(), right.hess()) {
            let min_hess = self.min_hess as f64;
            if hl.abs() < min_hess || hr.abs() < min_hess {
                return 0.0;
            }
        }

        self.side_score(&left, left_count) + self.side_score(&right, right_count)
            - self.side_score(&total, total_count)
    }

    /// Optimal leaf weight: `-sign_shrink(G, alpha) / (H + lambda)`.
    ///
    /// The caller applies the learning rate.
    #[inline]
    pub fn leaf_weight<S: SplitStat>(&self, stat: &S, count: u64) -> f32 {
        let g = stat.grad();
        let h = stat.hess().unwrap_or(count as f64);
        let denom = h + self.lambda as f64;
        if denom <= 0.0 {
            return 0.0;
        }

        let alpha = self.alpha as f64;
        let shrunk = if alpha == 0.0 {
            g
        } else {
            g.signum() * (g.abs() - alpha).max(0.0)
        };
        (-shrunk / denom) as f32
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::objective::GradHess;
    use crate::training::stats::{GradHessSum, GradSum};
    use approx::assert_relative_eq;

    fn unconstrained() -> GainParams {
        GainParams {
            lambda: 0.0,
            alpha: 0.0,
            min_leaf: 1,
            min_hess: 0.0,
            gamma: 0.0,
        }
    }

    fn pair(grad: f32, hess: f32) -> GradHessSum<f64> {
        GradHessSum::from_input(GradHess { grad, hess })
    }

    #[test]
    fn reduces_to_variance_form_when_unconstrained() {
        // With min_leaf = 1, min_hess = 0, lambda = 0, alpha = 0 the gain is
        // Gl²/Hl + Gr²/Hr - Gt²/Ht.
        let params = unconstrained();
        let left = pair(3.0, 2.0);
        let total = pair(5.0, 6.0);

        let expected = 9.0 / 2.0 + 4.0 / 4.0 - 25.0 / 6.0;
        assert_relative_eq!(
            params.split_gain(left, 2, total, 6),
            expected,
            epsilon = 1e-12
        );
    }

    #[test]
    fn gain_is_symmetric_under_side_exchange() {
        let params = GainParams {
            lambda: 1.5,
            ..unconstrained()
        };
        let total = pair(5.0, 8.0);
        let left = pair(-2.0, 3.0);
        let right = total - left;

        assert_relative_eq!(
            params.split_gain(left, 3, total, 8),
            params.split_gain(right, 5, total, 8),
            epsilon = 1e-12
        );
    }

    #[test]
    fn scalar_stat_uses_count_as_hessian() {
        let params = unconstrained();
        let left = GradSum::<f64>::from_input(-2.0);
        let total = GradSum::<f64>::from_input(0.0);

        // q(L) = 4/2, q(R) = 4/2, q(T) = 0.
        assert_relative_eq!(params.split_gain(left, 2, total, 4), 4.0);
    }

    #[test]
    fn min_leaf_rejects_small_children() {
        let params = GainParams {
            min_leaf: 3,
            ..unconstrained()
        };
        let left = GradSum::<f64>::from_input(-2.0);
        let total = GradSum::<f64>::default();

        assert_eq!(params.split_gain(left, 2, total, 4), 0.0);
        assert_eq!(params.split_gain(left, 3, total, 5), 0.0); // right side has 2
        assert!(params.split_gain(left, 3, total, 6) > 0.0);
    }

    #[test]
    fn min_hess_rejects_light_children() {
        let params = GainParams {
            min_hess: 1.0,
            ..unconstrained()
        };
        let left = pair(-1.0, 0.5);
        let total = pair(1.0, 4.0);

        assert_eq!(params.split_gain(left, 2, total, 8), 0.0);

        let heavier = pair(-1.0, 1.5);
        assert!(params.split_gain(heavier, 2, total, 8) > 0.0);
    }

    #[test]
    fn min_hess_does_not_apply_to_scalar_stats() {
        let params = GainParams {
            min_hess: 100.0,
            ..unconstrained()
        };
        let left = GradSum::<f64>::from_input(-2.0);
        let total = GradSum::<f64>::default();

        assert!(params.split_gain(left, 2, total, 4) > 0.0);
    }

    #[test]
    fn leaf_weight_newton_step() {
        let params = GainParams {
            lambda: 1.0,
            ..unconstrained()
        };
        let stat = pair(-10.0, 5.0);
        // w = 10 / (5 + 1)
        assert_relative_eq!(params.leaf_weight(&stat, 7), 10.0 / 6.0, epsilon = 1e-6);
    }

    #[test]
    fn leaf_weight_l1_soft_threshold() {
        let params = GainParams {
            lambda: 1.0,
            alpha: 2.0,
            ..unconstrained()
        };

        // Below the threshold: shrunk to zero.
        let small = pair(-1.0, 5.0);
        assert_eq!(params.leaf_weight(&small, 7), 0.0);

        // Above: |G| reduced by alpha.
        let large = pair(-10.0, 5.0);
        assert_relative_eq!(params.leaf_weight(&large, 7), 8.0 / 6.0, epsilon = 1e-6);
    }

    #[test]
    fn leaf_weight_empty_leaf_is_zero() {
        let params = unconstrained();
        let stat = GradSum::<f32>::default();
        assert_eq!(params.leaf_weight(&stat, 0), 0.0);
    }
}
