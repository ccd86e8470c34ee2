//! Objective (loss) functions producing per-row gradients.
//!
//! Objectives map labels into an internal margin space, refresh the gradient
//! buffer from current margins, and map margins back to output space at
//! prediction time. Gradient elements are either a bare `f32` (gradient-only
//! training, hessian taken as the row count) or a [`GradHess`] pair.

use ndarray::ArrayView2;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

// =============================================================================
// Objective
// =============================================================================

/// Loss function selection.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum Objective {
    /// Squared error regression. Gradient-only.
    LinearRegression,
    /// Binary classification with log loss. Gradient + hessian.
    LogisticRegression,
    /// One-vs-all multiclass: an independent logistic margin per label.
    SoftMaxOneVsAll,
}

impl Objective {
    /// Whether gradients carry a second-order term.
    #[inline]
    pub fn uses_hessian(&self) -> bool {
        !matches!(self, Objective::LinearRegression)
    }

    /// Map a label/base score into internal margin space.
    ///
    /// Identity for regression, logit for the logistic family.
    #[inline]
    pub fn into_internal(&self, y: f32) -> f32 {
        match self {
            Objective::LinearRegression => y,
            Objective::LogisticRegression | Objective::SoftMaxOneVsAll => {
                (y / (1.0 - y)).ln()
            }
        }
    }

    /// Map an internal margin back to output space.
    #[inline]
    pub fn from_internal(&self, margin: f32) -> f32 {
        match self {
            Objective::LinearRegression => margin,
            Objective::LogisticRegression | Objective::SoftMaxOneVsAll => sigmoid(margin),
        }
    }

    /// Name for logging.
    pub fn name(&self) -> &'static str {
        match self {
            Objective::LinearRegression => "linear",
            Objective::LogisticRegression => "logistic",
            Objective::SoftMaxOneVsAll => "softmax_ova",
        }
    }
}

#[inline]
fn sigmoid(x: f32) -> f32 {
    1.0 / (1.0 + (-x).exp())
}

// =============================================================================
// Gradient elements
// =============================================================================

/// First and second derivative of the loss at one row.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct GradHess {
    pub grad: f32,
    pub hess: f32,
}

/// A per-row gradient element an objective can produce.
///
/// Implemented for `f32` (gradient-only) and [`GradHess`].
pub trait GradElem: Copy + Send + Sync + 'static {
    /// Compute the element for one row of one label.
    ///
    /// `class` is the label index, used by one-vs-all objectives to turn the
    /// target into a membership indicator.
    fn from_margin(objective: Objective, margin: f32, target: f32, class: u32) -> Self;
}

impl GradElem for f32 {
    #[inline]
    fn from_margin(objective: Objective, margin: f32, target: f32, class: u32) -> Self {
        match objective {
            Objective::LinearRegression => margin - target,
            Objective::LogisticRegression => sigmoid(margin) - target,
            Objective::SoftMaxOneVsAll => {
                let indicator = (target as u32 == class) as u32 as f32;
                sigmoid(margin) - indicator
            }
        }
    }
}

impl GradElem for GradHess {
    #[inline]
    fn from_margin(objective: Objective, margin: f32, target: f32, class: u32) -> Self {
        match objective {
            Objective::LinearRegression => GradHess {
                grad: margin - target,
                hess: 1.0,
            },
            Objective::LogisticRegression => {
                let p = sigmoid(margin);
                GradHess {
                    grad: p - target,
                    hess: p * (1.0 - p),
                }
            }
            Objective::SoftMaxOneVsAll => {
                let p = sigmoid(margin);
                let indicator = (target as u32 == class) as u32 as f32;
                GradHess {
                    grad: p - indicator,
                    hess: p * (1.0 - p),
                }
            }
        }
    }
}

/// Refresh the gradient buffer from current margins.
///
/// `margins` has shape `[labels_count, n_rows]`; `out` is label-major with
/// `labels_count * n_rows` elements. Targets hold one value per row: the
/// regression target, the {0, 1} label, or the class index.
pub(crate) fn update_gradients<I: GradElem>(
    objective: Objective,
    margins: ArrayView2<'_, f32>,
    targets: &[f32],
    out: &mut [I],
) {
    let n_rows = targets.len();
    debug_assert_eq!(margins.ncols(), n_rows);
    debug_assert_eq!(out.len(), margins.nrows() * n_rows);

    out.par_chunks_mut(n_rows)
        .enumerate()
        .for_each(|(class, out_row)| {
            let margin_row = margins.row(class);
            for ((g, &m), &y) in out_row.iter_mut().zip(margin_row.iter()).zip(targets.iter()) {
                *g = I::from_margin(objective, m, y, class as u32);
            }
        });
}

// =============================================================================
// Tests
// =============================================================================
