//! Per-level driver: schedules feature passes over the slot ring and reduces
//! their results into the per-leaf best split.
//!
//! Features run on `overlap` slot workers concurrently, but results are
//! consumed strictly in issue order: the running best is first-writer-wins on
//! tied gains, so consumption order is part of the semantics. The ring is
//! primed with the first `overlap` features; each later iteration issues
//! exactly the one newly reachable feature before blocking on the slot whose
//! result is due.

use std::sync::mpsc;

use log::debug;

use super::pipeline::{DenseCandidate, LevelCtx, PipelineSlot, SlotResult};
use super::stats::{LeafIndex, SplitStat};

// =============================================================================
// BestSplit
// =============================================================================

/// The best split found so far for one leaf.
#[derive(Debug, Clone, Copy)]
pub struct BestSplit<S> {
    /// Feature id, or -1 while unset.
    pub fid: i64,
    /// Gain; remains 0 for degenerate (sentinel) splits.
    pub gain: f32,
    /// Dense threshold; `+inf` when degenerate so every row routes left.
    pub split_value: f32,
    /// Sparse split: left child is the rows where the feature is true.
    pub split_by_true: bool,
    /// Rows routed left.
    pub count: u64,
    /// Gradient total routed left.
    pub sum: S,
}

impl<S: SplitStat> Default for BestSplit<S> {
    fn default() -> Self {
        Self {
            fid: -1,
            gain: 0.0,
            split_value: f32::INFINITY,
            split_by_true: false,
            count: 0,
            sum: S::default(),
        }
    }
}

// =============================================================================
// Level driver
// =============================================================================

/// Find the best split of every live leaf at the current level.
///
/// `features` is the sampled column subset; `best` must hold one (defaulted)
/// entry per leaf. On return every leaf has a split: a real one, or the
/// degenerate sentinel for leaves where no candidate had positive gain.
pub fn run_level<L: LeafIndex, S: SplitStat>(
    slots: &mut [PipelineSlot<L, S>],
    ctx: &LevelCtx<'_, L, S>,
    features: &[u32],
    best: &mut [BestSplit<S>],
) {
    let n_leaves = ctx.n_leaves();
    debug_assert_eq!(best.len(), n_leaves);
    debug_assert!(!slots.is_empty());

    let take = features.len();
    if take > 0 {
        std::thread::scope(|scope| {
            let mut job_txs = Vec::with_capacity(slots.len());
            let mut result_rxs = Vec::with_capacity(slots.len());

            for slot in slots.iter_mut() {
                let (job_tx, job_rx) = mpsc::channel::<u32>();
                let (result_tx, result_rx) = mpsc::channel::<SlotResult<S>>();
                scope.spawn(move || {
                    while let Ok(fid) = job_rx.recv() {
                        if result_tx.send(slot.run(fid, ctx)).is_err() {
                            break;
                        }
                    }
                });
                job_txs.push(job_tx);
                result_rxs.push(result_rx);
            }
            let overlap = job_txs.len();

            for j in 0..take {
                if j == 0 {
                    for (i, &fid) in features.iter().take(overlap).enumerate() {
                        job_txs[i].send(fid).expect("pipeline slot worker died");
                    }
                } else if j + overlap - 1 < take {
                    let f = j + overlap - 1;
                    job_txs[f % overlap]
                        .send(features[f])
                        .expect("pipeline slot worker died");
                }

                // The slot whose result is due; blocking here is the only
                // suspension point of the driver.
                let result = result_rxs[j % overlap]
                    .recv()
                    .expect("pipeline slot worker died");
                match result {
                    SlotResult::Dense { fid, candidates } => {
                        reduce_dense(fid, &candidates, ctx, best);
                    }
                    SlotResult::Sparse { fid, true_sums } => {
                        reduce_sparse(fid, &true_sums, ctx, best);
                    }
                }
            }

            drop(job_txs);
        });
    }

    // Leaves with no positive-gain split: the sentinel routes all rows left
    // and the left child inherits the whole parent statistic.
    for (leaf, b) in best.iter_mut().enumerate() {
        if b.fid < 0 {
            b.fid = 0;
            b.gain = 0.0;
            b.split_value = f32::INFINITY;
            b.split_by_true = false;
            b.count = ctx.parent_count[leaf + 1] - ctx.parent_count[leaf];
            b.sum = ctx.parent_sum[leaf + 1] - ctx.parent_sum[leaf];
        }
    }
}

fn reduce_dense<L: LeafIndex, S: SplitStat>(
    fid: u32,
    candidates: &[DenseCandidate<S>],
    ctx: &LevelCtx<'_, L, S>,
    best: &mut [BestSplit<S>],
) {
    for (leaf, cand) in candidates.iter().enumerate() {
        if !(cand.gain > best[leaf].gain) {
            continue;
        }
        if !cand.prefix.is_finite() {
            // The scan overflowed the accumulator. Reject the candidate
            // rather than guess; double_precision avoids this.
            debug!(
                "feature {}: rejecting split of leaf {}: non-finite scanned sum",
                fid, leaf
            );
            continue;
        }

        let b = &mut best[leaf];
        b.fid = fid as i64;
        b.gain = cand.gain;
        b.split_value = 0.5 * (cand.value_lo + cand.value_hi);
        b.split_by_true = false;
        b.count = cand.index as u64 - ctx.parent_count[leaf];
        b.sum = cand.prefix - ctx.parent_sum[leaf];
    }
}

fn reduce_sparse<L: LeafIndex, S: SplitStat>(
    fid: u32,
    true_sums: &[S],
    ctx: &LevelCtx<'_, L, S>,
    best: &mut [BestSplit<S>],
) {
    let local = fid as usize - ctx.data.n_dense();
    let counts = &ctx.sparse_stat[local];

    for (leaf, &left) in true_sums.iter().enumerate() {
        let left_count = counts[leaf];
        if left_count == 0 {
            continue;
        }
        let total_count = ctx.parent_count[leaf + 1] - ctx.parent_count[leaf];
        let total = ctx.parent_sum[leaf + 1] - ctx.parent_sum[leaf];

        let gain = ctx.gain.split_gain(left, left_count, total, total_count) as f32;
        if gain > best[leaf].gain {
            let b = &mut best[leaf];
            b.fid = fid as i64;
            b.gain = gain;
            b.split_value = f32::INFINITY;
            b.split_by_true = true;
            b.count = left_count;
            b.sum = left;
        }
    }
}

// =============================================================================
// Tests
// =============================================================================
