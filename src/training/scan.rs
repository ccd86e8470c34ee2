//! Exclusive prefix scan of gradient elements.
//!
//! The scan runs over the whole sorted array, not per segment: because rows
//! are already grouped by leaf, the prefix value at the first position of leaf
//! `k` equals the sum of all earlier leaves, and per-leaf sums fall out of a
//! single subtraction against the parent prefix arrays. Substituting a scan of
//! unsorted data here would silently break that recovery.

use rayon::prelude::*;

use super::stats::SplitStat;

/// Rows per parallel scan chunk.
pub const SCAN_CHUNK: usize = 8192;

/// Number of partial sums the scan needs for `n` rows.
#[inline]
pub fn scan_partials_len(n: usize) -> usize {
    n.div_ceil(SCAN_CHUNK)
}

/// Write the exclusive prefix sums of `input` into `out`.
///
/// `out[i]` is the sum of `input[..i]` widened into the statistic type;
/// `out[0]` is the identity. `partials` must hold at least
/// [`scan_partials_len`] elements.
pub fn exclusive_scan_into<S: SplitStat>(input: &[S::Input], out: &mut [S], partials: &mut [S]) {
    let n = input.len();
    debug_assert_eq!(out.len(), n);

    if n == 0 {
        return;
    }

    let n_chunks = scan_partials_len(n);
    if n_chunks == 1 {
        scan_chunk::<S>(input, out, S::default());
        return;
    }
    debug_assert!(partials.len() >= n_chunks);

    // Per-chunk totals, then a short sequential scan over them, then each
    // chunk scans locally from its base.
    partials[..n_chunks]
        .par_iter_mut()
        .enumerate()
        .for_each(|(c, p)| {
            let start = c * SCAN_CHUNK;
            let end = (start + SCAN_CHUNK).min(n);
            *p = input[start..end]
                .iter()
                .fold(S::default(), |acc, &x| acc + S::from_input(x));
        });

    let mut acc = S::default();
    for p in partials[..n_chunks].iter_mut() {
        let here = *p;
        *p = acc;
        acc = acc + here;
    }

    out.par_chunks_mut(SCAN_CHUNK)
        .zip(input.par_chunks(SCAN_CHUNK))
        .zip(partials[..n_chunks].par_iter())
        .for_each(|((out_chunk, in_chunk), &base)| {
            scan_chunk::<S>(in_chunk, out_chunk, base);
        });
}

#[inline]
fn scan_chunk<S: SplitStat>(input: &[S::Input], out: &mut [S], base: S) {
    let mut acc = base;
    for (o, &x) in out.iter_mut().zip(input.iter()) {
        *o = acc;
        acc = acc + S::from_input(x);
    }
}

// =============================================================================
// Tests
// =============================================================================
