//! Stable radix sort of `(leaf, position)` pairs.
//!
//! Least-significant-digit counting sort over 8-bit digits, touching only the
//! low `key_bits` bits of the key. Rows arrive ordered by feature value; the
//! stable sort groups them by leaf while preserving value order inside each
//! leaf, which is the property the downstream prefix scan relies on.

use super::stats::LeafIndex;

/// Sort `keys` (and `vals` alongside) by the low `key_bits` bits of the key.
///
/// `scratch_keys`/`scratch_vals` must hold at least `keys.len()` elements;
/// they are ping-pong buffers and their contents are clobbered.
pub fn radix_sort_pairs<L: LeafIndex>(
    keys: &mut [L],
    vals: &mut [u32],
    key_bits: u32,
    scratch_keys: &mut [L],
    scratch_vals: &mut [u32],
) {
    let n = keys.len();
    debug_assert_eq!(vals.len(), n);
    debug_assert!(scratch_keys.len() >= n);
    debug_assert!(scratch_vals.len() >= n);
    debug_assert!(key_bits >= 1 && key_bits <= L::BITS);

    if n <= 1 {
        return;
    }

    let passes = (key_bits as usize + 7) / 8;
    let mut counts = [0usize; 256];
    let mut in_scratch = false;

    for pass in 0..passes {
        let shift = (pass * 8) as u32;

        let (src_k, src_v, dst_k, dst_v): (&[L], &[u32], &mut [L], &mut [u32]) = if in_scratch {
            (&scratch_keys[..n], &scratch_vals[..n], &mut *keys, &mut *vals)
        } else {
            (&*keys, &*vals, &mut scratch_keys[..n], &mut scratch_vals[..n])
        };

        counts.fill(0);
        for &k in src_k.iter() {
            counts[(k.to_usize() >> shift) & 0xff] += 1;
        }

        let mut running = 0usize;
        for c in counts.iter_mut() {
            let here = *c;
            *c = running;
            running += here;
        }

        for (&k, &v) in src_k.iter().zip(src_v.iter()) {
            let digit = (k.to_usize() >> shift) & 0xff;
            let pos = counts[digit];
            counts[digit] += 1;
            dst_k[pos] = k;
            dst_v[pos] = v;
        }

        in_scratch = !in_scratch;
    }

    if in_scratch {
        keys.copy_from_slice(&scratch_keys[..n]);
        vals.copy_from_slice(&scratch_vals[..n]);
    }
}

// =============================================================================
// Tests
// =============================================================================
