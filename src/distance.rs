// Copyright (c) 2025 nnsearch Contributors
// Licensed under the nnsearch License. See LICENSE file for details.

//! Euclidean distance kernels.
//!
//! Every index ranks candidates by **squared** L2 distance, which preserves
//! the ordering of true Euclidean distance while skipping the square root in
//! the hot loop. Only the final [`ResultSet`](crate::ResultSet) reports
//! `sqrt`-ed values.
//!
//! | Function | Returns |
//! |----------|---------|
//! | [`squared_euclidean`] | `Σ(a_i - b_i)²` |
//! | [`euclidean`] | `sqrt(Σ(a_i - b_i)²)` |
//! | [`squared_euclidean_bounded`] | early-exit variant used by linear scans |
//!
//! # Examples
//!
//! ```rust
//! use nnsearch::distance::{euclidean, squared_euclidean};
//!
//! let a = [1.0, 0.0, 0.0];
//! let b = [0.0, 1.0, 0.0];
//!
//! assert!((squared_euclidean(&a, &b) - 2.0).abs() < 1e-12);
//! assert!((euclidean(&a, &b) - std::f64::consts::SQRT_2).abs() < 1e-12);
//! ```

/// Squared Euclidean distance: `Σ(a_i - b_i)²`.
///
/// # Panics
///
/// Debug builds panic if the slices have different lengths.
#[inline]
pub fn squared_euclidean(a: &[f64], b: &[f64]) -> f64 {
    debug_assert_eq!(a.len(), b.len(), "Vector dimensions must match");

    // Four independent accumulators let the compiler vectorize the loop.
    let mut acc = [0.0f64; 4];
    let chunks_a = a.chunks_exact(4);
    let chunks_b = b.chunks_exact(4);
    let tail_a = chunks_a.remainder();
    let tail_b = chunks_b.remainder();

    for (ca, cb) in chunks_a.zip(chunks_b) {
        for i in 0..4 {
            let diff = ca[i] - cb[i];
            acc[i] += diff * diff;
        }
    }

    let mut sum = acc[0] + acc[1] + acc[2] + acc[3];
    for (x, y) in tail_a.iter().zip(tail_b.iter()) {
        let diff = x - y;
        sum += diff * diff;
    }
    sum
}

/// Euclidean (L2) distance: `sqrt(Σ(a_i - b_i)²)`.
#[inline]
pub fn euclidean(a: &[f64], b: &[f64]) -> f64 {
    squared_euclidean(a, b).sqrt()
}

/// Squared Euclidean distance that gives up once the partial sum exceeds `bound`.
///
/// Returns a value `> bound` when the true distance exceeds `bound`; otherwise
/// returns exactly what [`squared_euclidean`] returns (same accumulation
/// order, bit for bit). Used by exhaustive scans where most candidates lose
/// to the current k-th best.
#[inline]
pub fn squared_euclidean_bounded(a: &[f64], b: &[f64], bound: f64) -> f64 {
    debug_assert_eq!(a.len(), b.len(), "Vector dimensions must match");

    let mut acc = [0.0f64; 4];
    let chunks_a = a.chunks_exact(4);
    let chunks_b = b.chunks_exact(4);
    let tail_a = chunks_a.remainder();
    let tail_b = chunks_b.remainder();

    for (ca, cb) in chunks_a.zip(chunks_b) {
        for i in 0..4 {
            let diff = ca[i] - cb[i];
            acc[i] += diff * diff;
        }
        let partial = acc[0] + acc[1] + acc[2] + acc[3];
        if partial > bound {
            return partial;
        }
    }

    let mut sum = acc[0] + acc[1] + acc[2] + acc[3];
    for (x, y) in tail_a.iter().zip(tail_b.iter()) {
        let diff = x - y;
        sum += diff * diff;
    }
    sum
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_identical_vectors() {
        let v = vec![1.0, 2.0, 3.0, 4.0, 5.0];
        assert_eq!(squared_euclidean(&v, &v), 0.0);
        assert_eq!(euclidean(&v, &v), 0.0);
    }

    #[test]
    fn test_known_distance() {
        let a = vec![0.0, 0.0, 0.0, 0.0, 0.0, 0.0, 0.0];
        let b = vec![1.0, 1.0, 1.0, 1.0, 1.0, 1.0, 1.0];
        assert!((squared_euclidean(&a, &b) - 7.0).abs() < 1e-12);
        assert!((euclidean(&a, &b) - 7.0f64.sqrt()).abs() < 1e-12);
    }

    #[test]
    fn test_bounded_matches_exact_below_bound() {
        let a: Vec<f64> = (0..13).map(|i| i as f64 * 0.5).collect();
        let b: Vec<f64> = (0..13).map(|i| i as f64 * 0.25).collect();
        let exact = squared_euclidean(&a, &b);
        assert_eq!(squared_euclidean_bounded(&a, &b, exact + 1.0), exact);
        assert_eq!(squared_euclidean_bounded(&a, &b, f64::INFINITY), exact);
    }

    #[test]
    fn test_bounded_exceeds_bound() {
        let a = vec![10.0; 16];
        let b = vec![0.0; 16];
        assert!(squared_euclidean_bounded(&a, &b, 1.0) > 1.0);
    }
}
