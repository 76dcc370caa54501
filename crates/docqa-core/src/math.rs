//! Vector helpers shared by the dense, approximate and graph paths.

use crate::error::{Error, Result};

/// Norms at or below this are treated as degenerate and left unnormalized.
pub const NORM_EPSILON: f32 = 1e-6;

pub fn l2_norm(v: &[f32]) -> f32 {
    v.iter().map(|x| f64::from(*x) * f64::from(*x)).sum::<f64>().sqrt() as f32
}

/// Returns `v / ||v||`, or a copy of `v` when its norm is degenerate.
pub fn l2_normalized(v: &[f32]) -> Vec<f32> {
    let norm = l2_norm(v);
    if norm > NORM_EPSILON {
        v.iter().map(|x| x / norm).collect()
    } else {
        v.to_vec()
    }
}

/// Cosine similarity accumulated in f64. A zero-norm operand yields 0.0.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    let (mut dot, mut na, mut nb) = (0f64, 0f64, 0f64);
    for (x, y) in a.iter().zip(b.iter()) {
        let (x, y) = (f64::from(*x), f64::from(*y));
        dot += x * y;
        na += x * x;
        nb += y * y;
    }
    if na <= f64::EPSILON || nb <= f64::EPSILON {
        return 0.0;
    }
    (dot / (na.sqrt() * nb.sqrt())).clamp(-1.0, 1.0) as f32
}

pub fn check_dimension(expected: usize, actual: usize) -> Result<()> {
    if expected == actual {
        Ok(())
    } else {
        Err(Error::DimensionMismatch { expected, actual })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cosine_of_parallel_vectors_is_one() {
        let s = cosine_similarity(&[1.0, 2.0, 3.0], &[2.0, 4.0, 6.0]);
        assert!((s - 1.0).abs() < 1e-6);
    }

    #[test]
    fn cosine_of_opposite_vectors_is_minus_one() {
        let s = cosine_similarity(&[1.0, 0.0], &[-3.0, 0.0]);
        assert!((s + 1.0).abs() < 1e-6);
    }

    #[test]
    fn cosine_with_zero_vector_is_zero() {
        assert_eq!(cosine_similarity(&[0.0, 0.0], &[1.0, 1.0]), 0.0);
    }

    #[test]
    fn degenerate_vector_is_left_unnormalized() {
        let v = vec![1e-9f32, 0.0, 0.0];
        assert_eq!(l2_normalized(&v), v);
    }

    #[test]
    fn normalized_vector_has_unit_norm() {
        let v = l2_normalized(&[3.0, 4.0]);
        assert!((l2_norm(&v) - 1.0).abs() < 1e-6);
        assert!((v[0] - 0.6).abs() < 1e-6);
    }

    #[test]
    fn dimension_mismatch_is_reported() {
        assert!(check_dimension(384, 384).is_ok());
        match check_dimension(384, 3) {
            Err(Error::DimensionMismatch { expected, actual }) => {
                assert_eq!((expected, actual), (384, 3));
            }
            other => panic!("unexpected {other:?}"),
        }
    }
}
