//! Embedding value type and vector helpers shared by every vector component.
//!
//! - [`quant`] holds the symmetric int8 codec used by the label bank vocab and KB medoids.
//! - [`text`] derives deterministic pseudo-embeddings for phrases (shard building, stubs).

mod error;
/// Symmetric int8 quantization.
pub mod quant;
/// Deterministic text-to-vector hashing.
pub mod text;


pub use error::{EmbeddingError, EmbeddingResult};
pub use quant::{dequantize_int8, quantize_int8, quantize_rows};
pub use text::embed_text;

/// An immutable embedding vector with its dimension.
///
/// Invariant: `vec.len() == dim`.
#[derive(Debug, Clone, PartialEq)]
pub struct Embedding {
    vec: Vec<f32>,
    dim: usize,
}

impl Embedding {
    /// Wraps `vec`, taking its length as the dimension.
    pub fn new(vec: Vec<f32>) -> Self {
        let dim = vec.len();
        Self { vec, dim }
    }

    /// Wraps `vec`, checking it against `dim`.
    pub fn with_dim(vec: Vec<f32>, dim: usize) -> EmbeddingResult<Self> {
        if vec.len() != dim {
            return Err(EmbeddingError::DimensionMismatch {
                expected: dim,
                actual: vec.len(),
            });
        }
        Ok(Self { vec, dim })
    }

    /// Returns a unit-norm copy (zero vectors stay zero).
    pub fn normalized(&self) -> Self {
        Self {
            vec: l2_normalize(&self.vec),
            dim: self.dim,
        }
    }

    pub fn dim(&self) -> usize {
        self.dim
    }

    pub fn as_slice(&self) -> &[f32] {
        &self.vec
    }

    pub fn into_vec(self) -> Vec<f32> {
        self.vec
    }

    pub fn norm(&self) -> f32 {
        l2_norm(&self.vec)
    }
}

impl AsRef<[f32]> for Embedding {
    fn as_ref(&self) -> &[f32] {
        &self.vec
    }
}

#[inline]
pub fn l2_norm(v: &[f32]) -> f32 {
    v.iter().map(|x| x * x).sum::<f32>().sqrt()
}

/// Scales `v` to unit L2 norm. A zero (or non-finite norm) vector is returned unchanged.
pub fn l2_normalize(v: &[f32]) -> Vec<f32> {
    let norm = l2_norm(v);
    if norm == 0.0 || !norm.is_finite() {
        return v.to_vec();
    }
    v.iter().map(|x| x / norm).collect()
}

/// Normalizes every row of `rows` in place.
pub fn normalize_rows(rows: &mut [Vec<f32>]) {
    for row in rows.iter_mut() {
        let norm = l2_norm(row);
        if norm > 0.0 && norm.is_finite() {
            row.iter_mut().for_each(|x| *x /= norm);
        }
    }
}

/// Trims or zero-pads `vec` to `target_dim`. A zero target yields an empty vector.
pub fn project_embedding(vec: &[f32], target_dim: usize) -> Vec<f32> {
    if target_dim == 0 {
        return Vec::new();
    }
    let mut out: Vec<f32> = vec.iter().copied().take(target_dim).collect();
    out.resize(target_dim, 0.0);
    out
}

/// Inner product of two equal-length slices.
#[inline]
pub fn dot(a: &[f32], b: &[f32]) -> f32 {
    a.iter().zip(b.iter()).map(|(x, y)| x * y).sum()
}
