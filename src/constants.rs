//! Shared defaults: embedding width, quantization scale, temperature bounds and index
//! parameters.
//!
//! The embedding width is a runtime value; [`DimConfig`] carries it and
//! [`validate_embedding_dim`] checks vectors against it at component boundaries.

pub const DEFAULT_EMBEDDING_DIM: usize = 256;
pub const EMBEDDING_F32_BYTES: usize = DEFAULT_EMBEDDING_DIM * size_of::<f32>();
pub const EMBEDDING_I8_BYTES: usize = DEFAULT_EMBEDDING_DIM;

/// Symmetric int8 quantization scale: `round(clip(x * 127, -127, 127))`.
pub const QUANT_SCALE: f32 = 127.0;

/// Lower clamp for calibration temperatures.
pub const T_MIN: f64 = 0.5;
/// Upper clamp for calibration temperatures.
pub const T_MAX: f64 = 5.0;

pub const DEFAULT_HNSW_M: usize = 32;
pub const DEFAULT_EF_CONSTRUCTION: usize = 200;
pub const DEFAULT_BANK_SEED: u64 = 1234;

/// Floor for HNSW search breadth; the effective value is `max(64, 2k)`.
pub const MIN_EF_SEARCH: usize = 64;

pub const DEFAULT_ORACLE_MAXLEN: usize = 2048;
pub const DEFAULT_MEDOID_CAP: usize = 3;

/// Embedding width agreed on by the label bank, the embedder and the KB promoter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DimConfig {
    pub embedding_dim: usize,
}

impl Default for DimConfig {
    fn default() -> Self {
        Self::new(DEFAULT_EMBEDDING_DIM)
    }
}

impl DimConfig {
    pub const fn new(embedding_dim: usize) -> Self {
        Self { embedding_dim }
    }

    pub fn validate(&self) -> Result<(), DimValidationError> {
        match self.embedding_dim {
            0 => Err(DimValidationError::ZeroDimension),
            _ => Ok(()),
        }
    }

    /// Bytes per row in the f32 index.
    pub fn f32_bytes(&self) -> usize {
        self.embedding_dim * size_of::<f32>()
    }

    /// Bytes per row in the int8 vocab shadow.
    pub fn i8_bytes(&self) -> usize {
        self.embedding_dim
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DimValidationError {
    #[error("embedding dimension must be positive")]
    ZeroDimension,
    #[error("embedding has {actual} components, expected {expected}")]
    Mismatch { expected: usize, actual: usize },
}

/// Checks `embedding` against the expected width.
#[inline]
pub fn validate_embedding_dim(
    embedding: &[f32],
    expected: usize,
) -> Result<(), DimValidationError> {
    if embedding.len() == expected {
        Ok(())
    } else {
        Err(DimValidationError::Mismatch {
            expected,
            actual: embedding.len(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_vocab_row_is_quarter_of_index_row() {
        let config = DimConfig::default();
        assert_eq!(config.f32_bytes(), EMBEDDING_F32_BYTES);
        assert_eq!(config.i8_bytes(), EMBEDDING_I8_BYTES);
        assert_eq!(
            DimConfig::new(8).f32_bytes(),
            4 * DimConfig::new(8).i8_bytes()
        );
    }

    #[test]
    fn test_zero_dim_rejected() {
        assert_eq!(
            DimConfig::new(0).validate(),
            Err(DimValidationError::ZeroDimension)
        );
        assert!(DimConfig::new(1).validate().is_ok());
    }

    #[test]
    fn test_embedding_width_checked() {
        let v = [0.5f32; 8];
        assert!(validate_embedding_dim(&v, 8).is_ok());
        let err = validate_embedding_dim(&v, 16).unwrap_err();
        assert_eq!(err.to_string(), "embedding has 8 components, expected 16");
    }

    #[test]
    fn test_temperature_bounds_ordered() {
        assert!(0.0 < T_MIN && T_MIN < 1.0 && 1.0 < T_MAX);
    }
}
