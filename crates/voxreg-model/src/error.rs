//! Error types for model construction and evaluation.
//!
//! Configuration problems are reported when a model is built, never at the
//! first forward pass. Shape problems are reported before any tensor work.

use thiserror::Error;

/// Main error type for voxreg model operations.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ModelError {
    /// Backbone name not recognised.
    #[error("Unknown backbone: `{0}` (expected one of: local, unet)")]
    UnknownBackbone(String),

    /// Task method not recognised.
    #[error("Unknown method: `{0}` (expected one of: ddf, dvf, conditional, seg)")]
    UnknownMethod(String),

    /// Output activation not recognised.
    #[error("Unknown output activation: `{0}` (expected one of: \"\", linear, sigmoid, tanh, relu, softplus)")]
    UnknownActivation(String),

    /// Kernel initializer not recognised.
    #[error("Unknown kernel initializer: `{0}` (expected one of: zeros, glorot_uniform, glorot_normal, he_uniform, he_normal)")]
    UnknownInitializer(String),

    /// Image similarity loss not recognised.
    #[error("Unknown image similarity: `{0}` (expected one of: lncc, gncc, ssd)")]
    UnknownImageLoss(String),

    /// Label similarity loss not recognised.
    #[error("Unknown label similarity: `{0}` (expected one of: dice, jaccard, cross-entropy, mean-squared)")]
    UnknownLabelLoss(String),

    /// Regularization energy not recognised.
    #[error("Unknown regularization energy: `{0}` (expected one of: bending, gradient-l1, gradient-l2)")]
    UnknownEnergy(String),

    /// Extraction level outside the encoded range.
    #[error("Extraction level {level} outside encoded range [0, {max_level}]")]
    ExtractLevelOutOfRange { level: usize, max_level: usize },

    /// Invalid configuration.
    #[error("Invalid configuration: {0}")]
    InvalidConfiguration(String),

    /// Tensor shape does not match the configured shape.
    #[error("Shape mismatch for `{name}`: expected {expected:?}, got {actual:?}")]
    ShapeMismatch {
        name: String,
        expected: Vec<usize>,
        actual: Vec<usize>,
    },

    /// Configuration could not be parsed or loaded.
    #[error("Config error: {0}")]
    Config(String),
}

/// Result type for voxreg model operations.
pub type Result<T, E = ModelError> = std::result::Result<T, E>;

impl ModelError {
    /// Create an invalid configuration error.
    pub fn invalid_configuration(msg: impl Into<String>) -> Self {
        Self::InvalidConfiguration(msg.into())
    }

    /// Create a shape mismatch error.
    pub fn shape_mismatch(name: impl Into<String>, expected: &[usize], actual: &[usize]) -> Self {
        Self::ShapeMismatch {
            name: name.into(),
            expected: expected.to_vec(),
            actual: actual.to_vec(),
        }
    }

    /// Create a config parsing error.
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// True for errors raised while validating configuration.
    pub fn is_configuration(&self) -> bool {
        matches!(
            self,
            Self::UnknownBackbone(_)
                | Self::UnknownMethod(_)
                | Self::UnknownActivation(_)
                | Self::UnknownInitializer(_)
                | Self::UnknownImageLoss(_)
                | Self::UnknownLabelLoss(_)
                | Self::UnknownEnergy(_)
                | Self::ExtractLevelOutOfRange { .. }
                | Self::InvalidConfiguration(_)
                | Self::Config(_)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = ModelError::UnknownMethod("foo".to_string());
        assert!(err.to_string().contains("`foo`"));
        assert!(err.is_configuration());
    }

    #[test]
    fn test_shape_mismatch() {
        let err = ModelError::shape_mismatch("fixed_image", &[4, 8, 8, 8], &[4, 8, 8, 6]);
        let err_str = err.to_string();
        assert!(err_str.contains("fixed_image"));
        assert!(err_str.contains("expected"));
        assert!(!err.is_configuration());
    }

    #[test]
    fn test_result_alias_accepts_foreign_error() {
        fn parse(s: &str) -> Result<u8, std::num::ParseIntError> {
            s.parse()
        }
        assert_eq!(parse("7"), Ok(7));
        assert!(parse("x").is_err());

        let model: Result<u8> = Err(ModelError::config("bad"));
        assert!(model.is_err());
    }

    #[test]
    fn test_extract_level_display() {
        let err = ModelError::ExtractLevelOutOfRange { level: 3, max_level: 1 };
        assert_eq!(err.to_string(), "Extraction level 3 outside encoded range [0, 1]");
    }
}
