//! Error types for training sessions.

use thiserror::Error;
use voxreg_model::ModelError;

/// Main error type for voxreg training operations.
#[derive(Error, Debug)]
pub enum TrainError {
    /// Model construction or evaluation failed.
    #[error(transparent)]
    Model(#[from] ModelError),

    /// Invalid session configuration.
    #[error("Invalid session configuration: {0}")]
    InvalidConfiguration(String),

    /// The loss was NaN or infinite; no update was applied.
    #[error("Non-finite loss {value} at step {step}")]
    NonFiniteLoss { step: usize, value: f64 },

    /// Checkpoint or config backup could not be written or read.
    #[error("Checkpoint error: {0}")]
    Checkpoint(String),

    /// The batch produced no loss terms, so there is nothing to differentiate.
    #[error("No loss terms at step {step}: a `{method}` batch needs a fixed label")]
    NoLossTerms { step: usize, method: String },

    /// An epoch iterator yielded no batches.
    #[error("Epoch {epoch} produced no batches")]
    EmptyEpoch { epoch: usize },
}

/// Result type for voxreg training operations.
pub type Result<T, E = TrainError> = std::result::Result<T, E>;

impl TrainError {
    /// Create an invalid configuration error.
    pub fn invalid_configuration(msg: impl Into<String>) -> Self {
        Self::InvalidConfiguration(msg.into())
    }

    /// Create a checkpoint error.
    pub fn checkpoint(msg: impl Into<String>) -> Self {
        Self::Checkpoint(msg.into())
    }
}
