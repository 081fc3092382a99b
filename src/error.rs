//! Errors reported by the controller core

use thiserror::Error;

#[derive(Debug, Error)]
pub enum PolicyError {
    /// An input disagrees with the controller's fixed state or action dimensionality
    #[error("shape mismatch for {what}: expected {expected}, got {actual}")]
    ShapeMismatch {
        what: &'static str,
        expected: usize,
        actual: usize,
    },

    #[error("training batch is empty")]
    EmptyBatch,

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("invalid action bounds: {0}")]
    InvalidBounds(String),

    /// Every candidate sequence scored NaN, so no action can be preferred
    #[error("all {candidates} candidate costs are non-finite")]
    NonFiniteCost { candidates: usize },

    #[error("invalid dataset statistics: {0}")]
    InvalidStatistics(String),

    /// Reading tensor values back to the host failed
    #[error("tensor data error: {0}")]
    TensorData(String),

    #[error("checkpoint error: {0}")]
    Checkpoint(String),
}

impl PolicyError {
    pub(crate) fn check_len(what: &'static str, expected: usize, actual: usize) -> Result<(), Self> {
        if expected == actual {
            Ok(())
        } else {
            Err(PolicyError::ShapeMismatch {
                what,
                expected,
                actual,
            })
        }
    }
}

pub type PolicyResult<T> = Result<T, PolicyError>;
