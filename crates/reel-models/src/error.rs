//! Validation errors raised before any engine process is spawned.

use thiserror::Error;

pub type ValidationResult<T> = Result<T, ValidationError>;

/// A request that was rejected before a job was created.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("No input provided")]
    NoInput,

    #[error("{operation} expects {expected} input(s), got {actual}")]
    InputCount {
        operation: &'static str,
        expected: &'static str,
        actual: usize,
    },

    #[error("Invalid option `{field}`: {reason}")]
    InvalidOption { field: &'static str, reason: String },

    #[error("Invalid job id: {0}")]
    InvalidJobId(String),
}

impl ValidationError {
    pub fn invalid_option(field: &'static str, reason: impl Into<String>) -> Self {
        Self::InvalidOption {
            field,
            reason: reason.into(),
        }
    }
}
