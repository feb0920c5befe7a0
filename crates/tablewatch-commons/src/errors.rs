//! Shared error types for tablewatch.
//!
//! These cover value parsing and payload decoding failures; engine-level
//! errors live in `tablewatch-core`.

use thiserror::Error;

/// Errors produced while parsing, converting or decoding values.
#[derive(Error, Debug)]
pub enum CommonError {
    #[error("Invalid value: {0}")]
    InvalidValue(String),

    #[error("Type mismatch for column '{column}': expected {expected}, got {got}")]
    TypeMismatch {
        column: String,
        expected: String,
        got: String,
    },

    #[error("Invalid payload: {0}")]
    InvalidPayload(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Result type for commons operations.
pub type Result<T> = std::result::Result<T, CommonError>;
