// Error types module
use thiserror::Error;

use crate::driver::DriverError;
use tablewatch_commons::CommonError;

/// Main error type for tablewatch.
///
/// Construction-time (configuration) errors are surfaced synchronously from
/// the call that detected them and prevent the dependency from ever starting.
/// Runtime errors reach callers only through the error listeners.
#[derive(Error, Debug)]
pub enum TableWatchError {
    #[error("Connection error: {0}")]
    Connection(String),

    #[error("Table not found: {0}")]
    TableNotFound(String),

    #[error("Table has no columns: {0}")]
    NoColumns(String),

    #[error("Unsupported column type: {0}")]
    UnsupportedColumnType(String),

    #[error("Model mapper error: {0}")]
    ModelMapper(String),

    #[error("No match between model properties and table columns")]
    NoMatchBetweenModelAndColumns,

    #[error("Invalid update-of column list: {0}")]
    UpdateOf(String),

    #[error("Invalid timeout: {0}")]
    InvalidTimeout(String),

    #[error("No change subscriber registered")]
    NoSubscriber,

    #[error("Provisioning failed at step '{step}': {reason}")]
    Provisioning { step: String, reason: String },

    #[error("Unsupported expression: {0}")]
    UnsupportedExpression(String),

    #[error("Unsupported method: {0}")]
    UnsupportedMethod(String),

    #[error("Decode error: {0}")]
    Decode(String),

    #[error("Driver error: {0}")]
    Driver(#[from] DriverError),

    #[error("Value error: {0}")]
    Value(#[from] CommonError),

    #[error("{0}")]
    Other(String),
}

/// Result type for tablewatch operations.
pub type Result<T> = std::result::Result<T, TableWatchError>;
