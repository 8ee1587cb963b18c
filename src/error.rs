//! Error types for the ledgerml training engine

use thiserror::Error;

use crate::export::SerializedModel;

/// Result type alias for ledgerml operations
pub type Result<T> = std::result::Result<T, LedgerMlError>;

/// Main error type for the training engine
#[derive(Error, Debug)]
pub enum LedgerMlError {
    #[error("Data error: {0}")]
    DataError(String),

    #[error("Dataset is empty: {0}")]
    EmptyDataset(String),

    #[error("Degenerate labels: {0}")]
    DegenerateLabels(String),

    #[error("Invalid shape: expected {expected}, got {actual}")]
    ShapeError { expected: String, actual: String },

    #[error("Invalid parameter: {name} = {value}, {reason}")]
    InvalidParameter {
        name: String,
        value: String,
        reason: String,
    },

    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Training error: {0}")]
    TrainingError(String),

    #[error("Model not fitted")]
    ModelNotFitted,

    #[error("Not found: {0}")]
    NotFound(String),

    /// The model trained successfully but could not be written. The artifact
    /// is handed back so the save can be retried without retraining.
    #[error("Model trained but failed to persist to {location}: {reason}")]
    PersistenceFailed {
        location: String,
        reason: String,
        artifact: Box<SerializedModel>,
    },

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    SerializationError(String),

    #[error("Thread pool error: {0}")]
    ThreadPoolError(String),
}

impl LedgerMlError {
    /// Convenience constructor for parameter validation failures
    pub fn invalid_parameter(
        name: impl Into<String>,
        value: impl ToString,
        reason: impl Into<String>,
    ) -> Self {
        LedgerMlError::InvalidParameter {
            name: name.into(),
            value: value.to_string(),
            reason: reason.into(),
        }
    }
}

impl From<serde_json::Error> for LedgerMlError {
    fn from(err: serde_json::Error) -> Self {
        LedgerMlError::SerializationError(err.to_string())
    }
}

impl From<bincode::Error> for LedgerMlError {
    fn from(err: bincode::Error) -> Self {
        LedgerMlError::SerializationError(err.to_string())
    }
}

impl From<polars::error::PolarsError> for LedgerMlError {
    fn from(err: polars::error::PolarsError) -> Self {
        LedgerMlError::DataError(err.to_string())
    }
}

impl From<rayon::ThreadPoolBuildError> for LedgerMlError {
    fn from(err: rayon::ThreadPoolBuildError) -> Self {
        LedgerMlError::ThreadPoolError(err.to_string())
    }
}
