//! Error types for gridfit

use thiserror::Error;

/// Result type alias for gridfit operations
pub type Result<T> = std::result::Result<T, GridfitError>;

/// Main error type
#[derive(Error, Debug)]
pub enum GridfitError {
    #[error("Data error: {0}")]
    DataError(String),

    #[error("Training error: {0}")]
    TrainingError(String),

    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    SerializationError(String),

    #[error("Invalid shape: expected {expected}, got {actual}")]
    ShapeError { expected: String, actual: String },

    #[error("Model not fitted")]
    ModelNotFitted,

    #[error("Invalid parameter: {name} = {value}, {reason}")]
    InvalidParameter {
        name: String,
        value: String,
        reason: String,
    },

    #[error("Validation error: {0}")]
    ValidationError(String),

    #[error("Unknown classifier kind: {0}")]
    UnknownClassifier(String),

    #[error("Classifier {kind} does not support {problem} problems")]
    UnsupportedProblemType { kind: String, problem: String },
}

impl GridfitError {
    /// Shorthand for an invalid parameter error
    pub fn invalid_param(name: &str, value: impl ToString, reason: impl Into<String>) -> Self {
        GridfitError::InvalidParameter {
            name: name.to_string(),
            value: value.to_string(),
            reason: reason.into(),
        }
    }
}

impl From<polars::error::PolarsError> for GridfitError {
    fn from(err: polars::error::PolarsError) -> Self {
        GridfitError::DataError(err.to_string())
    }
}

impl From<serde_json::Error> for GridfitError {
    fn from(err: serde_json::Error) -> Self {
        GridfitError::SerializationError(err.to_string())
    }
}

impl From<bincode::Error> for GridfitError {
    fn from(err: bincode::Error) -> Self {
        GridfitError::SerializationError(err.to_string())
    }
}

impl From<ndarray::ShapeError> for GridfitError {
    fn from(err: ndarray::ShapeError) -> Self {
        GridfitError::ShapeError {
            expected: "valid shape".to_string(),
            actual: err.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = GridfitError::DataError("test error".to_string());
        assert_eq!(err.to_string(), "Data error: test error");
    }

    #[test]
    fn test_error_from_io() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "file not found");
        let err: GridfitError = io_err.into();
        assert!(matches!(err, GridfitError::IoError(_)));
    }

    #[test]
    fn test_invalid_param_display() {
        let err = GridfitError::invalid_param("n_neighbors", 0, "must be positive");
        assert_eq!(err.to_string(), "Invalid parameter: n_neighbors = 0, must be positive");
    }
}
