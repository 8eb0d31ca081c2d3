//! Error types and handling
//!
//! `CoreError` is what every lifecycle operation returns. Repository code
//! works in `anyhow::Result` and is folded into `CoreError::Storage` at the
//! service boundary.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum CoreError {
    #[error("Validation error: {0}")]
    Validation(String),

    #[error("{entity} not found: {id}")]
    NotFound { entity: &'static str, id: String },

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Invalid state: {0}")]
    InvalidState(String),

    #[error("IO error at {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Storage error: {0:#}")]
    Storage(#[from] anyhow::Error),
}

impl CoreError {
    pub fn not_found(entity: &'static str, id: impl Into<String>) -> Self {
        CoreError::NotFound {
            entity,
            id: id.into(),
        }
    }

    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        CoreError::Io {
            path: path.into(),
            source,
        }
    }

    /// Stable machine-readable code for the error kind
    pub fn code(&self) -> &'static str {
        match self {
            CoreError::Validation(_) => "VALIDATION_ERROR",
            CoreError::NotFound { .. } => "NOT_FOUND",
            CoreError::Conflict(_) => "CONFLICT",
            CoreError::InvalidState(_) => "INVALID_STATE",
            CoreError::Io { .. } => "IO_ERROR",
            CoreError::Storage(_) => "STORAGE_ERROR",
        }
    }
}

/// Error response handed back across the async command boundary
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub code: String,
    pub message: String,
}

impl From<CoreError> for ErrorResponse {
    fn from(error: CoreError) -> Self {
        ErrorResponse {
            code: error.code().to_string(),
            message: error.to_string(),
        }
    }
}

/// Result type alias using CoreError
pub type CoreResult<T> = Result<T, CoreError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_response_codes() {
        let response: ErrorResponse = CoreError::Conflict("recording already in progress".into()).into();
        assert_eq!(response.code, "CONFLICT");
        assert_eq!(response.message, "Conflict: recording already in progress");

        let response: ErrorResponse = CoreError::not_found("Activity", "abc").into();
        assert_eq!(response.code, "NOT_FOUND");
        assert_eq!(response.message, "Activity not found: abc");
    }

    #[test]
    fn test_storage_error_keeps_context_chain() {
        let err = anyhow::anyhow!("disk full").context("Failed to create activity");
        let core: CoreError = err.into();
        assert_eq!(core.code(), "STORAGE_ERROR");
        assert!(core.to_string().contains("Failed to create activity"));
        assert!(core.to_string().contains("disk full"));
    }
}
