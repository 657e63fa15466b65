//! Storage errors

use portrait_core::PipelineError;
use thiserror::Error;

/// Storage operation errors
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Rename {from} -> {to} failed: {reason}")]
    Rename {
        from: String,
        to: String,
        reason: String,
    },

    #[error("Write failed: {0}")]
    WriteFailed(String),

    #[error("Invalid storage key: {0}")]
    InvalidKey(String),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Configuration error: {0}")]
    ConfigError(String),
}

/// Result type for storage operations
pub type StorageResult<T> = Result<T, StorageError>;

impl From<StorageError> for PipelineError {
    fn from(err: StorageError) -> Self {
        match err {
            StorageError::Rename { .. } => PipelineError::Rename(err.to_string()),
            other => PipelineError::Internal(other.to_string()),
        }
    }
}
