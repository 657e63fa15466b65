//! Error types module
//!
//! `PipelineError` is the error taxonomy of the acquisition pipeline. Leaf crates keep
//! their own error enums (fetch, storage, repository, resolver) and convert into it at
//! the orchestrator boundary.

/// Log level for error reporting
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogLevel {
    /// Debug level - for expected errors like validation failures
    Debug,
    /// Warning level - for recoverable issues like an unreachable remote
    Warn,
    /// Error level - for unexpected failures
    Error,
}

/// Metadata for error responses - defines how an error should be presented
pub trait ErrorMetadata {
    /// HTTP status code to return
    fn http_status_code(&self) -> u16;

    /// Machine-readable error code (e.g., "FETCH_ERROR")
    fn error_code(&self) -> &'static str;

    /// Whether this error is recoverable (can be retried)
    fn is_recoverable(&self) -> bool;

    /// Client-facing message (may differ from internal error message)
    fn client_message(&self) -> String;

    /// Log level for this error
    fn log_level(&self) -> LogLevel;
}

#[derive(Debug, Clone, thiserror::Error)]
pub enum PipelineError {
    #[error("Fetch failed: {0}")]
    Fetch(String),

    #[error("Not an image: {0}")]
    Validation(String),

    #[error("Entity {0} has no image claim")]
    NoImage(String),

    #[error("Persistence failed: {0}")]
    Persistence(String),

    #[error("Rename failed: {0}")]
    Rename(String),

    #[error("Derivative generation failed: {0}")]
    Derivative(String),

    #[error("Invalid entity id: {0}")]
    InvalidEntity(String),

    #[error("Entity resolution failed: {0}")]
    Resolution(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl From<std::io::Error> for PipelineError {
    fn from(err: std::io::Error) -> Self {
        PipelineError::Internal(format!("IO error: {}", err))
    }
}

impl From<anyhow::Error> for PipelineError {
    fn from(err: anyhow::Error) -> Self {
        PipelineError::Internal(err.to_string())
    }
}

/// Static metadata for each variant: (http_status, error_code, recoverable, log_level).
fn pipeline_error_static_metadata(err: &PipelineError) -> (u16, &'static str, bool, LogLevel) {
    match err {
        PipelineError::Fetch(_) => (502, "FETCH_ERROR", true, LogLevel::Warn),
        PipelineError::Validation(_) => (400, "VALIDATION_ERROR", false, LogLevel::Debug),
        PipelineError::NoImage(_) => (404, "NO_IMAGE", false, LogLevel::Debug),
        PipelineError::Persistence(_) => (500, "PERSISTENCE_ERROR", true, LogLevel::Error),
        PipelineError::Rename(_) => (500, "RENAME_ERROR", true, LogLevel::Error),
        PipelineError::Derivative(_) => (500, "DERIVATIVE_ERROR", true, LogLevel::Warn),
        PipelineError::InvalidEntity(_) => (400, "INVALID_ENTITY", false, LogLevel::Debug),
        PipelineError::Resolution(_) => (502, "RESOLUTION_ERROR", true, LogLevel::Warn),
        PipelineError::Internal(_) => (500, "INTERNAL_ERROR", true, LogLevel::Error),
    }
}

impl ErrorMetadata for PipelineError {
    fn http_status_code(&self) -> u16 {
        pipeline_error_static_metadata(self).0
    }

    fn error_code(&self) -> &'static str {
        pipeline_error_static_metadata(self).1
    }

    fn is_recoverable(&self) -> bool {
        pipeline_error_static_metadata(self).2
    }

    fn client_message(&self) -> String {
        match self {
            PipelineError::Fetch(_) => "URL invalid.".to_string(),
            PipelineError::Validation(_) => "You can only upload images.".to_string(),
            PipelineError::NoImage(entity) => format!("Entity {} has no image.", entity),
            PipelineError::InvalidEntity(entity) => {
                format!("The Entity ID {} is invalid.", entity)
            }
            PipelineError::Resolution(_) => {
                "The entity could not be looked up. Please try again later.".to_string()
            }
            PipelineError::Persistence(_)
            | PipelineError::Rename(_)
            | PipelineError::Internal(_) => {
                "The image could not be saved. Please try again later.".to_string()
            }
            PipelineError::Derivative(_) => "Facecrop failed.".to_string(),
        }
    }

    fn log_level(&self) -> LogLevel {
        pipeline_error_static_metadata(self).3
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_no_image_message_names_the_entity() {
        let err = PipelineError::NoImage("Q2".into());
        assert_eq!(err.client_message(), "Entity Q2 has no image.");
        assert!(!err.is_recoverable());
    }

    #[test]
    fn test_client_messages_do_not_leak_details() {
        let err = PipelineError::Persistence("disk I/O error at /var/lib/portrait.db".into());
        assert!(!err.client_message().contains("/var/lib"));
        assert_eq!(err.http_status_code(), 500);
        assert_eq!(err.error_code(), "PERSISTENCE_ERROR");
    }

    #[test]
    fn test_invalid_entity_message_names_the_id() {
        let err = PipelineError::InvalidEntity("X12".into());
        assert_eq!(err.client_message(), "The Entity ID X12 is invalid.");
        assert_eq!(err.log_level(), LogLevel::Debug);
    }
}
