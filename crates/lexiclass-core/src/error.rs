//! Error types for the LexiClass dispatch subsystem.

use thiserror::Error;
use uuid::Uuid;

/// Result type alias using the subsystem's Error type.
pub type Result<T> = std::result::Result<T, Error>;

/// Core error type for dispatch and consistency operations.
#[derive(Error, Debug)]
pub enum Error {
    /// Database operation failed (wraps sqlx::Error)
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// Resource not found
    #[error("Not found: {0}")]
    NotFound(String),

    /// Resource already exists (e.g. a caller-supplied document id)
    #[error("Conflict: {0}")]
    Conflict(String),

    /// Submitted input does not match the handler's declared input kind
    #[error("Invalid input kind: expected {expected}, got {got}")]
    InvalidInputKind {
        expected: &'static str,
        got: &'static str,
    },

    /// A bulk range has start > end
    #[error("Invalid range: start ({start}) must be <= end ({end})")]
    InvalidRange { start: i64, end: i64 },

    /// A bulk request resolved to an empty working set
    #[error("Empty batch: no ids or ranges provided")]
    EmptyBatch,

    /// A bulk working set exceeds the configured ceiling
    #[error("Batch too large: {requested} items requested, maximum is {max}")]
    BatchTooLarge { requested: usize, max: usize },

    /// Cancellation requested for a task already in a terminal state
    #[error("Task already completed: {0}")]
    AlreadyCompleted(Uuid),

    /// No READY model exists for the field
    #[error("No ready model for field: {0}")]
    NoReadyModel(Uuid),

    /// Content store operation failed
    #[error("Storage error: {0}")]
    Storage(String),

    /// File I/O operation failed
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization/deserialization error
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Configuration error (e.g. malformed rate limit expression)
    #[error("Configuration error: {0}")]
    Config(String),

    /// Internal error
    #[error("Internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Whether this error is attributable to caller input (4xx-equivalent)
    /// rather than a storage or internal fault.
    pub fn is_caller_error(&self) -> bool {
        matches!(
            self,
            Error::InvalidInputKind { .. }
                | Error::InvalidRange { .. }
                | Error::EmptyBatch
                | Error::BatchTooLarge { .. }
                | Error::AlreadyCompleted(_)
                | Error::NoReadyModel(_)
                | Error::NotFound(_)
                | Error::Conflict(_)
        )
    }
}

impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self {
        Error::Serialization(e.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display_invalid_input_kind() {
        let err = Error::InvalidInputKind {
            expected: "FieldTraining",
            got: "Indexing",
        };
        assert_eq!(
            err.to_string(),
            "Invalid input kind: expected FieldTraining, got Indexing"
        );
    }

    #[test]
    fn test_error_display_invalid_range() {
        let err = Error::InvalidRange { start: 12, end: 10 };
        assert_eq!(
            err.to_string(),
            "Invalid range: start (12) must be <= end (10)"
        );
    }

    #[test]
    fn test_error_display_empty_batch() {
        let err = Error::EmptyBatch;
        assert_eq!(err.to_string(), "Empty batch: no ids or ranges provided");
    }

    #[test]
    fn test_error_display_batch_too_large() {
        let err = Error::BatchTooLarge {
            requested: 1200,
            max: 1000,
        };
        assert_eq!(
            err.to_string(),
            "Batch too large: 1200 items requested, maximum is 1000"
        );
    }

    #[test]
    fn test_error_display_already_completed() {
        let id = Uuid::nil();
        let err = Error::AlreadyCompleted(id);
        assert_eq!(err.to_string(), format!("Task already completed: {}", id));
    }

    #[test]
    fn test_error_display_no_ready_model() {
        let id = Uuid::new_v4();
        let err = Error::NoReadyModel(id);
        assert!(err.to_string().contains(&id.to_string()));
    }

    #[test]
    fn test_error_display_storage() {
        let err = Error::Storage("write failed".to_string());
        assert_eq!(err.to_string(), "Storage error: write failed");
    }

    #[test]
    fn test_error_display_conflict() {
        let err = Error::Conflict("document 42 already exists".to_string());
        assert_eq!(err.to_string(), "Conflict: document 42 already exists");
    }

    #[test]
    fn test_caller_errors_classified() {
        assert!(Error::EmptyBatch.is_caller_error());
        assert!(Error::Conflict("dup".into()).is_caller_error());
        assert!(Error::InvalidRange { start: 2, end: 1 }.is_caller_error());
        assert!(Error::BatchTooLarge {
            requested: 501,
            max: 500
        }
        .is_caller_error());
        assert!(Error::AlreadyCompleted(Uuid::nil()).is_caller_error());
        assert!(Error::NoReadyModel(Uuid::nil()).is_caller_error());
        assert!(!Error::Internal("x".into()).is_caller_error());
        assert!(!Error::Storage("x".into()).is_caller_error());
    }

    #[test]
    fn test_from_serde_json_error() {
        let json_err = serde_json::from_str::<i32>("not a number").unwrap_err();
        let err: Error = json_err.into();
        assert!(matches!(err, Error::Serialization(_)));
    }

    #[test]
    fn test_from_io_error() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "missing");
        let err: Error = io_err.into();
        assert!(matches!(err, Error::Io(_)));
    }

    #[test]
    fn test_error_is_send_sync() {
        fn assert_send<T: Send>() {}
        fn assert_sync<T: Sync>() {}

        assert_send::<Error>();
        assert_sync::<Error>();
    }
}
