//! Error types for tsdb-core

use std::fmt;
use thiserror::Error;

/// Core error types
#[derive(Debug, Error)]
pub enum CoreError {
    #[error("Empty measurement name")]
    EmptyMeasurement,

    #[error("Empty tag key")]
    EmptyTagKey,

    #[error("Duplicate tag key: {0}")]
    DuplicateTagKey(String),

    #[error("Empty field key")]
    EmptyFieldKey,

    #[error("No fields provided")]
    NoFields,

    #[error("Invalid regex pattern '{pattern}': {reason}")]
    InvalidPattern { pattern: String, reason: String },
}

/// Result type alias for core operations
pub type Result<T> = std::result::Result<T, CoreError>;

/// Classification of failures reported by the store and the executor.
///
/// Each crate's error type maps onto one of these through a `kind()` method so
/// callers can branch on the class without matching every variant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// Referenced shard, database, retention policy or user does not exist
    NotFound,
    /// Creating an entity whose identifier is already taken
    AlreadyExists,
    /// Persistence failed, or persisted state is unreadable
    IoFailure,
    /// The caller lacks the privileges for a statement
    AuthorizationDenied,
    /// A statement cannot be executed as written
    InvalidStatement,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ErrorKind::NotFound => "not found",
            ErrorKind::AlreadyExists => "already exists",
            ErrorKind::IoFailure => "i/o failure",
            ErrorKind::AuthorizationDenied => "authorization denied",
            ErrorKind::InvalidStatement => "invalid statement",
        };
        f.write_str(s)
    }
}

impl CoreError {
    /// Error class of this error. Every core error rejects the input.
    pub fn kind(&self) -> ErrorKind {
        ErrorKind::InvalidStatement
    }
}
