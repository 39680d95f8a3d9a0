//! Query error types

use thiserror::Error;
use tsdb_core::ErrorKind;

/// Query errors
#[derive(Debug, Error)]
pub enum QueryError {
    #[error("{0}")]
    Authorization(String),

    #[error("meta store not set")]
    NoMetaStore,

    #[error("database name required")]
    DatabaseRequired,

    #[error("database not found: {0}")]
    DatabaseNotFound(String),

    #[error("retention policy not found: {database}.{name}")]
    RetentionPolicyNotFound { database: String, name: String },

    #[error("invalid statement: {0}")]
    InvalidStatement(String),

    #[error("Storage error: {0}")]
    Storage(#[from] tsdb_storage::StorageError),

    #[error("Meta error: {0}")]
    Meta(#[from] tsdb_meta::MetaError),

    #[error("Execution error: {0}")]
    Execution(String),
}

/// Result type for query operations
pub type Result<T> = std::result::Result<T, QueryError>;

impl QueryError {
    /// Error class of this error
    pub fn kind(&self) -> ErrorKind {
        match self {
            QueryError::Authorization(_) => ErrorKind::AuthorizationDenied,
            QueryError::NoMetaStore
            | QueryError::DatabaseRequired
            | QueryError::InvalidStatement(_) => ErrorKind::InvalidStatement,
            QueryError::DatabaseNotFound(_) | QueryError::RetentionPolicyNotFound { .. } => {
                ErrorKind::NotFound
            }
            QueryError::Storage(e) => e.kind(),
            QueryError::Meta(e) => e.kind(),
            QueryError::Execution(_) => ErrorKind::IoFailure,
        }
    }
}
