//! Meta store errors

use thiserror::Error;
use tsdb_core::ErrorKind;

#[derive(Debug, Error)]
pub enum MetaError {
    #[error("database not found: {0}")]
    DatabaseNotFound(String),

    #[error("database already exists: {0}")]
    DatabaseExists(String),

    #[error("retention policy not found: {0}")]
    RetentionPolicyNotFound(String),

    #[error("retention policy already exists: {0}")]
    RetentionPolicyExists(String),

    #[error("shard group already exists: {0}")]
    ShardGroupExists(u64),

    #[error("user not found: {0}")]
    UserNotFound(String),

    #[error("user already exists: {0}")]
    UserExists(String),

    #[error("username required")]
    UsernameRequired,

    #[error("authentication failed")]
    AuthenticationFailed,

    #[error("meta store unavailable: {0}")]
    Unavailable(String),
}

/// Result type for meta store operations
pub type Result<T> = std::result::Result<T, MetaError>;

impl MetaError {
    /// Error class of this error
    pub fn kind(&self) -> ErrorKind {
        match self {
            MetaError::DatabaseNotFound(_)
            | MetaError::RetentionPolicyNotFound(_)
            | MetaError::UserNotFound(_) => ErrorKind::NotFound,
            MetaError::DatabaseExists(_)
            | MetaError::RetentionPolicyExists(_)
            | MetaError::ShardGroupExists(_)
            | MetaError::UserExists(_) => ErrorKind::AlreadyExists,
            MetaError::UsernameRequired => ErrorKind::InvalidStatement,
            MetaError::AuthenticationFailed => ErrorKind::AuthorizationDenied,
            MetaError::Unavailable(_) => ErrorKind::IoFailure,
        }
    }
}
