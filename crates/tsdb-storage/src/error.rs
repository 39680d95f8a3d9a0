//! Storage error types

use thiserror::Error;
use tsdb_core::ErrorKind;

/// Storage errors
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("shard not found: {0}")]
    ShardNotFound(u64),

    #[error("shard already exists: {0}")]
    ShardExists(u64),

    #[error("WAL corrupted: {0}")]
    WalCorrupted(String),

    #[error("Snapshot corrupted: {0}")]
    SnapshotCorrupted(String),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("store is closed")]
    Closed,

    #[error("shard {0} is closed")]
    ShardClosed(u64),

    #[error("Core error: {0}")]
    Core(#[from] tsdb_core::CoreError),

    #[error("Index error: {0}")]
    Index(#[from] tsdb_index::IndexError),
}

/// Result type for storage operations
pub type Result<T> = std::result::Result<T, StorageError>;

impl From<bincode::Error> for StorageError {
    fn from(e: bincode::Error) -> Self {
        StorageError::Serialization(e.to_string())
    }
}

impl StorageError {
    /// Error class of this error
    pub fn kind(&self) -> ErrorKind {
        match self {
            StorageError::ShardNotFound(_) => ErrorKind::NotFound,
            StorageError::ShardExists(_) => ErrorKind::AlreadyExists,
            StorageError::Core(e) => e.kind(),
            _ => ErrorKind::IoFailure,
        }
    }
}
