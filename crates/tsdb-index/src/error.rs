//! Index error types

use thiserror::Error;

/// Index errors
#[derive(Debug, Error)]
pub enum IndexError {
    #[error("Invalid data: {0}")]
    InvalidData(String),
}

/// Result type for index operations
pub type Result<T> = std::result::Result<T, IndexError>;
