//! Storage error types.

use thiserror::Error;

/// Storage backend and token cache errors.
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("object not found: {0}")]
    NotFound(String),

    #[error("invalid key: {0}")]
    InvalidKey(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("invalid backend reply: {0}")]
    Decode(#[from] serde_json::Error),

    /// The backend answered, but not with a usable reply.
    #[error("backend error: {0}")]
    Backend(String),

    #[error("token cache is full ({0} entries)")]
    CapacityExceeded(usize),

    #[error("configuration error: {0}")]
    Config(String),
}

/// Result type for storage operations.
pub type StorageResult<T> = std::result::Result<T, StorageError>;
