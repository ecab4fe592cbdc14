//! Error types for the core domain.

use thiserror::Error;

/// Core domain error type.
#[derive(Debug, Error)]
pub enum Error {
    #[error("invalid file name: {0}")]
    InvalidFileName(String),

    #[error("invalid file key: {0}")]
    InvalidFileKey(String),

    #[error("invalid file type: {0}")]
    InvalidFileType(String),

    #[error("invalid capability: {0}")]
    InvalidCapability(String),

    #[error("invalid upload state: {0}")]
    InvalidUploadState(String),
}

/// Result type alias for core operations.
pub type Result<T> = std::result::Result<T, Error>;
