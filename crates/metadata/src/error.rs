//! Metadata store error types.

use thiserror::Error;

/// Metadata store operation errors.
#[derive(Debug, Error)]
pub enum MetadataError {
    #[error("not found: {0}")]
    NotFound(String),

    #[error("already exists: {0}")]
    AlreadyExists(String),

    /// Zero or several rows where exactly one is an invariant.
    #[error("internal inconsistency: {0}")]
    Inconsistent(String),

    #[error("invalid move: {0}")]
    InvalidMove(String),

    #[error("invalid parent: {0}")]
    InvalidParent(String),

    #[error("invalid state transition: {from} -> {to}")]
    InvalidStateTransition { from: String, to: String },

    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("configuration error: {0}")]
    Config(String),

    #[error(transparent)]
    Core(#[from] loft_core::Error),
}

impl MetadataError {
    /// Classify a failed write: unique violations become `AlreadyExists`,
    /// foreign key violations become `NotFound`, everything else stays a
    /// database error.
    pub(crate) fn from_write(err: sqlx::Error, what: impl Into<String>) -> Self {
        if let sqlx::Error::Database(db) = &err {
            if db.is_unique_violation() {
                return Self::AlreadyExists(what.into());
            }
            if db.is_foreign_key_violation() {
                return Self::NotFound(format!("referenced row missing for {}", what.into()));
            }
        }
        Self::Database(err)
    }
}

/// Result type for metadata operations.
pub type MetadataResult<T> = std::result::Result<T, MetadataError>;
