//! Service error types.

use loft_metadata::MetadataError;
use loft_storage::StorageError;

/// Error returned by every service operation.
///
/// Lower-layer errors are classified through the `From` impls below so that
/// callers only ever see these five kinds.
#[derive(Debug, thiserror::Error)]
pub enum ServiceError {
    #[error("not found: {0}")]
    NotFound(String),

    #[error("conflict: {0}")]
    Conflict(String),

    #[error("invalid request: {0}")]
    InvalidRequest(String),

    /// Broken invariant or unexpected store failure. The detail is for logs
    /// only and is not part of the message.
    #[error("internal error")]
    Internal(String),

    /// The storage backend or token cache failed or refused.
    #[error("upstream failure: {0}")]
    Upstream(String),
}

impl ServiceError {
    /// Stable code for programmatic handling.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::NotFound(_) => "not_found",
            Self::Conflict(_) => "conflict",
            Self::InvalidRequest(_) => "invalid_request",
            Self::Internal(_) => "internal_inconsistency",
            Self::Upstream(_) => "upstream_failure",
        }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound(_))
    }

    pub fn is_conflict(&self) -> bool {
        matches!(self, Self::Conflict(_))
    }
}

impl From<MetadataError> for ServiceError {
    fn from(err: MetadataError) -> Self {
        match err {
            MetadataError::NotFound(msg) => Self::NotFound(msg),
            MetadataError::AlreadyExists(msg) => Self::Conflict(msg),
            MetadataError::InvalidStateTransition { from, to } => {
                Self::Conflict(format!("upload is {from}, cannot move to {to}"))
            }
            MetadataError::InvalidMove(msg) | MetadataError::InvalidParent(msg) => {
                Self::InvalidRequest(msg)
            }
            MetadataError::Core(e) => Self::InvalidRequest(e.to_string()),
            MetadataError::Inconsistent(msg) => {
                tracing::error!(detail = %msg, "Metadata inconsistency detected");
                Self::Internal(msg)
            }
            other => {
                tracing::error!(error = %other, "Metadata store failure");
                Self::Internal(other.to_string())
            }
        }
    }
}

impl From<StorageError> for ServiceError {
    fn from(err: StorageError) -> Self {
        match err {
            StorageError::Config(msg) => Self::Internal(msg),
            other => Self::Upstream(other.to_string()),
        }
    }
}

impl From<loft_core::Error> for ServiceError {
    fn from(err: loft_core::Error) -> Self {
        Self::InvalidRequest(err.to_string())
    }
}

/// Result type for service operations.
pub type ServiceResult<T> = std::result::Result<T, ServiceError>;
