//! Collaborator seams used by the upload orchestrator.

use crate::error::StorageResult;
use async_trait::async_trait;
use loft_core::FileKey;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Reply to a merge or delete request.
///
/// A reply with `success = false` is a regular answer from a reachable
/// backend; transport failures surface as [`crate::StorageError`] instead.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct MergeReply {
    pub success: bool,
    #[serde(default)]
    pub message: String,
}

impl MergeReply {
    pub fn ok(message: impl Into<String>) -> Self {
        Self {
            success: true,
            message: message.into(),
        }
    }

    pub fn failed(message: impl Into<String>) -> Self {
        Self {
            success: false,
            message: message.into(),
        }
    }
}

/// Byte storage backend that owns uploaded chunks and merged objects.
///
/// Calls are made once; callers decide whether and how to compensate.
#[async_trait]
pub trait StorageBackend: Send + Sync {
    /// Concatenate chunks `0..total_chunks` of `file_key` into the final object.
    async fn merge(&self, file_key: FileKey, total_chunks: u32) -> StorageResult<MergeReply>;

    /// Remove every byte stored for `file_key`, chunks and merged object alike.
    async fn delete(&self, file_key: FileKey) -> StorageResult<MergeReply>;

    /// Short name for logs and metrics.
    fn backend_name(&self) -> &'static str;
}

/// Key/value store for short-lived upload tokens.
#[async_trait]
pub trait TokenCache: Send + Sync {
    /// Store `value` under `key` for `ttl`, replacing any previous value.
    async fn set_ex(&self, key: &str, value: &str, ttl: Duration) -> StorageResult<()>;

    /// Read a live value.
    async fn get(&self, key: &str) -> StorageResult<Option<String>>;

    /// Read and remove a live value in one step.
    async fn take(&self, key: &str) -> StorageResult<Option<String>>;

    /// Drop expired entries, returning how many were removed.
    ///
    /// Caches that expire entries on their own keep the default.
    async fn purge_expired(&self) -> StorageResult<usize> {
        Ok(0)
    }
}
