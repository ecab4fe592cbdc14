//! Storage backend and token cache stubs.

use async_trait::async_trait;
use loft_core::{FileKey, UploadState};
use loft_metadata::MetadataStore;
use loft_storage::{MergeReply, StorageBackend, StorageError, StorageResult, TokenCache};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use time::OffsetDateTime;

/// How a [`StubBackend`] answers merge requests.
#[derive(Clone, Debug)]
#[allow(dead_code)]
pub enum MergeBehavior {
    Succeed,
    Reject(String),
    Unreachable,
}

/// Storage backend that records every call and answers merges as configured.
/// Note: #[allow(dead_code)] because each test file compiles common/ separately.
#[allow(dead_code)]
pub struct StubBackend {
    behavior: MergeBehavior,
    merges: Mutex<Vec<(FileKey, u32)>>,
    deletes: Mutex<Vec<FileKey>>,
    on_delete: Mutex<Option<CompleteOnDelete>>,
}

/// Completes `upload` the moment `trigger` is deleted.
#[allow(dead_code)]
struct CompleteOnDelete {
    trigger: FileKey,
    upload: FileKey,
    metadata: Arc<dyn MetadataStore>,
}

#[allow(dead_code)]
impl StubBackend {
    pub fn new(behavior: MergeBehavior) -> Self {
        Self {
            behavior,
            merges: Mutex::new(Vec::new()),
            deletes: Mutex::new(Vec::new()),
            on_delete: Mutex::new(None),
        }
    }

    pub fn succeeding() -> Self {
        Self::new(MergeBehavior::Succeed)
    }

    pub fn merges(&self) -> Vec<(FileKey, u32)> {
        self.merges.lock().unwrap().clone()
    }

    pub fn deletes(&self) -> Vec<FileKey> {
        self.deletes.lock().unwrap().clone()
    }

    /// When `trigger` is deleted, claim and promote the pending `upload` as a
    /// concurrent completion would.
    pub fn complete_upload_on_delete(
        &self,
        trigger: FileKey,
        upload: FileKey,
        metadata: Arc<dyn MetadataStore>,
    ) {
        *self.on_delete.lock().unwrap() = Some(CompleteOnDelete {
            trigger,
            upload,
            metadata,
        });
    }
}

#[async_trait]
impl StorageBackend for StubBackend {
    async fn merge(&self, file_key: FileKey, total_chunks: u32) -> StorageResult<MergeReply> {
        self.merges.lock().unwrap().push((file_key, total_chunks));
        match &self.behavior {
            MergeBehavior::Succeed => Ok(MergeReply::ok(format!("merged {total_chunks} chunks"))),
            MergeBehavior::Reject(msg) => Ok(MergeReply::failed(msg.clone())),
            MergeBehavior::Unreachable => Err(StorageError::Backend(
                "connection refused".to_string(),
            )),
        }
    }

    async fn delete(&self, file_key: FileKey) -> StorageResult<MergeReply> {
        self.deletes.lock().unwrap().push(file_key);
        let hook = {
            let mut guard = self.on_delete.lock().unwrap();
            match guard.as_ref() {
                Some(hook) if hook.trigger == file_key => guard.take(),
                _ => None,
            }
        };
        if let Some(hook) = hook {
            let now = OffsetDateTime::now_utc();
            let key = hook.upload.into_uuid();
            hook.metadata
                .transition_temp_file(key, UploadState::TokenIssued, UploadState::Merging, now)
                .await
                .unwrap()
                .unwrap();
            hook.metadata.promote_temp_file(key, now).await.unwrap();
        }
        Ok(MergeReply::ok("deleted"))
    }

    fn backend_name(&self) -> &'static str {
        "stub"
    }
}

/// Token cache whose writes always fail.
#[allow(dead_code)]
pub struct BrokenTokenCache;

#[async_trait]
impl TokenCache for BrokenTokenCache {
    async fn set_ex(&self, _key: &str, _value: &str, _ttl: Duration) -> StorageResult<()> {
        Err(StorageError::Backend("token cache unavailable".to_string()))
    }

    async fn get(&self, _key: &str) -> StorageResult<Option<String>> {
        Ok(None)
    }

    async fn take(&self, _key: &str) -> StorageResult<Option<String>> {
        Ok(None)
    }
}
