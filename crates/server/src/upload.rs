//! Upload orchestrator.
//!
//! An upload moves through `requested -> token_issued -> merging` on its temp
//! file row and ends either promoted to a permanent block or discarded:
//!
//! 1. [`UploadService::issue_write_token`] registers the temp file and stores
//!    `write:<token> -> file_key` in the token cache.
//! 2. The client sends chunks straight to the storage backend.
//! 3. [`UploadService::complete_upload`] asks the backend to merge, then
//!    promotes the temp file in one transaction.
//!
//! Once an upload reaches `merging`, every failure path discards both the
//! stored bytes and the temp file.

use crate::error::{ServiceError, ServiceResult};
use crate::metrics;
use base64::Engine;
use loft_core::{FileKey, MemberId, TokenPurpose, UploadState, validate_file_name};
use loft_metadata::MetadataStore;
use loft_metadata::models::{FileRecord, TempFileRow};
use loft_storage::{StorageBackend, TokenCache};
use rand::RngCore;
use std::sync::Arc;
use std::time::Duration;
use time::OffsetDateTime;
use tracing::instrument;

/// Token handed to a client for one upload.
#[derive(Clone, Debug)]
pub struct WriteGrant {
    pub token: String,
    pub file_key: FileKey,
    pub expires_in: Duration,
}

/// Generate a random token secret using cryptographically secure RNG.
fn generate_token() -> String {
    let mut bytes = [0u8; 32];
    rand::rng().fill_bytes(&mut bytes);
    base64::engine::general_purpose::URL_SAFE_NO_PAD.encode(bytes)
}

/// Coordinates temp files, the token cache and the storage backend.
#[derive(Clone)]
pub struct UploadService {
    metadata: Arc<dyn MetadataStore>,
    storage: Arc<dyn StorageBackend>,
    tokens: Arc<dyn TokenCache>,
    token_ttl: Duration,
}

impl UploadService {
    pub fn new(
        metadata: Arc<dyn MetadataStore>,
        storage: Arc<dyn StorageBackend>,
        tokens: Arc<dyn TokenCache>,
        token_ttl: Duration,
    ) -> Self {
        Self {
            metadata,
            storage,
            tokens,
            token_ttl,
        }
    }

    /// Register a pending upload of `file_name` under `parent_key` and issue
    /// a write token for it.
    ///
    /// Only one upload per `(member, parent, name)` may be in flight; a
    /// second request gets `Conflict`, as does a name already taken by a
    /// permanent file.
    #[instrument(skip(self), fields(member_id = %member_id, parent_key = %parent_key))]
    pub async fn issue_write_token(
        &self,
        member_id: MemberId,
        parent_key: FileKey,
        file_name: &str,
        byte_size: u64,
    ) -> ServiceResult<WriteGrant> {
        validate_file_name(file_name)?;
        let byte_size = i64::try_from(byte_size).map_err(|_| {
            ServiceError::InvalidRequest(format!("byte size {byte_size} is too large"))
        })?;

        let parent = self
            .metadata
            .get_file_by_key(parent_key.into_uuid())
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("parent {parent_key}")))?;
        if !parent.is_container() {
            return Err(ServiceError::InvalidRequest(format!(
                "parent {parent_key} is a {}, not a container",
                parent.file_type
            )));
        }
        if self
            .metadata
            .get_child_by_name(parent.id, file_name)
            .await?
            .is_some()
        {
            return Err(ServiceError::Conflict(format!(
                "'{file_name}' already exists in {parent_key}"
            )));
        }

        let now = OffsetDateTime::now_utc();
        let temp = TempFileRow::requested(member_id.get(), parent.id, file_name, byte_size, now);
        let file_key = temp.key();
        self.metadata.create_temp_file(&temp).await?;

        let token = generate_token();
        if let Err(e) = self
            .tokens
            .set_ex(
                &TokenPurpose::Write.cache_key(&token),
                &file_key.to_string(),
                self.token_ttl,
            )
            .await
        {
            tracing::warn!(file_key = %file_key, error = %e, "Failed to store write token");
            if let Err(cleanup) = self.metadata.delete_temp_file(file_key.into_uuid()).await {
                tracing::warn!(
                    file_key = %file_key,
                    error = %cleanup,
                    "Failed to remove temp file after token cache failure"
                );
            }
            metrics::record_upload_failure("token_cache");
            return Err(e.into());
        }

        self.metadata
            .transition_temp_file(
                file_key.into_uuid(),
                UploadState::Requested,
                UploadState::TokenIssued,
                OffsetDateTime::now_utc(),
            )
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("upload {file_key}")))?;

        metrics::UPLOADS_REQUESTED.inc();
        tracing::info!(file_key = %file_key, byte_size = byte_size, "Write token issued");

        Ok(WriteGrant {
            token,
            file_key,
            expires_in: self.token_ttl,
        })
    }

    /// Merge the uploaded chunks and promote the temp file to a block.
    #[instrument(skip(self), fields(file_key = %file_key, total_chunks = total_chunks))]
    pub async fn complete_upload(
        &self,
        file_key: FileKey,
        total_chunks: u32,
    ) -> ServiceResult<FileRecord> {
        // Atomically claim the upload. Only one completion can move it to
        // merging; the rest get a conflict.
        self.metadata
            .transition_temp_file(
                file_key.into_uuid(),
                UploadState::TokenIssued,
                UploadState::Merging,
                OffsetDateTime::now_utc(),
            )
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("upload {file_key}")))?;

        // From here on every error path must discard the upload.
        match self.storage.merge(file_key, total_chunks).await {
            Ok(reply) if reply.success => {
                tracing::debug!(file_key = %file_key, message = %reply.message, "Merge succeeded");
            }
            Ok(reply) => {
                tracing::warn!(file_key = %file_key, message = %reply.message, "Merge rejected");
                self.discard(file_key, "merge_rejected").await;
                return Err(ServiceError::Upstream(format!(
                    "merge of {file_key} rejected: {}",
                    reply.message
                )));
            }
            Err(e) => {
                tracing::warn!(file_key = %file_key, error = %e, "Merge request failed");
                self.discard(file_key, "merge_unreachable").await;
                return Err(e.into());
            }
        }

        match self
            .metadata
            .promote_temp_file(file_key.into_uuid(), OffsetDateTime::now_utc())
            .await
        {
            Ok(record) => {
                metrics::UPLOADS_COMPLETED.inc();
                tracing::info!(
                    file_key = %file_key,
                    file_id = record.id,
                    byte_size = record.byte_size,
                    "Upload completed"
                );
                Ok(record)
            }
            Err(e) => {
                tracing::error!(file_key = %file_key, error = %e, "Failed to promote merged upload");
                self.discard(file_key, "promotion_failed").await;
                Err(e.into())
            }
        }
    }

    /// Abandon a pending upload that has not started merging.
    #[instrument(skip(self), fields(file_key = %file_key))]
    pub async fn abort_upload(&self, file_key: FileKey) -> ServiceResult<()> {
        let temp = self
            .metadata
            .get_temp_file(file_key.into_uuid())
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("upload {file_key}")))?;
        if temp.upload_state()? == UploadState::Merging {
            return Err(ServiceError::Conflict(format!(
                "upload {file_key} is already merging"
            )));
        }
        self.discard(file_key, "aborted").await;
        Ok(())
    }

    /// Issue a read token for an existing block.
    #[instrument(skip(self), fields(file_key = %file_key))]
    pub async fn issue_read_token(&self, file_key: FileKey) -> ServiceResult<String> {
        let file = self
            .metadata
            .get_file_by_key(file_key.into_uuid())
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("file {file_key}")))?;
        if file.file_type != loft_core::FileType::Block.as_str() {
            return Err(ServiceError::InvalidRequest(format!(
                "file {file_key} is a {}, only blocks can be read",
                file.file_type
            )));
        }

        let token = generate_token();
        self.tokens
            .set_ex(
                &TokenPurpose::Read.cache_key(&token),
                &file_key.to_string(),
                self.token_ttl,
            )
            .await?;
        Ok(token)
    }

    /// Consume a token, returning the file key it was issued for.
    pub async fn redeem_token(&self, purpose: TokenPurpose, token: &str) -> ServiceResult<FileKey> {
        let value = self
            .tokens
            .take(&purpose.cache_key(token))
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("{} token", purpose.as_str())))?;
        FileKey::parse(&value).map_err(|e| {
            tracing::error!(error = %e, "Token cache holds a malformed file key");
            ServiceError::Internal(e.to_string())
        })
    }

    /// Best-effort removal of an upload's bytes and temp file.
    async fn discard(&self, file_key: FileKey, reason: &'static str) {
        match self.storage.delete(file_key).await {
            Ok(reply) if !reply.success => {
                tracing::warn!(
                    file_key = %file_key,
                    message = %reply.message,
                    "Storage refused to delete upload bytes"
                );
            }
            Ok(_) => {}
            Err(e) => {
                tracing::warn!(file_key = %file_key, error = %e, "Failed to delete upload bytes");
            }
        }

        if let Err(e) = self.metadata.delete_temp_file(file_key.into_uuid()).await {
            tracing::warn!(file_key = %file_key, error = %e, "Failed to delete temp file");
        }

        metrics::record_upload_failure(reason);
    }
}
