//! Temp file repository.

use crate::error::MetadataResult;
use crate::models::{FileRecord, TempFileRow};
use async_trait::async_trait;
use loft_core::UploadState;
use time::OffsetDateTime;
use uuid::Uuid;

/// Repository for provisional uploads.
#[async_trait]
pub trait TempFileRepo: Send + Sync {
    /// Register a temp file.
    ///
    /// A second temp file for the same `(parent, owner, name)` is
    /// `AlreadyExists`; a missing parent is `NotFound`.
    async fn create_temp_file(&self, temp: &TempFileRow) -> MetadataResult<()>;

    /// Get a temp file by key.
    async fn get_temp_file(&self, file_key: Uuid) -> MetadataResult<Option<TempFileRow>>;

    /// Atomically move a temp file from `from` to `to`.
    ///
    /// Returns None if the temp file doesn't exist and the updated row
    /// otherwise. A temp file in any state other than `from` is
    /// `InvalidStateTransition` and is left untouched.
    async fn transition_temp_file(
        &self,
        file_key: Uuid,
        from: UploadState,
        to: UploadState,
        updated_at: OffsetDateTime,
    ) -> MetadataResult<Option<TempFileRow>>;

    /// Promote a merging temp file to a permanent block.
    ///
    /// In one transaction: create the block node (same key, owner, parent,
    /// name and size, full capabilities for the owner), then delete the temp
    /// row. `NotFound` if the temp file is gone.
    async fn promote_temp_file(
        &self,
        file_key: Uuid,
        now: OffsetDateTime,
    ) -> MetadataResult<FileRecord>;

    /// Delete a temp file. Returns whether a row existed.
    async fn delete_temp_file(&self, file_key: Uuid) -> MetadataResult<bool>;

    /// Delete a temp file only if it is still in one of `states` and was last
    /// updated before `older_than`. Returns whether the row was removed.
    ///
    /// A temp file that moved on since it was listed (claimed for merging,
    /// promoted, aborted) is left alone.
    async fn claim_stale_temp_file(
        &self,
        file_key: Uuid,
        states: &[UploadState],
        older_than: OffsetDateTime,
    ) -> MetadataResult<bool>;

    /// List temp files in one of `states` last updated before `older_than`,
    /// oldest first.
    async fn list_stale_temp_files(
        &self,
        states: &[UploadState],
        older_than: OffsetDateTime,
        limit: u32,
    ) -> MetadataResult<Vec<TempFileRow>>;

    /// Count temp files owned by a member.
    async fn count_temp_files(&self, owner_id: i64) -> MetadataResult<u64>;
}
