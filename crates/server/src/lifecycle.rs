//! File lifecycle service.
//!
//! Creation, renaming, moving, trashing and deletion of files in a member's
//! forest. Every operation maps to a single store transaction. Callers are
//! expected to have checked identity and capabilities already.

use crate::error::{ServiceError, ServiceResult};
use loft_core::{
    Capability, CapabilitySet, FileId, FileKey, FileType, MemberId, SpecialContainer,
    validate_file_name,
};
use loft_metadata::MetadataStore;
use loft_metadata::models::{FileRecord, NewNode};
use std::sync::Arc;
use time::OffsetDateTime;
use tracing::instrument;

/// File lifecycle operations over the metadata store.
#[derive(Clone)]
pub struct FileService {
    metadata: Arc<dyn MetadataStore>,
    max_search_depth: u32,
}

impl FileService {
    pub fn new(metadata: Arc<dyn MetadataStore>, max_search_depth: u32) -> Self {
        Self {
            metadata,
            max_search_depth,
        }
    }

    /// Look up a file by its external key.
    async fn resolve(&self, file_key: FileKey) -> ServiceResult<FileRecord> {
        self.metadata
            .get_file_by_key(file_key.into_uuid())
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("file {file_key}")))
    }

    async fn create(&self, node: NewNode) -> ServiceResult<FileRecord> {
        let record = self.metadata.create_node(&node).await?;
        tracing::debug!(
            file_id = record.id,
            file_key = %record.key(),
            file_type = %record.file_type,
            "File created"
        );
        Ok(record)
    }

    /// Create a container under `parent_id` with full capabilities for the creator.
    #[instrument(skip(self), fields(member_id = %member_id, parent_id = %parent_id))]
    pub async fn create_container(
        &self,
        member_id: MemberId,
        parent_id: FileId,
        file_name: &str,
    ) -> ServiceResult<FileRecord> {
        self.create(NewNode::container(
            member_id.get(),
            Some(parent_id.get()),
            file_name,
        ))
        .await
    }

    /// Create the parentless `root` container of a member.
    #[instrument(skip(self), fields(member_id = %member_id))]
    pub async fn create_root(&self, member_id: MemberId) -> ServiceResult<FileRecord> {
        self.create(NewNode::container(
            member_id.get(),
            None,
            SpecialContainer::Root.name(),
        ))
        .await
    }

    /// Create a block of known size, optionally under a pre-assigned key.
    #[instrument(skip(self), fields(owner_id = %owner_id, parent_id = %parent_id))]
    pub async fn create_block(
        &self,
        owner_id: MemberId,
        parent_id: FileId,
        file_name: &str,
        byte_size: u64,
        file_key: Option<FileKey>,
    ) -> ServiceResult<FileRecord> {
        let byte_size = i64::try_from(byte_size).map_err(|_| {
            ServiceError::InvalidRequest(format!("byte size {byte_size} is too large"))
        })?;
        self.create(NewNode {
            owner_id: owner_id.get(),
            file_name: file_name.to_string(),
            file_type: FileType::Block,
            parent_id: Some(parent_id.get()),
            byte_size,
            file_key: file_key.map(FileKey::into_uuid),
            grants: vec![(owner_id.get(), CapabilitySet::full())],
            link_target: None,
        })
        .await
    }

    /// Create a link to `target_id`. The target must exist.
    #[instrument(skip(self), fields(member_id = %member_id, parent_id = %parent_id, target_id = %target_id))]
    pub async fn create_link(
        &self,
        member_id: MemberId,
        parent_id: FileId,
        file_name: &str,
        target_id: FileId,
    ) -> ServiceResult<FileRecord> {
        self.create(NewNode {
            owner_id: member_id.get(),
            file_name: file_name.to_string(),
            file_type: FileType::Link,
            parent_id: Some(parent_id.get()),
            byte_size: 0,
            file_key: None,
            grants: vec![(member_id.get(), CapabilitySet::full())],
            link_target: Some(target_id.get()),
        })
        .await
    }

    #[instrument(skip(self), fields(file_key = %file_key))]
    pub async fn rename(&self, file_key: FileKey, new_name: &str) -> ServiceResult<FileRecord> {
        validate_file_name(new_name)?;
        let file = self.resolve(file_key).await?;
        self.metadata
            .rename(file.id, new_name, OffsetDateTime::now_utc())
            .await?;
        self.resolve(file_key).await
    }

    /// Move a file under another container.
    #[instrument(skip(self), fields(file_key = %file_key, new_parent_key = %new_parent_key))]
    pub async fn move_parent(
        &self,
        file_key: FileKey,
        new_parent_key: FileKey,
    ) -> ServiceResult<FileRecord> {
        let file = self.resolve(file_key).await?;
        let new_parent = self.resolve(new_parent_key).await?;
        self.metadata
            .reparent(file.id, new_parent.id, OffsetDateTime::now_utc())
            .await?;
        self.resolve(file_key).await
    }

    /// Move a file into the owner's trash.
    ///
    /// The owner must have exactly one trash container; anything else is an
    /// internal inconsistency and the file stays where it is.
    #[instrument(skip(self), fields(owner_id = %owner_id, file_key = %file_key))]
    pub async fn move_to_trash(
        &self,
        owner_id: MemberId,
        file_key: FileKey,
    ) -> ServiceResult<FileRecord> {
        let file = self.resolve(file_key).await?;
        let trash = self
            .metadata
            .reparent_to_special(
                file.id,
                owner_id.get(),
                SpecialContainer::Trash,
                OffsetDateTime::now_utc(),
            )
            .await?;
        tracing::info!(file_key = %file_key, trash_id = trash.id, "File moved to trash");
        self.resolve(file_key).await
    }

    /// Delete a file with all of its descendants. Returns the number of
    /// removed files, links pointing into the subtree included.
    #[instrument(skip(self), fields(file_key = %file_key))]
    pub async fn delete(&self, file_key: FileKey) -> ServiceResult<u64> {
        let file = self.resolve(file_key).await?;
        let removed = self.metadata.delete_subtree(file.id).await?;
        tracing::info!(file_key = %file_key, removed = removed, "File deleted");
        Ok(removed)
    }

    pub async fn get(&self, file_key: FileKey) -> ServiceResult<FileRecord> {
        self.resolve(file_key).await
    }

    pub async fn list_children(&self, file_key: FileKey) -> ServiceResult<Vec<FileRecord>> {
        let file = self.resolve(file_key).await?;
        Ok(self.metadata.get_children(file.id).await?)
    }

    /// Nearest descendants named `file_name`, searched level by level.
    pub async fn find_by_name(
        &self,
        file_key: FileKey,
        file_name: &str,
    ) -> ServiceResult<Vec<FileRecord>> {
        let file = self.resolve(file_key).await?;
        Ok(self
            .metadata
            .find_descendants_by_name(file.id, file_name, self.max_search_depth)
            .await?)
    }

    pub async fn parent_of(&self, file_key: FileKey) -> ServiceResult<FileRecord> {
        let file = self.resolve(file_key).await?;
        Ok(self.metadata.get_parent(file.id).await?)
    }

    /// Ancestors of a file, root first.
    pub async fn path_of(&self, file_key: FileKey) -> ServiceResult<Vec<FileRecord>> {
        let file = self.resolve(file_key).await?;
        Ok(self.metadata.get_path(file.id).await?)
    }

    /// Follow a link to its target.
    pub async fn resolve_link(&self, file_key: FileKey) -> ServiceResult<FileRecord> {
        let file = self.resolve(file_key).await?;
        self.metadata
            .get_link_target(file.id)
            .await?
            .ok_or_else(|| ServiceError::InvalidRequest(format!("file {file_key} is not a link")))
    }

    pub async fn special_container(
        &self,
        owner_id: MemberId,
        kind: SpecialContainer,
    ) -> ServiceResult<FileRecord> {
        Ok(self
            .metadata
            .get_special_container(owner_id.get(), kind)
            .await?)
    }

    /// Whether `member_id` holds `capability` on this exact file.
    pub async fn check(
        &self,
        member_id: MemberId,
        file_key: FileKey,
        capability: Capability,
    ) -> ServiceResult<bool> {
        let file = self.resolve(file_key).await?;
        Ok(self
            .metadata
            .check(member_id.get(), file.id, capability)
            .await?)
    }

    /// Replace the capability set `member_id` holds on a file.
    #[instrument(skip(self), fields(file_key = %file_key, member_id = %member_id, capabilities = %capabilities))]
    pub async fn share(
        &self,
        file_key: FileKey,
        member_id: MemberId,
        capabilities: &CapabilitySet,
    ) -> ServiceResult<()> {
        let file = self.resolve(file_key).await?;
        self.metadata
            .grant(member_id.get(), file.id, capabilities)
            .await?;
        Ok(())
    }
}
