//! File forest repository.

use crate::error::MetadataResult;
use crate::models::{FileRecord, NewNode};
use async_trait::async_trait;
use loft_core::SpecialContainer;
use time::OffsetDateTime;
use uuid::Uuid;

/// Repository for the file forest: nodes, paths and closure edges.
#[async_trait]
pub trait HierarchyRepo: Send + Sync {
    /// Create a node with its info, path, closure edge, initial grants and
    /// link target in one transaction.
    ///
    /// Returns `AlreadyExists` when the parent already has a child with the
    /// same name (or, for parentless nodes, the owner already has a root-level
    /// node with that name), and `NotFound` when the parent or link target is
    /// missing. On any error nothing is written.
    async fn create_node(&self, node: &NewNode) -> MetadataResult<FileRecord>;

    /// Get a file by internal ID.
    async fn get_file(&self, file_id: i64) -> MetadataResult<Option<FileRecord>>;

    /// Get a file by its external key.
    async fn get_file_by_key(&self, file_key: Uuid) -> MetadataResult<Option<FileRecord>>;

    /// Get the direct parent of a file.
    ///
    /// Exactly one closure row must name the file as child; anything else is
    /// reported as `Inconsistent`.
    async fn get_parent(&self, file_id: i64) -> MetadataResult<FileRecord>;

    /// Get the direct children of a file, ordered by name.
    async fn get_children(&self, file_id: i64) -> MetadataResult<Vec<FileRecord>>;

    /// Get the direct child with the given name, if any.
    async fn get_child_by_name(
        &self,
        parent_id: i64,
        file_name: &str,
    ) -> MetadataResult<Option<FileRecord>>;

    /// Breadth-first search below `file_id` for files named `file_name`.
    ///
    /// Returns every match of the shallowest level that has one and stops
    /// there. Returns an empty list when nothing matches within `max_depth`
    /// levels.
    async fn find_descendants_by_name(
        &self,
        file_id: i64,
        file_name: &str,
        max_depth: u32,
    ) -> MetadataResult<Vec<FileRecord>>;

    /// Move a file under a new parent.
    ///
    /// Updates the closure edge in place and recomputes the path of the
    /// whole moved subtree in the same transaction.
    async fn reparent(
        &self,
        file_id: i64,
        new_parent_id: i64,
        updated_at: OffsetDateTime,
    ) -> MetadataResult<()>;

    /// Move a file into one of the owner's special containers.
    ///
    /// The container is resolved inside the same transaction as the move, so
    /// a missing or duplicated container leaves the file where it is. Returns
    /// the container.
    async fn reparent_to_special(
        &self,
        file_id: i64,
        owner_id: i64,
        kind: SpecialContainer,
        updated_at: OffsetDateTime,
    ) -> MetadataResult<FileRecord>;

    /// Rename a file. A sibling with the same name is `AlreadyExists`.
    async fn rename(
        &self,
        file_id: i64,
        file_name: &str,
        updated_at: OffsetDateTime,
    ) -> MetadataResult<()>;

    /// Delete a file, its descendants, and links pointing into the removed
    /// set. Returns the number of files removed.
    async fn delete_subtree(&self, file_id: i64) -> MetadataResult<u64>;

    /// Delete every file and temp file owned by a member, and every grant the
    /// member holds. Returns the number of files removed.
    async fn delete_owner_files(&self, owner_id: i64) -> MetadataResult<u64>;

    /// Resolve one of the member's special containers.
    ///
    /// Zero or several matches is `Inconsistent`.
    async fn get_special_container(
        &self,
        owner_id: i64,
        kind: SpecialContainer,
    ) -> MetadataResult<FileRecord>;

    /// Ancestors of `file_id`, root first, excluding the file itself.
    async fn get_path(&self, file_id: i64) -> MetadataResult<Vec<FileRecord>>;

    /// Resolve a link to its target. `None` if the file is not a link.
    async fn get_link_target(&self, file_id: i64) -> MetadataResult<Option<FileRecord>>;
}
