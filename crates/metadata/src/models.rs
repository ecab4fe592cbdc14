//! Database models mapping to the metadata schema.

use crate::error::MetadataResult;
use loft_core::{CapabilitySet, FileKey, FileType, UploadState};
use sqlx::FromRow;
use time::OffsetDateTime;
use uuid::Uuid;

// =============================================================================
// Members
// =============================================================================

/// Member record created at signup.
#[derive(Debug, Clone, FromRow)]
pub struct MemberRow {
    pub id: i64,
    pub uuid_key: Uuid,
    pub created_at: OffsetDateTime,
}

// =============================================================================
// File forest
// =============================================================================

/// A file joined with its info and path rows.
///
/// The store never hands out a file without these rows; they are written
/// in the same transaction as the file itself.
#[derive(Debug, Clone, FromRow)]
pub struct FileRecord {
    pub id: i64,
    pub file_key: Uuid,
    pub owner_id: i64,
    pub file_name: String,
    pub file_type: String,
    pub byte_size: i64,
    pub create_date: OffsetDateTime,
    pub update_date: OffsetDateTime,
    /// JSON array of ancestor ids, root first.
    pub path: String,
}

impl FileRecord {
    pub fn key(&self) -> FileKey {
        FileKey::from(self.file_key)
    }

    pub fn kind(&self) -> MetadataResult<FileType> {
        Ok(FileType::parse(&self.file_type)?)
    }

    pub fn is_container(&self) -> bool {
        self.file_type == FileType::Container.as_str()
    }

    /// Decode the ancestor path.
    pub fn path_ids(&self) -> MetadataResult<Vec<i64>> {
        Ok(serde_json::from_str(&self.path)?)
    }

    /// Path a child of this file must carry.
    pub fn child_path(&self) -> MetadataResult<Vec<i64>> {
        let mut path = self.path_ids()?;
        path.push(self.id);
        Ok(path)
    }
}

/// Capability row for a `(member, file)` pair.
#[derive(Debug, Clone, FromRow)]
pub struct FileCapabilityRow {
    pub member_id: i64,
    pub file_id: i64,
    /// JSON array of capability names.
    pub capabilities: String,
    pub updated_at: OffsetDateTime,
}

impl FileCapabilityRow {
    pub fn capability_set(&self) -> MetadataResult<CapabilitySet> {
        Ok(serde_json::from_str(&self.capabilities)?)
    }
}

/// Input for creating a file node.
#[derive(Debug, Clone)]
pub struct NewNode {
    pub owner_id: i64,
    pub file_name: String,
    pub file_type: FileType,
    /// `None` creates a forest root (`path = []`, no closure row).
    pub parent_id: Option<i64>,
    pub byte_size: i64,
    /// Pre-assigned key; a fresh one is generated when absent.
    pub file_key: Option<Uuid>,
    /// Capability rows written with the node.
    pub grants: Vec<(i64, CapabilitySet)>,
    /// Target of a `link` node.
    pub link_target: Option<i64>,
}

impl NewNode {
    /// A container owned by `owner_id` with full capabilities for the owner.
    pub fn container(owner_id: i64, parent_id: Option<i64>, file_name: &str) -> Self {
        Self {
            owner_id,
            file_name: file_name.to_string(),
            file_type: FileType::Container,
            parent_id,
            byte_size: 0,
            file_key: None,
            grants: vec![(owner_id, CapabilitySet::full())],
            link_target: None,
        }
    }
}

// =============================================================================
// Temp files
// =============================================================================

/// Provisional block registered while its bytes are being uploaded.
#[derive(Debug, Clone, FromRow)]
pub struct TempFileRow {
    pub file_key: Uuid,
    pub file_name: String,
    pub owner_id: i64,
    pub parent_id: i64,
    pub byte_size: i64,
    pub state: String,
    pub create_date: OffsetDateTime,
    pub update_date: OffsetDateTime,
}

impl TempFileRow {
    /// A freshly requested temp file with a new key.
    pub fn requested(
        owner_id: i64,
        parent_id: i64,
        file_name: &str,
        byte_size: i64,
        now: OffsetDateTime,
    ) -> Self {
        Self {
            file_key: Uuid::new_v4(),
            file_name: file_name.to_string(),
            owner_id,
            parent_id,
            byte_size,
            state: UploadState::Requested.as_str().to_string(),
            create_date: now,
            update_date: now,
        }
    }

    pub fn key(&self) -> FileKey {
        FileKey::from(self.file_key)
    }

    pub fn upload_state(&self) -> MetadataResult<UploadState> {
        Ok(UploadState::parse(&self.state)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(id: i64, path: &str) -> FileRecord {
        let now = OffsetDateTime::now_utc();
        FileRecord {
            id,
            file_key: Uuid::new_v4(),
            owner_id: 1,
            file_name: "docs".to_string(),
            file_type: "container".to_string(),
            byte_size: 0,
            create_date: now,
            update_date: now,
            path: path.to_string(),
        }
    }

    #[test]
    fn test_child_path_appends_own_id() {
        let parent = record(7, "[1,3]");
        assert_eq!(parent.path_ids().unwrap(), vec![1, 3]);
        assert_eq!(parent.child_path().unwrap(), vec![1, 3, 7]);
        assert!(parent.is_container());
    }

    #[test]
    fn test_root_path_is_empty() {
        let root = record(1, "[]");
        assert!(root.path_ids().unwrap().is_empty());
        assert_eq!(root.child_path().unwrap(), vec![1]);
    }

    #[test]
    fn test_requested_temp_file_state() {
        let temp = TempFileRow::requested(1, 2, "a.txt", 1024, OffsetDateTime::now_utc());
        assert_eq!(temp.upload_state().unwrap(), UploadState::Requested);
        assert_eq!(temp.byte_size, 1024);
    }
}
