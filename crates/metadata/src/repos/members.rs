//! Member repository.

use crate::error::MetadataResult;
use crate::models::MemberRow;
use async_trait::async_trait;
use time::OffsetDateTime;
use uuid::Uuid;

/// Repository for members.
#[async_trait]
pub trait MemberRepo: Send + Sync {
    /// Create a member. A duplicate `uuid_key` is `AlreadyExists`.
    async fn create_member(
        &self,
        uuid_key: Uuid,
        created_at: OffsetDateTime,
    ) -> MetadataResult<MemberRow>;

    async fn get_member(&self, member_id: i64) -> MetadataResult<Option<MemberRow>>;

    async fn get_member_by_key(&self, uuid_key: Uuid) -> MetadataResult<Option<MemberRow>>;

    /// Delete a member row. Returns whether a row existed.
    async fn delete_member(&self, member_id: i64) -> MetadataResult<bool>;
}
