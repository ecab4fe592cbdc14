//! Capability repository.

use crate::error::MetadataResult;
use crate::models::FileCapabilityRow;
use async_trait::async_trait;
use loft_core::{Capability, CapabilitySet};

/// Repository for per-(member, file) capability sets.
///
/// Rows are authoritative for their own file only; nothing is inherited
/// from ancestors.
#[async_trait]
pub trait CapabilityRepo: Send + Sync {
    /// Insert or replace the capability set of a member on a file.
    async fn grant(
        &self,
        member_id: i64,
        file_id: i64,
        capabilities: &CapabilitySet,
    ) -> MetadataResult<()>;

    /// Check a single capability. A missing row is `false`, not an error.
    async fn check(
        &self,
        member_id: i64,
        file_id: i64,
        capability: Capability,
    ) -> MetadataResult<bool>;

    /// Get the capability set of a member on a file.
    async fn get_capabilities(
        &self,
        member_id: i64,
        file_id: i64,
    ) -> MetadataResult<Option<CapabilitySet>>;

    /// Remove a member's row on a file. Returns whether a row existed.
    async fn revoke(&self, member_id: i64, file_id: i64) -> MetadataResult<bool>;

    /// List every grant on a file.
    async fn list_grants(&self, file_id: i64) -> MetadataResult<Vec<FileCapabilityRow>>;
}
