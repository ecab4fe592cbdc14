//! Signup bootstrapper.
//!
//! A new member gets this forest:
//!
//! ```text
//! root
//! ├── home
//! │   └── trash  (link to /root/trash)
//! └── trash
//! ```
//!
//! Each node is created in its own transaction. If any step fails after the
//! member row exists, the member's files and the member itself are removed
//! again.

use crate::error::ServiceResult;
use crate::lifecycle::FileService;
use crate::metrics;
use crate::state::AppState;
use loft_core::{FileId, MemberId, SpecialContainer};
use loft_metadata::models::FileRecord;
use time::OffsetDateTime;
use tracing::instrument;
use uuid::Uuid;

/// Everything created for a new member.
#[derive(Debug, Clone)]
pub struct SignupOutcome {
    pub member_id: MemberId,
    pub root: FileRecord,
    pub home: FileRecord,
    pub trash: FileRecord,
    /// Link inside `home` pointing at `trash`.
    pub trash_link: FileRecord,
}

/// Register a member and build its initial forest.
///
/// A duplicate `uuid_key` is a `Conflict` and touches nothing.
#[instrument(skip(state), fields(uuid_key = %uuid_key))]
pub async fn signup(state: &AppState, uuid_key: Uuid) -> ServiceResult<SignupOutcome> {
    let member = state
        .metadata
        .create_member(uuid_key, OffsetDateTime::now_utc())
        .await?;
    let member_id = MemberId::new(member.id);

    match build_forest(&state.files(), member_id).await {
        Ok(outcome) => {
            metrics::SIGNUPS.inc();
            tracing::info!(member_id = %member_id, root_id = outcome.root.id, "Member signed up");
            Ok(outcome)
        }
        Err(e) => {
            tracing::warn!(member_id = %member_id, error = %e, "Signup failed, compensating");
            compensate(state, member_id).await;
            metrics::SIGNUP_COMPENSATIONS.inc();
            Err(e)
        }
    }
}

async fn build_forest(files: &FileService, member_id: MemberId) -> ServiceResult<SignupOutcome> {
    let root = files.create_root(member_id).await?;
    let root_id = FileId::new(root.id);

    let (home, trash) = tokio::try_join!(
        files.create_container(member_id, root_id, SpecialContainer::Home.name()),
        files.create_container(member_id, root_id, SpecialContainer::Trash.name()),
    )?;

    let trash_link = files
        .create_link(
            member_id,
            FileId::new(home.id),
            SpecialContainer::Trash.name(),
            FileId::new(trash.id),
        )
        .await?;

    Ok(SignupOutcome {
        member_id,
        root,
        home,
        trash,
        trash_link,
    })
}

/// Undo a partial signup. Failures are logged; there is nothing further to
/// roll back to.
async fn compensate(state: &AppState, member_id: MemberId) {
    match state.metadata.delete_owner_files(member_id.get()).await {
        Ok(removed) => {
            tracing::debug!(member_id = %member_id, removed = removed, "Removed partial forest");
        }
        Err(e) => {
            tracing::error!(member_id = %member_id, error = %e, "Failed to remove partial forest");
        }
    }

    if let Err(e) = state.metadata.delete_member(member_id.get()).await {
        tracing::error!(member_id = %member_id, error = %e, "Failed to remove member row");
    }
}
