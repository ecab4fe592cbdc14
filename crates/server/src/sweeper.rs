//! Background reclamation of abandoned temp files.
//!
//! A temp file is abandoned when its write token has expired (plus a grace
//! period) without the upload completing, or when it has sat in `merging`
//! longer than `stuck_merge_secs`.

use crate::error::ServiceResult;
use crate::metrics;
use crate::state::AppState;
use loft_core::UploadState;
use loft_metadata::models::TempFileRow;
use serde::Serialize;
use time::OffsetDateTime;
use tokio::task::JoinHandle;

/// Outcome of one sweeper pass.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SweepStats {
    pub examined: u64,
    pub reclaimed: u64,
    pub errors: u64,
}

const PENDING: &[UploadState] = &[UploadState::Requested, UploadState::TokenIssued];
const STUCK: &[UploadState] = &[UploadState::Merging];

/// Run one pass over abandoned temp files.
///
/// Each row is claimed with a conditional delete before its bytes are
/// removed, so an upload that completes between listing and reclaiming
/// keeps its merged object.
pub async fn sweep_temp_files(state: &AppState) -> ServiceResult<SweepStats> {
    let config = &state.config.sweeper;
    let now = OffsetDateTime::now_utc();
    let token_ttl = time::Duration::seconds(state.config.tokens.ttl_secs as i64);

    let mut stats = SweepStats::default();
    for (states, cutoff) in [
        (
            PENDING,
            now.checked_sub(token_ttl)
                .and_then(|t| t.checked_sub(config.grace_period())),
        ),
        (STUCK, now.checked_sub(config.stuck_merge_after())),
    ] {
        let Some(cutoff) = cutoff else {
            tracing::warn!(?states, "Sweep cutoff out of range, skipping");
            continue;
        };
        let stale = state
            .metadata
            .list_stale_temp_files(states, cutoff, config.batch_size)
            .await?;
        for temp in stale {
            stats.examined += 1;
            reclaim(state, &temp, states, cutoff, &mut stats).await;
        }
    }

    match state.tokens.purge_expired().await {
        Ok(0) => {}
        Ok(purged) => tracing::debug!(purged = purged, "Expired tokens purged"),
        Err(e) => tracing::warn!(error = %e, "Failed to purge expired tokens"),
    }

    if stats.examined > 0 {
        tracing::info!(
            examined = stats.examined,
            reclaimed = stats.reclaimed,
            errors = stats.errors,
            "Temp file sweep finished"
        );
    }
    Ok(stats)
}

async fn reclaim(
    state: &AppState,
    temp: &TempFileRow,
    states: &[UploadState],
    cutoff: OffsetDateTime,
    stats: &mut SweepStats,
) {
    let file_key = temp.key();

    match state
        .metadata
        .claim_stale_temp_file(temp.file_key, states, cutoff)
        .await
    {
        Ok(true) => {}
        // Completed, aborted or touched since it was listed.
        Ok(false) => {
            tracing::debug!(file_key = %file_key, "Temp file moved on, not reclaimed");
            return;
        }
        Err(e) => {
            stats.errors += 1;
            tracing::warn!(file_key = %file_key, error = %e, "Failed to claim temp file");
            return;
        }
    }

    stats.reclaimed += 1;
    metrics::TEMP_FILES_SWEPT.inc();
    tracing::debug!(file_key = %file_key, state = %temp.state, "Temp file reclaimed");

    match state.storage.delete(file_key).await {
        Ok(reply) if !reply.success => {
            tracing::warn!(
                file_key = %file_key,
                message = %reply.message,
                "Storage refused to delete abandoned upload"
            );
        }
        Ok(_) => {}
        Err(e) => {
            stats.errors += 1;
            tracing::warn!(file_key = %file_key, error = %e, "Failed to delete abandoned upload bytes");
        }
    }
}

/// Run [`sweep_temp_files`] every `sweeper.interval_secs` until aborted.
pub fn spawn_sweeper(state: AppState) -> JoinHandle<()> {
    let interval = state.config.sweeper.interval();
    tokio::spawn(async move {
        tracing::info!(interval_secs = interval.as_secs(), "Temp file sweeper started");
        loop {
            tokio::time::sleep(interval).await;
            if let Err(e) = sweep_temp_files(&state).await {
                tracing::error!(error = %e, "Temp file sweep failed");
            }
        }
    })
}
