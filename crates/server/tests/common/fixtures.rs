//! Test fixtures: a wired-up application state over test collaborators.

use super::metadata::TestMetadata;
use super::storage::StubBackend;
use loft_core::config::AppConfig;
use loft_core::{FileId, MemberId};
use loft_metadata::models::FileRecord;
use loft_server::{AppState, SignupOutcome};
use loft_storage::{MemoryTokenCache, TokenCache};
use std::sync::Arc;
use uuid::Uuid;

/// Application state plus handles on its collaborators.
/// Note: #[allow(dead_code)] because each test file compiles common/ separately.
#[allow(dead_code)]
pub struct TestApp {
    pub state: AppState,
    pub metadata: TestMetadata,
    pub backend: Arc<StubBackend>,
    pub tokens: Arc<dyn TokenCache>,
}

#[allow(dead_code)]
impl TestApp {
    pub async fn new() -> Self {
        Self::with_backend(StubBackend::succeeding()).await
    }

    pub async fn with_backend(backend: StubBackend) -> Self {
        Self::build(AppConfig::for_testing(), backend, Arc::new(MemoryTokenCache::new(1_000))).await
    }

    pub async fn build(
        config: AppConfig,
        backend: StubBackend,
        tokens: Arc<dyn TokenCache>,
    ) -> Self {
        let metadata = TestMetadata::new()
            .await
            .expect("Failed to create metadata");
        let backend = Arc::new(backend);
        let state = AppState::new(config, metadata.store(), backend.clone(), tokens.clone());
        Self {
            state,
            metadata,
            backend,
            tokens,
        }
    }

    /// Sign up a fresh member.
    pub async fn member(&self) -> SignupOutcome {
        loft_server::signup(&self.state, Uuid::new_v4())
            .await
            .expect("signup failed")
    }
}

/// Typed id of a record.
#[allow(dead_code)]
pub fn id_of(record: &FileRecord) -> FileId {
    FileId::new(record.id)
}

/// Typed owner of a record.
#[allow(dead_code)]
pub fn owner_of(record: &FileRecord) -> MemberId {
    MemberId::new(record.owner_id)
}
