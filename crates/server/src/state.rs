//! Application state shared by the services.

use crate::lifecycle::FileService;
use crate::upload::UploadService;
use anyhow::{Context, Result};
use loft_core::config::AppConfig;
use loft_metadata::MetadataStore;
use loft_storage::{StorageBackend, TokenCache};
use std::sync::Arc;

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
    /// Application configuration.
    pub config: Arc<AppConfig>,
    /// Metadata store.
    pub metadata: Arc<dyn MetadataStore>,
    /// Byte storage backend.
    pub storage: Arc<dyn StorageBackend>,
    /// Upload token cache.
    pub tokens: Arc<dyn TokenCache>,
}

impl AppState {
    pub fn new(
        config: AppConfig,
        metadata: Arc<dyn MetadataStore>,
        storage: Arc<dyn StorageBackend>,
        tokens: Arc<dyn TokenCache>,
    ) -> Self {
        Self {
            config: Arc::new(config),
            metadata,
            storage,
            tokens,
        }
    }

    /// Validate the configuration and open every collaborator it names.
    pub async fn from_config(config: AppConfig) -> Result<Self> {
        config
            .validate()
            .map_err(|e| anyhow::anyhow!("invalid configuration: {e}"))?;

        let metadata = loft_metadata::from_config(&config.metadata)
            .await
            .context("failed to initialize metadata store")?;
        tracing::info!("Metadata store initialized");

        let storage = loft_storage::from_config(&config.storage)
            .await
            .context("failed to initialize storage backend")?;
        tracing::info!(backend = storage.backend_name(), "Storage backend initialized");

        let tokens = loft_storage::token_cache_from_config(&config.tokens)
            .context("failed to initialize token cache")?;

        Ok(Self::new(config, metadata, storage, tokens))
    }

    /// File lifecycle service over this state.
    pub fn files(&self) -> FileService {
        FileService::new(
            self.metadata.clone(),
            self.config.hierarchy.max_search_depth,
        )
    }

    /// Upload orchestrator over this state.
    pub fn uploads(&self) -> UploadService {
        UploadService::new(
            self.metadata.clone(),
            self.storage.clone(),
            self.tokens.clone(),
            self.config.tokens.ttl(),
        )
    }
}
