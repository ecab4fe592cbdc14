//! Storage backend and token cache seams for Loft.
//!
//! This crate provides:
//! - The [`StorageBackend`] trait for merge and delete requests
//! - Backends: local filesystem and a remote HTTP merge service
//! - The [`TokenCache`] trait and an in-memory implementation

pub mod backends;
pub mod error;
pub mod token;
pub mod traits;

pub use backends::{filesystem::FilesystemBackend, http::HttpBackend};
pub use error::{StorageError, StorageResult};
pub use token::MemoryTokenCache;
pub use traits::{MergeReply, StorageBackend, TokenCache};

use loft_core::config::{StorageBackendConfig, TokenConfig};
use std::sync::Arc;
use std::time::Duration;

/// Create a storage backend from configuration.
pub async fn from_config(config: &StorageBackendConfig) -> StorageResult<Arc<dyn StorageBackend>> {
    config.validate().map_err(StorageError::Config)?;

    match config {
        StorageBackendConfig::Filesystem { path } => {
            let backend = FilesystemBackend::new(path).await?;
            Ok(Arc::new(backend))
        }
        StorageBackendConfig::Http {
            endpoint,
            timeout_secs,
        } => {
            let backend = HttpBackend::new(endpoint, Duration::from_secs(*timeout_secs))?;
            Ok(Arc::new(backend))
        }
    }
}

/// Create a token cache from configuration.
pub fn token_cache_from_config(config: &TokenConfig) -> StorageResult<Arc<dyn TokenCache>> {
    config.validate().map_err(StorageError::Config)?;
    Ok(Arc::new(MemoryTokenCache::new(config.max_entries)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[tokio::test]
    async fn from_config_filesystem_ok() {
        let temp = tempdir().unwrap();
        let config = StorageBackendConfig::Filesystem {
            path: temp.path().join("store"),
        };

        let backend = from_config(&config).await.unwrap();
        assert_eq!(backend.backend_name(), "filesystem");
        assert!(temp.path().join("store/chunks").is_dir());
    }

    #[tokio::test]
    async fn from_config_http_ok() {
        let config = StorageBackendConfig::Http {
            endpoint: "http://storage:7070".to_string(),
            timeout_secs: 5,
        };

        let backend = from_config(&config).await.unwrap();
        assert_eq!(backend.backend_name(), "http");
    }

    #[tokio::test]
    async fn from_config_rejects_bad_endpoint() {
        let config = StorageBackendConfig::Http {
            endpoint: "storage:7070".to_string(),
            timeout_secs: 5,
        };

        match from_config(&config).await {
            Ok(_) => panic!("expected error"),
            Err(StorageError::Config(_)) => {}
            Err(other) => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn token_cache_rejects_zero_ttl() {
        let config = TokenConfig {
            ttl_secs: 0,
            ..TokenConfig::default()
        };
        assert!(matches!(
            token_cache_from_config(&config),
            Err(StorageError::Config(_))
        ));
    }
}
