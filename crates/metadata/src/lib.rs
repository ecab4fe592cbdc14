//! Metadata store abstraction and implementations for Loft.
//!
//! This crate provides the control-plane data model:
//! - Members
//! - The file forest: files, infos, paths, closure edges and links
//! - Per-member capability rows
//! - Provisional (temp) files for in-flight uploads

pub mod error;
pub mod models;
pub mod repos;
pub mod store;

pub use error::{MetadataError, MetadataResult};
pub use store::{MetadataStore, SqliteStore};

use loft_core::config::MetadataConfig;
use std::sync::Arc;

/// Create a metadata store from configuration.
pub async fn from_config(config: &MetadataConfig) -> MetadataResult<Arc<dyn MetadataStore>> {
    match config {
        MetadataConfig::Sqlite {
            path,
            query_timeout_secs,
        } => {
            let store = SqliteStore::new(path, *query_timeout_secs).await?;
            Ok(Arc::new(store) as Arc<dyn MetadataStore>)
        }
    }
}
