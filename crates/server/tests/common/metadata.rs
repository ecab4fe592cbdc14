//! Metadata store test utilities.

use loft_metadata::{MetadataResult, MetadataStore, SqliteStore};
use sqlx::{Pool, Sqlite};
use std::sync::Arc;
use tempfile::TempDir;

/// A test metadata store wrapper that cleans up on drop.
#[allow(dead_code)]
pub struct TestMetadata {
    pub store: Arc<dyn MetadataStore>,
    pub(crate) sqlite_store: Arc<SqliteStore>,
    _temp_dir: TempDir,
}

impl TestMetadata {
    /// Create a new test metadata store backed by a file in a temp directory.
    pub async fn new() -> MetadataResult<Self> {
        let temp_dir = tempfile::tempdir().expect("Failed to create temp directory");
        let db_path = temp_dir.path().join("test.db");
        let store = SqliteStore::new(&db_path, None).await?;
        let arc_store = Arc::new(store);

        Ok(Self {
            store: arc_store.clone(),
            sqlite_store: arc_store,
            _temp_dir: temp_dir,
        })
    }

    /// Create a new in-memory SQLite store (faster for tests).
    #[allow(dead_code)]
    pub async fn in_memory() -> MetadataResult<Self> {
        let temp_dir = tempfile::tempdir().expect("Failed to create temp directory");
        let store = SqliteStore::new(":memory:", None).await?;
        let arc_store = Arc::new(store);

        Ok(Self {
            store: arc_store.clone(),
            sqlite_store: arc_store,
            _temp_dir: temp_dir,
        })
    }

    /// Get a reference to the metadata store.
    pub fn store(&self) -> Arc<dyn MetadataStore> {
        self.store.clone()
    }

    /// Get a reference to the SQLite connection pool for raw queries.
    #[allow(dead_code)]
    pub fn pool(&self) -> &Pool<Sqlite> {
        self.sqlite_store.pool()
    }

    /// Number of closure rows naming `child_id` as child.
    #[allow(dead_code)]
    pub async fn closure_parents(&self, child_id: i64) -> Vec<i64> {
        sqlx::query_scalar("SELECT parent_id FROM file_closures WHERE child_id = ? ORDER BY parent_id")
            .bind(child_id)
            .fetch_all(self.pool())
            .await
            .expect("closure query failed")
    }

    /// Row count of a table.
    #[allow(dead_code)]
    pub async fn count_rows(&self, table: &str) -> i64 {
        sqlx::query_scalar(&format!("SELECT COUNT(*) FROM {table}"))
            .fetch_one(self.pool())
            .await
            .expect("count query failed")
    }
}
