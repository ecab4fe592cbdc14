//! Local filesystem storage backend.
//!
//! Layout under the root directory:
//!
//! ```text
//! chunks/<file_key>/<index>   uploaded chunks, 0-based
//! objects/<file_key>          merged object
//! ```

use crate::error::{StorageError, StorageResult};
use crate::traits::{MergeReply, StorageBackend};
use async_trait::async_trait;
use bytes::Bytes;
use loft_core::FileKey;
use std::path::{Path, PathBuf};
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tracing::instrument;
use uuid::Uuid;

const CHUNKS_DIR: &str = "chunks";
const OBJECTS_DIR: &str = "objects";

/// Local filesystem storage backend.
pub struct FilesystemBackend {
    root: PathBuf,
}

impl FilesystemBackend {
    /// Create a new filesystem backend.
    pub async fn new(root: impl AsRef<Path>) -> StorageResult<Self> {
        let root = root.as_ref().to_path_buf();
        fs::create_dir_all(root.join(CHUNKS_DIR)).await?;
        fs::create_dir_all(root.join(OBJECTS_DIR)).await?;
        Ok(Self { root })
    }

    fn chunk_dir(&self, file_key: FileKey) -> PathBuf {
        self.root.join(CHUNKS_DIR).join(file_key.to_string())
    }

    fn chunk_path(&self, file_key: FileKey, index: u32) -> PathBuf {
        self.chunk_dir(file_key).join(index.to_string())
    }

    fn object_path(&self, file_key: FileKey) -> PathBuf {
        self.root.join(OBJECTS_DIR).join(file_key.to_string())
    }

    /// Sibling path used while a file is being written.
    fn temp_path_for(path: &Path) -> PathBuf {
        let temp_name = format!(".tmp.{}", Uuid::new_v4());
        path.with_file_name(
            path.file_name()
                .map(|n| format!("{}{}", n.to_string_lossy(), temp_name))
                .unwrap_or(temp_name),
        )
    }

    /// Store one uploaded chunk.
    ///
    /// Writes go to a temp file which is fsynced and renamed into place, so a
    /// concurrent merge never observes a partial chunk.
    #[instrument(skip(self, data), fields(backend = "filesystem", size = data.len()))]
    pub async fn put_chunk(&self, file_key: FileKey, index: u32, data: Bytes) -> StorageResult<()> {
        let path = self.chunk_path(file_key, index);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).await?;
        }

        let temp_path = Self::temp_path_for(&path);
        {
            let mut file = fs::File::create(&temp_path).await?;
            file.write_all(&data).await?;
            file.sync_all().await?;
        }
        fs::rename(&temp_path, &path).await?;
        Ok(())
    }

    /// Read a merged object.
    pub async fn read_object(&self, file_key: FileKey) -> StorageResult<Bytes> {
        let path = self.object_path(file_key);
        let data = fs::read(&path).await.map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                StorageError::NotFound(format!("object {file_key}"))
            } else {
                StorageError::Io(e)
            }
        })?;
        Ok(Bytes::from(data))
    }

    /// Whether any chunk or object bytes exist for `file_key`.
    pub async fn has_bytes(&self, file_key: FileKey) -> StorageResult<bool> {
        Ok(fs::try_exists(self.chunk_dir(file_key)).await?
            || fs::try_exists(self.object_path(file_key)).await?)
    }

    /// Remove a directory or file, treating "already gone" as success.
    async fn remove_if_present(path: &Path, is_dir: bool) -> StorageResult<bool> {
        let result = if is_dir {
            fs::remove_dir_all(path).await
        } else {
            fs::remove_file(path).await
        };
        match result {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(StorageError::Io(e)),
        }
    }
}

#[async_trait]
impl StorageBackend for FilesystemBackend {
    #[instrument(skip(self), fields(backend = "filesystem", file_key = %file_key))]
    async fn merge(&self, file_key: FileKey, total_chunks: u32) -> StorageResult<MergeReply> {
        if total_chunks == 0 {
            return Ok(MergeReply::failed("nothing to merge: zero chunks"));
        }

        // All chunks must be present before anything is written.
        for index in 0..total_chunks {
            if !fs::try_exists(self.chunk_path(file_key, index)).await? {
                return Ok(MergeReply::failed(format!(
                    "chunk {index} of {total_chunks} is missing"
                )));
            }
        }

        let object_path = self.object_path(file_key);
        let temp_path = Self::temp_path_for(&object_path);
        let mut written: u64 = 0;
        {
            let mut out = fs::File::create(&temp_path).await?;
            for index in 0..total_chunks {
                let mut chunk = fs::File::open(self.chunk_path(file_key, index)).await?;
                written += tokio::io::copy(&mut chunk, &mut out).await?;
            }
            out.sync_all().await?;
        }
        fs::rename(&temp_path, &object_path).await?;

        // Chunks are redundant once the object is in place.
        if let Err(e) = Self::remove_if_present(&self.chunk_dir(file_key), true).await {
            tracing::warn!(file_key = %file_key, error = %e, "Failed to remove merged chunks");
        }

        tracing::debug!(
            file_key = %file_key,
            total_chunks = total_chunks,
            bytes = written,
            "Merged chunks"
        );
        Ok(MergeReply::ok(format!(
            "merged {total_chunks} chunks ({written} bytes)"
        )))
    }

    #[instrument(skip(self), fields(backend = "filesystem", file_key = %file_key))]
    async fn delete(&self, file_key: FileKey) -> StorageResult<MergeReply> {
        let chunks = Self::remove_if_present(&self.chunk_dir(file_key), true).await?;
        let object = Self::remove_if_present(&self.object_path(file_key), false).await?;
        let message = if chunks || object {
            "deleted"
        } else {
            "nothing stored"
        };
        Ok(MergeReply::ok(message))
    }

    fn backend_name(&self) -> &'static str {
        "filesystem"
    }
}
