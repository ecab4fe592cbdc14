//! Merge and delete behaviour of the filesystem backend.

mod fixtures {
    use bytes::Bytes;

    /// Deterministic pseudo-random bytes; the same seed yields the same data.
    pub fn seeded_bytes(seed: u64, len: usize) -> Bytes {
        let mut data = vec![0u8; len];
        let mut state = seed;

        // Simple LCG (Linear Congruential Generator)
        for chunk in data.chunks_mut(8) {
            state = state.wrapping_mul(6364136223846793005).wrapping_add(1);
            let bytes = state.to_le_bytes();
            for (i, byte) in chunk.iter_mut().enumerate() {
                *byte = bytes[i % 8];
            }
        }

        Bytes::from(data)
    }
}

use bytes::{Bytes, BytesMut};
use fixtures::seeded_bytes;
use loft_core::FileKey;
use loft_storage::{FilesystemBackend, StorageBackend};
use std::sync::Arc;

#[tokio::test]
async fn test_large_merge_preserves_content() {
    let temp = tempfile::tempdir().unwrap();
    let backend = FilesystemBackend::new(temp.path()).await.unwrap();
    let key = FileKey::new();

    let mut expected = BytesMut::new();
    for index in 0..8u32 {
        let chunk = seeded_bytes(index as u64, 256 * 1024 + index as usize);
        expected.extend_from_slice(&chunk);
        backend.put_chunk(key, index, chunk).await.unwrap();
    }

    let reply = backend.merge(key, 8).await.unwrap();
    assert!(reply.success, "{}", reply.message);
    assert_eq!(backend.read_object(key).await.unwrap(), expected.freeze());
}

#[tokio::test]
async fn test_concurrent_merges_of_different_keys() {
    let temp = tempfile::tempdir().unwrap();
    let backend = Arc::new(FilesystemBackend::new(temp.path()).await.unwrap());

    let mut handles = Vec::new();
    for seed in 0..4u64 {
        let backend = backend.clone();
        handles.push(tokio::spawn(async move {
            let key = FileKey::new();
            let a = seeded_bytes(seed, 1000);
            let b = seeded_bytes(seed + 100, 1000);
            backend.put_chunk(key, 0, a.clone()).await.unwrap();
            backend.put_chunk(key, 1, b.clone()).await.unwrap();
            assert!(backend.merge(key, 2).await.unwrap().success);
            (key, [a, b].concat())
        }));
    }

    for handle in handles {
        let (key, expected) = handle.await.unwrap();
        assert_eq!(backend.read_object(key).await.unwrap(), Bytes::from(expected));
    }
}

#[tokio::test]
async fn test_delete_after_merge_removes_object() {
    let temp = tempfile::tempdir().unwrap();
    let backend = FilesystemBackend::new(temp.path()).await.unwrap();
    let key = FileKey::new();

    backend
        .put_chunk(key, 0, Bytes::from_static(b"payload"))
        .await
        .unwrap();
    assert!(backend.merge(key, 1).await.unwrap().success);

    let reply = backend.delete(key).await.unwrap();
    assert!(reply.success);
    assert!(!backend.has_bytes(key).await.unwrap());
}

#[tokio::test]
async fn test_zero_chunk_merge_is_rejected() {
    let temp = tempfile::tempdir().unwrap();
    let backend = FilesystemBackend::new(temp.path()).await.unwrap();

    let reply = backend.merge(FileKey::new(), 0).await.unwrap();
    assert!(!reply.success);
}
