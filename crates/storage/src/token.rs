//! In-process token cache with per-entry expiry.

use crate::error::{StorageError, StorageResult};
use crate::traits::TokenCache;
use async_trait::async_trait;
use dashmap::DashMap;
use std::time::Duration;
use tokio::time::Instant;

struct Entry {
    value: String,
    expires_at: Instant,
}

impl Entry {
    fn is_live(&self, now: Instant) -> bool {
        self.expires_at > now
    }
}

/// Token cache held in memory.
///
/// Expired entries are invisible to readers. They are dropped by
/// [`TokenCache::purge_expired`], which the sweeper calls every tick, and
/// once more before a full cache rejects a new key. Contents do not survive
/// a restart; temp files whose tokens are lost this way are reclaimed by the
/// sweeper.
pub struct MemoryTokenCache {
    entries: DashMap<String, Entry>,
    max_entries: usize,
}

impl MemoryTokenCache {
    pub fn new(max_entries: usize) -> Self {
        Self {
            entries: DashMap::new(),
            max_entries,
        }
    }

    fn purge(&self, now: Instant) -> usize {
        let before = self.entries.len();
        self.entries.retain(|_, entry| entry.is_live(now));
        before.saturating_sub(self.entries.len())
    }

    /// Whether inserting `key` would grow the cache past `max_entries`.
    /// Advisory under concurrent inserts.
    fn needs_room(&self, key: &str) -> bool {
        !self.entries.contains_key(key) && self.entries.len() >= self.max_entries
    }

    /// Number of stored entries, expired ones included.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[async_trait]
impl TokenCache for MemoryTokenCache {
    async fn set_ex(&self, key: &str, value: &str, ttl: Duration) -> StorageResult<()> {
        let now = Instant::now();
        let entry = Entry {
            value: value.to_string(),
            expires_at: now + ttl,
        };

        if self.needs_room(key) {
            self.purge(now);
            if self.needs_room(key) {
                return Err(StorageError::CapacityExceeded(self.max_entries));
            }
        }
        self.entries.insert(key.to_string(), entry);
        Ok(())
    }

    async fn get(&self, key: &str) -> StorageResult<Option<String>> {
        let now = Instant::now();
        Ok(self
            .entries
            .get(key)
            .filter(|entry| entry.is_live(now))
            .map(|entry| entry.value.clone()))
    }

    async fn take(&self, key: &str) -> StorageResult<Option<String>> {
        let now = Instant::now();
        Ok(self
            .entries
            .remove(key)
            .map(|(_, entry)| entry)
            .filter(|entry| entry.is_live(now))
            .map(|entry| entry.value))
    }

    async fn purge_expired(&self) -> StorageResult<usize> {
        Ok(self.purge(Instant::now()))
    }
}
