//! Persisted snapshot cache surface

use std::collections::HashMap;

use async_trait::async_trait;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

use crate::driver::Snapshot;

/// Errors raised by a cache backend.
#[derive(Debug, thiserror::Error)]
pub enum CacheError {
    #[error("Cache I/O failed for key {key}")]
    Io {
        key: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Cache entry could not be serialized: {reason}")]
    Serialization { reason: String },
}

/// Key/value blob storage, one blob per peer key.
///
/// Writes to distinct keys must not corrupt each other; no ordering is
/// required across keys.
#[async_trait]
pub trait CacheStore: Send + Sync {
    /// # Errors
    ///
    /// - `CacheError::Io` - If the backend cannot be read
    async fn load(&self, key: &str) -> Result<Option<Vec<u8>>, CacheError>;

    /// # Errors
    ///
    /// - `CacheError::Io` - If the backend cannot be written
    async fn save(&self, key: &str, blob: &[u8]) -> Result<(), CacheError>;
}

/// Last successful snapshot of one peer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CacheEntry {
    /// Epoch seconds of the live fetch that produced `torrents`
    pub modified: u64,
    #[serde(default)]
    pub torrents: Snapshot,
}

impl CacheEntry {
    pub fn new(modified: u64, torrents: Snapshot) -> Self {
        Self { modified, torrents }
    }

    /// Seconds since the entry was written, or `None` if it claims to be
    /// written after `now`.
    pub fn age(&self, now: u64) -> Option<u64> {
        now.checked_sub(self.modified)
    }

    /// Younger than `window_secs`. An entry from the future is never fresh.
    pub fn is_fresh(&self, now: u64, window_secs: u64) -> bool {
        self.age(now).is_some_and(|age| age < window_secs)
    }

    /// Less than `grace_secs` away from `now` in either direction.
    pub fn within_grace(&self, now: u64, grace_secs: u64) -> bool {
        now.abs_diff(self.modified) < grace_secs
    }

    /// # Errors
    ///
    /// - `CacheError::Serialization` - If the snapshot cannot be encoded
    pub fn to_blob(&self) -> Result<Vec<u8>, CacheError> {
        serde_json::to_vec(self).map_err(|e| CacheError::Serialization {
            reason: e.to_string(),
        })
    }

    /// Parses a stored blob; `None` if it is not a valid entry.
    pub fn from_blob(blob: &[u8]) -> Option<Self> {
        serde_json::from_slice(blob).ok()
    }
}

/// In-memory store for tests and embedding.
#[derive(Debug, Default)]
pub struct MemoryCacheStore {
    blobs: Mutex<HashMap<String, Vec<u8>>>,
}

impl MemoryCacheStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Stores `entry` under `key`, bypassing the async surface.
    pub fn insert_entry(&self, key: &str, entry: &CacheEntry) -> Result<(), CacheError> {
        self.blobs.lock().insert(key.to_string(), entry.to_blob()?);
        Ok(())
    }

    pub fn insert_blob(&self, key: &str, blob: impl Into<Vec<u8>>) {
        self.blobs.lock().insert(key.to_string(), blob.into());
    }

    /// Returns the parsed entry under `key`, if any.
    pub fn entry(&self, key: &str) -> Option<CacheEntry> {
        self.blobs
            .lock()
            .get(key)
            .and_then(|blob| CacheEntry::from_blob(blob))
    }

    pub fn len(&self) -> usize {
        self.blobs.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.blobs.lock().is_empty()
    }
}

#[async_trait]
impl CacheStore for MemoryCacheStore {
    async fn load(&self, key: &str) -> Result<Option<Vec<u8>>, CacheError> {
        Ok(self.blobs.lock().get(key).cloned())
    }

    async fn save(&self, key: &str, blob: &[u8]) -> Result<(), CacheError> {
        self.blobs.lock().insert(key.to_string(), blob.to_vec());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::driver::TorrentRecord;

    #[test]
    fn test_entry_blob_shape() {
        let entry = CacheEntry::new(
            1_700_000_000,
            vec![TorrentRecord {
                hash_string: "ab".to_string(),
                id: Some(1),
                name: "x".to_string(),
                total_size: 10,
                have_valid: Some(5),
            }],
        );
        let blob = String::from_utf8(entry.to_blob().unwrap()).unwrap();
        assert_eq!(
            blob,
            r#"{"modified":1700000000,"torrents":[{"hashString":"ab","id":1,"name":"x","totalSize":10,"haveValid":5}]}"#
        );
        assert_eq!(CacheEntry::from_blob(blob.as_bytes()), Some(entry));
    }

    #[test]
    fn test_unreadable_blob_is_absent() {
        assert_eq!(CacheEntry::from_blob(b"{\"torrents\":[]}"), None);
        assert_eq!(CacheEntry::from_blob(b"garbage"), None);
    }

    #[test]
    fn test_entry_from_the_future_is_never_fresh() {
        let entry = CacheEntry::new(100, Vec::new());
        assert_eq!(entry.age(161), Some(61));
        assert_eq!(entry.age(50), None);

        assert!(entry.is_fresh(159, 60));
        assert!(!entry.is_fresh(160, 60));
        assert!(!entry.is_fresh(50, 60));
        assert!(!entry.is_fresh(99, u64::MAX));
    }

    #[test]
    fn test_grace_is_measured_both_ways() {
        let entry = CacheEntry::new(1000, Vec::new());
        assert!(entry.within_grace(1099, 100));
        assert!(!entry.within_grace(1100, 100));
        assert!(entry.within_grace(901, 100));
        assert!(!entry.within_grace(900, 100));
    }

    #[tokio::test]
    async fn test_memory_store_round_trip() {
        let store = MemoryCacheStore::new();
        assert!(store.load("h_1").await.unwrap().is_none());

        store.save("h_1", b"blob").await.unwrap();
        assert_eq!(store.load("h_1").await.unwrap().as_deref(), Some(&b"blob"[..]));
        assert_eq!(store.len(), 1);
    }
}
