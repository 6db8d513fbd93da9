//! Snapshot cache persisted as one file per peer.

use std::io::ErrorKind;
use std::path::PathBuf;

use async_trait::async_trait;
use tokio::fs;
use torsync_core::poll::{CacheError, CacheStore};

/// Stores each blob in `<dir>/<key>`.
///
/// Writes go to a hidden sibling first and are renamed into place, so a
/// reader never sees a half-written entry.
#[derive(Debug, Clone)]
pub struct FileCacheStore {
    dir: PathBuf,
}

impl FileCacheStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    fn path_for(&self, key: &str) -> PathBuf {
        self.dir.join(key)
    }
}

#[async_trait]
impl CacheStore for FileCacheStore {
    async fn load(&self, key: &str) -> Result<Option<Vec<u8>>, CacheError> {
        match fs::read(self.path_for(key)).await {
            Ok(blob) => Ok(Some(blob)),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(source) => Err(CacheError::Io {
                key: key.to_string(),
                source,
            }),
        }
    }

    async fn save(&self, key: &str, blob: &[u8]) -> Result<(), CacheError> {
        let io_error = |source| CacheError::Io {
            key: key.to_string(),
            source,
        };
        let staging = self.dir.join(format!(".{key}.tmp"));

        fs::create_dir_all(&self.dir).await.map_err(io_error)?;
        fs::write(&staging, blob).await.map_err(io_error)?;
        fs::rename(&staging, self.path_for(key))
            .await
            .map_err(io_error)?;
        tracing::trace!("Saved {} cache bytes for {}", blob.len(), key);
        Ok(())
    }
}
