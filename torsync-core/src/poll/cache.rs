//! Staleness and backoff policy around `PeerDriver::list`.

use std::sync::Arc;

use super::backoff::FailureBackoff;
use super::store::{CacheEntry, CacheStore};
use super::{Clock, PollResult, PollStatus};
use crate::config::PollConfig;
use crate::driver::{DriverError, DriverFactory, Snapshot};
use crate::peer::{Peer, PeerKey};

/// Serves each peer's snapshot from the persisted cache or a live fetch.
pub struct PollCache {
    store: Arc<dyn CacheStore>,
    factory: Arc<dyn DriverFactory>,
    clock: Arc<dyn Clock>,
    backoff: Arc<FailureBackoff>,
    config: PollConfig,
}

impl PollCache {
    pub fn new(
        store: Arc<dyn CacheStore>,
        factory: Arc<dyn DriverFactory>,
        clock: Arc<dyn Clock>,
        backoff: Arc<FailureBackoff>,
        config: PollConfig,
    ) -> Self {
        Self {
            store,
            factory,
            clock,
            backoff,
            config,
        }
    }

    pub fn config(&self) -> &PollConfig {
        &self.config
    }

    pub fn backoff(&self) -> &Arc<FailureBackoff> {
        &self.backoff
    }

    /// Returns the peer's snapshot, fetching live when the cached one is
    /// missing, at least `refresh_after` old, or `force_refresh` is set.
    ///
    /// Never fails: a failed fetch degrades to the cached snapshot while it
    /// is younger than `stale_grace`, and to [`PollStatus::Dead`] otherwise.
    pub async fn fetch(&self, peer: &Peer, force_refresh: bool) -> PollResult {
        let key = peer.key();
        let now = self.clock.now_epoch_seconds();
        let cached = self.load_entry(&key).await;

        if let Some(entry) = &cached
            && !force_refresh
            && entry.is_fresh(now, self.config.refresh_after.as_secs())
        {
            tracing::debug!("{} served from cache ({}s old)", key, now - entry.modified);
            return PollResult::new(peer, PollStatus::Cached, Some(entry.torrents.clone()));
        }

        match self.fetch_live(peer, &key, now).await {
            Ok(snapshot) => {
                self.store_entry(&key, CacheEntry::new(now, snapshot.clone()))
                    .await;
                tracing::debug!("{} listed {} torrents", key, snapshot.len());
                PollResult::new(peer, PollStatus::Live, Some(snapshot))
            }
            Err(error) => match cached {
                Some(entry) if entry.within_grace(now, self.config.stale_grace.as_secs()) => {
                    tracing::warn!("{} unavailable, using stale snapshot: {}", key, error);
                    PollResult::new(peer, PollStatus::Cached, Some(entry.torrents))
                }
                _ => {
                    tracing::warn!("{} unavailable: {}", key, error);
                    PollResult::new(peer, PollStatus::Dead, None)
                }
            },
        }
    }

    async fn fetch_live(
        &self,
        peer: &Peer,
        key: &PeerKey,
        now: u64,
    ) -> Result<Snapshot, DriverError> {
        let timeout_error = || DriverError::Timeout {
            endpoint: key.to_string(),
            millis: self.config.fetch_timeout.as_millis(),
        };

        let Some(permit) =
            self.backoff
                .try_begin(key, now, self.config.failure_backoff.as_secs())
        else {
            tracing::debug!("{} failed recently or is already being fetched", key);
            return Err(timeout_error());
        };

        let result = match self.factory.driver_for(peer) {
            Ok(driver) => tokio::time::timeout(self.config.fetch_timeout, driver.list())
                .await
                .unwrap_or_else(|_| Err(timeout_error())),
            Err(error) => Err(error),
        };

        if result.is_err() {
            permit.fail(self.clock.now_epoch_seconds());
        }
        result
    }

    async fn load_entry(&self, key: &PeerKey) -> Option<CacheEntry> {
        let blob = match self.store.load(&key.cache_key()).await {
            Ok(blob) => blob?,
            Err(error) => {
                tracing::warn!("Cache read for {} failed: {}", key, error);
                return None;
            }
        };

        let entry = CacheEntry::from_blob(&blob);
        if entry.is_none() {
            tracing::warn!("Ignoring unreadable cache entry for {}", key);
        }
        entry
    }

    async fn store_entry(&self, key: &PeerKey, entry: CacheEntry) {
        let saved = match entry.to_blob() {
            Ok(blob) => self.store.save(&key.cache_key(), &blob).await,
            Err(error) => Err(error),
        };
        if let Err(error) = saved {
            tracing::warn!("Cache write for {} failed: {}", key, error);
        }
    }
}
