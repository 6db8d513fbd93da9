//! Poll phase: cached snapshots of every daemon, merged into one index.
//!
//! [`PollCache`] decides per peer whether to reuse the persisted snapshot or
//! fetch a live one; [`Poller`] fans that out across the fleet with bounded
//! concurrency and aggregates the results into a [`TorrentIndex`].

pub mod backoff;
pub mod cache;
pub mod poller;
pub mod store;

use std::fmt;

pub use backoff::{FailureBackoff, FetchPermit};
pub use cache::PollCache;
pub use poller::{PollOutcome, Poller, TorrentHolding, TorrentIndex, aggregate};
pub use store::{CacheEntry, CacheError, CacheStore, MemoryCacheStore};

use crate::driver::Snapshot;
use crate::peer::Peer;

/// How a peer's snapshot was obtained this cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PollStatus {
    /// Fetched from the daemon this cycle
    Live,
    /// Reused from the persisted cache
    Cached,
    /// No usable snapshot
    Dead,
}

impl fmt::Display for PollStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PollStatus::Live => write!(f, "live"),
            PollStatus::Cached => write!(f, "cached"),
            PollStatus::Dead => write!(f, "dead"),
        }
    }
}

/// Outcome of polling one peer.
#[derive(Debug, Clone, PartialEq)]
pub struct PollResult {
    pub peer: Peer,
    pub status: PollStatus,
    /// Absent exactly when `status` is [`PollStatus::Dead`]
    pub snapshot: Option<Snapshot>,
}

impl PollResult {
    pub fn new(peer: &Peer, status: PollStatus, snapshot: Option<Snapshot>) -> Self {
        Self {
            peer: peer.clone(),
            status,
            snapshot,
        }
    }
}

/// Source of wall-clock time for cache ages and backoff windows.
pub trait Clock: Send + Sync {
    fn now_epoch_seconds(&self) -> u64;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now_epoch_seconds(&self) -> u64 {
        u64::try_from(chrono::Utc::now().timestamp()).unwrap_or(0)
    }
}
