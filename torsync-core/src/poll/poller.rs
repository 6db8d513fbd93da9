//! Fleet-wide polling and holder aggregation

use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;

use futures::stream::{self, StreamExt};

use super::cache::PollCache;
use super::{PollResult, PollStatus};
use crate::peer::{Peer, PeerKey};

/// One torrent and every peer currently reporting it.
#[derive(Debug, Clone, PartialEq)]
pub struct TorrentHolding {
    /// 40 lowercase hex characters
    pub info_hash: String,
    pub name: String,
    pub total_size: u64,
    /// `(endpoint, completion ratio)` in poll order
    pub holders: Vec<(PeerKey, f64)>,
}

impl TorrentHolding {
    pub fn holder_count(&self) -> usize {
        self.holders.len()
    }

    pub fn is_held_by(&self, key: &PeerKey) -> bool {
        self.holders.iter().any(|(holder, _)| holder == key)
    }
}

/// Holdings keyed by info hash.
pub type TorrentIndex = BTreeMap<String, TorrentHolding>;

/// Result of one poll round.
#[derive(Debug, Clone, Default)]
pub struct PollOutcome {
    pub index: TorrentIndex,
    /// Every enabled peer's status; disabled peers are absent
    pub statuses: BTreeMap<PeerKey, PollStatus>,
}

/// Polls every enabled peer through a shared [`PollCache`].
pub struct Poller {
    cache: Arc<PollCache>,
}

impl Poller {
    pub fn new(cache: Arc<PollCache>) -> Self {
        Self { cache }
    }

    /// Polls `peers` concurrently and aggregates their snapshots.
    ///
    /// At most `max_concurrent_polls` fetches run at once. Results are
    /// joined in configuration order, so the first peer listed to report a
    /// torrent names it. Peers repeating an earlier endpoint are skipped.
    pub async fn poll_all(&self, peers: &[Peer], force_refresh: bool) -> PollOutcome {
        let mut seen = HashSet::new();
        let enabled: Vec<&Peer> = peers
            .iter()
            .filter(|peer| !peer.disabled)
            .filter(|peer| {
                let fresh = seen.insert(peer.key());
                if !fresh {
                    tracing::warn!("Peer {} listed twice, polling it once", peer.key());
                }
                fresh
            })
            .collect();

        let limit = self.cache.config().max_concurrent_polls.max(1);
        tracing::info!(
            "Polling {} peers ({} skipped), {} at a time",
            enabled.len(),
            peers.len() - enabled.len(),
            limit
        );

        let results: Vec<PollResult> = stream::iter(enabled)
            .map(|peer| self.cache.fetch(peer, force_refresh))
            .buffered(limit)
            .collect()
            .await;

        let statuses = results
            .iter()
            .map(|result| (result.peer.key(), result.status))
            .collect();
        let index = aggregate(&results);

        tracing::info!("Poll complete: {} torrents across the fleet", index.len());
        PollOutcome { index, statuses }
    }
}

/// Merges poll results into a torrent index.
///
/// Dead peers contribute nothing. The first result to report an info hash
/// fixes its name and size; later reports only add holders.
pub fn aggregate(results: &[PollResult]) -> TorrentIndex {
    let mut index = TorrentIndex::new();

    for result in results {
        if result.status == PollStatus::Dead {
            continue;
        }
        let Some(snapshot) = &result.snapshot else {
            continue;
        };

        let holder = result.peer.key();
        for record in snapshot {
            let info_hash = record.hash_string.to_ascii_lowercase();
            let holding = index
                .entry(info_hash.clone())
                .or_insert_with(|| TorrentHolding {
                    info_hash,
                    name: record.name.clone(),
                    total_size: record.total_size,
                    holders: Vec::new(),
                });
            holding
                .holders
                .push((holder.clone(), record.completion_ratio()));
        }
    }

    index
}
