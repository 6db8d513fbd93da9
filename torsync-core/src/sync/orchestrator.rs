//! One sync cycle: poll, plan, source, push.

use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use rand::SeedableRng;
use rand::rngs::StdRng;

use crate::config::ReplicationConfig;
use crate::driver::DriverFactory;
use crate::metainfo;
use crate::peer::{Peer, PeerKey};
use crate::poll::{PollOutcome, PollStatus, Poller, TorrentHolding};
use crate::replication::{self, PlacementDecision};

/// Errors raised while locating a torrent file.
#[derive(Debug, thiserror::Error)]
pub enum SourceError {
    #[error("Torrent catalog unavailable: {reason}")]
    Unavailable { reason: String },

    #[error("I/O error reading torrent file")]
    Io(#[from] std::io::Error),
}

/// Looks up `.torrent` files by name.
#[async_trait]
pub trait TorrentSource: Send + Sync {
    /// Returns the raw bytes of the torrent called `name`, or `None` if no
    /// catalog has it.
    ///
    /// # Errors
    ///
    /// - `SourceError::Unavailable` - If a catalog cannot be consulted
    async fn find_torrent_bytes(
        &self,
        name: &str,
        info_hash: &str,
    ) -> Result<Option<Vec<u8>>, SourceError>;
}

/// Result of pushing a torrent to one destination.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AddResult {
    Added,
    /// Dry run; `add` was not called
    Planned,
    Failed { reason: String },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DestinationOutcome {
    pub peer: PeerKey,
    pub nickname: String,
    pub result: AddResult,
}

/// What happened to one under-replicated torrent.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PlacementOutcome {
    /// Already at or above the target
    Satisfied,
    /// No peer qualified as a destination
    NoCandidates,
    /// No catalog carries the torrent file
    SourceMissing,
    SourceFailed { reason: String },
    /// The catalog file is a different torrent than the one held; `found`
    /// is empty when the file is not a torrent at all
    InfohashMismatch { found: String },
    Pushed { destinations: Vec<DestinationOutcome> },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TorrentPlacement {
    pub info_hash: String,
    pub name: String,
    pub holders: usize,
    pub outcome: PlacementOutcome,
}

/// Everything one cycle observed and did.
#[derive(Debug, Clone, Default)]
pub struct SyncReport {
    pub statuses: BTreeMap<PeerKey, PollStatus>,
    /// One entry per torrent in the index, in info hash order
    pub placements: Vec<TorrentPlacement>,
}

impl SyncReport {
    /// Destinations that accepted a torrent this cycle.
    pub fn added_count(&self) -> usize {
        self.destination_results()
            .filter(|result| **result == AddResult::Added)
            .count()
    }

    pub fn failed_count(&self) -> usize {
        self.destination_results()
            .filter(|result| matches!(result, AddResult::Failed { .. }))
            .count()
    }

    fn destination_results(&self) -> impl Iterator<Item = &AddResult> {
        self.placements
            .iter()
            .filter_map(|placement| match &placement.outcome {
                PlacementOutcome::Pushed { destinations } => Some(destinations),
                _ => None,
            })
            .flatten()
            .map(|destination| &destination.result)
    }
}

/// Drives poll, placement and add for a fixed peer list.
pub struct SyncOrchestrator {
    peers: Vec<Peer>,
    poller: Poller,
    factory: Arc<dyn DriverFactory>,
    source: Arc<dyn TorrentSource>,
    config: ReplicationConfig,
    rng: Mutex<StdRng>,
}

impl SyncOrchestrator {
    pub fn new(
        peers: Vec<Peer>,
        poller: Poller,
        factory: Arc<dyn DriverFactory>,
        source: Arc<dyn TorrentSource>,
        config: ReplicationConfig,
    ) -> Self {
        Self {
            peers,
            poller,
            factory,
            source,
            config,
            rng: Mutex::new(StdRng::from_os_rng()),
        }
    }

    /// Makes destination sampling reproducible.
    pub fn with_seed(self, seed: u64) -> Self {
        Self {
            rng: Mutex::new(StdRng::seed_from_u64(seed)),
            ..self
        }
    }

    pub fn peers(&self) -> &[Peer] {
        &self.peers
    }

    /// Runs the poll phase only.
    pub async fn poll(&self, force_refresh: bool) -> PollOutcome {
        self.poller.poll_all(&self.peers, force_refresh).await
    }

    /// Runs one full cycle. Never fails as a whole: every peer and
    /// destination failure is recorded in the report.
    pub async fn run_cycle(&self, force_refresh: bool) -> SyncReport {
        let PollOutcome { index, statuses } = self.poll(force_refresh).await;

        let mut placements = Vec::with_capacity(index.len());
        for holding in index.values() {
            let outcome = self.place(holding).await;
            placements.push(TorrentPlacement {
                info_hash: holding.info_hash.clone(),
                name: holding.name.clone(),
                holders: holding.holder_count(),
                outcome,
            });
        }

        let report = SyncReport {
            statuses,
            placements,
        };
        tracing::info!(
            "Sync cycle done: {} torrents, {} copies added, {} failed",
            report.placements.len(),
            report.added_count(),
            report.failed_count()
        );
        report
    }

    /// Chooses destinations for `holding` without contacting anything.
    pub fn decide(&self, holding: &TorrentHolding) -> PlacementDecision {
        let destinations = {
            let mut rng = self.rng.lock();
            replication::plan_with_rng(
                &self.peers,
                holding,
                self.config.target_replicas,
                &mut *rng,
            )
        };
        PlacementDecision {
            info_hash: holding.info_hash.clone(),
            destinations: destinations.into_iter().cloned().collect(),
        }
    }

    async fn place(&self, holding: &TorrentHolding) -> PlacementOutcome {
        if holding.holder_count() >= self.config.target_replicas {
            return PlacementOutcome::Satisfied;
        }

        let decision = self.decide(holding);
        if decision.is_empty() {
            tracing::warn!("{}: no eligible destination", holding.name);
            return PlacementOutcome::NoCandidates;
        }

        let torrent = match self
            .source
            .find_torrent_bytes(&holding.name, &holding.info_hash)
            .await
        {
            Ok(Some(torrent)) => torrent,
            Ok(None) => {
                tracing::warn!("{}: torrent file not found in any catalog", holding.name);
                return PlacementOutcome::SourceMissing;
            }
            Err(error) => {
                tracing::warn!("{}: torrent lookup failed: {}", holding.name, error);
                return PlacementOutcome::SourceFailed {
                    reason: error.to_string(),
                };
            }
        };

        match metainfo::inspect(&torrent) {
            Ok(summary) if summary.info_hash == holding.info_hash => {}
            Ok(summary) => {
                tracing::warn!(
                    "{}: catalog file has info hash {}, expected {}",
                    holding.name,
                    summary.info_hash,
                    holding.info_hash
                );
                return PlacementOutcome::InfohashMismatch {
                    found: summary.info_hash,
                };
            }
            Err(error) => {
                tracing::warn!("{}: catalog file unreadable: {}", holding.name, error);
                return PlacementOutcome::InfohashMismatch {
                    found: String::new(),
                };
            }
        }

        let mut destinations = Vec::with_capacity(decision.destinations.len());
        for peer in &decision.destinations {
            tracing::info!("mirroring: {} to {}", holding.name, peer.nickname);
            let result = if self.config.dry_run {
                AddResult::Planned
            } else {
                self.push(peer, &torrent).await
            };
            destinations.push(DestinationOutcome {
                peer: peer.key(),
                nickname: peer.nickname.clone(),
                result,
            });
        }
        PlacementOutcome::Pushed { destinations }
    }

    async fn push(&self, peer: &Peer, torrent: &[u8]) -> AddResult {
        let added = match self.factory.driver_for(peer) {
            Ok(driver) => driver.add(torrent).await,
            Err(error) => Err(error),
        };
        match added {
            Ok(()) => AddResult::Added,
            Err(error) => {
                tracing::warn!("Adding to {} failed: {}", peer.nickname, error);
                AddResult::Failed {
                    reason: error.to_string(),
                }
            }
        }
    }
}
