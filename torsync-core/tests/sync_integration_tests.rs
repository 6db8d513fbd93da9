//! Integration tests for a full sync cycle.
//!
//! These tests drive poll, placement and add through the public
//! SyncOrchestrator API with scripted daemons, a manual clock and an
//! in-memory snapshot cache.

use std::sync::Arc;

use torsync_core::config::{PollConfig, ReplicationConfig};
use torsync_core::metainfo;
use torsync_core::peer::{ClientKind, Peer};
use torsync_core::poll::{FailureBackoff, MemoryCacheStore, PollCache, PollStatus, Poller};
use torsync_core::sync::{AddResult, PlacementOutcome, SyncOrchestrator};
use torsync_core::testing::{
    ManualClock, ScriptedDriver, ScriptedDriverFactory, StaticTorrentSource, TorrentFileBuilder,
    record,
};

const NOW: u64 = 1_700_000_000;

/// Three-daemon fleet where two peers hold ubuntu.iso.
struct FleetFixture {
    peers: Vec<Peer>,
    factory: Arc<ScriptedDriverFactory>,
    store: Arc<MemoryCacheStore>,
    clock: Arc<ManualClock>,
    backoff: Arc<FailureBackoff>,
    torrent: Vec<u8>,
    drivers: Vec<Arc<ScriptedDriver>>,
}

impl FleetFixture {
    fn new() -> Self {
        let torrent = TorrentFileBuilder::new("ubuntu.iso")
            .length(4 * 1024 * 1024)
            .build();
        let hash = metainfo::inspect(&torrent).unwrap().info_hash;

        let peers = vec![
            Peer::new(ClientKind::Transmission, "10.0.0.1", 9091).with_nickname("alpha"),
            Peer::new(ClientKind::UTorrent, "10.0.0.2", 8080).with_nickname("beta"),
            Peer::new(ClientKind::Deluge, "10.0.0.3", 58846)
                .with_nickname("gamma")
                .with_storage_cap("1G")
                .with_upload_limit("10M"),
        ];

        let factory = Arc::new(ScriptedDriverFactory::new());
        let drivers: Vec<_> = peers.iter().map(|peer| factory.script(peer)).collect();
        let size = 4 * 1024 * 1024;
        drivers[0].set_listing(vec![record(&hash, "ubuntu.iso", size, Some(size))]);
        drivers[1].set_listing(vec![record(&hash, "ubuntu.iso", 1000, Some(500))]);

        Self {
            peers,
            factory,
            store: Arc::new(MemoryCacheStore::new()),
            clock: Arc::new(ManualClock::new(NOW)),
            backoff: Arc::new(FailureBackoff::new()),
            torrent,
            drivers,
        }
    }

    fn orchestrator(&self, target_replicas: usize) -> SyncOrchestrator {
        let cache = PollCache::new(
            self.store.clone(),
            self.factory.clone(),
            self.clock.clone(),
            self.backoff.clone(),
            PollConfig::default(),
        );
        SyncOrchestrator::new(
            self.peers.clone(),
            Poller::new(Arc::new(cache)),
            self.factory.clone(),
            Arc::new(StaticTorrentSource::new().with_file("ubuntu.iso", self.torrent.clone())),
            ReplicationConfig {
                target_replicas,
                dry_run: false,
            },
        )
    }
}

#[tokio::test]
async fn test_under_replicated_torrent_is_mirrored_to_third_peer() {
    let fleet = FleetFixture::new();
    let report = fleet.orchestrator(3).run_cycle(false).await;

    assert!(report.statuses.values().all(|status| *status == PollStatus::Live));
    assert_eq!(report.placements.len(), 1);

    let placement = &report.placements[0];
    assert_eq!(placement.name, "ubuntu.iso");
    assert_eq!(placement.holders, 2);
    let PlacementOutcome::Pushed { destinations } = &placement.outcome else {
        panic!("expected a push, got {:?}", placement.outcome);
    };
    assert_eq!(destinations.len(), 1);
    assert_eq!(destinations[0].nickname, "gamma");
    assert_eq!(destinations[0].result, AddResult::Added);

    assert_eq!(fleet.drivers[2].added(), vec![fleet.torrent.clone()]);
    assert_eq!(fleet.drivers[0].add_calls(), 0);
    assert_eq!(fleet.drivers[1].add_calls(), 0);
}

#[tokio::test]
async fn test_holder_ratios_come_from_each_daemon() {
    let fleet = FleetFixture::new();
    let outcome = fleet.orchestrator(3).poll(false).await;

    let holding = outcome.index.values().next().unwrap();
    let ratios: Vec<f64> = holding.holders.iter().map(|(_, ratio)| *ratio).collect();
    assert_eq!(ratios, vec![1.0, 0.5]);
    assert_eq!(holding.total_size, 4 * 1024 * 1024);
}

#[tokio::test]
async fn test_second_cycle_within_a_minute_uses_cache() {
    let fleet = FleetFixture::new();
    fleet.orchestrator(2).run_cycle(false).await;

    fleet.clock.advance(30);
    let report = fleet.orchestrator(2).run_cycle(false).await;

    assert!(report.statuses.values().all(|status| *status == PollStatus::Cached));
    assert!(fleet.drivers.iter().all(|driver| driver.list_calls() == 1));

    fleet.clock.advance(31);
    fleet.orchestrator(2).run_cycle(false).await;
    assert!(fleet.drivers.iter().all(|driver| driver.list_calls() == 2));
}

#[tokio::test]
async fn test_unreachable_holder_keeps_its_stale_snapshot() {
    let fleet = FleetFixture::new();
    fleet.orchestrator(2).run_cycle(false).await;

    fleet.drivers[1].fail_listing();
    fleet.clock.advance(24 * 60 * 60);
    let report = fleet.orchestrator(2).run_cycle(false).await;

    assert_eq!(report.statuses[&fleet.peers[1].key()], PollStatus::Cached);
    assert_eq!(report.placements[0].holders, 2);
    assert_eq!(report.placements[0].outcome, PlacementOutcome::Satisfied);
}

#[tokio::test]
async fn test_dead_peer_still_receives_copies() {
    let fleet = FleetFixture::new();
    fleet.drivers[1].fail_listing();

    let report = fleet.orchestrator(3).run_cycle(false).await;

    assert_eq!(report.statuses[&fleet.peers[1].key()], PollStatus::Dead);
    assert_eq!(report.placements[0].holders, 1);
    let PlacementOutcome::Pushed { destinations } = &report.placements[0].outcome else {
        panic!("expected a push");
    };
    assert_eq!(destinations.len(), 2);
}
