//! CLI command implementations

use std::collections::BTreeMap;
use std::sync::Arc;

use clap::Subcommand;
use torsync_core::config::TorsyncConfig;
use torsync_core::driver::{DriverFactory, NetworkDriverFactory};
use torsync_core::peer::PeerKey;
use torsync_core::poll::{
    FailureBackoff, PollCache, PollStatus, Poller, SystemClock, TorrentIndex,
};
use torsync_core::sync::{AddResult, PlacementOutcome, SyncOrchestrator, SyncReport};
use torsync_core::{Result, TorsyncError};

use crate::catalog::TorrentCatalog;
use crate::file_cache::FileCacheStore;
use crate::settings::Settings;

/// Available CLI commands
#[derive(Subcommand)]
pub enum Commands {
    /// Poll every peer and mirror under-replicated torrents
    Sync {
        /// Number of daemons that should hold each torrent
        #[arg(short, long)]
        target: Option<usize>,
        /// Plan and report without adding anything
        #[arg(long)]
        dry_run: bool,
        /// Ignore cached snapshots younger than a minute
        #[arg(long)]
        refresh: bool,
    },
    /// Show how many peers hold each torrent
    Status {
        /// Ignore cached snapshots younger than a minute
        #[arg(long)]
        refresh: bool,
    },
    /// Remove a torrent from one peer
    Remove {
        /// Peer nickname from the peers file
        peer: String,
        /// Info hash of the torrent
        info_hash: String,
        /// Also delete downloaded data
        #[arg(long)]
        delete_data: bool,
    },
}

/// Handle the CLI command
///
/// # Errors
/// Returns appropriate error based on the command that fails
pub async fn handle_command(command: Commands, settings: &Settings) -> Result<()> {
    let config = TorsyncConfig::from_env();
    match command {
        Commands::Sync {
            target,
            dry_run,
            refresh,
        } => run_sync(settings, config, target, dry_run, refresh).await,
        Commands::Status { refresh } => show_status(settings, config, refresh).await,
        Commands::Remove {
            peer,
            info_hash,
            delete_data,
        } => remove_torrent(settings, config, &peer, &info_hash, delete_data).await,
    }
}

/// Run one sync cycle
///
/// # Errors
/// - `TorsyncError::Configuration` - Peers or torrents file is malformed
/// - `TorsyncError::Io` - Settings files could not be read
pub async fn run_sync(
    settings: &Settings,
    mut config: TorsyncConfig,
    target: Option<usize>,
    dry_run: bool,
    refresh: bool,
) -> Result<()> {
    if let Some(target) = target {
        config.replication.target_replicas = target;
    }
    config.replication.dry_run = dry_run;

    let catalog = Arc::new(TorrentCatalog::load(&settings.torrents_path(), &config.network)?);
    let orchestrator = build_orchestrator(settings, &config, catalog)?;
    let report = orchestrator.run_cycle(refresh).await;

    for line in report_lines(&report) {
        println!("{line}");
    }
    for line in status_lines(&report.statuses) {
        println!("{line}");
    }
    Ok(())
}

/// Show replica counts without adding anything
///
/// # Errors
/// - `TorsyncError::Configuration` - Peers or torrents file is malformed
/// - `TorsyncError::Io` - Settings files could not be read
pub async fn show_status(settings: &Settings, config: TorsyncConfig, refresh: bool) -> Result<()> {
    let catalog = Arc::new(TorrentCatalog::load(&settings.torrents_path(), &config.network)?);
    let orchestrator = build_orchestrator(settings, &config, catalog.clone())?;
    let outcome = orchestrator.poll(refresh).await;

    let mut found = BTreeMap::new();
    for holding in outcome.index.values() {
        let located = match catalog.locate(&holding.name).await {
            Ok(hit) => hit.is_some(),
            Err(error) => {
                tracing::warn!("Catalog lookup for {} failed: {}", holding.name, error);
                false
            }
        };
        found.insert(holding.info_hash.clone(), located);
    }

    for line in holding_lines(&outcome.index, &found) {
        println!("{line}");
    }
    for line in status_lines(&outcome.statuses) {
        println!("{line}");
    }
    Ok(())
}

/// Remove a torrent from the peer called `nickname`
///
/// # Errors
/// - `TorsyncError::Configuration` - No peer has that nickname
/// - `TorsyncError::Driver` - The daemon refused or could not be reached
pub async fn remove_torrent(
    settings: &Settings,
    config: TorsyncConfig,
    nickname: &str,
    info_hash: &str,
    delete_data: bool,
) -> Result<()> {
    let peers = settings.load_peers()?;
    let peer = peers
        .iter()
        .find(|peer| peer.nickname == nickname)
        .ok_or_else(|| TorsyncError::Configuration {
            reason: format!("no peer named '{nickname}'"),
        })?;

    let driver = NetworkDriverFactory::new(config.network).driver_for(peer)?;
    driver.remove(info_hash, delete_data).await?;

    println!("Removed {info_hash} from {}", peer.nickname);
    Ok(())
}

fn build_orchestrator(
    settings: &Settings,
    config: &TorsyncConfig,
    catalog: Arc<TorrentCatalog>,
) -> Result<SyncOrchestrator> {
    let peers = settings.load_peers()?;
    let factory = Arc::new(NetworkDriverFactory::new(config.network.clone()));

    let cache = PollCache::new(
        Arc::new(FileCacheStore::new(settings.cache_dir())),
        factory.clone(),
        Arc::new(SystemClock),
        Arc::new(FailureBackoff::new()),
        config.poll.clone(),
    );

    Ok(SyncOrchestrator::new(
        peers,
        Poller::new(Arc::new(cache)),
        factory,
        catalog,
        config.replication.clone(),
    ))
}

/// One line per destination, plus a line for each torrent that could not
/// be placed.
fn report_lines(report: &SyncReport) -> Vec<String> {
    let mut lines = Vec::new();
    for placement in &report.placements {
        let name = &placement.name;
        match &placement.outcome {
            PlacementOutcome::Satisfied => {}
            PlacementOutcome::NoCandidates => {
                lines.push(format!("{name}: no eligible destination"));
            }
            PlacementOutcome::SourceMissing => {
                lines.push(format!("{name}: torrent file not found"));
            }
            PlacementOutcome::SourceFailed { reason } => {
                lines.push(format!("{name}: torrent lookup failed: {reason}"));
            }
            PlacementOutcome::InfohashMismatch { found } if found.is_empty() => {
                lines.push(format!("{name}: catalog file is not a torrent"));
            }
            PlacementOutcome::InfohashMismatch { found } => {
                lines.push(format!("{name}: catalog file has info hash {found}"));
            }
            PlacementOutcome::Pushed { destinations } => {
                for destination in destinations {
                    let mirroring = format!("mirroring: {name} to {}", destination.nickname);
                    lines.push(match &destination.result {
                        AddResult::Added => mirroring,
                        AddResult::Planned => format!("{mirroring} (dry run)"),
                        AddResult::Failed { reason } => format!("{mirroring} failed: {reason}"),
                    });
                }
            }
        }
    }
    lines
}

/// `<holders> <found 0|1> <name>` per torrent.
fn holding_lines(index: &TorrentIndex, found: &BTreeMap<String, bool>) -> Vec<String> {
    index
        .values()
        .map(|holding| {
            let located = found.get(&holding.info_hash).copied().unwrap_or(false);
            format!(
                "{} {} {}",
                holding.holder_count(),
                u8::from(located),
                holding.name
            )
        })
        .collect()
}

fn status_lines(statuses: &BTreeMap<PeerKey, PollStatus>) -> Vec<String> {
    statuses
        .iter()
        .map(|(peer, status)| format!("{peer} {status}"))
        .collect()
}

#[cfg(test)]
mod tests {
    use torsync_core::poll::TorrentHolding;
    use torsync_core::sync::{DestinationOutcome, TorrentPlacement};

    use super::*;

    fn placement(name: &str, outcome: PlacementOutcome) -> TorrentPlacement {
        TorrentPlacement {
            info_hash: "ab".repeat(20),
            name: name.to_string(),
            holders: 1,
            outcome,
        }
    }

    fn destination(nickname: &str, result: AddResult) -> DestinationOutcome {
        DestinationOutcome {
            peer: PeerKey::new(nickname, 9091),
            nickname: nickname.to_string(),
            result,
        }
    }

    #[test]
    fn test_report_lines_describe_each_destination() {
        let report = SyncReport {
            statuses: BTreeMap::new(),
            placements: vec![
                placement("done.iso", PlacementOutcome::Satisfied),
                placement(
                    "ubuntu.iso",
                    PlacementOutcome::Pushed {
                        destinations: vec![
                            destination("attic", AddResult::Added),
                            destination(
                                "garage",
                                AddResult::Failed {
                                    reason: "disk full".to_string(),
                                },
                            ),
                        ],
                    },
                ),
                placement("lost.iso", PlacementOutcome::SourceMissing),
            ],
        };

        assert_eq!(
            report_lines(&report),
            vec![
                "mirroring: ubuntu.iso to attic",
                "mirroring: ubuntu.iso to garage failed: disk full",
                "lost.iso: torrent file not found",
            ]
        );
    }

    #[test]
    fn test_dry_run_lines_are_marked() {
        let report = SyncReport {
            statuses: BTreeMap::new(),
            placements: vec![placement(
                "arch.iso",
                PlacementOutcome::Pushed {
                    destinations: vec![destination("attic", AddResult::Planned)],
                },
            )],
        };

        assert_eq!(
            report_lines(&report),
            vec!["mirroring: arch.iso to attic (dry run)"]
        );
    }

    #[test]
    fn test_holding_lines_show_count_found_and_name() {
        let mut index = TorrentIndex::new();
        index.insert(
            "ab".repeat(20),
            TorrentHolding {
                info_hash: "ab".repeat(20),
                name: "ubuntu.iso".to_string(),
                total_size: 10,
                holders: vec![
                    (PeerKey::new("a", 1), 1.0),
                    (PeerKey::new("b", 2), 0.5),
                ],
            },
        );
        index.insert(
            "cd".repeat(20),
            TorrentHolding {
                info_hash: "cd".repeat(20),
                name: "debian.iso".to_string(),
                total_size: 10,
                holders: vec![(PeerKey::new("a", 1), 1.0)],
            },
        );
        let found = BTreeMap::from([("ab".repeat(20), true)]);

        assert_eq!(
            holding_lines(&index, &found),
            vec!["2 1 ubuntu.iso", "1 0 debian.iso"]
        );
    }

    #[test]
    fn test_status_lines_use_endpoints() {
        let statuses = BTreeMap::from([
            (PeerKey::new("seedbox", 9091), PollStatus::Live),
            (PeerKey::new("attic", 58846), PollStatus::Dead),
        ]);

        assert_eq!(
            status_lines(&statuses),
            vec!["attic:58846 dead", "seedbox:9091 live"]
        );
    }
}
