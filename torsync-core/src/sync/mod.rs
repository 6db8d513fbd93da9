//! Sync cycle orchestration and reporting

pub mod orchestrator;

pub use orchestrator::{
    AddResult, DestinationOutcome, PlacementOutcome, SourceError, SyncOrchestrator, SyncReport,
    TorrentPlacement, TorrentSource,
};
