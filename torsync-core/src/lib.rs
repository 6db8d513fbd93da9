//! Torsync Core - replica maintenance across a fleet of torrent daemons
//!
//! Polls Transmission, uTorrent and Deluge daemons, works out which torrents
//! are held by fewer daemons than the replication target, and pushes the
//! missing copies to capacity-weighted destinations.

pub mod config;
pub mod driver;
pub mod metainfo;
pub mod peer;
pub mod poll;
pub mod rencode;
pub mod replication;
pub mod sync;
#[cfg(any(test, feature = "test-utils"))]
pub mod testing;
pub mod tracing_setup;

// Re-export main types for convenient access
pub use config::TorsyncConfig;
pub use driver::{DriverError, DriverFactory, NetworkDriverFactory, PeerDriver, TorrentRecord};
pub use metainfo::MetainfoError;
pub use peer::{ClientKind, Peer, PeerKey};
pub use poll::{CacheError, CacheStore, PollCache, PollStatus, Poller, SystemClock};
pub use rencode::{DecodeError, EncodeError};
pub use sync::{SourceError, SyncOrchestrator, SyncReport, TorrentSource};

/// Errors surfaced to the command line from any subsystem.
#[derive(Debug, thiserror::Error)]
pub enum TorsyncError {
    #[error("Driver error: {0}")]
    Driver(#[from] DriverError),

    #[error("Codec error: {0}")]
    Codec(#[from] DecodeError),

    #[error("Metainfo error: {0}")]
    Metainfo(#[from] MetainfoError),

    #[error("Cache error: {reason}")]
    Cache { reason: String },

    #[error("Torrent source error: {reason}")]
    Source { reason: String },

    #[error("Configuration error: {reason}")]
    Configuration { reason: String },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl TorsyncError {
    /// Returns a user-friendly error message suitable for display.
    pub fn user_message(&self) -> String {
        match self {
            TorsyncError::Driver(e) => match e {
                DriverError::Transport { endpoint, .. } | DriverError::Timeout { endpoint, .. } => {
                    format!("Could not reach daemon at {endpoint}")
                }
                DriverError::Protocol { message, .. } => format!("Daemon refused: {message}"),
                DriverError::Tls { .. } => "Secure connection to daemon failed".to_string(),
                DriverError::Metainfo(MetainfoError::InvalidTorrentFile { reason }) => {
                    format!("Invalid torrent file: {reason}")
                }
                _ => "Daemon communication error occurred".to_string(),
            },
            TorsyncError::Codec(_) => "Daemon sent a malformed response".to_string(),
            TorsyncError::Metainfo(MetainfoError::InvalidTorrentFile { reason }) => {
                format!("Invalid torrent file: {reason}")
            }
            TorsyncError::Cache { .. } => "Snapshot cache error occurred".to_string(),
            TorsyncError::Source { reason } => format!("Could not read torrent catalog: {reason}"),
            TorsyncError::Configuration { reason } => format!("Configuration problem: {reason}"),
            TorsyncError::Io(_) => "File system error occurred".to_string(),
        }
    }

    /// Checks if this error is due to user input validation.
    pub fn is_user_error(&self) -> bool {
        matches!(
            self,
            TorsyncError::Configuration { .. }
                | TorsyncError::Metainfo(_)
                | TorsyncError::Driver(DriverError::Metainfo(_))
        )
    }
}

impl From<CacheError> for TorsyncError {
    fn from(error: CacheError) -> Self {
        TorsyncError::Cache {
            reason: error.to_string(),
        }
    }
}

impl From<SourceError> for TorsyncError {
    fn from(error: SourceError) -> Self {
        TorsyncError::Source {
            reason: error.to_string(),
        }
    }
}

pub type Result<T> = std::result::Result<T, TorsyncError>;
