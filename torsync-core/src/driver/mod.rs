//! Uniform access to heterogeneous torrent daemons.
//!
//! Each daemon protocol gets a driver implementing [`PeerDriver`]. Drivers
//! perform exactly one attempt per call; retry, caching and backoff policy
//! live in the poll layer.

pub mod deluge;
#[cfg(test)]
mod fake_http;
mod http;
pub mod transmission;
pub mod utorrent;

use std::sync::Arc;

use async_trait::async_trait;
pub use deluge::DelugeDriver;
use serde::{Deserialize, Serialize};
pub use transmission::TransmissionDriver;
pub use utorrent::UTorrentDriver;

use crate::config::NetworkConfig;
use crate::metainfo::MetainfoError;
use crate::peer::{ClientKind, Peer};
use crate::rencode::{self, DecodeError, EncodeError};

/// One torrent as reported by a daemon, in Transmission's field naming.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TorrentRecord {
    pub hash_string: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<i64>,
    pub name: String,
    #[serde(default)]
    pub total_size: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub have_valid: Option<u64>,
}

impl TorrentRecord {
    /// Fraction of the payload the daemon holds verified.
    ///
    /// Zero when the daemon did not report verified bytes or the size is unknown.
    pub fn completion_ratio(&self) -> f64 {
        match self.have_valid {
            Some(have_valid) if self.total_size > 0 => have_valid as f64 / self.total_size as f64,
            _ => 0.0,
        }
    }
}

/// Everything a daemon reported in one `list` call.
pub type Snapshot = Vec<TorrentRecord>;

/// Errors that can occur while talking to a daemon.
#[derive(Debug, thiserror::Error)]
pub enum DriverError {
    #[error("Transport failure talking to {endpoint}: {reason}")]
    Transport { endpoint: String, reason: String },

    #[error("Timed out after {millis}ms talking to {endpoint}")]
    Timeout { endpoint: String, millis: u128 },

    #[error("Protocol error: {message}")]
    Protocol {
        message: String,
        response: Option<rencode::Value>,
    },

    #[error("Malformed rencode payload: {0}")]
    Codec(#[from] DecodeError),

    #[error("Failed to encode request: {0}")]
    Encode(#[from] EncodeError),

    #[error("Invalid torrent: {0}")]
    Metainfo(#[from] MetainfoError),

    #[error("TLS error: {reason}")]
    Tls { reason: String },

    #[error("I/O error")]
    Io(#[from] std::io::Error),
}

impl DriverError {
    /// True for failures where the daemon never produced an answer.
    pub fn is_transport(&self) -> bool {
        matches!(
            self,
            DriverError::Transport { .. }
                | DriverError::Timeout { .. }
                | DriverError::Tls { .. }
                | DriverError::Io(_)
        )
    }
}

/// Capability set shared by all daemon protocols.
#[async_trait]
pub trait PeerDriver: Send + Sync {
    /// Lists every torrent the daemon holds.
    ///
    /// # Errors
    ///
    /// - `DriverError::Transport` - If the daemon is unreachable or answers garbage
    /// - `DriverError::Protocol` - If the daemon rejects the request
    async fn list(&self) -> Result<Snapshot, DriverError>;

    /// Hands raw `.torrent` bytes to the daemon.
    ///
    /// # Errors
    ///
    /// - `DriverError::Transport` - If the daemon is unreachable
    /// - `DriverError::Protocol` - If the daemon rejects the torrent
    async fn add(&self, torrent: &[u8]) -> Result<(), DriverError>;

    /// Removes a torrent, identified by its info hash.
    ///
    /// # Errors
    ///
    /// - `DriverError::Transport` - If the daemon is unreachable
    /// - `DriverError::Protocol` - If the daemon rejects the request
    async fn remove(&self, info_hash: &str, delete_data: bool) -> Result<(), DriverError>;

    /// Returns `host:port` for logging purposes.
    fn endpoint(&self) -> &str;
}

/// Builds the driver that speaks a peer's protocol.
pub trait DriverFactory: Send + Sync {
    /// # Errors
    ///
    /// - `DriverError::Transport` - If the underlying client cannot be built
    /// - `DriverError::Tls` - If the TLS configuration cannot be built
    fn driver_for(&self, peer: &Peer) -> Result<Arc<dyn PeerDriver>, DriverError>;
}

/// Production factory talking to real daemons over the network.
#[derive(Debug, Clone, Default)]
pub struct NetworkDriverFactory {
    config: NetworkConfig,
}

impl NetworkDriverFactory {
    pub fn new(config: NetworkConfig) -> Self {
        Self { config }
    }
}

impl DriverFactory for NetworkDriverFactory {
    fn driver_for(&self, peer: &Peer) -> Result<Arc<dyn PeerDriver>, DriverError> {
        let driver: Arc<dyn PeerDriver> = match peer.client {
            ClientKind::Transmission => Arc::new(TransmissionDriver::new(peer, &self.config)?),
            ClientKind::UTorrent => Arc::new(UTorrentDriver::new(peer, &self.config)?),
            ClientKind::Deluge => Arc::new(DelugeDriver::new(peer, &self.config)?),
        };
        Ok(driver)
    }
}
