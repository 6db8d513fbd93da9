//! Scripted collaborators for tests.
//!
//! Drivers, clock and torrent source whose behavior is set up front, so the
//! poll and sync layers can be exercised without daemons or wall time.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;

use crate::driver::{DriverError, DriverFactory, PeerDriver, Snapshot, TorrentRecord};
use crate::peer::{Peer, PeerKey};
use crate::poll::Clock;
use crate::sync::{SourceError, TorrentSource};

/// Shorthand for a snapshot record.
pub fn record(hash: &str, name: &str, total_size: u64, have_valid: Option<u64>) -> TorrentRecord {
    TorrentRecord {
        hash_string: hash.to_string(),
        id: None,
        name: name.to_string(),
        total_size,
        have_valid,
    }
}

#[derive(Debug, Default)]
struct Script {
    listing: Option<Snapshot>,
    list_calls: usize,
    delay: Option<Duration>,
    add_failure: Option<String>,
    add_calls: usize,
    added: Vec<Vec<u8>>,
    removed: Vec<(String, bool)>,
}

/// Driver answering from a script. Lists an empty snapshot until told
/// otherwise.
#[derive(Debug)]
pub struct ScriptedDriver {
    endpoint: String,
    script: Mutex<Script>,
}

impl ScriptedDriver {
    pub fn new(endpoint: impl Into<String>) -> Self {
        Self {
            endpoint: endpoint.into(),
            script: Mutex::new(Script {
                listing: Some(Vec::new()),
                ..Script::default()
            }),
        }
    }

    pub fn set_listing(&self, listing: Snapshot) {
        self.script.lock().listing = Some(listing);
    }

    /// Makes `list` fail as if the daemon refused the connection.
    pub fn fail_listing(&self) {
        self.script.lock().listing = None;
    }

    /// Delays every `list` answer.
    pub fn set_delay(&self, delay: Duration) {
        self.script.lock().delay = Some(delay);
    }

    pub fn fail_adds(&self, reason: impl Into<String>) {
        self.script.lock().add_failure = Some(reason.into());
    }

    pub fn list_calls(&self) -> usize {
        self.script.lock().list_calls
    }

    pub fn add_calls(&self) -> usize {
        self.script.lock().add_calls
    }

    /// Torrents accepted by `add`, in call order.
    pub fn added(&self) -> Vec<Vec<u8>> {
        self.script.lock().added.clone()
    }

    pub fn removed(&self) -> Vec<(String, bool)> {
        self.script.lock().removed.clone()
    }

    fn refused(&self) -> DriverError {
        DriverError::Transport {
            endpoint: self.endpoint.clone(),
            reason: "Connection refused".to_string(),
        }
    }
}

#[async_trait]
impl PeerDriver for ScriptedDriver {
    async fn list(&self) -> Result<Snapshot, DriverError> {
        let delay = {
            let mut script = self.script.lock();
            script.list_calls += 1;
            script.delay
        };
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        self.script.lock().listing.clone().ok_or_else(|| self.refused())
    }

    async fn add(&self, torrent: &[u8]) -> Result<(), DriverError> {
        let mut script = self.script.lock();
        script.add_calls += 1;
        if let Some(reason) = &script.add_failure {
            return Err(DriverError::Protocol {
                message: reason.clone(),
                response: None,
            });
        }
        script.added.push(torrent.to_vec());
        Ok(())
    }

    async fn remove(&self, info_hash: &str, delete_data: bool) -> Result<(), DriverError> {
        self.script
            .lock()
            .removed
            .push((info_hash.to_string(), delete_data));
        Ok(())
    }

    fn endpoint(&self) -> &str {
        &self.endpoint
    }
}

/// Hands out registered [`ScriptedDriver`]s; unregistered peers are
/// unreachable.
#[derive(Debug, Default)]
pub struct ScriptedDriverFactory {
    drivers: Mutex<HashMap<PeerKey, Arc<ScriptedDriver>>>,
}

impl ScriptedDriverFactory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&self, key: &PeerKey, driver: Arc<ScriptedDriver>) {
        self.drivers.lock().insert(key.clone(), driver);
    }

    /// Registers a fresh driver for `peer` and returns it.
    pub fn script(&self, peer: &Peer) -> Arc<ScriptedDriver> {
        let driver = Arc::new(ScriptedDriver::new(peer.key().to_string()));
        self.register(&peer.key(), Arc::clone(&driver));
        driver
    }
}

impl DriverFactory for ScriptedDriverFactory {
    fn driver_for(&self, peer: &Peer) -> Result<Arc<dyn PeerDriver>, DriverError> {
        match self.drivers.lock().get(&peer.key()) {
            Some(driver) => Ok(Arc::clone(driver) as Arc<dyn PeerDriver>),
            None => Err(DriverError::Transport {
                endpoint: peer.key().to_string(),
                reason: "Connection refused".to_string(),
            }),
        }
    }
}

/// Clock that only moves when told to.
#[derive(Debug)]
pub struct ManualClock {
    now: AtomicU64,
}

impl ManualClock {
    pub fn new(now: u64) -> Self {
        Self {
            now: AtomicU64::new(now),
        }
    }

    pub fn set(&self, now: u64) {
        self.now.store(now, Ordering::SeqCst);
    }

    pub fn advance(&self, seconds: u64) {
        self.now.fetch_add(seconds, Ordering::SeqCst);
    }
}

impl Clock for ManualClock {
    fn now_epoch_seconds(&self) -> u64 {
        self.now.load(Ordering::SeqCst)
    }
}

/// Torrent source backed by a name-to-bytes map.
#[derive(Debug, Default)]
pub struct StaticTorrentSource {
    files: HashMap<String, Vec<u8>>,
    failure: Option<String>,
    lookups: Mutex<Vec<String>>,
}

impl StaticTorrentSource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_file(mut self, name: impl Into<String>, torrent: Vec<u8>) -> Self {
        self.files.insert(name.into(), torrent);
        self
    }

    /// Makes every lookup fail.
    pub fn failing(reason: impl Into<String>) -> Self {
        Self {
            failure: Some(reason.into()),
            ..Self::default()
        }
    }

    /// Names looked up so far.
    pub fn lookups(&self) -> Vec<String> {
        self.lookups.lock().clone()
    }
}

#[async_trait]
impl TorrentSource for StaticTorrentSource {
    async fn find_torrent_bytes(
        &self,
        name: &str,
        _info_hash: &str,
    ) -> Result<Option<Vec<u8>>, SourceError> {
        self.lookups.lock().push(name.to_string());
        if let Some(reason) = &self.failure {
            return Err(SourceError::Unavailable {
                reason: reason.clone(),
            });
        }
        Ok(self.files.get(name).cloned())
    }
}

/// Builds minimal valid single-file `.torrent` files.
#[derive(Debug, Clone)]
pub struct TorrentFileBuilder {
    name: String,
    length: u64,
    announce: String,
    piece_length: u64,
}

impl TorrentFileBuilder {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            length: 1024,
            announce: "http://tracker.example/announce".to_string(),
            piece_length: 16384,
        }
    }

    pub fn length(mut self, length: u64) -> Self {
        self.length = length;
        self
    }

    pub fn announce(mut self, announce: impl Into<String>) -> Self {
        self.announce = announce.into();
        self
    }

    pub fn build(&self) -> Vec<u8> {
        let pieces = self.length.div_ceil(self.piece_length).max(1) as usize;

        let mut torrent = format!(
            "d8:announce{}:{}4:infod6:lengthi{}e4:name{}:{}12:piece lengthi{}e6:pieces{}:",
            self.announce.len(),
            self.announce,
            self.length,
            self.name.len(),
            self.name,
            self.piece_length,
            pieces * 20
        )
        .into_bytes();
        torrent.extend(std::iter::repeat_n(0xAB, pieces * 20));
        torrent.extend_from_slice(b"ee");
        torrent
    }
}
