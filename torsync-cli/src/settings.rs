//! Settings directory layout and the peers file format.

use std::fs;
use std::path::{Path, PathBuf};

use torsync_core::peer::{ClientKind, Peer};
use torsync_core::{Result, TorsyncError};

const DEFAULT_DIR_NAME: &str = ".torrentsync";
const PEERS_FILE: &str = "peers";
const TORRENTS_FILE: &str = "torrents";
const CACHE_DIR: &str = "cache";
const LOGS_DIR: &str = "logs";

/// Paths inside a bootstrapped settings directory.
#[derive(Debug, Clone)]
pub struct Settings {
    root: PathBuf,
}

impl Settings {
    /// Returns `explicit`, or `$HOME/.torrentsync` when absent.
    ///
    /// # Errors
    ///
    /// - `TorsyncError::Configuration` - If no directory is given and `HOME` is unset
    pub fn resolve_dir(explicit: Option<PathBuf>) -> Result<PathBuf> {
        match explicit {
            Some(dir) => Ok(dir),
            None => Ok(home_dir()?.join(DEFAULT_DIR_NAME)),
        }
    }

    /// Opens `root`, creating the default layout on first use.
    ///
    /// A fresh directory gets a peers file naming the local Transmission
    /// daemon, a catalog pointing at Transmission's torrent directory and an
    /// empty cache directory. Existing files are never rewritten.
    ///
    /// # Errors
    ///
    /// - `TorsyncError::Io` - If the directory or its files cannot be created
    pub fn bootstrap(root: &Path) -> Result<Self> {
        let settings = Self {
            root: root.to_path_buf(),
        };
        if !root.exists() {
            fs::create_dir_all(root)?;
            fs::write(settings.peers_path(), "transmission localhost 9091\n")?;
            let catalog = match home_dir() {
                Ok(home) => format!("file:{}/.config/transmission/torrents\n", home.display()),
                Err(_) => String::new(),
            };
            fs::write(settings.torrents_path(), catalog)?;
            tracing::info!("Created settings directory {}", root.display());
        }
        fs::create_dir_all(settings.cache_dir())?;
        Ok(settings)
    }

    pub fn peers_path(&self) -> PathBuf {
        self.root.join(PEERS_FILE)
    }

    pub fn torrents_path(&self) -> PathBuf {
        self.root.join(TORRENTS_FILE)
    }

    pub fn cache_dir(&self) -> PathBuf {
        self.root.join(CACHE_DIR)
    }

    pub fn logs_dir(&self) -> PathBuf {
        self.root.join(LOGS_DIR)
    }

    /// # Errors
    ///
    /// - `TorsyncError::Io` - If the peers file cannot be read
    /// - `TorsyncError::Configuration` - If a line is malformed
    pub fn load_peers(&self) -> Result<Vec<Peer>> {
        parse_peers(&fs::read_to_string(self.peers_path())?)
    }
}

fn home_dir() -> Result<PathBuf> {
    std::env::var_os("HOME")
        .map(PathBuf::from)
        .ok_or_else(|| TorsyncError::Configuration {
            reason: "HOME is not set; pass --settings-dir".to_string(),
        })
}

/// Parses the peers file.
///
/// Each line reads `<type> <host> <port> [user] [pass] [key=value ...]`.
/// A `#` or `!` glued to the type keeps the peer but disables it. A line
/// starting with `#` that does not parse as a peer is a comment.
///
/// # Errors
///
/// - `TorsyncError::Configuration` - If a line names an unknown client type,
///   lacks a host or port, or has an invalid port
pub fn parse_peers(text: &str) -> Result<Vec<Peer>> {
    let mut peers = Vec::new();
    for (index, line) in text.lines().enumerate() {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        match parse_peer_line(line) {
            Ok(peer) => peers.push(peer),
            Err(_) if line.starts_with('#') => {}
            Err(reason) => {
                return Err(TorsyncError::Configuration {
                    reason: format!("peers line {}: {reason}", index + 1),
                });
            }
        }
    }
    Ok(peers)
}

fn parse_peer_line(line: &str) -> std::result::Result<Peer, String> {
    let mut fields = line.split_whitespace();
    let type_field = fields.next().ok_or("empty line")?;
    let (client, disabled) = ClientKind::parse_type_field(type_field)?;
    let host = fields.next().ok_or("missing host")?;
    let port = fields.next().ok_or("missing port")?;
    let port: u16 = port
        .parse()
        .map_err(|_| format!("invalid port '{port}'"))?;

    let mut peer = Peer::new(client, host, port);
    peer.disabled = disabled;

    let mut positional = 0;
    for field in fields {
        if let Some((key, value)) = field.split_once('=') {
            match key {
                "nick" => peer.nickname = value.to_string(),
                "upload" => peer.upload_limit = Some(value.to_string()),
                "storage" => peer.storage_cap = Some(value.to_string()),
                _ => tracing::warn!("Ignoring unknown peer option '{}' for {}", key, peer.key()),
            }
            continue;
        }
        let value = (field != "-").then(|| field.to_string());
        match positional {
            0 => peer.username = value,
            1 => peer.password = value,
            _ => return Err(format!("unexpected field '{field}'")),
        }
        positional += 1;
    }
    Ok(peer)
}
