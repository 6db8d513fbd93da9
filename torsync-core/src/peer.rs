//! Torrent daemon descriptors and capacity literals.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Characters that, leading a peer's type field, disable the peer.
pub const DISABLED_MARKERS: [char; 2] = ['#', '!'];

/// Wire protocol spoken by a torrent daemon.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ClientKind {
    Transmission,
    UTorrent,
    Deluge,
}

impl ClientKind {
    /// Parses a peer type field such as `deluge` or `#utorrent`.
    ///
    /// Returns the client kind and whether the field carried a disabled marker.
    ///
    /// # Errors
    ///
    /// - `String` - If the type names no known client
    pub fn parse_type_field(field: &str) -> Result<(Self, bool), String> {
        let disabled = field.starts_with(DISABLED_MARKERS);
        let name = field.trim_start_matches(DISABLED_MARKERS);
        Ok((name.parse()?, disabled))
    }
}

impl FromStr for ClientKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "transmission" => Ok(ClientKind::Transmission),
            "utorrent" => Ok(ClientKind::UTorrent),
            "deluge" => Ok(ClientKind::Deluge),
            _ => Err(format!("Unknown client type: {s}")),
        }
    }
}

impl fmt::Display for ClientKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ClientKind::Transmission => write!(f, "transmission"),
            ClientKind::UTorrent => write!(f, "utorrent"),
            ClientKind::Deluge => write!(f, "deluge"),
        }
    }
}

/// Identity of a daemon endpoint, rendered as `host:port`.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct PeerKey {
    pub host: String,
    pub port: u16,
}

impl PeerKey {
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
        }
    }

    /// Key under which the peer's snapshot is persisted.
    pub fn cache_key(&self) -> String {
        format!("{}_{}", self.host, self.port)
    }
}

impl fmt::Display for PeerKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.host, self.port)
    }
}

/// A configured torrent daemon.
///
/// Immutable once loaded. Capacity attributes keep the raw literal so a
/// malformed setting can fall back to a soft default where it is consumed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Peer {
    pub nickname: String,
    pub client: ClientKind,
    pub host: String,
    pub port: u16,
    pub username: Option<String>,
    pub password: Option<String>,
    /// Upload capacity literal, used as the placement weight
    pub upload_limit: Option<String>,
    /// Storage capacity literal, used to exclude undersized destinations
    pub storage_cap: Option<String>,
    /// Skipped by polling and placement
    pub disabled: bool,
}

impl Peer {
    /// Creates an enabled peer without credentials or capacity settings.
    ///
    /// The nickname defaults to `host:port`.
    pub fn new(client: ClientKind, host: impl Into<String>, port: u16) -> Self {
        let host = host.into();
        Self {
            nickname: format!("{host}:{port}"),
            client,
            host,
            port,
            username: None,
            password: None,
            upload_limit: None,
            storage_cap: None,
            disabled: false,
        }
    }

    pub fn with_nickname(mut self, nickname: impl Into<String>) -> Self {
        self.nickname = nickname.into();
        self
    }

    pub fn with_credentials(
        mut self,
        username: impl Into<String>,
        password: impl Into<String>,
    ) -> Self {
        self.username = Some(username.into());
        self.password = Some(password.into());
        self
    }

    pub fn with_upload_limit(mut self, literal: impl Into<String>) -> Self {
        self.upload_limit = Some(literal.into());
        self
    }

    pub fn with_storage_cap(mut self, literal: impl Into<String>) -> Self {
        self.storage_cap = Some(literal.into());
        self
    }

    pub fn key(&self) -> PeerKey {
        PeerKey::new(self.host.clone(), self.port)
    }

    /// True if this peer is the endpoint `key` (host and port both match).
    pub fn is_endpoint(&self, key: &PeerKey) -> bool {
        self.host == key.host && self.port == key.port
    }
}

/// Parses a capacity literal such as `512`, `300K`, `20G`.
///
/// Suffixes `K`, `M`, `G`, `T` (either case) multiply by powers of 1024;
/// no suffix means bytes. Returns `None` for anything unparsable or
/// overflowing.
pub fn parse_capacity(literal: &str) -> Option<u64> {
    let literal = literal.trim();
    let (digits, exponent) = match literal.chars().last()?.to_ascii_uppercase() {
        'K' => (&literal[..literal.len() - 1], 1),
        'M' => (&literal[..literal.len() - 1], 2),
        'G' => (&literal[..literal.len() - 1], 3),
        'T' => (&literal[..literal.len() - 1], 4),
        _ => (literal, 0),
    };

    if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }

    let base: u64 = digits.parse().ok()?;
    base.checked_mul(1024u64.checked_pow(exponent)?)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_capacity_suffixes() {
        assert_eq!(parse_capacity("512"), Some(512));
        assert_eq!(parse_capacity("1K"), Some(1024));
        assert_eq!(parse_capacity("3M"), Some(3 * 1024 * 1024));
        assert_eq!(parse_capacity("2G"), Some(2 * 1024 * 1024 * 1024));
        assert_eq!(parse_capacity("1T"), Some(1024u64.pow(4)));
        assert_eq!(parse_capacity(" 10k "), Some(10 * 1024));
        assert_eq!(parse_capacity("0"), Some(0));
    }

    #[test]
    fn test_parse_capacity_rejects_garbage() {
        assert_eq!(parse_capacity(""), None);
        assert_eq!(parse_capacity("G"), None);
        assert_eq!(parse_capacity("12X"), None);
        assert_eq!(parse_capacity("-5M"), None);
        assert_eq!(parse_capacity("1.5G"), None);
        assert_eq!(parse_capacity("99999999999999999999T"), None);
        assert_eq!(parse_capacity("99999999T"), None);
    }

    #[test]
    fn test_type_field_disabled_marker() {
        assert_eq!(
            ClientKind::parse_type_field("deluge").unwrap(),
            (ClientKind::Deluge, false)
        );
        assert_eq!(
            ClientKind::parse_type_field("#transmission").unwrap(),
            (ClientKind::Transmission, true)
        );
        assert_eq!(
            ClientKind::parse_type_field("!uTorrent").unwrap(),
            (ClientKind::UTorrent, true)
        );
        assert!(ClientKind::parse_type_field("rtorrent").is_err());
    }

    #[test]
    fn test_peer_key_rendering() {
        let peer = Peer::new(ClientKind::Transmission, "seedbox", 9091);
        assert_eq!(peer.key().to_string(), "seedbox:9091");
        assert_eq!(peer.key().cache_key(), "seedbox_9091");
        assert_eq!(peer.nickname, "seedbox:9091");
    }

    #[test]
    fn test_endpoint_match_requires_host_and_port() {
        let peer = Peer::new(ClientKind::Deluge, "nas", 58846);
        assert!(peer.is_endpoint(&PeerKey::new("nas", 58846)));
        assert!(!peer.is_endpoint(&PeerKey::new("nas", 9091)));
        assert!(!peer.is_endpoint(&PeerKey::new("other", 58846)));
    }
}
