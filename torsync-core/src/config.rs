//! Centralized configuration for Torsync.
//!
//! All tunable parameters and settings are defined here to avoid
//! hard-coded values scattered throughout the codebase.

use std::time::Duration;

/// Central configuration for all Torsync components.
///
/// Groups related configuration settings into logical sections.
/// Supports environment variable overrides for runtime customization.
#[derive(Debug, Clone, Default)]
pub struct TorsyncConfig {
    pub poll: PollConfig,
    pub network: NetworkConfig,
    pub replication: ReplicationConfig,
}

/// Snapshot polling and caching configuration.
///
/// Controls how long a persisted snapshot counts as fresh, how long a
/// failed peer is left alone, and how wide the polling fan-out may grow.
#[derive(Debug, Clone)]
pub struct PollConfig {
    /// Age after which a cached snapshot triggers a live fetch
    pub refresh_after: Duration,
    /// Quiet period after a failed fetch before the peer is contacted again
    pub failure_backoff: Duration,
    /// Oldest snapshot still served when the peer cannot be reached
    pub stale_grace: Duration,
    /// Upper bound on a single live fetch
    pub fetch_timeout: Duration,
    /// Maximum peers polled at once
    pub max_concurrent_polls: usize,
}

impl Default for PollConfig {
    fn default() -> Self {
        Self {
            refresh_after: Duration::from_secs(60),
            failure_backoff: Duration::from_secs(60),
            stale_grace: Duration::from_secs(7 * 24 * 60 * 60), // 7 days
            fetch_timeout: Duration::from_secs(10),
            max_concurrent_polls: 8,
        }
    }
}

/// Daemon transport configuration.
///
/// Controls HTTP timeouts for the JSON-speaking daemons and the connect
/// timeout for the TLS socket daemon.
#[derive(Debug, Clone)]
pub struct NetworkConfig {
    /// HTTP request timeout for Transmission and uTorrent calls
    pub http_timeout: Duration,
    /// TCP + TLS handshake timeout for Deluge daemons
    pub deluge_connect_timeout: Duration,
    /// User agent for HTTP requests
    pub user_agent: &'static str,
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            http_timeout: Duration::from_secs(30),
            deluge_connect_timeout: Duration::from_secs(10),
            user_agent: "torsync/0.1.0",
        }
    }
}

/// Replica placement configuration.
#[derive(Debug, Clone)]
pub struct ReplicationConfig {
    /// Number of distinct daemons that should hold each torrent
    pub target_replicas: usize,
    /// Plan and report placements without pushing torrents
    pub dry_run: bool,
}

impl Default for ReplicationConfig {
    fn default() -> Self {
        Self {
            target_replicas: 2,
            dry_run: false,
        }
    }
}

impl TorsyncConfig {
    /// Creates configuration with environment variable overrides.
    ///
    /// Allows runtime configuration via environment variables while
    /// maintaining sensible defaults. Unparsable values are ignored.
    pub fn from_env() -> Self {
        let mut config = Self::default();

        if let Ok(replicas) = std::env::var("TORSYNC_TARGET_REPLICAS")
            && let Ok(count) = replicas.parse::<usize>()
        {
            config.replication.target_replicas = count;
        }

        if let Ok(timeout) = std::env::var("TORSYNC_FETCH_TIMEOUT")
            && let Ok(seconds) = timeout.parse::<u64>()
        {
            config.poll.fetch_timeout = Duration::from_secs(seconds);
        }

        if let Ok(limit) = std::env::var("TORSYNC_MAX_CONCURRENT_POLLS")
            && let Ok(count) = limit.parse::<usize>()
            && count > 0
        {
            config.poll.max_concurrent_polls = count;
        }

        if let Ok(refresh) = std::env::var("TORSYNC_REFRESH_AFTER")
            && let Ok(seconds) = refresh.parse::<u64>()
        {
            config.poll.refresh_after = Duration::from_secs(seconds);
        }

        config
    }

    /// Creates a configuration optimized for testing.
    pub fn for_testing() -> Self {
        Self {
            poll: PollConfig {
                fetch_timeout: Duration::from_millis(200),
                max_concurrent_polls: 4,
                ..Default::default()
            },
            network: NetworkConfig {
                http_timeout: Duration::from_secs(1),
                deluge_connect_timeout: Duration::from_secs(1),
                ..Default::default()
            },
            replication: ReplicationConfig {
                target_replicas: 3,
                dry_run: false,
            },
        }
    }
}
