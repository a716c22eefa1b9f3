//! Engine configuration, loaded from environment variables.
//!
//! Follows the same default-then-override shape as the rest of the stack's
//! `NetworkConfig`: a `Default` impl carries the documented defaults, and
//! `from_env` overlays anything the environment sets, falling back silently
//! (with a debug log) on unparseable values rather than failing startup.

use std::time::Duration;

/// `BLOCKSTACK_ATLAS_*` environment-derived configuration.
#[derive(Debug, Clone, PartialEq)]
pub struct AtlasConfig {
    /// How long a health sample stays in a peer's sliding window.
    pub peer_lifetime: Duration,
    /// Minimum spacing between inventory refreshes for one peer.
    pub peer_ping_interval: Duration,
    /// Health threshold above which a peer is considered live.
    pub min_peer_health: f64,
    /// Soft target for the peer table's steady-state size.
    pub num_neighbors: usize,
    /// Hard cap on push-queue depth before new pushes are dropped.
    pub max_queued_zonefiles: usize,
    /// Block-range window size used by the health checker's inventory refresh.
    pub inventory_refresh_window: u64,
}

impl Default for AtlasConfig {
    fn default() -> Self {
        Self {
            peer_lifetime: Duration::from_secs(3600),
            peer_ping_interval: Duration::from_secs(60),
            min_peer_health: 0.5,
            num_neighbors: 80,
            max_queued_zonefiles: 1000,
            inventory_refresh_window: 10_000,
        }
    }
}

impl AtlasConfig {
    /// Builds a configuration from the process environment, falling back to
    /// defaults for anything absent or unparseable.
    pub fn from_env() -> Self {
        let mut config = Self::default();

        if let Some(v) = env_u64("BLOCKSTACK_ATLAS_PEER_LIFETIME") {
            config.peer_lifetime = Duration::from_secs(v);
        }
        if let Some(v) = env_u64("BLOCKSTACK_ATLAS_PEER_PING_INTERVAL") {
            config.peer_ping_interval = Duration::from_secs(v);
        }
        if let Some(v) = env_f64("BLOCKSTACK_ATLAS_MIN_PEER_HEALTH") {
            config.min_peer_health = v;
        }
        // MAX_NEIGHBORS is an alias for NUM_NEIGHBORS; the latter wins if both are set.
        if let Some(v) = env_usize("BLOCKSTACK_ATLAS_MAX_NEIGHBORS") {
            config.num_neighbors = v;
        }
        if let Some(v) = env_usize("BLOCKSTACK_ATLAS_NUM_NEIGHBORS") {
            config.num_neighbors = v;
        }

        config
    }

    /// Soft cap on peer table size before the crawler trims it (§3, I7).
    pub fn max_peer_table_size(&self) -> usize {
        2 * self.num_neighbors
    }

    /// Soft cap on the crawl list the crawler maintains (§4.4).
    pub fn max_crawl_list_size(&self) -> usize {
        2 * self.num_neighbors
    }
}

fn env_u64(key: &str) -> Option<u64> {
    match std::env::var(key) {
        Ok(v) => v.parse().ok().or_else(|| {
            tracing::debug!(key, value = %v, "ignoring unparseable config value, using default");
            None
        }),
        Err(_) => None,
    }
}

fn env_f64(key: &str) -> Option<f64> {
    match std::env::var(key) {
        Ok(v) => v.parse().ok().or_else(|| {
            tracing::debug!(key, value = %v, "ignoring unparseable config value, using default");
            None
        }),
        Err(_) => None,
    }
}

fn env_usize(key: &str) -> Option<usize> {
    match std::env::var(key) {
        Ok(v) => v.parse().ok().or_else(|| {
            tracing::debug!(key, value = %v, "ignoring unparseable config value, using default");
            None
        }),
        Err(_) => None,
    }
}
