//! Peer table: per-peer health samples, remote inventories, and the
//! popularity-bloom accounting used to rank candidate neighbors (§3, §4.3).

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use bloomfilter::Bloom;
use tokio::sync::RwLock;

use crate::config::AtlasConfig;
use crate::inventory;

/// One (timestamp, responded) sample in a peer's health window.
#[derive(Debug, Clone, Copy)]
struct HealthSample {
    at: Instant,
    responded: bool,
}

/// Everything the engine tracks about one remote peer.
pub struct PeerRecord {
    pub hostport: String,
    pub blacklisted: bool,
    pub popularity: u64,
    pub inventory_last_refresh: Option<Instant>,
    pub inventory_last_block: u64,
    pub inventory: Vec<u8>,
    samples: Vec<HealthSample>,
    popularity_bloom: Bloom<String>,
}

impl PeerRecord {
    /// New records are primed to `popularity = 1` (I6): a record only comes
    /// into being because someone, even if just us, already named it.
    fn new(hostport: &str) -> Self {
        Self {
            hostport: hostport.to_string(),
            blacklisted: false,
            popularity: 1,
            inventory_last_refresh: None,
            inventory_last_block: 0,
            inventory: Vec::new(),
            samples: Vec::new(),
            popularity_bloom: Bloom::new_for_fp_rate(4096, 0.01),
        }
    }

    /// Health is `responded / total` over the retained sliding window;
    /// an empty window scores 0.0, not 1.0, so a brand-new peer starts unproven.
    pub fn health(&self) -> f64 {
        if self.samples.is_empty() {
            return 0.0;
        }
        let responded = self.samples.iter().filter(|s| s.responded).count();
        responded as f64 / self.samples.len() as f64
    }

    pub fn is_live(&self, config: &AtlasConfig) -> bool {
        self.health() > config.min_peer_health
    }

    fn record_sample(&mut self, now: Instant, lifetime: Duration, responded: bool) {
        if self.blacklisted {
            return;
        }
        self.samples.retain(|s| now.duration_since(s.at) < lifetime);
        self.samples.push(HealthSample { at: now, responded });
    }

    /// Marks `neighbor` as known-to-us-via-this-peer exactly once; returns
    /// whether this is the first time we recorded the edge (idempotent per §4.3).
    fn witness_neighbor(&mut self, neighbor: &str) -> bool {
        if self.popularity_bloom.check(&neighbor.to_string()) {
            false
        } else {
            self.popularity_bloom.set(&neighbor.to_string());
            true
        }
    }
}

/// Shared, lock-guarded table of all known peers.
///
/// A single coarse `RwLock` guards the whole map, matching the teacher's
/// `PeerManager` shape; callers must never hold the lock across an RPC call.
#[derive(Clone)]
pub struct PeerTable {
    inner: Arc<RwLock<HashMap<String, PeerRecord>>>,
    config: AtlasConfig,
}

impl PeerTable {
    pub fn new(config: AtlasConfig) -> Self {
        Self {
            inner: Arc::new(RwLock::new(HashMap::new())),
            config,
        }
    }

    /// Adds `hostport` if absent. No-op otherwise.
    pub async fn ensure_peer(&self, hostport: &str) {
        let mut table = self.inner.write().await;
        table
            .entry(hostport.to_string())
            .or_insert_with(|| PeerRecord::new(hostport));
    }

    pub async fn len(&self) -> usize {
        self.inner.read().await.len()
    }

    pub async fn contains(&self, hostport: &str) -> bool {
        self.inner.read().await.contains_key(hostport)
    }

    pub async fn health_of(&self, hostport: &str) -> Option<f64> {
        self.inner.read().await.get(hostport).map(PeerRecord::health)
    }

    pub async fn is_live(&self, hostport: &str) -> bool {
        self.inner
            .read()
            .await
            .get(hostport)
            .map(|p| p.is_live(&self.config))
            .unwrap_or(false)
    }

    pub async fn is_blacklisted(&self, hostport: &str) -> bool {
        self.inner
            .read()
            .await
            .get(hostport)
            .map(|p| p.blacklisted)
            .unwrap_or(false)
    }

    pub async fn blacklist(&self, hostport: &str) {
        let mut table = self.inner.write().await;
        table
            .entry(hostport.to_string())
            .or_insert_with(|| PeerRecord::new(hostport))
            .blacklisted = true;
    }

    /// Records whether a request to `hostport` got a response, growing the
    /// table to track the peer if it's new. A no-op for blacklisted peers.
    pub async fn record_contact(&self, hostport: &str, responded: bool) {
        let mut table = self.inner.write().await;
        let record = table
            .entry(hostport.to_string())
            .or_insert_with(|| PeerRecord::new(hostport));
        record.record_sample(Instant::now(), self.config.peer_lifetime, responded);
    }

    pub async fn set_inventory(&self, hostport: &str, inventory: Vec<u8>, last_block: u64) {
        let mut table = self.inner.write().await;
        let record = table
            .entry(hostport.to_string())
            .or_insert_with(|| PeerRecord::new(hostport));
        record.inventory = inventory;
        record.inventory_last_block = last_block;
        record.inventory_last_refresh = Some(Instant::now());
    }

    /// Clears `bits` in `hostport`'s cached inventory (the liar penalty, §4.6
    /// step 7). A no-op for unknown peers.
    pub async fn clear_inventory_bits(&self, hostport: &str, bits: &[usize]) {
        let mut table = self.inner.write().await;
        if let Some(record) = table.get_mut(hostport) {
            record.inventory = inventory::clear(&record.inventory, bits);
        }
    }

    /// Whether `hostport`'s inventory is stale: never refreshed, or refreshed
    /// longer ago than `ping_interval` (§4.5 step 1).
    pub async fn inventory_is_stale(&self, hostport: &str, ping_interval: Duration) -> bool {
        let table = self.inner.read().await;
        match table.get(hostport).and_then(|r| r.inventory_last_refresh) {
            None => true,
            Some(last) => last.elapsed() >= ping_interval,
        }
    }

    pub async fn inventory_of(&self, hostport: &str) -> Vec<u8> {
        self.inner
            .read()
            .await
            .get(hostport)
            .map(|p| p.inventory.clone())
            .unwrap_or_default()
    }

    /// Records that `hostport` told us about `neighbor`. Returns the
    /// neighbor's bumped popularity count, or `None` if this edge was
    /// already known (I5: never double-count popularity for one edge).
    pub async fn add_neighbor(&self, hostport: &str, neighbor: &str) -> Option<u64> {
        let mut table = self.inner.write().await;
        table
            .entry(hostport.to_string())
            .or_insert_with(|| PeerRecord::new(hostport));
        table
            .entry(neighbor.to_string())
            .or_insert_with(|| PeerRecord::new(neighbor));

        let is_new_edge = table.get_mut(hostport).unwrap().witness_neighbor(neighbor);
        if !is_new_edge {
            return None;
        }
        let neighbor_record = table.get_mut(neighbor).unwrap();
        neighbor_record.popularity += 1;
        Some(neighbor_record.popularity)
    }

    /// Snapshot of every live peer's hostport, least popular first — the
    /// ranking a `get_atlas_peers` response draws its neighbor list from
    /// (§3, §4.8), truncated to `NUM_NEIGHBORS` by the caller.
    pub async fn live_hostports_by_popularity(&self) -> Vec<String> {
        let table = self.inner.read().await;
        let mut entries: Vec<(&String, u64)> = table
            .iter()
            .filter(|(_, r)| r.is_live(&self.config))
            .map(|(h, r)| (h, r.popularity))
            .collect();
        entries.sort_by(|a, b| a.1.cmp(&b.1).then_with(|| a.0.cmp(b.0)));
        entries.into_iter().map(|(h, _)| h.clone()).collect()
    }

    pub async fn all_hostports(&self) -> Vec<String> {
        self.inner.read().await.keys().cloned().collect()
    }

    /// Live, non-blacklisted hostports ranked ascending by how many bits
    /// `local_inventory` lacks that the peer has — the bottom of this
    /// ranking is the crawler's eviction order (§4.3 availability ranking).
    pub async fn availability_ranking(&self, local_inventory: &[u8]) -> Vec<String> {
        let table = self.inner.read().await;
        let mut entries: Vec<(&String, usize)> = table
            .iter()
            .filter(|(_, r)| !r.blacklisted && r.is_live(&self.config))
            .map(|(h, r)| (h, inventory::diff_count(local_inventory, &r.inventory)))
            .collect();
        entries.sort_by(|a, b| a.1.cmp(&b.1).then_with(|| a.0.cmp(b.0)));
        entries.into_iter().map(|(h, _)| h.clone()).collect()
    }

    /// Hostports of peers whose cached inventory has every bit in `bits` set.
    pub async fn hostports_with_bits(&self, bits: &[usize]) -> Vec<String> {
        let table = self.inner.read().await;
        table
            .iter()
            .filter(|(_, r)| inventory::test(&r.inventory, bits))
            .map(|(h, _)| h.clone())
            .collect()
    }

    /// Hostports of peers whose cached inventory has at least one bit in
    /// `bits` set — used when a hash occupies more than one slot (I2).
    pub async fn hostports_with_any_bit(&self, bits: &[usize]) -> Vec<String> {
        let table = self.inner.read().await;
        table
            .iter()
            .filter(|(_, r)| bits.iter().any(|&i| inventory::test_bit(&r.inventory, i)))
            .map(|(h, _)| h.clone())
            .collect()
    }

    /// Health of every given hostport, descending (live peers only).
    pub async fn rank_by_health_desc(&self, hostports: &[String]) -> Vec<String> {
        let table = self.inner.read().await;
        let mut entries: Vec<(String, f64)> = hostports
            .iter()
            .filter_map(|h| {
                table.get(h).and_then(|r| {
                    if r.is_live(&self.config) {
                        Some((h.clone(), r.health()))
                    } else {
                        None
                    }
                })
            })
            .collect();
        entries.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));
        entries.into_iter().map(|(h, _)| h).collect()
    }

    /// Drops the lowest-availability, non-blacklisted entries down to
    /// `config.max_peer_table_size()` (§4.4 step 4).
    pub async fn trim_to_capacity(&self, local_inventory: &[u8]) -> Vec<String> {
        let cap = self.config.max_peer_table_size();
        let mut table = self.inner.write().await;
        if table.len() <= cap {
            return Vec::new();
        }
        let mut entries: Vec<(String, usize, bool)> = table
            .iter()
            .map(|(h, r)| {
                (
                    h.clone(),
                    inventory::diff_count(local_inventory, &r.inventory),
                    r.blacklisted,
                )
            })
            .collect();
        entries.sort_by(|a, b| a.1.cmp(&b.1).then_with(|| a.0.cmp(&b.0)));
        let drop_count = table.len().saturating_sub(cap);
        let to_drop: Vec<String> = entries
            .into_iter()
            .filter(|(_, _, blacklisted)| !blacklisted)
            .take(drop_count)
            .map(|(h, _, _)| h)
            .collect();
        for hostport in &to_drop {
            table.remove(hostport);
        }
        to_drop
    }
}
