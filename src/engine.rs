//! `AtlasEngine`: the process-wide state the reference design scatters
//! across three globals, bundled into one value workers share via `Arc`
//! (§9 Design Notes).

use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tokio::sync::RwLock;

use crate::config::AtlasConfig;
use crate::error::AtlasResult;
use crate::indexer::BlockchainIndexer;
use crate::inventory;
use crate::peer::PeerTable;
use crate::queues::{PeerIntakeQueue, PushQueue};
use crate::rpc::AtlasPeerRpc;
use crate::storage::ZonefileStorage;
use crate::store::AtlasDb;

/// Bundles the store, peer table, queues, and the engine's external
/// collaborators. Workers hold a shared `Arc<AtlasEngine>` and poll
/// `running()` between passes.
pub struct AtlasEngine {
    pub config: AtlasConfig,
    pub my_hostport: String,
    pub genesis_block: u64,
    store: AtlasDb,
    peer_table: PeerTable,
    intake_queue: PeerIntakeQueue,
    push_queue: PushQueue,
    storage: Arc<dyn ZonefileStorage>,
    indexer: Arc<dyn BlockchainIndexer>,
    rpc: Arc<dyn AtlasPeerRpc>,
    local_inventory: RwLock<Vec<u8>>,
    running: Arc<AtomicBool>,
}

impl AtlasEngine {
    pub async fn open(
        db_path: &Path,
        config: AtlasConfig,
        my_hostport: String,
        genesis_block: u64,
        storage: Arc<dyn ZonefileStorage>,
        indexer: Arc<dyn BlockchainIndexer>,
        rpc: Arc<dyn AtlasPeerRpc>,
    ) -> AtlasResult<Arc<Self>> {
        let store = AtlasDb::open(db_path)?;
        Self::from_store(store, config, my_hostport, genesis_block, storage, indexer, rpc).await
    }

    pub async fn open_in_memory(
        config: AtlasConfig,
        my_hostport: String,
        genesis_block: u64,
        storage: Arc<dyn ZonefileStorage>,
        indexer: Arc<dyn BlockchainIndexer>,
        rpc: Arc<dyn AtlasPeerRpc>,
    ) -> AtlasResult<Arc<Self>> {
        let store = AtlasDb::open_in_memory()?;
        Self::from_store(store, config, my_hostport, genesis_block, storage, indexer, rpc).await
    }

    async fn from_store(
        store: AtlasDb,
        config: AtlasConfig,
        my_hostport: String,
        genesis_block: u64,
        storage: Arc<dyn ZonefileStorage>,
        indexer: Arc<dyn BlockchainIndexer>,
        rpc: Arc<dyn AtlasPeerRpc>,
    ) -> AtlasResult<Arc<Self>> {
        let local_inventory = store.rebuild_local_inventory()?;
        let peer_table = PeerTable::new(config.clone());
        let intake_queue = PeerIntakeQueue::new(config.max_crawl_list_size());
        let push_queue = PushQueue::new(config.max_queued_zonefiles);

        Ok(Arc::new(Self {
            config,
            my_hostport,
            genesis_block,
            store,
            peer_table,
            intake_queue,
            push_queue,
            storage,
            indexer,
            rpc,
            local_inventory: RwLock::new(local_inventory),
            running: Arc::new(AtomicBool::new(true)),
        }))
    }

    pub fn peer_table(&self) -> &PeerTable {
        &self.peer_table
    }

    pub fn intake_queue(&self) -> &PeerIntakeQueue {
        &self.intake_queue
    }

    pub fn push_queue(&self) -> &PushQueue {
        &self.push_queue
    }

    pub fn storage(&self) -> &Arc<dyn ZonefileStorage> {
        &self.storage
    }

    pub fn indexer(&self) -> &Arc<dyn BlockchainIndexer> {
        &self.indexer
    }

    pub fn rpc(&self) -> &Arc<dyn AtlasPeerRpc> {
        &self.rpc
    }

    pub fn store(&self) -> &AtlasDb {
        &self.store
    }

    pub fn running(&self) -> bool {
        self.running.load(Ordering::Relaxed)
    }

    pub fn stop(&self) {
        self.running.store(false, Ordering::Relaxed);
    }

    pub async fn local_inventory(&self) -> Vec<u8> {
        self.local_inventory.read().await.clone()
    }

    /// Ingests every committed hash from `genesis_block` through the
    /// indexer's current tip, resuming from `max(block_height) + 1` if the
    /// store already has rows (§4.2 Ingest).
    pub async fn ingest(&self) -> AtlasResult<usize> {
        let resume_from = match self.store.max_block_height()? {
            Some(h) => h + 1,
            None => self.genesis_block,
        };
        let tip = self.indexer.last_block().await;
        let mut ingested = 0usize;

        let mut height = resume_from;
        while height <= tip {
            for hash in self.indexer.hashes_at(height).await {
                let present = self.storage.is_cached(&hash).await;
                let slot = self.store.add(&hash, present, height)?;
                {
                    let mut inv = self.local_inventory.write().await;
                    // Grow the vector to cover this slot regardless of
                    // presence, so I4 holds even for all-absent ingests.
                    *inv = inventory::clear(&inv, &[slot.bit_index()]);
                    if present {
                        *inv = inventory::set(&inv, &[slot.bit_index()]);
                    }
                }
                ingested += 1;
            }
            height += 1;
        }
        Ok(ingested)
    }

    /// Marks `hash` present/absent across all its slots and keeps
    /// `local_inventory` in lockstep (I4).
    pub async fn set_present(&self, hash: &str, present: bool) -> AtlasResult<()> {
        self.store.set_present(hash, present)?;
        let slots = self.store.slots_of(hash)?;
        let mut inv = self.local_inventory.write().await;
        *inv = if present {
            inventory::set(&inv, &slots)
        } else {
            inventory::clear(&inv, &slots)
        };
        Ok(())
    }

    /// External `put_zonefile` entry point (§4.7): rejects hashes with no
    /// known slot, otherwise enqueues for the pusher.
    pub async fn put_zonefile(&self, hash: &str, bytes: Vec<u8>) -> AtlasResult<bool> {
        let slots = self.store.slots_of(hash)?;
        if slots.is_empty() {
            return Ok(false);
        }
        Ok(self.push_queue.offer(hash.to_string(), bytes).await)
    }

    /// The neighbor list a `get_atlas_peers` response would return (§4.8):
    /// live peers rarest-first, truncated to `NUM_NEIGHBORS` so well-known
    /// peers don't crowd out ones that need more gossip.
    pub async fn neighbors_for_response(&self) -> Vec<String> {
        let mut rarest_first = self.peer_table.live_hostports_by_popularity().await;
        rarest_first.truncate(self.config.num_neighbors);
        rarest_first
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::indexer::MockIndexer;
    use crate::rpc::MockAtlasRpc;
    use crate::storage::FilesystemZonefileStorage;
    use sha2::Digest;

    async fn test_engine() -> (Arc<AtlasEngine>, Arc<MockIndexer>, Arc<FilesystemZonefileStorage>) {
        let dir = tempfile::tempdir().expect("tempdir");
        let storage = Arc::new(FilesystemZonefileStorage::new(dir.path().to_path_buf()));
        let indexer = Arc::new(MockIndexer::new(334750));
        let rpc = Arc::new(MockAtlasRpc::new());
        let engine = AtlasEngine::open_in_memory(
            AtlasConfig::default(),
            "127.0.0.1:6270".to_string(),
            334750,
            storage.clone(),
            indexer.clone(),
            rpc,
        )
        .await
        .expect("open engine");
        (engine, indexer, storage)
    }

    #[tokio::test]
    async fn ingest_creates_absent_slots_from_indexer() {
        let (engine, indexer, _storage) = test_engine().await;
        indexer.push_block(vec!["aaaa01".to_string()]).await;
        indexer
            .push_block(vec!["aaaa02".to_string(), "aaaa03".to_string()])
            .await;

        let count = engine.ingest().await.expect("ingest");
        assert_eq!(count, 3);
        assert_eq!(engine.local_inventory().await, vec![0x00]);
    }

    #[tokio::test]
    async fn ingest_marks_cached_hashes_present() {
        let (engine, indexer, storage) = test_engine().await;
        storage.store(b"zonefile bytes", &[], true).await;
        let hash = hex::encode(sha2::Sha256::digest(b"zonefile bytes"));
        indexer.push_block(vec![hash]).await;

        engine.ingest().await.expect("ingest");
        assert!(inventory::test_bit(&engine.local_inventory().await, 0));
    }

    #[tokio::test]
    async fn set_present_keeps_local_inventory_in_lockstep() {
        let (engine, indexer, _storage) = test_engine().await;
        indexer.push_block(vec!["aaaa01".to_string()]).await;
        engine.ingest().await.expect("ingest");
        assert!(!inventory::test_bit(&engine.local_inventory().await, 0));

        engine.set_present("aaaa01", true).await.expect("set_present");
        assert!(inventory::test_bit(&engine.local_inventory().await, 0));
    }

    #[tokio::test]
    async fn put_zonefile_rejects_unknown_hash() {
        let (engine, _indexer, _storage) = test_engine().await;
        let accepted = engine
            .put_zonefile("unknown", vec![1, 2, 3])
            .await
            .expect("put_zonefile");
        assert!(!accepted);
        assert_eq!(engine.push_queue().len().await, 0);
    }

    #[tokio::test]
    async fn neighbors_for_response_is_rarest_first_and_truncated() {
        let (engine, _indexer, _storage) = test_engine().await;
        // "a" witnesses "rare" once and "common" three times via three
        // distinct reporters, so "common" ends up more popular.
        engine.peer_table().add_neighbor("a", "rare").await;
        engine.peer_table().add_neighbor("a", "common").await;
        engine.peer_table().add_neighbor("b", "common").await;
        engine.peer_table().add_neighbor("c", "common").await;
        for hostport in ["a", "b", "c", "rare", "common"] {
            engine.peer_table().record_contact(hostport, true).await;
        }

        let neighbors = engine.neighbors_for_response().await;
        let rare_pos = neighbors.iter().position(|h| h == "rare").unwrap();
        let common_pos = neighbors.iter().position(|h| h == "common").unwrap();
        assert!(rare_pos < common_pos);
    }

    #[tokio::test]
    async fn neighbors_for_response_truncates_to_num_neighbors() {
        let dir = tempfile::tempdir().expect("tempdir");
        let storage = Arc::new(FilesystemZonefileStorage::new(dir.path().to_path_buf()));
        let indexer = Arc::new(MockIndexer::new(334750));
        let rpc = Arc::new(MockAtlasRpc::new());
        let config = AtlasConfig {
            num_neighbors: 2,
            ..AtlasConfig::default()
        };
        let engine = AtlasEngine::open_in_memory(config, "me:1".to_string(), 334750, storage, indexer, rpc)
            .await
            .expect("open engine");

        for hostport in ["p1", "p2", "p3", "p4"] {
            engine.peer_table().record_contact(hostport, true).await;
        }

        assert_eq!(engine.neighbors_for_response().await.len(), 2);
    }

    #[tokio::test]
    async fn put_zonefile_accepts_known_slot() {
        let (engine, indexer, _storage) = test_engine().await;
        indexer.push_block(vec!["aaaa01".to_string()]).await;
        engine.ingest().await.expect("ingest");

        let accepted = engine
            .put_zonefile("aaaa01", vec![1, 2, 3])
            .await
            .expect("put_zonefile");
        assert!(accepted);
        assert_eq!(engine.push_queue().len().await, 1);
    }
}
