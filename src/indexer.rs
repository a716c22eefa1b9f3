//! Blockchain indexer surface (§6): the two reads Atlas needs to discover
//! which zonefile hashes exist and at what height.

use async_trait::async_trait;
use tokio::sync::RwLock;

/// Read-only view onto the chain of committed zonefile hashes. Atlas treats
/// the indexer as the source of truth for "what exists"; the store only
/// tracks "what we've ingested and whether we have the bytes."
#[async_trait]
pub trait BlockchainIndexer: Send + Sync {
    async fn last_block(&self) -> u64;
    async fn hashes_at(&self, height: u64) -> Vec<String>;
}

/// In-memory indexer for tests and standalone demos: a `Vec` of per-block
/// hash lists, indexed from a configurable genesis height.
pub struct MockIndexer {
    genesis: u64,
    blocks: RwLock<Vec<Vec<String>>>,
}

impl MockIndexer {
    pub fn new(genesis: u64) -> Self {
        Self {
            genesis,
            blocks: RwLock::new(Vec::new()),
        }
    }

    pub fn genesis(&self) -> u64 {
        self.genesis
    }

    /// Appends one block's worth of hashes, advancing the tip by one.
    pub async fn push_block(&self, hashes: Vec<String>) {
        self.blocks.write().await.push(hashes);
    }
}

#[async_trait]
impl BlockchainIndexer for MockIndexer {
    async fn last_block(&self) -> u64 {
        let blocks = self.blocks.read().await;
        if blocks.is_empty() {
            self.genesis
        } else {
            self.genesis + blocks.len() as u64 - 1
        }
    }

    async fn hashes_at(&self, height: u64) -> Vec<String> {
        if height < self.genesis {
            return Vec::new();
        }
        let blocks = self.blocks.read().await;
        blocks
            .get((height - self.genesis) as usize)
            .cloned()
            .unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn last_block_tracks_pushed_blocks() {
        let indexer = MockIndexer::new(334750);
        assert_eq!(indexer.last_block().await, 334750);
        indexer.push_block(vec!["aaaa".to_string()]).await;
        indexer.push_block(vec!["bbbb".to_string(), "cccc".to_string()]).await;
        assert_eq!(indexer.last_block().await, 334751);
        assert_eq!(indexer.hashes_at(334750).await, vec!["aaaa".to_string()]);
        assert_eq!(
            indexer.hashes_at(334751).await,
            vec!["bbbb".to_string(), "cccc".to_string()]
        );
    }
}
