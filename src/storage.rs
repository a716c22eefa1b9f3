//! Zonefile content storage (§6): the `is_cached`/`store`/`is_valid_zonefile`
//! surface Atlas consumes, plus a file-system-backed default for standalone
//! use and tests.

use std::collections::HashSet;
use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;
use sha2::{Digest, Sha256};
use tokio::sync::RwLock;

/// Content back-end Atlas defers to for everything except the hash ledger.
/// Atlas never interprets zonefile bytes beyond hashing them; it forwards
/// whatever `required_drivers` the embedder configured.
#[async_trait]
pub trait ZonefileStorage: Send + Sync {
    async fn is_cached(&self, hash: &str) -> bool;
    async fn store(&self, bytes: &[u8], required_drivers: &[String], cache: bool) -> bool;
    async fn is_valid_zonefile(&self, bytes: &[u8], hash: &str) -> bool;
}

fn sha256_hex(bytes: &[u8]) -> String {
    let digest = Sha256::digest(bytes);
    hex::encode(digest)
}

/// Default storage: zonefiles as flat files under a directory, named by
/// their hash. `required_drivers` is accepted but unused — there is only
/// the one, local, driver.
pub struct FilesystemZonefileStorage {
    root: PathBuf,
    cached: Arc<RwLock<HashSet<String>>>,
}

impl FilesystemZonefileStorage {
    pub fn new(root: PathBuf) -> Self {
        Self {
            root,
            cached: Arc::new(RwLock::new(HashSet::new())),
        }
    }

    fn path_for(&self, hash: &str) -> PathBuf {
        self.root.join(hash)
    }
}

#[async_trait]
impl ZonefileStorage for FilesystemZonefileStorage {
    async fn is_cached(&self, hash: &str) -> bool {
        if self.cached.read().await.contains(hash) {
            return true;
        }
        tokio::fs::metadata(self.path_for(hash)).await.is_ok()
    }

    async fn store(&self, bytes: &[u8], _required_drivers: &[String], cache: bool) -> bool {
        let hash = sha256_hex(bytes);
        if tokio::fs::create_dir_all(&self.root).await.is_err() {
            return false;
        }
        if tokio::fs::write(self.path_for(&hash), bytes).await.is_err() {
            return false;
        }
        if cache {
            self.cached.write().await.insert(hash);
        }
        true
    }

    async fn is_valid_zonefile(&self, bytes: &[u8], hash: &str) -> bool {
        sha256_hex(bytes) == hash
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn store_then_is_cached_round_trips() {
        let dir = tempfile::tempdir().expect("tempdir");
        let storage = FilesystemZonefileStorage::new(dir.path().to_path_buf());
        let bytes = b"example zonefile contents";
        let hash = sha256_hex(bytes);

        assert!(!storage.is_cached(&hash).await);
        assert!(storage.store(bytes, &[], true).await);
        assert!(storage.is_cached(&hash).await);
    }

    #[tokio::test]
    async fn is_valid_zonefile_checks_hash() {
        let dir = tempfile::tempdir().expect("tempdir");
        let storage = FilesystemZonefileStorage::new(dir.path().to_path_buf());
        let bytes = b"content";
        let hash = sha256_hex(bytes);
        assert!(storage.is_valid_zonefile(bytes, &hash).await);
        assert!(!storage.is_valid_zonefile(bytes, "deadbeef").await);
    }
}
