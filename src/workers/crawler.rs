//! Peer crawler (§4.4): random-walk discovery, keeps the peer table near
//! its neighbor-count target.

use std::sync::Arc;

use rand::seq::SliceRandom;

use crate::engine::AtlasEngine;

/// Runs one crawler pass. Returns whether it did any work (drained intake
/// entries or crawled a peer), so the caller can back off when idle.
pub async fn crawler_pass(engine: Arc<AtlasEngine>) -> bool {
    let mut did_work = false;

    for hostport in engine.intake_queue().drain().await {
        engine.peer_table().ensure_peer(&hostport).await;
        did_work = true;
    }

    let mut candidates: Vec<String> = engine
        .peer_table()
        .all_hostports()
        .await
        .into_iter()
        .filter(|h| h != &engine.my_hostport)
        .collect();
    candidates.shuffle(&mut rand::thread_rng());

    if let Some(picked) = candidates.first() {
        did_work = true;
        match engine.rpc().get_atlas_peers(picked, &engine.my_hostport).await {
            Ok(neighbors) => {
                engine.peer_table().record_contact(picked, true).await;
                for neighbor in neighbors {
                    if neighbor == engine.my_hostport {
                        continue;
                    }
                    engine.peer_table().add_neighbor(picked, &neighbor).await;
                }
            }
            Err(e) => {
                tracing::debug!(peer = %picked, error = %e, "crawl request failed");
                engine.peer_table().record_contact(picked, false).await;
            }
        }
    }

    if engine.peer_table().len().await > engine.config.max_peer_table_size() {
        let local_inventory = engine.local_inventory().await;
        let dropped = engine.peer_table().trim_to_capacity(&local_inventory).await;
        if !dropped.is_empty() {
            tracing::debug!(count = dropped.len(), "trimmed peer table to capacity");
            did_work = true;
        }
    }

    did_work
}
