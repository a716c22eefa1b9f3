//! Zonefile fetcher (§4.6): rarest-first pull of missing zonefiles,
//! batched per peer to cut down on round trips.

use std::collections::HashMap;
use std::sync::Arc;

use crate::engine::AtlasEngine;

struct MissingHash {
    hash: String,
    bits: Vec<usize>,
}

pub async fn fetcher_pass(engine: Arc<AtlasEngine>) -> bool {
    let missing_rows = match engine.store().missing_all() {
        Ok(rows) => rows,
        Err(e) => {
            tracing::error!(error = %e, "store error enumerating missing slots");
            return false;
        }
    };
    if missing_rows.is_empty() {
        return false;
    }

    let mut by_hash: HashMap<String, Vec<usize>> = HashMap::new();
    for row in missing_rows {
        let bit = row.bit_index();
        by_hash.entry(row.zonefile_hash).or_default().push(bit);
    }

    let mut candidates = Vec::new();
    for (hash, bits) in by_hash {
        let peers = engine.peer_table().hostports_with_any_bit(&bits).await;
        if peers.is_empty() {
            continue;
        }
        candidates.push((MissingHash { hash, bits }, peers));
    }
    if candidates.is_empty() {
        return false;
    }

    // Rarest-first: fewest peers holding it dispatches first.
    candidates.sort_by_key(|(_, peers)| peers.len());

    // Assign each hash to its best-health candidate peer, batching by peer.
    let mut batches: HashMap<String, Vec<MissingHash>> = HashMap::new();
    for (missing, peers) in candidates {
        let ranked = engine.peer_table().rank_by_health_desc(&peers).await;
        if let Some(best) = ranked.into_iter().next() {
            batches.entry(best).or_default().push(missing);
        }
    }
    if batches.is_empty() {
        return false;
    }

    let mut fetched_any = false;
    for (peer, batch) in batches {
        let hashes: Vec<String> = batch.iter().map(|m| m.hash.clone()).collect();
        let result = engine.rpc().get_zonefiles(&peer, &hashes).await;

        let delivered = match result {
            Ok(delivered) => delivered,
            Err(e) => {
                tracing::debug!(peer = %peer, error = %e, "get_zonefiles failed");
                engine.peer_table().record_contact(&peer, false).await;
                continue;
            }
        };

        let mut any_valid = false;
        for missing in &batch {
            match delivered.get(&missing.hash) {
                Some(bytes) => {
                    let valid = engine.storage().is_valid_zonefile(bytes, &missing.hash).await;
                    if !valid {
                        tracing::warn!(peer = %peer, hash = %missing.hash, "hash mismatch, treating as liar");
                        engine.peer_table().clear_inventory_bits(&peer, &missing.bits).await;
                        continue;
                    }
                    if engine.storage().store(bytes, &[], true).await {
                        if let Err(e) = engine.set_present(&missing.hash, true).await {
                            tracing::error!(error = %e, hash = %missing.hash, "store error marking present");
                            continue;
                        }
                        any_valid = true;
                        fetched_any = true;
                    } else {
                        tracing::warn!(hash = %missing.hash, "storage backend rejected zonefile write");
                    }
                }
                None => {
                    tracing::warn!(peer = %peer, hash = %missing.hash, "peer advertised but did not deliver, clearing bits");
                    engine.peer_table().clear_inventory_bits(&peer, &missing.bits).await;
                }
            }
        }
        engine.peer_table().record_contact(&peer, any_valid).await;
    }

    fetched_any
}
