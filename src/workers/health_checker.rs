//! Health checker (§4.5): refreshes one stale peer inventory per pass in
//! fixed-size windows, driving liveness scores as a side effect.

use std::sync::Arc;

use crate::engine::AtlasEngine;
use crate::inventory;

pub async fn health_checker_pass(engine: Arc<AtlasEngine>) -> bool {
    let ping_interval = engine.config.peer_ping_interval;
    let mut stale = None;
    for hostport in engine.peer_table().all_hostports().await {
        if engine.peer_table().is_blacklisted(&hostport).await {
            continue;
        }
        if engine.peer_table().inventory_is_stale(&hostport, ping_interval).await {
            stale = Some(hostport);
            break;
        }
    }

    let Some(hostport) = stale else {
        return false;
    };

    let genesis = engine.genesis_block;
    let tip = engine.indexer().last_block().await;
    let window = engine.config.inventory_refresh_window;

    let mut combined = Vec::new();
    let mut any_succeeded = false;
    // Bit offset the next window's slots land at. A block commits zero, one,
    // or many slots, so this has to track slots actually seen so far, not
    // block distance from genesis (atlas_make_zonefile_inventory packs each
    // window densely over its real row count, not its block span).
    let mut slot_offset = 0usize;
    let mut lo = genesis;
    while lo <= tip {
        let hi = (lo + window - 1).min(tip);
        let count = match engine.store().range(lo, hi) {
            Ok(rows) => rows.len(),
            Err(e) => {
                tracing::error!(error = %e, "local store range lookup failed during inventory refresh");
                break;
            }
        };
        match engine.rpc().get_zonefile_inventory(&hostport, lo, hi).await {
            Ok(window_inv) => {
                any_succeeded = true;
                let bits: Vec<usize> = inventory::set_bits(&window_inv, 0, count)
                    .into_iter()
                    .map(|i| slot_offset + i)
                    .collect();
                combined = inventory::set(&combined, &bits);
                slot_offset += count;
                engine.peer_table().record_contact(&hostport, true).await;
            }
            Err(e) => {
                tracing::debug!(peer = %hostport, error = %e, "inventory refresh window failed");
                engine.peer_table().record_contact(&hostport, false).await;
                break;
            }
        }
        lo = hi + 1;
    }

    if any_succeeded {
        engine.peer_table().set_inventory(&hostport, combined, tip).await;
    }

    true
}
