//! Zonefile pusher (§4.7): drains the push queue, delivering each item to
//! peers whose cached inventory doesn't yet have it.

use std::sync::Arc;

use crate::engine::AtlasEngine;

pub async fn pusher_pass(engine: Arc<AtlasEngine>) -> bool {
    let Some((hash, bytes)) = engine.push_queue().pop().await else {
        return false;
    };

    let bits = match engine.store().slots_of(&hash) {
        Ok(bits) => bits,
        Err(e) => {
            tracing::error!(error = %e, hash = %hash, "store error looking up slots for push");
            return true;
        }
    };

    let needing_peers: Vec<String> = {
        let mut needing = Vec::new();
        for hostport in engine.peer_table().all_hostports().await {
            let inventory = engine.peer_table().inventory_of(&hostport).await;
            if !crate::inventory::test(&inventory, &bits) {
                needing.push(hostport);
            }
        }
        needing
    };

    if needing_peers.is_empty() {
        tracing::debug!(hash = %hash, "zonefile already fully replicated, dropping push");
        return true;
    }

    for peer in needing_peers {
        let outcome = engine
            .rpc()
            .put_zonefiles(&peer, &[(hash.clone(), bytes.clone())])
            .await;
        match outcome {
            Ok(()) => engine.peer_table().record_contact(&peer, true).await,
            Err(e) => {
                tracing::debug!(peer = %peer, error = %e, "put_zonefiles failed");
                engine.peer_table().record_contact(&peer, false).await;
            }
        }
    }

    true
}
