//! Peer RPC surface (§4.8): the five calls every Atlas peer answers, as an
//! async trait with a `reqwest`-backed production client and an in-memory
//! mock for tests.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;

use crate::error::PeerRpcError;

pub const PING_TIMEOUT: Duration = Duration::from_secs(3);
pub const NEIGHBOR_QUERY_TIMEOUT: Duration = Duration::from_secs(10);
pub const ZONEFILE_TRANSFER_TIMEOUT: Duration = Duration::from_secs(60);

#[derive(Debug, Clone, Serialize, Deserialize)]
struct RpcEnvelope {
    id: u32,
    #[serde(rename = "jsonrpc")]
    json_rpc: String,
    method: String,
    params: serde_json::Value,
}

#[derive(Debug, Clone, Deserialize)]
struct RpcReply {
    #[serde(default)]
    result: Option<serde_json::Value>,
    #[serde(default)]
    error: Option<serde_json::Value>,
}

/// The five operations exposed by every Atlas peer.
#[async_trait]
pub trait AtlasPeerRpc: Send + Sync {
    async fn ping(&self, peer: &str) -> Result<bool, PeerRpcError>;

    /// Returns the peer's committed-slot bits for block range `[start, end]`,
    /// packed densely from bit 0 over the slots the peer actually committed
    /// in that range (matching `atlas_make_zonefile_inventory`'s wire
    /// format) — `start`/`end` are block heights, not bit offsets.
    async fn get_zonefile_inventory(
        &self,
        peer: &str,
        start: u64,
        end: u64,
    ) -> Result<Vec<u8>, PeerRpcError>;

    async fn get_atlas_peers(&self, peer: &str, my_hostport: &str) -> Result<Vec<String>, PeerRpcError>;

    async fn get_zonefiles(
        &self,
        peer: &str,
        hashes: &[String],
    ) -> Result<HashMap<String, Vec<u8>>, PeerRpcError>;

    async fn put_zonefiles(
        &self,
        peer: &str,
        zonefiles: &[(String, Vec<u8>)],
    ) -> Result<(), PeerRpcError>;
}

/// Production client: one call per `AtlasPeerRpc` method, each a JSON-RPC
/// POST against `http://<peer>/`.
pub struct ReqwestAtlasRpcClient {
    http_client: reqwest::Client,
}

impl ReqwestAtlasRpcClient {
    pub fn new() -> Self {
        Self {
            http_client: reqwest::Client::new(),
        }
    }

    async fn call(
        &self,
        peer: &str,
        method: &str,
        params: serde_json::Value,
        timeout: Duration,
    ) -> Result<serde_json::Value, PeerRpcError> {
        let envelope = RpcEnvelope {
            id: 1,
            json_rpc: "2.0".to_string(),
            method: method.to_string(),
            params,
        };
        let url = format!("http://{peer}/");
        let start = Instant::now();

        let send = self
            .http_client
            .post(&url)
            .header("Content-Type", "application/json")
            .timeout(timeout)
            .json(&envelope)
            .send();

        let response = match tokio::time::timeout(timeout, send).await {
            Ok(Ok(r)) => r,
            Ok(Err(e)) => {
                return Err(PeerRpcError::Transport {
                    peer: peer.to_string(),
                    reason: e.to_string(),
                })
            }
            Err(_) => {
                return Err(PeerRpcError::Timeout {
                    peer: peer.to_string(),
                    timeout_ms: timeout.as_millis() as u64,
                })
            }
        };

        let body: RpcReply = response.json().await.map_err(|e| PeerRpcError::Malformed {
            peer: peer.to_string(),
            reason: e.to_string(),
        })?;

        tracing::debug!(peer, method, elapsed_ms = start.elapsed().as_millis() as u64, "atlas rpc call finished");

        if let Some(error) = body.error {
            return Err(PeerRpcError::PeerReported {
                peer: peer.to_string(),
                message: error.to_string(),
            });
        }
        body.result.ok_or_else(|| PeerRpcError::Malformed {
            peer: peer.to_string(),
            reason: "missing result field".to_string(),
        })
    }
}

impl Default for ReqwestAtlasRpcClient {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl AtlasPeerRpc for ReqwestAtlasRpcClient {
    async fn ping(&self, peer: &str) -> Result<bool, PeerRpcError> {
        let result = self
            .call(peer, "ping", serde_json::json!([]), PING_TIMEOUT)
            .await?;
        Ok(result
            .get("status")
            .and_then(|v| v.as_bool())
            .unwrap_or(false))
    }

    async fn get_zonefile_inventory(
        &self,
        peer: &str,
        start: u64,
        end: u64,
    ) -> Result<Vec<u8>, PeerRpcError> {
        let result = self
            .call(
                peer,
                "get_zonefile_inventory",
                serde_json::json!([start, end]),
                NEIGHBOR_QUERY_TIMEOUT,
            )
            .await?;
        let inv_b64 = result
            .get("inv")
            .and_then(|v| v.as_str())
            .ok_or_else(|| PeerRpcError::Malformed {
                peer: peer.to_string(),
                reason: "missing inv field".to_string(),
            })?;
        crate::inventory::decode_base64(inv_b64).map_err(|e| PeerRpcError::Malformed {
            peer: peer.to_string(),
            reason: e.to_string(),
        })
    }

    async fn get_atlas_peers(&self, peer: &str, my_hostport: &str) -> Result<Vec<String>, PeerRpcError> {
        let result = self
            .call(
                peer,
                "get_atlas_peers",
                serde_json::json!([my_hostport]),
                NEIGHBOR_QUERY_TIMEOUT,
            )
            .await?;
        let peers = result
            .get("peers")
            .and_then(|v| v.as_array())
            .ok_or_else(|| PeerRpcError::Malformed {
                peer: peer.to_string(),
                reason: "missing peers field".to_string(),
            })?;
        Ok(peers
            .iter()
            .filter_map(|v| v.as_str().map(str::to_string))
            .collect())
    }

    async fn get_zonefiles(
        &self,
        peer: &str,
        hashes: &[String],
    ) -> Result<HashMap<String, Vec<u8>>, PeerRpcError> {
        let result = self
            .call(
                peer,
                "get_zonefiles",
                serde_json::json!([hashes]),
                ZONEFILE_TRANSFER_TIMEOUT,
            )
            .await?;
        let zonefiles = result
            .get("zonefiles")
            .and_then(|v| v.as_object())
            .ok_or_else(|| PeerRpcError::Malformed {
                peer: peer.to_string(),
                reason: "missing zonefiles field".to_string(),
            })?;
        let mut out = HashMap::new();
        for (hash, value) in zonefiles {
            let encoded = value.as_str().ok_or_else(|| PeerRpcError::Malformed {
                peer: peer.to_string(),
                reason: format!("zonefile for {hash} is not a string"),
            })?;
            let bytes = crate::inventory::decode_base64(encoded).map_err(|e| PeerRpcError::Malformed {
                peer: peer.to_string(),
                reason: e.to_string(),
            })?;
            out.insert(hash.clone(), bytes);
        }
        Ok(out)
    }

    async fn put_zonefiles(
        &self,
        peer: &str,
        zonefiles: &[(String, Vec<u8>)],
    ) -> Result<(), PeerRpcError> {
        let payload: Vec<(String, String)> = zonefiles
            .iter()
            .map(|(hash, bytes)| (hash.clone(), crate::inventory::encode_base64(bytes)))
            .collect();
        self.call(
            peer,
            "put_zonefiles",
            serde_json::json!([payload]),
            ZONEFILE_TRANSFER_TIMEOUT,
        )
        .await?;
        Ok(())
    }
}

/// One simulated peer's full RPC surface, for [`MockAtlasRpc`].
#[derive(Debug, Clone, Default)]
pub struct MockPeerState {
    pub online: bool,
    /// This peer's committed slots, in slot order — `(block_height,
    /// present)` per row, mirroring the local store's own layout. Lets
    /// `get_zonefile_inventory` reproduce the real wire format: a window
    /// response is packed densely over the slots actually in `[start, end]`,
    /// not over the block count spanned.
    pub slots: Vec<(u64, bool)>,
    pub neighbors: Vec<String>,
    /// Hashes this peer will actually deliver on `get_zonefiles`, which may
    /// be a strict subset of what its inventory claims (to simulate liars).
    pub zonefiles: HashMap<String, Vec<u8>>,
}

/// In-memory `AtlasPeerRpc` used by tests to script cooperative and lying
/// peers without a network.
#[derive(Clone, Default)]
pub struct MockAtlasRpc {
    peers: Arc<RwLock<HashMap<String, MockPeerState>>>,
    pub received_pushes: Arc<RwLock<Vec<(String, String, Vec<u8>)>>>,
}

impl MockAtlasRpc {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn set_peer(&self, hostport: &str, state: MockPeerState) {
        self.peers.write().await.insert(hostport.to_string(), state);
    }

    async fn state(&self, peer: &str) -> Result<MockPeerState, PeerRpcError> {
        let peers = self.peers.read().await;
        let state = peers.get(peer).cloned().ok_or_else(|| PeerRpcError::Transport {
            peer: peer.to_string(),
            reason: "unknown peer".to_string(),
        })?;
        if !state.online {
            return Err(PeerRpcError::Timeout {
                peer: peer.to_string(),
                timeout_ms: PING_TIMEOUT.as_millis() as u64,
            });
        }
        Ok(state)
    }
}

#[async_trait]
impl AtlasPeerRpc for MockAtlasRpc {
    async fn ping(&self, peer: &str) -> Result<bool, PeerRpcError> {
        self.state(peer).await.map(|_| true)
    }

    async fn get_zonefile_inventory(
        &self,
        peer: &str,
        start: u64,
        end: u64,
    ) -> Result<Vec<u8>, PeerRpcError> {
        let state = self.state(peer).await?;
        let bits: Vec<usize> = state
            .slots
            .iter()
            .filter(|(height, _)| *height >= start && *height <= end)
            .map(|(_, present)| *present)
            .enumerate()
            .filter(|(_, present)| *present)
            .map(|(i, _)| i)
            .collect();
        Ok(crate::inventory::set(&[], &bits))
    }

    async fn get_atlas_peers(&self, peer: &str, _my_hostport: &str) -> Result<Vec<String>, PeerRpcError> {
        let state = self.state(peer).await?;
        Ok(state.neighbors)
    }

    async fn get_zonefiles(
        &self,
        peer: &str,
        hashes: &[String],
    ) -> Result<HashMap<String, Vec<u8>>, PeerRpcError> {
        let state = self.state(peer).await?;
        Ok(hashes
            .iter()
            .filter_map(|h| state.zonefiles.get(h).map(|bytes| (h.clone(), bytes.clone())))
            .collect())
    }

    async fn put_zonefiles(
        &self,
        peer: &str,
        zonefiles: &[(String, Vec<u8>)],
    ) -> Result<(), PeerRpcError> {
        self.state(peer).await?;
        let mut received = self.received_pushes.write().await;
        for (hash, bytes) in zonefiles {
            received.push((peer.to_string(), hash.clone(), bytes.clone()));
        }
        Ok(())
    }
}
