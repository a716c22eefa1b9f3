//! Error types for the Atlas zonefile replication engine.
//!
//! Mirrors the two-tier split the rest of the workspace uses: a store/engine
//! error that is fatal to the process, and a peer-RPC error that is always
//! recorded as a health sample and never propagated out of a worker loop.

use thiserror::Error;

/// Errors raised by the local store or the engine itself.
///
/// Every variant here is fatal: the store is the correctness anchor for the
/// local inventory (I4), and continuing after a write failure would silently
/// desynchronize `local_inventory` from `zonefiles.present`.
#[derive(Error, Debug)]
pub enum AtlasError {
    /// The durable store rejected a read or write.
    #[error("atlas store error: {0}")]
    Store(#[from] rusqlite::Error),

    /// The store file could not be opened at the configured path.
    #[error("failed to open atlas store at {path}: {source}")]
    StoreOpen {
        path: String,
        #[source]
        source: rusqlite::Error,
    },
}

/// Errors from a single call against the peer RPC surface (§4.8).
///
/// None of these propagate: callers record a negative health sample and move
/// on. The type exists so call sites can log the cause and so tests can
/// assert on failure *kind* without string matching.
#[derive(Error, Debug, Clone)]
pub enum PeerRpcError {
    /// The call did not complete within its timeout.
    #[error("rpc call to {peer} timed out after {timeout_ms}ms")]
    Timeout { peer: String, timeout_ms: u64 },

    /// The underlying transport (HTTP, DNS, connect) failed.
    #[error("transport error calling {peer}: {reason}")]
    Transport { peer: String, reason: String },

    /// The response parsed as JSON but did not have the expected shape.
    #[error("malformed response from {peer}: {reason}")]
    Malformed { peer: String, reason: String },

    /// The peer's response carried an explicit `error` field.
    #[error("peer {peer} returned an error: {message}")]
    PeerReported { peer: String, message: String },
}

pub type AtlasResult<T> = Result<T, AtlasError>;
pub type PeerRpcResult<T> = Result<T, PeerRpcError>;
