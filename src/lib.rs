//! # Atlas
//!
//! The zonefile replication (gossip) subsystem of a decentralized naming
//! service. Names are committed on-chain as a (block height, zonefile hash)
//! pair; the zonefile content itself is off-chain and must be propagated
//! between cooperating nodes. Atlas is the best-effort, eventually-consistent
//! overlay that moves that content around.
//!
//! ## Architecture
//!
//! - **Inventory codec** ([`inventory`]): pure functions over the bit-vector
//!   wire format used to advertise which zonefiles a node holds.
//! - **Local store** ([`store`]): the durable, SQLite-backed ledger of
//!   committed zonefile slots and their `present` state.
//! - **Peer table** ([`peer`]): per-peer health, popularity, and cached
//!   remote inventories.
//! - **Queues** ([`queues`]): the peer intake queue and the outbound push
//!   queue.
//! - **Engine** ([`engine`]): bundles the above into one shared value the
//!   background workers operate on.
//! - **Workers** ([`workers`]): the peer crawler, health checker, zonefile
//!   fetcher, and zonefile pusher.
//! - **External interfaces** ([`rpc`], [`storage`], [`indexer`]): the async
//!   traits Atlas consumes from its host (peer RPC, content storage, the
//!   blockchain indexer).
//!
//! ## Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use atlas::config::AtlasConfig;
//! use atlas::engine::AtlasEngine;
//!
//! # async fn example(
//! #     storage: Arc<dyn atlas::storage::ZonefileStorage>,
//! #     indexer: Arc<dyn atlas::indexer::BlockchainIndexer>,
//! #     rpc: Arc<dyn atlas::rpc::AtlasPeerRpc>,
//! # ) -> atlas::error::AtlasResult<()> {
//! let engine = AtlasEngine::open_in_memory(
//!     AtlasConfig::from_env(),
//!     "127.0.0.1:6270".to_string(),
//!     334750,
//!     storage,
//!     indexer,
//!     rpc,
//! )
//! .await?;
//! engine.ingest().await?;
//! atlas::workers::spawn_all(engine);
//! # Ok(())
//! # }
//! ```

/// Engine configuration, loaded from `BLOCKSTACK_ATLAS_*` environment variables.
pub mod config;
/// The `AtlasEngine`: bundles the store, peer table, and queues workers share.
pub mod engine;
/// Error taxonomy for the store/engine (`AtlasError`) and peer RPC calls (`PeerRpcError`).
pub mod error;
/// Blockchain indexer trait consumed by ingest and the health checker.
pub mod indexer;
/// Bit-vector codec for zonefile inventories.
pub mod inventory;
/// Peer table: health, popularity, and cached remote inventories.
pub mod peer;
/// Bounded producer/consumer queues: peer intake and zonefile push.
pub mod queues;
/// Peer RPC surface consumed by the engine, plus a `reqwest` client and an in-memory mock.
pub mod rpc;
/// Zonefile content storage trait, plus a file-system-backed default.
pub mod storage;
/// Durable SQLite-backed store of committed zonefile slots.
pub mod store;
/// The four background workers: crawler, health checker, fetcher, pusher.
pub mod workers;

pub use config::AtlasConfig;
pub use engine::AtlasEngine;
pub use error::{AtlasError, AtlasResult, PeerRpcError, PeerRpcResult};
pub use indexer::BlockchainIndexer;
pub use peer::PeerTable;
pub use rpc::AtlasPeerRpc;
pub use storage::ZonefileStorage;
