//! Persistent storage engine core for a blockchain node.
//!
//! Five cooperating subsystems, presented leaves-first:
//!
//! - [`blob_store`] — content-addressed blob storage for block bodies and
//!   per-block state snapshots.
//! - [`tx_store`] — a sharded, filesystem-backed transaction store.
//! - [`collections`] — named, indexed collections for per-chain block
//!   order, state-reference history, nonces, staged transactions, and the
//!   canonical-chain pointer.
//! - [`ports`] / [`adapters`] — the outbound capability seams
//!   (`KeyValueStore`, `TxFileSystem`) and their on-disk and in-memory
//!   implementations.
//! - [`engine`] — the public facade, [`StorageEngine`], composing all of
//!   the above behind a single block-write lock.
//!
//! Host applications hold exactly one [`StorageEngine`] per storage
//! location for the lifetime of the node.

pub mod adapters;
pub mod blob_store;
pub mod collections;
pub mod domain;
pub mod engine;
pub mod ports;
pub mod tx_store;

pub use domain::config::EngineOptions;
pub use domain::errors::{EngineError, FsError, KvError};
pub use domain::ids::{Address, BlockHash, ChainId, TxId};
pub use domain::records::{BlockRecord, NonceRecord, StateMap, StateRef, TransactionRecord};
pub use engine::StorageEngine;
