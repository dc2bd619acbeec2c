//! Pure domain types: identifiers, record shapes, errors, and configuration.

pub mod config;
pub mod errors;
pub mod ids;
pub mod records;

pub use config::EngineOptions;
pub use errors::{EngineError, FsError, KvError};
pub use ids::{Address, BlockHash, ChainId, TxId};
pub use records::{BlockRecord, NonceRecord, StateMap, StateRef, TransactionRecord};
