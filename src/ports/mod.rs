//! Outbound ports: the interfaces this crate's stores require from a
//! storage backend, with two concrete adapter pairs in `crate::adapters`
//! (in-memory and on-disk).

pub mod fs;
pub mod kv;

pub use fs::TxFileSystem;
pub use kv::{BatchOperation, KeyValueStore};
