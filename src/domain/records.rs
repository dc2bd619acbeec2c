//! Record shapes owned by this crate, and the contracts external block and
//! transaction types must satisfy to be stored.
//!
//! The block and transaction value types themselves are an external
//! collaborator's concern: this crate never deserializes their payload,
//! only stores and returns the bytes the host already serialized.
//! `TransactionRecord` and `BlockRecord` are the minimal seams the engine
//! needs: a stable id/hash, and byte access.

use crate::domain::ids::{BlockHash, TxId};

/// A transaction value the host hands to `put_transaction`/`put_block`.
///
/// Implementations are expected to be cheap to borrow bytes from; the
/// engine never mutates or reinterprets the payload.
pub trait TransactionRecord {
    /// The transaction's stable identifier.
    fn id(&self) -> TxId;

    /// The transaction's serialized form, as the host's serialization
    /// format already produced it.
    fn to_bytes(&self) -> Vec<u8>;
}

/// A block value the host hands to `put_block`.
pub trait BlockRecord {
    /// The transaction type this block contains.
    type Tx: TransactionRecord;

    /// The block's stable cryptographic hash.
    fn hash(&self) -> BlockHash;

    /// The block's serialized form.
    fn to_bytes(&self) -> Vec<u8>;

    /// Transactions contained in this block, in block order.
    fn transactions(&self) -> &[Self::Tx];
}

/// `(chainId, address, blockHash, blockIndex)` — asserts that `address` was
/// mutated at block `blockHash` / height `blockIndex` on `chain`.
///
/// Unique on `(address, blockHash)`; the facade enforces this via a
/// composite id built from the two.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct StateRef {
    pub address: crate::domain::ids::Address,
    pub block_hash: BlockHash,
    pub block_index: i64,
}

/// `(chainId, address, nonce)` — one per `(chain, address)`, upsert-only.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct NonceRecord {
    pub address: crate::domain::ids::Address,
    pub nonce: i64,
}

/// The address→state mapping stored per block hash. The state value itself
/// is opaque, host-serialized bytes, the same way block and transaction
/// payloads are.
pub type StateMap = std::collections::HashMap<crate::domain::ids::Address, Vec<u8>>;
