//! Outbound port: the key-value surface the blob store and the indexed
//! collections layer are both built on.

use crate::domain::errors::KvError;

/// A single operation in an atomic batch write.
#[derive(Debug, Clone)]
pub enum BatchOperation {
    Put { key: Vec<u8>, value: Vec<u8> },
    Delete { key: Vec<u8> },
}

impl BatchOperation {
    pub fn put(key: impl Into<Vec<u8>>, value: impl Into<Vec<u8>>) -> Self {
        BatchOperation::Put { key: key.into(), value: value.into() }
    }

    pub fn delete(key: impl Into<Vec<u8>>) -> Self {
        BatchOperation::Delete { key: key.into() }
    }
}

/// Abstract key-value database, backing both the blob store (`block/`,
/// `state/` namespaces) and the indexed collections (`index_<chain>`,
/// `stateref_<chain>`, `nonce_<chain>`, `staged_txids`, `canon`).
///
/// Production: `FileKvStore`. Testing / in-memory engine: `InMemoryKvStore`.
pub trait KeyValueStore: Send + Sync {
    fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>, KvError>;

    fn put(&mut self, key: &[u8], value: &[u8]) -> Result<(), KvError>;

    fn delete(&mut self, key: &[u8]) -> Result<bool, KvError>;

    fn exists(&self, key: &[u8]) -> Result<bool, KvError> {
        Ok(self.get(key)?.is_some())
    }

    /// Execute a batch of operations. The minimalist single-writer-at-a-time
    /// backends below apply every operation against the same in-memory map
    /// before persisting once, so a batch is atomic with respect to any
    /// concurrent reader of the same process.
    fn atomic_batch_write(&mut self, operations: Vec<BatchOperation>) -> Result<(), KvError>;

    /// All `(key, value)` pairs whose key starts with `prefix`, in
    /// unspecified order — callers that need chain order read the `id`
    /// field out of the value and sort, rather than relying on key order.
    fn prefix_scan(&self, prefix: &[u8]) -> Result<Vec<(Vec<u8>, Vec<u8>)>, KvError>;

    /// Delete every key with the given prefix. Used by `DeleteChainId` to
    /// drop a chain's collections.
    fn delete_prefix(&mut self, prefix: &[u8]) -> Result<(), KvError> {
        let keys: Vec<Vec<u8>> = self
            .prefix_scan(prefix)?
            .into_iter()
            .map(|(k, _)| k)
            .collect();
        for key in keys {
            self.delete(&key)?;
        }
        Ok(())
    }
}
