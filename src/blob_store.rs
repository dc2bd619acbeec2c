//! Content-addressed blob storage over the flat key-value store: blocks in
//! the `block/` namespace, state snapshots in the `state/` namespace.
//! Writes are idempotent — the first writer for a given hash wins, later
//! writers of the same hash are silently accepted as a no-op.

use crate::domain::errors::EngineError;
use crate::domain::ids::BlockHash;
use crate::ports::kv::KeyValueStore;

fn namespaced_key(namespace: &str, hash: BlockHash) -> String {
    format!("{namespace}/{}", hash.to_hex())
}

/// One content-addressed namespace (`block/` or `state/`) over a shared
/// key-value store.
pub struct BlobStore<'a> {
    kv: &'a mut dyn KeyValueStore,
    namespace: &'static str,
}

impl<'a> BlobStore<'a> {
    pub fn new(kv: &'a mut dyn KeyValueStore, namespace: &'static str) -> Self {
        Self { kv, namespace }
    }

    /// Stores `bytes` under `hash` unless a blob is already stored there.
    /// Returns whether this call actually wrote anything.
    pub fn put(&mut self, hash: BlockHash, bytes: &[u8]) -> Result<bool, EngineError> {
        let key = namespaced_key(self.namespace, hash);
        if self.kv.exists(key.as_bytes())? {
            tracing::trace!(namespace = self.namespace, hash = %hash, "idempotent put short-circuited");
            return Ok(false);
        }
        self.kv.put(key.as_bytes(), bytes)?;
        Ok(true)
    }

    pub fn get(&self, hash: BlockHash) -> Result<Option<Vec<u8>>, EngineError> {
        Ok(self.kv.get(namespaced_key(self.namespace, hash).as_bytes())?)
    }

    pub fn exists(&self, hash: BlockHash) -> Result<bool, EngineError> {
        Ok(self.kv.exists(namespaced_key(self.namespace, hash).as_bytes())?)
    }

    /// Returns whether a blob was present to delete.
    pub fn delete(&mut self, hash: BlockHash) -> Result<bool, EngineError> {
        Ok(self.kv.delete(namespaced_key(self.namespace, hash).as_bytes())?)
    }

    pub fn list(&self) -> Result<Vec<BlockHash>, EngineError> {
        let prefix = format!("{}/", self.namespace);
        Ok(self
            .kv
            .prefix_scan(prefix.as_bytes())?
            .into_iter()
            .filter_map(|(key, _)| {
                let key = String::from_utf8(key).ok()?;
                BlockHash::from_hex(key.strip_prefix(&prefix)?)
            })
            .collect())
    }
}
