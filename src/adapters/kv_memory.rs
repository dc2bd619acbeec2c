//! In-memory key-value store backing the engine's in-memory mode.

use std::collections::HashMap;

use crate::domain::errors::KvError;
use crate::ports::kv::{BatchOperation, KeyValueStore};

/// Plain `HashMap`-backed store. No persistence; dropped with the engine.
#[derive(Default)]
pub struct InMemoryKvStore {
    data: HashMap<Vec<u8>, Vec<u8>>,
}

impl InMemoryKvStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl KeyValueStore for InMemoryKvStore {
    fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>, KvError> {
        Ok(self.data.get(key).cloned())
    }

    fn put(&mut self, key: &[u8], value: &[u8]) -> Result<(), KvError> {
        self.data.insert(key.to_vec(), value.to_vec());
        Ok(())
    }

    fn delete(&mut self, key: &[u8]) -> Result<bool, KvError> {
        Ok(self.data.remove(key).is_some())
    }

    fn atomic_batch_write(&mut self, operations: Vec<BatchOperation>) -> Result<(), KvError> {
        for op in operations {
            match op {
                BatchOperation::Put { key, value } => {
                    self.data.insert(key, value);
                }
                BatchOperation::Delete { key } => {
                    self.data.remove(&key);
                }
            }
        }
        Ok(())
    }

    fn prefix_scan(&self, prefix: &[u8]) -> Result<Vec<(Vec<u8>, Vec<u8>)>, KvError> {
        Ok(self
            .data
            .iter()
            .filter(|(k, _)| k.starts_with(prefix))
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn put_get_delete_round_trip() {
        let mut store = InMemoryKvStore::new();
        store.put(b"a", b"1").unwrap();
        assert_eq!(store.get(b"a").unwrap(), Some(b"1".to_vec()));
        assert!(store.delete(b"a").unwrap());
        assert_eq!(store.get(b"a").unwrap(), None);
        assert!(!store.delete(b"a").unwrap());
    }

    #[test]
    fn prefix_scan_filters() {
        let mut store = InMemoryKvStore::new();
        store.put(b"block/aa", b"1").unwrap();
        store.put(b"block/bb", b"2").unwrap();
        store.put(b"state/aa", b"3").unwrap();
        assert_eq!(store.prefix_scan(b"block/").unwrap().len(), 2);
        assert_eq!(store.prefix_scan(b"state/").unwrap().len(), 1);
    }

    #[test]
    fn batch_write_applies_all() {
        let mut store = InMemoryKvStore::new();
        store
            .atomic_batch_write(vec![
                BatchOperation::put(b"a".to_vec(), b"1".to_vec()),
                BatchOperation::put(b"b".to_vec(), b"2".to_vec()),
                BatchOperation::delete(b"a".to_vec()),
            ])
            .unwrap();
        assert_eq!(store.get(b"a").unwrap(), None);
        assert_eq!(store.get(b"b").unwrap(), Some(b"2".to_vec()));
    }
}
