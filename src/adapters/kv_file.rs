//! On-disk key-value store: the `index.ldb` document database file.
//! Loads the whole file into memory on open and rewrites it on every
//! mutation — a deliberately minimalist backend built around a single flat
//! keyspace with composite-key prefixes, not a paged database engine.

use std::collections::HashMap;
use std::io::Write;
use std::path::{Path, PathBuf};

use crate::domain::config::EngineOptions;
use crate::domain::errors::KvError;
use crate::ports::kv::{BatchOperation, KeyValueStore};

pub struct FileKvStore {
    data: HashMap<Vec<u8>, Vec<u8>>,
    path: PathBuf,
    options: EngineOptions,
}

impl FileKvStore {
    /// Open (or create) the database file at `path`.
    pub fn open(path: impl AsRef<Path>, options: EngineOptions) -> Result<Self, KvError> {
        let path = path.as_ref().to_path_buf();
        let data = match std::fs::read(&path) {
            Ok(bytes) => Self::decode(&bytes)?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => HashMap::new(),
            Err(e) => return Err(e.into()),
        };
        tracing::debug!(path = %path.display(), keys = data.len(), "opened index.ldb");
        Ok(Self { data, path, options })
    }

    fn decode(bytes: &[u8]) -> Result<HashMap<Vec<u8>, Vec<u8>>, KvError> {
        let mut data = HashMap::new();
        let mut cursor = 0usize;
        while cursor + 4 <= bytes.len() {
            let key_len = read_u32(bytes, cursor)?;
            cursor += 4;
            let key = read_slice(bytes, cursor, key_len)?;
            cursor += key_len;

            let value_len = read_u32(bytes, cursor)?;
            cursor += 4;
            let value = read_slice(bytes, cursor, value_len)?;
            cursor += value_len;

            data.insert(key.to_vec(), value.to_vec());
        }
        Ok(data)
    }

    fn encode(&self) -> Vec<u8> {
        let mut bytes = Vec::new();
        for (key, value) in &self.data {
            bytes.extend_from_slice(&(key.len() as u32).to_le_bytes());
            bytes.extend_from_slice(key);
            bytes.extend_from_slice(&(value.len() as u32).to_le_bytes());
            bytes.extend_from_slice(value);
        }
        bytes
    }

    /// Persist the in-memory map. When `journal` is enabled the new content
    /// is written to a side file and fsynced before the rename commits it,
    /// so a crash mid-write never leaves `index.ldb` truncated. `flush`
    /// controls whether the write is fsynced at all.
    fn save(&self) -> Result<(), KvError> {
        if self.options.read_only {
            return Err(KvError::Io("database opened read-only".to_string()));
        }
        let bytes = self.encode();

        if self.options.journal {
            let journal_path = self.path.with_extension("ldb.journal");
            let mut file = std::fs::File::create(&journal_path)?;
            file.write_all(&bytes)?;
            if self.options.flush {
                file.sync_all()?;
            }
            std::fs::rename(&journal_path, &self.path)?;
        } else {
            let mut file = std::fs::File::create(&self.path)?;
            file.write_all(&bytes)?;
            if self.options.flush {
                file.sync_all()?;
            }
        }
        Ok(())
    }
}

fn read_u32(bytes: &[u8], at: usize) -> Result<usize, KvError> {
    bytes
        .get(at..at + 4)
        .map(|s| u32::from_le_bytes(s.try_into().unwrap()) as usize)
        .ok_or_else(|| KvError::Corrupt("truncated length prefix".to_string()))
}

fn read_slice(bytes: &[u8], at: usize, len: usize) -> Result<&[u8], KvError> {
    bytes
        .get(at..at + len)
        .ok_or_else(|| KvError::Corrupt("truncated record".to_string()))
}

impl KeyValueStore for FileKvStore {
    fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>, KvError> {
        Ok(self.data.get(key).cloned())
    }

    fn put(&mut self, key: &[u8], value: &[u8]) -> Result<(), KvError> {
        if self.options.read_only {
            return Err(KvError::Io("database opened read-only".to_string()));
        }
        self.data.insert(key.to_vec(), value.to_vec());
        self.save()
    }

    fn delete(&mut self, key: &[u8]) -> Result<bool, KvError> {
        if self.options.read_only {
            return Err(KvError::Io("database opened read-only".to_string()));
        }
        let existed = self.data.remove(key).is_some();
        if existed {
            self.save()?;
        }
        Ok(existed)
    }

    fn atomic_batch_write(&mut self, operations: Vec<BatchOperation>) -> Result<(), KvError> {
        if self.options.read_only {
            return Err(KvError::Io("database opened read-only".to_string()));
        }
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
        self.save()
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
