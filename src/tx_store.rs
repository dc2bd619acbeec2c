//! Sharded, content-addressed transaction store over the filesystem port:
//! `<first-2-hex>/<remaining-62-hex>` path layout, atomic
//! temp-file-then-rename writes, and idempotent first-writer-wins puts.

use crate::domain::errors::EngineError;
use crate::domain::ids::TxId;
use crate::ports::fs::TxFileSystem;

fn shard_and_name(txid: TxId) -> (String, String) {
    let hex = txid.to_hex();
    (hex[..2].to_string(), hex[2..].to_string())
}

fn path_for(txid: TxId) -> String {
    let (shard, name) = shard_and_name(txid);
    format!("{shard}/{name}")
}

pub struct TransactionStore<'a> {
    fs: &'a dyn TxFileSystem,
}

impl<'a> TransactionStore<'a> {
    pub fn new(fs: &'a dyn TxFileSystem) -> Self {
        Self { fs }
    }

    /// Writes `bytes` under `txid` unless it is already stored. Returns
    /// whether this call actually wrote anything.
    ///
    /// Writes land via a temp file in the same shard, renamed into place.
    /// If the rename itself fails but the destination already exists with
    /// exactly the size just written, a concurrent writer raced us to the
    /// same content and won; that is treated as success rather than an
    /// error, since the content is identical either way.
    pub fn put(&self, txid: TxId, bytes: &[u8]) -> Result<bool, EngineError> {
        let path = path_for(txid);
        if self.fs.exists(&path) {
            tracing::trace!(txid = %txid, "idempotent put short-circuited");
            return Ok(false);
        }

        let (shard, _) = shard_and_name(txid);
        let temp_path = format!("{shard}/.{}.tmp", self.fs.temp_suffix());
        self.fs.write(&temp_path, bytes)?;

        match self.fs.rename(&temp_path, &path) {
            Ok(()) => Ok(true),
            Err(rename_err) => {
                let destination_matches =
                    matches!(self.fs.file_size(&path)?, Some(size) if size as usize == bytes.len());
                let _ = self.fs.delete(&temp_path);
                if destination_matches {
                    Ok(true)
                } else {
                    Err(rename_err.into())
                }
            }
        }
    }

    pub fn get(&self, txid: TxId) -> Result<Option<Vec<u8>>, EngineError> {
        Ok(self.fs.read(&path_for(txid))?)
    }

    /// Returns whether a transaction was present to delete.
    pub fn delete(&self, txid: TxId) -> Result<bool, EngineError> {
        let path = path_for(txid);
        let existed = self.fs.exists(&path);
        if existed {
            self.fs.delete(&path)?;
        }
        Ok(existed)
    }

    /// Every stored transaction id, in no particular order. Shard and file
    /// names that are not well-formed hex of the expected length (stray
    /// temp files, foreign entries) are skipped rather than failing the
    /// whole scan.
    pub fn iterate_transaction_ids(&self) -> Result<Vec<TxId>, EngineError> {
        let mut ids = Vec::new();
        for shard in self.fs.list_dir("")? {
            if shard.len() != 2 || !shard.bytes().all(|b| b.is_ascii_hexdigit()) {
                continue;
            }
            for name in self.fs.list_dir(&shard)? {
                if name.len() != 62 || !name.bytes().all(|b| b.is_ascii_hexdigit()) {
                    continue;
                }
                if let Some(txid) = TxId::from_hex(&format!("{shard}{name}")) {
                    ids.push(txid);
                }
            }
        }
        Ok(ids)
    }

    pub fn count(&self) -> Result<i64, EngineError> {
        Ok(self.iterate_transaction_ids()?.len() as i64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::fs_memory::InMemoryFileSystem;

    #[test]
    fn put_get_delete_round_trip() {
        let fs = InMemoryFileSystem::new();
        let store = TransactionStore::new(&fs);
        let id = TxId([0xab; 32]);

        assert_eq!(store.get(id).unwrap(), None);
        assert!(store.put(id, b"payload").unwrap());
        assert_eq!(store.get(id).unwrap(), Some(b"payload".to_vec()));
        assert!(store.delete(id).unwrap());
        assert!(!store.delete(id).unwrap());
        assert_eq!(store.get(id).unwrap(), None);
    }

    #[test]
    fn put_is_idempotent() {
        let fs = InMemoryFileSystem::new();
        let store = TransactionStore::new(&fs);
        let id = TxId([1; 32]);
        assert!(store.put(id, b"first").unwrap());
        assert!(!store.put(id, b"second").unwrap());
        assert_eq!(store.get(id).unwrap(), Some(b"first".to_vec()));
    }

    #[test]
    fn iterate_skips_stray_temp_files() {
        let fs = InMemoryFileSystem::new();
        fs.write("ab/.deadbeef.tmp", b"garbage").unwrap();
        let store = TransactionStore::new(&fs);
        let id = TxId([0xab; 32]);
        store.put(id, b"data").unwrap();

        let ids = store.iterate_transaction_ids().unwrap();
        assert_eq!(ids, vec![id]);
        assert_eq!(store.count().unwrap(), 1);
    }

    #[test]
    fn shards_by_first_hex_byte() {
        let fs = InMemoryFileSystem::new();
        let store = TransactionStore::new(&fs);
        let id = TxId([0xcd; 32]);
        store.put(id, b"x").unwrap();
        assert!(fs.exists(&format!("cd/{}", "cd".repeat(31))));
    }
}
