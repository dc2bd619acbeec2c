//! In-memory virtual filesystem backing the transaction store in the
//! engine's in-memory mode. Writes land directly since there is no crash
//! window to protect against; the temp-file-then-rename dance the on-disk
//! adapter needs is unnecessary here, though `rename` is still implemented
//! so callers don't need to special-case the backend.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::Mutex;

use crate::domain::errors::FsError;
use crate::ports::fs::TxFileSystem;

#[derive(Default)]
pub struct InMemoryFileSystem {
    files: Mutex<HashMap<String, Vec<u8>>>,
    counter: AtomicU64,
}

impl InMemoryFileSystem {
    pub fn new() -> Self {
        Self::default()
    }
}

impl TxFileSystem for InMemoryFileSystem {
    fn exists(&self, path: &str) -> bool {
        self.files.lock().contains_key(path)
    }

    fn read(&self, path: &str) -> Result<Option<Vec<u8>>, FsError> {
        Ok(self.files.lock().get(path).cloned())
    }

    fn write(&self, path: &str, contents: &[u8]) -> Result<(), FsError> {
        self.files.lock().insert(path.to_string(), contents.to_vec());
        Ok(())
    }

    fn file_size(&self, path: &str) -> Result<Option<u64>, FsError> {
        Ok(self.files.lock().get(path).map(|b| b.len() as u64))
    }

    fn rename(&self, from: &str, to: &str) -> Result<(), FsError> {
        let mut files = self.files.lock();
        match files.remove(from) {
            Some(bytes) => {
                files.insert(to.to_string(), bytes);
                Ok(())
            }
            None => Err(FsError::Io(format!("rename source not found: {from}"))),
        }
    }

    fn delete(&self, path: &str) -> Result<(), FsError> {
        self.files.lock().remove(path);
        Ok(())
    }

    fn list_dir(&self, path: &str) -> Result<Vec<String>, FsError> {
        let prefix = if path.is_empty() { String::new() } else { format!("{path}/") };
        let mut seen = std::collections::BTreeSet::new();
        for key in self.files.lock().keys() {
            if let Some(rest) = key.strip_prefix(prefix.as_str()) {
                let child = rest.split('/').next().unwrap_or(rest);
                seen.insert(child.to_string());
            }
        }
        Ok(seen.into_iter().collect())
    }

    fn temp_suffix(&self) -> String {
        format!("{:x}", self.counter.fetch_add(1, Ordering::Relaxed))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn write_read_delete_round_trip() {
        let fs = InMemoryFileSystem::new();
        fs.write("ab/cdef", b"payload").unwrap();
        assert!(fs.exists("ab/cdef"));
        assert_eq!(fs.read("ab/cdef").unwrap(), Some(b"payload".to_vec()));
        fs.delete("ab/cdef").unwrap();
        assert!(!fs.exists("ab/cdef"));
    }

    #[test]
    fn list_dir_returns_immediate_children() {
        let fs = InMemoryFileSystem::new();
        fs.write("ab/one", b"1").unwrap();
        fs.write("ab/two", b"2").unwrap();
        fs.write("cd/three", b"3").unwrap();
        let mut shards = fs.list_dir("").unwrap();
        shards.sort();
        assert_eq!(shards, vec!["ab", "cd"]);
        let mut files = fs.list_dir("ab").unwrap();
        files.sort();
        assert_eq!(files, vec!["one", "two"]);
    }

    #[test]
    fn rename_moves_content() {
        let fs = InMemoryFileSystem::new();
        fs.write("ab/.tmp123", b"data").unwrap();
        fs.rename("ab/.tmp123", "ab/final").unwrap();
        assert!(!fs.exists("ab/.tmp123"));
        assert_eq!(fs.read("ab/final").unwrap(), Some(b"data".to_vec()));
    }
}
