//! Outbound port: the filesystem capability set the transaction store is
//! built on, split so the same store code runs against a real OS filesystem
//! or an in-memory tree.

use crate::domain::errors::FsError;

/// A directory entry name as the filesystem capability set enumerates it.
pub type DirEntryName = String;

/// Filesystem capabilities the transaction store needs: existence checks,
/// whole-file read/write, rename, delete, and shard-directory enumeration.
///
/// Production: `OsFileSystem`. Testing / in-memory engine: `InMemoryFileSystem`.
pub trait TxFileSystem: Send + Sync {
    /// Whether `path` (file or directory) exists.
    fn exists(&self, path: &str) -> bool;

    /// Read a whole file. `None` if it does not exist.
    fn read(&self, path: &str) -> Result<Option<Vec<u8>>, FsError>;

    /// Write a whole file, creating parent directories as needed.
    fn write(&self, path: &str, contents: &[u8]) -> Result<(), FsError>;

    /// Size of a file in bytes, if it exists.
    fn file_size(&self, path: &str) -> Result<Option<u64>, FsError>;

    /// Rename `from` to `to`. Fails if `from` does not exist.
    fn rename(&self, from: &str, to: &str) -> Result<(), FsError>;

    /// Delete a file. A no-op (not an error) if it does not exist.
    fn delete(&self, path: &str) -> Result<(), FsError>;

    /// List direct child entry names of a directory, or an empty vec if the
    /// directory does not exist.
    fn list_dir(&self, path: &str) -> Result<Vec<DirEntryName>, FsError>;

    /// Generate a filename-safe random suffix for temp files
    /// (`.{suffix}.tmp`). Exposed on the trait so the in-memory backend can
    /// use a deterministic counter instead of real randomness.
    fn temp_suffix(&self) -> String;
}
