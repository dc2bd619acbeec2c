//! Process-exclusion lock over the on-disk data directory.
//!
//! The minimalist `FileKvStore` has no native shared-reader mode, so every
//! on-disk open takes this lock, uniformly across platforms, rather than
//! relying on an OS-specific exclusive-open behavior.

use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

use fs2::FileExt;

const LOCK_FILE: &str = "LOCK";

/// Exclusive lock on a data directory. Acquired on engine open, released on
/// `Drop`.
pub struct DatabaseLock {
    file: File,
    path: PathBuf,
}

impl DatabaseLock {
    /// Acquire an exclusive, non-blocking lock on `data_dir`.
    ///
    /// # Errors
    /// Returns an error describing the holding PID (if recoverable) when
    /// another process already holds the lock.
    pub fn acquire(data_dir: &Path) -> std::io::Result<Self> {
        let path = data_dir.join(LOCK_FILE);
        let file = OpenOptions::new().create(true).write(true).truncate(false).open(&path)?;

        file.try_lock_exclusive().map_err(|_| {
            let held_by = std::fs::read_to_string(&path).ok();
            std::io::Error::new(
                std::io::ErrorKind::WouldBlock,
                match held_by {
                    Some(pid) if !pid.trim().is_empty() => {
                        format!("data directory already in use by process {}", pid.trim())
                    }
                    _ => "data directory already in use".to_string(),
                },
            )
        })?;

        let mut file = file;
        file.set_len(0)?;
        writeln!(file, "{}", std::process::id())?;
        file.sync_all()?;

        tracing::info!(path = %path.display(), pid = std::process::id(), "acquired data directory lock");
        Ok(Self { file, path })
    }
}

impl Drop for DatabaseLock {
    fn drop(&mut self) {
        let _ = self.file.unlock();
        let _ = std::fs::remove_file(&self.path);
        tracing::info!(path = %self.path.display(), "released data directory lock");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn second_acquire_fails_while_first_is_held() {
        let dir = tempfile::tempdir().unwrap();
        let first = DatabaseLock::acquire(dir.path()).unwrap();
        assert!(DatabaseLock::acquire(dir.path()).is_err());
        drop(first);
        assert!(DatabaseLock::acquire(dir.path()).is_ok());
    }
}
