//! Error types for the storage engine.
//!
//! Absence is never an error here — `get`-style operations return
//! `Option`/`bool`. `EngineError` only covers the two kinds that are: a
//! caller-supplied precondition violation (`Argument`), and an underlying
//! storage failure (`Io`/`Kv`/`Fs`).

use thiserror::Error;

/// Errors surfaced by the public engine API.
#[derive(Debug, Error)]
pub enum EngineError {
    /// A precondition on the arguments was violated — an inverted state-ref
    /// range, or a fork whose source chain doesn't exist.
    #[error("invalid argument: {0}")]
    Argument(String),

    /// The underlying key-value store failed.
    #[error("storage error: {0}")]
    Kv(#[from] KvError),

    /// The underlying filesystem failed.
    #[error("filesystem error: {0}")]
    Fs(#[from] FsError),

    /// Raw std::io failure not already wrapped by `Kv`/`Fs` (e.g. data
    /// directory creation on engine open).
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// A record failed to (de)serialize.
    #[error("serialization error: {0}")]
    Serialization(String),

    /// The on-disk data directory is already held open by another process.
    #[error("data directory locked: {0}")]
    Locked(String),
}

impl EngineError {
    /// Build an `Argument` error naming the offending field.
    pub fn argument(message: impl Into<String>) -> Self {
        EngineError::Argument(message.into())
    }
}

/// Key-value store failures.
#[derive(Debug, Error)]
pub enum KvError {
    #[error("I/O error: {0}")]
    Io(String),
    #[error("corrupt record: {0}")]
    Corrupt(String),
}

/// Filesystem capability failures (transaction store).
#[derive(Debug, Error)]
pub enum FsError {
    #[error("I/O error: {0}")]
    Io(String),
}

impl From<std::io::Error> for KvError {
    fn from(e: std::io::Error) -> Self {
        KvError::Io(e.to_string())
    }
}

impl From<std::io::Error> for FsError {
    fn from(e: std::io::Error) -> Self {
        FsError::Io(e.to_string())
    }
}
