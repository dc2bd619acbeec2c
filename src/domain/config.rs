//! Document database options recognized at engine open.

/// Options for opening an on-disk engine. Host-constructed, mirroring how
/// the block-storage crate's own `StorageConfig` is configured by the
/// embedding application rather than self-loaded from a file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineOptions {
    /// Double-write-check durability. Default on.
    pub journal: bool,
    /// Max cached pages. Default 50_000.
    pub cache_size: usize,
    /// Bypass the OS page cache on writes. Default on.
    pub flush: bool,
    /// Reject mutating operations. Default off.
    pub read_only: bool,
}

impl Default for EngineOptions {
    fn default() -> Self {
        Self {
            journal: true,
            cache_size: 50_000,
            flush: true,
            read_only: false,
        }
    }
}
