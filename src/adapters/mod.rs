//! Concrete adapters implementing the outbound ports: in-memory and
//! on-disk variants of both the key-value store and the transaction-store
//! filesystem, plus the on-disk process-exclusion lock.

pub mod fs_memory;
pub mod fs_os;
pub mod kv_file;
pub mod kv_memory;
pub mod lock;

pub use fs_memory::InMemoryFileSystem;
pub use fs_os::OsFileSystem;
pub use kv_file::FileKvStore;
pub use kv_memory::InMemoryKvStore;
pub use lock::DatabaseLock;
