//! The public facade: roughly forty operations over the five subsystems,
//! grouped by domain. One `StorageEngine` per storage location for the
//! lifetime of a node; create it on-disk or in-memory.

use std::path::Path;

use parking_lot::{Mutex, RwLock, RwLockUpgradableReadGuard};

use crate::adapters::{DatabaseLock, FileKvStore, InMemoryFileSystem, InMemoryKvStore, OsFileSystem};
use crate::blob_store::BlobStore;
use crate::collections::CollectionsDb;
use crate::domain::config::EngineOptions;
use crate::domain::errors::EngineError;
use crate::domain::ids::{Address, BlockHash, ChainId, TxId};
use crate::domain::records::{BlockRecord, StateMap, TransactionRecord};
use crate::ports::fs::TxFileSystem;
use crate::ports::kv::KeyValueStore;
use crate::tx_store::TransactionStore;

const BLOCK_NAMESPACE: &str = "block";
const STATE_NAMESPACE: &str = "state";

/// A stateful storage location: one flat key-value store (blobs +
/// collections) plus a filesystem root for transactions, reachable
/// concurrently from any number of threads.
pub struct StorageEngine {
    kv: Mutex<Box<dyn KeyValueStore>>,
    fs: Box<dyn TxFileSystem>,
    block_lock: RwLock<()>,
    _process_lock: Option<DatabaseLock>,
}

impl StorageEngine {
    /// Opens (or creates) an on-disk engine rooted at `data_dir`. Acquires
    /// the process-exclusion lock for the lifetime of the returned engine.
    pub fn open_on_disk(data_dir: impl AsRef<Path>, options: EngineOptions) -> Result<Self, EngineError> {
        let data_dir = data_dir.as_ref();
        std::fs::create_dir_all(data_dir)?;
        let process_lock = DatabaseLock::acquire(data_dir)
            .map_err(|e| EngineError::Locked(e.to_string()))?;
        let kv = FileKvStore::open(data_dir.join("index.ldb"), options)?;
        let fs = OsFileSystem::new(data_dir.join("tx"));
        tracing::info!(path = %data_dir.display(), "opened storage engine");
        Ok(Self {
            kv: Mutex::new(Box::new(kv)),
            fs: Box::new(fs),
            block_lock: RwLock::new(()),
            _process_lock: Some(process_lock),
        })
    }

    /// Opens an in-memory engine: no process lock, no files on disk.
    pub fn open_in_memory() -> Self {
        tracing::info!("opened in-memory storage engine");
        Self {
            kv: Mutex::new(Box::new(InMemoryKvStore::new())),
            fs: Box::new(InMemoryFileSystem::new()),
            block_lock: RwLock::new(()),
            _process_lock: None,
        }
    }
}

impl Drop for StorageEngine {
    fn drop(&mut self) {
        tracing::info!(on_disk = self._process_lock.is_some(), "closing storage engine");
    }
}

impl StorageEngine {
    fn with_collections<R>(
        &self,
        f: impl FnOnce(&mut CollectionsDb<'_>) -> Result<R, EngineError>,
    ) -> Result<R, EngineError> {
        let mut guard = self.kv.lock();
        let mut collections = CollectionsDb::new(guard.as_mut());
        f(&mut collections)
    }

    fn with_blob<R>(
        &self,
        namespace: &'static str,
        f: impl FnOnce(&mut BlobStore<'_>) -> Result<R, EngineError>,
    ) -> Result<R, EngineError> {
        let mut guard = self.kv.lock();
        let mut blobs = BlobStore::new(guard.as_mut(), namespace);
        f(&mut blobs)
    }

    fn transactions(&self) -> TransactionStore<'_> {
        TransactionStore::new(self.fs.as_ref())
    }

    // -----------------------------------------------------------------
    // Chain lifecycle
    // -----------------------------------------------------------------

    pub fn list_chain_ids(&self) -> Result<Vec<ChainId>, EngineError> {
        self.with_collections(|c| c.list_chain_ids())
    }

    pub fn delete_chain_id(&self, chain: ChainId) -> Result<(), EngineError> {
        self.with_collections(|c| c.delete_chain_id(chain))
    }

    pub fn get_canonical_chain_id(&self) -> Result<Option<ChainId>, EngineError> {
        self.with_collections(|c| c.get_canonical_chain_id())
    }

    pub fn set_canonical_chain_id(&self, chain: ChainId) -> Result<(), EngineError> {
        self.with_collections(|c| c.set_canonical_chain_id(chain))
    }

    // -----------------------------------------------------------------
    // Index (per-chain block order)
    // -----------------------------------------------------------------

    pub fn count_index(&self, chain: ChainId) -> Result<i64, EngineError> {
        self.with_collections(|c| c.count_index(chain))
    }

    pub fn iterate_indexes(
        &self,
        chain: ChainId,
        offset: u64,
        limit: Option<u64>,
    ) -> Result<Vec<BlockHash>, EngineError> {
        self.with_collections(|c| c.iterate_indexes(chain, offset, limit))
    }

    pub fn index_block_hash(&self, chain: ChainId, i: i64) -> Result<Option<BlockHash>, EngineError> {
        self.with_collections(|c| c.index_block_hash(chain, i))
    }

    pub fn append_index(&self, chain: ChainId, hash: BlockHash) -> Result<i64, EngineError> {
        self.with_collections(|c| c.append_index(chain, hash))
    }

    pub fn delete_index(&self, chain: ChainId, hash: BlockHash) -> Result<bool, EngineError> {
        self.with_collections(|c| c.delete_index(chain, hash))
    }

    pub fn fork_block_indexes(&self, src: ChainId, dst: ChainId, branch_point: BlockHash) -> Result<(), EngineError> {
        self.with_collections(|c| c.fork_block_indexes(src, dst, branch_point))
    }

    // -----------------------------------------------------------------
    // Transactions
    // -----------------------------------------------------------------

    /// Idempotent: a re-put of an identical `TxId` is a no-op.
    pub fn put_transaction<T: TransactionRecord>(&self, tx: &T) -> Result<bool, EngineError> {
        self.transactions().put(tx.id(), &tx.to_bytes())
    }

    pub fn get_transaction(&self, id: TxId) -> Result<Option<Vec<u8>>, EngineError> {
        self.transactions().get(id)
    }

    /// Returns whether the transaction was present to delete. Other blocks
    /// referencing the same transaction are unaffected by this call — there
    /// is no reference counting at this layer.
    pub fn delete_transaction(&self, id: TxId) -> Result<bool, EngineError> {
        self.transactions().delete(id)
    }

    pub fn iterate_transaction_ids(&self) -> Result<Vec<TxId>, EngineError> {
        self.transactions().iterate_transaction_ids()
    }

    /// O(N): scans the whole transaction store. See `TransactionStore::count`.
    pub fn count_transactions(&self) -> Result<i64, EngineError> {
        self.transactions().count()
    }

    pub fn stage_transaction_ids(&self, ids: &[TxId]) -> Result<(), EngineError> {
        self.with_collections(|c| c.stage_transaction_ids(ids))
    }

    pub fn unstage_transaction_ids(&self, ids: &[TxId]) -> Result<(), EngineError> {
        self.with_collections(|c| c.unstage_transaction_ids(ids))
    }

    pub fn iterate_staged_transaction_ids(&self) -> Result<Vec<TxId>, EngineError> {
        self.with_collections(|c| c.iterate_staged_transaction_ids())
    }

    // -----------------------------------------------------------------
    // Blocks — guarded by the block lock
    // -----------------------------------------------------------------

    /// If `block`'s hash is already stored, returns `Ok(false)` without
    /// writing anything (its transactions included). Otherwise, under the
    /// block write lock, puts every contained transaction first, then the
    /// block body — so any reader that observes the block via
    /// `iterate_block_hashes` can always read each of its transactions.
    pub fn put_block<B: BlockRecord>(&self, block: &B) -> Result<bool, EngineError> {
        let hash = block.hash();
        let read = self.block_lock.upgradable_read();
        let already_stored = self.with_blob(BLOCK_NAMESPACE, |b| b.exists(hash))?;
        if already_stored {
            return Ok(false);
        }

        let write = RwLockUpgradableReadGuard::upgrade(read);
        for tx in block.transactions() {
            self.put_transaction(tx)?;
        }
        let wrote = self.with_blob(BLOCK_NAMESPACE, |b| b.put(hash, &block.to_bytes()))?;
        drop(write);
        Ok(wrote)
    }

    /// Acquires an upgradeable read lock to check existence, then upgrades
    /// to a write lock for the duration of the blob read, matching the
    /// concurrency contract even though this backend's reads are cheap
    /// in-memory lookups rather than a real download.
    pub fn get_raw_block(&self, hash: BlockHash) -> Result<Option<Vec<u8>>, EngineError> {
        let read = self.block_lock.upgradable_read();
        let exists = self.with_blob(BLOCK_NAMESPACE, |b| b.exists(hash))?;
        if !exists {
            return Ok(None);
        }
        let write = RwLockUpgradableReadGuard::upgrade(read);
        let bytes = self.with_blob(BLOCK_NAMESPACE, |b| b.get(hash))?;
        drop(write);
        Ok(bytes)
    }

    /// Removes only the `block/<hash>` blob; contained transactions are not
    /// deleted, since they may belong to other blocks.
    pub fn delete_block(&self, hash: BlockHash) -> Result<bool, EngineError> {
        let _write = self.block_lock.write();
        self.with_blob(BLOCK_NAMESPACE, |b| b.delete(hash))
    }

    pub fn iterate_block_hashes(&self) -> Result<Vec<BlockHash>, EngineError> {
        let _read = self.block_lock.read();
        self.with_blob(BLOCK_NAMESPACE, |b| b.list())
    }

    pub fn count_blocks(&self) -> Result<i64, EngineError> {
        let _read = self.block_lock.read();
        self.with_blob(BLOCK_NAMESPACE, |b| Ok(b.list()?.len() as i64))
    }

    // -----------------------------------------------------------------
    // State snapshots
    // -----------------------------------------------------------------

    pub fn get_block_states(&self, hash: BlockHash) -> Result<Option<StateMap>, EngineError> {
        let bytes = self.with_blob(STATE_NAMESPACE, |b| b.get(hash))?;
        match bytes {
            Some(bytes) => {
                let map = bincode::deserialize(&bytes)
                    .map_err(|e| EngineError::Serialization(e.to_string()))?;
                Ok(Some(map))
            }
            None => Ok(None),
        }
    }

    /// Replace semantics: unlike the blob store's normal first-writer-wins
    /// put, a snapshot upload always overwrites any existing snapshot for
    /// `hash`, so callers may replace a recomputed snapshot.
    pub fn set_block_states(&self, hash: BlockHash, states: &StateMap) -> Result<(), EngineError> {
        let bytes = bincode::serialize(states).map_err(|e| EngineError::Serialization(e.to_string()))?;
        let key = format!("{STATE_NAMESPACE}/{}", hash.to_hex());
        let mut guard = self.kv.lock();
        guard.put(key.as_bytes(), &bytes)?;
        Ok(())
    }

    // -----------------------------------------------------------------
    // State references
    // -----------------------------------------------------------------

    pub fn iterate_state_references(
        &self,
        chain: ChainId,
        address: Address,
        highest_index: Option<i64>,
        lowest_index: Option<i64>,
        limit: Option<u64>,
    ) -> Result<Vec<(BlockHash, i64)>, EngineError> {
        self.with_collections(|c| c.iterate_state_references(chain, address, highest_index, lowest_index, limit))
    }

    pub fn store_state_reference(
        &self,
        chain: ChainId,
        addresses: &[Address],
        block_hash: BlockHash,
        block_index: i64,
    ) -> Result<(), EngineError> {
        self.with_collections(|c| c.store_state_reference(chain, addresses, block_hash, block_index))
    }

    pub fn fork_state_references(
        &self,
        src: ChainId,
        dst: ChainId,
        branch_point_index: i64,
    ) -> Result<(), EngineError> {
        self.with_collections(|c| c.fork_state_references(src, dst, branch_point_index))
    }

    pub fn list_addresses(&self, chain: ChainId) -> Result<Vec<Address>, EngineError> {
        self.with_collections(|c| c.list_addresses(chain))
    }

    // -----------------------------------------------------------------
    // Nonces
    // -----------------------------------------------------------------

    pub fn get_tx_nonce(&self, chain: ChainId, address: Address) -> Result<i64, EngineError> {
        self.with_collections(|c| c.get_tx_nonce(chain, address))
    }

    pub fn increase_tx_nonce(&self, chain: ChainId, signer: Address, delta: i64) -> Result<i64, EngineError> {
        self.with_collections(|c| c.increase_tx_nonce(chain, signer, delta))
    }

    pub fn list_tx_nonces(&self, chain: ChainId) -> Result<Vec<(Address, i64)>, EngineError> {
        self.with_collections(|c| c.list_tx_nonces(chain))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Clone)]
    struct TestTx {
        id: TxId,
        bytes: Vec<u8>,
    }

    impl TransactionRecord for TestTx {
        fn id(&self) -> TxId {
            self.id
        }
        fn to_bytes(&self) -> Vec<u8> {
            self.bytes.clone()
        }
    }

    struct TestBlock {
        hash: BlockHash,
        bytes: Vec<u8>,
        txs: Vec<TestTx>,
    }

    impl BlockRecord for TestBlock {
        type Tx = TestTx;
        fn hash(&self) -> BlockHash {
            self.hash
        }
        fn to_bytes(&self) -> Vec<u8> {
            self.bytes.clone()
        }
        fn transactions(&self) -> &[TestTx] {
            &self.txs
        }
    }

    fn block(byte: u8, tx_bytes: &[u8]) -> TestBlock {
        TestBlock {
            hash: BlockHash([byte; 32]),
            bytes: format!("block-{byte}").into_bytes(),
            txs: vec![TestTx { id: TxId([byte; 32]), bytes: tx_bytes.to_vec() }],
        }
    }

    #[test]
    fn put_block_is_idempotent_and_puts_its_transactions() {
        let engine = StorageEngine::open_in_memory();
        let b = block(1, b"payload");

        assert!(engine.put_block(&b).unwrap());
        assert!(!engine.put_block(&b).unwrap());

        assert_eq!(engine.get_raw_block(b.hash).unwrap(), Some(b.bytes.clone()));
        assert_eq!(engine.get_transaction(TxId([1; 32])).unwrap(), Some(b"payload".to_vec()));
    }

    #[test]
    fn delete_block_leaves_transactions_in_place() {
        let engine = StorageEngine::open_in_memory();
        let b = block(2, b"payload");
        engine.put_block(&b).unwrap();

        assert!(engine.delete_block(b.hash).unwrap());
        assert!(!engine.delete_block(b.hash).unwrap());
        assert_eq!(engine.get_raw_block(b.hash).unwrap(), None);
        assert_eq!(engine.get_transaction(TxId([2; 32])).unwrap(), Some(b"payload".to_vec()));
    }

    #[test]
    fn count_and_iterate_blocks() {
        let engine = StorageEngine::open_in_memory();
        engine.put_block(&block(3, b"a")).unwrap();
        engine.put_block(&block(4, b"b")).unwrap();

        assert_eq!(engine.count_blocks().unwrap(), 2);
        let mut hashes = engine.iterate_block_hashes().unwrap();
        hashes.sort();
        let mut expected = vec![BlockHash([3; 32]), BlockHash([4; 32])];
        expected.sort();
        assert_eq!(hashes, expected);
    }

    #[test]
    fn block_states_replace_on_overwrite() {
        let engine = StorageEngine::open_in_memory();
        let hash = BlockHash([5; 32]);
        let addr = Address([9; 20]);

        let mut first = StateMap::new();
        first.insert(addr, b"v1".to_vec());
        engine.set_block_states(hash, &first).unwrap();
        assert_eq!(engine.get_block_states(hash).unwrap(), Some(first));

        let mut second = StateMap::new();
        second.insert(addr, b"v2".to_vec());
        engine.set_block_states(hash, &second).unwrap();
        assert_eq!(engine.get_block_states(hash).unwrap(), Some(second));
    }

    #[test]
    fn canonical_chain_round_trips_through_engine() {
        let engine = StorageEngine::open_in_memory();
        assert_eq!(engine.get_canonical_chain_id().unwrap(), None);
        let chain = ChainId([1; 16]);
        engine.set_canonical_chain_id(chain).unwrap();
        assert_eq!(engine.get_canonical_chain_id().unwrap(), Some(chain));
    }

    #[test]
    fn staged_transactions_round_trip_through_engine() {
        let engine = StorageEngine::open_in_memory();
        let t1 = TxId([10; 32]);
        let t2 = TxId([11; 32]);
        engine.stage_transaction_ids(&[t1, t2, t1]).unwrap();
        let mut staged = engine.iterate_staged_transaction_ids().unwrap();
        staged.sort();
        assert_eq!(staged, vec![t1, t2]);
        engine.unstage_transaction_ids(&[t1]).unwrap();
        assert_eq!(engine.iterate_staged_transaction_ids().unwrap(), vec![t2]);
    }

    #[test]
    fn on_disk_engine_persists_across_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let hash = BlockHash([6; 32]);
        {
            let engine = StorageEngine::open_on_disk(dir.path(), EngineOptions::default()).unwrap();
            engine.put_block(&block(6, b"payload")).unwrap();
        }
        let engine = StorageEngine::open_on_disk(dir.path(), EngineOptions::default()).unwrap();
        assert_eq!(engine.get_raw_block(hash).unwrap(), Some(b"block-6".to_vec()));
        assert_eq!(engine.get_transaction(TxId([6; 32])).unwrap(), Some(b"payload".to_vec()));
    }

    #[test]
    fn on_disk_engine_refuses_second_concurrent_open() {
        let dir = tempfile::tempdir().unwrap();
        let _first = StorageEngine::open_on_disk(dir.path(), EngineOptions::default()).unwrap();
        assert!(StorageEngine::open_on_disk(dir.path(), EngineOptions::default()).is_err());
    }
}
