//! Indexed Collections: per-chain block-index lists, state-reference
//! history, nonce maps, the process-wide staged-transaction set, and the
//! singleton canonical-chain pointer.
//!
//! Built as one flat `KeyValueStore` with composite-key prefixes standing
//! in for named collections, an explicit per-collection id counter, and
//! secondary indexes realized by scanning a collection's key range rather
//! than maintaining separate index structures. Acceptable at this scale for
//! the same reason an O(N) transaction count is acceptable elsewhere in
//! this engine.

use crate::domain::errors::EngineError;
use crate::domain::ids::{Address, BlockHash, ChainId, TxId};
use crate::ports::kv::{BatchOperation, KeyValueStore};

const INDEX_PREFIX: &str = "index/";
const STATEREF_PREFIX: &str = "stateref/";
const NONCE_PREFIX: &str = "nonce/";
const STAGED_PREFIX: &str = "staged/";
const CANON_KEY: &str = "canon";

fn index_ctr_key(chain: ChainId) -> String {
    format!("{INDEX_PREFIX}{}/ctr", chain.to_hex())
}

fn index_rec_key(chain: ChainId, id: u64) -> String {
    format!("{INDEX_PREFIX}{}/rec/{:016x}", chain.to_hex(), id)
}

fn index_rec_prefix(chain: ChainId) -> String {
    format!("{INDEX_PREFIX}{}/rec/", chain.to_hex())
}

fn stateref_prefix(chain: ChainId) -> String {
    format!("{STATEREF_PREFIX}{}/rec/", chain.to_hex())
}

fn stateref_key(chain: ChainId, address: Address, block_hash: BlockHash) -> String {
    format!("{}{}{}", stateref_prefix(chain), address.to_hex(), block_hash.to_hex())
}

fn nonce_prefix(chain: ChainId) -> String {
    format!("{NONCE_PREFIX}{}/rec/", chain.to_hex())
}

fn nonce_key(chain: ChainId, address: Address) -> String {
    format!("{}{}", nonce_prefix(chain), address.to_hex())
}

fn staged_key(txid: TxId) -> String {
    format!("{STAGED_PREFIX}{}", txid.to_hex())
}

/// Borrows the flat key-value store and exposes the five named-collection
/// operation groups.
pub struct CollectionsDb<'a> {
    kv: &'a mut dyn KeyValueStore,
}

impl<'a> CollectionsDb<'a> {
    pub fn new(kv: &'a mut dyn KeyValueStore) -> Self {
        Self { kv }
    }

    // ---------------------------------------------------------------
    // Chain lifecycle
    // ---------------------------------------------------------------

    /// Chains that have ever had an index collection created, derived by
    /// scanning collection names with the `index_` prefix.
    pub fn list_chain_ids(&self) -> Result<Vec<ChainId>, EngineError> {
        let mut ids = Vec::new();
        for (key, _) in self.kv.prefix_scan(INDEX_PREFIX.as_bytes())? {
            let key = String::from_utf8_lossy(&key);
            if let Some(rest) = key.strip_prefix(INDEX_PREFIX).and_then(|r| r.strip_suffix("/ctr")) {
                if let Some(chain) = ChainId::from_hex(rest) {
                    ids.push(chain);
                }
            }
        }
        Ok(ids)
    }

    /// Drops the index, state-ref, and nonce collections for `chain`.
    /// Blocks, transactions, and state snapshots are untouched.
    pub fn delete_chain_id(&mut self, chain: ChainId) -> Result<(), EngineError> {
        self.kv.delete_prefix(format!("{INDEX_PREFIX}{}/", chain.to_hex()).as_bytes())?;
        self.kv.delete_prefix(stateref_prefix(chain).as_bytes())?;
        self.kv.delete_prefix(nonce_prefix(chain).as_bytes())?;
        Ok(())
    }

    pub fn get_canonical_chain_id(&self) -> Result<Option<ChainId>, EngineError> {
        match self.kv.get(CANON_KEY.as_bytes())? {
            Some(bytes) if bytes.len() == ChainId::LEN => {
                let mut buf = [0u8; ChainId::LEN];
                buf.copy_from_slice(&bytes);
                Ok(Some(ChainId(buf)))
            }
            _ => Ok(None),
        }
    }

    pub fn set_canonical_chain_id(&mut self, chain: ChainId) -> Result<(), EngineError> {
        self.kv.put(CANON_KEY.as_bytes(), &chain.0)?;
        Ok(())
    }

    // ---------------------------------------------------------------
    // Index (per-chain block order)
    // ---------------------------------------------------------------

    fn next_index_id(&self, chain: ChainId) -> Result<u64, EngineError> {
        match self.kv.get(index_ctr_key(chain).as_bytes())? {
            Some(bytes) if bytes.len() == 8 => Ok(u64::from_le_bytes(bytes.try_into().unwrap())),
            _ => Ok(1),
        }
    }

    /// All `(id, hash)` pairs for `chain`, sorted by ascending id. The
    /// backing store's `prefix_scan` has no ordering guarantee, so this is
    /// where chain order is reconstructed from the id encoded in each key.
    fn index_records(&self, chain: ChainId) -> Result<Vec<(u64, BlockHash)>, EngineError> {
        let prefix = index_rec_prefix(chain);
        let mut records: Vec<(u64, BlockHash)> = self
            .kv
            .prefix_scan(prefix.as_bytes())?
            .into_iter()
            .filter_map(|(key, value)| {
                let key = String::from_utf8(key).ok()?;
                let id_hex = key.strip_prefix(&prefix)?;
                let id = u64::from_str_radix(id_hex, 16).ok()?;
                let hash_bytes: [u8; BlockHash::LEN] = value.try_into().ok()?;
                Some((id, BlockHash(hash_bytes)))
            })
            .collect();
        records.sort_by_key(|(id, _)| *id);
        Ok(records)
    }

    pub fn count_index(&self, chain: ChainId) -> Result<i64, EngineError> {
        Ok(self.next_index_id(chain)? as i64 - 1)
    }

    pub fn iterate_indexes(
        &self,
        chain: ChainId,
        offset: u64,
        limit: Option<u64>,
    ) -> Result<Vec<BlockHash>, EngineError> {
        let records = self.index_records(chain)?;
        let iter = records.into_iter().skip(offset as usize).map(|(_, hash)| hash);
        Ok(match limit {
            Some(n) => iter.take(n as usize).collect(),
            None => iter.collect(),
        })
    }

    pub fn index_block_hash(&self, chain: ChainId, i: i64) -> Result<Option<BlockHash>, EngineError> {
        let count = self.count_index(chain)?;
        let effective = if i < 0 { i + count } else { i };
        if effective < 0 || effective >= count {
            return Ok(None);
        }
        let id = (effective + 1) as u64;
        match self.kv.get(index_rec_key(chain, id).as_bytes())? {
            Some(bytes) => {
                let buf: [u8; BlockHash::LEN] =
                    bytes.try_into().map_err(|_| EngineError::Serialization("bad index record".into()))?;
                Ok(Some(BlockHash(buf)))
            }
            None => Ok(None),
        }
    }

    /// Appends `hash` and returns the zero-based height it was placed at.
    pub fn append_index(&mut self, chain: ChainId, hash: BlockHash) -> Result<i64, EngineError> {
        let id = self.next_index_id(chain)?;
        self.kv.atomic_batch_write(vec![
            BatchOperation::put(index_rec_key(chain, id), hash.0.to_vec()),
            BatchOperation::put(index_ctr_key(chain), (id + 1).to_le_bytes().to_vec()),
        ])?;
        Ok(id as i64 - 1)
    }

    /// Deletes any index record with hash `hash`. Returns true iff at least
    /// one was deleted.
    pub fn delete_index(&mut self, chain: ChainId, hash: BlockHash) -> Result<bool, EngineError> {
        let mut deleted_any = false;
        for (id, recorded_hash) in self.index_records(chain)? {
            if recorded_hash == hash {
                self.kv.delete(index_rec_key(chain, id).as_bytes())?;
                deleted_any = true;
            }
        }
        Ok(deleted_any)
    }

    /// Copies from `src` into `dst` every index record encountered in order
    /// up to but not including the first occurrence of `branch_point`, then
    /// appends `branch_point`.
    pub fn fork_block_indexes(
        &mut self,
        src: ChainId,
        dst: ChainId,
        branch_point: BlockHash,
    ) -> Result<(), EngineError> {
        for (_, hash) in self.index_records(src)? {
            if hash == branch_point {
                break;
            }
            self.append_index(dst, hash)?;
        }
        self.append_index(dst, branch_point)?;
        tracing::debug!(src = %src, dst = %dst, "forked block index");
        Ok(())
    }

    // ---------------------------------------------------------------
    // State references
    // ---------------------------------------------------------------

    fn decode_stateref_key(chain: ChainId, key: &str) -> Option<(Address, BlockHash)> {
        let rest = key.strip_prefix(&stateref_prefix(chain))?;
        if rest.len() != Address::LEN * 2 + BlockHash::LEN * 2 {
            return None;
        }
        let (addr_hex, hash_hex) = rest.split_at(Address::LEN * 2);
        Some((Address::from_hex(addr_hex)?, BlockHash::from_hex(hash_hex)?))
    }

    pub fn iterate_state_references(
        &self,
        chain: ChainId,
        address: Address,
        highest_index: Option<i64>,
        lowest_index: Option<i64>,
        limit: Option<u64>,
    ) -> Result<Vec<(BlockHash, i64)>, EngineError> {
        let highest = highest_index.unwrap_or(i64::MAX);
        let lowest = lowest_index.unwrap_or(0);
        if highest < lowest {
            return Err(EngineError::argument("highestIndex must be >= lowestIndex"));
        }

        let addr_prefix = format!("{}{}", stateref_prefix(chain), address.to_hex());
        let mut matches: Vec<(BlockHash, i64)> = self
            .kv
            .prefix_scan(addr_prefix.as_bytes())?
            .into_iter()
            .filter_map(|(key, value)| {
                let key = String::from_utf8(key).ok()?;
                let (_, hash) = Self::decode_stateref_key(chain, &key)?;
                let block_index = i64::from_le_bytes(value.try_into().ok()?);
                Some((hash, block_index))
            })
            .filter(|(_, block_index)| *block_index >= lowest && *block_index <= highest)
            .collect();

        matches.sort_by(|a, b| b.1.cmp(&a.1));
        if let Some(limit) = limit {
            matches.truncate(limit as usize);
        }
        Ok(matches)
    }

    /// Inserts a StateRef for each address in `addresses` that does not
    /// already have a record for `(address, block_hash)`. The
    /// check-then-insert is racy under concurrent callers by design;
    /// callers must serialize state-ref writes per chain.
    pub fn store_state_reference(
        &mut self,
        chain: ChainId,
        addresses: &[Address],
        block_hash: BlockHash,
        block_index: i64,
    ) -> Result<(), EngineError> {
        for &address in addresses {
            let key = stateref_key(chain, address, block_hash);
            if !self.kv.exists(key.as_bytes())? {
                self.kv.put(key.as_bytes(), &block_index.to_le_bytes())?;
            }
        }
        Ok(())
    }

    /// Bulk-copies from `src` into `dst` every StateRef with
    /// `block_index <= branch_point_index`.
    pub fn fork_state_references(
        &mut self,
        src: ChainId,
        dst: ChainId,
        branch_point_index: i64,
    ) -> Result<(), EngineError> {
        let src_prefix = stateref_prefix(src);
        let mut ops = Vec::new();
        for (key, value) in self.kv.prefix_scan(src_prefix.as_bytes())? {
            let key = String::from_utf8(key).map_err(|_| EngineError::Serialization("bad stateref key".into()))?;
            let (address, block_hash) = Self::decode_stateref_key(src, &key)
                .ok_or_else(|| EngineError::Serialization("bad stateref key".into()))?;
            let block_index = i64::from_le_bytes(
                value.try_into().map_err(|_| EngineError::Serialization("bad stateref value".into()))?,
            );
            if block_index <= branch_point_index {
                ops.push(BatchOperation::put(
                    stateref_key(dst, address, block_hash),
                    block_index.to_le_bytes().to_vec(),
                ));
            }
        }
        if !ops.is_empty() {
            self.kv.atomic_batch_write(ops)?;
        }

        if self.kv.prefix_scan(stateref_prefix(dst).as_bytes())?.is_empty() && self.count_index(src)? == 0 {
            return Err(EngineError::argument("chain not found"));
        }
        tracing::debug!(src = %src, dst = %dst, branch_point_index, "forked state references");
        Ok(())
    }

    pub fn list_addresses(&self, chain: ChainId) -> Result<Vec<Address>, EngineError> {
        let prefix = stateref_prefix(chain);
        let mut addresses: Vec<Address> = self
            .kv
            .prefix_scan(prefix.as_bytes())?
            .into_iter()
            .filter_map(|(key, _)| {
                let key = String::from_utf8(key).ok()?;
                Self::decode_stateref_key(chain, &key).map(|(addr, _)| addr)
            })
            .collect();
        addresses.sort();
        addresses.dedup();
        Ok(addresses)
    }

    // ---------------------------------------------------------------
    // Nonces
    // ---------------------------------------------------------------

    pub fn get_tx_nonce(&self, chain: ChainId, address: Address) -> Result<i64, EngineError> {
        match self.kv.get(nonce_key(chain, address).as_bytes())? {
            Some(bytes) => Ok(i64::from_le_bytes(
                bytes.try_into().map_err(|_| EngineError::Serialization("bad nonce record".into()))?,
            )),
            None => Ok(0),
        }
    }

    /// Upserts `current + delta`. Not atomic under concurrent callers for
    /// the same `(chain, address)`.
    pub fn increase_tx_nonce(&mut self, chain: ChainId, signer: Address, delta: i64) -> Result<i64, EngineError> {
        let updated = self.get_tx_nonce(chain, signer)? + delta;
        self.kv.put(nonce_key(chain, signer).as_bytes(), &updated.to_le_bytes())?;
        Ok(updated)
    }

    pub fn list_tx_nonces(&self, chain: ChainId) -> Result<Vec<(Address, i64)>, EngineError> {
        let prefix = nonce_prefix(chain);
        let mut out = Vec::new();
        for (key, value) in self.kv.prefix_scan(prefix.as_bytes())? {
            let key = String::from_utf8(key).map_err(|_| EngineError::Serialization("bad nonce key".into()))?;
            let addr_hex = key.strip_prefix(&prefix).ok_or_else(|| EngineError::Serialization("bad nonce key".into()))?;
            let address = Address::from_hex(addr_hex).ok_or_else(|| EngineError::Serialization("bad nonce key".into()))?;
            let nonce = i64::from_le_bytes(value.try_into().map_err(|_| EngineError::Serialization("bad nonce value".into()))?);
            if nonce > 0 {
                out.push((address, nonce));
            }
        }
        Ok(out)
    }

    // ---------------------------------------------------------------
    // Staged transactions (process-wide, not per-chain)
    // ---------------------------------------------------------------

    pub fn stage_transaction_ids(&mut self, ids: &[TxId]) -> Result<(), EngineError> {
        for &id in ids {
            self.kv.put(staged_key(id).as_bytes(), &[])?;
        }
        Ok(())
    }

    pub fn unstage_transaction_ids(&mut self, ids: &[TxId]) -> Result<(), EngineError> {
        for &id in ids {
            self.kv.delete(staged_key(id).as_bytes())?;
        }
        Ok(())
    }

    pub fn iterate_staged_transaction_ids(&self) -> Result<Vec<TxId>, EngineError> {
        Ok(self
            .kv
            .prefix_scan(STAGED_PREFIX.as_bytes())?
            .into_iter()
            .filter_map(|(key, _)| {
                let key = String::from_utf8(key).ok()?;
                TxId::from_hex(key.strip_prefix(STAGED_PREFIX)?)
            })
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::kv_memory::InMemoryKvStore;

    macro_rules! collections_db {
        ($name:ident) => {
            let mut store = InMemoryKvStore::new();
            let mut $name = CollectionsDb::new(&mut store);
        };
    }

    fn chain(byte: u8) -> ChainId {
        ChainId([byte; 16])
    }

    fn hash(byte: u8) -> BlockHash {
        BlockHash([byte; 32])
    }

    #[test]
    fn append_then_read() {
        collections_db!(db);
        let c = chain(0);
        assert_eq!(db.append_index(c, hash(1)).unwrap(), 0);
        assert_eq!(db.append_index(c, hash(2)).unwrap(), 1);
        assert_eq!(db.count_index(c).unwrap(), 2);
        assert_eq!(db.index_block_hash(c, 0).unwrap(), Some(hash(1)));
        assert_eq!(db.index_block_hash(c, -1).unwrap(), Some(hash(2)));
        assert_eq!(db.index_block_hash(c, 2).unwrap(), None);
    }

    #[test]
    fn negative_index_wraps_modulo_count() {
        collections_db!(db);
        let c = chain(1);
        db.append_index(c, hash(1)).unwrap();
        db.append_index(c, hash(2)).unwrap();
        db.append_index(c, hash(3)).unwrap();
        for i in 0..3 {
            assert_eq!(
                db.index_block_hash(c, -1 - i).unwrap(),
                db.index_block_hash(c, db.count_index(c).unwrap() - 1 - i).unwrap()
            );
        }
    }

    #[test]
    fn delete_chain_removes_it_from_listing() {
        collections_db!(db);
        let c = chain(2);
        db.append_index(c, hash(1)).unwrap();
        assert!(db.list_chain_ids().unwrap().contains(&c));
        db.delete_chain_id(c).unwrap();
        assert!(!db.list_chain_ids().unwrap().contains(&c));
    }

    #[test]
    fn fork_block_indexes_copies_prefix_through_branch_point() {
        collections_db!(db);
        let src = chain(3);
        let dst = chain(4);
        let hashes = [hash(1), hash(2), hash(3), hash(4)];
        for h in hashes {
            db.append_index(src, h).unwrap();
        }
        db.fork_block_indexes(src, dst, hash(3)).unwrap();
        let forked = db.iterate_indexes(dst, 0, None).unwrap();
        assert_eq!(forked, vec![hash(1), hash(2), hash(3)]);
    }

    #[test]
    fn state_ref_range_validation_rejects_inverted_range() {
        collections_db!(db);
        let err = db
            .iterate_state_references(chain(5), Address([0; 20]), Some(5), Some(10), None)
            .unwrap_err();
        assert!(matches!(err, EngineError::Argument(_)));
    }

    #[test]
    fn state_refs_iterate_descending_within_range() {
        collections_db!(db);
        let c = chain(6);
        let a = Address([9; 20]);
        for (idx, h) in [(1, hash(10)), (3, hash(11)), (5, hash(12)), (7, hash(13))] {
            db.store_state_reference(c, &[a], h, idx).unwrap();
        }
        let refs = db.iterate_state_references(c, a, None, None, None).unwrap();
        let indices: Vec<i64> = refs.iter().map(|(_, i)| *i).collect();
        assert_eq!(indices, vec![7, 5, 3, 1]);
    }

    #[test]
    fn fork_state_references_copies_up_to_branch_point() {
        collections_db!(db);
        let src = chain(7);
        let dst = chain(8);
        let a = Address([1; 20]);
        db.append_index(src, hash(0)).unwrap(); // so the chain "exists"
        for (idx, h) in [(1, hash(21)), (3, hash(22)), (5, hash(23)), (7, hash(24))] {
            db.store_state_reference(src, &[a], h, idx).unwrap();
        }
        db.fork_state_references(src, dst, 4).unwrap();
        let refs = db.iterate_state_references(dst, a, None, None, None).unwrap();
        let indices: Vec<i64> = refs.iter().map(|(_, i)| *i).collect();
        assert_eq!(indices, vec![3, 1]);
    }

    #[test]
    fn fork_state_references_fails_when_source_chain_unknown() {
        collections_db!(db);
        let err = db.fork_state_references(chain(9), chain(10), 0).unwrap_err();
        assert!(matches!(err, EngineError::Argument(_)));
    }

    #[test]
    fn nonce_accumulates_across_calls() {
        collections_db!(db);
        let c = chain(11);
        let a = Address([2; 20]);
        assert_eq!(db.get_tx_nonce(c, a).unwrap(), 0);
        db.increase_tx_nonce(c, a, 1).unwrap();
        db.increase_tx_nonce(c, a, 4).unwrap();
        assert_eq!(db.get_tx_nonce(c, a).unwrap(), 5);
    }

    #[test]
    fn list_tx_nonces_excludes_zero() {
        collections_db!(db);
        let c = chain(12);
        let a1 = Address([1; 20]);
        let a2 = Address([2; 20]);
        db.increase_tx_nonce(c, a1, 1).unwrap();
        db.increase_tx_nonce(c, a2, 0).unwrap();
        assert_eq!(db.list_tx_nonces(c).unwrap(), vec![(a1, 1)]);
    }

    #[test]
    fn staged_tx_ids_dedupe() {
        collections_db!(db);
        let t = TxId([1; 32]);
        db.stage_transaction_ids(&[t, t]).unwrap();
        assert_eq!(db.iterate_staged_transaction_ids().unwrap(), vec![t]);
        db.unstage_transaction_ids(&[t]).unwrap();
        assert!(db.iterate_staged_transaction_ids().unwrap().is_empty());
    }

    #[test]
    fn canonical_pointer_round_trips() {
        collections_db!(db);
        assert_eq!(db.get_canonical_chain_id().unwrap(), None);
        let g = chain(13);
        db.set_canonical_chain_id(g).unwrap();
        assert_eq!(db.get_canonical_chain_id().unwrap(), Some(g));
        let g2 = chain(14);
        db.set_canonical_chain_id(g2).unwrap();
        assert_eq!(db.get_canonical_chain_id().unwrap(), Some(g2));
    }

    #[test]
    fn chain_isolation() {
        collections_db!(db);
        let c1 = chain(20);
        let c2 = chain(21);
        db.append_index(c1, hash(1)).unwrap();
        db.increase_tx_nonce(c1, Address([1; 20]), 3).unwrap();
        assert_eq!(db.count_index(c2).unwrap(), 0);
        assert_eq!(db.get_tx_nonce(c2, Address([1; 20])).unwrap(), 0);
        assert!(db.list_addresses(c2).unwrap().is_empty());
    }
}
