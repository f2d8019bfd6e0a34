
use std::{collections::BTreeSet, path::Path};

use anyhow::Result;
use archon_primitives::{
	BlockHash, BlockHeader, ContextHash, HistoryMode, Operation, OperationHash, ProtocolHash,
};
use serde::{Deserialize, Serialize};

use crate::kv::{KvStore, KvWriteBatch};

/// Key-space prefixes inside the data column. All are [`crate::kv::PREFIX_SIZE`]
/// bytes long.
const HEADER_PREFIX: &[u8; 10] = b"header____";
const CONTENTS_PREFIX: &[u8; 10] = b"contents__";
const OPERATIONS_PREFIX: &[u8; 10] = b"operations";
const OPERATION_HASHES_PREFIX: &[u8; 10] = b"op_hashes_";
const OPERATIONS_METADATA_PREFIX: &[u8; 10] = b"op_meta___";
const PREDECESSORS_PREFIX: &[u8; 10] = b"preds_____";
const MAIN_BRANCH_PREFIX: &[u8; 10] = b"mainbranch";
const CHAIN_CELL_PREFIX: &[u8; 10] = b"chain_cell";
const PROTOCOL_PREFIX: &[u8; 10] = b"protocols_";

/// Named chain-wide cells, each holding a single value.
const CHECKPOINT_KEY: &[u8] = b"checkpoint";
const SAVE_POINT_KEY: &[u8] = b"save_point";
const CABOOSE_KEY: &[u8] = b"caboose";
const CURRENT_HEAD_KEY: &[u8] = b"current_head";
const KNOWN_HEADS_KEY: &[u8] = b"known_heads";
const HISTORY_MODE_KEY: &[u8] = b"history_mode";

/// Everything a node keeps for a block beyond its header and operations:
/// the validation outcome and the (opaque) application metadata. Pruned
/// blocks have no contents record.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredContents {
	pub message: Option<String>,
	pub max_operations_ttl: i32,
	pub last_allowed_fork_level: i32,
	pub context: ContextHash,
	pub forking_testchain: bool,
	pub metadata: Vec<u8>,
}

/// A level/hash pair, the shape of the save-point and caboose cells.
pub type BlockDescriptor = (i32, BlockHash);

/// Block store and chain-data cells of a single chain, backed by one
/// RocksDB database.
pub struct ChainStore {
	kv: KvStore,
}

impl ChainStore {
	/// Open the store read-write, creating it if missing. The genesis hash is
	/// pinned on first open and checked afterwards.
	pub fn open(path: &Path, genesis_hash: Option<BlockHash>) -> Result<Self> {
		Ok(ChainStore { kv: KvStore::open(path, genesis_hash)? })
	}

	/// Open an existing store without write access. Exports go through this.
	pub fn open_read_only(path: &Path) -> Result<Self> {
		Ok(ChainStore { kv: KvStore::open_read_only(path)? })
	}

	pub fn block_header(&self, hash: &BlockHash) -> Result<Option<BlockHeader>> {
		self.kv.get_value(HEADER_PREFIX, hash.as_bytes())
	}

	pub fn has_block_header(&self, hash: &BlockHash) -> Result<bool> {
		self.kv.contains(HEADER_PREFIX, hash.as_bytes())
	}

	pub fn contents(&self, hash: &BlockHash) -> Result<Option<StoredContents>> {
		self.kv.get_value(CONTENTS_PREFIX, hash.as_bytes())
	}

	/// Operations of a block keyed by validation pass, ascending.
	pub fn operations(&self, hash: &BlockHash) -> Result<Vec<(u8, Vec<Operation>)>> {
		self.collect_passes(OPERATIONS_PREFIX, hash)
	}

	/// Operation hashes of a block keyed by validation pass, ascending.
	pub fn operation_hashes(&self, hash: &BlockHash) -> Result<Vec<(u8, Vec<OperationHash>)>> {
		self.collect_passes(OPERATION_HASHES_PREFIX, hash)
	}

	/// Rank-indexed ancestor hash, following the stored skip-list.
	pub fn predecessor(&self, hash: &BlockHash, rank: u8) -> Result<Option<BlockHash>> {
		self.kv.get_value(PREDECESSORS_PREFIX, &pass_key(hash, rank))
	}

	pub fn predecessors(&self, hash: &BlockHash) -> Result<Vec<(u8, BlockHash)>> {
		self.collect_passes(PREDECESSORS_PREFIX, hash)
	}

	/// Successor of `hash` on the canonical chain, when known.
	pub fn main_branch_successor(&self, hash: &BlockHash) -> Result<Option<BlockHash>> {
		self.kv.get_value(MAIN_BRANCH_PREFIX, hash.as_bytes())
	}

	pub fn checkpoint(&self) -> Result<Option<BlockHeader>> {
		self.kv.get_value(CHAIN_CELL_PREFIX, CHECKPOINT_KEY)
	}

	pub fn save_point(&self) -> Result<Option<BlockDescriptor>> {
		self.kv.get_value(CHAIN_CELL_PREFIX, SAVE_POINT_KEY)
	}

	pub fn caboose(&self) -> Result<Option<BlockDescriptor>> {
		self.kv.get_value(CHAIN_CELL_PREFIX, CABOOSE_KEY)
	}

	pub fn current_head(&self) -> Result<Option<BlockHash>> {
		self.kv.get_value(CHAIN_CELL_PREFIX, CURRENT_HEAD_KEY)
	}

	pub fn known_heads(&self) -> Result<BTreeSet<BlockHash>> {
		Ok(self.kv.get_value(CHAIN_CELL_PREFIX, KNOWN_HEADS_KEY)?.unwrap_or_default())
	}

	pub fn history_mode(&self) -> Result<Option<HistoryMode>> {
		self.kv.get_value(CHAIN_CELL_PREFIX, HISTORY_MODE_KEY)
	}

	pub fn set_history_mode(&self, mode: HistoryMode) -> Result<()> {
		self.kv.put_value(CHAIN_CELL_PREFIX, HISTORY_MODE_KEY, &mode)
	}

	/// The protocol activated at a given protocol epoch.
	pub fn protocol(&self, proto_level: u8) -> Result<Option<ProtocolHash>> {
		self.kv.get_value(PROTOCOL_PREFIX, &[proto_level])
	}

	pub fn batch(&self) -> StoreBatch<'_> {
		StoreBatch { kv: self.kv.create_batch(), staged: 0 }
	}

	fn collect_passes<T: serde::de::DeserializeOwned>(
		&self,
		prefix: &[u8],
		hash: &BlockHash,
	) -> Result<Vec<(u8, T)>> {
		self.kv
			.get_values_for_prefix(prefix, hash.as_bytes())
			.map(|(key, value)| {
				debug_assert_eq!(key.len(), 1);
				Ok((key[0], value?))
			})
			.collect()
	}
}

/// Typed writes staged against a [`ChainStore`], committed atomically.
pub struct StoreBatch<'a> {
	kv: KvWriteBatch<'a>,
	staged: usize,
}

impl StoreBatch<'_> {
	pub fn put_block_header(&mut self, hash: &BlockHash, header: &BlockHeader) {
		self.put(HEADER_PREFIX, hash.as_bytes(), header);
	}

	pub fn put_contents(&mut self, hash: &BlockHash, contents: &StoredContents) {
		self.put(CONTENTS_PREFIX, hash.as_bytes(), contents);
	}

	pub fn put_operations(&mut self, hash: &BlockHash, pass: u8, operations: &[Operation]) {
		self.put(OPERATIONS_PREFIX, &pass_key(hash, pass), &operations);
	}

	pub fn put_operation_hashes(&mut self, hash: &BlockHash, pass: u8, hashes: &[OperationHash]) {
		self.put(OPERATION_HASHES_PREFIX, &pass_key(hash, pass), &hashes);
	}

	pub fn put_operations_metadata(&mut self, hash: &BlockHash, pass: u8, metadata: &[Vec<u8>]) {
		self.put(OPERATIONS_METADATA_PREFIX, &pass_key(hash, pass), &metadata);
	}

	pub fn put_predecessor(&mut self, hash: &BlockHash, rank: u8, ancestor: &BlockHash) {
		self.put(PREDECESSORS_PREFIX, &pass_key(hash, rank), ancestor);
	}

	pub fn put_main_branch_successor(&mut self, predecessor: &BlockHash, successor: &BlockHash) {
		self.put(MAIN_BRANCH_PREFIX, predecessor.as_bytes(), successor);
	}

	pub fn put_checkpoint(&mut self, checkpoint: &BlockHeader) {
		self.put(CHAIN_CELL_PREFIX, CHECKPOINT_KEY, checkpoint);
	}

	pub fn put_save_point(&mut self, save_point: &BlockDescriptor) {
		self.put(CHAIN_CELL_PREFIX, SAVE_POINT_KEY, save_point);
	}

	pub fn put_caboose(&mut self, caboose: &BlockDescriptor) {
		self.put(CHAIN_CELL_PREFIX, CABOOSE_KEY, caboose);
	}

	pub fn put_current_head(&mut self, head: &BlockHash) {
		self.put(CHAIN_CELL_PREFIX, CURRENT_HEAD_KEY, head);
	}

	pub fn put_known_heads(&mut self, heads: &BTreeSet<BlockHash>) {
		self.put(CHAIN_CELL_PREFIX, KNOWN_HEADS_KEY, heads);
	}

	pub fn put_history_mode(&mut self, mode: HistoryMode) {
		self.put(CHAIN_CELL_PREFIX, HISTORY_MODE_KEY, &mode);
	}

	pub fn put_protocol(&mut self, proto_level: u8, protocol: &ProtocolHash) {
		self.put(PROTOCOL_PREFIX, &[proto_level], protocol);
	}

	/// Number of values staged so far. Callers bounding transaction size
	/// decide when to commit based on this.
	pub fn staged(&self) -> usize {
		self.staged
	}

	pub fn commit(self) -> Result<()> {
		self.kv.write()
	}

	fn put<T: Serialize>(&mut self, prefix: &[u8], key: &[u8], value: &T) {
		self.kv.put_value(prefix, key, value);
		self.staged += 1;
	}
}

fn pass_key(hash: &BlockHash, index: u8) -> Vec<u8> {
	let mut key = Vec::with_capacity(BlockHash::LEN + 1);
	key.extend_from_slice(hash.as_bytes());
	key.push(index);
	key
}
