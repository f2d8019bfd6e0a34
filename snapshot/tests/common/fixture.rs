//! Builds fully-populated source nodes: a store with a contiguous chain of
//! applied blocks, its context store and the validator driving both.

use std::path::{Path, PathBuf};

use archon_primitives::{
	BlockHash, BlockHeader, Genesis, HistoryMode, Operation, OperationListHash,
	OperationListListHash, ProtocolHash,
};
use archon_snapshot::{constants::STORE_DIR, BlockValidator as _, ContextIndex as _};
use archon_store::{ChainStore, StoredContents};
use tempfile::TempDir;

use super::{
	context::{block_commit_record, TestContextIndex},
	validator::TestValidator,
};

pub struct NodeFixture {
	pub dir: TempDir,
	pub genesis: Genesis,
	pub context: TestContextIndex,
	pub validator: TestValidator,
	/// Headers by level; index 0 is the genesis header.
	pub headers: Vec<BlockHeader>,
	/// Block hashes by level; index 0 is the configured genesis hash.
	pub hashes: Vec<BlockHash>,
	/// Protocols by epoch.
	pub protocols: Vec<ProtocolHash>,
}

impl NodeFixture {
	pub fn data_dir(&self) -> &Path {
		self.dir.path()
	}

	pub fn store_path(&self) -> PathBuf {
		self.dir.path().join(STORE_DIR)
	}

	pub fn hash(&self, level: i32) -> BlockHash {
		self.hashes[usize::try_from(level).unwrap()]
	}

	pub fn header(&self, level: i32) -> &BlockHeader {
		&self.headers[usize::try_from(level).unwrap()]
	}

	pub fn head_level(&self) -> i32 {
		(self.headers.len() - 1) as i32
	}

	/// Point the node's checkpoint cell at the given level.
	pub fn set_checkpoint(&self, level: i32) {
		let store = ChainStore::open(&self.store_path(), Some(self.genesis.block)).unwrap();
		let mut batch = store.batch();
		batch.put_checkpoint(self.header(level));
		batch.commit().unwrap();
	}

	pub fn operations_for(&self, level: i32) -> Vec<Vec<Operation>> {
		build_operations(&self.hashes[usize::try_from(level).unwrap() - 1], level)
	}
}

/// Deterministic per-level operations: two validation passes with a couple
/// of operations each.
fn build_operations(branch: &BlockHash, level: i32) -> Vec<Vec<Operation>> {
	(0u8..2)
		.map(|pass| {
			(0u8..=pass + 1)
				.map(|i| Operation {
					branch: *branch,
					data: [&level.to_be_bytes()[..], &[pass, i]].concat(),
				})
				.collect()
		})
		.collect()
}

fn operations_root(operations: &[Vec<Operation>]) -> OperationListListHash {
	OperationListListHash::compute(
		&operations
			.iter()
			.map(|pass| {
				OperationListHash::compute(&pass.iter().map(Operation::hash).collect::<Vec<_>>())
			})
			.collect::<Vec<_>>(),
	)
}

/// Build a node whose chain runs from genesis up to `levels`, applying every
/// block through the test validator. `transitions` lists the levels at which
/// a new protocol epoch starts. The node's checkpoint ends up at the head.
pub async fn build_chain(
	levels: i32,
	max_operations_ttl: i32,
	history_mode: HistoryMode,
	transitions: &[i32],
) -> NodeFixture {
	super::init_test_logging();

	let dir = TempDir::new().unwrap();
	let context = TestContextIndex::new();
	let validator = TestValidator::new(context.share(), max_operations_ttl);

	let genesis_block = BlockHash::hash_bytes(b"archon test chain genesis");
	let genesis = Genesis {
		chain_id: archon_primitives::ChainId::from_block_hash(&genesis_block),
		block: genesis_block,
		protocol: ProtocolHash::hash_bytes(b"protocol 0"),
	};

	let genesis_context = context.commit_genesis(&genesis).await.unwrap();
	let genesis_header = genesis.header(genesis_context);

	let store = ChainStore::open(&dir.path().join(STORE_DIR), Some(genesis.block)).unwrap();
	{
		let mut batch = store.batch();
		batch.put_block_header(&genesis.block, &genesis_header);
		batch.put_contents(
			&genesis.block,
			&StoredContents {
				message: None,
				max_operations_ttl: 0,
				last_allowed_fork_level: 0,
				context: genesis_context,
				forking_testchain: false,
				metadata: Vec::new(),
			},
		);
		batch.put_protocol(0, &genesis.protocol);
		batch.commit().unwrap();
	}

	let mut headers = vec![genesis_header];
	let mut hashes = vec![genesis.block];
	let mut protocols = vec![genesis.protocol];
	let mut proto_level = 0u8;

	for level in 1..=levels {
		if transitions.contains(&level) {
			proto_level += 1;
			let protocol =
				ProtocolHash::hash_bytes(format!("protocol {proto_level}").as_bytes());
			context.lock().protocols.insert(proto_level, protocol);
			protocols.push(protocol);
		}

		let predecessor_hash = hashes[level as usize - 1];
		let predecessor_header = headers[level as usize - 1].clone();
		let operations = build_operations(&predecessor_hash, level);
		let operations_hash = operations_root(&operations);
		let timestamp = 1_600_000_000 + i64::from(level) * 30;

		// The header commits to the context its own application will
		// produce, so compute that commit up front.
		let context_hash = block_commit_record(
			predecessor_header.context,
			level,
			timestamp,
			operations_hash,
			protocols[usize::from(proto_level)],
		)
		.hash();

		let header = BlockHeader {
			level,
			proto_level,
			predecessor: predecessor_hash,
			timestamp,
			validation_passes: 2,
			operations_hash,
			fitness: vec![vec![0x01], level.to_be_bytes().to_vec()],
			context: context_hash,
			protocol_data: Vec::new(),
		};

		let outcome = validator
			.apply(
				genesis.chain_id,
				max_operations_ttl,
				&predecessor_header,
				predecessor_header.context,
				&header,
				&operations,
			)
			.await
			.unwrap();
		assert_eq!(outcome.context_hash, context_hash, "fixture and validator disagree");

		let hash = header.hash();
		let mut batch = store.batch();
		batch.put_block_header(&hash, &header);
		for (pass, pass_operations) in operations.iter().enumerate() {
			let pass_hashes = pass_operations.iter().map(Operation::hash).collect::<Vec<_>>();
			batch.put_operations(&hash, pass as u8, pass_operations);
			batch.put_operation_hashes(&hash, pass as u8, &pass_hashes);
		}
		batch.put_contents(
			&hash,
			&StoredContents {
				message: outcome.validation_result.message.clone(),
				max_operations_ttl: outcome.validation_result.max_operations_ttl,
				last_allowed_fork_level: outcome.validation_result.last_allowed_fork_level,
				context: context_hash,
				forking_testchain: outcome.forking_testchain,
				metadata: outcome.block_metadata.clone(),
			},
		);
		if proto_level > 0 {
			batch.put_protocol(proto_level, &protocols[usize::from(proto_level)]);
		}
		batch.commit().unwrap();

		headers.push(header);
		hashes.push(hash);
	}

	let head_header = headers.last().unwrap().clone();
	let head_hash = *hashes.last().unwrap();
	let mut batch = store.batch();
	batch.put_checkpoint(&head_header);
	batch.put_save_point(&(0, genesis.block));
	batch.put_caboose(&(0, genesis.block));
	batch.put_current_head(&head_hash);
	batch.put_known_heads(&std::collections::BTreeSet::from([head_hash]));
	batch.put_history_mode(history_mode);
	batch.commit().unwrap();
	drop(store);

	NodeFixture { dir, genesis, context, validator, headers, hashes, protocols }
}
