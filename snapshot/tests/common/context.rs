//! In-memory context subsystem: a content-addressed store of toy context
//! commits, plus the snapshot file codec that the real subsystem would own.

use std::{
	collections::BTreeMap,
	path::Path,
	sync::{Arc, Mutex, MutexGuard},
};

use anyhow::{anyhow, bail, Context as _, Result};
use archon_primitives::{
	BlockData, BlockHeader, CommitInfo, ContextHash, Genesis, OperationListListHash, ProtocolData,
	ProtocolHash, PrunedBlock, TestChainStatus,
};
use archon_snapshot::{ContextIndex, ExportBlock, HistoryWalk, PatchContext, RestoredSnapshot};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

const SNAPSHOT_MAGIC: &[u8; 10] = b"ARCHONSNAP";
const SNAPSHOT_VERSION: u32 = 1;

/// One commit in the toy context store. The commit's hash is the hash of its
/// serialized form, so any field change changes the commitment.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommitRecord {
	pub parents: Vec<ContextHash>,
	pub data_key: ContextHash,
	pub author: String,
	pub message: String,
	pub timestamp: i64,
	pub test_chain: TestChainStatus,
	pub protocol: ProtocolHash,
}

impl CommitRecord {
	pub fn hash(&self) -> ContextHash {
		ContextHash::hash_bytes(&bincode::serialize(self).unwrap())
	}
}

/// The state-tree key a block application commits under: derived from the
/// parent commit and the block's level and operations root, so it never
/// depends on the (context-containing) block hash.
pub fn tree_key(
	parent: &ContextHash,
	level: i32,
	operations_root: &OperationListListHash,
) -> ContextHash {
	ContextHash::hash_bytes(
		&[
			b"tree".as_slice(),
			parent.as_bytes(),
			&level.to_be_bytes(),
			operations_root.as_bytes(),
		]
		.concat(),
	)
}

/// The commit a block application produces. Shared between the validator
/// (which performs it) and the fixture builder (which pre-computes header
/// context fields with it).
pub fn block_commit_record(
	parent: ContextHash,
	level: i32,
	timestamp: i64,
	operations_root: OperationListListHash,
	protocol: ProtocolHash,
) -> CommitRecord {
	CommitRecord {
		data_key: tree_key(&parent, level, &operations_root),
		parents: vec![parent],
		author: "archon-node".to_string(),
		message: format!("lvl {level}"),
		timestamp,
		test_chain: TestChainStatus::NotRunning,
		protocol,
	}
}

#[derive(Default)]
pub struct ContextStoreInner {
	pub commits: BTreeMap<ContextHash, CommitRecord>,
	/// Protocol registry: epoch -> protocol running it.
	pub protocols: BTreeMap<u8, ProtocolHash>,
}

/// An open handle on the in-memory context store.
#[derive(Clone, Default)]
pub struct TestContextIndex {
	inner: Arc<Mutex<ContextStoreInner>>,
}

impl TestContextIndex {
	pub fn new() -> Self {
		Self::default()
	}

	pub fn lock(&self) -> MutexGuard<'_, ContextStoreInner> {
		self.inner.lock().unwrap()
	}

	pub fn share(&self) -> Arc<Mutex<ContextStoreInner>> {
		self.inner.clone()
	}

	pub fn has_context(&self, hash: &ContextHash) -> bool {
		self.lock().commits.contains_key(hash)
	}

	pub fn context_count(&self) -> usize {
		self.lock().commits.len()
	}
}

/// On-disk layout of a snapshot file, owned by this subsystem. The engine
/// never looks inside.
#[derive(Serialize, Deserialize)]
pub struct SnapshotFile {
	/// Context commits the importer needs before any re-application: the
	/// target's and its predecessor's.
	pub commits: BTreeMap<ContextHash, CommitRecord>,
	pub protocols: BTreeMap<u8, ProtocolHash>,
	pub snapshots: Vec<WireSnapshot>,
}

#[derive(Serialize, Deserialize)]
pub struct WireSnapshot {
	pub predecessor_header: BlockHeader,
	pub block_data: BlockData,
	/// Newest first on the wire.
	pub old_blocks: Vec<PrunedBlock>,
	pub protocol_data: Vec<(i32, ProtocolData)>,
}

pub fn read_snapshot_file(path: &Path) -> Result<SnapshotFile> {
	let bytes = std::fs::read(path).context("Failed to read snapshot file")?;
	let Some(payload) = bytes.strip_prefix(SNAPSHOT_MAGIC.as_slice()) else {
		bail!("Not a snapshot file: bad magic");
	};
	let (version, payload) = payload.split_at(4);
	if u32::from_be_bytes(version.try_into().unwrap()) != SNAPSHOT_VERSION {
		bail!("Unsupported snapshot version");
	}
	bincode::deserialize(payload).context("Corrupt snapshot payload")
}

/// Write the file next to its final location, then rename it into place, so
/// a torn write never leaves a valid-looking snapshot behind.
pub fn write_snapshot_file(path: &Path, file: &SnapshotFile) -> Result<()> {
	let mut bytes = SNAPSHOT_MAGIC.to_vec();
	bytes.extend_from_slice(&SNAPSHOT_VERSION.to_be_bytes());
	bytes.extend_from_slice(&bincode::serialize(file)?);

	let tmp = path.with_extension("tmp");
	std::fs::write(&tmp, bytes).context("Failed to write snapshot file")?;
	std::fs::rename(&tmp, path).context("Failed to move snapshot file into place")?;
	Ok(())
}

#[async_trait]
impl ContextIndex for TestContextIndex {
	type Context = ContextHash;

	async fn checkout(&self, context_hash: &ContextHash) -> Result<Self::Context> {
		if self.lock().commits.contains_key(context_hash) {
			Ok(*context_hash)
		} else {
			Err(anyhow!("Unknown context {context_hash}"))
		}
	}

	async fn commit_genesis(&self, genesis: &Genesis) -> Result<ContextHash> {
		let record = CommitRecord {
			parents: Vec::new(),
			data_key: ContextHash::hash_bytes(
				&[b"genesis-tree".as_slice(), genesis.block.as_bytes()].concat(),
			),
			author: "archon-node".to_string(),
			message: "Genesis".to_string(),
			timestamp: 0,
			test_chain: TestChainStatus::NotRunning,
			protocol: genesis.protocol,
		};
		let hash = record.hash();
		let mut inner = self.lock();
		inner.commits.insert(hash, record);
		inner.protocols.insert(0, genesis.protocol);
		Ok(hash)
	}

	async fn get_protocol_data_from_header(&self, header: &BlockHeader) -> Result<ProtocolData> {
		let inner = self.lock();
		let record = inner
			.commits
			.get(&header.context)
			.ok_or_else(|| anyhow!("No commit for context {}", header.context))?;
		Ok(ProtocolData {
			info: CommitInfo {
				author: record.author.clone(),
				message: record.message.clone(),
				timestamp: record.timestamp,
			},
			test_chain_status: record.test_chain.clone(),
			data_key: record.data_key,
			parents: record.parents.clone(),
			protocol_hash: record.protocol,
			protocol_level: header.proto_level,
		})
	}

	async fn validate_context_hash_consistency_and_commit(
		&self,
		protocol_data: &ProtocolData,
		expected_context_hash: &ContextHash,
	) -> Result<bool> {
		let record = CommitRecord {
			parents: protocol_data.parents.clone(),
			data_key: protocol_data.data_key,
			author: protocol_data.info.author.clone(),
			message: protocol_data.info.message.clone(),
			timestamp: protocol_data.info.timestamp,
			test_chain: protocol_data.test_chain_status.clone(),
			protocol: protocol_data.protocol_hash,
		};
		if record.hash() != *expected_context_hash {
			return Ok(false);
		}
		let mut inner = self.lock();
		inner.commits.insert(*expected_context_hash, record);
		inner.protocols.insert(protocol_data.protocol_level, protocol_data.protocol_hash);
		Ok(true)
	}

	async fn dump_contexts<W: HistoryWalk + Send>(
		&self,
		export_block: ExportBlock,
		mut walker: W,
		filename: &Path,
	) -> Result<()> {
		let ExportBlock { predecessor_header, block_data } = export_block;

		// Drain the walker: newest first, exactly the wire layout.
		let mut old_blocks = Vec::new();
		let mut protocol_data = Vec::new();
		let mut header = block_data.block_header.clone();
		loop {
			let (pruned, data) = walker.step(&header).await?;
			if let Some(data) = data {
				protocol_data.push((header.level, data));
			}
			match pruned {
				Some(pruned) => {
					header = pruned.block_header.clone();
					old_blocks.push(pruned);
				},
				None => break,
			}
		}

		let commits = {
			let inner = self.lock();
			[&predecessor_header.context, &block_data.block_header.context]
				.into_iter()
				.map(|hash| {
					inner
						.commits
						.get(hash)
						.map(|record| (*hash, record.clone()))
						.ok_or_else(|| anyhow!("Cannot dump unknown context {hash}"))
				})
				.collect::<Result<BTreeMap<_, _>>>()?
		};

		write_snapshot_file(
			filename,
			&SnapshotFile {
				commits,
				protocols: self.lock().protocols.clone(),
				snapshots: vec![WireSnapshot {
					predecessor_header,
					block_data,
					old_blocks,
					protocol_data,
				}],
			},
		)
	}

	async fn restore_contexts(
		&self,
		filename: &Path,
		patch_context: Option<&PatchContext<Self::Context>>,
	) -> Result<Vec<RestoredSnapshot>> {
		if patch_context.is_some() {
			bail!("The in-memory context store does not support context patching");
		}

		let file = read_snapshot_file(filename)?;
		{
			let mut inner = self.lock();
			inner.commits.extend(file.commits);
			inner.protocols.extend(file.protocols);
		}

		Ok(file
			.snapshots
			.into_iter()
			.map(|snapshot| RestoredSnapshot {
				predecessor_header: snapshot.predecessor_header,
				block_data: snapshot.block_data,
				old_blocks: snapshot.old_blocks,
				protocol_data: snapshot.protocol_data,
			})
			.collect())
	}
}

/// A fresh context index plus a validator wired to it, i.e. a new node's
/// context subsystem.
pub fn fresh_context_and_validator(
	max_operations_ttl: i32,
) -> (TestContextIndex, super::validator::TestValidator) {
	let context = TestContextIndex::new();
	let validator = super::validator::TestValidator::new(context.share(), max_operations_ttl);
	(context, validator)
}
