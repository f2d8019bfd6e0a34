//! Block headers, operations and the pruned history records carried inside
//! snapshots.

use serde::{Deserialize, Serialize};

use crate::hashes::{BlockHash, ContextHash, OperationHash, OperationListListHash};

/// The part of a block every node keeps, whatever its history mode.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlockHeader {
	/// 1 for the block directly after genesis; genesis itself is level 0.
	pub level: i32,
	/// Protocol epoch counter, bumped at every protocol transition.
	pub proto_level: u8,
	pub predecessor: BlockHash,
	/// Seconds since the Unix epoch.
	pub timestamp: i64,
	/// Number of operation lists committed by `operations_hash`.
	pub validation_passes: u8,
	pub operations_hash: OperationListListHash,
	/// Consensus ordering value, opaque to the storage layer.
	pub fitness: Vec<Vec<u8>>,
	/// Commitment to the state after this block was applied.
	pub context: ContextHash,
	/// Protocol-specific header payload, opaque to the storage layer.
	pub protocol_data: Vec<u8>,
}

impl BlockHeader {
	/// A block is identified by the hash of its serialized header.
	pub fn hash(&self) -> BlockHash {
		BlockHash::hash_bytes(
			&bincode::serialize(self).expect("Serialization is not expected to fail"),
		)
	}
}

/// A single operation: the branch it was made on plus an opaque
/// protocol-specific payload.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Operation {
	pub branch: BlockHash,
	pub data: Vec<u8>,
}

impl Operation {
	pub fn hash(&self) -> OperationHash {
		OperationHash::hash_bytes(
			&bincode::serialize(self).expect("Serialization is not expected to fail"),
		)
	}
}

/// A history entry without contents or metadata: header plus operations and
/// their hashes, keyed by validation pass.
///
/// Passes are carried newest first; consumers recomputing the header's
/// operations root must reverse them first.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PrunedBlock {
	pub block_header: BlockHeader,
	pub operations: Vec<(u8, Vec<Operation>)>,
	pub operation_hashes: Vec<(u8, Vec<OperationHash>)>,
}

/// The head block of a snapshot, carried with its full operations.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlockData {
	pub block_header: BlockHeader,
	/// Operations per validation pass, oldest pass first.
	pub operations: Vec<Vec<Operation>>,
}
