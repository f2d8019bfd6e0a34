//! Protocol-transition data carried inside snapshots.

use serde::{Deserialize, Serialize};

use crate::hashes::{BlockHash, ChainId, ContextHash, ProtocolHash};

/// Authorship metadata of a context commit.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommitInfo {
	pub author: String,
	pub message: String,
	/// Seconds since the Unix epoch.
	pub timestamp: i64,
}

/// Test-chain lifecycle recorded alongside a context commit.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum TestChainStatus {
	NotRunning,
	Forking { protocol: ProtocolHash, expiration: i64 },
	Running { chain_id: ChainId, genesis: BlockHash, protocol: ProtocolHash, expiration: i64 },
}

/// Everything needed to re-commit a protocol epoch root in a restored
/// context: the commit metadata, the epoch's data key and parent commits,
/// and the protocol the epoch runs.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProtocolData {
	pub info: CommitInfo,
	pub test_chain_status: TestChainStatus,
	pub data_key: ContextHash,
	pub parents: Vec<ContextHash>,
	pub protocol_hash: ProtocolHash,
	pub protocol_level: u8,
}
