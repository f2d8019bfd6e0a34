//! Core data model for the Archon chain: content-derived hashes, block
//! headers, pruned history records and the history-mode/genesis descriptions
//! shared between the store and the snapshot engine.

pub mod block;
pub mod genesis;
pub mod hashes;
pub mod history_mode;
pub mod merkle;
pub mod protocol;

pub use block::{BlockData, BlockHeader, Operation, PrunedBlock};
pub use genesis::Genesis;
pub use hashes::{
	BlockHash, ChainId, ContextHash, OperationHash, OperationListHash, OperationListListHash,
	ProtocolHash,
};
pub use history_mode::HistoryMode;
pub use protocol::{CommitInfo, ProtocolData, TestChainStatus};
