//! Contract with the context subsystem: the content-addressed state store
//! that owns the snapshot file format.
//!
//! The engine never inspects snapshot files itself. Export hands the context
//! subsystem a [`HistoryWalk`] to drain into the file; import receives the
//! restored payload back as [`RestoredSnapshot`] values.

use std::path::Path;

use anyhow::Result;
use archon_primitives::{
	BlockData, BlockHeader, ContextHash, Genesis, ProtocolData, PrunedBlock,
};
use async_trait::async_trait;

use crate::error::SnapshotError;

/// Pull-based producer of the pruned history behind a snapshot target.
///
/// The consumer feeds back the header of the last produced block until the
/// walk signals termination by returning no pruned block; the protocol data
/// returned alongside lets the importer re-commit protocol epoch roots.
#[async_trait]
pub trait HistoryWalk {
	async fn step(
		&mut self,
		header: &BlockHeader,
	) -> Result<(Option<PrunedBlock>, Option<ProtocolData>), SnapshotError>;
}

/// The head of a snapshot as handed to `dump_contexts`: the target block with
/// its full operations, plus its predecessor's header.
#[derive(Clone, Debug)]
pub struct ExportBlock {
	pub predecessor_header: BlockHeader,
	pub block_data: BlockData,
}

/// One restored snapshot payload, as produced by `restore_contexts`.
#[derive(Clone, Debug)]
pub struct RestoredSnapshot {
	pub predecessor_header: BlockHeader,
	pub block_data: BlockData,
	/// Pruned history as laid out on the wire: newest block first. Consumers
	/// indexing oldest to newest must reverse first.
	pub old_blocks: Vec<PrunedBlock>,
	/// Protocol-transition commits, each tagged with the level of the block
	/// whose walk step emitted it.
	pub protocol_data: Vec<(i32, ProtocolData)>,
}

/// Caller-supplied hook rewriting a checked-out context before use, e.g. to
/// patch a sandbox genesis.
pub type PatchContext<C> = dyn Fn(C) -> Result<C> + Send + Sync;

/// The context subsystem: a content-addressed Merkle store with dump/restore
/// primitives. Opening and closing the index is the node wiring's business;
/// the engine borrows an already-open index.
#[async_trait]
pub trait ContextIndex: Send + Sync {
	/// Handle on one checked-out state tree.
	type Context: Send + Sync;

	/// Check out the state tree committed to by `context_hash`. Fails if the
	/// commit is unknown.
	async fn checkout(&self, context_hash: &ContextHash) -> Result<Self::Context>;

	/// Commit the genesis context and return its hash.
	async fn commit_genesis(&self, genesis: &Genesis) -> Result<ContextHash>;

	/// The protocol commit data recorded for the context a header commits to.
	async fn get_protocol_data_from_header(&self, header: &BlockHeader) -> Result<ProtocolData>;

	/// Rebuild the context commit described by `protocol_data` and check it
	/// hashes to `expected_context_hash`; commit it on success. Returns
	/// whether the commit was consistent.
	async fn validate_context_hash_consistency_and_commit(
		&self,
		protocol_data: &ProtocolData,
		expected_context_hash: &ContextHash,
	) -> Result<bool>;

	/// Write a snapshot file: the export head plus everything `walker`
	/// produces, in the subsystem's own wire format. The file must only
	/// appear at `filename` once it is complete.
	async fn dump_contexts<W: HistoryWalk + Send>(
		&self,
		export_block: ExportBlock,
		walker: W,
		filename: &Path,
	) -> Result<()>;

	/// Read a snapshot file back, restoring the contexts it carries into the
	/// index and returning the block payloads.
	async fn restore_contexts(
		&self,
		filename: &Path,
		patch_context: Option<&PatchContext<Self::Context>>,
	) -> Result<Vec<RestoredSnapshot>>;
}
