//! Backward walk over block history, emitting the pruned records a snapshot
//! carries.

use archon_primitives::{BlockHeader, ProtocolData, PrunedBlock};
use archon_store::ChainStore;
use async_trait::async_trait;

use crate::{
	context::{ContextIndex, HistoryWalk},
	error::{SnapshotError, WrongBlockExportReason},
};

/// Walks headers backward from the export target, one predecessor per step,
/// until the export limit is reached.
///
/// Driven by the context subsystem's dump routine, which feeds each produced
/// block's header back into [`HistoryWalk::step`].
pub struct PrunedBlockWalker<'a, C> {
	store: &'a ChainStore,
	context_index: &'a C,
	/// Lowest level included in the walk.
	export_limit: i32,
}

impl<'a, C: ContextIndex> PrunedBlockWalker<'a, C> {
	pub fn new(store: &'a ChainStore, context_index: &'a C, export_limit: i32) -> Self {
		PrunedBlockWalker { store, context_index, export_limit }
	}

	async fn protocol_data_for(&self, header: &BlockHeader) -> Result<ProtocolData, SnapshotError> {
		Ok(self.context_index.get_protocol_data_from_header(header).await?)
	}
}

#[async_trait]
impl<'a, C: ContextIndex> HistoryWalk for PrunedBlockWalker<'a, C> {
	async fn step(
		&mut self,
		header: &BlockHeader,
	) -> Result<(Option<PrunedBlock>, Option<ProtocolData>), SnapshotError> {
		if header.level <= self.export_limit {
			// Range boundary: no more pruned blocks, but hand the importer
			// the protocol data it needs to re-commit the oldest context.
			return Ok((None, Some(self.protocol_data_for(header).await?)));
		}

		let predecessor_hash = header.predecessor;
		let predecessor_header = self
			.store
			.block_header(&predecessor_hash)?
			.ok_or(SnapshotError::WrongBlockExport {
				hash: predecessor_hash,
				reason: WrongBlockExportReason::Pruned,
			})?;

		let operations = self.store.operations(&predecessor_hash)?;
		if operations.len() != usize::from(predecessor_header.validation_passes) {
			// Header survived but the block's body did not.
			return Err(SnapshotError::WrongBlockExport {
				hash: predecessor_hash,
				reason: WrongBlockExportReason::Pruned,
			});
		}
		let operation_hashes = self.store.operation_hashes(&predecessor_hash)?;

		// Pruned records carry their passes newest first.
		let pruned = PrunedBlock {
			block_header: predecessor_header.clone(),
			operations: operations.into_iter().rev().collect(),
			operation_hashes: operation_hashes.into_iter().rev().collect(),
		};

		let protocol_data = if header.proto_level != predecessor_header.proto_level {
			// A protocol transition sits between the predecessor and this
			// block; the importer must re-commit the new epoch's root.
			Some(self.protocol_data_for(header).await?)
		} else {
			None
		};

		Ok((Some(pruned), protocol_data))
	}
}
