//! Snapshot export: package a prefix of the chain's history plus one context
//! commitment into a portable file.

use std::path::Path;

use anyhow::anyhow;
use archon_primitives::{BlockData, BlockHash, BlockHeader, Genesis, HistoryMode};
use archon_store::ChainStore;
use tracing::info;

use crate::{
	constants::STORE_DIR,
	context::{ContextIndex, ExportBlock},
	error::{SnapshotError, WrongBlockExportReason},
	pruned_blocks::PrunedBlockWalker,
};

/// Export a snapshot of the chain in `data_dir` to `filename`.
///
/// `block` selects the snapshot target; when absent the current checkpoint is
/// used. `export_rolling` bounds the exported history to the target's
/// operation TTL window instead of everything down to the caboose, and is
/// mandatory for nodes already running in Rolling mode.
///
/// The context index is expected to be open read-only on the same data dir.
pub async fn export<C: ContextIndex>(
	data_dir: &Path,
	context_index: &C,
	genesis: &Genesis,
	filename: &Path,
	block: Option<BlockHash>,
	export_rolling: bool,
) -> Result<(), SnapshotError> {
	let store = ChainStore::open_read_only(&data_dir.join(STORE_DIR))?;

	match store.history_mode()? {
		Some(HistoryMode::Rolling) if !export_rolling =>
			return Err(SnapshotError::WrongSnapshotExport {
				src: HistoryMode::Rolling,
				dst: HistoryMode::Full,
			}),
		_ => (),
	}

	let target_hash = match block {
		Some(hash) => hash,
		None => {
			let checkpoint = store
				.checkpoint()?
				.ok_or_else(|| anyhow!("The store has no checkpoint to export from"))?;
			if checkpoint.level == 0 {
				return Err(SnapshotError::WrongBlockExport {
					hash: genesis.block,
					reason: WrongBlockExportReason::TooFewPredecessors,
				});
			}
			let hash = checkpoint.hash();
			info!(
				"No block specified for the export, falling back to the current checkpoint \
				 {hash} (level {})",
				checkpoint.level
			);
			hash
		},
	};

	let target_header =
		store.block_header(&target_hash)?.ok_or(SnapshotError::WrongBlockExport {
			hash: target_hash,
			reason: WrongBlockExportReason::CannotBeFound,
		})?;
	let predecessor_header =
		store.block_header(&target_header.predecessor)?.ok_or(SnapshotError::WrongBlockExport {
			hash: target_header.predecessor,
			reason: WrongBlockExportReason::Pruned,
		})?;

	let operations =
		store.operations(&target_hash)?.into_iter().map(|(_, ops)| ops).collect::<Vec<_>>();
	if operations.len() != usize::from(target_header.validation_passes) {
		return Err(SnapshotError::WrongBlockExport {
			hash: target_hash,
			reason: WrongBlockExportReason::Pruned,
		});
	}

	let export_limit = compute_export_limit(&store, &target_header, &target_hash, export_rolling)?;
	info!(
		"Exporting a snapshot of block {target_hash} (level {}) down to level {export_limit}",
		target_header.level
	);

	let walker = PrunedBlockWalker::new(&store, context_index, export_limit);
	let block_data = BlockData { block_header: target_header, operations };
	context_index
		.dump_contexts(ExportBlock { predecessor_header, block_data }, walker, filename)
		.await
		.map_err(SnapshotError::from_collaborator)?;

	info!("Successful export: {}", filename.display());
	Ok(())
}

/// The lowest level included in the export.
///
/// A full export reaches down to the caboose (and never below level 1); a
/// rolling export keeps exactly the target's operation-TTL window, which
/// requires the target to have at least that many ancestors besides genesis.
fn compute_export_limit(
	store: &ChainStore,
	target_header: &BlockHeader,
	target_hash: &BlockHash,
	export_rolling: bool,
) -> Result<i32, SnapshotError> {
	let contents = store.contents(target_hash)?.ok_or(SnapshotError::WrongBlockExport {
		hash: *target_hash,
		reason: WrongBlockExportReason::Pruned,
	})?;

	if export_rolling {
		let limit = target_header.level - contents.max_operations_ttl;
		if limit <= 0 {
			return Err(SnapshotError::WrongBlockExport {
				hash: *target_hash,
				reason: WrongBlockExportReason::TooFewPredecessors,
			});
		}
		Ok(limit)
	} else {
		let caboose_level = store.caboose()?.map(|(level, _)| level).unwrap_or(0);
		Ok(std::cmp::max(1, caboose_level))
	}
}
