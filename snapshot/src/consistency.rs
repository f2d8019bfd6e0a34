//! Cross-checks tying a snapshot's pruned history together: operation
//! Merkle roots against headers, and predecessor links between consecutive
//! blocks.

use archon_primitives::{
	BlockHash, BlockHeader, Genesis, Operation, OperationListHash, OperationListListHash,
	PrunedBlock,
};
use itertools::Itertools;
use tracing::info;

use crate::{constants::PROGRESS_INTERVAL, error::SnapshotError};

/// Verify that a pruned block's operations, recorded operation hashes and
/// header-committed Merkle root all agree.
pub fn check_operations_consistency(pruned: &PrunedBlock) -> Result<(), SnapshotError> {
	let mut recomputed_roots = Vec::with_capacity(pruned.operations.len());
	let mut recorded_roots = Vec::with_capacity(pruned.operation_hashes.len());

	for ((ops_pass, operations), (hashes_pass, recorded_hashes)) in
		pruned.operations.iter().zip_eq(pruned.operation_hashes.iter())
	{
		// A pass mismatch between the two sequences is not snapshot
		// corruption but a malformed record; fail hard.
		assert_eq!(
			ops_pass, hashes_pass,
			"pruned block carries misaligned validation passes"
		);

		let recomputed = operations.iter().map(Operation::hash).collect::<Vec<_>>();
		recomputed_roots.push(OperationListHash::compute(&recomputed));
		recorded_roots.push(OperationListHash::compute(recorded_hashes));
	}

	// Passes are stored newest first; the Merkle tree is defined oldest
	// first.
	recomputed_roots.reverse();
	recorded_roots.reverse();

	let observed = OperationListListHash::compute(&recomputed_roots);
	let recorded = OperationListListHash::compute(&recorded_roots);

	// An operation (or its recorded hash) was tampered with.
	if observed != recorded {
		return Err(SnapshotError::InconsistentOperationHashes { observed, expected: recorded });
	}
	// Operations and hashes agree with each other but not with the header.
	if observed != pruned.block_header.operations_hash {
		return Err(SnapshotError::InconsistentOperationHashes {
			observed,
			expected: pruned.block_header.operations_hash,
		});
	}

	Ok(())
}

/// Verify a whole restored history (oldest first, tagged with header hashes)
/// against the head it claims to lead up to.
pub fn check_history_consistency(
	genesis: &Genesis,
	head_header: &BlockHeader,
	history: &[(BlockHash, PrunedBlock)],
) -> Result<(), SnapshotError> {
	let (last_hash, _) = history.last().ok_or_else(|| {
		SnapshotError::SnapshotImportFailure("Snapshot carries an empty history".to_string())
	})?;
	if head_header.predecessor != *last_hash {
		return Err(SnapshotError::SnapshotImportFailure(
			"The imported block is not a direct successor of the snapshot history".to_string(),
		));
	}

	let (oldest_hash, oldest) = &history[0];
	if oldest.block_header.level < 1 {
		return Err(SnapshotError::SnapshotImportFailure(format!(
			"The snapshot history starts below level 1 (at level {})",
			oldest.block_header.level
		)));
	}
	if oldest.block_header.level == 1 && oldest.block_header.predecessor != genesis.block {
		return Err(SnapshotError::SnapshotImportFailure(format!(
			"The snapshot history starts at level 1 but block {oldest_hash} does not descend \
			 from the genesis block"
		)));
	}
	check_operations_consistency(oldest)?;

	for i in (1..history.len()).rev() {
		let (_, pruned) = &history[i];
		check_operations_consistency(pruned)?;
		if pruned.block_header.level < 2 {
			return Err(SnapshotError::SnapshotImportFailure(format!(
				"Unexpected level {} inside the snapshot history",
				pruned.block_header.level
			)));
		}
		if pruned.block_header.predecessor != history[i - 1].0 {
			return Err(SnapshotError::SnapshotImportFailure(format!(
				"Inconsistent predecessor link at level {}",
				pruned.block_header.level
			)));
		}
		if (history.len() - i) % PROGRESS_INTERVAL == 0 {
			info!("Checked the consistency of {} of {} blocks", history.len() - i, history.len());
		}
	}

	Ok(())
}
