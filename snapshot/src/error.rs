use archon_primitives::{BlockHash, HistoryMode, OperationListListHash, ProtocolHash};

/// Why a block cannot serve as a snapshot export target.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WrongBlockExportReason {
	/// The block (or a required ancestor) has been pruned from the store.
	Pruned,
	/// The block does not have enough predecessors for the requested export.
	TooFewPredecessors,
	/// The block is not known at all.
	CannotBeFound,
}

impl std::fmt::Display for WrongBlockExportReason {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		match self {
			WrongBlockExportReason::Pruned => write!(f, "the block has been pruned"),
			WrongBlockExportReason::TooFewPredecessors =>
				write!(f, "the block does not have enough predecessors"),
			WrongBlockExportReason::CannotBeFound => write!(f, "the block cannot be found"),
		}
	}
}

/// Everything that can go wrong while exporting or importing a snapshot.
/// All of these are permanent; none is worth retrying without operator
/// intervention.
#[derive(thiserror::Error, Debug)]
pub enum SnapshotError {
	#[error(
		"The node's history mode ({src}) is not compatible with the requested \
		 {dst} snapshot export"
	)]
	WrongSnapshotExport { src: HistoryMode, dst: HistoryMode },

	#[error("Cannot export snapshot rooted at block {hash}: {reason}")]
	WrongBlockExport { hash: BlockHash, reason: WrongBlockExportReason },

	#[error("The imported block {got} is not the one expected ({expected})")]
	InconsistentImportedBlock { expected: BlockHash, got: BlockHash },

	#[error("Snapshot import failed: {0}")]
	SnapshotImportFailure(String),

	#[error("Context reconstruction is only possible from a Full snapshot")]
	WrongReconstructMode,

	#[error("Failed to validate and commit the protocol data for protocol {0}")]
	WrongProtocolHash(ProtocolHash),

	#[error(
		"Inconsistent operation hashes: computed {observed} where the block \
		 commits to {expected}"
	)]
	InconsistentOperationHashes { observed: OperationListListHash, expected: OperationListListHash },

	#[error(transparent)]
	Other(#[from] anyhow::Error),
}

impl SnapshotError {
	/// Recover a typed engine error that crossed an `anyhow` boundary. The
	/// collaborator contracts return `anyhow::Error`, but the history walker
	/// they drive fails with engine errors that callers match on.
	pub fn from_collaborator(error: anyhow::Error) -> Self {
		match error.downcast::<SnapshotError>() {
			Ok(error) => error,
			Err(error) => SnapshotError::Other(error),
		}
	}
}
