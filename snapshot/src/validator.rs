//! Contract with the block validator: the component able to re-execute a
//! block against its predecessor's context.

use archon_primitives::{BlockHeader, ChainId, ContextHash, Operation};
use async_trait::async_trait;

/// Validation outcome persisted with a block's contents.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ValidationResult {
	pub message: Option<String>,
	pub max_operations_ttl: i32,
	pub last_allowed_fork_level: i32,
}

/// Everything a successful block application produces.
#[derive(Clone, Debug)]
pub struct ApplyOutcome {
	pub validation_result: ValidationResult,
	/// Opaque protocol-produced block metadata.
	pub block_metadata: Vec<u8>,
	/// Opaque per-operation metadata, outer index is the validation pass.
	pub ops_metadata: Vec<Vec<Vec<u8>>>,
	pub forking_testchain: bool,
	/// Commitment to the state after applying the block. Committed to the
	/// context index as a side effect of the application.
	pub context_hash: ContextHash,
}

#[async_trait]
pub trait BlockValidator<Context>: Send + Sync {
	/// Apply `block_header` with `operations` (oldest pass first) on top of
	/// `predecessor_context`.
	#[allow(clippy::too_many_arguments)]
	async fn apply(
		&self,
		chain_id: ChainId,
		max_operations_ttl: i32,
		predecessor_header: &BlockHeader,
		predecessor_context: Context,
		block_header: &BlockHeader,
		operations: &[Vec<Operation>],
	) -> anyhow::Result<ApplyOutcome>;
}
