//! A validator that "re-executes" blocks by recomputing the toy context
//! commit the chain's builder produced, committing it as a side effect.

use std::sync::{Arc, Mutex};

use anyhow::{anyhow, ensure, Result};
use archon_primitives::{BlockHeader, ChainId, ContextHash, Operation};
use archon_snapshot::{ApplyOutcome, BlockValidator, ValidationResult};
use async_trait::async_trait;

use super::context::{block_commit_record, ContextStoreInner};

pub struct TestValidator {
	context: Arc<Mutex<ContextStoreInner>>,
	/// The TTL this chain runs with, echoed in every validation result.
	max_operations_ttl: i32,
}

impl TestValidator {
	pub fn new(context: Arc<Mutex<ContextStoreInner>>, max_operations_ttl: i32) -> Self {
		TestValidator { context, max_operations_ttl }
	}
}

#[async_trait]
impl BlockValidator<ContextHash> for TestValidator {
	async fn apply(
		&self,
		_chain_id: ChainId,
		_max_operations_ttl: i32,
		predecessor_header: &BlockHeader,
		predecessor_context: ContextHash,
		block_header: &BlockHeader,
		operations: &[Vec<Operation>],
	) -> Result<ApplyOutcome> {
		// The genesis block goes by its configured hash, which it also records
		// as its own predecessor.
		let expected_predecessor = if predecessor_header.level == 0 {
			predecessor_header.predecessor
		} else {
			predecessor_header.hash()
		};
		ensure!(
			block_header.predecessor == expected_predecessor,
			"block at level {} does not extend the given predecessor",
			block_header.level
		);
		ensure!(
			predecessor_context == predecessor_header.context,
			"checked-out context does not belong to the predecessor"
		);
		ensure!(
			operations.len() == usize::from(block_header.validation_passes),
			"expected {} validation passes, got {}",
			block_header.validation_passes,
			operations.len()
		);

		let mut inner = self.context.lock().unwrap();
		ensure!(
			inner.commits.contains_key(&predecessor_context),
			"predecessor context {predecessor_context} is not committed"
		);
		let protocol = *inner
			.protocols
			.get(&block_header.proto_level)
			.ok_or_else(|| anyhow!("no protocol for epoch {}", block_header.proto_level))?;

		let record = block_commit_record(
			predecessor_context,
			block_header.level,
			block_header.timestamp,
			block_header.operations_hash,
			protocol,
		);
		let context_hash = record.hash();
		inner.commits.insert(context_hash, record);

		let ops_metadata = operations
			.iter()
			.map(|pass| {
				pass.iter().map(|op| format!("applied {}", op.hash()).into_bytes()).collect()
			})
			.collect();

		Ok(ApplyOutcome {
			validation_result: ValidationResult {
				message: Some(format!("lvl {}", block_header.level)),
				max_operations_ttl: self.max_operations_ttl,
				last_allowed_fork_level: 0,
			},
			block_metadata: block_header.hash().to_vec(),
			ops_metadata,
			forking_testchain: false,
			context_hash,
		})
	}
}
