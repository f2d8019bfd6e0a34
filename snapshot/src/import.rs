//! Snapshot import: rehydrate a snapshot file into a fresh node's block
//! store and context database, optionally re-executing the whole history to
//! reconstruct every context.

use std::{collections::BTreeSet, path::Path};

use anyhow::{anyhow, Context as _};
use archon_primitives::{BlockData, BlockHash, Genesis, HistoryMode, Operation, PrunedBlock};
use archon_store::{ChainStore, StoredContents};
use itertools::Itertools;
use tracing::{debug, info};

use crate::{
	constants::{BULK_STORE_COMMIT_BOUND, PROGRESS_INTERVAL, RECONSTRUCTION_COMMIT_BOUND, STORE_DIR},
	consistency::check_history_consistency,
	context::{ContextIndex, PatchContext, RestoredSnapshot},
	error::SnapshotError,
	predecessors::build_predecessor_tables,
	validator::{ApplyOutcome, BlockValidator},
};

/// Import the snapshot at `filename` into `data_dir`.
///
/// The data dir must be empty: the importer owns it for the duration of the
/// import and `dir_cleaner` is invoked on it to wipe partial state whenever
/// the import fails or panics. `block`, when given, pins the expected
/// snapshot head. `reconstruct` re-applies every block from genesis to
/// rebuild all historical contexts, which is only possible for Full
/// snapshots.
#[allow(clippy::too_many_arguments)]
pub async fn import<C, V>(
	data_dir: &Path,
	dir_cleaner: impl FnOnce(&Path),
	context_index: &C,
	validator: &V,
	patch_context: Option<&PatchContext<C::Context>>,
	genesis: &Genesis,
	filename: &Path,
	block: Option<BlockHash>,
	reconstruct: bool,
) -> Result<(), SnapshotError>
where
	C: ContextIndex,
	V: BlockValidator<C::Context>,
{
	// The cleaner must never touch a directory the importer does not own, so
	// the empty-dir precondition is checked before it is armed.
	let preexisting_entries = match std::fs::read_dir(data_dir) {
		Ok(mut entries) => entries.next().is_some(),
		Err(error) if error.kind() == std::io::ErrorKind::NotFound => false,
		Err(error) =>
			return Err(anyhow::Error::from(error)
				.context(format!("Failed to inspect data dir {}", data_dir.display()))
				.into()),
	};
	assert!(
		!preexisting_entries,
		"snapshot import requires an empty data directory, but {} is not",
		data_dir.display()
	);

	let cleaner = scopeguard::guard(dir_cleaner, |dir_cleaner| dir_cleaner(data_dir));

	let result =
		import_inner(data_dir, context_index, validator, patch_context, genesis, filename, block, reconstruct)
			.await;

	if result.is_ok() {
		// Defuse: the cleaner only runs on failure (or unwinding).
		let _ = scopeguard::ScopeGuard::into_inner(cleaner);
	}
	result
}

#[allow(clippy::too_many_arguments)]
async fn import_inner<C, V>(
	data_dir: &Path,
	context_index: &C,
	validator: &V,
	patch_context: Option<&PatchContext<C::Context>>,
	genesis: &Genesis,
	filename: &Path,
	block: Option<BlockHash>,
	reconstruct: bool,
) -> Result<(), SnapshotError>
where
	C: ContextIndex,
	V: BlockValidator<C::Context>,
{
	std::fs::create_dir_all(data_dir)
		.with_context(|| format!("Failed to create data dir {}", data_dir.display()))?;
	let store = ChainStore::open(&data_dir.join(STORE_DIR), Some(genesis.block))?;
	initialize_chain_state(&store, context_index, genesis).await?;

	let restored = context_index
		.restore_contexts(filename, patch_context)
		.await
		.map_err(SnapshotError::from_collaborator)?;

	for snapshot in restored {
		import_restored_snapshot(
			&store,
			context_index,
			validator,
			genesis,
			block,
			reconstruct,
			snapshot,
		)
		.await?;
	}

	info!("Successful import from file {}", filename.display());
	Ok(())
}

/// Seed a fresh store with the genesis block and chain-data cells. The
/// history mode starts as a Rolling placeholder and is corrected once the
/// snapshot's actual shape is known.
async fn initialize_chain_state<C: ContextIndex>(
	store: &ChainStore,
	context_index: &C,
	genesis: &Genesis,
) -> Result<(), SnapshotError> {
	let genesis_context = context_index.commit_genesis(genesis).await?;
	let genesis_header = genesis.header(genesis_context);

	let mut batch = store.batch();
	batch.put_block_header(&genesis.block, &genesis_header);
	batch.put_contents(
		&genesis.block,
		&StoredContents {
			message: None,
			max_operations_ttl: 0,
			last_allowed_fork_level: 0,
			context: genesis_context,
			forking_testchain: false,
			metadata: Vec::new(),
		},
	);
	batch.put_checkpoint(&genesis_header);
	batch.put_save_point(&(0, genesis.block));
	batch.put_caboose(&(0, genesis.block));
	batch.put_current_head(&genesis.block);
	batch.put_known_heads(&BTreeSet::from([genesis.block]));
	batch.put_history_mode(HistoryMode::Rolling);
	batch.put_protocol(0, &genesis.protocol);
	batch.commit()?;
	Ok(())
}

async fn import_restored_snapshot<C, V>(
	store: &ChainStore,
	context_index: &C,
	validator: &V,
	genesis: &Genesis,
	expected_block: Option<BlockHash>,
	reconstruct: bool,
	snapshot: RestoredSnapshot,
) -> Result<(), SnapshotError>
where
	C: ContextIndex,
	V: BlockValidator<C::Context>,
{
	let RestoredSnapshot { predecessor_header, block_data, old_blocks, protocol_data } = snapshot;

	let block_hash = block_data.block_header.hash();
	match expected_block {
		Some(expected) if expected != block_hash =>
			return Err(SnapshotError::InconsistentImportedBlock { expected, got: block_hash }),
		Some(_) => (),
		None => info!(
			"You may want to check that {block_hash} is the block you expected to import \
			 (pin it with the expected-block argument)"
		),
	}

	// Guaranteed by the empty-data-dir precondition.
	assert!(
		!store.has_block_header(&block_hash)?,
		"block {block_hash} is already present in a freshly-initialized store"
	);

	info!("Importing block {block_hash} (level {})", block_data.block_header.level);

	let predecessor_context = context_index.checkout(&predecessor_header.context).await?;
	// The predecessor's level stands in for its operation TTL here: the TTL
	// can never exceed the level, so it is a safe (if surprising) upper
	// bound, and it is what the snapshot's producer recorded.
	let outcome = validator
		.apply(
			genesis.chain_id,
			predecessor_header.level,
			&predecessor_header,
			predecessor_context,
			&block_data.block_header,
			&block_data.operations,
		)
		.await
		.context("Failed to re-apply the imported block")?;

	if outcome.context_hash != block_data.block_header.context {
		return Err(SnapshotError::SnapshotImportFailure(
			"Resulting context hash does not match".to_string(),
		));
	}

	// The wire layout is newest first; the history array is oldest first.
	let history = old_blocks
		.into_iter()
		.rev()
		.map(|pruned| (pruned.block_header.hash(), pruned))
		.collect::<Vec<_>>();

	check_history_consistency(genesis, &block_data.block_header, &history)?;

	let oldest_level = history[0].1.block_header.level;
	if oldest_level == 1 {
		// The snapshot reaches the block right after genesis: this node can
		// serve the whole chain, i.e. it is a Full node.
		store.set_history_mode(HistoryMode::Full)?;
	}

	import_protocol_data(store, context_index, &block_data, &history, &protocol_data).await?;

	// Skip-lists for the whole history plus the head that extends it.
	let mut chain_hashes = history.iter().map(|(hash, _)| *hash).collect::<Vec<_>>();
	chain_hashes.push(block_hash);
	let predecessor_tables =
		build_predecessor_tables(&chain_hashes, oldest_level, &genesis.block);

	store_pruned_history(store, &history, &predecessor_tables[..history.len()])?;

	let caboose = if oldest_level == 1 { (0, genesis.block) } else { (oldest_level, history[0].0) };
	if caboose.0 > block_data.block_header.level - outcome.validation_result.max_operations_ttl {
		return Err(SnapshotError::SnapshotImportFailure(format!(
			"The snapshot history is too shallow: it starts at level {} but must reach \
			 level {} to cover the operation TTL window",
			caboose.0,
			block_data.block_header.level - outcome.validation_result.max_operations_ttl
		)));
	}

	store_new_head(
		store,
		genesis,
		&block_data,
		block_hash,
		&outcome,
		predecessor_tables.last().expect("history is non-empty"),
		caboose,
	)?;

	if reconstruct {
		if oldest_level != 1 {
			return Err(SnapshotError::WrongReconstructMode);
		}
		reconstruct_contexts(store, context_index, validator, genesis, &history).await?;
	}

	Ok(())
}

/// Re-commit every protocol epoch root the snapshot carries and record the
/// activations in the chain store.
async fn import_protocol_data<C: ContextIndex>(
	store: &ChainStore,
	context_index: &C,
	block_data: &BlockData,
	history: &[(BlockHash, PrunedBlock)],
	protocol_data: &[(i32, archon_primitives::ProtocolData)],
) -> Result<(), SnapshotError> {
	let oldest_level = history[0].1.block_header.level;

	for (level, data) in protocol_data {
		// Entries are tagged with the level of the block that emitted them;
		// the snapshot head itself is not part of the history.
		let expected_context = if *level == block_data.block_header.level {
			block_data.block_header.context
		} else {
			let index = usize::try_from(level - oldest_level)
				.ok()
				.filter(|index| *index < history.len())
				.ok_or_else(|| {
					SnapshotError::SnapshotImportFailure(format!(
						"Protocol data refers to level {level}, which is outside the snapshot"
					))
				})?;
			history[index].1.block_header.context
		};

		if context_index
			.validate_context_hash_consistency_and_commit(data, &expected_context)
			.await?
		{
			info!(
				"Importing protocol {} (epoch {}) at level {level}",
				data.protocol_hash, data.protocol_level
			);
			let mut batch = store.batch();
			batch.put_protocol(data.protocol_level, &data.protocol_hash);
			batch.commit()?;
		} else {
			return Err(SnapshotError::WrongProtocolHash(data.protocol_hash));
		}
	}

	Ok(())
}

/// Bulk-store the pruned history in ascending order, inside bounded atomic
/// write scopes.
fn store_pruned_history(
	store: &ChainStore,
	history: &[(BlockHash, PrunedBlock)],
	predecessor_tables: &[Vec<(u8, BlockHash)>],
) -> Result<(), SnapshotError> {
	let mut batch = store.batch();

	for (i, ((hash, pruned), table)) in history.iter().zip_eq(predecessor_tables).enumerate() {
		batch.put_block_header(hash, &pruned.block_header);
		for (pass, operations) in &pruned.operations {
			batch.put_operations(hash, *pass, operations);
		}
		for (pass, hashes) in &pruned.operation_hashes {
			batch.put_operation_hashes(hash, *pass, hashes);
		}
		for (rank, ancestor) in table {
			batch.put_predecessor(hash, *rank, ancestor);
		}
		if let Some((_, direct_predecessor)) = table.iter().find(|(rank, _)| *rank == 0) {
			batch.put_main_branch_successor(direct_predecessor, hash);
		}

		// Bound the transaction size without giving up per-chunk atomicity.
		if (i + 1) % BULK_STORE_COMMIT_BOUND == 0 {
			batch.commit()?;
			batch = store.batch();
		}
		if (i + 1) % PROGRESS_INTERVAL == 0 {
			info!("Stored {} of {} pruned blocks", i + 1, history.len());
		}
	}

	batch.commit()?;
	info!("Stored all {} pruned blocks", history.len());
	Ok(())
}

/// Persist the new head block with everything its application produced, and
/// advance the chain-data cells to it.
fn store_new_head(
	store: &ChainStore,
	genesis: &Genesis,
	block_data: &BlockData,
	block_hash: BlockHash,
	outcome: &ApplyOutcome,
	predecessor_table: &[(u8, BlockHash)],
	caboose: (i32, BlockHash),
) -> Result<(), SnapshotError> {
	let header = &block_data.block_header;

	let mut batch = store.batch();
	batch.put_block_header(&block_hash, header);
	for (pass, operations) in block_data.operations.iter().enumerate() {
		let hashes = operations.iter().map(Operation::hash).collect::<Vec<_>>();
		batch.put_operations(&block_hash, pass as u8, operations);
		batch.put_operation_hashes(&block_hash, pass as u8, &hashes);
	}
	for (pass, metadata) in outcome.ops_metadata.iter().enumerate() {
		batch.put_operations_metadata(&block_hash, pass as u8, metadata);
	}
	batch.put_contents(
		&block_hash,
		&StoredContents {
			message: outcome.validation_result.message.clone(),
			max_operations_ttl: outcome.validation_result.max_operations_ttl,
			last_allowed_fork_level: outcome.validation_result.last_allowed_fork_level,
			context: outcome.context_hash,
			forking_testchain: outcome.forking_testchain,
			metadata: outcome.block_metadata.clone(),
		},
	);
	for (rank, ancestor) in predecessor_table {
		batch.put_predecessor(&block_hash, *rank, ancestor);
	}
	if let Some((_, direct_predecessor)) = predecessor_table.iter().find(|(rank, _)| *rank == 0) {
		batch.put_main_branch_successor(direct_predecessor, &block_hash);
	}

	let mut known_heads = store.known_heads()?;
	known_heads.remove(&genesis.block);
	known_heads.insert(block_hash);
	batch.put_known_heads(&known_heads);
	batch.put_current_head(&block_hash);

	batch.put_checkpoint(header);
	batch.put_save_point(&(header.level, block_hash));
	batch.put_caboose(&caboose);

	batch.commit()?;
	Ok(())
}

/// Rebuild every historical context by re-applying the whole history from
/// genesis, verifying each resulting context hash along the way.
async fn reconstruct_contexts<C, V>(
	store: &ChainStore,
	context_index: &C,
	validator: &V,
	genesis: &Genesis,
	history: &[(BlockHash, PrunedBlock)],
) -> Result<(), SnapshotError>
where
	C: ContextIndex,
	V: BlockValidator<C::Context>,
{
	info!("Reconstructing all the contexts from the genesis");

	let mut batch = store.batch();
	for (i, (hash, pruned)) in history.iter().enumerate() {
		let header = &pruned.block_header;
		let predecessor_header = store
			.block_header(&header.predecessor)?
			.ok_or_else(|| anyhow!("Missing predecessor header at level {}", header.level))?;
		let predecessor_context = context_index.checkout(&predecessor_header.context).await?;

		// Stored newest pass first; the validator wants them oldest first.
		let operations = pruned
			.operations
			.iter()
			.rev()
			.map(|(_, operations)| operations.clone())
			.collect::<Vec<_>>();

		// Same TTL stand-in as on import: the predecessor's level is a safe
		// upper bound for its operation TTL.
		let outcome = validator
			.apply(
				genesis.chain_id,
				predecessor_header.level,
				&predecessor_header,
				predecessor_context,
				header,
				&operations,
			)
			.await
			.with_context(|| format!("Failed to re-apply block at level {}", header.level))?;

		if outcome.context_hash != header.context {
			return Err(SnapshotError::SnapshotImportFailure(format!(
				"Resulting context hash does not match at level {}",
				header.level
			)));
		}

		batch.put_contents(
			hash,
			&StoredContents {
				message: outcome.validation_result.message.clone(),
				max_operations_ttl: outcome.validation_result.max_operations_ttl,
				last_allowed_fork_level: outcome.validation_result.last_allowed_fork_level,
				context: outcome.context_hash,
				forking_testchain: outcome.forking_testchain,
				metadata: outcome.block_metadata,
			},
		);
		for (pass, metadata) in outcome.ops_metadata.iter().enumerate() {
			batch.put_operations_metadata(hash, pass as u8, metadata);
		}

		debug!("Reconstructed context at level {}", header.level);
		// Commit every `RECONSTRUCTION_COMMIT_BOUND` applications.
		if (i + 1) % RECONSTRUCTION_COMMIT_BOUND == 0 {
			batch.commit()?;
			batch = store.batch();
			info!("Reconstructed {} of {} contexts", i + 1, history.len());
		}
	}
	batch.commit()?;

	info!("Reconstructed all {} contexts", history.len());
	Ok(())
}
