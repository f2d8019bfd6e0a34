//! Merkle roots over operation lists.
//!
//! A block commits to its operations through a two-level tree: every
//! validation pass has a root over its operation hashes, and the header's
//! `operations_hash` is the root over the per-pass roots, oldest pass first.

use crate::hashes::{blake2b_256, OperationHash, OperationListHash, OperationListListHash};

const LEAF_TAG: u8 = 0x00;
const NODE_TAG: u8 = 0x01;

/// Root of a balanced binary tree over 32-byte leaves. Leaves and interior
/// nodes are domain-separated; an odd node is carried up unchanged.
fn merkle_root(leaves: impl ExactSizeIterator<Item = [u8; 32]>) -> [u8; 32] {
	if leaves.len() == 0 {
		return blake2b_256(&[LEAF_TAG]);
	}

	let mut level: Vec<[u8; 32]> = {
		let mut preimage = [0u8; 1 + 32];
		preimage[0] = LEAF_TAG;
		leaves
			.map(|leaf| {
				preimage[1..].copy_from_slice(&leaf);
				blake2b_256(&preimage)
			})
			.collect()
	};

	let mut preimage = [0u8; 1 + 32 + 32];
	preimage[0] = NODE_TAG;
	while level.len() > 1 {
		level = level
			.chunks(2)
			.map(|pair| match pair {
				[left, right] => {
					preimage[1..33].copy_from_slice(left);
					preimage[33..].copy_from_slice(right);
					blake2b_256(&preimage)
				},
				[odd] => *odd,
				_ => unreachable!("chunks(2) yields one or two elements"),
			})
			.collect();
	}

	level[0]
}

impl OperationListHash {
	/// Root over the operation hashes of a single validation pass.
	pub fn compute(hashes: &[OperationHash]) -> Self {
		Self::from_bytes(merkle_root(hashes.iter().map(|h| *h.as_bytes())))
	}
}

impl OperationListListHash {
	/// Root over per-pass list roots, ordered oldest pass first.
	pub fn compute(roots: &[OperationListHash]) -> Self {
		Self::from_bytes(merkle_root(roots.iter().map(|h| *h.as_bytes())))
	}

	/// The root a header commits to when it carries no operations at all.
	pub fn empty() -> Self {
		Self::compute(&[])
	}
}
