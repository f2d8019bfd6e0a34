//! Skip-lists of ancestor pointers, the store's O(log n) ancestor index.

use archon_primitives::BlockHash;

/// For every block of a contiguous history (oldest first, `oldest_level`
/// being the level of `hashes[0]`), the list of `(rank, ancestor)` entries at
/// geometrically growing distances: rank 0 points 1 block back, rank 1 two
/// blocks, rank 2 four, and so on until the start of the history.
///
/// When the history starts at level 1, the entry that would point one block
/// before the start resolves to the genesis hash: genesis is a legitimate
/// predecessor even though it is never part of the history itself.
pub fn build_predecessor_tables(
	hashes: &[BlockHash],
	oldest_level: i32,
	genesis: &BlockHash,
) -> Vec<Vec<(u8, BlockHash)>> {
	(0..hashes.len())
		.map(|i| {
			let mut entries = Vec::new();
			let mut rank = 0u8;
			let mut distance = 1usize;
			loop {
				match i.checked_sub(distance) {
					Some(j) => entries.push((rank, hashes[j])),
					None => {
						if oldest_level == 1 && distance == i + 1 {
							entries.push((rank, *genesis));
						}
						break;
					},
				}
				rank += 1;
				distance *= 2;
			}
			entries
		})
		.collect()
}
