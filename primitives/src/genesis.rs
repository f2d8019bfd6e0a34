use serde::{Deserialize, Serialize};

use crate::{
	block::BlockHeader,
	hashes::{BlockHash, ChainId, ContextHash, OperationListListHash, ProtocolHash},
};

/// Static description of a chain's genesis, fixed by configuration rather
/// than derived from content.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Genesis {
	pub chain_id: ChainId,
	pub block: BlockHash,
	pub protocol: ProtocolHash,
}

impl Genesis {
	/// The synthesized genesis header. By convention the genesis block is its
	/// own predecessor and commits to an empty operations tree.
	pub fn header(&self, context: ContextHash) -> BlockHeader {
		BlockHeader {
			level: 0,
			proto_level: 0,
			predecessor: self.block,
			timestamp: 0,
			validation_passes: 0,
			operations_hash: OperationListListHash::empty(),
			fitness: Vec::new(),
			context,
			protocol_data: Vec::new(),
		}
	}
}
