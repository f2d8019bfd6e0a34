//! Content-derived hash newtypes.
//!
//! Each hash family gets its own type so that a block hash can never be
//! assigned where an operation hash is expected. Equality and ordering are
//! byte-wise; rendering is base58.

use blake2::{digest::consts::U32, Blake2b, Digest};
use serde::{Deserialize, Serialize};

/// Blake2b with a 32 byte digest, the hash behind every content-derived
/// identifier on the chain.
pub fn blake2b_256(data: &[u8]) -> [u8; 32] {
	let mut hasher = Blake2b::<U32>::new();
	hasher.update(data);
	hasher.finalize().into()
}

#[derive(thiserror::Error, Debug, PartialEq, Eq)]
pub enum HashParseError {
	#[error("invalid base58: {0}")]
	InvalidBase58(String),
	#[error("wrong hash length: expected {expected} bytes, got {got}")]
	WrongLength { expected: usize, got: usize },
}

macro_rules! define_hash {
	($(#[$meta:meta])* $name:ident, $len:literal) => {
		$(#[$meta])*
		#[derive(
			Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Default,
		)]
		pub struct $name([u8; $len]);

		impl $name {
			pub const LEN: usize = $len;

			pub const fn from_bytes(bytes: [u8; $len]) -> Self {
				Self(bytes)
			}

			/// Hash arbitrary bytes into this hash family.
			pub fn hash_bytes(data: &[u8]) -> Self {
				let digest = blake2b_256(data);
				let mut bytes = [0u8; $len];
				bytes.copy_from_slice(&digest[..$len]);
				Self(bytes)
			}

			pub fn as_bytes(&self) -> &[u8; $len] {
				&self.0
			}

			pub fn to_vec(&self) -> Vec<u8> {
				self.0.to_vec()
			}

			pub fn try_from_slice(slice: &[u8]) -> Result<Self, HashParseError> {
				let bytes: [u8; $len] = slice
					.try_into()
					.map_err(|_| HashParseError::WrongLength { expected: $len, got: slice.len() })?;
				Ok(Self(bytes))
			}
		}

		impl AsRef<[u8]> for $name {
			fn as_ref(&self) -> &[u8] {
				&self.0
			}
		}

		impl std::fmt::Display for $name {
			fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
				write!(f, "{}", bs58::encode(&self.0).into_string())
			}
		}

		impl std::fmt::Debug for $name {
			fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
				write!(f, concat!(stringify!($name), "({})"), self)
			}
		}

		impl std::str::FromStr for $name {
			type Err = HashParseError;

			fn from_str(s: &str) -> Result<Self, Self::Err> {
				let bytes = bs58::decode(s)
					.into_vec()
					.map_err(|e| HashParseError::InvalidBase58(e.to_string()))?;
				Self::try_from_slice(&bytes)
			}
		}
	};
}

define_hash!(
	/// Identifies a block by the hash of its header.
	BlockHash,
	32
);
define_hash!(
	/// Commitment to the full authenticated state after applying a block.
	ContextHash,
	32
);
define_hash!(
	/// Identifies a single operation.
	OperationHash,
	32
);
define_hash!(
	/// Merkle root over the operations of one validation pass.
	OperationListHash,
	32
);
define_hash!(
	/// Merkle root over the per-pass operation list roots of a block.
	OperationListListHash,
	32
);
define_hash!(
	/// Identifies an economic protocol version.
	ProtocolHash,
	32
);
define_hash!(
	/// Short chain identifier, derived from the genesis block hash.
	ChainId,
	4
);

impl ChainId {
	/// The chain id is the first four bytes of the genesis block hash's digest.
	pub fn from_block_hash(genesis: &BlockHash) -> Self {
		Self::hash_bytes(genesis.as_bytes())
	}
}
