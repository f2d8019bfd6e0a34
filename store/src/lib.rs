//! Persistent block and chain-data storage for the Archon node.
//!
//! One RocksDB database per chain holds every block-keyed record (headers,
//! contents, operations, operation hashes, predecessor skip-lists) plus the
//! chain-wide cells (checkpoint, save point, caboose, heads, history mode)
//! and the protocol activation table.

pub mod kv;
pub mod persistent;

pub use persistent::{BlockDescriptor, ChainStore, StoreBatch, StoredContents};
