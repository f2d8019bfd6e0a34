//! Snapshot export/import engine for the Archon node.
//!
//! A snapshot packages a prefix of the chain's block history plus one
//! context commitment into a single portable file. [`export`] produces such
//! a file from a live node's data dir; [`import`] rehydrates one into a
//! fresh data dir, optionally reconstructing every historical context by
//! re-applying the chain from genesis.
//!
//! The engine orchestrates three collaborators it does not implement: the
//! block store ([`archon_store`]), the context subsystem
//! ([`context::ContextIndex`], which owns the snapshot file format) and the
//! block validator ([`validator::BlockValidator`]).

pub mod consistency;
pub mod constants;
pub mod context;
pub mod error;
pub mod export;
pub mod import;
pub mod predecessors;
pub mod pruned_blocks;
pub mod validator;

pub use context::{ContextIndex, ExportBlock, HistoryWalk, PatchContext, RestoredSnapshot};
pub use error::{SnapshotError, WrongBlockExportReason};
pub use export::export;
pub use import::import;
pub use validator::{ApplyOutcome, BlockValidator, ValidationResult};
