/// Upper bound on history entries stored inside a single write transaction
/// while bulk-storing pruned blocks. Keeps one transaction well below the
/// store engine's limits while preserving per-chunk crash atomicity.
pub const BULK_STORE_COMMIT_BOUND: usize = 5_000;

/// Number of block applications between commits while reconstructing
/// historical contexts.
pub const RECONSTRUCTION_COMMIT_BOUND: usize = 1_000;

/// How often the long-running check/store loops report progress, in blocks.
pub const PROGRESS_INTERVAL: usize = 1_000;

/// Subdirectory of the node's data dir holding the block store.
pub const STORE_DIR: &str = "store";
