//! Centralized default constants for the LexiClass dispatch subsystem.
//!
//! **This module is the single source of truth** for shared default values.
//! Other crates reference these constants instead of defining their own
//! magic numbers.

// =============================================================================
// BULK OPERATIONS
// =============================================================================

/// Maximum documents per bulk create request.
pub const MAX_DOCUMENT_CREATE_BATCH: usize = 500;

/// Maximum documents per bulk delete request (ids + expanded ranges).
pub const MAX_DOCUMENT_DELETE_BATCH: usize = 1000;

/// Maximum labels per bulk create or delete request.
pub const MAX_LABEL_BATCH: usize = 1000;

// =============================================================================
// PAGINATION
// =============================================================================

/// Default page size for document listings.
pub const PAGE_LIMIT: i64 = 100;

/// Maximum page size for document listings.
pub const PAGE_LIMIT_MAX: i64 = 1000;

/// Internal "fetch everything" limit for training-label aggregation.
pub const INTERNAL_FETCH_LIMIT: i64 = 10_000;

// =============================================================================
// MODELS
// =============================================================================

/// Number of READY model versions retained per field after pruning.
pub const MODEL_RETENTION_KEEP: i64 = 1;

// =============================================================================
// WORKER
// =============================================================================

/// Polling interval when the task queue is empty (milliseconds).
pub const WORKER_POLL_INTERVAL_MS: u64 = 500;

/// Maximum tasks a worker claims and executes concurrently.
pub const WORKER_MAX_CONCURRENT: usize = 4;

/// Per-task execution timeout (seconds).
pub const TASK_TIMEOUT_SECS: u64 = 1800;
