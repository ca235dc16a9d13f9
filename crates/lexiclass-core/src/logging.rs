//! Structured logging field name constants.
//!
//! All crates use these constants for consistent structured logging fields,
//! so log aggregation tools can query by standardized names across every
//! subsystem.
//!
//! ## Log Level Contract
//!
//! | Level | Usage |
//! |-------|-------|
//! | ERROR | Degraded service, requires operator attention |
//! | WARN  | Recoverable issue, automatic fallback applied |
//! | INFO  | Lifecycle events, operation completions |
//! | DEBUG | Decision points, intermediate values |
//! | TRACE | Per-item iteration inside bulk operations |

/// Subsystem originating the log event.
/// Values: "db", "dispatch", "worker", "storage"
pub const SUBSYSTEM: &str = "subsystem";

/// Component within a subsystem.
/// Examples: "task_queue", "tracker", "content_store", "pool"
pub const COMPONENT: &str = "component";

/// Logical operation name.
/// Examples: "submit", "claim_next", "bulk_delete", "create_next_version"
pub const OPERATION: &str = "op";

/// Project id being operated on.
pub const PROJECT_ID: &str = "project_id";

/// Document id being operated on.
pub const DOCUMENT_ID: &str = "document_id";

/// Field id being operated on.
pub const FIELD_ID: &str = "field_id";

/// Broker task correlation id.
pub const TASK_ID: &str = "task_id";

/// Work category of a submission.
pub const CATEGORY: &str = "category";

/// Wall-clock duration in milliseconds.
pub const DURATION_MS: &str = "duration_ms";

/// Boolean success/failure indicator.
pub const SUCCESS: &str = "success";

/// Error message when an operation fails.
pub const ERROR_MSG: &str = "error";
