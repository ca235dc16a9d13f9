//! Collaborator traits consumed by the dispatch subsystem.
//!
//! The broker and the document-content store are the two external seams:
//! everything else talks to them through these traits so the dispatch side
//! can be exercised against in-memory doubles.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::Value as JsonValue;
use uuid::Uuid;

use crate::error::Result;
use crate::models::{ActiveTask, BrokerState};
use crate::queue::QueuePolicy;

/// One message handed to the broker: the remote operation name, the
/// serialized input, and the full queue policy resolved for its category.
#[derive(Debug, Clone)]
pub struct SubmitTask {
    pub task_name: String,
    pub project_id: i64,
    /// Flat field -> value mapping matching the handler's input schema.
    pub payload: JsonValue,
    pub policy: QueuePolicy,
}

/// Broker-reported state of one submitted task.
#[derive(Debug, Clone)]
pub struct BrokerTaskState {
    pub state: BrokerState,
    pub retry_count: i32,
    pub result: Option<JsonValue>,
    /// Captured fault as JSON: either a structured object carrying an
    /// `args` array, or a bare string.
    pub error: Option<JsonValue>,
    pub started_at: Option<DateTime<Utc>>,
}

/// The message broker boundary.
///
/// Every call is a single network round trip; callers own any polling.
#[async_trait]
pub trait TaskBroker: Send + Sync {
    /// Enqueue exactly one message and return the broker correlation id.
    async fn submit(&self, task: SubmitTask) -> Result<Uuid>;

    /// Query the state of a submitted task, if the broker still knows it.
    async fn state(&self, task_id: Uuid) -> Result<Option<BrokerTaskState>>;

    /// Request forceful termination. Fire-and-forget: returns once the
    /// revocation is recorded, without waiting for execution to stop.
    async fn revoke(&self, task_id: Uuid) -> Result<()>;

    /// Inspect in-flight work across workers, filtered by the project id
    /// embedded in submitted arguments. An approximation: tasks whose
    /// worker has not yet reported liveness may be omitted.
    async fn active_for_project(&self, project_id: i64) -> Result<Vec<ActiveTask>>;
}

/// The document-content store boundary, keyed by (project, document).
///
/// Content writes and deletes are not atomic with the relational store;
/// callers sequence them explicitly and compensate on failure.
#[async_trait]
pub trait ContentStore: Send + Sync {
    /// Store document content, replacing any existing bytes. Returns the
    /// storage path recorded on the document row.
    async fn store(&self, project_id: i64, document_id: i64, content: &[u8]) -> Result<String>;

    /// Read document content.
    async fn read(&self, project_id: i64, document_id: i64) -> Result<Vec<u8>>;

    /// Delete document content. Returns false when nothing was stored
    /// under the key (already gone is not an error).
    async fn delete(&self, project_id: i64, document_id: i64) -> Result<bool>;
}
