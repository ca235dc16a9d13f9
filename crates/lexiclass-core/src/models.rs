//! Core entity types for the LexiClass dispatch subsystem.
//!
//! Projects own documents, fields, and tasks; fields own classes and
//! versioned models. Labels and predictions tie a document to a field class
//! for one field, with at most one row per (document, field) pair.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use uuid::Uuid;

/// Aggregation root owning documents, fields, and tasks.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Project {
    pub id: i64,
    pub name: String,
    /// Free-form project configuration.
    pub config: Option<JsonValue>,
    pub index_status: Option<String>,
    pub model_status: Option<String>,
    pub last_indexed_at: Option<DateTime<Utc>>,
    pub last_trained_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Indexing status of a document.
///
/// During an indexing run the only legal transitions are
/// `Pending -> Indexed` and `Pending -> Failed`; a document never regresses
/// without a new indexing request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum IndexStatus {
    NotIndexed,
    Pending,
    Indexed,
    Failed,
}

impl IndexStatus {
    /// Database/wire representation (uppercase, matching the stored values).
    pub fn as_str(&self) -> &'static str {
        match self {
            IndexStatus::NotIndexed => "NOT_INDEXED",
            IndexStatus::Pending => "PENDING",
            IndexStatus::Indexed => "INDEXED",
            IndexStatus::Failed => "FAILED",
        }
    }

    /// Parse the stored representation. Case-sensitive.
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "NOT_INDEXED" => Some(IndexStatus::NotIndexed),
            "PENDING" => Some(IndexStatus::Pending),
            "INDEXED" => Some(IndexStatus::Indexed),
            "FAILED" => Some(IndexStatus::Failed),
            _ => None,
        }
    }
}

/// A document belonging to exactly one project.
///
/// Content is never stored inline; `content_path` references the externally
/// stored bytes whose lifecycle is coupled to this row.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Document {
    pub id: i64,
    pub project_id: i64,
    pub content_path: String,
    pub metadata: Option<JsonValue>,
    pub index_status: IndexStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// One classification dimension within a project.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Field {
    pub id: Uuid,
    pub project_id: i64,
    pub name: String,
    pub description: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// One admissible label value for a field. Name is unique within the field.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FieldClass {
    pub id: Uuid,
    pub field_id: Uuid,
    pub name: String,
    pub created_at: DateTime<Utc>,
}

/// A human-assigned ground-truth class for a document on a given field.
///
/// At most one label exists per (document, field) pair; re-labelling the
/// same pair replaces the stored row.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DocumentLabel {
    pub id: i64,
    pub document_id: i64,
    pub field_id: Uuid,
    pub class_id: Uuid,
    pub is_training_data: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Training lifecycle status of a model.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ModelStatus {
    Training,
    Ready,
    Failed,
}

impl ModelStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ModelStatus::Training => "TRAINING",
            ModelStatus::Ready => "READY",
            ModelStatus::Failed => "FAILED",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "TRAINING" => Some(ModelStatus::Training),
            "READY" => Some(ModelStatus::Ready),
            "FAILED" => Some(ModelStatus::Failed),
            _ => None,
        }
    }
}

/// One trained, versioned classifier artifact scoped to a field.
///
/// Versions are monotonically increasing per field and never reused, even
/// across failed trainings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Model {
    pub id: Uuid,
    pub field_id: Uuid,
    pub version: i32,
    pub status: ModelStatus,
    pub accuracy: Option<f64>,
    pub metrics: Option<JsonValue>,
    pub trained_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

/// A model-assigned class for a document on a given field.
///
/// At most one prediction exists per (document, field) pair; newer
/// predictions replace the stored row. `model_version` records the producing
/// model.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Prediction {
    pub id: Uuid,
    pub document_id: i64,
    pub field_id: Uuid,
    pub class_id: Uuid,
    pub model_id: Uuid,
    pub model_version: i32,
    pub confidence: Option<f64>,
    pub metadata: Option<JsonValue>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Broker-native state of a submitted task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BrokerState {
    Pending,
    Running,
    Completed,
    Failed,
    Cancelled,
}

impl BrokerState {
    pub fn as_str(&self) -> &'static str {
        match self {
            BrokerState::Pending => "pending",
            BrokerState::Running => "running",
            BrokerState::Completed => "completed",
            BrokerState::Failed => "failed",
            BrokerState::Cancelled => "cancelled",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(BrokerState::Pending),
            "running" => Some(BrokerState::Running),
            "completed" => Some(BrokerState::Completed),
            "failed" => Some(BrokerState::Failed),
            "cancelled" => Some(BrokerState::Cancelled),
            _ => None,
        }
    }

    /// Whether the task can no longer change state.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            BrokerState::Completed | BrokerState::Failed | BrokerState::Cancelled
        )
    }
}

/// Domain-level status of a submitted task, as reported to callers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TaskStatus {
    Pending,
    Started,
    Success,
    Failure,
    Revoked,
    Retry,
}

impl TaskStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            TaskStatus::Pending => "PENDING",
            TaskStatus::Started => "STARTED",
            TaskStatus::Success => "SUCCESS",
            TaskStatus::Failure => "FAILURE",
            TaskStatus::Revoked => "REVOKED",
            TaskStatus::Retry => "RETRY",
        }
    }

    /// Map a broker-native state to the domain status.
    ///
    /// RETRY is a transient sub-state: a task back in the pending queue
    /// after at least one failed attempt reports as RETRY, not PENDING.
    pub fn from_broker(state: BrokerState, retry_count: i32) -> Self {
        match state {
            BrokerState::Pending if retry_count > 0 => TaskStatus::Retry,
            BrokerState::Pending => TaskStatus::Pending,
            BrokerState::Running => TaskStatus::Started,
            BrokerState::Completed => TaskStatus::Success,
            BrokerState::Failed => TaskStatus::Failure,
            BrokerState::Cancelled => TaskStatus::Revoked,
        }
    }
}

/// One submitted, trackable unit of asynchronous work.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Task {
    pub id: Uuid,
    pub project_id: i64,
    /// The remote operation name targeted by the submitting handler.
    pub task_name: String,
    pub state: BrokerState,
    pub queue: String,
    pub routing_key: String,
    pub priority: i32,
    pub payload: JsonValue,
    pub result: Option<JsonValue>,
    /// Captured fault, as JSON. See the tracker for the extraction rule.
    pub error: Option<JsonValue>,
    pub progress_percent: i32,
    pub retry_count: i32,
    pub max_retries: i32,
    pub created_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
}

/// Status response returned to callers querying a task.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskStatusResponse {
    pub task_id: Uuid,
    pub status: TaskStatus,
    pub result: Option<JsonValue>,
    pub error: Option<String>,
}

/// Summary of one in-flight task, as reported by broker inspection.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ActiveTask {
    pub task_id: Uuid,
    pub task_name: String,
    pub status: TaskStatus,
    pub started_at: Option<DateTime<Utc>>,
}
