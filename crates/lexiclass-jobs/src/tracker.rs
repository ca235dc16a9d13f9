//! Task lifecycle tracking: status queries, cancellation, and inspection.

use std::sync::Arc;

use serde_json::Value as JsonValue;
use tracing::info;
use uuid::Uuid;

use lexiclass_core::{
    ActiveTask, Error, Result, TaskBroker, TaskStatus, TaskStatusResponse,
};

/// Extract a human-readable fault message from a stored fault value.
///
/// Faults are captured as JSON: structured objects carry an `args` array
/// whose first element is the message; anything else falls back to its
/// string form. Mirrors how workers record exceptions.
pub fn extract_fault_message(error: &JsonValue) -> String {
    if let Some(args) = error.get("args").and_then(|a| a.as_array()) {
        if let Some(first) = args.first() {
            return match first {
                JsonValue::String(s) => s.clone(),
                other => other.to_string(),
            };
        }
    }
    match error {
        JsonValue::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// Read-and-control surface over submitted tasks.
pub struct TaskTracker {
    broker: Arc<dyn TaskBroker>,
}

impl TaskTracker {
    pub fn new(broker: Arc<dyn TaskBroker>) -> Self {
        Self { broker }
    }

    /// Report the domain-level status of a task.
    ///
    /// An id the broker no longer knows (expired or never submitted)
    /// reports PENDING with no result, matching broker backend semantics:
    /// unknown and not-yet-started are indistinguishable to callers.
    pub async fn get_status(&self, task_id: Uuid) -> Result<TaskStatusResponse> {
        let state = match self.broker.state(task_id).await? {
            Some(state) => state,
            None => {
                return Ok(TaskStatusResponse {
                    task_id,
                    status: TaskStatus::Pending,
                    result: None,
                    error: None,
                })
            }
        };

        let status = TaskStatus::from_broker(state.state, state.retry_count);
        let result = if status == TaskStatus::Success {
            state.result
        } else {
            None
        };
        let error = if status == TaskStatus::Failure {
            state.error.as_ref().map(extract_fault_message)
        } else {
            None
        };

        Ok(TaskStatusResponse {
            task_id,
            status,
            result,
            error,
        })
    }

    /// Cancel a task.
    ///
    /// A task already in a terminal state fails with AlreadyCompleted
    /// before any broker call; cancellation of finished work is a caller
    /// error, not a no-op. Returns once the revocation is recorded.
    pub async fn cancel(&self, task_id: Uuid) -> Result<()> {
        let state = self
            .broker
            .state(task_id)
            .await?
            .ok_or_else(|| Error::NotFound(format!("task {}", task_id)))?;

        if state.state.is_terminal() {
            return Err(Error::AlreadyCompleted(task_id));
        }

        self.broker.revoke(task_id).await?;
        info!(
            subsystem = "dispatch",
            component = "tracker",
            op = "cancel",
            task_id = %task_id,
            "Task cancellation requested"
        );
        Ok(())
    }

    /// List in-flight tasks for a project, best-effort.
    pub async fn list_active(&self, project_id: i64) -> Result<Vec<ActiveTask>> {
        self.broker.active_for_project(project_id).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::MockBroker;
    use lexiclass_core::{
        BrokerState, BrokerTaskState, QueuePolicy, SubmitTask, WorkCategory,
    };
    use serde_json::json;

    fn tracker_over(broker: Arc<MockBroker>) -> TaskTracker {
        TaskTracker::new(broker)
    }

    #[test]
    fn test_fault_extraction_prefers_args_first() {
        let fault = json!({ "exc_type": "ValueError", "args": ["field has no classes", 42] });
        assert_eq!(extract_fault_message(&fault), "field has no classes");
    }

    #[test]
    fn test_fault_extraction_non_string_arg() {
        let fault = json!({ "args": [{ "code": 7 }] });
        assert_eq!(extract_fault_message(&fault), "{\"code\":7}");
    }

    #[test]
    fn test_fault_extraction_empty_args_falls_back() {
        let fault = json!({ "exc_type": "ValueError", "args": [] });
        assert_eq!(
            extract_fault_message(&fault),
            "{\"args\":[],\"exc_type\":\"ValueError\"}"
        );
    }

    #[test]
    fn test_fault_extraction_bare_string() {
        let fault = json!("worker exploded");
        assert_eq!(extract_fault_message(&fault), "worker exploded");
    }

    #[tokio::test]
    async fn test_unknown_task_reports_pending() {
        let broker = Arc::new(MockBroker::new());
        let tracker = tracker_over(broker);

        let response = tracker.get_status(Uuid::new_v4()).await.unwrap();
        assert_eq!(response.status, TaskStatus::Pending);
        assert!(response.result.is_none());
        assert!(response.error.is_none());
    }

    #[tokio::test]
    async fn test_status_success_exposes_result_only() {
        let broker = Arc::new(MockBroker::new());
        let task_id = Uuid::new_v4();
        broker.set_state(
            task_id,
            BrokerTaskState {
                state: BrokerState::Completed,
                retry_count: 1,
                result: Some(json!({ "indexed": 3 })),
                error: Some(json!("stale error from an earlier attempt")),
                started_at: None,
            },
        );
        let tracker = tracker_over(broker);

        let response = tracker.get_status(task_id).await.unwrap();
        assert_eq!(response.status, TaskStatus::Success);
        assert_eq!(response.result, Some(json!({ "indexed": 3 })));
        // Errors from retried attempts do not leak into a success report.
        assert!(response.error.is_none());
    }

    #[tokio::test]
    async fn test_status_failure_extracts_fault() {
        let broker = Arc::new(MockBroker::new());
        let task_id = Uuid::new_v4();
        broker.set_state(
            task_id,
            BrokerTaskState {
                state: BrokerState::Failed,
                retry_count: 3,
                result: None,
                error: Some(json!({ "args": ["no training data"] })),
                started_at: None,
            },
        );
        let tracker = tracker_over(broker);

        let response = tracker.get_status(task_id).await.unwrap();
        assert_eq!(response.status, TaskStatus::Failure);
        assert_eq!(response.error.as_deref(), Some("no training data"));
    }

    #[tokio::test]
    async fn test_status_retry_substate() {
        let broker = Arc::new(MockBroker::new());
        let task_id = Uuid::new_v4();
        broker.set_state(
            task_id,
            BrokerTaskState {
                state: BrokerState::Pending,
                retry_count: 2,
                result: None,
                error: Some(json!("transient")),
                started_at: None,
            },
        );
        let tracker = tracker_over(broker);

        let response = tracker.get_status(task_id).await.unwrap();
        assert_eq!(response.status, TaskStatus::Retry);
        assert!(response.error.is_none());
    }

    #[tokio::test]
    async fn test_list_active_filters_by_project() {
        let broker = Arc::new(MockBroker::new());
        let submit = |project_id| SubmitTask {
            task_name: "lexiclass.indexing".to_string(),
            project_id,
            payload: json!({ "project_id": project_id }),
            policy: QueuePolicy::for_category(WorkCategory::Indexing).clone(),
        };
        let mine = broker.submit(submit(1)).await.unwrap();
        let other = broker.submit(submit(2)).await.unwrap();
        broker.set_simple_state(mine, BrokerState::Running);
        broker.set_simple_state(other, BrokerState::Running);

        let tracker = tracker_over(broker);
        let active = tracker.list_active(1).await.unwrap();
        assert_eq!(active.len(), 1);
        assert_eq!(active[0].task_id, mine);
        assert_eq!(active[0].status, TaskStatus::Started);
    }

    #[tokio::test]
    async fn test_cancel_running_task_revokes() {
        let broker = Arc::new(MockBroker::new());
        let task_id = Uuid::new_v4();
        broker.set_simple_state(task_id, BrokerState::Running);
        let tracker = tracker_over(broker.clone());

        tracker.cancel(task_id).await.unwrap();
        assert_eq!(broker.revoked(), vec![task_id]);
    }

    #[tokio::test]
    async fn test_cancel_completed_task_fails_without_revoking() {
        let broker = Arc::new(MockBroker::new());
        let task_id = Uuid::new_v4();
        broker.set_simple_state(task_id, BrokerState::Completed);
        let tracker = tracker_over(broker.clone());

        let err = tracker.cancel(task_id).await.unwrap_err();
        assert!(matches!(err, Error::AlreadyCompleted(id) if id == task_id));
        // The terminal check happens before any broker call.
        assert!(broker.revoked().is_empty());
    }

    #[tokio::test]
    async fn test_cancel_unknown_task_is_not_found() {
        let broker = Arc::new(MockBroker::new());
        let tracker = tracker_over(broker.clone());

        let err = tracker.cancel(Uuid::new_v4()).await.unwrap_err();
        assert!(matches!(err, Error::NotFound(_)));
        assert!(broker.revoked().is_empty());
    }
}
