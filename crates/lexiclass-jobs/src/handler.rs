//! Task handlers: the typed submission seam between callers and the broker.
//!
//! Each handler binds one remote operation name to the input shape it
//! accepts and the work category whose queue policy governs it. Submission
//! validates the input kind first; a mismatched input never reaches the
//! broker.

use async_trait::async_trait;
use serde::Serialize;
use uuid::Uuid;

use lexiclass_core::{Error, QueuePolicy, Result, SubmitTask, TaskBroker, WorkCategory};

/// Typed input for one asynchronous operation.
///
/// Serializes to a flat field map: the variant tag is carried by the
/// handler's task name, not inside the payload. Workers parse payloads
/// into their own typed structs keyed on the task name.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum TaskInput {
    /// Re-index a project's documents. An incremental run only touches
    /// documents not already indexed.
    Indexing {
        project_id: i64,
        is_incremental: bool,
    },
    /// Train models for every field in a project.
    Training { project_id: i64 },
    /// Predict every field of a project against its latest ready models.
    Prediction {
        project_id: i64,
        #[serde(skip_serializing_if = "Option::is_none")]
        document_ids: Option<Vec<i64>>,
    },
    /// Train a model for one field.
    FieldTraining { project_id: i64, field_id: Uuid },
    /// Predict one field, optionally restricted to specific documents.
    FieldPrediction {
        project_id: i64,
        field_id: Uuid,
        #[serde(skip_serializing_if = "Option::is_none")]
        document_ids: Option<Vec<i64>>,
    },
}

impl TaskInput {
    /// The input kind name, used in mismatch errors.
    pub fn kind(&self) -> &'static str {
        match self {
            TaskInput::Indexing { .. } => "Indexing",
            TaskInput::Training { .. } => "Training",
            TaskInput::Prediction { .. } => "Prediction",
            TaskInput::FieldTraining { .. } => "FieldTraining",
            TaskInput::FieldPrediction { .. } => "FieldPrediction",
        }
    }

    /// Every input carries the owning project.
    pub fn project_id(&self) -> i64 {
        match self {
            TaskInput::Indexing { project_id, .. }
            | TaskInput::Training { project_id }
            | TaskInput::Prediction { project_id, .. }
            | TaskInput::FieldTraining { project_id, .. }
            | TaskInput::FieldPrediction { project_id, .. } => *project_id,
        }
    }
}

/// One submittable remote operation.
///
/// The default `submit` is the whole submission contract: kind check,
/// policy lookup, payload serialization, broker hand-off. Implementations
/// only declare identity.
#[async_trait]
pub trait TaskHandler: Send + Sync {
    /// The remote operation name sent to the broker.
    fn task_name(&self) -> &'static str;

    /// The work category whose queue policy applies.
    fn category(&self) -> WorkCategory;

    /// The input kind this handler accepts.
    fn expected_kind(&self) -> &'static str;

    fn accepts(&self, input: &TaskInput) -> bool {
        input.kind() == self.expected_kind()
    }

    /// Validate and submit. Exactly one broker message per call; the full
    /// queue policy for the category rides along with it.
    async fn submit(&self, broker: &dyn TaskBroker, input: TaskInput) -> Result<Uuid> {
        if !self.accepts(&input) {
            return Err(Error::InvalidInputKind {
                expected: self.expected_kind(),
                got: input.kind(),
            });
        }

        let task = SubmitTask {
            task_name: self.task_name().to_string(),
            project_id: input.project_id(),
            payload: serde_json::to_value(&input)?,
            policy: QueuePolicy::for_category(self.category()).clone(),
        };
        broker.submit(task).await
    }
}

/// Handler for project-wide indexing.
pub struct IndexingHandler;

#[async_trait]
impl TaskHandler for IndexingHandler {
    fn task_name(&self) -> &'static str {
        "lexiclass.index_project"
    }
    fn category(&self) -> WorkCategory {
        WorkCategory::Indexing
    }
    fn expected_kind(&self) -> &'static str {
        "Indexing"
    }
}

/// Handler for project-wide training.
pub struct TrainingHandler;

#[async_trait]
impl TaskHandler for TrainingHandler {
    fn task_name(&self) -> &'static str {
        "lexiclass.train_project"
    }
    fn category(&self) -> WorkCategory {
        WorkCategory::Training
    }
    fn expected_kind(&self) -> &'static str {
        "Training"
    }
}

/// Handler for project-wide prediction.
pub struct PredictionHandler;

#[async_trait]
impl TaskHandler for PredictionHandler {
    fn task_name(&self) -> &'static str {
        "lexiclass.predict_project"
    }
    fn category(&self) -> WorkCategory {
        WorkCategory::Prediction
    }
    fn expected_kind(&self) -> &'static str {
        "Prediction"
    }
}

/// Handler for single-field training.
pub struct FieldTrainingHandler;

#[async_trait]
impl TaskHandler for FieldTrainingHandler {
    fn task_name(&self) -> &'static str {
        "lexiclass.train_field"
    }
    fn category(&self) -> WorkCategory {
        WorkCategory::Training
    }
    fn expected_kind(&self) -> &'static str {
        "FieldTraining"
    }
}

/// Handler for single-field prediction.
pub struct FieldPredictionHandler;

#[async_trait]
impl TaskHandler for FieldPredictionHandler {
    fn task_name(&self) -> &'static str {
        "lexiclass.predict_field"
    }
    fn category(&self) -> WorkCategory {
        WorkCategory::Prediction
    }
    fn expected_kind(&self) -> &'static str {
        "FieldPrediction"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::MockBroker;
    use serde_json::json;

    fn all_handlers() -> Vec<Box<dyn TaskHandler>> {
        vec![
            Box::new(IndexingHandler),
            Box::new(TrainingHandler),
            Box::new(PredictionHandler),
            Box::new(FieldTrainingHandler),
            Box::new(FieldPredictionHandler),
        ]
    }

    #[test]
    fn test_task_names_are_unique() {
        let mut names: Vec<&str> = all_handlers().iter().map(|h| h.task_name()).collect();
        names.sort();
        names.dedup();
        assert_eq!(names.len(), 5);
    }

    #[test]
    fn test_each_handler_accepts_only_its_kind() {
        let inputs = [
            TaskInput::Indexing {
                project_id: 1,
                is_incremental: false,
            },
            TaskInput::Training { project_id: 1 },
            TaskInput::Prediction {
                project_id: 1,
                document_ids: None,
            },
            TaskInput::FieldTraining {
                project_id: 1,
                field_id: Uuid::new_v4(),
            },
            TaskInput::FieldPrediction {
                project_id: 1,
                field_id: Uuid::new_v4(),
                document_ids: None,
            },
        ];

        for handler in all_handlers() {
            let accepted: Vec<&TaskInput> =
                inputs.iter().filter(|i| handler.accepts(i)).collect();
            assert_eq!(accepted.len(), 1, "handler {}", handler.task_name());
            assert_eq!(accepted[0].kind(), handler.expected_kind());
        }
    }

    #[tokio::test]
    async fn test_submit_rejects_mismatched_input() {
        let broker = MockBroker::new();
        let err = FieldTrainingHandler
            .submit(
                &broker,
                TaskInput::Indexing {
                    project_id: 1,
                    is_incremental: false,
                },
            )
            .await
            .unwrap_err();

        assert!(matches!(
            err,
            Error::InvalidInputKind {
                expected: "FieldTraining",
                got: "Indexing"
            }
        ));
        // The broker never saw the bad submission.
        assert_eq!(broker.submissions().len(), 0);
    }

    #[tokio::test]
    async fn test_submit_carries_registry_policy() {
        let broker = MockBroker::new();
        FieldPredictionHandler
            .submit(
                &broker,
                TaskInput::FieldPrediction {
                    project_id: 9,
                    field_id: Uuid::new_v4(),
                    document_ids: None,
                },
            )
            .await
            .unwrap();

        let submissions = broker.submissions();
        assert_eq!(submissions.len(), 1);
        let sent = &submissions[0];
        assert_eq!(sent.task_name, "lexiclass.predict_field");
        assert_eq!(sent.project_id, 9);
        assert_eq!(
            sent.policy,
            *QueuePolicy::for_category(WorkCategory::Prediction)
        );
    }

    #[tokio::test]
    async fn test_submit_payload_is_flat() {
        let broker = MockBroker::new();
        let field_id = Uuid::new_v4();
        FieldTrainingHandler
            .submit(
                &broker,
                TaskInput::FieldTraining {
                    project_id: 3,
                    field_id,
                },
            )
            .await
            .unwrap();

        let payload = broker.submissions()[0].payload.clone();
        assert_eq!(
            payload,
            json!({ "project_id": 3, "field_id": field_id.to_string() })
        );
    }

    #[test]
    fn test_optional_document_ids_omitted_when_none() {
        let payload = serde_json::to_value(TaskInput::Prediction {
            project_id: 4,
            document_ids: None,
        })
        .unwrap();
        assert_eq!(payload, json!({ "project_id": 4 }));

        let payload = serde_json::to_value(TaskInput::Prediction {
            project_id: 4,
            document_ids: Some(vec![1, 2]),
        })
        .unwrap();
        assert_eq!(payload, json!({ "project_id": 4, "document_ids": [1, 2] }));
    }
}
