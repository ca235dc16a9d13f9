//! Dispatch façade: one call per asynchronous operation.
//!
//! `WorkerClient` owns the five handlers and a broker handle. Callers never
//! touch queue names, routing keys, priorities, or retry policies; those
//! are resolved per category from the registry inside the handlers.

use std::sync::Arc;
use std::time::Instant;

use tracing::info;
use uuid::Uuid;

use lexiclass_core::{Result, TaskBroker};

use crate::handler::{
    FieldPredictionHandler, FieldTrainingHandler, IndexingHandler, PredictionHandler,
    TaskHandler, TaskInput, TrainingHandler,
};

/// Client for submitting asynchronous classification work.
pub struct WorkerClient {
    broker: Arc<dyn TaskBroker>,
    indexing: IndexingHandler,
    training: TrainingHandler,
    prediction: PredictionHandler,
    field_training: FieldTrainingHandler,
    field_prediction: FieldPredictionHandler,
}

impl WorkerClient {
    pub fn new(broker: Arc<dyn TaskBroker>) -> Self {
        Self {
            broker,
            indexing: IndexingHandler,
            training: TrainingHandler,
            prediction: PredictionHandler,
            field_training: FieldTrainingHandler,
            field_prediction: FieldPredictionHandler,
        }
    }

    async fn dispatch(&self, handler: &dyn TaskHandler, input: TaskInput) -> Result<Uuid> {
        let start = Instant::now();
        let project_id = input.project_id();
        let task_id = handler.submit(self.broker.as_ref(), input).await?;
        info!(
            subsystem = "dispatch",
            component = "worker_client",
            op = "submit",
            task_id = %task_id,
            project_id,
            task_name = handler.task_name(),
            category = handler.category().as_str(),
            duration_ms = start.elapsed().as_millis() as u64,
            "Dispatched task"
        );
        Ok(task_id)
    }

    /// Submit a project-wide indexing run. An incremental run skips
    /// documents already indexed.
    pub async fn index_project(&self, project_id: i64, incremental: bool) -> Result<Uuid> {
        self.dispatch(
            &self.indexing,
            TaskInput::Indexing {
                project_id,
                is_incremental: incremental,
            },
        )
        .await
    }

    /// Submit a project-wide training run over every field.
    pub async fn train_project(&self, project_id: i64) -> Result<Uuid> {
        self.dispatch(&self.training, TaskInput::Training { project_id })
            .await
    }

    /// Submit a project-wide prediction run, optionally restricted to
    /// specific documents.
    pub async fn predict_project(
        &self,
        project_id: i64,
        document_ids: Option<Vec<i64>>,
    ) -> Result<Uuid> {
        self.dispatch(
            &self.prediction,
            TaskInput::Prediction {
                project_id,
                document_ids,
            },
        )
        .await
    }

    /// Submit a training run for one field.
    pub async fn train_field(&self, project_id: i64, field_id: Uuid) -> Result<Uuid> {
        self.dispatch(
            &self.field_training,
            TaskInput::FieldTraining {
                project_id,
                field_id,
            },
        )
        .await
    }

    /// Submit a prediction run for one field, optionally restricted to
    /// specific documents.
    pub async fn predict_field(
        &self,
        project_id: i64,
        field_id: Uuid,
        document_ids: Option<Vec<i64>>,
    ) -> Result<Uuid> {
        self.dispatch(
            &self.field_prediction,
            TaskInput::FieldPrediction {
                project_id,
                field_id,
                document_ids,
            },
        )
        .await
    }
}
