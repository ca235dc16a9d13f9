//! Worker-side task executors.
//!
//! Each executor parses the payload for its task name and drives the
//! corresponding lifecycle against the repositories: index status
//! transitions, model version allocation and promotion, prediction
//! upserts. Engine calls go through the [`crate::engine`] seams.

use std::sync::Arc;

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{json, Value as JsonValue};
use tracing::{info, warn};
use uuid::Uuid;

use lexiclass_core::{defaults, DocumentLabel, Error, IndexStatus, Result, Task};
use lexiclass_db::{Database, DocumentFilter, NewPrediction};

use crate::engine::{Indexer, Predictor, Trainer, TrainingExample};

/// Progress callback type for task executors.
pub type ProgressCallback = Box<dyn Fn(i32) + Send + Sync>;

/// Context provided to task executors.
pub struct TaskContext {
    /// The claimed task being processed.
    pub task: Task,
    progress_callback: Option<ProgressCallback>,
}

impl TaskContext {
    pub fn new(task: Task) -> Self {
        Self {
            task,
            progress_callback: None,
        }
    }

    /// Set the progress callback.
    pub fn with_progress_callback<F>(mut self, callback: F) -> Self
    where
        F: Fn(i32) + Send + Sync + 'static,
    {
        self.progress_callback = Some(Box::new(callback));
        self
    }

    /// Report progress to the callback.
    pub fn report_progress(&self, percent: i32) {
        if let Some(ref callback) = self.progress_callback {
            callback(percent);
        }
    }
}

/// Result of task execution.
#[derive(Debug)]
pub enum TaskOutcome {
    /// Task completed successfully with optional result data.
    Success(Option<JsonValue>),
    /// Task failed with an error message.
    Failed(String),
}

/// Trait for task executors.
#[async_trait]
pub trait TaskExecutor: Send + Sync {
    /// The remote operation name this executor processes.
    fn task_name(&self) -> &'static str;

    /// Execute the task.
    async fn execute(&self, ctx: TaskContext) -> TaskOutcome;
}

#[derive(Debug, Deserialize)]
struct ProjectPayload {
    project_id: i64,
    #[serde(default)]
    is_incremental: bool,
    #[serde(default)]
    document_ids: Option<Vec<i64>>,
}

#[derive(Debug, Deserialize)]
struct FieldPayload {
    field_id: Uuid,
    #[serde(default)]
    document_ids: Option<Vec<i64>>,
}

fn parse_payload<T: for<'de> Deserialize<'de>>(payload: &JsonValue) -> Result<T> {
    serde_json::from_value(payload.clone()).map_err(Error::from)
}

/// Executor for project-wide indexing.
pub struct ProjectIndexingExecutor {
    db: Arc<Database>,
    indexer: Arc<dyn Indexer>,
}

impl ProjectIndexingExecutor {
    pub fn new(db: Arc<Database>, indexer: Arc<dyn Indexer>) -> Self {
        Self { db, indexer }
    }

    async fn run(&self, ctx: &TaskContext) -> Result<JsonValue> {
        let payload: ProjectPayload = parse_payload(&ctx.task.payload)?;
        let project_id = payload.project_id;
        self.db.projects.require(project_id).await?;

        let total = self
            .db
            .documents
            .mark_indexing_pending(project_id, payload.is_incremental)
            .await?;
        let mut indexed: i64 = 0;
        let mut failed: i64 = 0;

        loop {
            let pending = self
                .db
                .documents
                .list(
                    project_id,
                    DocumentFilter {
                        index_status: Some(IndexStatus::Pending),
                        limit: Some(defaults::PAGE_LIMIT_MAX),
                        offset: None,
                    },
                )
                .await?;
            if pending.is_empty() {
                break;
            }

            for document in pending {
                let result = match self.db.documents.read_content(&document).await {
                    Ok(content) => self.indexer.index_document(document.id, &content).await,
                    Err(e) => Err(e),
                };

                match result {
                    Ok(()) => {
                        self.db.documents.complete_indexing(document.id).await?;
                        indexed += 1;
                    }
                    Err(e) => {
                        warn!(
                            subsystem = "worker",
                            component = "indexing",
                            document_id = document.id,
                            error = %e,
                            "Document indexing failed"
                        );
                        self.db.documents.fail_indexing(document.id).await?;
                        failed += 1;
                    }
                }

                if total > 0 {
                    let done = indexed + failed;
                    ctx.report_progress(((done * 100) / total).min(99) as i32);
                }
            }
        }

        let project_status = if failed == 0 { "INDEXED" } else { "FAILED" };
        self.db
            .projects
            .set_index_status(project_id, project_status)
            .await?;

        Ok(json!({ "total": total, "indexed": indexed, "failed": failed }))
    }
}

#[async_trait]
impl TaskExecutor for ProjectIndexingExecutor {
    fn task_name(&self) -> &'static str {
        "lexiclass.index_project"
    }

    async fn execute(&self, ctx: TaskContext) -> TaskOutcome {
        match self.run(&ctx).await {
            Ok(result) => TaskOutcome::Success(Some(result)),
            Err(e) => TaskOutcome::Failed(e.to_string()),
        }
    }
}

/// Gather training examples for a field: every training label joined with
/// its document's stored content.
async fn collect_examples(db: &Database, labels: &[DocumentLabel]) -> Result<Vec<TrainingExample>> {
    let mut examples = Vec::with_capacity(labels.len());
    for label in labels {
        let document = db.documents.require(label.document_id).await?;
        let content = db.documents.read_content(&document).await?;
        examples.push(TrainingExample {
            document_id: label.document_id,
            class_id: label.class_id,
            content,
        });
    }
    Ok(examples)
}

/// Train one field: allocate the next version, run the trainer, promote or
/// fail the row, and prune old versions best-effort.
async fn train_one_field(
    db: &Database,
    trainer: &dyn Trainer,
    field_id: Uuid,
) -> Result<JsonValue> {
    let labels = db.labels.list_training_for_field(field_id).await?;
    let examples = collect_examples(db, &labels).await?;

    let model = db.models.create_next_version(field_id).await?;

    match trainer.train(field_id, &examples).await {
        Ok(outcome) => {
            db.models
                .mark_ready(model.id, outcome.accuracy, outcome.metrics)
                .await?;

            // Retention is advisory: a failed prune never fails the run.
            if let Err(e) = db
                .models
                .prune_old_versions(field_id, defaults::MODEL_RETENTION_KEEP)
                .await
            {
                warn!(
                    subsystem = "worker",
                    component = "training",
                    field_id = %field_id,
                    error = %e,
                    "Model pruning failed"
                );
            }

            info!(
                subsystem = "worker",
                component = "training",
                field_id = %field_id,
                model_id = %model.id,
                version = model.version,
                "Model trained and promoted"
            );
            Ok(json!({
                "model_id": model.id,
                "version": model.version,
                "accuracy": outcome.accuracy,
                "examples": examples.len(),
            }))
        }
        Err(e) => {
            // The version number stays burned with the FAILED row.
            db.models.mark_failed(model.id, &e.to_string()).await?;
            Err(e)
        }
    }
}

/// Predict one field over the given documents (or all project documents)
/// against its latest READY model.
async fn predict_one_field(
    db: &Database,
    predictor: &dyn Predictor,
    project_id: i64,
    field_id: Uuid,
    document_ids: Option<&[i64]>,
) -> Result<JsonValue> {
    let model = db.models.require_latest_ready(field_id).await?;
    let classes: Vec<Uuid> = db
        .fields
        .list_classes(field_id)
        .await?
        .into_iter()
        .map(|c| c.id)
        .collect();

    let documents = match document_ids {
        Some(ids) => {
            let mut docs = Vec::with_capacity(ids.len());
            for id in ids {
                docs.push(db.documents.require(*id).await?);
            }
            docs
        }
        None => {
            db.documents
                .list(
                    project_id,
                    DocumentFilter {
                        index_status: None,
                        limit: Some(defaults::INTERNAL_FETCH_LIMIT),
                        offset: None,
                    },
                )
                .await?
        }
    };

    let mut predicted: i64 = 0;
    for document in &documents {
        let content = db.documents.read_content(document).await?;
        let prediction = predictor.predict(field_id, &classes, &content).await?;
        db.predictions
            .upsert(
                field_id,
                &NewPrediction {
                    document_id: document.id,
                    class_id: prediction.class_id,
                    model_id: model.id,
                    model_version: model.version,
                    confidence: prediction.confidence,
                    metadata: None,
                },
            )
            .await?;
        predicted += 1;
    }

    Ok(json!({
        "model_version": model.version,
        "predicted": predicted,
    }))
}

/// Executor for single-field training.
pub struct FieldTrainingExecutor {
    db: Arc<Database>,
    trainer: Arc<dyn Trainer>,
}

impl FieldTrainingExecutor {
    pub fn new(db: Arc<Database>, trainer: Arc<dyn Trainer>) -> Self {
        Self { db, trainer }
    }
}

#[async_trait]
impl TaskExecutor for FieldTrainingExecutor {
    fn task_name(&self) -> &'static str {
        "lexiclass.train_field"
    }

    async fn execute(&self, ctx: TaskContext) -> TaskOutcome {
        let payload: FieldPayload = match parse_payload(&ctx.task.payload) {
            Ok(p) => p,
            Err(e) => return TaskOutcome::Failed(e.to_string()),
        };
        match train_one_field(&self.db, self.trainer.as_ref(), payload.field_id).await {
            Ok(result) => TaskOutcome::Success(Some(result)),
            Err(e) => TaskOutcome::Failed(e.to_string()),
        }
    }
}

/// Executor for single-field prediction.
pub struct FieldPredictionExecutor {
    db: Arc<Database>,
    predictor: Arc<dyn Predictor>,
}

impl FieldPredictionExecutor {
    pub fn new(db: Arc<Database>, predictor: Arc<dyn Predictor>) -> Self {
        Self { db, predictor }
    }
}

#[async_trait]
impl TaskExecutor for FieldPredictionExecutor {
    fn task_name(&self) -> &'static str {
        "lexiclass.predict_field"
    }

    async fn execute(&self, ctx: TaskContext) -> TaskOutcome {
        let payload: FieldPayload = match parse_payload(&ctx.task.payload) {
            Ok(p) => p,
            Err(e) => return TaskOutcome::Failed(e.to_string()),
        };
        match predict_one_field(
            &self.db,
            self.predictor.as_ref(),
            ctx.task.project_id,
            payload.field_id,
            payload.document_ids.as_deref(),
        )
        .await
        {
            Ok(result) => TaskOutcome::Success(Some(result)),
            Err(e) => TaskOutcome::Failed(e.to_string()),
        }
    }
}

/// Executor for project-wide training: trains every field in turn.
///
/// A field that fails training is reported in the result without aborting
/// the rest; the task fails only when every field fails.
pub struct ProjectTrainingExecutor {
    db: Arc<Database>,
    trainer: Arc<dyn Trainer>,
}

impl ProjectTrainingExecutor {
    pub fn new(db: Arc<Database>, trainer: Arc<dyn Trainer>) -> Self {
        Self { db, trainer }
    }

    async fn run(&self, ctx: &TaskContext) -> Result<JsonValue> {
        let payload: ProjectPayload = parse_payload(&ctx.task.payload)?;
        let fields = self.db.fields.list_for_project(payload.project_id).await?;
        if fields.is_empty() {
            return Err(Error::NotFound(format!(
                "project {} has no fields to train",
                payload.project_id
            )));
        }

        let total = fields.len();
        let mut trained = Vec::new();
        let mut failures = Vec::new();

        for (i, field) in fields.iter().enumerate() {
            match train_one_field(&self.db, self.trainer.as_ref(), field.id).await {
                Ok(summary) => trained.push(json!({ "field_id": field.id, "result": summary })),
                Err(e) => {
                    failures.push(json!({ "field_id": field.id, "error": e.to_string() }))
                }
            }
            ctx.report_progress((((i + 1) * 100 / total) as i32).min(99));
        }

        if trained.is_empty() {
            return Err(Error::Internal(format!(
                "training failed for all {} fields",
                total
            )));
        }

        let status = if failures.is_empty() { "TRAINED" } else { "PARTIAL" };
        self.db
            .projects
            .set_model_status(payload.project_id, status)
            .await?;

        Ok(json!({ "trained": trained, "failed": failures }))
    }
}

#[async_trait]
impl TaskExecutor for ProjectTrainingExecutor {
    fn task_name(&self) -> &'static str {
        "lexiclass.train_project"
    }

    async fn execute(&self, ctx: TaskContext) -> TaskOutcome {
        match self.run(&ctx).await {
            Ok(result) => TaskOutcome::Success(Some(result)),
            Err(e) => TaskOutcome::Failed(e.to_string()),
        }
    }
}

/// Executor for project-wide prediction: predicts every field in turn.
pub struct ProjectPredictionExecutor {
    db: Arc<Database>,
    predictor: Arc<dyn Predictor>,
}

impl ProjectPredictionExecutor {
    pub fn new(db: Arc<Database>, predictor: Arc<dyn Predictor>) -> Self {
        Self { db, predictor }
    }

    async fn run(&self, ctx: &TaskContext) -> Result<JsonValue> {
        let payload: ProjectPayload = parse_payload(&ctx.task.payload)?;
        let fields = self.db.fields.list_for_project(payload.project_id).await?;
        if fields.is_empty() {
            return Err(Error::NotFound(format!(
                "project {} has no fields to predict",
                payload.project_id
            )));
        }

        let total = fields.len();
        let mut results = Vec::new();
        let mut failures = Vec::new();

        for (i, field) in fields.iter().enumerate() {
            match predict_one_field(
                &self.db,
                self.predictor.as_ref(),
                payload.project_id,
                field.id,
                payload.document_ids.as_deref(),
            )
            .await
            {
                Ok(summary) => results.push(json!({ "field_id": field.id, "result": summary })),
                Err(e) => {
                    failures.push(json!({ "field_id": field.id, "error": e.to_string() }))
                }
            }
            ctx.report_progress((((i + 1) * 100 / total) as i32).min(99));
        }

        if results.is_empty() {
            return Err(Error::Internal(format!(
                "prediction failed for all {} fields",
                total
            )));
        }

        Ok(json!({ "predicted": results, "failed": failures }))
    }
}

#[async_trait]
impl TaskExecutor for ProjectPredictionExecutor {
    fn task_name(&self) -> &'static str {
        "lexiclass.predict_project"
    }

    async fn execute(&self, ctx: TaskContext) -> TaskOutcome {
        match self.run(&ctx).await {
            Ok(result) => TaskOutcome::Success(Some(result)),
            Err(e) => TaskOutcome::Failed(e.to_string()),
        }
    }
}
