//! # lexiclass-jobs
//!
//! Task dispatch and worker layer for the LexiClass classification service.
//!
//! This crate provides:
//! - The dispatch façade ([`WorkerClient`]) that submits indexing,
//!   training, and prediction tasks through queue policies
//! - Task lifecycle tracking ([`TaskTracker`]): status, cancellation,
//!   and active-task inspection
//! - The worker ([`TaskWorker`]) that claims queued tasks and runs the
//!   registered executors with progress and event reporting
//! - Engine seams ([`Indexer`], [`Trainer`], [`Predictor`]) so the
//!   dispatch subsystem never depends on a concrete ML stack
//!
//! ## Example
//!
//! ```ignore
//! use std::sync::Arc;
//! use lexiclass_db::Database;
//! use lexiclass_jobs::{
//!     FieldTrainingExecutor, ThresholdTrainer, WorkerBuilder, WorkerClient, WorkerConfig,
//! };
//!
//! let db = Arc::new(Database::connect("postgres://...", "/var/lexiclass/content").await?);
//!
//! let worker = WorkerBuilder::new(db.clone())
//!     .with_config(WorkerConfig::default().with_poll_interval(1000))
//!     .with_executor(FieldTrainingExecutor::new(db.clone(), Arc::new(ThresholdTrainer)))
//!     .build()
//!     .await;
//! let handle = worker.start();
//!
//! let client = WorkerClient::new(db.tasks.clone());
//! let task_id = client.train_field(project_id, field_id).await?;
//!
//! handle.shutdown().await?;
//! ```

pub mod dispatch;
pub mod engine;
pub mod executors;
pub mod handler;
pub mod mock;
pub mod tracker;
pub mod worker;

// Re-export core types
pub use lexiclass_core::*;

pub use dispatch::WorkerClient;
pub use engine::{
    ClassPrediction, HashingPredictor, Indexer, NoOpIndexer, Predictor, ThresholdTrainer,
    Trainer, TrainingExample, TrainingOutcome,
};
pub use executors::{
    FieldPredictionExecutor, FieldTrainingExecutor, ProjectIndexingExecutor,
    ProjectPredictionExecutor, ProjectTrainingExecutor, TaskContext, TaskExecutor, TaskOutcome,
};
pub use handler::{
    FieldPredictionHandler, FieldTrainingHandler, IndexingHandler, PredictionHandler,
    TaskHandler, TaskInput, TrainingHandler,
};
pub use mock::MockBroker;
pub use tracker::{extract_fault_message, TaskTracker};
pub use worker::{TaskWorker, WorkerBuilder, WorkerConfig, WorkerEvent, WorkerHandle};
