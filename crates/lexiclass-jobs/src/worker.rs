//! Task worker: claims queued tasks and runs the registered executors.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use serde_json::json;
use tokio::sync::{broadcast, mpsc, RwLock};
use tracing::{debug, error, info, instrument, warn};
use uuid::Uuid;

use lexiclass_core::{defaults, Result, Task};
use lexiclass_db::Database;

use crate::executors::{TaskContext, TaskExecutor, TaskOutcome};

/// Capacity of the worker event broadcast channel.
const EVENT_BUS_CAPACITY: usize = 256;

/// Configuration for the task worker.
#[derive(Debug, Clone)]
pub struct WorkerConfig {
    /// Polling interval in milliseconds when the queue is empty.
    pub poll_interval_ms: u64,
    /// Maximum number of concurrent tasks.
    pub max_concurrent_tasks: usize,
    /// Whether to enable task processing.
    pub enabled: bool,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            poll_interval_ms: defaults::WORKER_POLL_INTERVAL_MS,
            max_concurrent_tasks: defaults::WORKER_MAX_CONCURRENT,
            enabled: true,
        }
    }
}

impl WorkerConfig {
    /// Create config from environment variables (with defaults).
    ///
    /// | Variable | Default | Description |
    /// |----------|---------|-------------|
    /// | `LEXICLASS_WORKER_ENABLED` | `true` | Enable/disable task processing |
    /// | `LEXICLASS_MAX_CONCURRENT` | `4` | Max concurrent tasks |
    /// | `LEXICLASS_POLL_INTERVAL_MS` | `500` | Polling interval when queue is empty |
    pub fn from_env() -> Self {
        let enabled = std::env::var("LEXICLASS_WORKER_ENABLED")
            .map(|v| v != "false" && v != "0")
            .unwrap_or(true);

        let max_concurrent_tasks = std::env::var("LEXICLASS_MAX_CONCURRENT")
            .ok()
            .and_then(|v| v.parse::<usize>().ok())
            .unwrap_or(defaults::WORKER_MAX_CONCURRENT)
            .max(1);

        let poll_interval_ms = std::env::var("LEXICLASS_POLL_INTERVAL_MS")
            .ok()
            .and_then(|v| v.parse::<u64>().ok())
            .unwrap_or(defaults::WORKER_POLL_INTERVAL_MS);

        Self {
            poll_interval_ms,
            max_concurrent_tasks,
            enabled,
        }
    }

    /// Create a new config with custom poll interval.
    pub fn with_poll_interval(mut self, ms: u64) -> Self {
        self.poll_interval_ms = ms;
        self
    }

    /// Set maximum concurrent tasks.
    pub fn with_max_concurrent(mut self, max: usize) -> Self {
        self.max_concurrent_tasks = max;
        self
    }

    /// Enable or disable task processing.
    pub fn with_enabled(mut self, enabled: bool) -> Self {
        self.enabled = enabled;
        self
    }
}

/// Event emitted by the task worker.
#[derive(Debug, Clone)]
pub enum WorkerEvent {
    /// A task was started.
    TaskStarted { task_id: Uuid, task_name: String },
    /// Task progress was updated.
    TaskProgress { task_id: Uuid, percent: i32 },
    /// A task completed successfully.
    TaskCompleted { task_id: Uuid, task_name: String },
    /// A task failed (the queue decides whether it retries).
    TaskFailed {
        task_id: Uuid,
        task_name: String,
        error: String,
    },
    /// Worker started.
    WorkerStarted,
    /// Worker stopped.
    WorkerStopped,
}

/// Handle for controlling a running worker.
pub struct WorkerHandle {
    shutdown_tx: mpsc::Sender<()>,
    event_rx: broadcast::Receiver<WorkerEvent>,
}

impl WorkerHandle {
    /// Signal the worker to shut down gracefully.
    pub async fn shutdown(&self) -> Result<()> {
        self.shutdown_tx
            .send(())
            .await
            .map_err(|_| lexiclass_core::Error::Internal("Failed to send shutdown signal".into()))
    }

    /// Get a receiver for worker events.
    pub fn events(&self) -> broadcast::Receiver<WorkerEvent> {
        self.event_rx.resubscribe()
    }
}

/// Task worker that processes tasks from the queue.
pub struct TaskWorker {
    db: Arc<Database>,
    config: WorkerConfig,
    executors: Arc<RwLock<HashMap<&'static str, Arc<dyn TaskExecutor>>>>,
    event_tx: broadcast::Sender<WorkerEvent>,
}

impl TaskWorker {
    /// Create a new task worker.
    pub fn new(db: Arc<Database>, config: WorkerConfig) -> Self {
        let (event_tx, _) = broadcast::channel(EVENT_BUS_CAPACITY);
        Self {
            db,
            config,
            executors: Arc::new(RwLock::new(HashMap::new())),
            event_tx,
        }
    }

    /// Register an executor for its task name.
    pub async fn register_executor<E: TaskExecutor + 'static>(&self, executor: E) {
        let task_name = executor.task_name();
        let mut executors = self.executors.write().await;
        executors.insert(task_name, Arc::new(executor));
        debug!(task_name, "Registered task executor");
    }

    /// Start the worker and return a handle for control.
    pub fn start(self) -> WorkerHandle {
        let (shutdown_tx, mut shutdown_rx) = mpsc::channel(1);
        let event_rx = self.event_tx.subscribe();

        tokio::spawn(async move {
            self.run(&mut shutdown_rx).await;
        });

        WorkerHandle {
            shutdown_tx,
            event_rx,
        }
    }

    /// Run the worker loop with concurrent task processing.
    ///
    /// Claims up to `max_concurrent_tasks` at a time and processes them
    /// concurrently. Waits on the queue notify (bounded by the poll
    /// interval) only when no work was claimed.
    #[instrument(skip(self, shutdown_rx))]
    async fn run(&self, shutdown_rx: &mut mpsc::Receiver<()>) {
        if !self.config.enabled {
            info!("Task worker is disabled, not starting");
            return;
        }

        info!(
            poll_interval_ms = self.config.poll_interval_ms,
            max_concurrent = self.config.max_concurrent_tasks,
            "Task worker started"
        );

        let _ = self.event_tx.send(WorkerEvent::WorkerStarted);

        let poll_interval = Duration::from_millis(self.config.poll_interval_ms);
        let max_concurrent = self.config.max_concurrent_tasks;

        loop {
            if shutdown_rx.try_recv().is_ok() {
                info!("Task worker received shutdown signal");
                break;
            }

            let mut claimed = 0;
            let mut tasks = tokio::task::JoinSet::new();

            for _ in 0..max_concurrent {
                match self.claim_task().await {
                    Some(task) => {
                        claimed += 1;
                        let worker = self.clone_refs();
                        tasks.spawn(async move {
                            worker.execute_task(task).await;
                        });
                    }
                    None => break,
                }
            }

            if claimed == 0 {
                tokio::select! {
                    _ = shutdown_rx.recv() => {
                        info!("Task worker received shutdown signal");
                        break;
                    }
                    _ = self.db.tasks.wait_for_work(poll_interval) => {}
                }
            } else {
                debug!(claimed, "Processing concurrent task batch");
                while let Some(result) = tasks.join_next().await {
                    if let Err(e) = result {
                        error!(error = ?e, "Task execution panicked");
                    }
                }
                // No sleep, immediately try to claim more tasks.
            }
        }

        let _ = self.event_tx.send(WorkerEvent::WorkerStopped);
        info!("Task worker stopped");
    }

    /// Claim the next available task without processing it.
    async fn claim_task(&self) -> Option<Task> {
        // Empty queue list claims from every queue.
        match self.db.tasks.claim_next(&[]).await {
            Ok(Some(task)) => Some(task),
            Ok(None) => None,
            Err(e) => {
                error!(error = ?e, "Failed to claim task");
                None
            }
        }
    }

    /// Clone references needed for spawned task execution.
    fn clone_refs(&self) -> TaskWorkerRef {
        TaskWorkerRef {
            db: self.db.clone(),
            executors: self.executors.clone(),
            event_tx: self.event_tx.clone(),
        }
    }

    /// Get a receiver for worker events.
    pub fn events(&self) -> broadcast::Receiver<WorkerEvent> {
        self.event_tx.subscribe()
    }

    /// Get the pending task count.
    pub async fn pending_count(&self) -> Result<i64> {
        self.db.tasks.pending_count().await
    }
}

/// Lightweight reference bundle for executing a single task in a spawned
/// tokio task.
struct TaskWorkerRef {
    db: Arc<Database>,
    executors: Arc<RwLock<HashMap<&'static str, Arc<dyn TaskExecutor>>>>,
    event_tx: broadcast::Sender<WorkerEvent>,
}

impl TaskWorkerRef {
    /// Execute a single claimed task.
    async fn execute_task(self, task: Task) {
        let start = Instant::now();
        let task_id = task.id;
        let task_name = task.task_name.clone();

        info!(%task_id, %task_name, "Processing task");

        let _ = self.event_tx.send(WorkerEvent::TaskStarted {
            task_id,
            task_name: task_name.clone(),
        });

        let executor = {
            let executors = self.executors.read().await;
            executors.get(task_name.as_str()).cloned()
        };

        let outcome = match executor {
            Some(executor) => {
                let event_tx = self.event_tx.clone();
                let progress_db = self.db.clone();
                let ctx = TaskContext::new(task).with_progress_callback(move |percent| {
                    let _ = event_tx.send(WorkerEvent::TaskProgress { task_id, percent });
                    let db = progress_db.clone();
                    tokio::spawn(async move {
                        if let Err(e) = db.tasks.update_progress(task_id, percent).await {
                            warn!(error = ?e, %task_id, "Failed to persist task progress");
                        }
                    });
                });

                let task_timeout = Duration::from_secs(defaults::TASK_TIMEOUT_SECS);
                match tokio::time::timeout(task_timeout, executor.execute(ctx)).await {
                    Ok(outcome) => outcome,
                    Err(_) => {
                        warn!(
                            %task_id,
                            %task_name,
                            "Task exceeded timeout of {}s",
                            defaults::TASK_TIMEOUT_SECS
                        );
                        TaskOutcome::Failed(format!(
                            "Task exceeded timeout of {}s",
                            defaults::TASK_TIMEOUT_SECS
                        ))
                    }
                }
            }
            None => {
                warn!(%task_name, "No executor registered for task name");
                TaskOutcome::Failed(format!("No executor for task: {}", task_name))
            }
        };

        match outcome {
            TaskOutcome::Success(result_data) => {
                if let Err(e) = self.db.tasks.complete(task_id, result_data).await {
                    error!(error = ?e, %task_id, "Failed to mark task as completed");
                } else {
                    info!(
                        %task_id,
                        %task_name,
                        duration_ms = start.elapsed().as_millis() as u64,
                        "Task completed successfully"
                    );
                    let _ = self.event_tx.send(WorkerEvent::TaskCompleted {
                        task_id,
                        task_name,
                    });
                }
            }
            TaskOutcome::Failed(error) => {
                // Failures are recorded as structured faults so status
                // readers can extract the message from args[0].
                let fault = json!({ "args": [error.clone()] });
                if let Err(e) = self.db.tasks.fail(task_id, fault).await {
                    error!(error = ?e, %task_id, "Failed to mark task as failed");
                } else {
                    warn!(
                        %task_id,
                        %task_name,
                        %error,
                        duration_ms = start.elapsed().as_millis() as u64,
                        "Task failed"
                    );
                    let _ = self.event_tx.send(WorkerEvent::TaskFailed {
                        task_id,
                        task_name,
                        error,
                    });
                }
            }
        }
    }
}

/// Builder for creating a task worker with executors.
pub struct WorkerBuilder {
    db: Arc<Database>,
    config: WorkerConfig,
    executors: Vec<Box<dyn TaskExecutor>>,
}

impl WorkerBuilder {
    /// Create a new worker builder.
    pub fn new(db: Arc<Database>) -> Self {
        Self {
            db,
            config: WorkerConfig::default(),
            executors: Vec::new(),
        }
    }

    /// Set the worker configuration.
    pub fn with_config(mut self, config: WorkerConfig) -> Self {
        self.config = config;
        self
    }

    /// Add an executor.
    pub fn with_executor<E: TaskExecutor + 'static>(mut self, executor: E) -> Self {
        self.executors.push(Box::new(executor));
        self
    }

    /// Build and return the worker.
    pub async fn build(self) -> TaskWorker {
        let worker = TaskWorker::new(self.db, self.config);

        for executor in self.executors {
            let task_name = executor.task_name();
            let mut executors = worker.executors.write().await;
            executors.insert(task_name, Arc::from(executor));
        }

        worker
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_worker_config_default() {
        let config = WorkerConfig::default();
        assert_eq!(config.poll_interval_ms, defaults::WORKER_POLL_INTERVAL_MS);
        assert_eq!(config.max_concurrent_tasks, 4);
        assert!(config.enabled);
    }

    #[test]
    fn test_worker_config_builder() {
        let config = WorkerConfig::default()
            .with_poll_interval(1000)
            .with_max_concurrent(8)
            .with_enabled(false);

        assert_eq!(config.poll_interval_ms, 1000);
        assert_eq!(config.max_concurrent_tasks, 8);
        assert!(!config.enabled);
    }

    #[test]
    fn test_worker_config_chaining_order_independence() {
        let config1 = WorkerConfig::default()
            .with_enabled(false)
            .with_max_concurrent(10)
            .with_poll_interval(3000);

        let config2 = WorkerConfig::default()
            .with_poll_interval(3000)
            .with_enabled(false)
            .with_max_concurrent(10);

        assert_eq!(config1.poll_interval_ms, config2.poll_interval_ms);
        assert_eq!(config1.max_concurrent_tasks, config2.max_concurrent_tasks);
        assert_eq!(config1.enabled, config2.enabled);
    }

    #[test]
    fn test_worker_event_task_failed_carries_error() {
        let task_id = Uuid::new_v4();
        let event = WorkerEvent::TaskFailed {
            task_id,
            task_name: "lexiclass.train_field".to_string(),
            error: "no training data".to_string(),
        };

        match event {
            WorkerEvent::TaskFailed {
                task_id: id,
                task_name,
                error,
            } => {
                assert_eq!(id, task_id);
                assert_eq!(task_name, "lexiclass.train_field");
                assert_eq!(error, "no training data");
            }
            _ => panic!("Wrong event variant"),
        }
    }

    #[test]
    fn test_worker_event_clone_and_debug() {
        let event = WorkerEvent::TaskStarted {
            task_id: Uuid::new_v4(),
            task_name: "lexiclass.index_project".to_string(),
        };
        let copied = event.clone();
        let debug_str = format!("{:?}", copied);
        assert!(debug_str.contains("TaskStarted"));
        assert!(debug_str.contains("lexiclass.index_project"));
    }
}
