//! Task queue repository implementation.
//!
//! The queue doubles as the broker: submission inserts a pending row
//! carrying the full queue policy, workers claim with FOR UPDATE SKIP
//! LOCKED ordered by priority then age, and state queries read the same
//! rows back. Revocation is fire-and-forget, a single guarded UPDATE.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use serde_json::Value as JsonValue;
use sqlx::{Pool, Postgres, Row};
use tokio::sync::Notify;
use tracing::{debug, info};
use uuid::Uuid;

use lexiclass_core::{
    ActiveTask, BrokerState, BrokerTaskState, Error, Result, SubmitTask, Task, TaskBroker,
    TaskStatus,
};

/// PostgreSQL task queue, the broker backing the dispatch layer.
pub struct PgTaskQueue {
    pool: Pool<Postgres>,
    /// Notify handle for event-driven worker wake.
    notify: Arc<Notify>,
}

impl PgTaskQueue {
    /// Create a new PgTaskQueue with the given connection pool.
    pub fn new(pool: Pool<Postgres>) -> Self {
        Self {
            pool,
            notify: Arc::new(Notify::new()),
        }
    }

    /// Create a new PgTaskQueue sharing an existing notify handle.
    pub fn with_notify(pool: Pool<Postgres>, notify: Arc<Notify>) -> Self {
        Self { pool, notify }
    }

    /// Get the task notification handle for event-driven waking.
    pub fn task_notify(&self) -> Arc<Notify> {
        self.notify.clone()
    }

    fn parse_task_row(row: sqlx::postgres::PgRow) -> Task {
        let state: String = row.get("state");
        Task {
            id: row.get("id"),
            project_id: row.get("project_id"),
            task_name: row.get("task_name"),
            state: BrokerState::parse(&state).unwrap_or(BrokerState::Pending),
            queue: row.get("queue"),
            routing_key: row.get("routing_key"),
            priority: row.get("priority"),
            payload: row.get("payload"),
            result: row.get("result"),
            error: row.get("error"),
            progress_percent: row.get("progress_percent"),
            retry_count: row.get("retry_count"),
            max_retries: row.get("max_retries"),
            created_at: row.get("created_at"),
            started_at: row.get("started_at"),
            completed_at: row.get("completed_at"),
        }
    }

    /// Claim the next pending task across the given queues.
    ///
    /// Uses FOR UPDATE SKIP LOCKED so concurrent workers never block on
    /// each other. Queue filtering happens before locking; an empty slice
    /// claims from any queue. Ordering is priority DESC, created_at ASC.
    pub async fn claim_next(&self, queues: &[&str]) -> Result<Option<Task>> {
        let now = Utc::now();
        let queue_names: Vec<String> = queues.iter().map(|q| q.to_string()).collect();

        let row = sqlx::query(
            "UPDATE task_queue
             SET state = 'running', started_at = $1
             WHERE id = (
                 SELECT id FROM task_queue
                 WHERE state = 'pending'
                   AND (cardinality($2::text[]) = 0 OR queue = ANY($2))
                 ORDER BY priority DESC, created_at ASC
                 LIMIT 1
                 FOR UPDATE SKIP LOCKED
             )
             RETURNING id, project_id, task_name, state, queue, routing_key, priority,
                       payload, result, error, progress_percent, retry_count, max_retries,
                       created_at, started_at, completed_at",
        )
        .bind(now)
        .bind(&queue_names)
        .fetch_optional(&self.pool)
        .await
        .map_err(Error::Database)?;

        Ok(row.map(Self::parse_task_row))
    }

    /// Wait until a submission signals new work, or the timeout elapses.
    pub async fn wait_for_work(&self, timeout: std::time::Duration) {
        let _ = tokio::time::timeout(timeout, self.notify.notified()).await;
    }

    pub async fn update_progress(&self, task_id: Uuid, percent: i32) -> Result<()> {
        sqlx::query("UPDATE task_queue SET progress_percent = $1 WHERE id = $2")
            .bind(percent)
            .bind(task_id)
            .execute(&self.pool)
            .await
            .map_err(Error::Database)?;
        Ok(())
    }

    /// Mark a running task completed with its result.
    ///
    /// Guarded by state: a task revoked mid-run stays cancelled, the
    /// finishing worker's write matches no row.
    pub async fn complete(&self, task_id: Uuid, result: Option<JsonValue>) -> Result<()> {
        let now = Utc::now();
        let updated = sqlx::query(
            "UPDATE task_queue
             SET state = 'completed', completed_at = $1, result = $2, progress_percent = 100
             WHERE id = $3 AND state = 'running'",
        )
        .bind(now)
        .bind(&result)
        .bind(task_id)
        .execute(&self.pool)
        .await
        .map_err(Error::Database)?;

        debug!(
            subsystem = "db",
            component = "task_queue",
            op = "complete",
            task_id = %task_id,
            updated = updated.rows_affected() > 0,
            "Task completed"
        );
        Ok(())
    }

    /// Record a failed attempt.
    ///
    /// Below the retry ceiling the task re-enters the pending queue with
    /// an incremented retry count; at the ceiling it becomes failed. The
    /// captured fault is stored as JSON so status readers can apply the
    /// extraction rule uniformly. Both writes carry the same running-state
    /// guard as [`complete`](Self::complete), so a revoked task is never
    /// requeued or flipped to failed by a worker finishing late.
    pub async fn fail(&self, task_id: Uuid, error: JsonValue) -> Result<()> {
        let now = Utc::now();
        let mut tx = self.pool.begin().await.map_err(Error::Database)?;

        let (retry_count, max_retries): (i32, i32) =
            sqlx::query_as("SELECT retry_count, max_retries FROM task_queue WHERE id = $1")
                .bind(task_id)
                .fetch_one(&mut *tx)
                .await
                .map_err(Error::Database)?;

        let requeued = if retry_count < max_retries {
            let result = sqlx::query(
                "UPDATE task_queue
                 SET state = 'pending', retry_count = $1, error = $2,
                     started_at = NULL, progress_percent = 0
                 WHERE id = $3 AND state = 'running'",
            )
            .bind(retry_count + 1)
            .bind(&error)
            .bind(task_id)
            .execute(&mut *tx)
            .await
            .map_err(Error::Database)?;
            result.rows_affected() > 0
        } else {
            sqlx::query(
                "UPDATE task_queue
                 SET state = 'failed', completed_at = $1, error = $2
                 WHERE id = $3 AND state = 'running'",
            )
            .bind(now)
            .bind(&error)
            .bind(task_id)
            .execute(&mut *tx)
            .await
            .map_err(Error::Database)?;
            false
        };

        tx.commit().await.map_err(Error::Database)?;

        if requeued {
            // The re-queued attempt is immediately claimable.
            self.notify.notify_waiters();
        }
        Ok(())
    }

    pub async fn get(&self, task_id: Uuid) -> Result<Option<Task>> {
        let row = sqlx::query(
            "SELECT id, project_id, task_name, state, queue, routing_key, priority,
                    payload, result, error, progress_percent, retry_count, max_retries,
                    created_at, started_at, completed_at
             FROM task_queue WHERE id = $1",
        )
        .bind(task_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(Error::Database)?;

        Ok(row.map(Self::parse_task_row))
    }

    pub async fn list_for_project(&self, project_id: i64, limit: i64) -> Result<Vec<Task>> {
        let rows = sqlx::query(
            "SELECT id, project_id, task_name, state, queue, routing_key, priority,
                    payload, result, error, progress_percent, retry_count, max_retries,
                    created_at, started_at, completed_at
             FROM task_queue WHERE project_id = $1
             ORDER BY created_at DESC
             LIMIT $2",
        )
        .bind(project_id)
        .bind(limit)
        .fetch_all(&self.pool)
        .await
        .map_err(Error::Database)?;

        Ok(rows.into_iter().map(Self::parse_task_row).collect())
    }

    pub async fn pending_count(&self) -> Result<i64> {
        let count: i64 =
            sqlx::query_scalar("SELECT COUNT(*) FROM task_queue WHERE state = 'pending'")
                .fetch_one(&self.pool)
                .await
                .map_err(Error::Database)?;
        Ok(count)
    }

    /// Delete terminal tasks, keeping the most recent `keep_count` rows.
    /// Pending and running tasks are always kept.
    pub async fn cleanup(&self, keep_count: i64) -> Result<i64> {
        let result = sqlx::query(
            "DELETE FROM task_queue
             WHERE id NOT IN (
                 SELECT id FROM task_queue
                 ORDER BY
                     CASE WHEN state IN ('pending', 'running') THEN 0 ELSE 1 END,
                     completed_at DESC NULLS LAST
                 LIMIT $1
             )",
        )
        .bind(keep_count)
        .execute(&self.pool)
        .await
        .map_err(Error::Database)?;

        Ok(result.rows_affected() as i64)
    }
}

#[async_trait]
impl TaskBroker for PgTaskQueue {
    async fn submit(&self, task: SubmitTask) -> Result<Uuid> {
        let task_id = Uuid::new_v4();
        let now = Utc::now();

        sqlx::query(
            "INSERT INTO task_queue (id, project_id, task_name, state, queue, routing_key,
                                     priority, payload, max_retries, rate_limit, created_at)
             VALUES ($1, $2, $3, 'pending', $4, $5, $6, $7, $8, $9, $10)",
        )
        .bind(task_id)
        .bind(task.project_id)
        .bind(&task.task_name)
        .bind(task.policy.queue)
        .bind(task.policy.routing_key)
        .bind(task.policy.priority)
        .bind(&task.payload)
        .bind(task.policy.retry.max_retries)
        .bind(task.policy.rate_limit.as_expr())
        .bind(now)
        .execute(&self.pool)
        .await
        .map_err(Error::Database)?;

        info!(
            subsystem = "db",
            component = "task_queue",
            op = "submit",
            task_id = %task_id,
            project_id = task.project_id,
            task_name = %task.task_name,
            queue = task.policy.queue,
            priority = task.policy.priority,
            "Task submitted"
        );

        self.notify.notify_waiters();
        Ok(task_id)
    }

    async fn state(&self, task_id: Uuid) -> Result<Option<BrokerTaskState>> {
        let task = self.get(task_id).await?;
        Ok(task.map(|t| BrokerTaskState {
            state: t.state,
            retry_count: t.retry_count,
            result: t.result,
            error: t.error,
            started_at: t.started_at,
        }))
    }

    async fn revoke(&self, task_id: Uuid) -> Result<()> {
        let now = Utc::now();
        // Guarded single statement: terminal tasks are left untouched. The
        // caller decides whether revoking a finished task is an error.
        sqlx::query(
            "UPDATE task_queue
             SET state = 'cancelled', completed_at = $1
             WHERE id = $2 AND state IN ('pending', 'running')",
        )
        .bind(now)
        .bind(task_id)
        .execute(&self.pool)
        .await
        .map_err(Error::Database)?;

        info!(
            subsystem = "db",
            component = "task_queue",
            op = "revoke",
            task_id = %task_id,
            "Task revocation recorded"
        );
        Ok(())
    }

    async fn active_for_project(&self, project_id: i64) -> Result<Vec<ActiveTask>> {
        let rows = sqlx::query(
            "SELECT id, task_name, state, retry_count, started_at
             FROM task_queue
             WHERE project_id = $1 AND state = 'running'
             ORDER BY started_at ASC",
        )
        .bind(project_id)
        .fetch_all(&self.pool)
        .await
        .map_err(Error::Database)?;

        Ok(rows
            .into_iter()
            .map(|row| {
                let state: String = row.get("state");
                let broker_state = BrokerState::parse(&state).unwrap_or(BrokerState::Running);
                ActiveTask {
                    task_id: row.get("id"),
                    task_name: row.get("task_name"),
                    status: TaskStatus::from_broker(broker_state, row.get("retry_count")),
                    started_at: row.get("started_at"),
                }
            })
            .collect())
    }
}
