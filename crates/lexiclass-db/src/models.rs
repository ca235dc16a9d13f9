//! Model repository implementation.
//!
//! Model versions are allocated per field under an advisory transaction
//! lock, so concurrent trainings can never observe the same MAX(version).
//! The unique (field_id, version) constraint stands as a backstop. Versions
//! are never reused: a failed training burns its number.

use chrono::Utc;
use serde_json::Value as JsonValue;
use sqlx::{Pool, Postgres, Row};
use tracing::{debug, info};
use uuid::Uuid;

use lexiclass_core::{defaults, Error, Model, ModelStatus, Result};

/// PostgreSQL model repository.
pub struct PgModelRepository {
    pool: Pool<Postgres>,
}

impl PgModelRepository {
    pub fn new(pool: Pool<Postgres>) -> Self {
        Self { pool }
    }

    fn parse_row(row: sqlx::postgres::PgRow) -> Model {
        let status: String = row.get("status");
        Model {
            id: row.get("id"),
            field_id: row.get("field_id"),
            version: row.get("version"),
            status: ModelStatus::parse(&status).unwrap_or(ModelStatus::Failed),
            accuracy: row.get("accuracy"),
            metrics: row.get("metrics"),
            trained_at: row.get("trained_at"),
            created_at: row.get("created_at"),
        }
    }

    /// Allocate the next version for a field and insert a TRAINING row.
    ///
    /// The advisory lock serializes allocation per field within the
    /// transaction, so MAX(version) + 1 is race-free. The lock releases
    /// automatically at commit.
    pub async fn create_next_version(&self, field_id: Uuid) -> Result<Model> {
        let now = Utc::now();
        let mut tx = self.pool.begin().await.map_err(Error::Database)?;

        sqlx::query("SELECT pg_advisory_xact_lock(hashtextextended($1::text, 0))")
            .bind(field_id)
            .execute(&mut *tx)
            .await
            .map_err(Error::Database)?;

        let next_version: i32 = sqlx::query_scalar(
            "SELECT COALESCE(MAX(version), 0) + 1 FROM model WHERE field_id = $1",
        )
        .bind(field_id)
        .fetch_one(&mut *tx)
        .await
        .map_err(Error::Database)?;

        let row = sqlx::query(
            "INSERT INTO model (id, field_id, version, status, created_at)
             VALUES ($1, $2, $3, $4, $5)
             RETURNING id, field_id, version, status, accuracy, metrics, trained_at, created_at",
        )
        .bind(Uuid::new_v4())
        .bind(field_id)
        .bind(next_version)
        .bind(ModelStatus::Training.as_str())
        .bind(now)
        .fetch_one(&mut *tx)
        .await
        .map_err(Error::Database)?;

        tx.commit().await.map_err(Error::Database)?;

        let model = Self::parse_row(row);
        info!(
            subsystem = "db",
            component = "models",
            op = "create_next_version",
            field_id = %field_id,
            version = model.version,
            "Allocated model version"
        );
        Ok(model)
    }

    pub async fn get(&self, model_id: Uuid) -> Result<Option<Model>> {
        let row = sqlx::query(
            "SELECT id, field_id, version, status, accuracy, metrics, trained_at, created_at
             FROM model WHERE id = $1",
        )
        .bind(model_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(Error::Database)?;

        Ok(row.map(Self::parse_row))
    }

    pub async fn require(&self, model_id: Uuid) -> Result<Model> {
        self.get(model_id)
            .await?
            .ok_or_else(|| Error::NotFound(format!("model {}", model_id)))
    }

    /// The highest-versioned READY model for a field, if any.
    ///
    /// TRAINING and FAILED rows never surface here; prediction always runs
    /// against a model that finished training successfully.
    pub async fn latest_ready_for_field(&self, field_id: Uuid) -> Result<Option<Model>> {
        let row = sqlx::query(
            "SELECT id, field_id, version, status, accuracy, metrics, trained_at, created_at
             FROM model
             WHERE field_id = $1 AND status = $2
             ORDER BY version DESC
             LIMIT 1",
        )
        .bind(field_id)
        .bind(ModelStatus::Ready.as_str())
        .fetch_optional(&self.pool)
        .await
        .map_err(Error::Database)?;

        Ok(row.map(Self::parse_row))
    }

    /// Like [`latest_ready_for_field`](Self::latest_ready_for_field) but an
    /// absent model is an error, for callers that cannot proceed without one.
    pub async fn require_latest_ready(&self, field_id: Uuid) -> Result<Model> {
        self.latest_ready_for_field(field_id)
            .await?
            .ok_or(Error::NoReadyModel(field_id))
    }

    pub async fn list_for_field(&self, field_id: Uuid) -> Result<Vec<Model>> {
        let rows = sqlx::query(
            "SELECT id, field_id, version, status, accuracy, metrics, trained_at, created_at
             FROM model WHERE field_id = $1
             ORDER BY version DESC",
        )
        .bind(field_id)
        .fetch_all(&self.pool)
        .await
        .map_err(Error::Database)?;

        Ok(rows.into_iter().map(Self::parse_row).collect())
    }

    /// Promote a TRAINING model to READY with its evaluation results.
    pub async fn mark_ready(
        &self,
        model_id: Uuid,
        accuracy: Option<f64>,
        metrics: Option<JsonValue>,
    ) -> Result<()> {
        let now = Utc::now();
        sqlx::query(
            "UPDATE model
             SET status = $1, accuracy = $2, metrics = $3, trained_at = $4
             WHERE id = $5",
        )
        .bind(ModelStatus::Ready.as_str())
        .bind(accuracy)
        .bind(&metrics)
        .bind(now)
        .bind(model_id)
        .execute(&self.pool)
        .await
        .map_err(Error::Database)?;
        Ok(())
    }

    /// Mark a TRAINING model FAILED. Its version number stays burned.
    pub async fn mark_failed(&self, model_id: Uuid, error: &str) -> Result<()> {
        sqlx::query(
            "UPDATE model
             SET status = $1, metrics = jsonb_build_object('error', $2::text)
             WHERE id = $3",
        )
        .bind(ModelStatus::Failed.as_str())
        .bind(error)
        .bind(model_id)
        .execute(&self.pool)
        .await
        .map_err(Error::Database)?;
        Ok(())
    }

    /// Delete all but the newest `keep` versions for a field.
    ///
    /// Retention counts versions regardless of status, so a newer FAILED
    /// row can displace an older READY one from the kept window. Returns
    /// the number of rows pruned.
    pub async fn prune_old_versions(&self, field_id: Uuid, keep: i64) -> Result<i64> {
        let keep = keep.max(defaults::MODEL_RETENTION_KEEP);
        let result = sqlx::query(
            "DELETE FROM model
             WHERE field_id = $1
               AND id NOT IN (
                   SELECT id FROM model
                   WHERE field_id = $1
                   ORDER BY version DESC
                   LIMIT $2
               )",
        )
        .bind(field_id)
        .bind(keep)
        .execute(&self.pool)
        .await
        .map_err(Error::Database)?;

        let pruned = result.rows_affected() as i64;
        if pruned > 0 {
            debug!(
                subsystem = "db",
                component = "models",
                op = "prune_old_versions",
                field_id = %field_id,
                pruned,
                "Pruned old model versions"
            );
        }
        Ok(pruned)
    }
}
