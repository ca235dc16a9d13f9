//! Project repository implementation.

use chrono::Utc;
use serde_json::Value as JsonValue;
use sqlx::{Pool, Postgres, Row};

use lexiclass_core::{Error, Project, Result};

/// PostgreSQL project repository.
pub struct PgProjectRepository {
    pool: Pool<Postgres>,
}

impl PgProjectRepository {
    pub fn new(pool: Pool<Postgres>) -> Self {
        Self { pool }
    }

    fn parse_row(row: sqlx::postgres::PgRow) -> Project {
        Project {
            id: row.get("id"),
            name: row.get("name"),
            config: row.get("config"),
            index_status: row.get("index_status"),
            model_status: row.get("model_status"),
            last_indexed_at: row.get("last_indexed_at"),
            last_trained_at: row.get("last_trained_at"),
            created_at: row.get("created_at"),
            updated_at: row.get("updated_at"),
        }
    }

    pub async fn create(&self, name: &str, config: Option<JsonValue>) -> Result<Project> {
        let now = Utc::now();
        let row = sqlx::query(
            "INSERT INTO project (name, config, created_at, updated_at)
             VALUES ($1, $2, $3, $3)
             RETURNING id, name, config, index_status, model_status,
                       last_indexed_at, last_trained_at, created_at, updated_at",
        )
        .bind(name)
        .bind(&config)
        .bind(now)
        .fetch_one(&self.pool)
        .await
        .map_err(Error::Database)?;

        Ok(Self::parse_row(row))
    }

    pub async fn get(&self, project_id: i64) -> Result<Option<Project>> {
        let row = sqlx::query(
            "SELECT id, name, config, index_status, model_status,
                    last_indexed_at, last_trained_at, created_at, updated_at
             FROM project WHERE id = $1",
        )
        .bind(project_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(Error::Database)?;

        Ok(row.map(Self::parse_row))
    }

    /// Get a project or fail with NotFound. Used by submission paths that
    /// must reject work against a missing project.
    pub async fn require(&self, project_id: i64) -> Result<Project> {
        self.get(project_id)
            .await?
            .ok_or_else(|| Error::NotFound(format!("project {}", project_id)))
    }

    pub async fn list(&self, limit: i64, offset: i64) -> Result<Vec<Project>> {
        let rows = sqlx::query(
            "SELECT id, name, config, index_status, model_status,
                    last_indexed_at, last_trained_at, created_at, updated_at
             FROM project
             ORDER BY created_at DESC
             LIMIT $1 OFFSET $2",
        )
        .bind(limit)
        .bind(offset)
        .fetch_all(&self.pool)
        .await
        .map_err(Error::Database)?;

        Ok(rows.into_iter().map(Self::parse_row).collect())
    }

    /// Stamp the project-level index status and last-indexed timestamp.
    pub async fn set_index_status(&self, project_id: i64, status: &str) -> Result<()> {
        let now = Utc::now();
        sqlx::query(
            "UPDATE project
             SET index_status = $1, last_indexed_at = $2, updated_at = $2
             WHERE id = $3",
        )
        .bind(status)
        .bind(now)
        .bind(project_id)
        .execute(&self.pool)
        .await
        .map_err(Error::Database)?;
        Ok(())
    }

    /// Stamp the project-level model status and last-trained timestamp.
    pub async fn set_model_status(&self, project_id: i64, status: &str) -> Result<()> {
        let now = Utc::now();
        sqlx::query(
            "UPDATE project
             SET model_status = $1, last_trained_at = $2, updated_at = $2
             WHERE id = $3",
        )
        .bind(status)
        .bind(now)
        .bind(project_id)
        .execute(&self.pool)
        .await
        .map_err(Error::Database)?;
        Ok(())
    }

    /// Delete a project and everything under it (documents, fields, tasks
    /// cascade through foreign keys). Returns false when nothing existed.
    pub async fn delete(&self, project_id: i64) -> Result<bool> {
        let result = sqlx::query("DELETE FROM project WHERE id = $1")
            .bind(project_id)
            .execute(&self.pool)
            .await
            .map_err(Error::Database)?;
        Ok(result.rows_affected() > 0)
    }
}
