//! Field and field class repository implementation.

use chrono::Utc;
use sqlx::{Pool, Postgres, Row};
use uuid::Uuid;

use lexiclass_core::{Error, Field, FieldClass, Result};

/// PostgreSQL repository for classification fields and their classes.
pub struct PgFieldRepository {
    pool: Pool<Postgres>,
}

impl PgFieldRepository {
    pub fn new(pool: Pool<Postgres>) -> Self {
        Self { pool }
    }

    fn parse_field_row(row: sqlx::postgres::PgRow) -> Field {
        Field {
            id: row.get("id"),
            project_id: row.get("project_id"),
            name: row.get("name"),
            description: row.get("description"),
            created_at: row.get("created_at"),
        }
    }

    fn parse_class_row(row: sqlx::postgres::PgRow) -> FieldClass {
        FieldClass {
            id: row.get("id"),
            field_id: row.get("field_id"),
            name: row.get("name"),
            created_at: row.get("created_at"),
        }
    }

    pub async fn create(
        &self,
        project_id: i64,
        name: &str,
        description: Option<&str>,
    ) -> Result<Field> {
        let row = sqlx::query(
            "INSERT INTO field (id, project_id, name, description, created_at)
             VALUES ($1, $2, $3, $4, $5)
             RETURNING id, project_id, name, description, created_at",
        )
        .bind(Uuid::new_v4())
        .bind(project_id)
        .bind(name)
        .bind(description)
        .bind(Utc::now())
        .fetch_one(&self.pool)
        .await
        .map_err(Error::Database)?;

        Ok(Self::parse_field_row(row))
    }

    pub async fn get(&self, field_id: Uuid) -> Result<Option<Field>> {
        let row = sqlx::query(
            "SELECT id, project_id, name, description, created_at
             FROM field WHERE id = $1",
        )
        .bind(field_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(Error::Database)?;

        Ok(row.map(Self::parse_field_row))
    }

    pub async fn require(&self, field_id: Uuid) -> Result<Field> {
        self.get(field_id)
            .await?
            .ok_or_else(|| Error::NotFound(format!("field {}", field_id)))
    }

    pub async fn list_for_project(&self, project_id: i64) -> Result<Vec<Field>> {
        let rows = sqlx::query(
            "SELECT id, project_id, name, description, created_at
             FROM field WHERE project_id = $1
             ORDER BY created_at ASC",
        )
        .bind(project_id)
        .fetch_all(&self.pool)
        .await
        .map_err(Error::Database)?;

        Ok(rows.into_iter().map(Self::parse_field_row).collect())
    }

    pub async fn delete(&self, field_id: Uuid) -> Result<bool> {
        let result = sqlx::query("DELETE FROM field WHERE id = $1")
            .bind(field_id)
            .execute(&self.pool)
            .await
            .map_err(Error::Database)?;
        Ok(result.rows_affected() > 0)
    }

    /// Create a class under a field. Name is unique within the field.
    pub async fn create_class(&self, field_id: Uuid, name: &str) -> Result<FieldClass> {
        let row = sqlx::query(
            "INSERT INTO field_class (id, field_id, name, created_at)
             VALUES ($1, $2, $3, $4)
             RETURNING id, field_id, name, created_at",
        )
        .bind(Uuid::new_v4())
        .bind(field_id)
        .bind(name)
        .bind(Utc::now())
        .fetch_one(&self.pool)
        .await
        .map_err(Error::Database)?;

        Ok(Self::parse_class_row(row))
    }

    pub async fn get_class(&self, class_id: Uuid) -> Result<Option<FieldClass>> {
        let row = sqlx::query(
            "SELECT id, field_id, name, created_at
             FROM field_class WHERE id = $1",
        )
        .bind(class_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(Error::Database)?;

        Ok(row.map(Self::parse_class_row))
    }

    /// Find a class by name within a field, creating it when absent.
    ///
    /// ON CONFLICT keeps this race-free when concurrent bulk label loads
    /// introduce the same class name at once.
    pub async fn get_or_create_class(&self, field_id: Uuid, name: &str) -> Result<FieldClass> {
        let row = sqlx::query(
            "INSERT INTO field_class (id, field_id, name, created_at)
             VALUES ($1, $2, $3, $4)
             ON CONFLICT (field_id, name) DO UPDATE SET name = EXCLUDED.name
             RETURNING id, field_id, name, created_at",
        )
        .bind(Uuid::new_v4())
        .bind(field_id)
        .bind(name)
        .bind(Utc::now())
        .fetch_one(&self.pool)
        .await
        .map_err(Error::Database)?;

        Ok(Self::parse_class_row(row))
    }

    pub async fn list_classes(&self, field_id: Uuid) -> Result<Vec<FieldClass>> {
        let rows = sqlx::query(
            "SELECT id, field_id, name, created_at
             FROM field_class WHERE field_id = $1
             ORDER BY name ASC",
        )
        .bind(field_id)
        .fetch_all(&self.pool)
        .await
        .map_err(Error::Database)?;

        Ok(rows.into_iter().map(Self::parse_class_row).collect())
    }
}
