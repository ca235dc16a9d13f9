//! Prediction repository implementation.
//!
//! Predictions mirror labels: one row per (document, field) pair, replaced
//! in place by newer prediction runs. Each row records the model id and
//! version that produced it.

use chrono::Utc;
use serde_json::Value as JsonValue;
use sqlx::{Pool, Postgres, Row};
use uuid::Uuid;

use lexiclass_core::{Error, Prediction, Result};

/// Input for one prediction write.
#[derive(Debug, Clone)]
pub struct NewPrediction {
    pub document_id: i64,
    pub class_id: Uuid,
    pub model_id: Uuid,
    pub model_version: i32,
    pub confidence: Option<f64>,
    pub metadata: Option<JsonValue>,
}

/// PostgreSQL prediction repository.
pub struct PgPredictionRepository {
    pool: Pool<Postgres>,
}

impl PgPredictionRepository {
    pub fn new(pool: Pool<Postgres>) -> Self {
        Self { pool }
    }

    fn parse_row(row: sqlx::postgres::PgRow) -> Prediction {
        Prediction {
            id: row.get("id"),
            document_id: row.get("document_id"),
            field_id: row.get("field_id"),
            class_id: row.get("class_id"),
            model_id: row.get("model_id"),
            model_version: row.get("model_version"),
            confidence: row.get("confidence"),
            metadata: row.get("metadata"),
            created_at: row.get("created_at"),
            updated_at: row.get("updated_at"),
        }
    }

    /// Write a prediction, replacing any existing row for the same
    /// (document, field) pair.
    pub async fn upsert(&self, field_id: Uuid, prediction: &NewPrediction) -> Result<Prediction> {
        let now = Utc::now();
        let row = sqlx::query(
            "INSERT INTO prediction (id, document_id, field_id, class_id, model_id, model_version,
                                     confidence, metadata, created_at, updated_at)
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $9)
             ON CONFLICT (document_id, field_id) DO UPDATE
             SET class_id = EXCLUDED.class_id,
                 model_id = EXCLUDED.model_id,
                 model_version = EXCLUDED.model_version,
                 confidence = EXCLUDED.confidence,
                 metadata = EXCLUDED.metadata,
                 updated_at = EXCLUDED.updated_at
             RETURNING id, document_id, field_id, class_id, model_id, model_version,
                       confidence, metadata, created_at, updated_at",
        )
        .bind(Uuid::new_v4())
        .bind(prediction.document_id)
        .bind(field_id)
        .bind(prediction.class_id)
        .bind(prediction.model_id)
        .bind(prediction.model_version)
        .bind(prediction.confidence)
        .bind(&prediction.metadata)
        .bind(now)
        .fetch_one(&self.pool)
        .await
        .map_err(Error::Database)?;

        Ok(Self::parse_row(row))
    }

    pub async fn get_for_document_field(
        &self,
        document_id: i64,
        field_id: Uuid,
    ) -> Result<Option<Prediction>> {
        let row = sqlx::query(
            "SELECT id, document_id, field_id, class_id, model_id, model_version,
                    confidence, metadata, created_at, updated_at
             FROM prediction
             WHERE document_id = $1 AND field_id = $2",
        )
        .bind(document_id)
        .bind(field_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(Error::Database)?;

        Ok(row.map(Self::parse_row))
    }

    pub async fn list_for_document(&self, document_id: i64) -> Result<Vec<Prediction>> {
        let rows = sqlx::query(
            "SELECT id, document_id, field_id, class_id, model_id, model_version,
                    confidence, metadata, created_at, updated_at
             FROM prediction
             WHERE document_id = $1
             ORDER BY updated_at DESC",
        )
        .bind(document_id)
        .fetch_all(&self.pool)
        .await
        .map_err(Error::Database)?;

        Ok(rows.into_iter().map(Self::parse_row).collect())
    }

    pub async fn count_for_field(&self, field_id: Uuid) -> Result<i64> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM prediction WHERE field_id = $1")
            .bind(field_id)
            .fetch_one(&self.pool)
            .await
            .map_err(Error::Database)?;
        Ok(count)
    }
}
