//! Document label repository implementation.
//!
//! Labels are upsert-on-conflict over the (document, field) unique pair:
//! assigning a label where one already exists replaces the class in place
//! instead of erroring, so re-labelling is always a single idempotent call.

use chrono::Utc;
use sqlx::{Acquire, Pool, Postgres, Row};
use uuid::Uuid;

use lexiclass_core::{
    check_batch_size, defaults, BulkOutcome, BulkSelection, DocumentLabel, Error, Result,
};

/// Input for one label assignment.
#[derive(Debug, Clone)]
pub struct NewLabel {
    pub document_id: i64,
    pub class_id: Uuid,
    pub is_training_data: bool,
}

/// PostgreSQL document label repository.
pub struct PgLabelRepository {
    pool: Pool<Postgres>,
}

impl PgLabelRepository {
    pub fn new(pool: Pool<Postgres>) -> Self {
        Self { pool }
    }

    fn parse_row(row: sqlx::postgres::PgRow) -> DocumentLabel {
        DocumentLabel {
            id: row.get("id"),
            document_id: row.get("document_id"),
            field_id: row.get("field_id"),
            class_id: row.get("class_id"),
            is_training_data: row.get("is_training_data"),
            created_at: row.get("created_at"),
            updated_at: row.get("updated_at"),
        }
    }

    /// Assign a label, replacing any existing label for the same
    /// (document, field) pair.
    pub async fn upsert(&self, field_id: Uuid, label: &NewLabel) -> Result<DocumentLabel> {
        let now = Utc::now();
        let row = sqlx::query(
            "INSERT INTO document_label (document_id, field_id, class_id, is_training_data, created_at, updated_at)
             VALUES ($1, $2, $3, $4, $5, $5)
             ON CONFLICT (document_id, field_id) DO UPDATE
             SET class_id = EXCLUDED.class_id,
                 is_training_data = EXCLUDED.is_training_data,
                 updated_at = EXCLUDED.updated_at
             RETURNING id, document_id, field_id, class_id, is_training_data, created_at, updated_at",
        )
        .bind(label.document_id)
        .bind(field_id)
        .bind(label.class_id)
        .bind(label.is_training_data)
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
    ) -> Result<Option<DocumentLabel>> {
        let row = sqlx::query(
            "SELECT id, document_id, field_id, class_id, is_training_data, created_at, updated_at
             FROM document_label
             WHERE document_id = $1 AND field_id = $2",
        )
        .bind(document_id)
        .bind(field_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(Error::Database)?;

        Ok(row.map(Self::parse_row))
    }

    /// List training labels for a field, newest first.
    pub async fn list_training_for_field(&self, field_id: Uuid) -> Result<Vec<DocumentLabel>> {
        let rows = sqlx::query(
            "SELECT id, document_id, field_id, class_id, is_training_data, created_at, updated_at
             FROM document_label
             WHERE field_id = $1 AND is_training_data = TRUE
             ORDER BY updated_at DESC
             LIMIT $2",
        )
        .bind(field_id)
        .bind(defaults::INTERNAL_FETCH_LIMIT)
        .fetch_all(&self.pool)
        .await
        .map_err(Error::Database)?;

        Ok(rows.into_iter().map(Self::parse_row).collect())
    }

    pub async fn count_training_for_field(&self, field_id: Uuid) -> Result<i64> {
        let count: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM document_label
             WHERE field_id = $1 AND is_training_data = TRUE",
        )
        .bind(field_id)
        .fetch_one(&self.pool)
        .await
        .map_err(Error::Database)?;
        Ok(count)
    }

    /// Bulk-upsert labels with per-item isolation.
    ///
    /// Each item runs under its own savepoint inside one transaction: a
    /// label against a missing document or class fails alone. The outcome
    /// reports per-item success keyed by document id.
    pub async fn bulk_upsert(&self, field_id: Uuid, labels: Vec<NewLabel>) -> Result<BulkOutcome> {
        check_batch_size(labels.len(), defaults::MAX_LABEL_BATCH)?;

        let now = Utc::now();
        let mut outcome = BulkOutcome::new(labels.len());
        let mut tx = self.pool.begin().await.map_err(Error::Database)?;

        for label in &labels {
            let mut sp = tx.begin().await.map_err(Error::Database)?;
            let result = sqlx::query(
                "INSERT INTO document_label (document_id, field_id, class_id, is_training_data, created_at, updated_at)
                 VALUES ($1, $2, $3, $4, $5, $5)
                 ON CONFLICT (document_id, field_id) DO UPDATE
                 SET class_id = EXCLUDED.class_id,
                     is_training_data = EXCLUDED.is_training_data,
                     updated_at = EXCLUDED.updated_at",
            )
            .bind(label.document_id)
            .bind(field_id)
            .bind(label.class_id)
            .bind(label.is_training_data)
            .bind(now)
            .execute(&mut *sp)
            .await;

            match result {
                Ok(_) => {
                    sp.commit().await.map_err(Error::Database)?;
                    outcome.record_success(label.document_id);
                }
                Err(e) => {
                    let _ = sp.rollback().await;
                    outcome.record_failure(label.document_id, e.to_string());
                }
            }
        }

        if let Err(e) = tx.commit().await {
            outcome.fail_all(&format!("Database error: {}", e));
        }

        Ok(outcome)
    }

    /// Bulk-delete labels for a field, selected by document ids and/or
    /// inclusive ranges. A document without a label for this field is an
    /// item-level failure.
    pub async fn bulk_delete(
        &self,
        field_id: Uuid,
        selection: &BulkSelection,
    ) -> Result<BulkOutcome> {
        let document_ids = selection.expand(defaults::MAX_LABEL_BATCH)?;

        let mut outcome = BulkOutcome::new(document_ids.len());
        let mut tx = self.pool.begin().await.map_err(Error::Database)?;

        for document_id in &document_ids {
            let mut sp = tx.begin().await.map_err(Error::Database)?;
            let result = sqlx::query(
                "DELETE FROM document_label WHERE document_id = $1 AND field_id = $2",
            )
            .bind(document_id)
            .bind(field_id)
            .execute(&mut *sp)
            .await;

            match result {
                Ok(r) if r.rows_affected() > 0 => {
                    sp.commit().await.map_err(Error::Database)?;
                    outcome.record_success(*document_id);
                }
                Ok(_) => {
                    let _ = sp.rollback().await;
                    outcome.record_failure(
                        *document_id,
                        format!("no label for document {} on this field", document_id),
                    );
                }
                Err(e) => {
                    let _ = sp.rollback().await;
                    outcome.record_failure(*document_id, e.to_string());
                }
            }
        }

        if let Err(e) = tx.commit().await {
            outcome.fail_all(&format!("Database error: {}", e));
        }

        Ok(outcome)
    }
}
