//! Document repository implementation.
//!
//! Document rows and document content live in different stores. Creation
//! commits the row first, then writes content; a failed content write
//! triggers a compensating row delete so no row ever points at missing
//! bytes. Deletion removes the row first and cleans content afterwards,
//! so an orphaned content file is the worst case, never a dangling row.

use std::sync::Arc;

use chrono::Utc;
use serde_json::Value as JsonValue;
use sqlx::{Acquire, Pool, Postgres, Row};
use tracing::{trace, warn};

use lexiclass_core::{
    check_batch_size, defaults, BulkOutcome, BulkSelection, ContentStore, Document, Error,
    IndexStatus, Result,
};

/// Input for creating one document.
#[derive(Debug, Clone)]
pub struct NewDocument {
    /// Caller-supplied id. Lets a bulk load be reapplied safely: an id
    /// that already exists fails with a conflict instead of inserting a
    /// duplicate row. `None` takes the next generated id.
    pub id: Option<i64>,
    pub content: String,
    pub metadata: Option<JsonValue>,
}

fn is_unique_violation(e: &sqlx::Error) -> bool {
    matches!(e, sqlx::Error::Database(db) if db.code().as_deref() == Some("23505"))
}

/// Filters for listing documents.
#[derive(Debug, Clone, Default)]
pub struct DocumentFilter {
    pub index_status: Option<IndexStatus>,
    pub limit: Option<i64>,
    pub offset: Option<i64>,
}

/// PostgreSQL document repository.
pub struct PgDocumentRepository {
    pool: Pool<Postgres>,
    content_store: Arc<dyn ContentStore>,
}

impl PgDocumentRepository {
    pub fn new(pool: Pool<Postgres>, content_store: Arc<dyn ContentStore>) -> Self {
        Self {
            pool,
            content_store,
        }
    }

    fn parse_row(row: sqlx::postgres::PgRow) -> Document {
        let status: String = row.get("index_status");
        Document {
            id: row.get("id"),
            project_id: row.get("project_id"),
            content_path: row.get("content_path"),
            metadata: row.get("metadata"),
            index_status: IndexStatus::parse(&status).unwrap_or(IndexStatus::NotIndexed),
            created_at: row.get("created_at"),
            updated_at: row.get("updated_at"),
        }
    }

    /// Create one document: insert the row, then write content.
    ///
    /// If the content write fails, the row is deleted again and the storage
    /// error is returned, leaving no row without bytes behind it. A
    /// caller-supplied id that already exists fails with [`Error::Conflict`].
    pub async fn create(&self, project_id: i64, input: NewDocument) -> Result<Document> {
        let now = Utc::now();
        let inserted = match input.id {
            Some(id) => {
                sqlx::query(
                    "INSERT INTO document (id, project_id, content_path, metadata, index_status, created_at, updated_at)
                     VALUES ($1, $2, '', $3, $4, $5, $5)
                     RETURNING id, project_id, content_path, metadata, index_status, created_at, updated_at",
                )
                .bind(id)
                .bind(project_id)
                .bind(&input.metadata)
                .bind(IndexStatus::NotIndexed.as_str())
                .bind(now)
                .fetch_one(&self.pool)
                .await
            }
            None => {
                sqlx::query(
                    "INSERT INTO document (project_id, content_path, metadata, index_status, created_at, updated_at)
                     VALUES ($1, '', $2, $3, $4, $4)
                     RETURNING id, project_id, content_path, metadata, index_status, created_at, updated_at",
                )
                .bind(project_id)
                .bind(&input.metadata)
                .bind(IndexStatus::NotIndexed.as_str())
                .bind(now)
                .fetch_one(&self.pool)
                .await
            }
        };

        let row = inserted.map_err(|e| match input.id {
            Some(id) if is_unique_violation(&e) => {
                Error::Conflict(format!("document {} already exists", id))
            }
            _ => Error::Database(e),
        })?;

        let mut document = Self::parse_row(row);

        let path = match self
            .content_store
            .store(project_id, document.id, input.content.as_bytes())
            .await
        {
            Ok(path) => path,
            Err(e) => {
                // Compensate: the row must not outlive a failed content write.
                let cleanup = sqlx::query("DELETE FROM document WHERE id = $1")
                    .bind(document.id)
                    .execute(&self.pool)
                    .await;
                if let Err(cleanup_err) = cleanup {
                    warn!(
                        subsystem = "db",
                        component = "documents",
                        document_id = document.id,
                        error = %cleanup_err,
                        "Compensating row delete failed after content write failure"
                    );
                }
                return Err(e);
            }
        };

        sqlx::query("UPDATE document SET content_path = $1 WHERE id = $2")
            .bind(&path)
            .bind(document.id)
            .execute(&self.pool)
            .await
            .map_err(Error::Database)?;

        document.content_path = path;
        Ok(document)
    }

    pub async fn get(&self, document_id: i64) -> Result<Option<Document>> {
        let row = sqlx::query(
            "SELECT id, project_id, content_path, metadata, index_status, created_at, updated_at
             FROM document WHERE id = $1",
        )
        .bind(document_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(Error::Database)?;

        Ok(row.map(Self::parse_row))
    }

    pub async fn require(&self, document_id: i64) -> Result<Document> {
        self.get(document_id)
            .await?
            .ok_or_else(|| Error::NotFound(format!("document {}", document_id)))
    }

    /// Read the stored content bytes for a document.
    pub async fn read_content(&self, document: &Document) -> Result<Vec<u8>> {
        self.content_store
            .read(document.project_id, document.id)
            .await
    }

    pub async fn list(&self, project_id: i64, filter: DocumentFilter) -> Result<Vec<Document>> {
        let limit = filter
            .limit
            .unwrap_or(defaults::PAGE_LIMIT)
            .min(defaults::PAGE_LIMIT_MAX);
        let offset = filter.offset.unwrap_or(0);

        let rows = match filter.index_status {
            Some(status) => sqlx::query(
                "SELECT id, project_id, content_path, metadata, index_status, created_at, updated_at
                 FROM document
                 WHERE project_id = $1 AND index_status = $2
                 ORDER BY id ASC
                 LIMIT $3 OFFSET $4",
            )
            .bind(project_id)
            .bind(status.as_str())
            .bind(limit)
            .bind(offset)
            .fetch_all(&self.pool)
            .await
            .map_err(Error::Database)?,
            None => sqlx::query(
                "SELECT id, project_id, content_path, metadata, index_status, created_at, updated_at
                 FROM document
                 WHERE project_id = $1
                 ORDER BY id ASC
                 LIMIT $2 OFFSET $3",
            )
            .bind(project_id)
            .bind(limit)
            .bind(offset)
            .fetch_all(&self.pool)
            .await
            .map_err(Error::Database)?,
        };

        Ok(rows.into_iter().map(Self::parse_row).collect())
    }

    pub async fn count_for_project(&self, project_id: i64) -> Result<i64> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM document WHERE project_id = $1")
            .bind(project_id)
            .fetch_one(&self.pool)
            .await
            .map_err(Error::Database)?;
        Ok(count)
    }

    /// Bulk-create documents with per-item isolation.
    ///
    /// Rows are inserted inside one transaction, each under its own
    /// savepoint, so a bad item fails alone without poisoning the batch.
    /// A caller-supplied id that already exists is a per-item conflict
    /// failure. Content is written after the commit, per successful row;
    /// a failed content write downgrades that item to a failure and
    /// deletes its row.
    pub async fn bulk_create(
        &self,
        project_id: i64,
        inputs: Vec<NewDocument>,
    ) -> Result<BulkOutcome> {
        check_batch_size(inputs.len(), defaults::MAX_DOCUMENT_CREATE_BATCH)?;

        let now = Utc::now();
        let mut outcome = BulkOutcome::new(inputs.len());
        let mut created: Vec<(i64, String)> = Vec::with_capacity(inputs.len());

        let mut tx = self.pool.begin().await.map_err(Error::Database)?;

        for input in &inputs {
            // Savepoint per item: nested begin issues SAVEPOINT on Postgres.
            let mut sp = tx.begin().await.map_err(Error::Database)?;
            let inserted = match input.id {
                Some(id) => {
                    sqlx::query_scalar::<_, i64>(
                        "INSERT INTO document (id, project_id, content_path, metadata, index_status, created_at, updated_at)
                         VALUES ($1, $2, '', $3, $4, $5, $5)
                         RETURNING id",
                    )
                    .bind(id)
                    .bind(project_id)
                    .bind(&input.metadata)
                    .bind(IndexStatus::NotIndexed.as_str())
                    .bind(now)
                    .fetch_one(&mut *sp)
                    .await
                }
                None => {
                    sqlx::query_scalar::<_, i64>(
                        "INSERT INTO document (project_id, content_path, metadata, index_status, created_at, updated_at)
                         VALUES ($1, '', $2, $3, $4, $4)
                         RETURNING id",
                    )
                    .bind(project_id)
                    .bind(&input.metadata)
                    .bind(IndexStatus::NotIndexed.as_str())
                    .bind(now)
                    .fetch_one(&mut *sp)
                    .await
                }
            };

            match inserted {
                Ok(id) => {
                    sp.commit().await.map_err(Error::Database)?;
                    trace!(
                        subsystem = "db",
                        component = "documents",
                        op = "bulk_create",
                        document_id = id,
                        "Row inserted"
                    );
                    created.push((id, input.content.clone()));
                    outcome.record_success(id);
                }
                Err(e) => {
                    let _ = sp.rollback().await;
                    let requested = input.id.unwrap_or(0);
                    if is_unique_violation(&e) {
                        outcome.record_failure(
                            requested,
                            format!("document {} already exists", requested),
                        );
                    } else {
                        outcome.record_failure(requested, e.to_string());
                    }
                }
            }
        }

        if let Err(e) = tx.commit().await {
            outcome.fail_all(&format!("Database error: {}", e));
            return Ok(outcome);
        }

        // Content writes happen outside the transaction; a failed write
        // compensates by deleting the row and demoting the item outcome.
        for (id, content) in created {
            match self
                .content_store
                .store(project_id, id, content.as_bytes())
                .await
            {
                Ok(path) => {
                    sqlx::query("UPDATE document SET content_path = $1 WHERE id = $2")
                        .bind(&path)
                        .bind(id)
                        .execute(&self.pool)
                        .await
                        .map_err(Error::Database)?;
                }
                Err(e) => {
                    let _ = sqlx::query("DELETE FROM document WHERE id = $1")
                        .bind(id)
                        .execute(&self.pool)
                        .await;
                    for item in &mut outcome.results {
                        if item.id == id && item.success {
                            item.success = false;
                            item.error = Some(e.to_string());
                            outcome.successful -= 1;
                            outcome.failed += 1;
                        }
                    }
                }
            }
        }

        Ok(outcome)
    }

    /// Bulk-delete documents selected by explicit ids and/or inclusive
    /// ranges, with per-item isolation.
    ///
    /// A missing id is an item-level failure, not a batch failure. Content
    /// files for deleted rows are removed best-effort after the commit.
    pub async fn bulk_delete(
        &self,
        project_id: i64,
        selection: &BulkSelection,
    ) -> Result<BulkOutcome> {
        let ids = selection.expand(defaults::MAX_DOCUMENT_DELETE_BATCH)?;

        let mut outcome = BulkOutcome::new(ids.len());
        let mut deleted: Vec<i64> = Vec::new();

        let mut tx = self.pool.begin().await.map_err(Error::Database)?;

        for id in &ids {
            let mut sp = tx.begin().await.map_err(Error::Database)?;
            let result = sqlx::query("DELETE FROM document WHERE id = $1 AND project_id = $2")
                .bind(id)
                .bind(project_id)
                .execute(&mut *sp)
                .await;

            match result {
                Ok(r) if r.rows_affected() > 0 => {
                    sp.commit().await.map_err(Error::Database)?;
                    deleted.push(*id);
                    outcome.record_success(*id);
                }
                Ok(_) => {
                    let _ = sp.rollback().await;
                    outcome.record_failure(*id, format!("document {} not found", id));
                }
                Err(e) => {
                    let _ = sp.rollback().await;
                    outcome.record_failure(*id, e.to_string());
                }
            }
        }

        if let Err(e) = tx.commit().await {
            outcome.fail_all(&format!("Database error: {}", e));
            return Ok(outcome);
        }

        for id in deleted {
            if let Err(e) = self.content_store.delete(project_id, id).await {
                warn!(
                    subsystem = "db",
                    component = "documents",
                    op = "bulk_delete",
                    document_id = id,
                    error = %e,
                    "Content cleanup failed for deleted document"
                );
            }
        }

        Ok(outcome)
    }

    /// Mark a project's documents PENDING ahead of an indexing run.
    /// An incremental run leaves already-INDEXED documents untouched.
    /// Returns the number of documents marked.
    pub async fn mark_indexing_pending(&self, project_id: i64, incremental: bool) -> Result<i64> {
        let now = Utc::now();
        let result = sqlx::query(
            "UPDATE document SET index_status = $1, updated_at = $2
             WHERE project_id = $3 AND ($4 IS FALSE OR index_status <> $5)",
        )
        .bind(IndexStatus::Pending.as_str())
        .bind(now)
        .bind(project_id)
        .bind(incremental)
        .bind(IndexStatus::Indexed.as_str())
        .execute(&self.pool)
        .await
        .map_err(Error::Database)?;
        Ok(result.rows_affected() as i64)
    }

    /// Record a successful indexing of one document.
    ///
    /// Guarded: only a PENDING document moves to INDEXED. A stale worker
    /// finishing after a newer request cannot regress the status.
    pub async fn complete_indexing(&self, document_id: i64) -> Result<bool> {
        let now = Utc::now();
        let result = sqlx::query(
            "UPDATE document SET index_status = $1, updated_at = $2
             WHERE id = $3 AND index_status = $4",
        )
        .bind(IndexStatus::Indexed.as_str())
        .bind(now)
        .bind(document_id)
        .bind(IndexStatus::Pending.as_str())
        .execute(&self.pool)
        .await
        .map_err(Error::Database)?;
        Ok(result.rows_affected() > 0)
    }

    /// Record a failed indexing of one document. Same guard as
    /// [`complete_indexing`](Self::complete_indexing).
    pub async fn fail_indexing(&self, document_id: i64) -> Result<bool> {
        let now = Utc::now();
        let result = sqlx::query(
            "UPDATE document SET index_status = $1, updated_at = $2
             WHERE id = $3 AND index_status = $4",
        )
        .bind(IndexStatus::Failed.as_str())
        .bind(now)
        .bind(document_id)
        .bind(IndexStatus::Pending.as_str())
        .execute(&self.pool)
        .await
        .map_err(Error::Database)?;
        Ok(result.rows_affected() > 0)
    }
}
