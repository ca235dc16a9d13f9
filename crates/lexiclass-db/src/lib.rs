//! # lexiclass-db
//!
//! PostgreSQL persistence layer for the LexiClass dispatch subsystem.
//!
//! This crate provides:
//! - Connection pool management
//! - Repository implementations for projects, documents, fields, labels,
//!   models, and predictions
//! - The task queue acting as the broker behind [`TaskBroker`]
//! - Filesystem-backed document content storage
//!
//! ## Example
//!
//! ```rust,ignore
//! use lexiclass_db::Database;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let db = Database::connect("postgres://localhost/lexiclass", "/var/lexiclass/content").await?;
//!
//!     let project = db.projects.create("contracts", None).await?;
//!     println!("Created project: {}", project.id);
//!     Ok(())
//! }
//! ```

pub mod content_store;
pub mod documents;
pub mod fields;
pub mod labels;
pub mod models;
pub mod pool;
pub mod predictions;
pub mod projects;
pub mod tasks;

// Test fixtures for integration tests.
// Always compiled so integration tests (in tests/) can use DEFAULT_TEST_DATABASE_URL.
pub mod test_fixtures;

// Re-export core types
pub use lexiclass_core::*;

// Re-export repository implementations
pub use content_store::{content_path, FilesystemContentStore};
pub use documents::{DocumentFilter, NewDocument, PgDocumentRepository};
pub use fields::PgFieldRepository;
pub use labels::{NewLabel, PgLabelRepository};
pub use models::PgModelRepository;
pub use pool::{create_pool, create_pool_with_config, PoolConfig};
pub use predictions::{NewPrediction, PgPredictionRepository};
pub use projects::PgProjectRepository;
pub use tasks::PgTaskQueue;

use std::sync::Arc;

/// Combined database context with all repositories.
pub struct Database {
    /// The underlying connection pool.
    pub pool: sqlx::Pool<sqlx::Postgres>,
    /// Project repository.
    pub projects: PgProjectRepository,
    /// Document repository, coupled to the content store.
    pub documents: PgDocumentRepository,
    /// Field and field class repository.
    pub fields: PgFieldRepository,
    /// Document label repository.
    pub labels: PgLabelRepository,
    /// Model repository with version allocation.
    pub models: PgModelRepository,
    /// Prediction repository.
    pub predictions: PgPredictionRepository,
    /// Task queue acting as the broker.
    pub tasks: Arc<PgTaskQueue>,
    /// Shared content store handle.
    pub content_store: Arc<dyn ContentStore>,
}

impl Database {
    /// Connect with default pool configuration and a filesystem content
    /// store rooted at `content_base`.
    pub async fn connect(database_url: &str, content_base: &str) -> Result<Self> {
        let pool = create_pool(database_url).await?;
        Ok(Self::from_pool(pool, content_base))
    }

    /// Build the repository set over an existing pool.
    pub fn from_pool(pool: sqlx::Pool<sqlx::Postgres>, content_base: &str) -> Self {
        let content_store: Arc<dyn ContentStore> =
            Arc::new(FilesystemContentStore::new(content_base));
        Self {
            projects: PgProjectRepository::new(pool.clone()),
            documents: PgDocumentRepository::new(pool.clone(), content_store.clone()),
            fields: PgFieldRepository::new(pool.clone()),
            labels: PgLabelRepository::new(pool.clone()),
            models: PgModelRepository::new(pool.clone()),
            predictions: PgPredictionRepository::new(pool.clone()),
            tasks: Arc::new(PgTaskQueue::new(pool.clone())),
            content_store,
            pool,
        }
    }
}
