//! # lexiclass-core
//!
//! Core types, traits, and abstractions for the LexiClass dispatch
//! subsystem.
//!
//! This crate provides the entity model, the error taxonomy, the queue
//! policy registry, the pure half of the bulk mutation engine, and the
//! collaborator traits (broker, content store) that the other crates
//! depend on.

pub mod bulk;
pub mod defaults;
pub mod error;
pub mod logging;
pub mod models;
pub mod queue;
pub mod traits;

// Re-export commonly used types at crate root
pub use bulk::{check_batch_size, BulkOutcome, BulkSelection, IdRange, ItemOutcome};
pub use error::{Error, Result};
pub use models::*;
pub use queue::{validate_registry, QueuePolicy, RateLimit, RetryPolicy, WorkCategory};
pub use traits::{BrokerTaskState, ContentStore, SubmitTask, TaskBroker};
