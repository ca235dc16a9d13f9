//! Queue policy registry.
//!
//! Static mapping from a work category to the broker-level routing
//! attributes applied to every submission in that category. This table is
//! pure configuration with no runtime behavior; a missing entry is a
//! startup-time configuration error, never a runtime one.

use std::collections::HashMap;
use std::time::Duration;

use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// A named class of asynchronous operation with its own queue policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkCategory {
    Indexing,
    Training,
    Prediction,
}

impl WorkCategory {
    /// All categories used anywhere in the system.
    pub const ALL: [WorkCategory; 3] = [
        WorkCategory::Indexing,
        WorkCategory::Training,
        WorkCategory::Prediction,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            WorkCategory::Indexing => "indexing",
            WorkCategory::Training => "training",
            WorkCategory::Prediction => "prediction",
        }
    }
}

/// Broker-side redelivery policy for a work category.
///
/// Governs broker retries of failed work, not caller-side retries. A caller
/// that needs guaranteed-once submission must make the input idempotent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetryPolicy {
    pub max_retries: i32,
    /// Delay before the first redelivery.
    pub interval_start: Duration,
    /// Ceiling on the backoff interval.
    pub interval_max: Duration,
    pub backoff_enabled: bool,
    pub jitter_enabled: bool,
}

/// Rate limit expression, celery-style: `"30/m"` = 30 operations per minute.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RateLimit {
    pub operations: u32,
    pub per: Duration,
}

impl RateLimit {
    /// Parse an expression of the form `N/s`, `N/m`, or `N/h`.
    pub fn parse(expr: &str) -> Result<Self> {
        let (count, unit) = expr
            .split_once('/')
            .ok_or_else(|| Error::Config(format!("malformed rate limit: {expr:?}")))?;
        let operations: u32 = count
            .parse()
            .map_err(|_| Error::Config(format!("malformed rate limit count: {expr:?}")))?;
        if operations == 0 {
            return Err(Error::Config(format!("rate limit must be non-zero: {expr:?}")));
        }
        let per = match unit {
            "s" => Duration::from_secs(1),
            "m" => Duration::from_secs(60),
            "h" => Duration::from_secs(3600),
            _ => return Err(Error::Config(format!("unknown rate limit unit: {expr:?}"))),
        };
        Ok(Self { operations, per })
    }

    /// Render back to the `N/unit` expression form.
    pub fn as_expr(&self) -> String {
        let unit = match self.per.as_secs() {
            1 => "s",
            60 => "m",
            _ => "h",
        };
        format!("{}/{}", self.operations, unit)
    }
}

/// The routing attributes applied to every submission of a work category.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct QueuePolicy {
    pub category: WorkCategory,
    /// Broker queue name.
    pub queue: &'static str,
    pub routing_key: &'static str,
    /// Higher priority is served first within a queue.
    pub priority: i32,
    pub rate_limit: RateLimit,
    pub retry: RetryPolicy,
}

impl QueuePolicy {
    /// Look up the registry entry for a category. Total by construction:
    /// every category has exactly one entry.
    pub fn for_category(category: WorkCategory) -> &'static QueuePolicy {
        REGISTRY
            .get(&category)
            .expect("queue policy registry covers every work category")
    }
}

static REGISTRY: Lazy<HashMap<WorkCategory, QueuePolicy>> = Lazy::new(|| {
    let entries = [
        QueuePolicy {
            category: WorkCategory::Indexing,
            queue: "lexiclass.indexing",
            routing_key: "task.indexing",
            priority: 5,
            rate_limit: RateLimit::parse("30/m").expect("static rate limit"),
            retry: RetryPolicy {
                max_retries: 3,
                interval_start: Duration::from_secs(1),
                interval_max: Duration::from_secs(60),
                backoff_enabled: true,
                jitter_enabled: true,
            },
        },
        QueuePolicy {
            category: WorkCategory::Training,
            queue: "lexiclass.training",
            routing_key: "task.training",
            priority: 3,
            rate_limit: RateLimit::parse("10/m").expect("static rate limit"),
            retry: RetryPolicy {
                max_retries: 2,
                interval_start: Duration::from_secs(5),
                interval_max: Duration::from_secs(300),
                backoff_enabled: true,
                jitter_enabled: true,
            },
        },
        QueuePolicy {
            category: WorkCategory::Prediction,
            queue: "lexiclass.prediction",
            routing_key: "task.prediction",
            priority: 7,
            rate_limit: RateLimit::parse("60/m").expect("static rate limit"),
            retry: RetryPolicy {
                max_retries: 3,
                interval_start: Duration::from_secs(1),
                interval_max: Duration::from_secs(60),
                backoff_enabled: true,
                jitter_enabled: true,
            },
        },
    ];
    entries.into_iter().map(|p| (p.category, p)).collect()
});

/// Startup-time configuration check: every work category has exactly one
/// registry entry, and each entry's category matches its key.
pub fn validate_registry() -> Result<()> {
    for category in WorkCategory::ALL {
        let policy = REGISTRY.get(&category).ok_or_else(|| {
            Error::Config(format!("no queue policy for category {:?}", category))
        })?;
        if policy.category != category {
            return Err(Error::Config(format!(
                "queue policy keyed under {:?} declares category {:?}",
                category, policy.category
            )));
        }
    }
    if REGISTRY.len() != WorkCategory::ALL.len() {
        return Err(Error::Config(format!(
            "queue policy registry has {} entries for {} categories",
            REGISTRY.len(),
            WorkCategory::ALL.len()
        )));
    }
    Ok(())
}
