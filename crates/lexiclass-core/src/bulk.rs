//! Bulk mutation input assembly and aggregate reporting.
//!
//! The pure half of the bulk engine: range expansion, deduplication, and
//! ceiling checks happen here before any item is touched. Per-item isolated
//! processing lives with the repositories, which record into a
//! [`BulkOutcome`].

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// An inclusive id range in a bulk request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct IdRange {
    pub start: i64,
    pub end: i64,
}

/// A bulk request working set: explicit ids and/or inclusive ranges.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BulkSelection {
    #[serde(default)]
    pub ids: Vec<i64>,
    #[serde(default)]
    pub ranges: Vec<IdRange>,
}

impl BulkSelection {
    /// Expand ranges, union with explicit ids, and de-duplicate.
    ///
    /// Validation order matters: every range is checked for `start <= end`
    /// before any expansion, so an invalid range fails the whole request
    /// before a single item is processed. The expanded set is then checked
    /// against `max_items` and for emptiness.
    pub fn expand(&self, max_items: usize) -> Result<Vec<i64>> {
        for range in &self.ranges {
            if range.start > range.end {
                return Err(Error::InvalidRange {
                    start: range.start,
                    end: range.end,
                });
            }
        }

        let mut ids: Vec<i64> = self.ids.clone();
        for range in &self.ranges {
            // Guard the expansion itself: a huge range must fail as
            // BatchTooLarge without materializing billions of ids.
            let span = (range.end as i128 - range.start as i128) + 1;
            if span > max_items as i128 {
                return Err(Error::BatchTooLarge {
                    requested: span.min(usize::MAX as i128) as usize,
                    max: max_items,
                });
            }
            ids.extend(range.start..=range.end);
        }

        ids.sort_unstable();
        ids.dedup();

        if ids.is_empty() {
            return Err(Error::EmptyBatch);
        }
        if ids.len() > max_items {
            return Err(Error::BatchTooLarge {
                requested: ids.len(),
                max: max_items,
            });
        }
        Ok(ids)
    }
}

/// Check a payload batch (bulk create) against the size ceiling.
pub fn check_batch_size(len: usize, max_items: usize) -> Result<()> {
    if len == 0 {
        return Err(Error::EmptyBatch);
    }
    if len > max_items {
        return Err(Error::BatchTooLarge {
            requested: len,
            max: max_items,
        });
    }
    Ok(())
}

/// Outcome of one item within a bulk operation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ItemOutcome {
    pub id: i64,
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Aggregate result of a bulk operation.
///
/// Reflects exactly which items succeeded, even when the final commit step
/// fails (see [`BulkOutcome::fail_all`]).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BulkOutcome {
    pub total_requested: usize,
    pub successful: usize,
    pub failed: usize,
    pub results: Vec<ItemOutcome>,
}

impl BulkOutcome {
    pub fn new(total_requested: usize) -> Self {
        Self {
            total_requested,
            successful: 0,
            failed: 0,
            results: Vec::with_capacity(total_requested),
        }
    }

    pub fn record_success(&mut self, id: i64) {
        self.successful += 1;
        self.results.push(ItemOutcome {
            id,
            success: true,
            error: None,
        });
    }

    pub fn record_failure(&mut self, id: i64, error: impl Into<String>) {
        self.failed += 1;
        self.results.push(ItemOutcome {
            id,
            success: false,
            error: Some(error.into()),
        });
    }

    /// Retroactively mark every recorded success as failed.
    ///
    /// Used when the single batch commit fails after per-item processing:
    /// all items in that commit are reported failed with the given reason.
    pub fn fail_all(&mut self, reason: &str) {
        for item in &mut self.results {
            if item.success {
                item.success = false;
                item.error = Some(reason.to_string());
            }
        }
        self.failed += self.successful;
        self.successful = 0;
    }
}
