// Copyright 2026 Layne Penney
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Durable storage collaborator.
//!
//! The pipeline assumes an append-only, time-range-queryable store with a
//! delete-where-older-than operation per category. [`TelemetryStore`] is the
//! seam; [`MemoryStore`] backs tests and lightweight embeddings, and
//! [`SqliteStore`] is the on-disk implementation.

mod memory;
mod sqlite;

pub use memory::MemoryStore;
pub use sqlite::SqliteStore;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::StorageError;
use crate::types::{ChainEntry, HealthCheckResult, PerformanceSnapshot, TelemetryEvent, TelemetryMetric};

/// Persisted telemetry categories, each with its own retention window.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Category {
    Events,
    Metrics,
    HealthChecks,
    Snapshots,
    Chains,
}

impl Category {
    pub fn all() -> [Category; 5] {
        [
            Self::Events,
            Self::Metrics,
            Self::HealthChecks,
            Self::Snapshots,
            Self::Chains,
        ]
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Events => "events",
            Self::Metrics => "metrics",
            Self::HealthChecks => "health_checks",
            Self::Snapshots => "snapshots",
            Self::Chains => "chains",
        }
    }
}

impl std::fmt::Display for Category {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Time-range and component filter for store reads.
#[derive(Debug, Clone, Default)]
pub struct QueryFilter {
    pub since: Option<DateTime<Utc>>,
    pub until: Option<DateTime<Utc>>,
    /// Matches the event/snapshot component, or the provider name for
    /// health check rows.
    pub component: Option<String>,
    pub limit: Option<usize>,
}

impl QueryFilter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn since(mut self, since: DateTime<Utc>) -> Self {
        self.since = Some(since);
        self
    }

    pub fn until(mut self, until: DateTime<Utc>) -> Self {
        self.until = Some(until);
        self
    }

    pub fn component(mut self, component: impl Into<String>) -> Self {
        self.component = Some(component.into());
        self
    }

    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    /// Whether a row with this timestamp/component passes the filter.
    pub(crate) fn matches(&self, timestamp: DateTime<Utc>, component: &str) -> bool {
        if let Some(since) = self.since {
            if timestamp < since {
                return false;
            }
        }
        if let Some(until) = self.until {
            if timestamp > until {
                return false;
            }
        }
        if let Some(wanted) = &self.component {
            if wanted != component {
                return false;
            }
        }
        true
    }
}

/// Append-only, time-range-queryable telemetry storage.
///
/// Implementations must be safe to share across threads; the sink may hand
/// batches to a background task.
pub trait TelemetryStore: Send + Sync {
    fn append_events(&self, rows: &[TelemetryEvent]) -> Result<(), StorageError>;
    fn append_metrics(&self, rows: &[TelemetryMetric]) -> Result<(), StorageError>;
    fn append_health_checks(&self, rows: &[HealthCheckResult]) -> Result<(), StorageError>;
    fn append_snapshots(&self, rows: &[PerformanceSnapshot]) -> Result<(), StorageError>;
    fn append_chain_entries(&self, rows: &[ChainEntry]) -> Result<(), StorageError>;

    fn query_events(&self, filter: &QueryFilter) -> Result<Vec<TelemetryEvent>, StorageError>;
    fn query_snapshots(&self, filter: &QueryFilter)
        -> Result<Vec<PerformanceSnapshot>, StorageError>;
    fn query_health_checks(
        &self,
        filter: &QueryFilter,
    ) -> Result<Vec<HealthCheckResult>, StorageError>;
    /// Steps of one logical request's tool chain, ordered by timestamp.
    fn query_chain(&self, correlation_id: &str) -> Result<Vec<ChainEntry>, StorageError>;

    fn count_older_than(
        &self,
        category: Category,
        cutoff: DateTime<Utc>,
    ) -> Result<u64, StorageError>;
    fn delete_older_than(
        &self,
        category: Category,
        cutoff: DateTime<Utc>,
    ) -> Result<u64, StorageError>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    #[test]
    fn test_filter_matches() {
        let now = Utc::now();
        let filter = QueryFilter::new()
            .since(now - Duration::hours(1))
            .component("tool");

        assert!(filter.matches(now, "tool"));
        assert!(!filter.matches(now - Duration::hours(2), "tool"));
        assert!(!filter.matches(now, "chat"));
    }

    #[test]
    fn test_category_round_trip() {
        for category in Category::all() {
            let json = serde_json::to_string(&category).unwrap();
            let parsed: Category = serde_json::from_str(&json).unwrap();
            assert_eq!(parsed, category);
        }
    }
}
