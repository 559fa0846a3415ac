// Copyright 2026 Layne Penney
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Retention enforcement over persisted telemetry.
//!
//! Enforcement is a two-phase affair: `compute_plan` is a pure preview
//! (per-category cutoff plus the count of rows that would go), `execute`
//! performs the deletions. A failure in one category never blocks the
//! others; the report carries per-category results and a partial-success
//! flag.

use std::time::Instant;

use chrono::{DateTime, Duration, Utc};
use serde::Serialize;
use tracing::{info, warn};

use crate::config::RetentionConfig;
use crate::error::{RetentionError, StorageError};
use crate::storage::{Category, TelemetryStore};

/// Parse a retention override like `"12h"`, `"30d"`, or `"2w"`.
pub fn parse_retention_override(s: &str) -> Result<Duration, RetentionError> {
    let s = s.trim();
    // Split on a char boundary so multi-byte trailing units fail cleanly.
    let (digits, unit) = match s.char_indices().last() {
        Some((idx, unit)) => (&s[..idx], unit),
        None => return Err(RetentionError::InvalidOverride(s.to_string())),
    };
    let value: i64 = digits
        .parse()
        .map_err(|_| RetentionError::InvalidOverride(s.to_string()))?;
    if value <= 0 {
        return Err(RetentionError::InvalidOverride(s.to_string()));
    }
    match unit {
        'h' => Ok(Duration::hours(value)),
        'd' => Ok(Duration::days(value)),
        'w' => Ok(Duration::weeks(value)),
        _ => Err(RetentionError::InvalidOverride(s.to_string())),
    }
}

/// One category's slice of a plan: what would be cut, and how much.
#[derive(Debug, Clone, Serialize)]
pub struct PlanEntry {
    pub category: Category,
    pub cutoff: DateTime<Utc>,
    pub count: u64,
}

/// Preview of an enforcement run. Computing a plan deletes nothing.
#[derive(Debug, Clone, Serialize)]
pub struct RetentionPlan {
    pub entries: Vec<PlanEntry>,
    pub computed_at: DateTime<Utc>,
}

impl RetentionPlan {
    pub fn total(&self) -> u64 {
        self.entries.iter().map(|e| e.count).sum()
    }
}

/// Outcome for one category during `execute`.
#[derive(Debug, Clone, Serialize)]
pub struct CategoryResult {
    pub category: Category,
    pub deleted: u64,
    pub elapsed_ms: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Full report of an enforcement run.
#[derive(Debug, Clone, Serialize)]
pub struct RetentionReport {
    pub results: Vec<CategoryResult>,
    pub total_deleted: u64,
    /// Set when at least one category failed while others succeeded.
    pub partial: bool,
}

/// Applies per-category retention windows to a store.
pub struct RetentionEnforcer<'a> {
    store: &'a dyn TelemetryStore,
    config: RetentionConfig,
}

impl<'a> RetentionEnforcer<'a> {
    pub fn new(store: &'a dyn TelemetryStore, config: RetentionConfig) -> Self {
        Self { store, config }
    }

    fn configured_window(&self, category: Category) -> Duration {
        let days = match category {
            Category::Events => self.config.events_days,
            Category::Metrics => self.config.metrics_days,
            Category::HealthChecks => self.config.health_checks_days,
            Category::Snapshots => self.config.snapshots_days,
            Category::Chains => self.config.chains_days,
        };
        Duration::days(days as i64)
    }

    /// Preview what an enforcement run would delete.
    ///
    /// `category` narrows the plan to one category; `override_window`
    /// replaces every configured window with the given one.
    pub fn compute_plan(
        &self,
        category: Option<Category>,
        override_window: Option<Duration>,
    ) -> Result<RetentionPlan, StorageError> {
        let now = Utc::now();
        let categories: Vec<Category> = match category {
            Some(c) => vec![c],
            None => Category::all().to_vec(),
        };

        let mut entries = Vec::with_capacity(categories.len());
        for cat in categories {
            let window = override_window.unwrap_or_else(|| self.configured_window(cat));
            let cutoff = now - window;
            let count = self.store.count_older_than(cat, cutoff)?;
            entries.push(PlanEntry {
                category: cat,
                cutoff,
                count,
            });
        }

        Ok(RetentionPlan {
            entries,
            computed_at: now,
        })
    }

    /// Delete everything a plan targets. Each category is its own failure
    /// boundary; one broken table does not stop the rest.
    pub fn execute(&self, plan: &RetentionPlan) -> RetentionReport {
        let mut results = Vec::with_capacity(plan.entries.len());
        let mut total_deleted = 0u64;
        let mut failures = 0usize;

        for entry in &plan.entries {
            let start = Instant::now();
            match self.store.delete_older_than(entry.category, entry.cutoff) {
                Ok(deleted) => {
                    total_deleted += deleted;
                    info!(
                        category = %entry.category,
                        deleted,
                        elapsed_ms = start.elapsed().as_secs_f64() * 1000.0,
                        "Retention enforcement pass"
                    );
                    results.push(CategoryResult {
                        category: entry.category,
                        deleted,
                        elapsed_ms: start.elapsed().as_secs_f64() * 1000.0,
                        error: None,
                    });
                }
                Err(source) => {
                    failures += 1;
                    let err = RetentionError::DeletionFailed {
                        category: entry.category.as_str().to_string(),
                        source,
                    };
                    warn!(category = %entry.category, error = %err, "Retention deletion failed");
                    results.push(CategoryResult {
                        category: entry.category,
                        deleted: 0,
                        elapsed_ms: start.elapsed().as_secs_f64() * 1000.0,
                        error: Some(err.to_string()),
                    });
                }
            }
        }

        RetentionReport {
            partial: failures > 0 && failures < results.len(),
            results,
            total_deleted,
        }
    }

    /// Convenience: compute and execute in one call.
    pub fn enforce(
        &self,
        category: Option<Category>,
        override_window: Option<Duration>,
    ) -> Result<RetentionReport, StorageError> {
        let plan = self.compute_plan(category, override_window)?;
        Ok(self.execute(&plan))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::{MemoryStore, QueryFilter};
    use crate::types::TelemetryEvent;
    use serde_json::json;

    fn event_aged(days: i64) -> TelemetryEvent {
        let mut event = TelemetryEvent::new("tool", "tool.invocation_completed", json!({}));
        event.timestamp = Utc::now() - Duration::days(days);
        event
    }

    #[test]
    fn test_parse_override_units() {
        assert_eq!(parse_retention_override("12h").unwrap(), Duration::hours(12));
        assert_eq!(parse_retention_override("30d").unwrap(), Duration::days(30));
        assert_eq!(parse_retention_override("2w").unwrap(), Duration::weeks(2));
        assert!(parse_retention_override("30m").is_err());
        assert!(parse_retention_override("d").is_err());
        assert!(parse_retention_override("-3d").is_err());
        assert!(parse_retention_override("").is_err());
        // Multi-byte trailing characters are rejected, not a char-boundary panic.
        assert!(parse_retention_override("7日").is_err());
        assert!(parse_retention_override("7é").is_err());
    }

    #[test]
    fn test_plan_counts_without_deleting() {
        let store = MemoryStore::new();
        store
            .append_events(&[event_aged(10), event_aged(2)])
            .unwrap();

        let enforcer = RetentionEnforcer::new(&store, RetentionConfig::default());
        let plan = enforcer
            .compute_plan(Some(Category::Events), Some(Duration::days(7)))
            .unwrap();

        assert_eq!(plan.entries.len(), 1);
        assert_eq!(plan.entries[0].count, 1);
        assert_eq!(store.len(Category::Events), 2);
    }

    #[test]
    fn test_override_deletes_only_rows_older_than_window() {
        let store = MemoryStore::new();
        store
            .append_events(&[event_aged(10), event_aged(2)])
            .unwrap();

        let enforcer = RetentionEnforcer::new(&store, RetentionConfig::default());
        let report = enforcer
            .enforce(Some(Category::Events), Some(Duration::days(7)))
            .unwrap();

        assert_eq!(report.total_deleted, 1);
        assert!(!report.partial);
        let remaining = store.query_events(&QueryFilter::new()).unwrap();
        assert_eq!(remaining.len(), 1);
        assert!(remaining[0].timestamp > Utc::now() - Duration::days(7));
    }

    #[test]
    fn test_configured_windows_apply_per_category() {
        let store = MemoryStore::new();
        // Default events window is 30 days; both rows survive.
        store
            .append_events(&[event_aged(10), event_aged(2)])
            .unwrap();

        let enforcer = RetentionEnforcer::new(&store, RetentionConfig::default());
        let report = enforcer.enforce(None, None).unwrap();

        assert_eq!(report.total_deleted, 0);
        assert_eq!(report.results.len(), Category::all().len());
    }

    #[test]
    fn test_failed_category_is_isolated() {
        let store = MemoryStore::new();
        store.append_events(&[event_aged(40)]).unwrap();

        let enforcer = RetentionEnforcer::new(&store, RetentionConfig::default());
        let plan = enforcer.compute_plan(None, None).unwrap();

        store.set_fail_writes(true);
        let report = enforcer.execute(&plan);

        assert!(report.results.iter().all(|r| r.error.is_some()));
        // Every category failed, so this is a full failure, not partial.
        assert!(!report.partial);
        assert_eq!(report.total_deleted, 0);
    }
}
