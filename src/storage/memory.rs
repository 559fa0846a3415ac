// Copyright 2026 Layne Penney
// SPDX-License-Identifier: AGPL-3.0-or-later

//! In-memory telemetry store.
//!
//! Backs unit tests and short-lived embeddings where durability is not
//! needed. Writes can be made to fail on demand so the sink's retry and
//! drop accounting can be exercised.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;

use chrono::{DateTime, Utc};

use crate::error::StorageError;
use crate::types::{
    ChainEntry, HealthCheckResult, PerformanceSnapshot, TelemetryEvent, TelemetryMetric,
};

use super::{Category, QueryFilter, TelemetryStore};

/// Telemetry store holding all rows in memory.
#[derive(Default)]
pub struct MemoryStore {
    events: Mutex<Vec<TelemetryEvent>>,
    metrics: Mutex<Vec<TelemetryMetric>>,
    health_checks: Mutex<Vec<HealthCheckResult>>,
    snapshots: Mutex<Vec<PerformanceSnapshot>>,
    chains: Mutex<Vec<ChainEntry>>,
    fail_writes: AtomicBool,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every subsequent append and delete fail, for exercising retry
    /// and partial-failure paths.
    pub fn set_fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }

    fn check_writable(&self) -> Result<(), StorageError> {
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(StorageError::WriteFailed("writes disabled".to_string()));
        }
        Ok(())
    }

    /// Number of persisted rows in a category.
    pub fn len(&self, category: Category) -> usize {
        match category {
            Category::Events => self.events.lock().unwrap().len(),
            Category::Metrics => self.metrics.lock().unwrap().len(),
            Category::HealthChecks => self.health_checks.lock().unwrap().len(),
            Category::Snapshots => self.snapshots.lock().unwrap().len(),
            Category::Chains => self.chains.lock().unwrap().len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        Category::all().iter().all(|c| self.len(*c) == 0)
    }
}

fn retain_newer<T>(rows: &mut Vec<T>, cutoff: DateTime<Utc>, ts: impl Fn(&T) -> DateTime<Utc>) -> u64 {
    let before = rows.len();
    rows.retain(|row| ts(row) >= cutoff);
    (before - rows.len()) as u64
}

fn count_older<T>(rows: &[T], cutoff: DateTime<Utc>, ts: impl Fn(&T) -> DateTime<Utc>) -> u64 {
    rows.iter().filter(|row| ts(row) < cutoff).count() as u64
}

impl TelemetryStore for MemoryStore {
    fn append_events(&self, rows: &[TelemetryEvent]) -> Result<(), StorageError> {
        self.check_writable()?;
        self.events.lock().unwrap().extend_from_slice(rows);
        Ok(())
    }

    fn append_metrics(&self, rows: &[TelemetryMetric]) -> Result<(), StorageError> {
        self.check_writable()?;
        self.metrics.lock().unwrap().extend_from_slice(rows);
        Ok(())
    }

    fn append_health_checks(&self, rows: &[HealthCheckResult]) -> Result<(), StorageError> {
        self.check_writable()?;
        self.health_checks.lock().unwrap().extend_from_slice(rows);
        Ok(())
    }

    fn append_snapshots(&self, rows: &[PerformanceSnapshot]) -> Result<(), StorageError> {
        self.check_writable()?;
        self.snapshots.lock().unwrap().extend_from_slice(rows);
        Ok(())
    }

    fn append_chain_entries(&self, rows: &[ChainEntry]) -> Result<(), StorageError> {
        self.check_writable()?;
        self.chains.lock().unwrap().extend_from_slice(rows);
        Ok(())
    }

    fn query_events(&self, filter: &QueryFilter) -> Result<Vec<TelemetryEvent>, StorageError> {
        let rows = self.events.lock().unwrap();
        let mut out: Vec<_> = rows
            .iter()
            .filter(|e| filter.matches(e.timestamp, &e.component))
            .cloned()
            .collect();
        if let Some(limit) = filter.limit {
            out.truncate(limit);
        }
        Ok(out)
    }

    fn query_snapshots(
        &self,
        filter: &QueryFilter,
    ) -> Result<Vec<PerformanceSnapshot>, StorageError> {
        let rows = self.snapshots.lock().unwrap();
        let mut out: Vec<_> = rows
            .iter()
            .filter(|s| filter.matches(s.timestamp, &s.component))
            .cloned()
            .collect();
        if let Some(limit) = filter.limit {
            out.truncate(limit);
        }
        Ok(out)
    }

    fn query_health_checks(
        &self,
        filter: &QueryFilter,
    ) -> Result<Vec<HealthCheckResult>, StorageError> {
        let rows = self.health_checks.lock().unwrap();
        let mut out: Vec<_> = rows
            .iter()
            .filter(|h| filter.matches(h.timestamp, &h.provider_name))
            .cloned()
            .collect();
        if let Some(limit) = filter.limit {
            out.truncate(limit);
        }
        Ok(out)
    }

    fn query_chain(&self, correlation_id: &str) -> Result<Vec<ChainEntry>, StorageError> {
        let rows = self.chains.lock().unwrap();
        let mut out: Vec<_> = rows
            .iter()
            .filter(|c| c.correlation_id == correlation_id)
            .cloned()
            .collect();
        out.sort_by_key(|c| c.timestamp);
        Ok(out)
    }

    fn count_older_than(
        &self,
        category: Category,
        cutoff: DateTime<Utc>,
    ) -> Result<u64, StorageError> {
        Ok(match category {
            Category::Events => count_older(&self.events.lock().unwrap(), cutoff, |r| r.timestamp),
            Category::Metrics => {
                count_older(&self.metrics.lock().unwrap(), cutoff, |r| r.timestamp)
            }
            Category::HealthChecks => {
                count_older(&self.health_checks.lock().unwrap(), cutoff, |r| r.timestamp)
            }
            Category::Snapshots => {
                count_older(&self.snapshots.lock().unwrap(), cutoff, |r| r.timestamp)
            }
            Category::Chains => count_older(&self.chains.lock().unwrap(), cutoff, |r| r.timestamp),
        })
    }

    fn delete_older_than(
        &self,
        category: Category,
        cutoff: DateTime<Utc>,
    ) -> Result<u64, StorageError> {
        self.check_writable()?;
        Ok(match category {
            Category::Events => {
                retain_newer(&mut self.events.lock().unwrap(), cutoff, |r| r.timestamp)
            }
            Category::Metrics => {
                retain_newer(&mut self.metrics.lock().unwrap(), cutoff, |r| r.timestamp)
            }
            Category::HealthChecks => retain_newer(&mut self.health_checks.lock().unwrap(), cutoff, |r| {
                r.timestamp
            }),
            Category::Snapshots => {
                retain_newer(&mut self.snapshots.lock().unwrap(), cutoff, |r| r.timestamp)
            }
            Category::Chains => {
                retain_newer(&mut self.chains.lock().unwrap(), cutoff, |r| r.timestamp)
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use serde_json::json;

    #[test]
    fn test_append_and_query_events() {
        let store = MemoryStore::new();
        store
            .append_events(&[
                TelemetryEvent::new("tool", "tool.invocation_started", json!({})),
                TelemetryEvent::new("chat", "chat.turn_completed", json!({})),
            ])
            .unwrap();

        let filter = QueryFilter::new().component("tool");
        let rows = store.query_events(&filter).unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].component, "tool");
    }

    #[test]
    fn test_delete_older_than() {
        let store = MemoryStore::new();
        let mut old = TelemetryEvent::new("tool", "x", json!({}));
        old.timestamp = Utc::now() - Duration::days(10);
        let recent = TelemetryEvent::new("tool", "y", json!({}));
        store.append_events(&[old, recent]).unwrap();

        let cutoff = Utc::now() - Duration::days(7);
        assert_eq!(store.count_older_than(Category::Events, cutoff).unwrap(), 1);
        assert_eq!(store.delete_older_than(Category::Events, cutoff).unwrap(), 1);
        assert_eq!(store.len(Category::Events), 1);
    }

    #[test]
    fn test_fail_writes() {
        let store = MemoryStore::new();
        store.set_fail_writes(true);
        assert!(store
            .append_events(&[TelemetryEvent::new("tool", "x", json!({}))])
            .is_err());
        store.set_fail_writes(false);
        assert!(store
            .append_events(&[TelemetryEvent::new("tool", "x", json!({}))])
            .is_ok());
    }

    #[test]
    fn test_chain_query_ordered() {
        let store = MemoryStore::new();
        let mut second = ChainEntry::new("req-1", "write_file");
        second.timestamp = Utc::now() + Duration::seconds(1);
        let first = ChainEntry::new("req-1", "read_file");
        let other = ChainEntry::new("req-2", "grep");
        store.append_chain_entries(&[second, first, other]).unwrap();

        let chain = store.query_chain("req-1").unwrap();
        assert_eq!(chain.len(), 2);
        assert_eq!(chain[0].tool_name, "read_file");
        assert_eq!(chain[1].tool_name, "write_file");
    }
}
