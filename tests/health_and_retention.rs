// Copyright 2026 Layne Penney
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Health monitoring and retention scenarios against a real SQLite store.

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{Duration, Utc};
use serde_json::{json, Value};

use pulse::config::TelemetryConfig;
use pulse::error::ProviderError;
use pulse::health::{HealthMonitor, HealthState};
use pulse::query::QueryService;
use pulse::registry::{ToolDefinition, ToolProvider, ToolRegistryBuilder};
use pulse::retention::{parse_retention_override, RetentionEnforcer};
use pulse::sink::TelemetrySink;
use pulse::storage::{Category, QueryFilter, SqliteStore, TelemetryStore};
use pulse::types::TelemetryEvent;

/// Fails the first `fail_first` probes, then succeeds.
struct RecoveringProvider {
    fail_first: u32,
    calls: AtomicU32,
}

impl RecoveringProvider {
    fn new(fail_first: u32) -> Self {
        Self {
            fail_first,
            calls: AtomicU32::new(0),
        }
    }
}

#[async_trait]
impl ToolProvider for RecoveringProvider {
    fn definition(&self) -> ToolDefinition {
        ToolDefinition::new("db.query", "flaky database access")
    }

    async fn run(&self, args: Value) -> Result<Value, ProviderError> {
        Ok(args)
    }

    async fn self_check(&self) -> Result<(), ProviderError> {
        let n = self.calls.fetch_add(1, Ordering::SeqCst);
        if n < self.fail_first {
            Err(ProviderError::ExecutionFailed("connection refused".into()))
        } else {
            Ok(())
        }
    }
}

#[tokio::test]
async fn provider_degrades_and_recovers_through_sqlite_history() {
    let dir = tempfile::tempdir().unwrap();
    let store = Arc::new(SqliteStore::open(dir.path().join("telemetry.db")).unwrap());
    let config = TelemetryConfig::default();
    let sink = TelemetrySink::new(
        store.clone() as Arc<dyn TelemetryStore>,
        config.sink.clone(),
    );

    let mut builder = ToolRegistryBuilder::new();
    builder.register(RecoveringProvider::new(3));
    let monitor = HealthMonitor::new(Arc::new(builder.build()), sink.clone(), &config);

    // Three failures flip the provider to unhealthy.
    for _ in 0..2 {
        let outcome = monitor.check_tool("db.query").await;
        assert_ne!(outcome.status, HealthState::Unhealthy);
    }
    let outcome = monitor.check_tool("db.query").await;
    assert_eq!(outcome.status, HealthState::Unhealthy);

    // One success is not enough; the second restores health.
    let outcome = monitor.check_tool("db.query").await;
    assert_eq!(outcome.status, HealthState::Unhealthy);
    let outcome = monitor.check_tool("db.query").await;
    assert_eq!(outcome.status, HealthState::Healthy);

    sink.flush();

    // The persisted history shows every probe, not just transitions.
    let status = QueryService::new(store.as_ref())
        .health_status(&QueryFilter::new())
        .unwrap();
    assert_eq!(status.total_checks, 5);
    assert_eq!(status.healthy_checks, 2);
    assert_eq!(status.by_provider["db.query"].total, 5);

    // Both transitions were recorded as events.
    let events = store
        .query_events(&QueryFilter::new().component("health"))
        .unwrap();
    let changes: Vec<_> = events
        .iter()
        .filter(|e| e.event_name == "health.status_changed")
        .collect();
    assert_eq!(changes.len(), 2);
}

#[tokio::test]
async fn live_view_and_historical_view_disagree_by_design() {
    let dir = tempfile::tempdir().unwrap();
    let store = Arc::new(SqliteStore::open(dir.path().join("telemetry.db")).unwrap());
    let config = TelemetryConfig::default();
    let sink = TelemetrySink::new(
        store.clone() as Arc<dyn TelemetryStore>,
        config.sink.clone(),
    );

    let mut builder = ToolRegistryBuilder::new();
    builder.register(RecoveringProvider::new(3));
    let monitor = HealthMonitor::new(Arc::new(builder.build()), sink.clone(), &config);

    for _ in 0..3 {
        monitor.check_tool("db.query").await;
    }
    for _ in 0..2 {
        monitor.check_tool("db.query").await;
    }
    sink.flush();

    // Live view: currently healthy.
    let live = monitor.system_health();
    assert_eq!(live.overall_health, 100.0);

    // Historical view: 2 of 5 recorded probes were healthy.
    let history = QueryService::new(store.as_ref())
        .health_status(&QueryFilter::new())
        .unwrap();
    assert!(history.availability_percent < 50.0);
}

#[test]
fn retention_override_deletes_only_expired_rows() {
    let dir = tempfile::tempdir().unwrap();
    let store = SqliteStore::open(dir.path().join("telemetry.db")).unwrap();

    let mut old = TelemetryEvent::new("tool", "tool.invocation_completed", json!({}));
    old.timestamp = Utc::now() - Duration::days(10);
    let mut recent = TelemetryEvent::new("tool", "tool.invocation_completed", json!({}));
    recent.timestamp = Utc::now() - Duration::days(2);
    store.append_events(&[old, recent]).unwrap();

    let window = parse_retention_override("7d").unwrap();
    let enforcer = RetentionEnforcer::new(&store, TelemetryConfig::default().retention);

    let plan = enforcer
        .compute_plan(Some(Category::Events), Some(window))
        .unwrap();
    assert_eq!(plan.total(), 1);
    // Planning is a preview; nothing is gone yet.
    assert_eq!(store.query_events(&QueryFilter::new()).unwrap().len(), 2);

    let report = enforcer.execute(&plan);
    assert_eq!(report.total_deleted, 1);
    assert!(!report.partial);

    let remaining = store.query_events(&QueryFilter::new()).unwrap();
    assert_eq!(remaining.len(), 1);
    assert!(remaining[0].timestamp > Utc::now() - Duration::days(7));
}

#[test]
fn retention_covers_every_category() {
    let dir = tempfile::tempdir().unwrap();
    let store = SqliteStore::open(dir.path().join("telemetry.db")).unwrap();

    let enforcer = RetentionEnforcer::new(&store, TelemetryConfig::default().retention);
    let report = enforcer.enforce(None, None).unwrap();

    assert_eq!(report.results.len(), Category::all().len());
    assert_eq!(report.total_deleted, 0);
    assert!(report.results.iter().all(|r| r.error.is_none()));
}
