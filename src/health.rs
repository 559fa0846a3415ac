// Copyright 2026 Layne Penney
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Provider health monitoring.
//!
//! Each registered tool provider gets a pair of mutually exclusive
//! consecutive-outcome counters and a derived status. The status flips to
//! unhealthy only after `failure_threshold` consecutive failures, and back
//! to healthy only after `recovery_threshold` consecutive successes. That
//! asymmetric hysteresis keeps marginal providers from flapping.
//!
//! Counters and status for a provider are updated as one atomic unit under
//! the monitor's lock; a concurrent reader never observes counters that
//! disagree with the status. Probes run under an enforced timeout so a hung
//! provider cannot block the checker.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::{debug, info, warn};

use crate::config::{HealthConfig, TelemetryConfig};
use crate::registry::ToolRegistry;
use crate::sink::TelemetrySink;
use crate::types::{EventLevel, HealthCheckResult, TelemetryEvent};

/// Derived status of a provider.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HealthState {
    /// Never checked.
    Unknown,
    Healthy,
    Unhealthy,
    /// Missing from the registry; cleared on reregistration and recheck.
    NotFound,
}

impl HealthState {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Unknown => "unknown",
            Self::Healthy => "healthy",
            Self::Unhealthy => "unhealthy",
            Self::NotFound => "not_found",
        }
    }
}

impl std::fmt::Display for HealthState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Live counters and status for one provider.
#[derive(Debug, Clone, Serialize)]
pub struct ProviderHealth {
    pub consecutive_failures: u32,
    pub consecutive_successes: u32,
    pub current_status: HealthState,
    pub last_changed_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_response_time_ms: Option<f64>,
}

impl ProviderHealth {
    fn new() -> Self {
        Self {
            consecutive_failures: 0,
            consecutive_successes: 0,
            current_status: HealthState::Unknown,
            last_changed_at: Utc::now(),
            last_error: None,
            last_response_time_ms: None,
        }
    }
}

/// Result of a single `check_tool` probe.
#[derive(Debug, Clone, Serialize)]
pub struct CheckOutcome {
    pub provider_name: String,
    pub status: HealthState,
    pub response_time_ms: f64,
    pub timestamp: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Aggregate of one `check_all_tools` sweep.
#[derive(Debug, Clone, Default, Serialize)]
pub struct HealthSummary {
    pub healthy: usize,
    pub unhealthy: usize,
    pub not_found: usize,
    pub total: usize,
    pub healthy_percent: f64,
    pub outcomes: Vec<CheckOutcome>,
}

/// Live, in-process system view (no re-probing); distinct from the
/// persisted historical view served by the query service.
#[derive(Debug, Clone, Serialize)]
pub struct SystemHealth {
    pub overall_health: f64,
    pub providers: HashMap<String, ProviderHealth>,
}

/// Active prober plus hysteresis state machine per provider.
pub struct HealthMonitor {
    registry: Arc<ToolRegistry>,
    sink: TelemetrySink,
    config: HealthConfig,
    alert_unhealthy_percent: f64,
    providers: Mutex<HashMap<String, ProviderHealth>>,
}

impl HealthMonitor {
    pub fn new(registry: Arc<ToolRegistry>, sink: TelemetrySink, config: &TelemetryConfig) -> Self {
        Self {
            registry,
            sink,
            config: config.health.clone(),
            alert_unhealthy_percent: config.alerts.unhealthy_percent,
            providers: Mutex::new(HashMap::new()),
        }
    }

    /// Probe a single provider and update its state machine.
    ///
    /// An unregistered name yields `NotFound` and creates no counters.
    pub async fn check_tool(&self, name: &str) -> CheckOutcome {
        let provider = match self.registry.get(name) {
            Some(p) => p,
            None => {
                debug!(tool = %name, "Health check skipped: not in registry");
                return CheckOutcome {
                    provider_name: name.to_string(),
                    status: HealthState::NotFound,
                    response_time_ms: 0.0,
                    timestamp: Utc::now(),
                    error: Some("Tool not found in registry".to_string()),
                };
            }
        };

        let timeout = Duration::from_millis(self.config.timeout_ms);
        let start = Instant::now();
        let probe = tokio::time::timeout(timeout, provider.self_check()).await;
        let response_time_ms = start.elapsed().as_secs_f64() * 1000.0;

        let error = match probe {
            Ok(Ok(())) => None,
            Ok(Err(err)) => Some(format!("Health check failed: {err}")),
            Err(_) => Some(format!(
                "Health check failed: timed out after {}ms",
                self.config.timeout_ms
            )),
        };
        let healthy = error.is_none();

        let status = self.apply_outcome(name, healthy, response_time_ms, error.clone());

        let result = if healthy {
            HealthCheckResult::success(name, response_time_ms)
        } else {
            HealthCheckResult::failure(name, response_time_ms, error.clone().unwrap_or_default())
        };
        self.sink.record_health_check(result);

        CheckOutcome {
            provider_name: name.to_string(),
            status,
            response_time_ms,
            timestamp: Utc::now(),
            error,
        }
    }

    /// Passive signal fed by completed invocations; updates counters and
    /// status without probing and without recording a health check row.
    pub fn record_outcome(
        &self,
        provider: &str,
        success: bool,
        response_time_ms: f64,
        error: Option<String>,
    ) {
        self.apply_outcome(provider, success, response_time_ms, error);
    }

    /// Probe every configured tool and aggregate the results.
    ///
    /// Disabled monitoring returns an empty summary with zero side effects.
    pub async fn check_all_tools(&self) -> HealthSummary {
        if !self.config.enabled {
            return HealthSummary::default();
        }

        let names: Vec<String> = if self.config.tools.is_empty() {
            self.registry.names().iter().map(|s| s.to_string()).collect()
        } else {
            self.config.tools.clone()
        };

        let mut summary = HealthSummary {
            total: names.len(),
            ..Default::default()
        };

        for name in &names {
            let outcome = self.check_tool(name).await;
            match outcome.status {
                HealthState::Healthy => summary.healthy += 1,
                HealthState::NotFound => summary.not_found += 1,
                // Unknown means failures are accumulating toward the
                // threshold; count it against availability.
                HealthState::Unhealthy | HealthState::Unknown => summary.unhealthy += 1,
            }
            summary.outcomes.push(outcome);
        }

        summary.healthy_percent = if summary.total == 0 {
            100.0
        } else {
            summary.healthy as f64 / summary.total as f64 * 100.0
        };

        self.sink.record(TelemetryEvent::new(
            "health",
            "health.check_summary",
            json!({
                "healthy": summary.healthy,
                "unhealthy": summary.unhealthy,
                "not_found": summary.not_found,
                "total": summary.total,
                "healthy_percent": summary.healthy_percent,
            }),
        ));

        if summary.total > 0 && summary.healthy_percent < self.alert_unhealthy_percent {
            warn!(
                healthy_percent = summary.healthy_percent,
                threshold = self.alert_unhealthy_percent,
                "System health below alert threshold"
            );
            self.sink.record(
                TelemetryEvent::new(
                    "health",
                    "health.alert",
                    json!({
                        "healthy_percent": summary.healthy_percent,
                        "threshold": self.alert_unhealthy_percent,
                        "healthy": summary.healthy,
                        "unhealthy": summary.unhealthy,
                        "not_found": summary.not_found,
                    }),
                )
                .with_level(EventLevel::Warning),
            );
        }

        summary
    }

    /// Live system view from last-known statuses; never re-probes.
    pub fn system_health(&self) -> SystemHealth {
        let providers = self.providers.lock().unwrap().clone();
        let total = providers.len();
        let healthy = providers
            .values()
            .filter(|p| p.current_status == HealthState::Healthy)
            .count();
        let overall_health = if total == 0 {
            100.0
        } else {
            healthy as f64 / total as f64 * 100.0
        };
        SystemHealth {
            overall_health,
            providers,
        }
    }

    /// Last-known state for one provider.
    pub fn provider_health(&self, name: &str) -> Option<ProviderHealth> {
        self.providers.lock().unwrap().get(name).cloned()
    }

    /// Clear all counters and statuses.
    pub fn reset(&self) {
        self.providers.lock().unwrap().clear();
    }

    /// Apply one outcome to a provider's counters and status as a single
    /// atomic unit; emits a status_changed event when the status flips.
    fn apply_outcome(
        &self,
        name: &str,
        success: bool,
        response_time_ms: f64,
        error: Option<String>,
    ) -> HealthState {
        // The returned status is captured inside the critical section so it
        // reflects this outcome, not a concurrent later one.
        let (current, transition) = {
            let mut providers = self.providers.lock().unwrap();
            let entry = providers
                .entry(name.to_string())
                .or_insert_with(ProviderHealth::new);

            // The counters are mutually exclusive: an outcome resets the
            // opposite streak.
            if success {
                entry.consecutive_failures = 0;
                entry.consecutive_successes += 1;
            } else {
                entry.consecutive_successes = 0;
                entry.consecutive_failures += 1;
            }
            entry.last_error = error.clone();
            entry.last_response_time_ms = Some(response_time_ms);

            let old = entry.current_status;
            let new = next_status(
                old,
                entry.consecutive_failures,
                entry.consecutive_successes,
                &self.config,
            );

            let transition = if new != old {
                entry.current_status = new;
                entry.last_changed_at = Utc::now();
                Some((old, new, entry.consecutive_failures, entry.consecutive_successes))
            } else {
                None
            };
            (entry.current_status, transition)
        };

        if let Some((old, new, failures, successes)) = transition {
            let level = match new {
                HealthState::Unhealthy => EventLevel::Warning,
                _ => EventLevel::Info,
            };
            info!(provider = %name, old = %old, new = %new, "Provider health status changed");
            self.sink.record(
                TelemetryEvent::new(
                    "health",
                    "health.status_changed",
                    json!({
                        "provider": name,
                        "old_status": old.as_str(),
                        "new_status": new.as_str(),
                        "consecutive_failures": failures,
                        "consecutive_successes": successes,
                        "error": error,
                    }),
                )
                .with_level(level),
            );
        }

        current
    }
}

/// Pure transition rule of the hysteresis state machine.
fn next_status(
    current: HealthState,
    failures: u32,
    successes: u32,
    config: &HealthConfig,
) -> HealthState {
    match current {
        HealthState::Unhealthy => {
            if successes >= config.recovery_threshold {
                HealthState::Healthy
            } else {
                HealthState::Unhealthy
            }
        }
        HealthState::Healthy => {
            if failures >= config.failure_threshold {
                HealthState::Unhealthy
            } else {
                HealthState::Healthy
            }
        }
        HealthState::Unknown | HealthState::NotFound => {
            if failures >= config.failure_threshold {
                HealthState::Unhealthy
            } else if successes > 0 {
                HealthState::Healthy
            } else {
                current
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::TelemetryConfig;
    use crate::error::ProviderError;
    use crate::registry::{ToolDefinition, ToolProvider, ToolRegistryBuilder};
    use crate::storage::{MemoryStore, QueryFilter, TelemetryStore};
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicBool, Ordering};

    struct ScriptedProvider {
        name: &'static str,
        failing: AtomicBool,
        delay: Option<Duration>,
    }

    impl ScriptedProvider {
        fn new(name: &'static str) -> Self {
            Self {
                name,
                failing: AtomicBool::new(false),
                delay: None,
            }
        }

        fn failing(name: &'static str) -> Self {
            Self {
                name,
                failing: AtomicBool::new(true),
                delay: None,
            }
        }
    }

    #[async_trait]
    impl ToolProvider for ScriptedProvider {
        fn definition(&self) -> ToolDefinition {
            ToolDefinition::new(self.name, "scripted test provider")
        }

        async fn run(&self, args: serde_json::Value) -> Result<serde_json::Value, ProviderError> {
            Ok(args)
        }

        async fn self_check(&self) -> Result<(), ProviderError> {
            if let Some(delay) = self.delay {
                tokio::time::sleep(delay).await;
            }
            if self.failing.load(Ordering::SeqCst) {
                Err(ProviderError::ExecutionFailed("connection refused".to_string()))
            } else {
                Ok(())
            }
        }
    }

    fn monitor_with(providers: Vec<ScriptedProvider>) -> (HealthMonitor, Arc<MemoryStore>) {
        let mut builder = ToolRegistryBuilder::new();
        for p in providers {
            builder.register(p);
        }
        let registry = Arc::new(builder.build());
        let store = Arc::new(MemoryStore::new());
        let sink = TelemetrySink::new(
            Arc::clone(&store) as Arc<dyn TelemetryStore>,
            Default::default(),
        );
        let config = TelemetryConfig::default();
        (HealthMonitor::new(registry, sink, &config), store)
    }

    #[tokio::test]
    async fn test_unhealthy_exactly_on_third_failure() {
        let (monitor, _) = monitor_with(vec![ScriptedProvider::failing("db.query")]);

        let first = monitor.check_tool("db.query").await;
        assert_ne!(first.status, HealthState::Unhealthy);
        let second = monitor.check_tool("db.query").await;
        assert_ne!(second.status, HealthState::Unhealthy);
        let third = monitor.check_tool("db.query").await;
        assert_eq!(third.status, HealthState::Unhealthy);
        assert!(third
            .error
            .as_deref()
            .unwrap()
            .starts_with("Health check failed: "));
    }

    #[tokio::test]
    async fn test_applied_outcome_returns_its_own_status() {
        let (monitor, _) = monitor_with(vec![ScriptedProvider::new("db.query")]);

        // Each call returns the status produced by that outcome.
        assert_eq!(
            monitor.apply_outcome("db.query", false, 1.0, None),
            HealthState::Unknown
        );
        assert_eq!(
            monitor.apply_outcome("db.query", false, 1.0, None),
            HealthState::Unknown
        );
        assert_eq!(
            monitor.apply_outcome("db.query", false, 1.0, None),
            HealthState::Unhealthy
        );
        assert_eq!(
            monitor.apply_outcome("db.query", true, 1.0, None),
            HealthState::Unhealthy
        );
        assert_eq!(
            monitor.apply_outcome("db.query", true, 1.0, None),
            HealthState::Healthy
        );
    }

    #[tokio::test]
    async fn test_recovery_requires_two_consecutive_successes() {
        let (monitor, _) = monitor_with(vec![ScriptedProvider::failing("db.query")]);

        for _ in 0..3 {
            monitor.check_tool("db.query").await;
        }
        assert_eq!(
            monitor.provider_health("db.query").unwrap().current_status,
            HealthState::Unhealthy
        );

        // Recover through the passive path.
        monitor.record_outcome("db.query", true, 1.0, None);
        assert_eq!(
            monitor.provider_health("db.query").unwrap().current_status,
            HealthState::Unhealthy
        );
        monitor.record_outcome("db.query", true, 1.0, None);
        assert_eq!(
            monitor.provider_health("db.query").unwrap().current_status,
            HealthState::Healthy
        );
    }

    #[tokio::test]
    async fn test_intervening_success_resets_failure_streak() {
        let (monitor, _) = monitor_with(vec![ScriptedProvider::new("db.query")]);

        monitor.record_outcome("db.query", false, 1.0, Some("x".into()));
        monitor.record_outcome("db.query", false, 1.0, Some("x".into()));
        monitor.record_outcome("db.query", true, 1.0, None);
        monitor.record_outcome("db.query", false, 1.0, Some("x".into()));
        monitor.record_outcome("db.query", false, 1.0, Some("x".into()));

        let health = monitor.provider_health("db.query").unwrap();
        assert_eq!(health.consecutive_failures, 2);
        assert_ne!(health.current_status, HealthState::Unhealthy);
    }

    #[tokio::test]
    async fn test_not_found_creates_no_counters() {
        let (monitor, _) = monitor_with(vec![]);

        let outcome = monitor.check_tool("ghost.tool").await;
        assert_eq!(outcome.status, HealthState::NotFound);
        assert_eq!(
            outcome.error.as_deref(),
            Some("Tool not found in registry")
        );
        assert!(monitor.provider_health("ghost.tool").is_none());
    }

    #[tokio::test]
    async fn test_probe_timeout_is_a_failure() {
        let mut builder = ToolRegistryBuilder::new();
        builder.register(ScriptedProvider {
            name: "slow.tool",
            failing: AtomicBool::new(false),
            delay: Some(Duration::from_millis(200)),
        });
        let registry = Arc::new(builder.build());
        let store = Arc::new(MemoryStore::new());
        let sink = TelemetrySink::new(
            Arc::clone(&store) as Arc<dyn TelemetryStore>,
            Default::default(),
        );
        let mut config = TelemetryConfig::default();
        config.health.timeout_ms = 20;
        let monitor = HealthMonitor::new(registry, sink, &config);

        let outcome = monitor.check_tool("slow.tool").await;
        assert!(outcome
            .error
            .as_deref()
            .unwrap()
            .starts_with("Health check failed: timed out"));
    }

    #[tokio::test]
    async fn test_check_all_tools_aggregates_and_alerts() {
        let mut config = TelemetryConfig::default();
        config.health.tools = vec![
            "ok.tool".to_string(),
            "bad.tool".to_string(),
            "ghost.tool".to_string(),
        ];
        // One failure is enough to count against availability here.
        config.health.failure_threshold = 1;

        let mut builder = ToolRegistryBuilder::new();
        builder.register(ScriptedProvider::new("ok.tool"));
        builder.register(ScriptedProvider::failing("bad.tool"));
        let registry = Arc::new(builder.build());
        let store = Arc::new(MemoryStore::new());
        let sink = TelemetrySink::new(
            Arc::clone(&store) as Arc<dyn TelemetryStore>,
            Default::default(),
        );
        let monitor = HealthMonitor::new(registry, sink.clone(), &config);

        let summary = monitor.check_all_tools().await;
        assert_eq!(summary.total, 3);
        assert_eq!(summary.healthy, 1);
        assert_eq!(summary.unhealthy, 1);
        assert_eq!(summary.not_found, 1);

        sink.flush();
        let events = store
            .query_events(&QueryFilter::new().component("health"))
            .unwrap();
        assert!(events.iter().any(|e| e.event_name == "health.check_summary"));
        // 33% healthy is below the 80% default alert threshold.
        assert!(events.iter().any(|e| e.event_name == "health.alert"));
    }

    #[tokio::test]
    async fn test_disabled_monitoring_is_a_no_op() {
        let mut config = TelemetryConfig::default();
        config.health.enabled = false;

        let mut builder = ToolRegistryBuilder::new();
        builder.register(ScriptedProvider::new("ok.tool"));
        let registry = Arc::new(builder.build());
        let store = Arc::new(MemoryStore::new());
        let sink = TelemetrySink::new(
            Arc::clone(&store) as Arc<dyn TelemetryStore>,
            Default::default(),
        );
        let monitor = HealthMonitor::new(registry, sink.clone(), &config);

        let summary = monitor.check_all_tools().await;
        assert_eq!(summary.total, 0);
        sink.flush();
        assert!(store.is_empty());
    }

    #[tokio::test]
    async fn test_status_change_emits_event_once() {
        let (monitor, store) = monitor_with(vec![ScriptedProvider::failing("db.query")]);

        for _ in 0..5 {
            monitor.check_tool("db.query").await;
        }
        monitor.sink.flush();

        let events = store
            .query_events(&QueryFilter::new().component("health"))
            .unwrap();
        let changes: Vec<_> = events
            .iter()
            .filter(|e| e.event_name == "health.status_changed")
            .collect();
        // Five failing probes, one transition.
        assert_eq!(changes.len(), 1);
        assert_eq!(changes[0].payload["new_status"], "unhealthy");
        assert_eq!(changes[0].level, EventLevel::Warning);
    }

    #[test]
    fn test_system_health_percentages() {
        let config = TelemetryConfig::default();
        let store = Arc::new(MemoryStore::new());
        let sink = TelemetrySink::new(
            Arc::clone(&store) as Arc<dyn TelemetryStore>,
            Default::default(),
        );
        let monitor = HealthMonitor::new(
            Arc::new(ToolRegistryBuilder::new().build()),
            sink,
            &config,
        );

        assert_eq!(monitor.system_health().overall_health, 100.0);

        monitor.record_outcome("a", true, 1.0, None);
        monitor.record_outcome("b", false, 1.0, Some("x".into()));

        let health = monitor.system_health();
        assert_eq!(health.providers.len(), 2);
        assert_eq!(health.overall_health, 50.0);
    }
}
