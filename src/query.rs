// Copyright 2026 Layne Penney
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Read-side analysis over persisted telemetry.
//!
//! Everything here is computed from store rows, so the health view is the
//! historical record of probe outcomes, not the monitor's live state.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::error::StorageError;
use crate::storage::{QueryFilter, TelemetryStore};
use crate::types::{EventLevel, PerfCategory};

/// Aggregate counts over a window of events.
#[derive(Debug, Clone, Serialize)]
pub struct EventStatistics {
    pub total: u64,
    pub errors: u64,
    /// Percentage of error and critical events; 0.0 for an empty window.
    pub error_rate: f64,
    pub by_component: HashMap<String, u64>,
    pub by_level: HashMap<EventLevel, u64>,
}

/// Duration and memory profile over a window of snapshots.
#[derive(Debug, Clone, Serialize)]
pub struct PerformanceAnalysis {
    pub count: u64,
    pub avg_duration_ms: f64,
    pub p95_duration_ms: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub avg_memory_bytes: Option<f64>,
    pub by_category: HashMap<PerfCategory, u64>,
}

/// Historical availability computed from persisted health check rows.
#[derive(Debug, Clone, Serialize)]
pub struct HealthStatus {
    pub total_checks: u64,
    pub healthy_checks: u64,
    /// 100.0 when no checks were recorded in the window.
    pub availability_percent: f64,
    pub by_provider: HashMap<String, ProviderAvailability>,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct ProviderAvailability {
    pub total: u64,
    pub healthy: u64,
}

/// A cluster of similar error messages.
#[derive(Debug, Clone, Serialize)]
pub struct ErrorPattern {
    /// Normalized message prefix the cluster is keyed on.
    pub signature: String,
    pub count: u64,
    pub components: Vec<String>,
    pub last_seen: DateTime<Utc>,
}

/// Read-side facade over a [`TelemetryStore`].
pub struct QueryService<'a> {
    store: &'a dyn TelemetryStore,
}

impl<'a> QueryService<'a> {
    pub fn new(store: &'a dyn TelemetryStore) -> Self {
        Self { store }
    }

    pub fn event_statistics(&self, filter: &QueryFilter) -> Result<EventStatistics, StorageError> {
        let events = self.store.query_events(filter)?;

        let total = events.len() as u64;
        let errors = events.iter().filter(|e| e.is_error()).count() as u64;
        let mut by_component: HashMap<String, u64> = HashMap::new();
        let mut by_level: HashMap<EventLevel, u64> = HashMap::new();
        for event in &events {
            *by_component.entry(event.component.clone()).or_default() += 1;
            *by_level.entry(event.level).or_default() += 1;
        }

        Ok(EventStatistics {
            total,
            errors,
            error_rate: if total == 0 {
                0.0
            } else {
                errors as f64 / total as f64 * 100.0
            },
            by_component,
            by_level,
        })
    }

    pub fn performance_analysis(
        &self,
        filter: &QueryFilter,
    ) -> Result<PerformanceAnalysis, StorageError> {
        let snapshots = self.store.query_snapshots(filter)?;

        let count = snapshots.len() as u64;
        let mut by_category: HashMap<PerfCategory, u64> = HashMap::new();
        for snapshot in &snapshots {
            *by_category.entry(snapshot.category).or_default() += 1;
        }

        let mut durations: Vec<f64> = snapshots.iter().map(|s| s.duration_ms).collect();
        durations.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));
        let avg_duration_ms = if durations.is_empty() {
            0.0
        } else {
            durations.iter().sum::<f64>() / durations.len() as f64
        };

        let memory: Vec<u64> = snapshots.iter().filter_map(|s| s.memory_bytes).collect();
        let avg_memory_bytes = if memory.is_empty() {
            None
        } else {
            Some(memory.iter().sum::<u64>() as f64 / memory.len() as f64)
        };

        Ok(PerformanceAnalysis {
            count,
            avg_duration_ms,
            p95_duration_ms: percentile(&durations, 0.95),
            avg_memory_bytes,
            by_category,
        })
    }

    pub fn health_status(&self, filter: &QueryFilter) -> Result<HealthStatus, StorageError> {
        let checks = self.store.query_health_checks(filter)?;

        let total_checks = checks.len() as u64;
        let healthy_checks = checks.iter().filter(|c| c.healthy).count() as u64;
        let mut by_provider: HashMap<String, ProviderAvailability> = HashMap::new();
        for check in &checks {
            let entry = by_provider.entry(check.provider_name.clone()).or_default();
            entry.total += 1;
            if check.healthy {
                entry.healthy += 1;
            }
        }

        Ok(HealthStatus {
            total_checks,
            healthy_checks,
            availability_percent: if total_checks == 0 {
                100.0
            } else {
                healthy_checks as f64 / total_checks as f64 * 100.0
            },
            by_provider,
        })
    }

    /// Cluster error and critical events by a normalized message prefix.
    ///
    /// Normalization lowercases the message, collapses digit runs to `N`,
    /// and keeps the first `prefix_words` words, so "Timeout after 30s" and
    /// "Timeout after 45s" land in the same cluster.
    pub fn error_patterns(
        &self,
        filter: &QueryFilter,
        prefix_words: usize,
    ) -> Result<Vec<ErrorPattern>, StorageError> {
        let events = self.store.query_events(filter)?;

        struct Cluster {
            count: u64,
            components: Vec<String>,
            last_seen: DateTime<Utc>,
        }

        let mut clusters: HashMap<String, Cluster> = HashMap::new();
        for event in events.iter().filter(|e| e.is_error()) {
            let message = event
                .error_message
                .as_deref()
                .unwrap_or(event.event_name.as_str());
            let signature = normalize_signature(message, prefix_words);

            let cluster = clusters.entry(signature).or_insert(Cluster {
                count: 0,
                components: Vec::new(),
                last_seen: event.timestamp,
            });
            cluster.count += 1;
            if !cluster.components.contains(&event.component) {
                cluster.components.push(event.component.clone());
            }
            if event.timestamp > cluster.last_seen {
                cluster.last_seen = event.timestamp;
            }
        }

        let mut patterns: Vec<ErrorPattern> = clusters
            .into_iter()
            .map(|(signature, c)| ErrorPattern {
                signature,
                count: c.count,
                components: c.components,
                last_seen: c.last_seen,
            })
            .collect();
        patterns.sort_by(|a, b| b.count.cmp(&a.count).then(a.signature.cmp(&b.signature)));
        Ok(patterns)
    }
}

/// Nearest-rank percentile over pre-sorted values; 0.0 on empty input.
fn percentile(sorted: &[f64], q: f64) -> f64 {
    if sorted.is_empty() {
        return 0.0;
    }
    let rank = (q * sorted.len() as f64).ceil() as usize;
    sorted[rank.clamp(1, sorted.len()) - 1]
}

fn normalize_signature(message: &str, prefix_words: usize) -> String {
    let lowered = message.to_lowercase();
    let mut collapsed = String::with_capacity(lowered.len());
    let mut in_digits = false;
    for ch in lowered.chars() {
        if ch.is_ascii_digit() {
            if !in_digits {
                collapsed.push('N');
                in_digits = true;
            }
        } else {
            collapsed.push(ch);
            in_digits = false;
        }
    }
    collapsed
        .split_whitespace()
        .take(prefix_words.max(1))
        .collect::<Vec<_>>()
        .join(" ")
}
