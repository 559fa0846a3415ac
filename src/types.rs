// Copyright 2026 Layne Penney
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Core types for the pulse telemetry pipeline.
//!
//! This module defines the fundamental data structures used throughout the crate:
//! telemetry events and metrics, health check results, performance snapshots,
//! and cross-tool chain entries.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

// ============================================================================
// Events and metrics
// ============================================================================

/// Severity level of a telemetry event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EventLevel {
    Info,
    Warning,
    Error,
    Critical,
}

impl EventLevel {
    /// Error and critical events bypass sampling and are always retained.
    pub fn always_sampled(&self) -> bool {
        matches!(self, Self::Error | Self::Critical)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Info => "info",
            Self::Warning => "warning",
            Self::Error => "error",
            Self::Critical => "critical",
        }
    }
}

impl std::str::FromStr for EventLevel {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "info" => Ok(Self::Info),
            "warning" => Ok(Self::Warning),
            "error" => Ok(Self::Error),
            "critical" => Ok(Self::Critical),
            other => Err(format!("unknown event level: {other}")),
        }
    }
}

/// A single normalized telemetry event.
///
/// Created by the adapters with an already-sanitized payload, held
/// transiently in the sink, and eventually persisted and aged out by
/// retention enforcement.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TelemetryEvent {
    /// Originating component (e.g. "tool", "command", "chat", "health").
    pub component: String,

    /// Event name (e.g. "tool.invocation_completed").
    pub event_name: String,

    pub level: EventLevel,

    /// Sanitized, domain-specific payload.
    pub payload: serde_json::Value,

    /// Correlation id of the scope this event was emitted under, if any.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub correlation_id: Option<String>,

    pub timestamp: DateTime<Utc>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub duration_ms: Option<f64>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
}

impl TelemetryEvent {
    /// Create an info-level event with the current timestamp.
    pub fn new(
        component: impl Into<String>,
        event_name: impl Into<String>,
        payload: serde_json::Value,
    ) -> Self {
        Self {
            component: component.into(),
            event_name: event_name.into(),
            level: EventLevel::Info,
            payload,
            correlation_id: None,
            timestamp: Utc::now(),
            duration_ms: None,
            error_message: None,
        }
    }

    pub fn with_level(mut self, level: EventLevel) -> Self {
        self.level = level;
        self
    }

    pub fn with_duration_ms(mut self, duration_ms: f64) -> Self {
        self.duration_ms = Some(duration_ms);
        self
    }

    pub fn with_error(mut self, message: impl Into<String>) -> Self {
        self.error_message = Some(message.into());
        self
    }

    pub fn with_correlation_id(mut self, id: impl Into<String>) -> Self {
        self.correlation_id = Some(id.into());
        self
    }

    /// Whether this event represents a failure.
    pub fn is_error(&self) -> bool {
        matches!(self.level, EventLevel::Error | EventLevel::Critical)
    }
}

/// A single named measurement with tags.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TelemetryMetric {
    pub name: String,
    pub value: f64,
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub tags: HashMap<String, String>,
    pub timestamp: DateTime<Utc>,
}

impl TelemetryMetric {
    pub fn new(name: impl Into<String>, value: f64) -> Self {
        Self {
            name: name.into(),
            value,
            tags: HashMap::new(),
            timestamp: Utc::now(),
        }
    }

    pub fn with_tag(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.tags.insert(key.into(), value.into());
        self
    }
}

// ============================================================================
// Health
// ============================================================================

/// Outcome of a single provider probe.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthCheckResult {
    pub provider_name: String,
    pub healthy: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub response_time_ms: f64,
    pub timestamp: DateTime<Utc>,
}

impl HealthCheckResult {
    pub fn success(provider_name: impl Into<String>, response_time_ms: f64) -> Self {
        Self {
            provider_name: provider_name.into(),
            healthy: true,
            error: None,
            response_time_ms,
            timestamp: Utc::now(),
        }
    }

    pub fn failure(
        provider_name: impl Into<String>,
        response_time_ms: f64,
        error: impl Into<String>,
    ) -> Self {
        Self {
            provider_name: provider_name.into(),
            healthy: false,
            error: Some(error.into()),
            response_time_ms,
            timestamp: Utc::now(),
        }
    }
}

// ============================================================================
// Performance
// ============================================================================

/// Named duration bucket derived from configured thresholds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PerfCategory {
    Fast,
    Normal,
    Slow,
    VerySlow,
    Critical,
}

impl PerfCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Fast => "fast",
            Self::Normal => "normal",
            Self::Slow => "slow",
            Self::VerySlow => "very_slow",
            Self::Critical => "critical",
        }
    }

    /// All categories in ascending order of severity.
    pub fn all() -> [PerfCategory; 5] {
        [
            Self::Fast,
            Self::Normal,
            Self::Slow,
            Self::VerySlow,
            Self::Critical,
        ]
    }
}

impl std::fmt::Display for PerfCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for PerfCategory {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "fast" => Ok(Self::Fast),
            "normal" => Ok(Self::Normal),
            "slow" => Ok(Self::Slow),
            "very_slow" => Ok(Self::VerySlow),
            "critical" => Ok(Self::Critical),
            other => Err(format!("unknown performance category: {other}")),
        }
    }
}

/// A persisted record of one timed operation, used for performance analysis.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PerformanceSnapshot {
    pub component: String,
    pub operation: String,
    pub duration_ms: f64,
    pub category: PerfCategory,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub memory_bytes: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub correlation_id: Option<String>,
    pub timestamp: DateTime<Utc>,
}

// ============================================================================
// Tool chains
// ============================================================================

/// One step of a cross-tool chain: which tool ran under which correlation id.
///
/// Rows with the same correlation id, ordered by timestamp, reconstruct the
/// tool sequence of one logical request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChainEntry {
    pub correlation_id: String,
    pub tool_name: String,
    pub timestamp: DateTime<Utc>,
}

impl ChainEntry {
    pub fn new(correlation_id: impl Into<String>, tool_name: impl Into<String>) -> Self {
        Self {
            correlation_id: correlation_id.into(),
            tool_name: tool_name.into(),
            timestamp: Utc::now(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_level_always_sampled() {
        assert!(!EventLevel::Info.always_sampled());
        assert!(!EventLevel::Warning.always_sampled());
        assert!(EventLevel::Error.always_sampled());
        assert!(EventLevel::Critical.always_sampled());
    }

    #[test]
    fn test_event_level_round_trip() {
        for level in [
            EventLevel::Info,
            EventLevel::Warning,
            EventLevel::Error,
            EventLevel::Critical,
        ] {
            let parsed: EventLevel = level.as_str().parse().unwrap();
            assert_eq!(parsed, level);
        }
    }

    #[test]
    fn test_event_builder() {
        let event = TelemetryEvent::new("tool", "tool.invocation_failed", serde_json::json!({}))
            .with_level(EventLevel::Error)
            .with_duration_ms(42.0)
            .with_error("boom");

        assert!(event.is_error());
        assert_eq!(event.duration_ms, Some(42.0));
        assert_eq!(event.error_message.as_deref(), Some("boom"));
    }

    #[test]
    fn test_metric_tags() {
        let metric = TelemetryMetric::new("tool.duration_ms", 12.5).with_tag("tool", "db.query");
        assert_eq!(metric.tags.get("tool").map(String::as_str), Some("db.query"));
    }

    #[test]
    fn test_health_check_result_failure() {
        let result = HealthCheckResult::failure("db.query", 10.0, "Health check failed: timeout");
        assert!(!result.healthy);
        assert!(result.error.as_deref().unwrap().starts_with("Health check failed"));
    }

    #[test]
    fn test_perf_category_serde() {
        let json = serde_json::to_string(&PerfCategory::VerySlow).unwrap();
        assert_eq!(json, "\"very_slow\"");
    }
}
