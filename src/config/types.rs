// Copyright 2026 Layne Penney
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Configuration type definitions.
//!
//! The pipeline consumes this configuration; it never produces it. Every
//! field has a default so a zero-config embedding works out of the box.

use serde::{Deserialize, Serialize};

use crate::sanitize::SanitizeRule;
use crate::types::PerfCategory;

/// The category of domain work an event describes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EventKind {
    /// AI provider / tool invocations.
    Tool,
    /// Command DSL step executions.
    Command,
    /// Chat turns.
    Chat,
    /// Streaming fragments within a chat turn.
    Fragment,
}

impl EventKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Tool => "tool",
            Self::Command => "command",
            Self::Chat => "chat",
            Self::Fragment => "fragment",
        }
    }
}

impl std::fmt::Display for EventKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One value per event kind, addressable by [`EventKind`].
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PerEventKind<T: Default> {
    pub tool: T,
    pub command: T,
    pub chat: T,
    pub fragment: T,
}

impl<T: Default> Default for PerEventKind<T> {
    fn default() -> Self {
        Self {
            tool: T::default(),
            command: T::default(),
            chat: T::default(),
            fragment: T::default(),
        }
    }
}

impl<T: Default> PerEventKind<T> {
    pub fn get(&self, kind: EventKind) -> &T {
        match kind {
            EventKind::Tool => &self.tool,
            EventKind::Command => &self.command,
            EventKind::Chat => &self.chat,
            EventKind::Fragment => &self.fragment,
        }
    }

    pub fn uniform(value: T) -> Self
    where
        T: Clone,
    {
        Self {
            tool: value.clone(),
            command: value.clone(),
            chat: value.clone(),
            fragment: value,
        }
    }
}

/// Probability (0.0-1.0) of retaining an event of a given kind.
///
/// Error and critical events are always retained regardless of rate.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SamplingRate(pub f64);

impl Default for SamplingRate {
    fn default() -> Self {
        Self(1.0)
    }
}

impl SamplingRate {
    /// Clamp into [0.0, 1.0].
    pub fn clamped(&self) -> f64 {
        self.0.clamp(0.0, 1.0)
    }
}

/// Ordered duration thresholds (milliseconds) defining performance buckets.
///
/// `duration < fast` is fast, `< normal` normal, `< slow` slow,
/// `< very_slow` very slow, anything beyond is critical.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(default)]
pub struct PerfThresholds {
    pub fast_ms: f64,
    pub normal_ms: f64,
    pub slow_ms: f64,
    pub very_slow_ms: f64,
}

impl Default for PerfThresholds {
    fn default() -> Self {
        Self {
            fast_ms: 100.0,
            normal_ms: 500.0,
            slow_ms: 2_000.0,
            very_slow_ms: 10_000.0,
        }
    }
}

impl PerfThresholds {
    /// Classify a measured duration into its bucket.
    pub fn classify(&self, duration_ms: f64) -> PerfCategory {
        if duration_ms < self.fast_ms {
            PerfCategory::Fast
        } else if duration_ms < self.normal_ms {
            PerfCategory::Normal
        } else if duration_ms < self.slow_ms {
            PerfCategory::Slow
        } else if duration_ms < self.very_slow_ms {
            PerfCategory::VerySlow
        } else {
            PerfCategory::Critical
        }
    }
}

/// Sanitization settings (see [`crate::sanitize`]).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SanitizeConfig {
    /// Typed `{pattern, strategy}` rules; empty falls back to built-ins.
    pub rules: Vec<SanitizeRule>,
    pub max_field_length: usize,
    pub max_depth: usize,
    pub hash_salt: String,
}

impl Default for SanitizeConfig {
    fn default() -> Self {
        Self {
            rules: Vec::new(),
            max_field_length: 256,
            max_depth: 16,
            hash_salt: "pulse".to_string(),
        }
    }
}

/// Alerting thresholds consumed by adapters and the health monitor.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AlertConfig {
    pub slow_operation_ms: f64,
    pub memory_bytes: u64,
    pub payload_bytes: usize,
    pub error_rate_percent: f64,
    /// Percentage of healthy providers below which `check_all_tools` alerts.
    pub unhealthy_percent: f64,
}

impl Default for AlertConfig {
    fn default() -> Self {
        Self {
            slow_operation_ms: 5_000.0,
            memory_bytes: 512 * 1024 * 1024,
            payload_bytes: 256 * 1024,
            error_rate_percent: 10.0,
            unhealthy_percent: 80.0,
        }
    }
}

/// Health monitoring settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HealthConfig {
    pub enabled: bool,
    /// Probe timeout; a hung provider counts as a failure after this.
    pub timeout_ms: u64,
    /// Consecutive failures before a provider flips to unhealthy.
    pub failure_threshold: u32,
    /// Consecutive successes before an unhealthy provider recovers.
    pub recovery_threshold: u32,
    /// Tool names probed by `check_all_tools`.
    pub tools: Vec<String>,
}

impl Default for HealthConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            timeout_ms: 5_000,
            failure_threshold: 3,
            recovery_threshold: 2,
            tools: Vec::new(),
        }
    }
}

/// Sink buffering/flush settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SinkConfig {
    /// Per-category buffer capacity; reaching it forces a flush.
    pub max_buffer_size: usize,
    /// Hand durable writes to a background task instead of inline.
    pub async_processing: bool,
    /// Failed durable writes are retried this many times, then dropped.
    pub flush_retries: u32,
}

impl Default for SinkConfig {
    fn default() -> Self {
        Self {
            max_buffer_size: 100,
            async_processing: false,
            flush_retries: 3,
        }
    }
}

/// Per-category retention windows in days.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RetentionConfig {
    pub events_days: u32,
    pub metrics_days: u32,
    pub health_checks_days: u32,
    pub snapshots_days: u32,
    pub chains_days: u32,
}

impl Default for RetentionConfig {
    fn default() -> Self {
        Self {
            events_days: 30,
            metrics_days: 30,
            health_checks_days: 14,
            snapshots_days: 14,
            chains_days: 7,
        }
    }
}

/// Top-level telemetry configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct TelemetryConfig {
    pub enabled: Enabled,
    /// Recorded in every envelope's `meta.service`.
    pub service_name: ServiceName,
    pub sampling: PerEventKind<SamplingRate>,
    pub performance: PerEventKind<PerfThresholds>,
    pub sanitize: SanitizeConfig,
    pub alerts: AlertConfig,
    pub health: HealthConfig,
    pub sink: SinkConfig,
    pub retention: RetentionConfig,
}

/// Wrapper so `enabled` defaults to true under `#[serde(default)]`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Enabled(pub bool);

impl Default for Enabled {
    fn default() -> Self {
        Self(true)
    }
}

/// Wrapper giving `service_name` a non-empty default.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ServiceName(pub String);

impl Default for ServiceName {
    fn default() -> Self {
        Self("pulse".to_string())
    }
}

impl TelemetryConfig {
    pub fn is_enabled(&self) -> bool {
        self.enabled.0
    }

    pub fn sampling_rate(&self, kind: EventKind) -> f64 {
        self.sampling.get(kind).clamped()
    }

    pub fn thresholds(&self, kind: EventKind) -> &PerfThresholds {
        self.performance.get(kind)
    }
}
