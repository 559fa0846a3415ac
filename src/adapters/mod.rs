// Copyright 2026 Layne Penney
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Event adapters: the single doorway between domain code and the pipeline.
//!
//! An adapter takes a raw domain payload, sanitizes it, classifies its
//! duration, attaches the current correlation scope, applies the per-kind
//! sampling decision, and hands the result to the sink. Every call returns
//! the built [`Envelope`] whether or not it was sampled, so callers never
//! branch on telemetry state.
//!
//! Failures on the telemetry path are logged and swallowed. Recording an
//! event must never break the operation being recorded.

mod envelope;

pub use envelope::{CorrelationSection, Envelope, MetaSection};

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Instant;

use serde_json::{json, Value};
use tracing::{debug, warn};
use uuid::Uuid;

use crate::config::{EventKind, TelemetryConfig};
use crate::correlation;
use crate::health::HealthMonitor;
use crate::sanitize::Sanitizer;
use crate::sink::TelemetrySink;
use crate::types::{ChainEntry, EventLevel, PerformanceSnapshot, TelemetryEvent, TelemetryMetric};

/// Optional attributes of an adapted event.
#[derive(Debug, Clone, Default)]
pub struct AdaptOptions {
    pub level: Option<EventLevel>,
    pub duration_ms: Option<f64>,
    pub error: Option<String>,
    pub memory_bytes: Option<u64>,
}

impl AdaptOptions {
    pub fn timed(duration_ms: f64) -> Self {
        Self {
            duration_ms: Some(duration_ms),
            ..Default::default()
        }
    }

    pub fn failed(error: impl Into<String>) -> Self {
        Self {
            level: Some(EventLevel::Error),
            error: Some(error.into()),
            ..Default::default()
        }
    }
}

/// Opaque handle for an in-flight tool invocation.
///
/// A disabled or unsampled start yields an inert id; completing an inert id
/// is a strict no-op, so callers thread the handle through unconditionally.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InvocationId(Option<Uuid>);

impl InvocationId {
    fn active() -> Self {
        Self(Some(Uuid::new_v4()))
    }

    /// The id handed out when telemetry is disabled or the invocation was
    /// not sampled.
    pub fn inert() -> Self {
        Self(None)
    }

    pub fn is_inert(&self) -> bool {
        self.0.is_none()
    }
}

struct ActiveInvocation {
    provider: String,
    params: Value,
    started_at: Instant,
    correlation_id: Option<String>,
}

/// Normalizes domain events into envelopes and tracks in-flight invocations.
pub struct EventAdapter {
    config: TelemetryConfig,
    sanitizer: Sanitizer,
    sink: TelemetrySink,
    health: Option<Arc<HealthMonitor>>,
    active: Mutex<HashMap<Uuid, ActiveInvocation>>,
}

impl EventAdapter {
    pub fn new(config: TelemetryConfig, sink: TelemetrySink) -> Self {
        let sanitizer = Sanitizer::new(
            &config.sanitize.rules,
            config.sanitize.max_field_length,
            config.sanitize.max_depth,
            config.sanitize.hash_salt.clone(),
        );
        Self {
            config,
            sanitizer,
            sink,
            health: None,
            active: Mutex::new(HashMap::new()),
        }
    }

    /// Attach a health monitor so completed invocations feed its counters.
    pub fn with_health_monitor(mut self, monitor: Arc<HealthMonitor>) -> Self {
        self.health = Some(monitor);
        self
    }

    /// Adapt one domain event. Sanitizes, classifies, correlates, samples,
    /// and records; always returns the envelope.
    pub fn adapt(
        &self,
        kind: EventKind,
        event_name: &str,
        data: Value,
        opts: AdaptOptions,
    ) -> Envelope {
        let sanitized = self.sanitizer.sanitize(&data);
        self.check_payload_size(event_name, &sanitized);

        let ctx = correlation::for_logging();
        let level = opts
            .level
            .unwrap_or(if opts.error.is_some() { EventLevel::Error } else { EventLevel::Info });

        let mut event = TelemetryEvent::new(kind.as_str(), event_name, sanitized).with_level(level);
        if let Some(id) = &ctx.correlation_id {
            event = event.with_correlation_id(id.clone());
        }
        if let Some(duration) = opts.duration_ms {
            event = event.with_duration_ms(duration);
        }
        if let Some(error) = &opts.error {
            event = event.with_error(error.clone());
        }

        let envelope = Envelope::wrap(&event, ctx, self.config.service_name.0.as_str());

        if self.should_record(kind, level) {
            if let Some(duration) = opts.duration_ms {
                self.record_snapshot(kind, event_name, duration, opts.memory_bytes, &event);
            }
            self.sink.record(event);
        }

        envelope
    }

    pub fn adapt_tool_event(&self, name: &str, data: Value, opts: AdaptOptions) -> Envelope {
        self.adapt(EventKind::Tool, name, data, opts)
    }

    pub fn adapt_command_event(&self, name: &str, data: Value, opts: AdaptOptions) -> Envelope {
        self.adapt(EventKind::Command, name, data, opts)
    }

    pub fn adapt_chat_event(&self, name: &str, data: Value, opts: AdaptOptions) -> Envelope {
        self.adapt(EventKind::Chat, name, data, opts)
    }

    pub fn adapt_fragment_event(&self, name: &str, data: Value, opts: AdaptOptions) -> Envelope {
        self.adapt(EventKind::Fragment, name, data, opts)
    }

    /// Begin tracking a tool invocation.
    ///
    /// Returns an inert id when telemetry is disabled or the invocation was
    /// not sampled; everything downstream of an inert id is a no-op.
    pub fn start_invocation(&self, provider: &str, params: &Value) -> InvocationId {
        if !self.config.is_enabled() || !self.sampled(EventKind::Tool) {
            return InvocationId::inert();
        }

        let sanitized = self.sanitizer.sanitize(params);
        let correlation_id = correlation::current_id().map(|id| id.as_str().to_string());

        let id = InvocationId::active();
        {
            let mut active = self.active.lock().unwrap();
            active.insert(
                id.0.unwrap(),
                ActiveInvocation {
                    provider: provider.to_string(),
                    params: sanitized.clone(),
                    started_at: Instant::now(),
                    correlation_id: correlation_id.clone(),
                },
            );
        }

        let mut event = TelemetryEvent::new(
            EventKind::Tool.as_str(),
            "tool.invocation_started",
            json!({ "provider": provider, "params": sanitized }),
        );
        if let Some(cid) = &correlation_id {
            event = event.with_correlation_id(cid.clone());
        }
        self.sink.record(event);

        if let Some(cid) = correlation_id {
            self.sink.record_chain_entry(ChainEntry::new(cid, provider));
        }

        id
    }

    /// Finish a tracked invocation. Unknown and inert ids are strict no-ops.
    pub fn complete_invocation(
        &self,
        id: &InvocationId,
        result: Option<&Value>,
        error: Option<&str>,
    ) {
        let Some(key) = id.0 else {
            return;
        };

        let entry = {
            let mut active = self.active.lock().unwrap();
            active.remove(&key)
        };
        let Some(entry) = entry else {
            debug!(invocation = %key, "Completion for unknown invocation ignored");
            return;
        };

        let duration_ms = entry.started_at.elapsed().as_secs_f64() * 1000.0;
        let category = self.config.thresholds(EventKind::Tool).classify(duration_ms);

        let result_bytes = result
            .map(|value| serde_json::to_string(value).map(|s| s.len()).unwrap_or(0))
            .unwrap_or(0);

        let success = error.is_none();
        let (event_name, level) = if success {
            ("tool.invocation_completed", EventLevel::Info)
        } else {
            ("tool.invocation_failed", EventLevel::Error)
        };

        let sanitized_error = error.map(|e| {
            self.sanitizer
                .sanitize(&Value::String(e.to_string()))
                .as_str()
                .unwrap_or(e)
                .to_string()
        });

        let mut event = TelemetryEvent::new(
            EventKind::Tool.as_str(),
            event_name,
            json!({
                "provider": entry.provider,
                "params": entry.params,
                "category": category.as_str(),
                "result_bytes": result_bytes,
            }),
        )
        .with_level(level)
        .with_duration_ms(duration_ms);
        if let Some(cid) = &entry.correlation_id {
            event = event.with_correlation_id(cid.clone());
        }
        if let Some(err) = &sanitized_error {
            event = event.with_error(err.clone());
        }

        if duration_ms > self.config.alerts.slow_operation_ms {
            warn!(
                provider = %entry.provider,
                duration_ms,
                threshold_ms = self.config.alerts.slow_operation_ms,
                "Slow tool invocation"
            );
        }

        self.sink.record_snapshot(PerformanceSnapshot {
            component: EventKind::Tool.as_str().to_string(),
            operation: entry.provider.clone(),
            duration_ms,
            category,
            memory_bytes: None,
            correlation_id: entry.correlation_id.clone(),
            timestamp: chrono::Utc::now(),
        });
        self.sink.record_metric(
            TelemetryMetric::new("tool.duration_ms", duration_ms).with_tag("tool", &entry.provider),
        );
        self.sink.record(event);

        if let Some(monitor) = &self.health {
            monitor.record_outcome(&entry.provider, success, duration_ms, sanitized_error);
        }
    }

    /// Number of invocations currently in flight.
    pub fn active_invocations(&self) -> usize {
        self.active.lock().unwrap().len()
    }

    fn should_record(&self, kind: EventKind, level: EventLevel) -> bool {
        if !self.config.is_enabled() {
            return false;
        }
        level.always_sampled() || self.sampled(kind)
    }

    /// Per-kind sampling decision. A rate of 1.0 keeps everything and never
    /// consults the RNG.
    fn sampled(&self, kind: EventKind) -> bool {
        let rate = self.config.sampling_rate(kind);
        rate >= 1.0 || fastrand::f64() < rate
    }

    fn record_snapshot(
        &self,
        kind: EventKind,
        operation: &str,
        duration_ms: f64,
        memory_bytes: Option<u64>,
        event: &TelemetryEvent,
    ) {
        let category = self.config.thresholds(kind).classify(duration_ms);
        self.sink.record_snapshot(PerformanceSnapshot {
            component: kind.as_str().to_string(),
            operation: operation.to_string(),
            duration_ms,
            category,
            memory_bytes,
            correlation_id: event.correlation_id.clone(),
            timestamp: event.timestamp,
        });
    }

    fn check_payload_size(&self, event_name: &str, payload: &Value) {
        if let Ok(serialized) = serde_json::to_string(payload) {
            if serialized.len() > self.config.alerts.payload_bytes {
                warn!(
                    event = %event_name,
                    bytes = serialized.len(),
                    limit = self.config.alerts.payload_bytes,
                    "Event payload exceeds configured size limit"
                );
            }
        }
    }
}
