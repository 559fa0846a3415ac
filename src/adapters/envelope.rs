// Copyright 2026 Layne Penney
// SPDX-License-Identifier: AGPL-3.0-or-later

//! The wire envelope every adapted event is wrapped in.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::correlation::LogContext;
use crate::types::TelemetryEvent;

/// Correlation section of the envelope. `correlation_id` is absent when the
/// event was emitted outside any correlation scope.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CorrelationSection {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub correlation_id: Option<String>,
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub context: HashMap<String, serde_json::Value>,
}

impl From<LogContext> for CorrelationSection {
    fn from(ctx: LogContext) -> Self {
        Self {
            correlation_id: ctx.correlation_id,
            context: ctx.context,
        }
    }
}

/// Meta section: when, which emission, from which service build.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetaSection {
    pub timestamp: DateTime<Utc>,
    /// Unique per emission, distinct from the correlation id.
    pub event_id: String,
    pub service: String,
    pub version: String,
}

/// Uniform wire shape: the event name plus exactly three sections.
///
/// `data` is the sanitized domain payload; consumers that only need routing
/// can read `event` and `meta` without touching it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Envelope {
    pub event: String,
    pub data: serde_json::Value,
    pub correlation: CorrelationSection,
    pub meta: MetaSection,
}

impl Envelope {
    /// Wrap an already-sanitized event, stamping a fresh event id.
    pub fn wrap(event: &TelemetryEvent, correlation: LogContext, service: &str) -> Self {
        Self {
            event: event.event_name.clone(),
            data: event.payload.clone(),
            correlation: correlation.into(),
            meta: MetaSection {
                timestamp: event.timestamp,
                event_id: Uuid::new_v4().to_string(),
                service: service.to_string(),
                version: crate::VERSION.to_string(),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_envelope_has_exactly_three_sections_beside_event() {
        let event = TelemetryEvent::new("tool", "tool.invocation_started", json!({"a": 1}));
        let envelope = Envelope::wrap(
            &event,
            LogContext {
                correlation_id: Some("req-12345678".to_string()),
                timestamp: Utc::now(),
                context: HashMap::new(),
            },
            "pulse",
        );

        let value = serde_json::to_value(&envelope).unwrap();
        let keys: Vec<&String> = value.as_object().unwrap().keys().collect();
        assert_eq!(keys, ["correlation", "data", "event", "meta"]);
        assert_eq!(value["event"], "tool.invocation_started");
        assert_eq!(value["data"]["a"], 1);
        assert_eq!(value["correlation"]["correlation_id"], "req-12345678");
        assert_eq!(value["meta"]["service"], "pulse");
    }

    #[test]
    fn test_event_ids_are_unique_per_emission() {
        let event = TelemetryEvent::new("chat", "chat.turn", json!({}));
        let ctx = crate::correlation::for_logging();
        let a = Envelope::wrap(&event, ctx.clone(), "pulse");
        let b = Envelope::wrap(&event, crate::correlation::for_logging(), "pulse");
        assert_ne!(a.meta.event_id, b.meta.event_id);
    }
}
