// Copyright 2026 Layne Penney
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Correlation ID management and task-scoped context propagation.
//!
//! Correlation IDs link all telemetry emitted for one logical operation.
//! Each unit of work runs inside a [`scope`] (or [`scope_with`]) which owns
//! an isolated [`CorrelationScope`]; concurrent tasks never observe each
//! other's id or context. The scope is stored in tokio task-local storage
//! and is cleared on every exit path, including panics and cancellation,
//! because the storage is torn down when the scoped future is dropped.

use std::cell::RefCell;
use std::collections::HashMap;
use std::fmt;
use std::future::Future;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Minimum accepted length for an opaque client-supplied token.
const MIN_TOKEN_LEN: usize = 8;
/// Maximum accepted length for an opaque client-supplied token.
const MAX_TOKEN_LEN: usize = 128;

/// A unique identifier for tracing related operations across async boundaries.
///
/// Canonically a v4 UUID, but clients may supply an opaque token of 8-128
/// characters in `[A-Za-z0-9._-]`. A malformed supplied id is never an
/// error; callers substitute a freshly generated UUID instead.
#[derive(Clone, PartialEq, Eq, Hash)]
pub struct CorrelationId(String);

impl CorrelationId {
    /// Generate a new random correlation ID.
    pub fn new() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    /// Validate a client-supplied id: a UUID or an 8-128 char token.
    pub fn parse(s: &str) -> Option<Self> {
        if Uuid::parse_str(s).is_ok() {
            return Some(Self(s.to_string()));
        }
        let valid_token = (MIN_TOKEN_LEN..=MAX_TOKEN_LEN).contains(&s.len())
            && s.bytes()
                .all(|b| b.is_ascii_alphanumeric() || matches!(b, b'.' | b'_' | b'-'));
        valid_token.then(|| Self(s.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Get a short representation (first 8 characters).
    pub fn short(&self) -> &str {
        &self.0[..self.0.len().min(8)]
    }
}

impl Default for CorrelationId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for CorrelationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl fmt::Debug for CorrelationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "CorrelationId({})", self.short())
    }
}

impl Serialize for CorrelationId {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_str(&self.0)
    }
}

impl<'de> Deserialize<'de> for CorrelationId {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        Ok(CorrelationId::parse(&s).unwrap_or_else(CorrelationId::new))
    }
}

/// Scope-local correlation state: one id plus a free-form context map.
#[derive(Debug, Clone)]
pub struct CorrelationScope {
    id: CorrelationId,
    context: HashMap<String, serde_json::Value>,
}

impl CorrelationScope {
    fn new(id: CorrelationId) -> Self {
        Self {
            id,
            context: HashMap::new(),
        }
    }
}

tokio::task_local! {
    static SCOPE: RefCell<CorrelationScope>;
}

/// Correlation fields attached to every emitted envelope and log line.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogContext {
    pub correlation_id: Option<String>,
    pub timestamp: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub context: HashMap<String, serde_json::Value>,
}

/// Run a future inside a fresh correlation scope with a generated id.
pub async fn scope<F>(fut: F) -> F::Output
where
    F: Future,
{
    scope_with(None, fut).await
}

/// Run a future inside a fresh correlation scope.
///
/// A supplied id is validated; a malformed one is silently replaced with a
/// generated UUID. The scope is isolated from, and invisible to, any other
/// concurrently running scope.
pub async fn scope_with<F>(id: Option<&str>, fut: F) -> F::Output
where
    F: Future,
{
    let id = id
        .and_then(CorrelationId::parse)
        .unwrap_or_else(CorrelationId::new);
    SCOPE
        .scope(RefCell::new(CorrelationScope::new(id)), fut)
        .await
}

/// Replace the current scope's id (never merges).
///
/// A malformed or absent supplied id yields a freshly generated UUID.
/// Returns the id now in effect, or `None` when called outside a scope.
pub fn set(id: Option<&str>) -> Option<CorrelationId> {
    let id = id
        .and_then(CorrelationId::parse)
        .unwrap_or_else(CorrelationId::new);
    SCOPE
        .try_with(|scope| {
            let mut scope = scope.borrow_mut();
            scope.id = id.clone();
            id
        })
        .ok()
}

/// Get the current scope's correlation id, if inside a scope.
pub fn current_id() -> Option<CorrelationId> {
    SCOPE.try_with(|scope| scope.borrow().id.clone()).ok()
}

/// Merge a key/value pair into the current scope's context map.
///
/// No-op outside a scope.
pub fn add_context(key: impl Into<String>, value: serde_json::Value) {
    let _ = SCOPE.try_with(|scope| {
        scope.borrow_mut().context.insert(key.into(), value);
    });
}

/// Whether the current task is running inside a correlation scope.
pub fn has_context() -> bool {
    SCOPE.try_with(|_| ()).is_ok()
}

/// Reset the current scope to a fresh id and empty context.
pub fn clear() {
    let _ = SCOPE.try_with(|scope| {
        *scope.borrow_mut() = CorrelationScope::new(CorrelationId::new());
    });
}

/// Snapshot the current scope for attaching to logs and envelopes.
///
/// Outside a scope this returns a timestamped snapshot with no id, so
/// callers never need conditional logic.
pub fn for_logging() -> LogContext {
    SCOPE
        .try_with(|scope| {
            let scope = scope.borrow();
            LogContext {
                correlation_id: Some(scope.id.to_string()),
                timestamp: Utc::now(),
                context: scope.context.clone(),
            }
        })
        .unwrap_or_else(|_| LogContext {
            correlation_id: None,
            timestamp: Utc::now(),
            context: HashMap::new(),
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_parse_uuid() {
        let id = CorrelationId::parse("550e8400-e29b-41d4-a716-446655440000").unwrap();
        assert_eq!(id.short(), "550e8400");
    }

    #[test]
    fn test_parse_token() {
        assert!(CorrelationId::parse("req-00042.a").is_some());
        assert!(CorrelationId::parse("short").is_none());
        assert!(CorrelationId::parse("has spaces no").is_none());
        assert!(CorrelationId::parse(&"x".repeat(129)).is_none());
        assert!(CorrelationId::parse(&"x".repeat(128)).is_some());
    }

    #[test]
    fn test_new_ids_differ() {
        assert_ne!(CorrelationId::new(), CorrelationId::new());
    }

    #[test]
    fn test_outside_scope_defaults() {
        assert!(current_id().is_none());
        assert!(!has_context());
        assert!(set(Some("whatever-id")).is_none());
        let ctx = for_logging();
        assert!(ctx.correlation_id.is_none());
        assert!(ctx.context.is_empty());
    }

    #[tokio::test]
    async fn test_scope_with_valid_id() {
        scope_with(Some("550e8400-e29b-41d4-a716-446655440000"), async {
            assert_eq!(
                current_id().unwrap().as_str(),
                "550e8400-e29b-41d4-a716-446655440000"
            );
        })
        .await;
    }

    #[tokio::test]
    async fn test_scope_with_invalid_id_generates_uuid() {
        scope_with(Some("bad"), async {
            let id = current_id().unwrap();
            assert_ne!(id.as_str(), "bad");
            assert!(Uuid::parse_str(id.as_str()).is_ok());
        })
        .await;
    }

    #[tokio::test]
    async fn test_set_replaces_never_merges() {
        scope(async {
            let first = current_id().unwrap();
            let second = set(Some("replacement-token")).unwrap();
            assert_ne!(first, second);
            assert_eq!(current_id().unwrap().as_str(), "replacement-token");
        })
        .await;
    }

    #[tokio::test]
    async fn test_context_and_clear() {
        scope(async {
            add_context("session", json!("abc"));
            let ctx = for_logging();
            assert_eq!(ctx.context.get("session"), Some(&json!("abc")));

            clear();
            assert!(for_logging().context.is_empty());
        })
        .await;
    }

    #[tokio::test]
    async fn test_concurrent_scopes_are_isolated() {
        let a = tokio::spawn(scope_with(Some("task-a-token"), async {
            tokio::time::sleep(std::time::Duration::from_millis(10)).await;
            current_id().unwrap().to_string()
        }));
        let b = tokio::spawn(scope_with(Some("task-b-token"), async {
            tokio::time::sleep(std::time::Duration::from_millis(10)).await;
            current_id().unwrap().to_string()
        }));

        assert_eq!(a.await.unwrap(), "task-a-token");
        assert_eq!(b.await.unwrap(), "task-b-token");
    }
}
