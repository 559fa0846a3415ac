// Copyright 2026 Layne Penney
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Pulse - event telemetry and provider health monitoring.
//!
//! A library for instrumenting tool-calling applications: domain events are
//! normalized into a single wire envelope, sanitized, sampled, buffered, and
//! persisted, while registered tool providers are tracked through a
//! hysteresis health state machine.
//!
//! # Architecture
//!
//! The crate is organized into the following modules:
//!
//! - [`types`] - Core type definitions (TelemetryEvent, HealthCheckResult, etc.)
//! - [`error`] - Error types and result aliases
//! - [`config`] - Configuration loading and defaults
//! - [`correlation`] - Scope-local correlation id propagation
//! - [`sanitize`] - Payload redaction, hashing, and truncation
//! - [`adapters`] - Domain event normalization into wire envelopes
//! - [`sink`] - Bounded buffering in front of durable storage
//! - [`registry`] - Tool provider contract and lookup
//! - [`health`] - Per-provider hysteresis health monitoring
//! - [`storage`] - Durable store trait with memory and SQLite backends
//! - [`retention`] - Age-based cleanup of persisted telemetry
//! - [`query`] - Read-side statistics, performance, and error analysis
//! - [`logging`] - Tracing subscriber setup
//!
//! # Example
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use pulse::adapters::EventAdapter;
//! use pulse::config::load_config;
//! use pulse::sink::TelemetrySink;
//! use pulse::storage::SqliteStore;
//!
//! let config = load_config(std::path::Path::new("."))?;
//! let store = Arc::new(SqliteStore::open("telemetry.db")?);
//! let sink = TelemetrySink::new(store, config.sink.clone());
//! let adapter = EventAdapter::new(config, sink);
//!
//! let id = adapter.start_invocation("db.query", &args);
//! // ... run the tool ...
//! adapter.complete_invocation(&id, Some(&result), None);
//! ```

pub mod adapters;
pub mod config;
pub mod correlation;
pub mod error;
pub mod health;
pub mod logging;
pub mod query;
pub mod registry;
pub mod retention;
pub mod sanitize;
pub mod sink;
pub mod storage;
pub mod types;

pub use adapters::{AdaptOptions, Envelope, EventAdapter, InvocationId};
pub use config::{EventKind, TelemetryConfig};
pub use error::{ConfigError, ProviderError, Result, RetentionError, StorageError};
pub use health::{HealthMonitor, HealthState};
pub use registry::{ToolDefinition, ToolProvider, ToolRegistry, ToolRegistryBuilder};
pub use sink::TelemetrySink;
pub use storage::{Category, MemoryStore, QueryFilter, SqliteStore, TelemetryStore};
pub use types::{EventLevel, HealthCheckResult, PerfCategory, TelemetryEvent, TelemetryMetric};

/// Crate version, stamped into every envelope's `meta.version`.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
