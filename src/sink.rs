// Copyright 2026 Layne Penney
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Bounded, concurrently-written telemetry sink.
//!
//! Producers append into per-category in-memory buffers; a buffer that
//! reaches `max_buffer_size` is force-flushed to the durable store before
//! the new row is accepted, so a buffer never exceeds its capacity and data
//! loss is never silent. Flushing swaps the buffer contents out under the
//! lock (`mem::take`), so producers keep writing to the fresh buffer while
//! the drained generation is persisted, and each generation is drained
//! exactly once.
//!
//! Failures in the sink never propagate into the instrumented operation:
//! a failed durable write is retried a bounded number of times, then the
//! batch is dropped with a logged warning and an incremented counter.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use serde::Serialize;
use tracing::{debug, warn};

use crate::config::SinkConfig;
use crate::error::StorageError;
use crate::storage::{Category, TelemetryStore};
use crate::types::{
    ChainEntry, HealthCheckResult, PerformanceSnapshot, TelemetryEvent, TelemetryMetric,
};

/// Fill level of one category buffer.
#[derive(Debug, Clone, Copy, Serialize)]
pub struct BufferStatus {
    pub size: usize,
    pub max: usize,
}

/// Snapshot of all buffers plus error accounting, for backpressure and
/// alerting consumers.
#[derive(Debug, Clone, Serialize)]
pub struct SinkStatus {
    pub events: BufferStatus,
    pub metrics: BufferStatus,
    pub health_checks: BufferStatus,
    pub snapshots: BufferStatus,
    pub chains: BufferStatus,
    pub async_processing: bool,
    /// Failed durable write attempts.
    pub write_errors: u64,
    /// Rows dropped after exhausting retries.
    pub dropped: u64,
}

struct SinkInner {
    store: Arc<dyn TelemetryStore>,
    config: SinkConfig,
    events: Mutex<Vec<TelemetryEvent>>,
    metrics: Mutex<Vec<TelemetryMetric>>,
    health_checks: Mutex<Vec<HealthCheckResult>>,
    snapshots: Mutex<Vec<PerformanceSnapshot>>,
    chains: Mutex<Vec<ChainEntry>>,
    write_errors: AtomicU64,
    dropped: AtomicU64,
}

/// Buffering layer between event producers and durable storage.
///
/// Cheap to clone; all clones share the same buffers and store.
#[derive(Clone)]
pub struct TelemetrySink {
    inner: Arc<SinkInner>,
}

type PersistFn<T> = fn(&dyn TelemetryStore, &[T]) -> Result<(), StorageError>;

impl TelemetrySink {
    pub fn new(store: Arc<dyn TelemetryStore>, config: SinkConfig) -> Self {
        Self {
            inner: Arc::new(SinkInner {
                store,
                config,
                events: Mutex::new(Vec::new()),
                metrics: Mutex::new(Vec::new()),
                health_checks: Mutex::new(Vec::new()),
                snapshots: Mutex::new(Vec::new()),
                chains: Mutex::new(Vec::new()),
                write_errors: AtomicU64::new(0),
                dropped: AtomicU64::new(0),
            }),
        }
    }

    /// The durable store this sink drains into.
    pub fn store(&self) -> Arc<dyn TelemetryStore> {
        Arc::clone(&self.inner.store)
    }

    pub fn record(&self, event: TelemetryEvent) {
        self.push(|i| &i.events, |s, r| s.append_events(r), event, Category::Events);
    }

    pub fn record_metric(&self, metric: TelemetryMetric) {
        self.push(
            |i| &i.metrics,
            |s, r| s.append_metrics(r),
            metric,
            Category::Metrics,
        );
    }

    pub fn record_health_check(&self, result: HealthCheckResult) {
        self.push(
            |i| &i.health_checks,
            |s, r| s.append_health_checks(r),
            result,
            Category::HealthChecks,
        );
    }

    pub fn record_snapshot(&self, snapshot: PerformanceSnapshot) {
        self.push(
            |i| &i.snapshots,
            |s, r| s.append_snapshots(r),
            snapshot,
            Category::Snapshots,
        );
    }

    pub fn record_chain_entry(&self, entry: ChainEntry) {
        self.push(
            |i| &i.chains,
            |s, r| s.append_chain_entries(r),
            entry,
            Category::Chains,
        );
    }

    /// Drain every buffer and persist the drained generations inline.
    ///
    /// Safe to call concurrently with producers and with other flushes;
    /// the swap under the lock guarantees a generation drains once.
    pub fn flush(&self) {
        self.flush_one(|i| &i.events, |s, r| s.append_events(r), Category::Events);
        self.flush_one(|i| &i.metrics, |s, r| s.append_metrics(r), Category::Metrics);
        self.flush_one(
            |i| &i.health_checks,
            |s, r| s.append_health_checks(r),
            Category::HealthChecks,
        );
        self.flush_one(
            |i| &i.snapshots,
            |s, r| s.append_snapshots(r),
            Category::Snapshots,
        );
        self.flush_one(
            |i| &i.chains,
            |s, r| s.append_chain_entries(r),
            Category::Chains,
        );
    }

    /// Current fill levels and error counters.
    pub fn buffer_status(&self) -> SinkStatus {
        let inner = &self.inner;
        let max = inner.config.max_buffer_size;
        SinkStatus {
            events: status_of(&inner.events, max),
            metrics: status_of(&inner.metrics, max),
            health_checks: status_of(&inner.health_checks, max),
            snapshots: status_of(&inner.snapshots, max),
            chains: status_of(&inner.chains, max),
            async_processing: inner.config.async_processing,
            write_errors: inner.write_errors.load(Ordering::Relaxed),
            dropped: inner.dropped.load(Ordering::Relaxed),
        }
    }

    fn push<T: Send + 'static>(
        &self,
        select: fn(&SinkInner) -> &Mutex<Vec<T>>,
        persist: PersistFn<T>,
        row: T,
        category: Category,
    ) {
        let drained = {
            let mut buf = select(&self.inner).lock().unwrap();
            let drained = if buf.len() >= self.inner.config.max_buffer_size {
                // Forced flush instead of dropping: swap the full generation
                // out and accept the new row into a fresh buffer.
                Some(std::mem::take(&mut *buf))
            } else {
                None
            };
            buf.push(row);
            drained
        };

        if let Some(batch) = drained {
            debug!(%category, count = batch.len(), "Buffer full, forcing flush");
            self.dispatch(batch, persist, category);
        }
    }

    fn flush_one<T: Send + 'static>(
        &self,
        select: fn(&SinkInner) -> &Mutex<Vec<T>>,
        persist: PersistFn<T>,
        category: Category,
    ) {
        let batch = std::mem::take(&mut *select(&self.inner).lock().unwrap());
        if !batch.is_empty() {
            persist_batch(&self.inner, batch, persist, category);
        }
    }

    fn dispatch<T: Send + 'static>(
        &self,
        batch: Vec<T>,
        persist: PersistFn<T>,
        category: Category,
    ) {
        if self.inner.config.async_processing {
            if let Ok(handle) = tokio::runtime::Handle::try_current() {
                let inner = Arc::clone(&self.inner);
                handle.spawn_blocking(move || persist_batch(&inner, batch, persist, category));
                return;
            }
        }
        persist_batch(&self.inner, batch, persist, category);
    }
}

fn status_of<T>(buf: &Mutex<Vec<T>>, max: usize) -> BufferStatus {
    BufferStatus {
        size: buf.lock().unwrap().len(),
        max,
    }
}

fn persist_batch<T>(inner: &SinkInner, batch: Vec<T>, persist: PersistFn<T>, category: Category) {
    let attempts = inner.config.flush_retries.max(1);
    for attempt in 1..=attempts {
        match persist(inner.store.as_ref(), &batch) {
            Ok(()) => return,
            Err(err) => {
                inner.write_errors.fetch_add(1, Ordering::Relaxed);
                warn!(%category, attempt, %err, "Telemetry flush attempt failed");
            }
        }
    }
    // Explicit, logged, last-resort data loss.
    inner.dropped.fetch_add(batch.len() as u64, Ordering::Relaxed);
    warn!(
        %category,
        count = batch.len(),
        "Dropping telemetry batch after exhausting flush retries"
    );
}
