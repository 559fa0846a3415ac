// Copyright 2026 Layne Penney
// SPDX-License-Identifier: AGPL-3.0-or-later

//! SQLite-backed telemetry store.
//!
//! One table per category, indexed on timestamp (stored as Unix epoch
//! milliseconds) so time-range queries and retention deletes stay cheap.

use std::path::{Path, PathBuf};
use std::sync::Mutex;

use chrono::{DateTime, Utc};
use rusqlite::{params, Connection};

use crate::error::StorageError;
use crate::types::{
    ChainEntry, EventLevel, HealthCheckResult, PerfCategory, PerformanceSnapshot, TelemetryEvent,
    TelemetryMetric,
};

use super::{Category, QueryFilter, TelemetryStore};

/// Current schema version.
pub const SCHEMA_VERSION: u32 = 1;

/// Default database file name.
pub const DB_FILE: &str = "telemetry.db";

/// Telemetry store backed by a SQLite database.
pub struct SqliteStore {
    conn: Mutex<Connection>,
    path: Option<PathBuf>,
}

impl SqliteStore {
    /// Open or create a telemetry database at the given path.
    pub fn open(db_path: impl AsRef<Path>) -> Result<Self, StorageError> {
        let db_path = db_path.as_ref();
        if let Some(parent) = db_path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| {
                StorageError::OpenFailed(format!("Failed to create directory: {e}"))
            })?;
        }

        let conn = Connection::open(db_path)
            .map_err(|e| StorageError::OpenFailed(format!("Failed to open database: {e}")))?;

        let store = Self::from_connection(conn)?;
        Ok(Self {
            path: Some(db_path.to_path_buf()),
            ..store
        })
    }

    /// Open an in-memory database, mainly for tests.
    pub fn open_in_memory() -> Result<Self, StorageError> {
        let conn = Connection::open_in_memory()
            .map_err(|e| StorageError::OpenFailed(format!("Failed to open database: {e}")))?;
        Self::from_connection(conn)
    }

    fn from_connection(conn: Connection) -> Result<Self, StorageError> {
        conn.execute_batch(
            "PRAGMA journal_mode = WAL;
             PRAGMA synchronous = NORMAL;
             PRAGMA foreign_keys = ON;",
        )
        .map_err(|e| StorageError::OpenFailed(format!("Failed to set pragmas: {e}")))?;

        let store = Self {
            conn: Mutex::new(conn),
            path: None,
        };
        store.init_schema()?;
        Ok(store)
    }

    /// Get the database file path, if file-backed.
    pub fn db_path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    fn init_schema(&self) -> Result<(), StorageError> {
        let conn = self.conn.lock().unwrap();
        conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS events (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                component TEXT NOT NULL,
                event_name TEXT NOT NULL,
                level TEXT NOT NULL,
                payload TEXT NOT NULL,
                correlation_id TEXT,
                timestamp INTEGER NOT NULL,
                duration_ms REAL,
                error_message TEXT
            );
            CREATE INDEX IF NOT EXISTS idx_events_timestamp ON events(timestamp);
            CREATE INDEX IF NOT EXISTS idx_events_component ON events(component);

            CREATE TABLE IF NOT EXISTS metrics (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                name TEXT NOT NULL,
                value REAL NOT NULL,
                tags TEXT NOT NULL,
                timestamp INTEGER NOT NULL
            );
            CREATE INDEX IF NOT EXISTS idx_metrics_timestamp ON metrics(timestamp);

            CREATE TABLE IF NOT EXISTS health_checks (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                provider_name TEXT NOT NULL,
                healthy INTEGER NOT NULL,
                error TEXT,
                response_time_ms REAL NOT NULL,
                timestamp INTEGER NOT NULL
            );
            CREATE INDEX IF NOT EXISTS idx_health_checks_timestamp ON health_checks(timestamp);

            CREATE TABLE IF NOT EXISTS snapshots (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                component TEXT NOT NULL,
                operation TEXT NOT NULL,
                duration_ms REAL NOT NULL,
                category TEXT NOT NULL,
                memory_bytes INTEGER,
                correlation_id TEXT,
                timestamp INTEGER NOT NULL
            );
            CREATE INDEX IF NOT EXISTS idx_snapshots_timestamp ON snapshots(timestamp);

            CREATE TABLE IF NOT EXISTS chains (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                correlation_id TEXT NOT NULL,
                tool_name TEXT NOT NULL,
                timestamp INTEGER NOT NULL
            );
            CREATE INDEX IF NOT EXISTS idx_chains_correlation ON chains(correlation_id);
            CREATE INDEX IF NOT EXISTS idx_chains_timestamp ON chains(timestamp);
            "#,
        )
        .map_err(|e| StorageError::OpenFailed(format!("Failed to create schema: {e}")))?;
        Ok(())
    }

    fn table(category: Category) -> &'static str {
        match category {
            Category::Events => "events",
            Category::Metrics => "metrics",
            Category::HealthChecks => "health_checks",
            Category::Snapshots => "snapshots",
            Category::Chains => "chains",
        }
    }
}

fn ms(ts: DateTime<Utc>) -> i64 {
    ts.timestamp_millis()
}

fn from_ms(ms: i64) -> DateTime<Utc> {
    DateTime::<Utc>::from_timestamp_millis(ms).unwrap_or_default()
}

fn filter_bounds(filter: &QueryFilter) -> (i64, i64, Option<&str>, i64) {
    let since = filter.since.map(ms).unwrap_or(i64::MIN);
    let until = filter.until.map(ms).unwrap_or(i64::MAX);
    let component = filter.component.as_deref();
    // SQLite treats a negative LIMIT as unlimited.
    let limit = filter.limit.map(|l| l as i64).unwrap_or(-1);
    (since, until, component, limit)
}

impl TelemetryStore for SqliteStore {
    fn append_events(&self, rows: &[TelemetryEvent]) -> Result<(), StorageError> {
        let mut conn = self.conn.lock().unwrap();
        let tx = conn
            .transaction()
            .map_err(|e| StorageError::WriteFailed(e.to_string()))?;
        {
            let mut stmt = tx
                .prepare_cached(
                    "INSERT INTO events
                     (component, event_name, level, payload, correlation_id, timestamp, duration_ms, error_message)
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
                )
                .map_err(|e| StorageError::WriteFailed(e.to_string()))?;
            for row in rows {
                let payload = serde_json::to_string(&row.payload)?;
                stmt.execute(params![
                    row.component,
                    row.event_name,
                    row.level.as_str(),
                    payload,
                    row.correlation_id,
                    ms(row.timestamp),
                    row.duration_ms,
                    row.error_message,
                ])
                .map_err(|e| StorageError::WriteFailed(e.to_string()))?;
            }
        }
        tx.commit()
            .map_err(|e| StorageError::WriteFailed(e.to_string()))
    }

    fn append_metrics(&self, rows: &[TelemetryMetric]) -> Result<(), StorageError> {
        let mut conn = self.conn.lock().unwrap();
        let tx = conn
            .transaction()
            .map_err(|e| StorageError::WriteFailed(e.to_string()))?;
        {
            let mut stmt = tx
                .prepare_cached(
                    "INSERT INTO metrics (name, value, tags, timestamp) VALUES (?1, ?2, ?3, ?4)",
                )
                .map_err(|e| StorageError::WriteFailed(e.to_string()))?;
            for row in rows {
                let tags = serde_json::to_string(&row.tags)?;
                stmt.execute(params![row.name, row.value, tags, ms(row.timestamp)])
                    .map_err(|e| StorageError::WriteFailed(e.to_string()))?;
            }
        }
        tx.commit()
            .map_err(|e| StorageError::WriteFailed(e.to_string()))
    }

    fn append_health_checks(&self, rows: &[HealthCheckResult]) -> Result<(), StorageError> {
        let mut conn = self.conn.lock().unwrap();
        let tx = conn
            .transaction()
            .map_err(|e| StorageError::WriteFailed(e.to_string()))?;
        {
            let mut stmt = tx
                .prepare_cached(
                    "INSERT INTO health_checks (provider_name, healthy, error, response_time_ms, timestamp)
                     VALUES (?1, ?2, ?3, ?4, ?5)",
                )
                .map_err(|e| StorageError::WriteFailed(e.to_string()))?;
            for row in rows {
                stmt.execute(params![
                    row.provider_name,
                    row.healthy as i64,
                    row.error,
                    row.response_time_ms,
                    ms(row.timestamp),
                ])
                .map_err(|e| StorageError::WriteFailed(e.to_string()))?;
            }
        }
        tx.commit()
            .map_err(|e| StorageError::WriteFailed(e.to_string()))
    }

    fn append_snapshots(&self, rows: &[PerformanceSnapshot]) -> Result<(), StorageError> {
        let mut conn = self.conn.lock().unwrap();
        let tx = conn
            .transaction()
            .map_err(|e| StorageError::WriteFailed(e.to_string()))?;
        {
            let mut stmt = tx
                .prepare_cached(
                    "INSERT INTO snapshots
                     (component, operation, duration_ms, category, memory_bytes, correlation_id, timestamp)
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
                )
                .map_err(|e| StorageError::WriteFailed(e.to_string()))?;
            for row in rows {
                stmt.execute(params![
                    row.component,
                    row.operation,
                    row.duration_ms,
                    row.category.as_str(),
                    row.memory_bytes.map(|b| b as i64),
                    row.correlation_id,
                    ms(row.timestamp),
                ])
                .map_err(|e| StorageError::WriteFailed(e.to_string()))?;
            }
        }
        tx.commit()
            .map_err(|e| StorageError::WriteFailed(e.to_string()))
    }

    fn append_chain_entries(&self, rows: &[ChainEntry]) -> Result<(), StorageError> {
        let mut conn = self.conn.lock().unwrap();
        let tx = conn
            .transaction()
            .map_err(|e| StorageError::WriteFailed(e.to_string()))?;
        {
            let mut stmt = tx
                .prepare_cached(
                    "INSERT INTO chains (correlation_id, tool_name, timestamp) VALUES (?1, ?2, ?3)",
                )
                .map_err(|e| StorageError::WriteFailed(e.to_string()))?;
            for row in rows {
                stmt.execute(params![row.correlation_id, row.tool_name, ms(row.timestamp)])
                    .map_err(|e| StorageError::WriteFailed(e.to_string()))?;
            }
        }
        tx.commit()
            .map_err(|e| StorageError::WriteFailed(e.to_string()))
    }

    fn query_events(&self, filter: &QueryFilter) -> Result<Vec<TelemetryEvent>, StorageError> {
        let (since, until, component, limit) = filter_bounds(filter);
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare_cached(
            "SELECT component, event_name, level, payload, correlation_id, timestamp, duration_ms, error_message
             FROM events
             WHERE timestamp >= ?1 AND timestamp <= ?2 AND (?3 IS NULL OR component = ?3)
             ORDER BY timestamp ASC
             LIMIT ?4",
        )?;

        let rows = stmt.query_map(params![since, until, component, limit], |row| {
            let level: String = row.get(2)?;
            let payload: String = row.get(3)?;
            Ok(TelemetryEvent {
                component: row.get(0)?,
                event_name: row.get(1)?,
                level: level.parse().unwrap_or(EventLevel::Info),
                payload: serde_json::from_str(&payload).unwrap_or(serde_json::Value::Null),
                correlation_id: row.get(4)?,
                timestamp: from_ms(row.get(5)?),
                duration_ms: row.get(6)?,
                error_message: row.get(7)?,
            })
        })?;

        rows.collect::<Result<Vec<_>, _>>().map_err(Into::into)
    }

    fn query_snapshots(
        &self,
        filter: &QueryFilter,
    ) -> Result<Vec<PerformanceSnapshot>, StorageError> {
        let (since, until, component, limit) = filter_bounds(filter);
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare_cached(
            "SELECT component, operation, duration_ms, category, memory_bytes, correlation_id, timestamp
             FROM snapshots
             WHERE timestamp >= ?1 AND timestamp <= ?2 AND (?3 IS NULL OR component = ?3)
             ORDER BY timestamp ASC
             LIMIT ?4",
        )?;

        let rows = stmt.query_map(params![since, until, component, limit], |row| {
            let category: String = row.get(3)?;
            let memory: Option<i64> = row.get(4)?;
            Ok(PerformanceSnapshot {
                component: row.get(0)?,
                operation: row.get(1)?,
                duration_ms: row.get(2)?,
                category: category.parse().unwrap_or(PerfCategory::Normal),
                memory_bytes: memory.map(|b| b as u64),
                correlation_id: row.get(5)?,
                timestamp: from_ms(row.get(6)?),
            })
        })?;

        rows.collect::<Result<Vec<_>, _>>().map_err(Into::into)
    }

    fn query_health_checks(
        &self,
        filter: &QueryFilter,
    ) -> Result<Vec<HealthCheckResult>, StorageError> {
        let (since, until, component, limit) = filter_bounds(filter);
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare_cached(
            "SELECT provider_name, healthy, error, response_time_ms, timestamp
             FROM health_checks
             WHERE timestamp >= ?1 AND timestamp <= ?2 AND (?3 IS NULL OR provider_name = ?3)
             ORDER BY timestamp ASC
             LIMIT ?4",
        )?;

        let rows = stmt.query_map(params![since, until, component, limit], |row| {
            let healthy: i64 = row.get(1)?;
            Ok(HealthCheckResult {
                provider_name: row.get(0)?,
                healthy: healthy != 0,
                error: row.get(2)?,
                response_time_ms: row.get(3)?,
                timestamp: from_ms(row.get(4)?),
            })
        })?;

        rows.collect::<Result<Vec<_>, _>>().map_err(Into::into)
    }

    fn query_chain(&self, correlation_id: &str) -> Result<Vec<ChainEntry>, StorageError> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare_cached(
            "SELECT correlation_id, tool_name, timestamp
             FROM chains WHERE correlation_id = ?1
             ORDER BY timestamp ASC",
        )?;

        let rows = stmt.query_map(params![correlation_id], |row| {
            Ok(ChainEntry {
                correlation_id: row.get(0)?,
                tool_name: row.get(1)?,
                timestamp: from_ms(row.get(2)?),
            })
        })?;

        rows.collect::<Result<Vec<_>, _>>().map_err(Into::into)
    }

    fn count_older_than(
        &self,
        category: Category,
        cutoff: DateTime<Utc>,
    ) -> Result<u64, StorageError> {
        let conn = self.conn.lock().unwrap();
        let sql = format!(
            "SELECT COUNT(*) FROM {} WHERE timestamp < ?1",
            Self::table(category)
        );
        let count: i64 = conn
            .query_row(&sql, params![ms(cutoff)], |row| row.get(0))
            .map_err(|e| StorageError::QueryFailed(e.to_string()))?;
        Ok(count as u64)
    }

    fn delete_older_than(
        &self,
        category: Category,
        cutoff: DateTime<Utc>,
    ) -> Result<u64, StorageError> {
        let conn = self.conn.lock().unwrap();
        let sql = format!("DELETE FROM {} WHERE timestamp < ?1", Self::table(category));
        let deleted = conn
            .execute(&sql, params![ms(cutoff)])
            .map_err(|e| StorageError::DeleteFailed(e.to_string()))?;
        Ok(deleted as u64)
    }
}
