// Copyright 2026 Layne Penney
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Structured logging setup.
//!
//! Call [`init_logging`] once at startup and hold the returned guard for the
//! life of the process; dropping it flushes any sink attached to it.
//! `RUST_LOG` always wins over the configured default level.

use std::io;

use tracing::Level;
use tracing_subscriber::{
    fmt::{self, format::FmtSpan},
    layer::SubscriberExt,
    util::SubscriberInitExt,
    EnvFilter,
};

use crate::sink::TelemetrySink;

/// Formatting and filtering knobs for the tracing subscriber.
#[derive(Debug, Clone)]
pub struct LogConfig {
    /// Default level when `RUST_LOG` is unset.
    pub default_level: Level,
    /// Emit span enter/close events.
    pub include_span_events: bool,
    /// Include file and line in each record.
    pub include_file_line: bool,
    /// Include the target module path.
    pub include_target: bool,
    pub ansi_colors: bool,
    pub compact: bool,
    /// Explicit filter directive; overrides `default_level`.
    pub filter_directive: Option<String>,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            default_level: Level::INFO,
            include_span_events: false,
            include_file_line: false,
            include_target: true,
            ansi_colors: true,
            compact: true,
            filter_directive: None,
        }
    }
}

impl LogConfig {
    /// Verbose output for local development.
    pub fn development() -> Self {
        Self {
            default_level: Level::DEBUG,
            include_span_events: true,
            include_file_line: true,
            compact: false,
            ..Default::default()
        }
    }

    /// Quiet, uncolored output for production.
    pub fn production() -> Self {
        Self {
            default_level: Level::WARN,
            include_target: false,
            ansi_colors: false,
            ..Default::default()
        }
    }

    /// Trace-everything output for tests.
    pub fn testing() -> Self {
        Self {
            default_level: Level::TRACE,
            include_span_events: true,
            include_file_line: true,
            ansi_colors: false,
            compact: false,
            filter_directive: Some("pulse=trace".to_string()),
            ..Default::default()
        }
    }

    pub fn with_level(mut self, level: Level) -> Self {
        self.default_level = level;
        self
    }

    pub fn with_filter(mut self, filter: impl Into<String>) -> Self {
        self.filter_directive = Some(filter.into());
        self
    }

    pub fn with_ansi(mut self, ansi: bool) -> Self {
        self.ansi_colors = ansi;
        self
    }
}

/// Keeps the subscriber installed and flushes an attached sink on drop.
pub struct LogGuard {
    sink: Option<TelemetrySink>,
}

impl LogGuard {
    /// Attach a sink so buffered telemetry is flushed when the guard drops.
    pub fn with_sink(mut self, sink: TelemetrySink) -> Self {
        self.sink = Some(sink);
        self
    }
}

impl Drop for LogGuard {
    fn drop(&mut self) {
        if let Some(sink) = &self.sink {
            sink.flush();
        }
    }
}

/// Install the global tracing subscriber. Call once at startup.
pub fn init_logging(config: &LogConfig) -> io::Result<LogGuard> {
    let filter = match &config.filter_directive {
        Some(directive) => EnvFilter::try_new(directive)
            .unwrap_or_else(|_| EnvFilter::new(config.default_level.to_string())),
        None => EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| EnvFilter::new(config.default_level.to_string())),
    };

    let span_events = if config.include_span_events {
        FmtSpan::ENTER | FmtSpan::CLOSE
    } else {
        FmtSpan::NONE
    };

    let fmt_layer = fmt::layer()
        .with_ansi(config.ansi_colors)
        .with_target(config.include_target)
        .with_file(config.include_file_line)
        .with_line_number(config.include_file_line)
        .with_span_events(span_events);

    let result = if config.compact {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt_layer.compact())
            .try_init()
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt_layer)
            .try_init()
    };
    result.map_err(|e| io::Error::other(e.to_string()))?;

    Ok(LogGuard { sink: None })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = LogConfig::default();
        assert_eq!(config.default_level, Level::INFO);
        assert!(config.compact);
        assert!(config.filter_directive.is_none());
    }

    #[test]
    fn test_presets() {
        assert_eq!(LogConfig::development().default_level, Level::DEBUG);
        assert_eq!(LogConfig::production().default_level, Level::WARN);
        let testing = LogConfig::testing();
        assert_eq!(testing.default_level, Level::TRACE);
        assert_eq!(testing.filter_directive.as_deref(), Some("pulse=trace"));
        // Fields a preset leaves unset fall back to the defaults.
        assert!(testing.include_target);
    }

    #[test]
    fn test_builder() {
        let config = LogConfig::default()
            .with_level(Level::DEBUG)
            .with_filter("pulse=debug")
            .with_ansi(false);
        assert_eq!(config.default_level, Level::DEBUG);
        assert_eq!(config.filter_directive.as_deref(), Some("pulse=debug"));
        assert!(!config.ansi_colors);
    }
}
