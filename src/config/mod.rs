// Copyright 2026 Layne Penney
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Configuration module.
//!
//! The telemetry core consumes configuration; it never produces it.
//! Sources, in precedence order: workspace config file (`.pulse.json`,
//! `.pulse.yaml`, `.pulse/config.json`, `pulse.config.json`), global
//! `~/.pulse/config.json`, built-in defaults. Partial files merge field by
//! field with the defaults via serde.

mod loader;
mod types;

pub use loader::{
    get_global_config_path, load_config, load_config_file, load_global_config,
    load_workspace_config, CONFIG_FILES, GLOBAL_CONFIG_DIR, GLOBAL_CONFIG_FILE,
};

pub use types::{
    AlertConfig, Enabled, EventKind, HealthConfig, PerEventKind, PerfThresholds, RetentionConfig,
    SamplingRate, SanitizeConfig, ServiceName, SinkConfig, TelemetryConfig,
};
