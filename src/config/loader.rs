// Copyright 2026 Layne Penney
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Configuration loading from files.
//!
//! Handles loading telemetry configuration from JSON and YAML files in
//! standard locations.

use std::path::{Path, PathBuf};

use crate::error::ConfigError;

use super::types::TelemetryConfig;

/// Config file names to search for in a workspace (in order).
pub const CONFIG_FILES: &[&str] = &[
    ".pulse.json",
    ".pulse.yaml",
    ".pulse/config.json",
    "pulse.config.json",
];

/// Global config directory name.
pub const GLOBAL_CONFIG_DIR: &str = ".pulse";

/// Global config file name.
pub const GLOBAL_CONFIG_FILE: &str = "config.json";

/// Get the global config file path (~/.pulse/config.json).
pub fn get_global_config_path() -> Option<PathBuf> {
    dirs::home_dir().map(|home| home.join(GLOBAL_CONFIG_DIR).join(GLOBAL_CONFIG_FILE))
}

/// Load global configuration, if present.
pub fn load_global_config() -> Result<Option<TelemetryConfig>, ConfigError> {
    let path = match get_global_config_path() {
        Some(p) => p,
        None => return Ok(None),
    };
    if !path.exists() {
        return Ok(None);
    }
    load_config_file(&path).map(Some)
}

/// Load workspace configuration from the workspace root, if present.
pub fn load_workspace_config(workspace_root: &Path) -> Result<Option<TelemetryConfig>, ConfigError> {
    for filename in CONFIG_FILES {
        let path = workspace_root.join(filename);
        if path.exists() {
            return load_config_file(&path).map(Some);
        }
    }
    Ok(None)
}

/// Load a configuration file (JSON or YAML, by extension).
pub fn load_config_file(path: &Path) -> Result<TelemetryConfig, ConfigError> {
    let content = std::fs::read_to_string(path)?;

    let extension = path.extension().and_then(|e| e.to_str()).unwrap_or("");

    match extension.to_lowercase().as_str() {
        "yaml" | "yml" => serde_yaml::from_str(&content).map_err(ConfigError::from),
        _ => serde_json::from_str(&content).map_err(ConfigError::from),
    }
}

/// Resolve configuration for a workspace: workspace file, else global file,
/// else built-in defaults.
pub fn load_config(workspace_root: &Path) -> Result<TelemetryConfig, ConfigError> {
    if let Some(config) = load_workspace_config(workspace_root)? {
        return Ok(config);
    }
    if let Some(config) = load_global_config()? {
        return Ok(config);
    }
    Ok(TelemetryConfig::default())
}
