// Copyright 2026 Layne Penney
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Error types for the pulse telemetry pipeline.
//!
//! This module provides strongly-typed errors for different parts of the crate,
//! using `thiserror` for ergonomic error definitions and `anyhow` for error propagation.
//!
//! Errors raised inside the telemetry path must never surface into the
//! instrumented business operation; public entry points catch them and
//! downgrade to a logged warning.

use thiserror::Error;

/// Errors that can occur inside the durable storage layer.
#[derive(Error, Debug)]
pub enum StorageError {
    #[error("Failed to open store: {0}")]
    OpenFailed(String),

    #[error("Write failed: {0}")]
    WriteFailed(String),

    #[error("Query failed: {0}")]
    QueryFailed(String),

    #[error("Delete failed: {0}")]
    DeleteFailed(String),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("IO error: {0}")]
    IoError(String),
}

impl From<std::io::Error> for StorageError {
    fn from(err: std::io::Error) -> Self {
        Self::IoError(err.to_string())
    }
}

impl From<rusqlite::Error> for StorageError {
    fn from(err: rusqlite::Error) -> Self {
        Self::QueryFailed(err.to_string())
    }
}

impl From<serde_json::Error> for StorageError {
    fn from(err: serde_json::Error) -> Self {
        Self::Serialization(err.to_string())
    }
}

/// Errors that can occur during provider operations (tool execution and probes).
#[derive(Error, Debug)]
pub enum ProviderError {
    #[error("Tool not found: {0}")]
    NotFound(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Execution failed: {0}")]
    ExecutionFailed(String),

    #[error("Invalid definition: {0}")]
    InvalidDefinition(String),

    #[error("Timeout after {0}ms")]
    Timeout(u64),
}

/// Errors that can occur during configuration loading.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Config file not found: {0}")]
    NotFound(String),

    #[error("Invalid value for {field}: {message}")]
    InvalidValue { field: String, message: String },

    #[error("IO error reading config: {0}")]
    IoError(String),

    #[error("YAML parsing error: {0}")]
    YamlError(String),

    #[error("JSON parsing error: {0}")]
    JsonError(String),
}

impl From<std::io::Error> for ConfigError {
    fn from(err: std::io::Error) -> Self {
        match err.kind() {
            std::io::ErrorKind::NotFound => Self::NotFound(err.to_string()),
            _ => Self::IoError(err.to_string()),
        }
    }
}

impl From<serde_json::Error> for ConfigError {
    fn from(err: serde_json::Error) -> Self {
        Self::JsonError(err.to_string())
    }
}

impl From<serde_yaml::Error> for ConfigError {
    fn from(err: serde_yaml::Error) -> Self {
        Self::YamlError(err.to_string())
    }
}

/// Errors reported by retention enforcement.
///
/// A failure in one category never blocks the others; `execute` collects
/// these per category and reports partial success.
#[derive(Error, Debug)]
pub enum RetentionError {
    #[error("Invalid retention override '{0}': expected <N><h|d|w>")]
    InvalidOverride(String),

    #[error("Deletion failed for {category}: {source}")]
    DeletionFailed {
        category: String,
        #[source]
        source: StorageError,
    },
}

/// Result type alias using anyhow for flexible error handling.
pub type Result<T> = anyhow::Result<T>;
