// Copyright 2026 Layne Penney
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Tool provider contract and registry.
//!
//! This is the collaborator surface the health monitor probes and the
//! adapters instrument: a [`ToolProvider`] exposes its definition (name and
//! input schema), an execution entry point, and a lightweight self-check;
//! a [`ToolRegistry`] maps names to providers.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;

use crate::error::ProviderError;

/// A tool provider's self-description.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolDefinition {
    pub name: String,
    pub description: String,
    /// JSON schema of the accepted arguments.
    pub input_schema: serde_json::Value,
}

impl ToolDefinition {
    pub fn new(name: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            input_schema: serde_json::json!({"type": "object"}),
        }
    }

    pub fn with_schema(mut self, schema: serde_json::Value) -> Self {
        self.input_schema = schema;
        self
    }
}

/// Trait implemented by every pluggable capability provider.
#[async_trait]
pub trait ToolProvider: Send + Sync {
    /// Get the provider definition (name, description, input schema).
    fn definition(&self) -> ToolDefinition;

    /// Execute the provider with the given arguments.
    async fn run(&self, args: serde_json::Value) -> Result<serde_json::Value, ProviderError>;

    /// Lightweight probe used by health monitoring.
    ///
    /// The default validates the provider's definition; providers backed by
    /// external services should override this with a real reachability check.
    async fn self_check(&self) -> Result<(), ProviderError> {
        let def = self.definition();
        if def.name.is_empty() {
            return Err(ProviderError::InvalidDefinition(
                "provider has an empty name".to_string(),
            ));
        }
        if !def.input_schema.is_object() {
            return Err(ProviderError::InvalidDefinition(format!(
                "{}: input schema is not an object",
                def.name
            )));
        }
        Ok(())
    }
}

/// Registry of available providers, maps names to implementations.
pub struct ToolRegistry {
    providers: HashMap<String, Arc<dyn ToolProvider>>,
}

impl ToolRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self {
            providers: HashMap::new(),
        }
    }

    /// Get a provider by name.
    pub fn get(&self, name: &str) -> Option<Arc<dyn ToolProvider>> {
        self.providers.get(name).cloned()
    }

    /// Check if a provider exists.
    pub fn contains(&self, name: &str) -> bool {
        self.providers.contains_key(name)
    }

    /// Get all provider definitions.
    pub fn definitions(&self) -> Vec<ToolDefinition> {
        self.providers.values().map(|p| p.definition()).collect()
    }

    /// Get all registered names.
    pub fn names(&self) -> Vec<&str> {
        self.providers.keys().map(String::as_str).collect()
    }
}

impl Default for ToolRegistry {
    fn default() -> Self {
        Self::new()
    }
}

/// Builder for constructing a [`ToolRegistry`].
pub struct ToolRegistryBuilder {
    providers: HashMap<String, Arc<dyn ToolProvider>>,
}

impl ToolRegistryBuilder {
    pub fn new() -> Self {
        Self {
            providers: HashMap::new(),
        }
    }

    /// Register a provider under its definition name.
    pub fn register<T: ToolProvider + 'static>(&mut self, provider: T) -> &mut Self {
        let def = provider.definition();
        self.providers.insert(def.name, Arc::new(provider));
        self
    }

    /// Register an already-shared provider.
    pub fn register_arc(&mut self, provider: Arc<dyn ToolProvider>) -> &mut Self {
        let def = provider.definition();
        self.providers.insert(def.name, provider);
        self
    }

    pub fn build(self) -> ToolRegistry {
        ToolRegistry {
            providers: self.providers,
        }
    }
}

impl Default for ToolRegistryBuilder {
    fn default() -> Self {
        Self::new()
    }
}
