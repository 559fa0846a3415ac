// Copyright 2026 Layne Penney
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Payload sanitization.
//!
//! Before any payload is buffered, persisted, or logged, string leaves whose
//! *key* matches a sensitive pattern are redacted or hashed, containers under
//! a matched key are replaced wholesale, and oversized strings are truncated. Sanitization is total (it never fails; unencodable
//! input falls back to the redaction marker) and idempotent
//! (`sanitize(sanitize(x)) == sanitize(x)`).

use once_cell::sync::Lazy;
use regex::{Regex, RegexBuilder};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sha2::{Digest, Sha256};
use tracing::warn;

/// Marker substituted for redacted values.
pub const REDACTED_MARKER: &str = "[REDACTED]";

/// Prefix of hashed values: `sha256:` followed by 16 hex chars.
pub const HASH_PREFIX: &str = "sha256:";

/// Suffix appended to truncated strings.
pub const TRUNCATED_MARKER: &str = "... [truncated]";

/// Substituted for subtrees nested beyond the configured depth.
pub const DEPTH_MARKER: &str = "[MAX_DEPTH_EXCEEDED]";

const HASH_LEN: usize = 16;

/// Default sensitive key patterns, applied when no rules are configured.
static DEFAULT_PATTERNS: Lazy<Vec<SanitizeRule>> = Lazy::new(|| {
    [
        "password",
        "secret",
        "token",
        "api[_-]?key",
        "authorization",
        "credential",
        "private[_-]?key",
    ]
    .iter()
    .map(|p| SanitizeRule {
        pattern: (*p).to_string(),
        strategy: SanitizeStrategy::Redact,
    })
    .collect()
});

/// How a matched sensitive value is replaced.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SanitizeStrategy {
    /// Replace with [`REDACTED_MARKER`].
    Redact,
    /// Replace with a one-way salted hash, preserving equality comparisons.
    Hash,
}

/// A single `{pattern, strategy}` sanitization rule.
///
/// Patterns are case-insensitive regexes matched against field keys.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SanitizeRule {
    pub pattern: String,
    #[serde(default = "default_strategy")]
    pub strategy: SanitizeStrategy,
}

fn default_strategy() -> SanitizeStrategy {
    SanitizeStrategy::Redact
}

struct CompiledRule {
    regex: Regex,
    strategy: SanitizeStrategy,
}

/// Configured sanitizer applying rules uniformly over nested payloads.
pub struct Sanitizer {
    rules: Vec<CompiledRule>,
    max_field_length: usize,
    max_depth: usize,
    hash_salt: String,
}

impl Sanitizer {
    /// Compile the given rules. Rules with invalid regexes are skipped with
    /// a logged warning; an empty rule set falls back to the defaults.
    pub fn new(
        rules: &[SanitizeRule],
        max_field_length: usize,
        max_depth: usize,
        hash_salt: impl Into<String>,
    ) -> Self {
        let source: &[SanitizeRule] = if rules.is_empty() {
            &DEFAULT_PATTERNS
        } else {
            rules
        };

        let compiled = source
            .iter()
            .filter_map(|rule| {
                match RegexBuilder::new(&rule.pattern).case_insensitive(true).build() {
                    Ok(regex) => Some(CompiledRule {
                        regex,
                        strategy: rule.strategy,
                    }),
                    Err(err) => {
                        warn!(pattern = %rule.pattern, %err, "Skipping invalid sanitize pattern");
                        None
                    }
                }
            })
            .collect();

        Self {
            rules: compiled,
            max_field_length,
            max_depth,
            hash_salt: hash_salt.into(),
        }
    }

    /// Sanitize a payload, returning a new value.
    pub fn sanitize(&self, value: &Value) -> Value {
        self.sanitize_at(value, 0)
    }

    fn sanitize_at(&self, value: &Value, depth: usize) -> Value {
        if depth > self.max_depth {
            // Attacker-controlled nesting must not recurse unbounded.
            return Value::String(DEPTH_MARKER.to_string());
        }

        match value {
            Value::Object(map) => {
                let mut out = serde_json::Map::with_capacity(map.len());
                for (key, v) in map {
                    let sanitized = match (self.match_key(key), v) {
                        (Some(strategy), Value::String(s)) => {
                            Value::String(self.apply(strategy, s))
                        }
                        // A container under a sensitive key is replaced
                        // wholesale; recursing would leak its string leaves,
                        // whose own keys are not the matched one.
                        (Some(strategy), Value::Array(_) | Value::Object(_)) => {
                            self.apply_container(strategy, v)
                        }
                        _ => self.sanitize_at(v, depth + 1),
                    };
                    out.insert(key.clone(), sanitized);
                }
                Value::Object(out)
            }
            Value::Array(items) => Value::Array(
                items
                    .iter()
                    .map(|v| self.sanitize_at(v, depth + 1))
                    .collect(),
            ),
            Value::String(s) => Value::String(self.truncate(s)),
            // Non-string scalars pass through unchanged.
            other => other.clone(),
        }
    }

    fn match_key(&self, key: &str) -> Option<SanitizeStrategy> {
        self.rules
            .iter()
            .find(|rule| rule.regex.is_match(key))
            .map(|rule| rule.strategy)
    }

    fn apply_container(&self, strategy: SanitizeStrategy, value: &Value) -> Value {
        match strategy {
            SanitizeStrategy::Redact => Value::String(REDACTED_MARKER.to_string()),
            SanitizeStrategy::Hash => {
                Value::String(self.apply(SanitizeStrategy::Hash, &value.to_string()))
            }
        }
    }

    fn apply(&self, strategy: SanitizeStrategy, value: &str) -> String {
        // Re-sanitizing an already-replaced value must be a no-op.
        if is_sanitized(value) {
            return value.to_string();
        }
        match strategy {
            SanitizeStrategy::Redact => REDACTED_MARKER.to_string(),
            SanitizeStrategy::Hash => {
                let mut hasher = Sha256::new();
                hasher.update(self.hash_salt.as_bytes());
                hasher.update(value.as_bytes());
                let digest = format!("{:x}", hasher.finalize());
                format!("{HASH_PREFIX}{}", &digest[..HASH_LEN])
            }
        }
    }

    fn truncate(&self, value: &str) -> String {
        if value.len() <= self.max_field_length || value.ends_with(TRUNCATED_MARKER) {
            return value.to_string();
        }

        // Cut at the last valid char boundary within the limit.
        let mut end = self.max_field_length;
        while end > 0 && !value.is_char_boundary(end) {
            end -= 1;
        }
        format!("{}{TRUNCATED_MARKER}", &value[..end])
    }
}

/// Whether a string is already a sanitizer output.
fn is_sanitized(value: &str) -> bool {
    if value == REDACTED_MARKER || value == DEPTH_MARKER {
        return true;
    }
    value.len() == HASH_PREFIX.len() + HASH_LEN
        && value.starts_with(HASH_PREFIX)
        && value[HASH_PREFIX.len()..]
            .bytes()
            .all(|b| b.is_ascii_hexdigit())
}
