//! Runtime Configuration

use std::path::Path;
use std::time::Duration;

use fos_reactive::GuardConfig;
use serde::{Deserialize, Serialize};

use crate::{HydrateError, HydrateResult};

/// Runtime configuration options
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RuntimeConfig {
    /// Prefix of every directive attribute
    pub attribute_prefix: String,

    /// Bindings applied per chunk in the final hydration phase
    pub flush_chunk: usize,

    /// Runs of one effect allowed inside `effect_window_ms`
    pub effect_max_runs: u32,

    pub effect_window_ms: u64,

    /// Server callback and sync endpoint
    pub endpoint: String,

    /// Base64 AES-256 key sealing callback names
    pub callback_key: Option<String>,

    /// Content type of inline logic blocks
    pub inline_script_type: String,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            attribute_prefix: "pp-".to_string(),
            flush_chunk: 250,
            effect_max_runs: 100,
            effect_window_ms: 1000,
            endpoint: "/".to_string(),
            callback_key: None,
            inline_script_type: "text/php".to_string(),
        }
    }
}

impl RuntimeConfig {
    /// Parse a JSON configuration, missing fields keep their defaults
    pub fn from_json(text: &str) -> HydrateResult<Self> {
        serde_json::from_str(text).map_err(|e| HydrateError::Config(e.to_string()))
    }

    /// Load a JSON configuration file
    pub fn load(path: impl AsRef<Path>) -> HydrateResult<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)
            .map_err(|e| HydrateError::Config(format!("{}: {e}", path.display())))?;
        let config = Self::from_json(&text)?;
        tracing::debug!("loaded runtime config from {}", path.display());
        Ok(config)
    }

    /// Full directive attribute name, `attr("if")` -> `pp-if`
    pub fn attr(&self, name: &str) -> String {
        format!("{}{}", self.attribute_prefix, name)
    }

    /// Runaway-effect budget
    pub fn guard(&self) -> GuardConfig {
        GuardConfig {
            max_runs: self.effect_max_runs,
            window: Duration::from_millis(self.effect_window_ms),
        }
    }

    pub fn with_attribute_prefix(mut self, prefix: &str) -> Self {
        self.attribute_prefix = prefix.to_string();
        self
    }

    pub fn with_flush_chunk(mut self, chunk: usize) -> Self {
        self.flush_chunk = chunk.max(1);
        self
    }

    pub fn with_effect_budget(mut self, max_runs: u32, window_ms: u64) -> Self {
        self.effect_max_runs = max_runs;
        self.effect_window_ms = window_ms;
        self
    }

    pub fn with_endpoint(mut self, endpoint: &str) -> Self {
        self.endpoint = endpoint.to_string();
        self
    }

    pub fn with_callback_key(mut self, key: &str) -> Self {
        self.callback_key = Some(key.to_string());
        self
    }

    pub fn with_inline_script_type(mut self, content_type: &str) -> Self {
        self.inline_script_type = content_type.to_string();
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = RuntimeConfig::default();
        assert_eq!(config.attr("if"), "pp-if");
        assert_eq!(config.flush_chunk, 250);
        assert_eq!(config.guard().max_runs, 100);
        assert_eq!(config.guard().window, Duration::from_secs(1));
    }

    #[test]
    fn test_partial_json_keeps_defaults() {
        let config = RuntimeConfig::from_json(r#"{"attribute_prefix": "x-", "flush_chunk": 10}"#).unwrap();
        assert_eq!(config.attr("for"), "x-for");
        assert_eq!(config.flush_chunk, 10);
        assert_eq!(config.endpoint, "/");
        assert!(config.callback_key.is_none());
    }

    #[test]
    fn test_invalid_json() {
        let err = RuntimeConfig::from_json("{nope").unwrap_err();
        assert!(matches!(err, HydrateError::Config(_)));
    }
}
