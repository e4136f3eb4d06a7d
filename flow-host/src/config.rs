//! Engine configuration
//!
//! Every field has a default, so an empty JSON object is a valid config.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Error type for configuration loading
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse config: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("Invalid config: {0}")]
    Invalid(String),
}

/// Top-level engine settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct EngineConfig {
    /// Hard cap on nodes dispatched per run
    pub max_steps_per_run: u32,

    /// Number of run records kept in the history ring
    pub history_capacity: usize,

    /// Emit a per-node trace event to the audit sink
    pub trace_nodes: bool,

    pub redaction: RedactionConfig,

    pub rate_limits: RateLimitConfig,

    pub network: NetworkConfig,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            max_steps_per_run: 128,
            history_capacity: 50,
            trace_nodes: true,
            redaction: RedactionConfig::default(),
            rate_limits: RateLimitConfig::default(),
            network: NetworkConfig::default(),
        }
    }
}

impl EngineConfig {
    /// Parse and check a JSON config document
    pub fn from_json_str(json: &str) -> Result<Self, ConfigError> {
        let config: EngineConfig = serde_json::from_str(json)?;
        config.check()?;
        Ok(config)
    }

    /// Load a JSON config file
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let json = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_json_str(&json)
    }

    /// Reject settings that would disable a safety bound
    pub fn check(&self) -> Result<(), ConfigError> {
        if self.max_steps_per_run == 0 {
            return Err(ConfigError::Invalid("maxStepsPerRun must be at least 1".into()));
        }
        if self.history_capacity == 0 {
            return Err(ConfigError::Invalid("historyCapacity must be at least 1".into()));
        }
        let net = &self.network;
        if net.min_timeout_ms == 0 || net.min_timeout_ms > net.max_timeout_ms {
            return Err(ConfigError::Invalid(
                "network timeouts must satisfy 0 < minTimeoutMs <= maxTimeoutMs".into(),
            ));
        }
        if net.max_bytes_ceiling == 0 {
            return Err(ConfigError::Invalid("maxBytesCeiling must be at least 1".into()));
        }
        for (name, limit) in [
            ("timer", self.rate_limits.timer),
            ("message", self.rate_limits.message),
            ("ui", self.rate_limits.ui),
        ] {
            if limit.window_secs == 0 {
                return Err(ConfigError::Invalid(format!(
                    "rateLimits.{}.windowSecs must be at least 1",
                    name
                )));
            }
        }
        Ok(())
    }
}

/// Log and audit value redaction
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RedactionConfig {
    /// Longer values are truncated with an ellipsis
    pub max_value_len: usize,
}

impl Default for RedactionConfig {
    fn default() -> Self {
        Self { max_value_len: 256 }
    }
}

/// Runs admitted per window
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WindowLimit {
    pub limit: u32,
    pub window_secs: u64,
}

impl WindowLimit {
    pub const fn new(limit: u32, window_secs: u64) -> Self {
        Self { limit, window_secs }
    }
}

/// Limits per trigger class
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RateLimitConfig {
    /// `OnTimer` triggers
    pub timer: WindowLimit,
    /// `OnMessage` triggers
    pub message: WindowLimit,
    /// Every UI-originated trigger
    pub ui: WindowLimit,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            timer: WindowLimit::new(6, 60),
            message: WindowLimit::new(20, 10),
            ui: WindowLimit::new(30, 10),
        }
    }
}

/// Bounds for network nodes
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct NetworkConfig {
    pub default_timeout_ms: u64,
    pub min_timeout_ms: u64,
    pub max_timeout_ms: u64,
    pub default_max_bytes: u64,
    pub max_bytes_ceiling: u64,
    /// Resolve hostnames and reject private addresses before connecting
    pub resolve_before_connect: bool,
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            default_timeout_ms: 5_000,
            min_timeout_ms: 250,
            max_timeout_ms: 30_000,
            default_max_bytes: 65_536,
            max_bytes_ceiling: 1_048_576,
            resolve_before_connect: true,
        }
    }
}

impl NetworkConfig {
    /// Clamp a requested timeout into the allowed range
    pub fn clamp_timeout(&self, requested: Option<i64>) -> u64 {
        let requested = requested
            .map(|ms| ms.max(0) as u64)
            .unwrap_or(self.default_timeout_ms);
        requested.clamp(self.min_timeout_ms, self.max_timeout_ms)
    }

    /// Clamp a requested response size into the allowed range
    pub fn clamp_max_bytes(&self, requested: Option<i64>) -> u64 {
        let requested = requested
            .map(|n| n.max(1) as u64)
            .unwrap_or(self.default_max_bytes);
        requested.clamp(1, self.max_bytes_ceiling)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = EngineConfig::default();
        assert_eq!(config.max_steps_per_run, 128);
        assert_eq!(config.history_capacity, 50);
        assert_eq!(config.redaction.max_value_len, 256);
        assert_eq!(config.rate_limits.timer, WindowLimit::new(6, 60));
    }

    #[test]
    fn test_partial_json() {
        let config =
            EngineConfig::from_json_str(r#"{"maxStepsPerRun": 16, "network": {"maxTimeoutMs": 1000}}"#)
                .unwrap();
        assert_eq!(config.max_steps_per_run, 16);
        assert_eq!(config.network.max_timeout_ms, 1000);
        assert_eq!(config.network.min_timeout_ms, 250);
        assert_eq!(config.history_capacity, 50);
    }

    #[test]
    fn test_invalid_config_rejected() {
        assert!(matches!(
            EngineConfig::from_json_str(r#"{"maxStepsPerRun": 0}"#),
            Err(ConfigError::Invalid(_))
        ));
        assert!(matches!(
            EngineConfig::from_json_str("not json"),
            Err(ConfigError::Parse(_))
        ));
    }

    #[test]
    fn test_clamping() {
        let net = NetworkConfig::default();
        assert_eq!(net.clamp_timeout(Some(10)), 250);
        assert_eq!(net.clamp_timeout(Some(60_000)), 30_000);
        assert_eq!(net.clamp_timeout(None), 5_000);
        assert_eq!(net.clamp_max_bytes(Some(-5)), 1);
        assert_eq!(net.clamp_max_bytes(Some(10_000_000)), 1_048_576);
    }

    #[test]
    fn test_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("engine.json");
        std::fs::write(&path, r#"{"traceNodes": false}"#).unwrap();

        let config = EngineConfig::from_json_file(&path).unwrap();
        assert!(!config.trace_nodes);

        assert!(matches!(
            EngineConfig::from_json_file(dir.path().join("missing.json")),
            Err(ConfigError::Read { .. })
        ));
    }
}
