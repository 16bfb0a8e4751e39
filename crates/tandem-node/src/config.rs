//! Node configuration.

use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// Protocol tuning for a single node.
///
/// Every field has a default, so an empty TOML document is a valid config.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct NodeConfig {
    /// Capacity of the inbound action queue.
    pub queue_capacity: usize,
    /// Pause between heartbeat cycles while primary.
    pub heartbeat_interval_ms: u64,
    /// Upper bound on any single remote call.
    pub rpc_timeout_ms: u64,
    /// Submission attempts before a local action is reported as lost.
    pub max_submit_attempts: usize,
    /// Back-off after the primary rejects an action with a full queue.
    pub retry_backoff_ms: u64,
}

impl Default for NodeConfig {
    fn default() -> Self {
        Self {
            queue_capacity: 20,
            heartbeat_interval_ms: 10_000,
            rpc_timeout_ms: 2_000,
            max_submit_attempts: 5,
            retry_backoff_ms: 20,
        }
    }
}

impl NodeConfig {
    pub fn from_toml_str(s: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(s)?;
        config.validate()?;
        Ok(config)
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path)?;
        Self::from_toml_str(&text)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.queue_capacity == 0 {
            return Err(ConfigError::Invalid("queue_capacity must be at least 1"));
        }
        if self.max_submit_attempts == 0 {
            return Err(ConfigError::Invalid("max_submit_attempts must be at least 1"));
        }
        if self.heartbeat_interval_ms == 0 {
            return Err(ConfigError::Invalid("heartbeat_interval_ms must be positive"));
        }
        Ok(())
    }

    pub fn heartbeat_interval(&self) -> Duration {
        Duration::from_millis(self.heartbeat_interval_ms)
    }

    pub fn rpc_timeout(&self) -> Duration {
        Duration::from_millis(self.rpc_timeout_ms)
    }

    pub fn retry_backoff(&self) -> Duration {
        Duration::from_millis(self.retry_backoff_ms)
    }
}

/// Error loading a configuration file.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read config: {0}")]
    Io(#[from] std::io::Error),
    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("invalid config: {0}")]
    Invalid(&'static str),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_document_uses_defaults() {
        let config = NodeConfig::from_toml_str("").unwrap();
        assert_eq!(config, NodeConfig::default());
        assert_eq!(config.queue_capacity, 20);
        assert_eq!(config.heartbeat_interval(), Duration::from_secs(10));
    }

    #[test]
    fn partial_override() {
        let config = NodeConfig::from_toml_str("queue_capacity = 4\nrpc_timeout_ms = 50").unwrap();
        assert_eq!(config.queue_capacity, 4);
        assert_eq!(config.rpc_timeout(), Duration::from_millis(50));
        assert_eq!(config.max_submit_attempts, 5);
    }

    #[test]
    fn rejects_zero_capacity() {
        let err = NodeConfig::from_toml_str("queue_capacity = 0").unwrap_err();
        assert!(matches!(err, ConfigError::Invalid(_)));
    }

    #[test]
    fn rejects_unknown_types() {
        assert!(NodeConfig::from_toml_str("queue_capacity = \"many\"").is_err());
    }
}
