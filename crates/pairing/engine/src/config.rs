//! Engine configuration.
//!
//! Every section has defaults, so a TOML file only needs the keys it changes.

use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to parse config: {0}")]
    Parse(String),

    #[error("invalid config: {0}")]
    Invalid(String),
}

/// Top-level pairing engine configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PairingConfig {
    /// Upper bound on every store and directory call, in milliseconds.
    pub operation_timeout_ms: u64,

    /// Send a notification to each giver when a run is retired.
    pub notify_on_retire: bool,

    pub notifier: NotifierConfig,

    pub tracing: TracingConfig,
}

impl Default for PairingConfig {
    fn default() -> Self {
        Self {
            operation_timeout_ms: 5_000,
            notify_on_retire: true,
            notifier: NotifierConfig::default(),
            tracing: TracingConfig::default(),
        }
    }
}

impl PairingConfig {
    /// Load configuration from a TOML file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path)?;
        Self::from_toml_str(&contents)
    }

    pub fn from_toml_str(contents: &str) -> Result<Self, ConfigError> {
        let config: PairingConfig =
            toml::from_str(contents).map_err(|e| ConfigError::Parse(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.operation_timeout_ms == 0 {
            return Err(ConfigError::Invalid(
                "operation_timeout_ms must be positive".into(),
            ));
        }
        self.notifier.validate()
    }

    pub fn operation_timeout(&self) -> Duration {
        Duration::from_millis(self.operation_timeout_ms)
    }
}

/// Queued notifier settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct NotifierConfig {
    /// Events buffered before `notify` starts rejecting.
    pub queue_capacity: usize,

    /// Delivery attempts per event, including the first.
    pub max_attempts: u32,

    /// Pause between attempts, in milliseconds.
    pub retry_backoff_ms: u64,
}

impl Default for NotifierConfig {
    fn default() -> Self {
        Self {
            queue_capacity: 1_024,
            max_attempts: 5,
            retry_backoff_ms: 500,
        }
    }
}

impl NotifierConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.queue_capacity == 0 {
            return Err(ConfigError::Invalid("queue_capacity must be positive".into()));
        }
        if self.max_attempts == 0 {
            return Err(ConfigError::Invalid("max_attempts must be at least 1".into()));
        }
        Ok(())
    }

    pub fn retry_backoff(&self) -> Duration {
        Duration::from_millis(self.retry_backoff_ms)
    }
}

/// Log output settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TracingConfig {
    /// Filter used when `RUST_LOG` is unset.
    pub log_level: String,

    /// Emit JSON lines instead of human-readable output.
    pub json_format: bool,
}

impl Default for TracingConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            json_format: false,
        }
    }
}
