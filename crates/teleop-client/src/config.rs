//! Channel configuration.
//!
//! ```toml
//! endpoint = "ws://192.168.4.1:81/ws"
//! max_reconnect_attempts = 5
//! construction_retry_delay_ms = 5000
//!
//! [backoff]
//! base_delay_ms = 3000
//! cap_delay_ms = 48000
//! ```
//!
//! Every key is optional; missing keys take the defaults shown above (the
//! default endpoint is a local simulator).

use crate::backoff::BackoffPolicy;
use crate::error::ConfigError;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

pub const DEFAULT_ENDPOINT: &str = "ws://127.0.0.1:8765/ws";
pub const DEFAULT_MAX_RECONNECT_ATTEMPTS: u32 = 5;
pub const DEFAULT_CONSTRUCTION_RETRY_DELAY_MS: u64 = 5_000;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ChannelConfig {
    /// WebSocket URL of the vehicle gateway.
    pub endpoint: String,
    /// Consecutive failures after which automatic retry stops.
    pub max_reconnect_attempts: u32,
    pub backoff: BackoffPolicy,
    /// Fixed delay used when the transport cannot even be constructed.
    pub construction_retry_delay_ms: u64,
}

impl Default for ChannelConfig {
    fn default() -> Self {
        Self {
            endpoint: DEFAULT_ENDPOINT.to_string(),
            max_reconnect_attempts: DEFAULT_MAX_RECONNECT_ATTEMPTS,
            backoff: BackoffPolicy::default(),
            construction_retry_delay_ms: DEFAULT_CONSTRUCTION_RETRY_DELAY_MS,
        }
    }
}

impl ChannelConfig {
    /// Default tuning for the given endpoint.
    pub fn new(endpoint: impl Into<String>) -> Self {
        Self {
            endpoint: endpoint.into(),
            ..Self::default()
        }
    }

    pub fn from_toml_str(text: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&text)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.endpoint.trim().is_empty() {
            return Err(ConfigError::Invalid("endpoint must not be empty".into()));
        }
        if self.max_reconnect_attempts == 0 {
            return Err(ConfigError::Invalid(
                "max_reconnect_attempts must be at least 1".into(),
            ));
        }
        if self.backoff.base_delay_ms == 0 {
            return Err(ConfigError::Invalid(
                "backoff.base_delay_ms must be at least 1".into(),
            ));
        }
        if self.backoff.cap_delay_ms < self.backoff.base_delay_ms {
            return Err(ConfigError::Invalid(format!(
                "backoff.cap_delay_ms ({}) is below backoff.base_delay_ms ({})",
                self.backoff.cap_delay_ms, self.backoff.base_delay_ms
            )));
        }
        Ok(())
    }

    pub fn construction_retry_delay(&self) -> Duration {
        Duration::from_millis(self.construction_retry_delay_ms)
    }
}
