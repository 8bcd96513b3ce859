//! Event service configuration and validation
//!
//! # Example
//!
//! ```ignore
//! use event_service::EventServiceConfigBuilder;
//!
//! let config = EventServiceConfigBuilder::new()
//!     .plugin_id("chat-plugin")
//!     .module_id("chat-panel")
//!     .max_queue_size(250)
//!     .build()?;
//! ```

use crate::error::ConfigError;
use serde::{Deserialize, Serialize};
use shared_bus::DEFAULT_MAX_QUEUE_SIZE;
use std::env;

/// Environment variable for the owning plugin id.
pub const ENV_PLUGIN_ID: &str = "EB_PLUGIN_ID";
/// Environment variable for the service's own module id.
pub const ENV_MODULE_ID: &str = "EB_MODULE_ID";
/// Environment variable for the per-channel replay bound.
pub const ENV_MAX_QUEUE_SIZE: &str = "EB_MAX_QUEUE_SIZE";
/// Environment variable that can switch replay-on-subscribe off.
pub const ENV_REPLAY_ON_SUBSCRIBE: &str = "EB_REPLAY_ON_SUBSCRIBE";

/// Identity and limits of one event service instance.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EventServiceConfig {
    /// Owning plugin, stamped as `source.plugin_id`
    pub plugin_id: String,
    /// This instance's module id: stamped as `source.module_id` and used as
    /// the subscription channel
    pub module_id: String,
    /// Replay bound per channel
    pub max_queue_size: usize,
    /// Replay history to persistent subscribers. Off disables replay even
    /// when a subscriber asks for it.
    pub replay_on_subscribe: bool,
}

impl Default for EventServiceConfig {
    fn default() -> Self {
        Self {
            plugin_id: "event-bridge".to_string(),
            module_id: "default".to_string(),
            max_queue_size: DEFAULT_MAX_QUEUE_SIZE,
            replay_on_subscribe: true,
        }
    }
}

impl EventServiceConfig {
    /// Create a validated configuration with default limits.
    pub fn new(
        plugin_id: impl Into<String>,
        module_id: impl Into<String>,
    ) -> Result<Self, ConfigError> {
        let config = Self {
            plugin_id: plugin_id.into(),
            module_id: module_id.into(),
            ..Self::default()
        };
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.plugin_id.trim().is_empty() {
            return Err(ConfigError::EmptyPluginId);
        }
        if self.module_id.trim().is_empty() {
            return Err(ConfigError::EmptyModuleId);
        }
        if self.max_queue_size == 0 {
            return Err(ConfigError::ZeroQueueSize);
        }
        Ok(())
    }

    /// Load from `EB_*` environment variables, falling back to defaults.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Same as `from_env`, reading values through `lookup`.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();

        if let Some(plugin_id) = lookup(ENV_PLUGIN_ID) {
            config.plugin_id = plugin_id;
        }
        if let Some(module_id) = lookup(ENV_MODULE_ID) {
            config.module_id = module_id;
        }
        if let Some(raw) = lookup(ENV_MAX_QUEUE_SIZE) {
            config.max_queue_size = raw.trim().parse().map_err(|_| ConfigError::InvalidEnv {
                var: ENV_MAX_QUEUE_SIZE,
                value: raw.clone(),
            })?;
        }
        if let Some(raw) = lookup(ENV_REPLAY_ON_SUBSCRIBE) {
            config.replay_on_subscribe = parse_flag(&raw).ok_or(ConfigError::InvalidEnv {
                var: ENV_REPLAY_ON_SUBSCRIBE,
                value: raw.clone(),
            })?;
        }

        config.validate()?;
        Ok(config)
    }

    /// Builder-style method to set the replay bound
    pub fn with_max_queue_size(mut self, max_queue_size: usize) -> Self {
        self.max_queue_size = max_queue_size;
        self
    }

    /// Builder-style method to toggle replay-on-subscribe
    pub fn with_replay_on_subscribe(mut self, enabled: bool) -> Self {
        self.replay_on_subscribe = enabled;
        self
    }
}

fn parse_flag(raw: &str) -> Option<bool> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

/// Fluent builder for `EventServiceConfig`.
#[derive(Default)]
pub struct EventServiceConfigBuilder {
    plugin_id: Option<String>,
    module_id: Option<String>,
    max_queue_size: Option<usize>,
    replay_on_subscribe: Option<bool>,
}

impl EventServiceConfigBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn plugin_id(mut self, plugin_id: impl Into<String>) -> Self {
        self.plugin_id = Some(plugin_id.into());
        self
    }

    pub fn module_id(mut self, module_id: impl Into<String>) -> Self {
        self.module_id = Some(module_id.into());
        self
    }

    /// Set the replay bound per channel (must be non-zero)
    pub fn max_queue_size(mut self, size: usize) -> Self {
        self.max_queue_size = Some(size);
        self
    }

    pub fn replay_on_subscribe(mut self, enabled: bool) -> Self {
        self.replay_on_subscribe = Some(enabled);
        self
    }

    /// Build the configuration, validating all parameters
    pub fn build(self) -> Result<EventServiceConfig, ConfigError> {
        let defaults = EventServiceConfig::default();

        let config = EventServiceConfig {
            plugin_id: self.plugin_id.unwrap_or(defaults.plugin_id),
            module_id: self.module_id.unwrap_or(defaults.module_id),
            max_queue_size: self.max_queue_size.unwrap_or(defaults.max_queue_size),
            replay_on_subscribe: self
                .replay_on_subscribe
                .unwrap_or(defaults.replay_on_subscribe),
        };

        config.validate()?;
        Ok(config)
    }
}
