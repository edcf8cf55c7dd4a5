//! Configuration management for xsprobe
//!
//! Handles loading and validation of xsprobe.toml configuration files.

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;
use crate::logging::LogConfig;

/// Main configuration structure
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    /// Engine pool settings
    #[serde(default)]
    pub pool: PoolConfig,

    /// Controller settings
    #[serde(default)]
    pub controller: ControllerConfig,

    /// Identity assertion settings
    #[serde(default)]
    pub assertion: AssertionConfig,

    /// Logging settings
    #[serde(default)]
    pub logging: LogConfig,
}

/// Engine pool configuration.
///
/// Immutable after construction; defines the bound on simultaneous
/// rendering contexts, the per-context navigation timeout, the quiet
/// period before engine teardown, and the base URL of the application
/// under test.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PoolConfig {
    /// Maximum number of simultaneously open rendering contexts
    #[serde(default = "default_max_concurrency")]
    pub max_concurrency: usize,

    /// Per-context navigation timeout in milliseconds
    #[serde(default = "default_render_timeout")]
    pub render_timeout_ms: u64,

    /// Quiet period before engine teardown, in milliseconds
    #[serde(default = "default_idle_shutdown")]
    pub idle_shutdown_ms: u64,

    /// Base URL of the application under test
    #[serde(default = "default_target_app_url")]
    pub target_app_url: String,

    /// Run the engine with a visible window (debugging only)
    #[serde(default)]
    pub headful: bool,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            max_concurrency: default_max_concurrency(),
            render_timeout_ms: default_render_timeout(),
            idle_shutdown_ms: default_idle_shutdown(),
            target_app_url: default_target_app_url(),
            headful: false,
        }
    }
}

impl PoolConfig {
    /// Navigation timeout as a [`Duration`].
    #[must_use]
    pub const fn render_timeout(&self) -> Duration {
        Duration::from_millis(self.render_timeout_ms)
    }

    /// Idle-shutdown delay as a [`Duration`].
    #[must_use]
    pub const fn idle_shutdown_delay(&self) -> Duration {
        Duration::from_millis(self.idle_shutdown_ms)
    }
}

fn default_max_concurrency() -> usize {
    5
}

fn default_render_timeout() -> u64 {
    3_000
}

fn default_idle_shutdown() -> u64 {
    10_000
}

fn default_target_app_url() -> String {
    "http://localhost:3000".to_string()
}

/// Controller configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ControllerConfig {
    /// Startup debounce window in milliseconds
    #[serde(default = "default_debounce")]
    pub debounce_ms: u64,

    /// Drain-loop tick interval in milliseconds
    #[serde(default = "default_drain_interval")]
    pub drain_interval_ms: u64,
}

impl Default for ControllerConfig {
    fn default() -> Self {
        Self {
            debounce_ms: default_debounce(),
            drain_interval_ms: default_drain_interval(),
        }
    }
}

impl ControllerConfig {
    /// Debounce window as a [`Duration`].
    #[must_use]
    pub const fn debounce_window(&self) -> Duration {
        Duration::from_millis(self.debounce_ms)
    }

    /// Drain tick interval as a [`Duration`].
    #[must_use]
    pub const fn drain_interval(&self) -> Duration {
        Duration::from_millis(self.drain_interval_ms)
    }
}

fn default_debounce() -> u64 {
    250
}

fn default_drain_interval() -> u64 {
    250
}

/// Identity assertion configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AssertionConfig {
    /// HMAC signing secret. Overridden by `XSPROBE_ASSERTION_SECRET`.
    #[serde(default)]
    pub secret: String,

    /// Assertion lifetime in seconds
    #[serde(default = "default_assertion_ttl")]
    pub ttl_secs: u64,
}

impl Default for AssertionConfig {
    fn default() -> Self {
        Self {
            secret: String::new(),
            ttl_secs: default_assertion_ttl(),
        }
    }
}

fn default_assertion_ttl() -> u64 {
    // 24 h, matching the session tokens the application itself mints.
    86_400
}

impl Config {
    /// Load configuration from a specific path.
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        let raw = std::fs::read_to_string(path)?;
        let config: Self = toml::from_str(&raw)?;
        config.validate()?;
        Ok(config)
    }

    /// Validate cross-field constraints.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.pool.max_concurrency == 0 {
            return Err(ConfigError::Invalid(
                "pool.max_concurrency must be greater than zero".into(),
            ));
        }
        if self.pool.render_timeout_ms == 0 {
            return Err(ConfigError::Invalid(
                "pool.render_timeout_ms must be greater than zero".into(),
            ));
        }
        if url::Url::parse(&self.pool.target_app_url).is_err() {
            return Err(ConfigError::Invalid(format!(
                "pool.target_app_url is not a valid URL: {}",
                self.pool.target_app_url
            )));
        }
        if self.controller.drain_interval_ms == 0 {
            return Err(ConfigError::Invalid(
                "controller.drain_interval_ms must be greater than zero".into(),
            ));
        }
        Ok(())
    }
}
