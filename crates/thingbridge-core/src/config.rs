/*!
 * Configuration management for thingbridge.
 *
 * This module provides functionality to load, validate, and access
 * configuration settings for the bridge components.
 */
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use config::{Config as ConfigLib, Environment, File};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::Result;

/// Core configuration for thingbridge
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,

    /// Discovery and liveness configuration
    #[serde(default)]
    pub discovery: DiscoveryConfig,
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Whether to log to stdout
    #[serde(default = "default_log_stdout")]
    pub stdout: bool,
}

/// Discovery and liveness configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DiscoveryConfig {
    /// Period between discovery broadcasts, in seconds
    #[serde(default = "default_search_interval_secs")]
    pub search_interval_secs: u64,

    /// Staleness threshold after which an unseen device is evicted, in seconds
    #[serde(default = "default_max_age_secs")]
    pub max_age_secs: u64,

    /// Capacity of the discovery and notification channels
    #[serde(default = "default_channel_capacity")]
    pub channel_capacity: usize,
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_stdout() -> bool {
    true
}

fn default_search_interval_secs() -> u64 {
    20
}

fn default_max_age_secs() -> u64 {
    60
}

fn default_channel_capacity() -> usize {
    64
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            stdout: default_log_stdout(),
        }
    }
}

impl Default for DiscoveryConfig {
    fn default() -> Self {
        Self {
            search_interval_secs: default_search_interval_secs(),
            max_age_secs: default_max_age_secs(),
            channel_capacity: default_channel_capacity(),
        }
    }
}

impl DiscoveryConfig {
    /// The period between discovery broadcasts
    pub fn search_interval(&self) -> Duration {
        Duration::from_secs(self.search_interval_secs)
    }

    /// The staleness threshold for scrubbing unseen devices
    pub fn max_age(&self) -> Duration {
        Duration::from_secs(self.max_age_secs)
    }
}

impl Config {
    /// Load configuration from a file, layered with environment overrides
    ///
    /// Environment variables use the `THINGBRIDGE_` prefix with `__` as
    /// the section separator, e.g. `THINGBRIDGE_DISCOVERY__MAX_AGE_SECS`.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let settings = ConfigLib::builder()
            .add_source(File::from(path.as_ref()))
            .add_source(Environment::with_prefix("THINGBRIDGE").separator("__"))
            .build()?;

        let config: Config = settings.try_deserialize()?;
        debug!("Loaded configuration from {:?}", path.as_ref());
        Ok(config)
    }

    /// Load configuration from environment variables only
    pub fn from_env() -> Result<Self> {
        let settings = ConfigLib::builder()
            .add_source(Environment::with_prefix("THINGBRIDGE").separator("__"))
            .build()?;

        let config: Config = settings.try_deserialize()?;
        Ok(config)
    }

    /// Wrap the configuration for sharing between components
    pub fn into_shared(self) -> SharedConfig {
        Arc::new(self)
    }
}

/// A reference-counted configuration shared between components
pub type SharedConfig = Arc<Config>;
