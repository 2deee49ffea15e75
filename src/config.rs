//! Configuration Management
//!
//! Handles configuration loading for the collector: a JSON config file,
//! environment fallback for the token, and CLI overrides applied by the
//! caller after loading.

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::Deserialize;

use crate::openstack::Endpoints;

pub const DEFAULT_RATE_LIMIT: u32 = 10;
pub const DEFAULT_TIMEOUT_SECS: u64 = 30;
pub const DEFAULT_CHANNEL_CAPACITY: usize = 1024;

/// Collector configuration
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    /// Pre-issued authentication token; `OS_TOKEN` is the fallback.
    #[serde(default)]
    pub token: Option<String>,
    /// Service endpoint catalog.
    #[serde(default)]
    pub endpoints: Endpoints,
    /// Listing calls admitted per second, shared by all producers.
    #[serde(default = "default_rate_limit")]
    pub rate_limit: u32,
    /// Per-call timeout in seconds.
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    /// Capacity of the bounded pipeline channels.
    #[serde(default = "default_channel_capacity")]
    pub channel_capacity: usize,
    /// Collect records created from this time.
    #[serde(default)]
    pub records_from: Option<DateTime<Utc>>,
    /// Collect records up to this time.
    #[serde(default)]
    pub records_to: Option<DateTime<Utc>>,
    /// Collect records for the last period, e.g. "30d". Mutually exclusive
    /// with explicit bounds.
    #[serde(default)]
    pub records_for_period: Option<String>,
}

fn default_rate_limit() -> u32 {
    DEFAULT_RATE_LIMIT
}

fn default_timeout_secs() -> u64 {
    DEFAULT_TIMEOUT_SECS
}

fn default_channel_capacity() -> usize {
    DEFAULT_CHANNEL_CAPACITY
}

impl Default for Config {
    fn default() -> Self {
        Self {
            token: None,
            endpoints: Endpoints::default(),
            rate_limit: DEFAULT_RATE_LIMIT,
            timeout_secs: DEFAULT_TIMEOUT_SECS,
            channel_capacity: DEFAULT_CHANNEL_CAPACITY,
            records_from: None,
            records_to: None,
            records_for_period: None,
        }
    }
}

impl Config {
    /// Get the default config file path
    fn config_path() -> Option<PathBuf> {
        dirs::config_dir().map(|p| p.join("oscollect").join("config.json"))
    }

    /// Load configuration. An explicitly given path must exist; the default
    /// path is optional and falls back to defaults.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let path = match path {
            Some(explicit) => explicit.to_path_buf(),
            None => {
                let Some(default) = Self::config_path() else {
                    return Ok(Self::default());
                };
                if !default.exists() {
                    return Ok(Self::default());
                }
                default
            }
        };

        let content = std::fs::read_to_string(&path)
            .with_context(|| format!("cannot read config file {}", path.display()))?;
        serde_json::from_str(&content)
            .with_context(|| format!("cannot parse config file {}", path.display()))
    }

    /// Effective token (config file, then environment).
    pub fn effective_token(&self) -> Option<String> {
        self.token
            .clone()
            .or_else(|| std::env::var("OS_TOKEN").ok())
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}
