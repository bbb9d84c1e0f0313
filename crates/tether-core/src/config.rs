use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::attempt::CurlConnector;
use crate::endpoint::StreamEndpoint;
use crate::retry::{RetryPolicy, DEFAULT_RETRYABLE_TAGS};

/// Retry policy parameters (optional `[retry]` section in config.toml).
/// Fields left out fall back to the built-in defaults.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    /// Delay before the first retry, in seconds (e.g. 0.25 = 250ms).
    pub initial_delay_secs: f64,
    /// Cap on the backoff delay before jitter, in seconds.
    pub max_delay_secs: f64,
    pub backoff_factor: f64,
    /// Retries after the first attempt.
    pub max_retries: u32,
    /// Random extra delay as a fraction of the computed delay (0..=1).
    pub jitter_fraction: f64,
    /// How often the health monitor checks a stream, in seconds.
    pub heartbeat_interval_secs: f64,
    /// Error tags that are retried (network_error, timeout, server_error,
    /// temporary_failure, client_error, protocol_error, transport_error).
    pub retryable_tags: Vec<String>,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            initial_delay_secs: 1.0,
            max_delay_secs: 30.0,
            backoff_factor: 2.0,
            max_retries: 10,
            jitter_fraction: 0.1,
            heartbeat_interval_secs: 30.0,
            retryable_tags: DEFAULT_RETRYABLE_TAGS.iter().map(|t| t.to_string()).collect(),
        }
    }
}

fn secs(field: &str, value: f64) -> Result<Duration> {
    Duration::try_from_secs_f64(value)
        .with_context(|| format!("retry.{field} must be a non-negative number of seconds, got {value}"))
}

impl RetryConfig {
    /// Convert to a validated `RetryPolicy`.
    pub fn to_policy(&self) -> Result<RetryPolicy> {
        let policy = RetryPolicy {
            initial_delay: secs("initial_delay_secs", self.initial_delay_secs)?,
            max_delay: secs("max_delay_secs", self.max_delay_secs)?,
            backoff_factor: self.backoff_factor,
            max_retries: self.max_retries,
            jitter_fraction: self.jitter_fraction,
            retryable_tags: self.retryable_tags.iter().cloned().collect::<BTreeSet<_>>(),
            heartbeat_interval: secs("heartbeat_interval_secs", self.heartbeat_interval_secs)?,
        };
        policy.validate()?;
        Ok(policy)
    }
}

/// One stream registered at startup by `tether watch`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StreamConfig {
    pub name: String,
    pub url: String,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub headers: BTreeMap<String, String>,
}

impl StreamConfig {
    pub fn to_endpoint(&self) -> Result<StreamEndpoint> {
        let mut endpoint = StreamEndpoint::new(&self.url)
            .with_context(|| format!("stream `{}`", self.name))?;
        for (k, v) in &self.headers {
            endpoint
                .set_header(k, v)
                .with_context(|| format!("stream `{}`", self.name))?;
        }
        Ok(endpoint)
    }
}

/// Global configuration loaded from `~/.config/tether/config.toml`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TetherConfig {
    /// Connect timeout for each attempt, in seconds.
    pub connect_timeout_secs: u64,
    /// Seconds a connected server may stay silent before the response head arrives.
    #[serde(default = "default_header_timeout_secs")]
    pub header_timeout_secs: u64,
    /// Optional retry policy; if missing, built-in defaults are used.
    #[serde(default)]
    pub retry: Option<RetryConfig>,
    #[serde(default)]
    pub streams: Vec<StreamConfig>,
}

fn default_header_timeout_secs() -> u64 {
    30
}

impl Default for TetherConfig {
    fn default() -> Self {
        Self {
            connect_timeout_secs: 15,
            header_timeout_secs: default_header_timeout_secs(),
            retry: None,
            streams: Vec::new(),
        }
    }
}

impl TetherConfig {
    /// Effective retry policy: the `[retry]` section, or defaults.
    pub fn retry_policy(&self) -> Result<RetryPolicy> {
        match &self.retry {
            Some(retry) => retry.to_policy(),
            None => Ok(RetryPolicy::default()),
        }
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs)
    }

    pub fn header_timeout(&self) -> Duration {
        Duration::from_secs(self.header_timeout_secs)
    }

    /// Production connector with this config's timeouts.
    pub fn connector(&self) -> CurlConnector {
        CurlConnector::new(self.connect_timeout()).with_header_timeout(self.header_timeout())
    }
}

pub fn config_path() -> Result<PathBuf> {
    let xdg_dirs = xdg::BaseDirectories::with_prefix("tether")?;
    Ok(xdg_dirs.place_config_file("config.toml")?)
}

/// Load configuration from disk, creating a default file if none exists.
pub fn load_or_init() -> Result<TetherConfig> {
    load_from_path(&config_path()?)
}

/// Same as [`load_or_init`] for an explicit path.
pub fn load_from_path(path: &Path) -> Result<TetherConfig> {
    if !path.exists() {
        let default_cfg = TetherConfig::default();
        let toml = toml::to_string_pretty(&default_cfg)?;
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(path, toml)?;
        tracing::info!("created default config at {}", path.display());
        return Ok(default_cfg);
    }

    let data = fs::read_to_string(path)
        .with_context(|| format!("reading {}", path.display()))?;
    let cfg: TetherConfig =
        toml::from_str(&data).with_context(|| format!("parsing {}", path.display()))?;
    Ok(cfg)
}
