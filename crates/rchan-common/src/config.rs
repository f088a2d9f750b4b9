//! ---
//! rchan_section: "01-core-functionality"
//! rchan_subsection: "module"
//! rchan_type: "source"
//! rchan_scope: "code"
//! rchan_description: "Shared primitives and utilities for the core runtime."
//! rchan_version: "v0.0.0-prealpha"
//! rchan_owner: "tbd"
//! ---
use std::fmt;
use std::fs;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{anyhow, Context, Result};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_with::{serde_as, DurationMilliSeconds};
use tracing::debug;

use crate::logging::LogFormat;

pub const DEFAULT_CHECK_INTERVAL: Duration = Duration::from_millis(30_000);
pub const DEFAULT_MONITOR_INTERVAL: Duration = Duration::from_millis(5_000);
pub const DEFAULT_BUFFER_SIZE: usize = 10;

fn default_check_interval() -> Duration {
    DEFAULT_CHECK_INTERVAL
}

fn default_monitor_interval() -> Duration {
    DEFAULT_MONITOR_INTERVAL
}

fn default_buffer_size() -> usize {
    DEFAULT_BUFFER_SIZE
}

fn default_latency() -> Duration {
    Duration::from_millis(500)
}

fn default_fetch_interval() -> Duration {
    Duration::from_millis(3_000)
}

fn default_logging_directory() -> PathBuf {
    PathBuf::from("target/logs")
}

fn default_log_format() -> LogFormat {
    LogFormat::Pretty
}

fn default_metrics_listen() -> SocketAddr {
    SocketAddr::from(([0, 0, 0, 0], 9898))
}

/// Primary configuration object for the R-CHAN runtime.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct AppConfig {
    #[serde(default)]
    pub failover: FailoverConfig,
    #[serde(default)]
    pub channels: IndexMap<String, ChannelConfig>,
    #[serde(default)]
    pub logging: LoggingConfig,
    #[serde(default)]
    pub metrics: MetricsConfig,
    #[serde(default)]
    pub demo: DemoConfig,
}

/// Metadata describing where an [`AppConfig`] was loaded from.
#[derive(Debug, Clone)]
pub struct LoadedAppConfig {
    pub config: AppConfig,
    pub source: PathBuf,
}

impl AppConfig {
    pub const ENV_CONFIG_PATH: &'static str = "RCHAN_CONFIG";

    /// Load configuration from disk, respecting the `RCHAN_CONFIG` override.
    pub fn load<P: AsRef<Path>>(candidates: &[P]) -> Result<Self> {
        Ok(Self::load_with_source(candidates)?.config)
    }

    /// Load configuration from disk together with the effective source path.
    pub fn load_with_source<P: AsRef<Path>>(candidates: &[P]) -> Result<LoadedAppConfig> {
        if let Ok(env_path) = std::env::var(Self::ENV_CONFIG_PATH) {
            if !env_path.trim().is_empty() {
                let path = PathBuf::from(env_path);
                let config = Self::from_path(&path)?;
                return Ok(LoadedAppConfig {
                    config,
                    source: path,
                });
            }
        }

        for candidate in candidates {
            if candidate.as_ref().exists() {
                let path = candidate.as_ref().to_path_buf();
                let config = Self::from_path(&path)?;
                return Ok(LoadedAppConfig {
                    config,
                    source: path,
                });
            }
        }

        Err(anyhow!(
            "no configuration files found. inspected: {}",
            candidates
                .iter()
                .map(|p| p.as_ref().display().to_string())
                .collect::<Vec<_>>()
                .join(", ")
        ))
    }

    pub fn from_path(path: &Path) -> Result<Self> {
        debug!(config_path = %path.display(), "loading configuration");
        let contents = fs::read_to_string(path)
            .with_context(|| format!("unable to read config file {}", path.display()))?;
        contents
            .parse::<AppConfig>()
            .with_context(|| format!("invalid config file {}", path.display()))
    }

    /// Retrieve a channel configuration by identifier.
    pub fn channel(&self, channel_id: &str) -> Option<&ChannelConfig> {
        self.channels.get(channel_id)
    }

    /// Validate structural invariants.
    pub fn validate(&self) -> Result<()> {
        if self.channels.is_empty() {
            return Err(anyhow!("configuration must declare at least one channel"));
        }
        for (channel_id, channel) in &self.channels {
            channel.validate(channel_id)?;
        }
        Ok(())
    }
}

impl std::str::FromStr for AppConfig {
    type Err = anyhow::Error;

    fn from_str(content: &str) -> std::result::Result<Self, Self::Err> {
        let config: AppConfig =
            toml::from_str(content).with_context(|| "failed to parse configuration")?;
        config.validate()?;
        Ok(config)
    }
}

/// Connection state of a channel as tracked by the failover core.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, Default)]
#[serde(rename_all = "lowercase")]
pub enum ChannelStatus {
    #[default]
    Idle,
    Connected,
    Unavailable,
}

impl ChannelStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ChannelStatus::Idle => "idle",
            ChannelStatus::Connected => "connected",
            ChannelStatus::Unavailable => "unavailable",
        }
    }
}

impl fmt::Display for ChannelStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for ChannelStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "idle" => Ok(ChannelStatus::Idle),
            "connected" => Ok(ChannelStatus::Connected),
            "unavailable" => Ok(ChannelStatus::Unavailable),
            other => Err(format!("unknown channel status: {}", other)),
        }
    }
}

/// Timer cadences and buffer sizing for the failover service.
#[serde_as]
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FailoverConfig {
    /// Period of the unavailable-channel sweep.
    #[serde(rename = "check_interval_ms", default = "default_check_interval")]
    #[serde_as(as = "DurationMilliSeconds<u64>")]
    pub check_interval: Duration,
    /// Period of the active-channel monitor.
    #[serde(rename = "monitor_interval_ms", default = "default_monitor_interval")]
    #[serde_as(as = "DurationMilliSeconds<u64>")]
    pub monitor_interval: Duration,
    #[serde(default = "default_buffer_size")]
    pub buffer_size: usize,
}

impl Default for FailoverConfig {
    fn default() -> Self {
        Self {
            check_interval: default_check_interval(),
            monitor_interval: default_monitor_interval(),
            buffer_size: default_buffer_size(),
        }
    }
}

/// Behavioural parameters for one configured channel.
#[serde_as]
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChannelConfig {
    #[serde(default)]
    pub priority: i32,
    #[serde(default)]
    pub initial_status: ChannelStatus,
    #[serde(default)]
    pub fail_probability: f64,
    #[serde(rename = "latency_ms", default = "default_latency")]
    #[serde_as(as = "DurationMilliSeconds<u64>")]
    pub latency: Duration,
    #[serde(default)]
    pub seed: Option<u64>,
}

impl Default for ChannelConfig {
    fn default() -> Self {
        Self {
            priority: 0,
            initial_status: ChannelStatus::Idle,
            fail_probability: 0.0,
            latency: default_latency(),
            seed: None,
        }
    }
}

impl ChannelConfig {
    pub fn validate(&self, channel_id: &str) -> Result<()> {
        if channel_id.trim().is_empty() {
            return Err(anyhow!("channel identifiers must not be blank"));
        }
        if !(0.0..=1.0).contains(&self.fail_probability) {
            return Err(anyhow!(
                "channel '{}' fail_probability {} must lie within [0, 1]",
                channel_id,
                self.fail_probability
            ));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_logging_directory")]
    pub directory: PathBuf,
    #[serde(default = "default_log_format")]
    pub format: LogFormat,
    #[serde(default)]
    pub file_prefix: Option<String>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            directory: default_logging_directory(),
            format: default_log_format(),
            file_prefix: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetricsConfig {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default = "default_metrics_listen")]
    pub listen: SocketAddr,
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            listen: default_metrics_listen(),
        }
    }
}

/// Settings for the daemon's periodic fetch loop.
#[serde_as]
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DemoConfig {
    #[serde(rename = "fetch_interval_ms", default = "default_fetch_interval")]
    #[serde_as(as = "DurationMilliSeconds<u64>")]
    pub fetch_interval: Duration,
}

impl Default for DemoConfig {
    fn default() -> Self {
        Self {
            fetch_interval: default_fetch_interval(),
        }
    }
}
