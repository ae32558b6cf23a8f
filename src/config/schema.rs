//! Configuration schema definitions

use crate::manager::{ManagerConfig, DEFAULT_CHANNEL_CAPACITY};
use crate::sources::ReaderConfig;
use anyhow::{bail, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::PathBuf;
use std::time::Duration;

/// Main configuration for rrd2prom
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// Remote retrieval settings
    #[serde(default)]
    pub http: HttpConfig,

    /// Polling manager settings
    #[serde(default)]
    pub manager: ManagerSettings,

    /// Event output settings
    #[serde(default)]
    pub output: OutputConfig,

    /// RRD files to poll
    #[serde(default)]
    pub sources: Vec<SourceConfig>,
}

impl Config {
    /// Configuration for a single source given on the command line
    pub fn single(location: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            sources: vec![SourceConfig {
                name: name.into(),
                location: location.into(),
                enabled: true,
            }],
            ..Default::default()
        }
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<()> {
        if self.manager.channel_capacity == 0 {
            bail!("Channel capacity must be at least 1");
        }
        if self.manager.shutdown_timeout_secs == Some(0) {
            bail!("Shutdown timeout must be positive when set");
        }
        if self.http.timeout_secs == 0 {
            bail!("HTTP timeout must be positive");
        }

        let mut names = HashSet::new();
        for source in &self.sources {
            if source.name.trim().is_empty() {
                bail!("Source names must not be empty");
            }
            if source.location.trim().is_empty() {
                bail!("Source '{}' has no location", source.name);
            }
            if !names.insert(source.name.as_str()) {
                bail!("Duplicate source name '{}'", source.name);
            }
        }

        if self.enabled_sources().next().is_none() {
            bail!("At least one enabled source is required");
        }

        Ok(())
    }

    pub fn enabled_sources(&self) -> impl Iterator<Item = &SourceConfig> {
        self.sources.iter().filter(|s| s.enabled)
    }
}

/// Remote retrieval settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HttpConfig {
    /// Validate server certificates (default: false)
    #[serde(default)]
    pub verify_tls: bool,

    /// Request timeout in seconds (default: 30)
    #[serde(default = "default_http_timeout")]
    pub timeout_secs: u64,

    /// Where remote files are copied while being read (default: system temp dir)
    #[serde(default)]
    pub temp_dir: Option<PathBuf>,
}

fn default_http_timeout() -> u64 { 30 }

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            verify_tls: false,
            timeout_secs: default_http_timeout(),
            temp_dir: None,
        }
    }
}

impl HttpConfig {
    pub fn reader_config(&self) -> ReaderConfig {
        ReaderConfig {
            verify_tls: self.verify_tls,
            timeout: Duration::from_secs(self.timeout_secs),
            temp_dir: self.temp_dir.clone(),
        }
    }
}

/// Polling manager settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ManagerSettings {
    /// Capacity of each event stream (default: 1000)
    #[serde(default = "default_channel_capacity")]
    pub channel_capacity: usize,

    /// Seconds to wait for pollers on shutdown (default: wait forever)
    #[serde(default)]
    pub shutdown_timeout_secs: Option<u64>,
}

fn default_channel_capacity() -> usize { DEFAULT_CHANNEL_CAPACITY }

impl Default for ManagerSettings {
    fn default() -> Self {
        Self {
            channel_capacity: default_channel_capacity(),
            shutdown_timeout_secs: None,
        }
    }
}

impl ManagerSettings {
    pub fn manager_config(&self) -> ManagerConfig {
        ManagerConfig {
            channel_capacity: self.channel_capacity,
            shutdown_timeout: self.shutdown_timeout_secs.map(Duration::from_secs),
        }
    }
}

/// Event output settings
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct OutputConfig {
    #[serde(default)]
    pub format: OutputFormat,
}

/// How events are printed
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Default, clap::ValueEnum)]
#[serde(rename_all = "snake_case")]
pub enum OutputFormat {
    /// `METRIC: name{source="series"} value [timestamp]` lines
    #[default]
    Text,
    /// One JSON object per line
    Json,
}

/// One RRD file to poll
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourceConfig {
    /// Unique name, used as the metric name
    pub name: String,

    /// Filesystem path or HTTP(S) URL of the RRD file
    pub location: String,

    /// Whether this source is polled
    #[serde(default = "default_enabled")]
    pub enabled: bool,
}

fn default_enabled() -> bool { true }
