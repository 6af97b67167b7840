//! Top-level configuration file for flowcap.

use crate::output::{Compression, FILE_VERSION_DEFAULT, FILE_VERSION_MAX, FILE_VERSION_MIN};
use crate::probe::Probe;
use fcap_utils::units::parse_human_size;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tracing::{error, info};

/// Default location of the configuration file.
pub const CONFIG_PATH: &str = "/etc/flowcap.conf";

/// Environment variable that overrides [`CONFIG_PATH`].
pub const CONFIG_ENV: &str = "FLOWCAP_CONFIG";

fn default_file_version() -> u8 {
    FILE_VERSION_DEFAULT
}

fn default_write_timeout() -> u64 {
    60
}

fn default_freespace_minimum() -> String {
    "1g".to_string()
}

fn default_space_maximum_percent() -> f64 {
    98.0
}

fn default_max_queued_packets() -> usize {
    8192
}

fn default_stats_interval() -> u64 {
    300
}

fn default_disk_retry() -> u64 {
    5
}

/// Top-level configuration file for flowcap.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct Config {
    /// Version number for the configuration file. Must be "1.0".
    pub version: String,

    /// Directory in which output files are created
    pub destination_dir: PathBuf,

    /// Compression applied to output file bodies
    #[serde(default)]
    pub compression: Compression,

    /// Output file version
    #[serde(default = "default_file_version")]
    pub file_version: u8,

    /// Close a file this many seconds after it was opened
    #[serde(default = "default_write_timeout")]
    pub write_timeout_seconds: u64,

    /// Close a file before its records exceed this size, e.g. "100m"
    pub max_file_size: String,

    /// Space reserved for each file when checking the disk. Defaults to
    /// `max_file_size`.
    pub alloc_file_size: Option<String>,

    /// Refuse to write when free space would drop below this, e.g. "1g"
    #[serde(default = "default_freespace_minimum")]
    pub freespace_minimum: String,

    /// Refuse to write when the filesystem would be fuller than this
    #[serde(default = "default_space_maximum_percent")]
    pub space_maximum_percent: f64,

    /// Decoded PDUs a probe may hold for its writer before dropping
    #[serde(default = "default_max_queued_packets")]
    pub max_queued_packets: usize,

    /// How often per-probe statistics are logged
    #[serde(default = "default_stats_interval")]
    pub stats_interval_seconds: u64,

    /// How long a writer waits before re-checking a full disk
    #[serde(default = "default_disk_retry")]
    pub disk_retry_seconds: u64,

    /// Probes to collect from
    #[serde(default, rename = "probe")]
    pub probes: Vec<Probe>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            version: "1.0".to_string(),
            destination_dir: PathBuf::from("/var/lib/flowcap"),
            compression: Compression::default(),
            file_version: FILE_VERSION_DEFAULT,
            write_timeout_seconds: default_write_timeout(),
            max_file_size: "100m".to_string(),
            alloc_file_size: None,
            freespace_minimum: default_freespace_minimum(),
            space_maximum_percent: default_space_maximum_percent(),
            max_queued_packets: default_max_queued_packets(),
            stats_interval_seconds: default_stats_interval(),
            disk_retry_seconds: default_disk_retry(),
            probes: Vec::new(),
        }
    }
}

impl Config {
    /// Test is a configuration is valid.
    pub fn validate(&self) -> Result<(), String> {
        if self.version.trim() != "1.0" {
            return Err(format!(
                "Configuration file is at version [{}], but this version of flowcap only supports version 1.0",
                self.version
            ));
        }
        if self.destination_dir.as_os_str().is_empty() {
            return Err("destination_dir must be set".to_string());
        }
        if !(FILE_VERSION_MIN..=FILE_VERSION_MAX).contains(&self.file_version) {
            return Err(format!(
                "file_version {} is not supported; use {FILE_VERSION_MIN} through {FILE_VERSION_MAX}",
                self.file_version
            ));
        }
        if !self.compression.is_available() {
            return Err(format!(
                "Compression method '{}' is not available in this build",
                self.compression
            ));
        }
        if self.write_timeout_seconds == 0 {
            return Err("write_timeout_seconds must be greater than zero".to_string());
        }
        if self.max_file_size()? == 0 {
            return Err("max_file_size must be greater than zero".to_string());
        }
        self.alloc_file_size()?;
        self.freespace_minimum()?;
        if !(self.space_maximum_percent > 0.0 && self.space_maximum_percent <= 100.0) {
            return Err(format!(
                "space_maximum_percent must be in (0, 100], not {}",
                self.space_maximum_percent
            ));
        }
        if self.max_queued_packets == 0 {
            return Err("max_queued_packets must be greater than zero".to_string());
        }
        if self.probes.is_empty() {
            return Err("At least one [[probe]] must be configured".to_string());
        }
        let mut names = HashSet::new();
        for probe in &self.probes {
            probe.validate()?;
            if !names.insert(probe.name.as_str()) {
                return Err(format!("Probe name '{}' is used more than once", probe.name));
            }
        }
        Ok(())
    }

    /// Loads a config file from a string (used for testing only)
    #[allow(dead_code)]
    pub fn load_from_string(s: &str) -> Result<Self, String> {
        let config: Config = toml::from_str(s).map_err(|e| format!("Error parsing config: {}", e))?;
        config.validate()?;
        Ok(config)
    }

    /// `max_file_size` in bytes
    pub fn max_file_size(&self) -> Result<u64, String> {
        parse_human_size(&self.max_file_size).map_err(|e| format!("max_file_size: {e}"))
    }

    /// `alloc_file_size` in bytes, falling back to `max_file_size`
    pub fn alloc_file_size(&self) -> Result<u64, String> {
        match &self.alloc_file_size {
            Some(size) => parse_human_size(size).map_err(|e| format!("alloc_file_size: {e}")),
            None => self.max_file_size(),
        }
    }

    /// `freespace_minimum` in bytes
    pub fn freespace_minimum(&self) -> Result<u64, String> {
        parse_human_size(&self.freespace_minimum).map_err(|e| format!("freespace_minimum: {e}"))
    }

    /// The write timeout as a duration
    pub fn write_timeout(&self) -> Duration {
        Duration::from_secs(self.write_timeout_seconds)
    }

    /// Looks up a probe by name
    pub fn probe(&self, name: &str) -> Option<&Probe> {
        self.probes.iter().find(|p| p.name == name)
    }
}

/// Loads and validates the configuration from [`CONFIG_ENV`] if set,
/// otherwise from [`CONFIG_PATH`].
pub fn load_config() -> Result<Arc<Config>, ConfigError> {
    let path = std::env::var(CONFIG_ENV).unwrap_or_else(|_| CONFIG_PATH.to_string());
    info!("Loading configuration from {path}");
    let raw = std::fs::read_to_string(&path).map_err(|e| {
        error!("Unable to read {path}: {e:?}");
        ConfigError::CannotOpen(path.clone())
    })?;
    let config: Config = toml::from_str(&raw).map_err(|e| {
        error!("Unable to parse {path}: {e}");
        ConfigError::ParseError(e.to_string())
    })?;
    config.validate().map_err(|e| {
        error!("Invalid configuration in {path}: {e}");
        ConfigError::Invalid(e)
    })?;
    Ok(Arc::new(config))
}

/// Errors raised while loading the configuration.
#[derive(Error, Debug)]
pub enum ConfigError {
    /// The file could not be read
    #[error("Unable to read {0}")]
    CannotOpen(String),

    /// The file is not valid TOML for this schema
    #[error("Unable to parse configuration: {0}")]
    ParseError(String),

    /// The file parsed but a value is out of range
    #[error("Invalid configuration: {0}")]
    Invalid(String),
}
