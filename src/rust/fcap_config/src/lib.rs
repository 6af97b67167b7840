//! Manages the `/etc/flowcap.conf` file: the output settings, disk
//! thresholds and the list of probes to collect from.
//!
//! The configuration is loaded once at startup, validated, and then shared
//! read-only (`Arc<Config>`) by every source and writer.

#![warn(missing_docs)]

mod config;
mod output;
mod probe;

pub use config::{load_config, Config, ConfigError, CONFIG_ENV, CONFIG_PATH};
pub use output::{Compression, FILE_VERSION_DEFAULT, FILE_VERSION_MAX, FILE_VERSION_MIN};
pub use probe::{LogFlag, Probe, ProbeType, NAME_MAX};
