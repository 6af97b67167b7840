//! Per-probe output file lifecycle: when files are opened, filled, closed
//! and named.

mod manager;
pub mod naming;

pub use manager::{RotationManager, RunSummary};

use crate::container::{ContainerError, RECORD_LEN};
use fcap_config::{Compression, Config};
use fcap_deque::DequeError;
use fcap_utils::unix_time::TimeError;
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum RotationError {
    #[error("Invalid output settings: {0}")]
    Config(String),
    #[error("Clock error: {0}")]
    Clock(#[from] TimeError),
    #[error("Unable to create output file in {path:?}: {source}")]
    Create {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("Error writing {path:?}: {source}")]
    Write {
        path: PathBuf,
        source: ContainerError,
    },
    #[error("Unable to rename {from:?} to {to:?}: {source}")]
    Rename {
        from: PathBuf,
        to: PathBuf,
        source: std::io::Error,
    },
    #[error("Handoff queue: {0}")]
    Queue(#[from] DequeError),
}

/// Output settings shared by every probe's writer.
#[derive(Clone, Debug, PartialEq)]
pub struct RotationPolicy {
    pub destination_dir: PathBuf,
    pub compression: Compression,
    pub file_version: u8,
    /// A file is closed this long after it was opened
    pub write_timeout: Duration,
    /// Record bytes (uncompressed) a file may hold
    pub max_file_size: u64,
    /// Space that must be available before a file is opened
    pub alloc_file_size: u64,
    /// Pause between attempts while the disk is full
    pub disk_retry: Duration,
}

impl RotationPolicy {
    pub fn from_config(config: &Config) -> Result<Self, RotationError> {
        let policy = Self {
            destination_dir: config.destination_dir.clone(),
            compression: config.compression,
            file_version: config.file_version,
            write_timeout: config.write_timeout(),
            max_file_size: config.max_file_size().map_err(RotationError::Config)?,
            alloc_file_size: config.alloc_file_size().map_err(RotationError::Config)?,
            disk_retry: Duration::from_secs(config.disk_retry_seconds),
        };
        policy.validate()?;
        Ok(policy)
    }

    pub fn validate(&self) -> Result<(), RotationError> {
        if self.max_file_size < RECORD_LEN as u64 {
            return Err(RotationError::Config(format!(
                "max_file_size of {} bytes cannot hold a {RECORD_LEN} byte record",
                self.max_file_size
            )));
        }
        if !self.compression.is_available() {
            return Err(RotationError::Config(format!(
                "compression method '{}' is not available",
                self.compression
            )));
        }
        if self.write_timeout.is_zero() {
            return Err(RotationError::Config("write timeout must be positive".to_string()));
        }
        Ok(())
    }

    /// Records that fit in one file
    pub fn records_per_file(&self) -> u64 {
        self.max_file_size / RECORD_LEN as u64
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn policy_from_example_config() {
        let config = Config {
            max_file_size: "1k".to_string(),
            compression: Compression::None,
            ..Config::default()
        };
        let policy = RotationPolicy::from_config(&config).unwrap();
        assert_eq!(policy.max_file_size, 1024);
        assert_eq!(policy.alloc_file_size, 1024);
        assert_eq!(policy.records_per_file(), 19);
        assert_eq!(policy.write_timeout, Duration::from_secs(60));
    }

    #[test]
    fn tiny_files_are_rejected() {
        let config = Config {
            max_file_size: "51".to_string(),
            ..Config::default()
        };
        assert!(matches!(
            RotationPolicy::from_config(&config),
            Err(RotationError::Config(_))
        ));
    }
}
