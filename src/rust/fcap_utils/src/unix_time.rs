use chrono::{TimeZone, Utc};
use nix::{
  sys::time::TimeSpec,
  time::{clock_gettime, ClockId},
};
use std::time::{SystemTime, UNIX_EPOCH};
use thiserror::Error;
use tracing::{error, warn};

/// Retrieves the current time, in seconds since the UNIX epoch.
/// Otherwise known as "unix time".
///
/// It can fail if the clock isn't ready.
pub fn unix_now() -> Result<u64, TimeError> {
  match SystemTime::now().duration_since(UNIX_EPOCH) {
    Ok(t) => Ok(t.as_secs()),
    Err(e) => {
      error!("Error determining the time in UNIX land: {:?}", e);
      Err(TimeError::ClockNotReady)
    }
  }
}

/// Retrieves the current time in milliseconds since the UNIX epoch.
pub fn unix_now_ms() -> Result<u64, TimeError> {
  match SystemTime::now().duration_since(UNIX_EPOCH) {
    Ok(t) => Ok(t.as_millis() as u64),
    Err(e) => {
      error!("Error determining the time in UNIX land: {:?}", e);
      Err(TimeError::ClockNotReady)
    }
  }
}

/// Return the time since boot, from the Linux kernel.
/// Can fail if the clock isn't ready yet.
pub fn time_since_boot() -> Result<TimeSpec, TimeError> {
  match clock_gettime(ClockId::CLOCK_BOOTTIME) {
    Ok(t) => Ok(t),
    Err(e) => {
      warn!("Clock not ready: {:?}", e);
      Err(TimeError::ClockNotReady)
    }
  }
}

/// Formats a unix timestamp (seconds, UTC) as `YYYYMMDDhhmmss`, the
/// form used at the start of every output file name.
pub fn compact_timestamp(unix_secs: u64) -> Result<String, TimeError> {
  match Utc.timestamp_opt(unix_secs as i64, 0).single() {
    Some(t) => Ok(t.format("%Y%m%d%H%M%S").to_string()),
    None => Err(TimeError::OutOfRange(unix_secs)),
  }
}

/// Error type for time functions.
#[derive(Error, Debug)]
pub enum TimeError {
  /// The clock isn't ready yet.
  #[error("Clock not ready")]
  ClockNotReady,

  /// The timestamp cannot be represented as a calendar date.
  #[error("Timestamp {0} is out of range")]
  OutOfRange(u64),
}
