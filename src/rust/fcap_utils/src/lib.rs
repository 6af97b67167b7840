//! Collection of utility functions for flowcap

#![warn(missing_docs)]

/// Utilities dealing with Unix Timestamps
pub mod unix_time;

/// Parsing and scaling human-readable byte sizes (`"1g"`, `"512m"`)
pub mod units;

/// Named worker threads and a stop latch for cooperative shutdown
pub mod thread;
