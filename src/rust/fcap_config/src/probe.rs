//! Probe definitions: where flow records come from and how they are named.

use serde::{Deserialize, Serialize};
use std::net::{IpAddr, SocketAddr, ToSocketAddrs};
use std::path::PathBuf;

/// Maximum length of a probe or sensor name, in bytes.
pub const NAME_MAX: usize = 63;

/// Export protocol spoken by a probe.
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub enum ProbeType {
    /// Cisco NetFlow version 5
    #[serde(rename = "netflow-v5")]
    NetflowV5,
}

impl ProbeType {
    /// Version number carried in the PDU header.
    pub fn wire_version(self) -> u16 {
        match self {
            ProbeType::NetflowV5 => 5,
        }
    }
}

/// Optional per-probe log messages.
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum LogFlag {
    /// Log every record rejected for bad counters or timestamps
    Bad,
    /// Log sequence number gaps
    Missing,
    /// Log router reboots and timestamp rollover handling at info level
    Timestamps,
    /// All of the above
    All,
}

/// A single `[[probe]]` entry.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct Probe {
    /// Unique probe name, used in log messages and output file names
    pub name: String,

    /// Sensor the probe's records are attributed to
    pub sensor: String,

    /// Export protocol
    #[serde(rename = "type")]
    pub probe_type: ProbeType,

    /// `address:port` to listen on for UDP datagrams
    pub listen_on: Option<String>,

    /// Replay PDUs from a file instead of listening on the network
    pub read_from_file: Option<PathBuf>,

    /// If non-empty, only datagrams from these hosts are accepted
    #[serde(default)]
    pub accept_from: Vec<IpAddr>,

    /// Optional extra logging
    #[serde(default)]
    pub log_flags: Vec<LogFlag>,
}

impl Probe {
    /// Creates a network probe with no sender filter.
    pub fn udp(name: &str, sensor: &str, listen_on: &str) -> Self {
        Self {
            name: name.to_string(),
            sensor: sensor.to_string(),
            probe_type: ProbeType::NetflowV5,
            listen_on: Some(listen_on.to_string()),
            read_from_file: None,
            accept_from: Vec::new(),
            log_flags: Vec::new(),
        }
    }

    /// Is the given log flag enabled, directly or through `all`?
    pub fn logs(&self, flag: LogFlag) -> bool {
        self.log_flags
            .iter()
            .any(|f| *f == flag || *f == LogFlag::All)
    }

    /// Resolves `listen_on` to a socket address.
    pub fn listen_addr(&self) -> Result<Option<SocketAddr>, String> {
        let Some(listen_on) = &self.listen_on else {
            return Ok(None);
        };
        let mut addrs = listen_on
            .to_socket_addrs()
            .map_err(|e| format!("Probe '{}': cannot resolve '{listen_on}': {e}", self.name))?;
        match addrs.next() {
            Some(addr) => Ok(Some(addr)),
            None => Err(format!("Probe '{}': '{listen_on}' resolves to nothing", self.name)),
        }
    }

    /// Should a datagram from `sender` be processed?
    pub fn accepts(&self, sender: IpAddr) -> bool {
        self.accept_from.is_empty() || self.accept_from.contains(&sender)
    }

    pub(crate) fn validate(&self) -> Result<(), String> {
        validate_name("Probe", &self.name)?;
        validate_name("Sensor", &self.sensor)?;
        match (&self.listen_on, &self.read_from_file) {
            (Some(_), Some(_)) => {
                return Err(format!(
                    "Probe '{}' may not have both listen_on and read_from_file",
                    self.name
                ))
            }
            (None, None) => {
                return Err(format!(
                    "Probe '{}' needs either listen_on or read_from_file",
                    self.name
                ))
            }
            (Some(_), None) => {
                self.listen_addr()?;
            }
            (None, Some(_)) => {}
        }
        Ok(())
    }
}

/// Names end up in file names, so keep them short and path-safe. The `-`
/// separates sensor from probe and `_` the timestamp, so a sensor may not
/// contain either separator.
fn validate_name(kind: &str, name: &str) -> Result<(), String> {
    if name.is_empty() {
        return Err(format!("{kind} name may not be empty"));
    }
    if name.len() > NAME_MAX {
        return Err(format!("{kind} name '{name}' is longer than {NAME_MAX} bytes"));
    }
    let separators: &[char] = if kind == "Sensor" { &['-', '_'] } else { &[] };
    if let Some(bad) = name
        .chars()
        .find(|c| !(c.is_ascii_alphanumeric() || *c == '-' || *c == '_' || *c == '.') || separators.contains(c))
    {
        return Err(format!("{kind} name '{name}' may not contain '{bad}'"));
    }
    if name.starts_with('.') {
        return Err(format!("{kind} name '{name}' may not start with '.'"));
    }
    Ok(())
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn log_flag_all_enables_everything() {
        let mut probe = Probe::udp("p0", "s0", "127.0.0.1:9999");
        assert!(!probe.logs(LogFlag::Missing));
        probe.log_flags = vec![LogFlag::All];
        assert!(probe.logs(LogFlag::Missing));
        assert!(probe.logs(LogFlag::Bad));
    }

    #[test]
    fn accept_from_filters_senders() {
        let mut probe = Probe::udp("p0", "s0", "127.0.0.1:9999");
        let a: IpAddr = "192.0.2.1".parse().unwrap();
        let b: IpAddr = "192.0.2.2".parse().unwrap();
        assert!(probe.accepts(b));
        probe.accept_from = vec![a];
        assert!(probe.accepts(a));
        assert!(!probe.accepts(b));
    }

    #[test]
    fn names_are_checked() {
        assert!(Probe::udp("p0", "s0", "127.0.0.1:9999").validate().is_ok());
        assert!(Probe::udp("", "s0", "127.0.0.1:9999").validate().is_err());
        assert!(Probe::udp("p/0", "s0", "127.0.0.1:9999").validate().is_err());
        assert!(Probe::udp("p0", "s-0", "127.0.0.1:9999").validate().is_err());
        assert!(Probe::udp(&"x".repeat(64), "s0", "127.0.0.1:9999").validate().is_err());
        assert!(Probe::udp("p0", "s0", "not an address").validate().is_err());
    }

    #[test]
    fn source_must_be_exactly_one() {
        let mut probe = Probe::udp("p0", "s0", "127.0.0.1:9999");
        probe.read_from_file = Some("/tmp/pdus".into());
        assert!(probe.validate().is_err());
        probe.listen_on = None;
        assert!(probe.validate().is_ok());
        probe.read_from_file = None;
        assert!(probe.validate().is_err());
    }
}
