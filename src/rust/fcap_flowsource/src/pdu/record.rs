use std::net::Ipv4Addr;

/// Number of milliseconds in 45 days. A First/Uptime difference larger
/// than this means one of the two counters rolled over.
pub(crate) const MAX_FLOW_TIME_DEVIATION: i64 = 45 * 24 * 3600 * 1000;

/// One more than `u32::MAX`: the period of a 32-bit millisecond counter.
pub(crate) const ROLLOVER32: i64 = 1 << 32;

const ICMP: u8 = 1;

/// A decoded flow record in host byte order, carrying the export context
/// needed to place it in absolute time.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct FlowRecord {
    pub src_addr: Ipv4Addr,
    pub dst_addr: Ipv4Addr,
    pub next_hop: Ipv4Addr,
    pub input: u16,
    pub output: u16,
    pub packets: u32,
    pub bytes: u32,
    /// Router uptime (ms) when the flow started
    pub first: u32,
    /// Router uptime (ms) when the flow last saw a packet
    pub last: u32,
    pub src_port: u16,
    pub dst_port: u16,
    pub tcp_flags: u8,
    pub protocol: u8,
    pub tos: u8,
    pub src_as: u16,
    pub dst_as: u16,
    pub src_mask: u8,
    pub dst_mask: u8,
    /// Router uptime (ms) when the PDU was exported
    pub sys_uptime: u32,
    /// Export time, seconds since the epoch
    pub unix_secs: u32,
    /// Export time, nanosecond part
    pub unix_nsecs: u32,
    /// Flow start, milliseconds since the epoch
    pub start_ms: i64,
    /// Flow duration in milliseconds
    pub elapsed_ms: u32,
}

/// Reasons a record is discarded after a successful decode.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BadRecord {
    /// Zero packets or zero bytes
    ZeroCounters,
    /// More packets than bytes
    PacketsExceedBytes,
    /// Last is earlier than First, and not by a rollover-sized amount
    EndBeforeStart,
}

impl std::fmt::Display for BadRecord {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            BadRecord::ZeroCounters => f.write_str("has zero packets or bytes"),
            BadRecord::PacketsExceedBytes => f.write_str("has more packets than bytes"),
            BadRecord::EndBeforeStart => f.write_str("has earlier end time than start time"),
        }
    }
}

impl FlowRecord {
    /// Flow end, milliseconds since the epoch
    pub fn end_ms(&self) -> i64 {
        self.start_ms + self.elapsed_ms as i64
    }

    /// Rejects records with impossible counters or timestamps, and moves
    /// an ICMP type/code that the exporter put (byte swapped) in the source
    /// port over to the destination port.
    pub fn sanitize(&mut self) -> Result<(), BadRecord> {
        if self.packets == 0 || self.bytes == 0 {
            return Err(BadRecord::ZeroCounters);
        }
        if self.packets > self.bytes {
            return Err(BadRecord::PacketsExceedBytes);
        }
        let difference = self.last as i64 - self.first as i64;
        if difference > MAX_FLOW_TIME_DEVIATION
            || (difference < 0 && difference > -MAX_FLOW_TIME_DEVIATION)
        {
            return Err(BadRecord::EndBeforeStart);
        }
        if self.protocol == ICMP && self.dst_port == 0 {
            self.dst_port = self.src_port.swap_bytes();
            self.src_port = 0;
        }
        Ok(())
    }
}

/// Absolute start time of a flow, milliseconds since the epoch.
///
/// `router_boot` is the export time minus the uptime. When First and the
/// uptime are more than 45 days apart one of the counters has wrapped, and
/// the start is moved by one counter period to compensate.
pub(crate) fn start_time(router_boot: i64, sys_uptime: u32, first: u32) -> i64 {
    let difference = sys_uptime as i64 - first as i64;
    if difference > MAX_FLOW_TIME_DEVIATION {
        router_boot + first as i64 + ROLLOVER32
    } else if difference < -MAX_FLOW_TIME_DEVIATION {
        router_boot + first as i64 - ROLLOVER32
    } else {
        router_boot + first as i64
    }
}
