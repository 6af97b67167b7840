//! Builds wire-format PDUs, as an exporter would send them.

use super::decode::PduHeader;
use super::protocol::{Netflow5Header, Netflow5Record, V5_HEADER_LEN, V5_RECORD_LEN};
use super::record::FlowRecord;
use fcap_utils::unix_time::{time_since_boot, TimeError};
use nix::sys::time::TimeValLike;
use std::time::{SystemTime, UNIX_EPOCH};
use zerocopy::network_endian::{U16, U32};
use zerocopy::IntoBytes;

impl PduHeader {
    /// A version 5 header stamped with this host's uptime and clock, as an
    /// exporter running here would send it.
    pub fn exported_now(flow_sequence: u32, count: u16) -> Result<Self, TimeError> {
        let uptime = time_since_boot()?;
        let now = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map_err(|_| TimeError::ClockNotReady)?;
        Ok(Self {
            version: 5,
            count,
            sys_uptime: uptime.num_milliseconds() as u32,
            unix_secs: now.as_secs() as u32,
            unix_nsecs: now.subsec_nanos(),
            flow_sequence,
            engine_type: 0,
            engine_id: 0,
            sampling_interval: 0,
        })
    }
}

impl From<&PduHeader> for Netflow5Header {
    fn from(h: &PduHeader) -> Self {
        Self {
            version: U16::new(h.version),
            count: U16::new(h.count),
            sys_uptime: U32::new(h.sys_uptime),
            unix_secs: U32::new(h.unix_secs),
            unix_nsecs: U32::new(h.unix_nsecs),
            flow_sequence: U32::new(h.flow_sequence),
            engine_type: h.engine_type,
            engine_id: h.engine_id,
            sampling_interval: U16::new(h.sampling_interval),
        }
    }
}

impl From<&FlowRecord> for Netflow5Record {
    fn from(r: &FlowRecord) -> Self {
        Self {
            src_addr: U32::new(r.src_addr.into()),
            dst_addr: U32::new(r.dst_addr.into()),
            next_hop: U32::new(r.next_hop.into()),
            input: U16::new(r.input),
            output: U16::new(r.output),
            d_pkts: U32::new(r.packets),
            d_octets: U32::new(r.bytes),
            first: U32::new(r.first),
            last: U32::new(r.last),
            src_port: U16::new(r.src_port),
            dst_port: U16::new(r.dst_port),
            pad1: 0,
            tcp_flags: r.tcp_flags,
            prot: r.protocol,
            tos: r.tos,
            src_as: U16::new(r.src_as),
            dst_as: U16::new(r.dst_as),
            src_mask: r.src_mask,
            dst_mask: r.dst_mask,
            pad2: U16::new(0),
        }
    }
}

/// Serializes a header and records exactly as given. The header's count is
/// written unchanged, so callers can build deliberately inconsistent PDUs.
/// The export context fields of the records are not part of the wire
/// format and are ignored.
pub fn encode_pdu(header: &PduHeader, records: &[FlowRecord]) -> Vec<u8> {
    let mut buffer = Vec::with_capacity(V5_HEADER_LEN + records.len() * V5_RECORD_LEN);
    buffer.extend_from_slice(Netflow5Header::from(header).as_bytes());
    for record in records {
        buffer.extend_from_slice(Netflow5Record::from(record).as_bytes());
    }
    buffer
}
