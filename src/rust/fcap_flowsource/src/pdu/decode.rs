use super::protocol::{Netflow5Header, Netflow5Record, V5_HEADER_LEN, V5_MAX_RECORDS, V5_RECORD_LEN};
use super::record::{start_time, FlowRecord};
use std::net::Ipv4Addr;
use thiserror::Error;
use zerocopy::FromBytes;

/// PDU header fields in host byte order.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PduHeader {
    pub version: u16,
    pub count: u16,
    pub sys_uptime: u32,
    pub unix_secs: u32,
    pub unix_nsecs: u32,
    pub flow_sequence: u32,
    pub engine_type: u8,
    pub engine_id: u8,
    pub sampling_interval: u16,
}

impl PduHeader {
    /// Export time, milliseconds since the epoch
    pub fn export_ms(&self) -> i64 {
        self.unix_secs as i64 * 1000 + (self.unix_nsecs / 1_000_000) as i64
    }

    /// When the exporting router booted, milliseconds since the epoch
    pub fn router_boot_ms(&self) -> i64 {
        self.export_ms() - self.sys_uptime as i64
    }

    /// Engine type and id combined, identifying one sequence space
    pub fn engine(&self) -> u16 {
        (self.engine_type as u16) << 8 | self.engine_id as u16
    }
}

impl From<&Netflow5Header> for PduHeader {
    fn from(h: &Netflow5Header) -> Self {
        Self {
            version: h.version.get(),
            count: h.count.get(),
            sys_uptime: h.sys_uptime.get(),
            unix_secs: h.unix_secs.get(),
            unix_nsecs: h.unix_nsecs.get(),
            flow_sequence: h.flow_sequence.get(),
            engine_type: h.engine_type,
            engine_id: h.engine_id,
            sampling_interval: h.sampling_interval.get(),
        }
    }
}

/// A decoded PDU.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Pdu {
    pub header: PduHeader,
    pub records: Vec<FlowRecord>,
}

/// Why a datagram could not be decoded.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DecodeError {
    /// Shorter than a PDU header
    #[error("due to truncated header ({0} bytes)")]
    TruncatedHeader(usize),

    /// Header version doesn't match the probe
    #[error("not marked as version {expected} (found {found})")]
    BadVersion {
        /// Version the probe speaks
        expected: u16,
        /// Version found in the header
        found: u16,
    },

    /// Header declares no records
    #[error("reporting zero records")]
    ZeroRecords,

    /// Header declares more records than a PDU can carry
    #[error("reporting more than 30 records ({0})")]
    TooManyRecords(u16),

    /// Declared records run past the end of the datagram
    #[error("due to truncated data section ({count} records in {len} bytes)")]
    TruncatedData {
        /// Declared record count
        count: u16,
        /// Datagram length
        len: usize,
    },

    /// The output vector could not be allocated
    #[error("unable to allocate records")]
    Alloc,
}

impl DecodeError {
    /// Errors of the same kind compare equal here regardless of the
    /// numbers they carry. Used to log a run of identical rejections once.
    pub fn same_kind(&self, other: &DecodeError) -> bool {
        std::mem::discriminant(self) == std::mem::discriminant(other)
    }
}

/// Decodes one datagram into flow records. `probe_version` is the export
/// version the probe is configured for.
pub fn decode(buffer: &[u8], probe_version: u16) -> Result<Vec<FlowRecord>, DecodeError> {
    decode_pdu(buffer, probe_version).map(|pdu| pdu.records)
}

/// Decodes one datagram into its header and flow records. The buffer is
/// never modified and nothing past `buffer.len()` is read; bytes after the
/// declared records are ignored.
pub fn decode_pdu(buffer: &[u8], probe_version: u16) -> Result<Pdu, DecodeError> {
    let Ok((wire_header, body)) = Netflow5Header::read_from_prefix(buffer) else {
        return Err(DecodeError::TruncatedHeader(buffer.len()));
    };
    let header = PduHeader::from(&wire_header);

    if header.version != probe_version {
        return Err(DecodeError::BadVersion {
            expected: probe_version,
            found: header.version,
        });
    }
    let count = header.count as usize;
    if count == 0 {
        return Err(DecodeError::ZeroRecords);
    }
    if count > V5_MAX_RECORDS {
        return Err(DecodeError::TooManyRecords(header.count));
    }
    if V5_HEADER_LEN + count * V5_RECORD_LEN > buffer.len() {
        return Err(DecodeError::TruncatedData {
            count: header.count,
            len: buffer.len(),
        });
    }

    let mut records = Vec::new();
    records
        .try_reserve_exact(count)
        .map_err(|_| DecodeError::Alloc)?;

    let router_boot = header.router_boot_ms();
    for chunk in body.chunks_exact(V5_RECORD_LEN).take(count) {
        let wire = Netflow5Record::read_from_bytes(chunk).map_err(|_| DecodeError::TruncatedData {
            count: header.count,
            len: buffer.len(),
        })?;
        let first = wire.first.get();
        let last = wire.last.get();
        records.push(FlowRecord {
            src_addr: Ipv4Addr::from(wire.src_addr.get()),
            dst_addr: Ipv4Addr::from(wire.dst_addr.get()),
            next_hop: Ipv4Addr::from(wire.next_hop.get()),
            input: wire.input.get(),
            output: wire.output.get(),
            packets: wire.d_pkts.get(),
            bytes: wire.d_octets.get(),
            first,
            last,
            src_port: wire.src_port.get(),
            dst_port: wire.dst_port.get(),
            tcp_flags: wire.tcp_flags,
            protocol: wire.prot,
            tos: wire.tos,
            src_as: wire.src_as.get(),
            dst_as: wire.dst_as.get(),
            src_mask: wire.src_mask,
            dst_mask: wire.dst_mask,
            sys_uptime: header.sys_uptime,
            unix_secs: header.unix_secs,
            unix_nsecs: header.unix_nsecs,
            start_ms: start_time(router_boot, header.sys_uptime, first),
            elapsed_ms: last.wrapping_sub(first),
        });
    }

    Ok(Pdu { header, records })
}
