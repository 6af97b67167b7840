use fcap_flowsource::FlowRecord;
use zerocopy::network_endian::{I64, U16, U32};
use zerocopy::{FromBytes, Immutable, IntoBytes, KnownLayout, Unaligned};

/// Bytes one record occupies in an output file, before compression.
pub const RECORD_LEN: usize = 52;

/// A flow as stored in an output file, big endian.
#[derive(Clone, Copy, Debug, PartialEq, Eq, FromBytes, IntoBytes, KnownLayout, Immutable, Unaligned)]
#[repr(C)]
pub struct FileRecord {
    pub src_addr: U32,
    pub dst_addr: U32,
    pub next_hop: U32,
    pub src_port: U16,
    pub dst_port: U16,
    pub input: U16,
    pub output: U16,
    pub packets: U32,
    pub bytes: U32,
    /// Milliseconds since the epoch
    pub start_ms: I64,
    pub elapsed_ms: U32,
    pub protocol: u8,
    pub tcp_flags: u8,
    pub tos: u8,
    pub src_mask: u8,
    pub dst_mask: u8,
    pub pad1: u8,
    pub src_as: U16,
    pub dst_as: U16,
    pub pad2: [u8; 2],
}

const _: () = assert!(std::mem::size_of::<FileRecord>() == RECORD_LEN);

impl From<&FlowRecord> for FileRecord {
    fn from(r: &FlowRecord) -> Self {
        Self {
            src_addr: U32::new(r.src_addr.into()),
            dst_addr: U32::new(r.dst_addr.into()),
            next_hop: U32::new(r.next_hop.into()),
            src_port: U16::new(r.src_port),
            dst_port: U16::new(r.dst_port),
            input: U16::new(r.input),
            output: U16::new(r.output),
            packets: U32::new(r.packets),
            bytes: U32::new(r.bytes),
            start_ms: I64::new(r.start_ms),
            elapsed_ms: U32::new(r.elapsed_ms),
            protocol: r.protocol,
            tcp_flags: r.tcp_flags,
            tos: r.tos,
            src_mask: r.src_mask,
            dst_mask: r.dst_mask,
            pad1: 0,
            src_as: U16::new(r.src_as),
            dst_as: U16::new(r.dst_as),
            pad2: [0; 2],
        }
    }
}
