//! Definitions for the actual netflow 5 protocol

use zerocopy::network_endian::{U16, U32};
use zerocopy::{FromBytes, Immutable, IntoBytes, KnownLayout, Unaligned};

/// Size of the PDU header on the wire.
pub const V5_HEADER_LEN: usize = 24;
/// Size of one flow record on the wire.
pub const V5_RECORD_LEN: usize = 48;
/// Most records one PDU can carry: `(1500 - 24) / 48`, rounded down.
pub const V5_MAX_RECORDS: usize = 30;
/// Largest possible PDU, and the default receive buffer size.
pub const V5_PDU_LEN: usize = V5_HEADER_LEN + V5_MAX_RECORDS * V5_RECORD_LEN;

/// Standard Netflow 5 header, in network byte order
#[derive(FromBytes, IntoBytes, KnownLayout, Immutable, Unaligned, Clone, Copy, Debug)]
#[repr(C)]
pub struct Netflow5Header {
    pub version: U16,
    pub count: U16,
    pub sys_uptime: U32,
    pub unix_secs: U32,
    pub unix_nsecs: U32,
    pub flow_sequence: U32,
    pub engine_type: u8,
    pub engine_id: u8,
    pub sampling_interval: U16,
}

/// Standard Netflow 5 record, in network byte order
#[derive(FromBytes, IntoBytes, KnownLayout, Immutable, Unaligned, Clone, Copy, Debug)]
#[repr(C)]
pub struct Netflow5Record {
    pub src_addr: U32,
    pub dst_addr: U32,
    pub next_hop: U32,
    pub input: U16,
    pub output: U16,
    pub d_pkts: U32,
    pub d_octets: U32,
    pub first: U32,
    pub last: U32,
    pub src_port: U16,
    pub dst_port: U16,
    pub pad1: u8,
    pub tcp_flags: u8,
    pub prot: u8,
    pub tos: u8,
    pub src_as: U16,
    pub dst_as: U16,
    pub src_mask: u8,
    pub dst_mask: u8,
    pub pad2: U16,
}

const _: () = assert!(std::mem::size_of::<Netflow5Header>() == V5_HEADER_LEN);
const _: () = assert!(std::mem::size_of::<Netflow5Record>() == V5_RECORD_LEN);
const _: () = assert!(V5_PDU_LEN == 1464);
