//! Support for the Netflow 5 protocol
//! Mostly taken from: https://netflow.caligare.com/netflow_v5.htm

mod decode;
mod encode;
mod protocol;
mod record;

pub use decode::{decode, decode_pdu, DecodeError, Pdu, PduHeader};
pub use encode::encode_pdu;
pub use protocol::{
    Netflow5Header, Netflow5Record, V5_HEADER_LEN, V5_MAX_RECORDS, V5_PDU_LEN, V5_RECORD_LEN,
};
pub use record::{BadRecord, FlowRecord};
