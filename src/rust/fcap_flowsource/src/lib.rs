//! NetFlow v5 flow sources.
//!
//! A [`UdpSource`] listens on one probe's socket (or replays a capture
//! file), decodes each datagram into [`FlowRecord`]s on its own thread and
//! queues the decoded [`PduBatch`]es for a consumer.

mod badpdu;
/// NetFlow v5 wire format, decoding and encoding
pub mod pdu;
mod sequence;
mod source;
mod stats;

pub use pdu::{decode, decode_pdu, DecodeError, FlowRecord, Pdu, PduHeader};
pub use sequence::{Observation, SequenceEvent, SequenceTracker};
pub use source::{version_filter, PduBatch, SourceError, SourceParams, UdpSource};
pub use stats::{SourceStats, StatsSnapshot};
