//! Per-engine flow sequence tracking.
//!
//! Every PDU carries the sequence number of its first record. Comparing it
//! with the number we expected tells us whether records were lost in
//! transit, arrived late, or whether the exporter restarted its counter.

use crate::pdu::PduHeader;
use std::collections::HashMap;

const ROLLOVER32: i64 = 1 << 32;

/// Gaps smaller than this are treated as lost records: about an hour of
/// flows at 1k flows/sec.
const MAX_SEQUENCE_DEVIATION: i64 = 1000 * 3600;

/// Sequence numbers this far behind are treated as late arrivals: about a
/// minute of flows at 1k flows/sec.
const MAX_SEQUENCE_LATE_ARRIVAL: i64 = 1000 * 60;

/// Boot times computed from consecutive PDUs may jitter by this many
/// milliseconds before we decide the router rebooted.
const ROUTER_BOOT_FUZZ: i64 = 1000;

/// What a PDU's sequence number says about the records before it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SequenceEvent {
    /// Exactly the expected sequence number
    InSequence,
    /// This many records were skipped
    Missing(i64),
    /// Skipped records, counted across a sequence counter rollover
    MissingAcrossRollover(i64),
    /// The PDU is late; its records were previously counted as missing
    Late,
    /// The PDU is late and was sent before the counter rolled over
    LateAcrossRollover,
    /// The difference is too large to explain; start over from this PDU
    Reset,
}

/// Result of [`SequenceTracker::observe`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Observation {
    /// Sequence number that was expected
    pub expected: u32,
    /// How the received number relates to it
    pub event: SequenceEvent,
    /// The router's boot time moved, so the engine's counters were reset
    pub rebooted: bool,
    /// Milliseconds since the engine's previous PDU
    pub since_last_ms: i64,
}

impl Observation {
    /// Change to apply to the running missing-record count.
    pub fn missing_delta(&self, count: u16) -> i64 {
        match self.event {
            SequenceEvent::Missing(n) | SequenceEvent::MissingAcrossRollover(n) => n,
            SequenceEvent::Late | SequenceEvent::LateAcrossRollover => -(count as i64),
            SequenceEvent::InSequence | SequenceEvent::Reset => 0,
        }
    }
}

#[derive(Debug, Clone, Copy)]
struct Engine {
    router_boot: i64,
    flow_sequence: u32,
    last_timestamp: i64,
}

/// Tracks expected sequence numbers for every engine seen on one probe.
#[derive(Debug, Default)]
pub struct SequenceTracker {
    engines: HashMap<u16, Engine>,
}

impl SequenceTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of distinct engines seen so far
    pub fn engines(&self) -> usize {
        self.engines.len()
    }

    /// Updates the engine's state from a PDU header.
    pub fn observe(&mut self, header: &PduHeader) -> Observation {
        let now = header.export_ms();
        let router_boot = header.router_boot_ms();
        let sequence = header.flow_sequence;
        let count = header.count as u32;
        let engine = self.engines.entry(header.engine()).or_insert(Engine {
            router_boot,
            flow_sequence: sequence,
            last_timestamp: now,
        });

        let rebooted = (router_boot - engine.router_boot).abs() > ROUTER_BOOT_FUZZ;
        if rebooted {
            engine.flow_sequence = sequence;
        }
        engine.router_boot = router_boot;

        let expected = engine.flow_sequence;
        let next = sequence.wrapping_add(count);
        let event = if sequence == expected {
            engine.flow_sequence = next;
            SequenceEvent::InSequence
        } else if sequence > expected {
            let ahead = (sequence - expected) as i64;
            if ahead < MAX_SEQUENCE_DEVIATION {
                engine.flow_sequence = next;
                SequenceEvent::Missing(ahead)
            } else if ahead > ROLLOVER32 - MAX_SEQUENCE_LATE_ARRIVAL {
                SequenceEvent::LateAcrossRollover
            } else {
                engine.flow_sequence = next;
                SequenceEvent::Reset
            }
        } else {
            let behind = (expected - sequence) as i64;
            if behind > ROLLOVER32 - MAX_SEQUENCE_DEVIATION {
                engine.flow_sequence = next;
                SequenceEvent::MissingAcrossRollover(ROLLOVER32 - behind)
            } else if behind < MAX_SEQUENCE_LATE_ARRIVAL {
                SequenceEvent::Late
            } else {
                engine.flow_sequence = next;
                SequenceEvent::Reset
            }
        };

        let since_last_ms = now - engine.last_timestamp;
        engine.last_timestamp = now;
        Observation {
            expected,
            event,
            rebooted,
            since_last_ms,
        }
    }
}
