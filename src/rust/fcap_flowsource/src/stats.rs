use parking_lot::Mutex;
use tracing::info;

/// Counters for one source, reset every time they are logged.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct StatsSnapshot {
    /// Datagrams that reached the PDU checks
    pub processed_packets: u64,
    /// Datagrams that failed to decode
    pub bad_packets: u64,
    /// Datagrams discarded by the caller's reject callback
    pub rejected_packets: u64,
    /// Decoded PDUs dropped because the consumer fell behind
    pub dropped_packets: u64,
    /// Records passed to the consumer
    pub good_records: u64,
    /// Records discarded for bad counters or timestamps
    pub bad_records: u64,
    /// Records the sequence numbers say we never received. Late
    /// arrivals subtract from it, so it never goes below zero.
    pub missing_records: i64,
}

/// Thread-safe statistics shared between a source's receive thread and
/// whoever reports on it.
#[derive(Debug, Default)]
pub struct SourceStats {
    inner: Mutex<StatsSnapshot>,
}

impl SourceStats {
    pub(crate) fn update(&self, f: impl FnOnce(&mut StatsSnapshot)) {
        let mut stats = self.inner.lock();
        f(&mut stats);
        if stats.missing_records < 0 {
            stats.missing_records = 0;
        }
    }

    /// Copy of the current counters
    pub fn snapshot(&self) -> StatsSnapshot {
        *self.inner.lock()
    }

    /// Returns the counters and resets them to zero
    pub fn take(&self) -> StatsSnapshot {
        std::mem::take(&mut *self.inner.lock())
    }

    /// Logs the counters for `name`, then clears them.
    pub fn log_and_clear(&self, name: &str) {
        let s = self.take();
        info!(
            "'{}': Pkts {}/{}, Recs {}, MissRecs {}, BadRecs {}, Rejected {}, Dropped {}",
            name,
            s.processed_packets - s.bad_packets,
            s.processed_packets,
            s.good_records,
            s.missing_records,
            s.bad_records,
            s.rejected_packets,
            s.dropped_packets,
        );
    }
}
