mod reader;
mod senders;

use crate::badpdu::BadPduLog;
use crate::pdu::{decode_pdu, FlowRecord, PduHeader, V5_HEADER_LEN};
use crate::sequence::{SequenceEvent, SequenceTracker};
use crate::stats::SourceStats;
use fcap_config::{LogFlag, Probe};
use fcap_deque::{Deque, DequeError, Pop};
use fcap_utils::thread::{spawn_named, StopLatch};
use fcap_utils::unix_time::unix_now_ms;
use reader::{PacketReader, ReadOutcome};
use senders::UnknownSenders;
use std::io;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, error, info, warn};

/// Tunables for a [`UdpSource`] that don't come from the probe itself.
#[derive(Debug, Clone)]
pub struct SourceParams {
    /// Decoded PDUs that may wait for the consumer before new ones are
    /// dropped
    pub max_queued: usize,
    /// How long a socket read waits before checking for a stop request
    pub poll_interval: Duration,
    /// Requested `SO_RCVBUF` size for the socket
    pub receive_buffer: Option<usize>,
}

impl Default for SourceParams {
    fn default() -> Self {
        Self {
            max_queued: 8192,
            poll_interval: Duration::from_millis(500),
            receive_buffer: Some(4 << 20),
        }
    }
}

/// The records of one accepted PDU, in the order the exporter sent them.
#[derive(Debug, Clone, PartialEq)]
pub struct PduBatch {
    /// Name of the probe that received it
    pub probe: Arc<str>,
    /// Local receive time, milliseconds since the epoch
    pub received_ms: u64,
    /// The PDU header
    pub header: PduHeader,
    /// Records that passed the sanity checks
    pub records: Vec<FlowRecord>,
}

/// Errors creating a source. Once a source exists, problems with
/// individual datagrams are counted and logged instead.
#[derive(Error, Debug)]
pub enum SourceError {
    /// The probe definition can't be used
    #[error("Probe '{probe}': {reason}")]
    Config {
        /// Probe name
        probe: String,
        /// What is wrong
        reason: String,
    },

    /// The UDP socket could not be bound
    #[error("Probe '{probe}': unable to bind {addr}: {source}")]
    Bind {
        /// Probe name
        probe: String,
        /// Requested address
        addr: SocketAddr,
        /// Underlying error
        source: io::Error,
    },

    /// The replay file could not be opened
    #[error("Probe '{probe}': unable to open {path:?}: {source}")]
    Open {
        /// Probe name
        probe: String,
        /// Requested file
        path: PathBuf,
        /// Underlying error
        source: io::Error,
    },

    /// The receive thread could not be started
    #[error("Probe '{probe}': unable to start receive thread: {source}")]
    Thread {
        /// Probe name
        probe: String,
        /// Underlying error
        source: io::Error,
    },

    /// The handoff queue is gone
    #[error("Handoff queue: {0}")]
    Queue(#[from] DequeError),
}

/// A reject callback that discards datagrams whose version field is
/// present and differs from `version`, before any decoding is attempted.
pub fn version_filter(version: u16) -> impl FnMut(&[u8]) -> bool + Send + 'static {
    move |datagram| match datagram.get(..2) {
        Some(&[hi, lo]) => u16::from_be_bytes([hi, lo]) != version,
        _ => false,
    }
}

/// Receives and decodes one probe's PDUs on a dedicated thread.
pub struct UdpSource {
    probe: Arc<Probe>,
    queue: Deque<PduBatch>,
    stop: Arc<StopLatch>,
    stats: Arc<SourceStats>,
    local_addr: Option<SocketAddr>,
    thread: Option<JoinHandle<()>>,
}

impl UdpSource {
    /// Binds the probe's socket (or opens its replay file) and starts the
    /// receive thread.
    ///
    /// `max_item_size` bounds one datagram. `reject` sees every raw
    /// datagram before decoding; returning `true` discards it.
    pub fn create<F>(
        probe: Arc<Probe>,
        params: &SourceParams,
        max_item_size: usize,
        reject: F,
    ) -> Result<Self, SourceError>
    where
        F: FnMut(&[u8]) -> bool + Send + 'static,
    {
        let config_error = |reason: String| SourceError::Config {
            probe: probe.name.clone(),
            reason,
        };
        if max_item_size < V5_HEADER_LEN {
            return Err(config_error(format!(
                "item size {max_item_size} cannot hold a PDU header"
            )));
        }
        if params.max_queued == 0 {
            return Err(config_error("queue bound must be greater than zero".to_string()));
        }

        let reader = match (probe.listen_addr().map_err(config_error)?, &probe.read_from_file) {
            (Some(addr), _) => PacketReader::bind(addr, params.poll_interval, params.receive_buffer)
                .map_err(|source| SourceError::Bind {
                    probe: probe.name.clone(),
                    addr,
                    source,
                })?,
            (None, Some(path)) => PacketReader::open(path).map_err(|source| SourceError::Open {
                probe: probe.name.clone(),
                path: path.clone(),
                source,
            })?,
            (None, None) => {
                return Err(config_error("no listen address or file".to_string()));
            }
        };
        let local_addr = reader.local_addr();

        let queue = Deque::new();
        let stop = Arc::new(StopLatch::new());
        let stats = Arc::new(SourceStats::default());
        let receiver = Receiver {
            probe: probe.clone(),
            name: Arc::from(probe.name.as_str()),
            reader,
            queue: queue.copy()?,
            stop: stop.clone(),
            stats: stats.clone(),
            max_queued: params.max_queued,
            buffer: vec![0; max_item_size],
            sequence: SequenceTracker::new(),
            bad_pdus: BadPduLog::default(),
            unknown_senders: UnknownSenders::default(),
            dropping: false,
        };
        let thread = spawn_named(format!("fcap-recv-{}", probe.name), move || {
            receiver.run(reject)
        })
        .map_err(|source| SourceError::Thread {
            probe: probe.name.clone(),
            source,
        })?;

        match local_addr {
            Some(addr) => info!("'{}': listening on {addr}", probe.name),
            None => info!("'{}': replaying {:?}", probe.name, probe.read_from_file),
        }
        Ok(Self {
            probe,
            queue,
            stop,
            stats,
            local_addr,
            thread: Some(thread),
        })
    }

    /// The probe this source serves
    pub fn probe(&self) -> &Arc<Probe> {
        &self.probe
    }

    /// The bound socket address; `None` when replaying a file
    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.local_addr
    }

    /// Asks the receive thread to finish. The thread unblocks the queue as
    /// it exits, within one poll interval, which wakes any consumer in
    /// [`UdpSource::next`]. Every batch it queued is visible before a
    /// consumer can see [`Pop::Unblocked`]. Safe to call repeatedly and
    /// from any thread.
    pub fn stop(&self) {
        if !self.stop.is_stopped() {
            debug!("'{}': stopping", self.probe.name);
        }
        self.stop.stop();
    }

    /// Stops the source if needed and waits for the receive thread.
    pub fn destroy(mut self) {
        self.shutdown();
    }

    fn shutdown(&mut self) {
        self.stop();
        if let Some(thread) = self.thread.take() {
            if thread.join().is_err() {
                error!("'{}': receive thread panicked", self.probe.name);
            }
        }
        let _ = self.queue.unblock();
    }

    /// Blocks until a batch is available. Returns `None` once the source
    /// has been stopped (or its replay file is exhausted) and the queue is
    /// drained.
    pub fn next(&self) -> Option<PduBatch> {
        match self.queue.pop_front() {
            Pop::Item(batch) => Some(batch),
            Pop::Unblocked | Pop::Destroyed => None,
            Pop::Empty | Pop::TimedOut => None,
        }
    }

    /// Another handle to the handoff queue, for consumers that need timed
    /// pops or want to return a batch to the front.
    pub fn queue(&self) -> Result<Deque<PduBatch>, SourceError> {
        Ok(self.queue.copy()?)
    }

    /// Batches waiting for the consumer
    pub fn pending(&self) -> usize {
        self.queue.size()
    }

    /// Live counters for this source
    pub fn stats(&self) -> &SourceStats {
        &self.stats
    }

    /// Logs the counters and resets them.
    pub fn log_stats_and_clear(&self) {
        self.stats.log_and_clear(&self.probe.name);
    }
}

impl Drop for UdpSource {
    fn drop(&mut self) {
        self.shutdown();
    }
}

/// State owned by the receive thread.
struct Receiver {
    probe: Arc<Probe>,
    name: Arc<str>,
    reader: PacketReader,
    queue: Deque<PduBatch>,
    stop: Arc<StopLatch>,
    stats: Arc<SourceStats>,
    max_queued: usize,
    buffer: Vec<u8>,
    sequence: SequenceTracker,
    bad_pdus: BadPduLog,
    unknown_senders: UnknownSenders,
    dropping: bool,
}

impl Receiver {
    fn run<F>(mut self, mut reject: F)
    where
        F: FnMut(&[u8]) -> bool,
    {
        debug!("'{}': receive loop started", self.name);
        while !self.stop.is_stopped() {
            let (len, sender) = match self.reader.read(&mut self.buffer) {
                Ok(ReadOutcome::Datagram { len, sender }) => (len, sender),
                Ok(ReadOutcome::Idle) => continue,
                Ok(ReadOutcome::Finished) => {
                    info!("'{}': end of replay file", self.name);
                    break;
                }
                Err(e) => {
                    error!("'{}': receive error: {e}", self.name);
                    break;
                }
            };

            if let Some(sender) = sender {
                if !self.probe.accepts(sender.ip()) {
                    if self.unknown_senders.first_sighting(sender.ip()) {
                        info!("'{}': Ignoring packets from host {}", self.name, sender.ip());
                    }
                    continue;
                }
            }

            if reject(&self.buffer[..len]) {
                self.stats.update(|s| s.rejected_packets += 1);
                continue;
            }

            if let Some(batch) = self.accept(len) {
                if !self.hand_off(batch) {
                    break;
                }
            }
        }
        self.bad_pdus.flush(&self.name);
        let _ = self.queue.unblock();
        debug!("'{}': receive loop finished", self.name);
    }

    /// Decodes and checks one datagram. Returns `None` when nothing in it
    /// is worth passing on.
    fn accept(&mut self, len: usize) -> Option<PduBatch> {
        let version = self.probe.probe_type.wire_version();
        let pdu = match decode_pdu(&self.buffer[..len], version) {
            Ok(pdu) => pdu,
            Err(e) => {
                self.stats.update(|s| {
                    s.processed_packets += 1;
                    s.bad_packets += 1;
                });
                self.bad_pdus.bad(&self.name, e);
                return None;
            }
        };
        self.bad_pdus.good(&self.name);
        self.track_sequence(&pdu.header);

        let mut records = pdu.records;
        let before = records.len();
        records.retain_mut(|record| match record.sanitize() {
            Ok(()) => true,
            Err(reason) => {
                if self.probe.logs(LogFlag::Bad) {
                    info!("'{}': Netflow record {}", self.name, reason);
                }
                false
            }
        });
        let good = records.len() as u64;
        let bad = (before - records.len()) as u64;
        self.stats.update(|s| {
            s.processed_packets += 1;
            s.good_records += good;
            s.bad_records += bad;
        });
        if records.is_empty() {
            return None;
        }

        Some(PduBatch {
            probe: self.name.clone(),
            received_ms: unix_now_ms().unwrap_or(0),
            header: pdu.header,
            records,
        })
    }

    fn track_sequence(&mut self, header: &PduHeader) {
        let observed = self.sequence.observe(header);
        if observed.rebooted {
            let message = format!(
                "'{}': Router reboot for engine {}.{}",
                self.name, header.engine_type, header.engine_id
            );
            if self.probe.logs(LogFlag::Timestamps) {
                info!("{message}");
            } else {
                debug!("{message}");
            }
        }
        let delta = observed.missing_delta(header.count);
        if delta != 0 {
            self.stats.update(|s| s.missing_records += delta);
        }
        if observed.event != SequenceEvent::InSequence && self.probe.logs(LogFlag::Missing) {
            info!(
                "'{}': Out-of-sequence packet: expecting {}, received {}, {:?}, elapsed {:.3} sec, engine {}.{}",
                self.name,
                observed.expected,
                header.flow_sequence,
                observed.event,
                observed.since_last_ms as f64 / 1000.0,
                header.engine_type,
                header.engine_id,
            );
        }
    }

    /// Queues a batch for the consumer. Returns `false` when the queue is
    /// gone and the loop should end.
    fn hand_off(&mut self, batch: PduBatch) -> bool {
        if self.queue.size() >= self.max_queued {
            self.stats.update(|s| s.dropped_packets += 1);
            if !self.dropping {
                warn!(
                    "'{}': {} PDUs are waiting to be written; dropping new PDUs",
                    self.name, self.max_queued
                );
                self.dropping = true;
            }
            return true;
        }
        if self.dropping {
            info!("'{}': writer caught up; accepting PDUs again", self.name);
            self.dropping = false;
        }
        match self.queue.push_back(batch) {
            Ok(()) => true,
            Err(DequeError::Alloc) => {
                self.stats.update(|s| s.dropped_packets += 1);
                warn!("'{}': out of memory queueing PDU; dropped", self.name);
                true
            }
            Err(DequeError::Inconsistent) => {
                error!("'{}': handoff queue destroyed", self.name);
                false
            }
        }
    }
}
