use super::naming::{create_placeholder, stem, working_path};
use super::{RotationError, RotationPolicy};
use crate::admission::SpaceCheck;
use crate::container::{ContainerWriter, FileHeader, FORMAT_FLOWCAP, RECORD_LEN};
use fcap_config::Probe;
use fcap_deque::{Deque, Pop};
use fcap_flowsource::PduBatch;
use fcap_utils::thread::{spawn_named, StopLatch};
use fcap_utils::units::scale_bytes;
use fcap_utils::unix_time::unix_now;
use std::fs;
use std::path::PathBuf;
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Instant;
use tracing::{debug, error, info, warn};

/// What a manager did over its lifetime.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct RunSummary {
    /// Files closed with at least one record
    pub files: u64,
    /// Records written to those files
    pub records: u64,
    /// Times a batch was held back because the disk was full
    pub stalls: u64,
    /// Records left unwritten because shutdown came while output was held
    pub discarded: u64,
}

struct OutputFile {
    placeholder: PathBuf,
    working: PathBuf,
    writer: ContainerWriter,
    header_len: u64,
    opened: Instant,
    deadline: Instant,
}

enum Next {
    Continue,
    Finish,
}

/// Moves one probe's batches from its queue into rotating output files.
///
/// The file is closed when its write timeout expires, when the next record
/// would take it past the size limit, or when the disk refuses more data.
/// Batches the disk refuses, or that find no file can be opened, go back
/// to the front of the queue and are retried after a pause.
pub struct RotationManager<S: SpaceCheck + ?Sized> {
    probe: Arc<Probe>,
    policy: Arc<RotationPolicy>,
    space: Arc<S>,
    queue: Deque<PduBatch>,
    stop: Arc<StopLatch>,
    output: Option<OutputFile>,
    stalled: bool,
    summary: RunSummary,
}

impl<S: SpaceCheck + ?Sized + 'static> RotationManager<S> {
    /// `stop` is only consulted while waiting for disk space; the manager
    /// finishes when `queue` is unblocked (or destroyed) and empty.
    pub fn new(
        probe: Arc<Probe>,
        policy: Arc<RotationPolicy>,
        space: Arc<S>,
        queue: Deque<PduBatch>,
        stop: Arc<StopLatch>,
    ) -> Self {
        Self {
            probe,
            policy,
            space,
            queue,
            stop,
            output: None,
            stalled: false,
            summary: RunSummary::default(),
        }
    }

    /// Runs the manager on its own named thread.
    pub fn spawn(self) -> std::io::Result<JoinHandle<Result<RunSummary, RotationError>>> {
        let name = format!("fcap-write-{}", self.probe.name);
        spawn_named(name, move || self.run())
    }

    /// Processes batches until the queue is unblocked and drained, then
    /// closes the open file.
    pub fn run(mut self) -> Result<RunSummary, RotationError> {
        debug!("'{}': writer started", self.probe.name);
        let result = self.process();
        if let Err(e) = &result {
            error!("'{}': writer failed: {e}", self.probe.name);
        }
        let closed = self.close_output();
        if let (Err(_), Err(e)) = (&result, &closed) {
            error!("'{}': unable to close output: {e}", self.probe.name);
        }
        result.and(closed)?;
        debug!("'{}': writer finished: {:?}", self.probe.name, self.summary);
        Ok(self.summary)
    }

    fn process(&mut self) -> Result<(), RotationError> {
        loop {
            let popped = match &self.output {
                Some(out) => self.queue.pop_front_until(out.deadline),
                None => self.queue.pop_front(),
            };
            match popped {
                Pop::Item(batch) => {
                    if let Next::Finish = self.write_batch(batch)? {
                        return Ok(());
                    }
                }
                Pop::TimedOut => {
                    debug!("'{}': write timeout reached", self.probe.name);
                    self.close_output()?;
                }
                Pop::Unblocked | Pop::Destroyed | Pop::Empty => return Ok(()),
            }
        }
    }

    fn write_batch(&mut self, mut batch: PduBatch) -> Result<Next, RotationError> {
        if self.output.as_ref().is_some_and(|out| out.deadline <= Instant::now()) {
            self.close_output()?;
        }
        if self.output.is_some() {
            let needed = (batch.records.len() * RECORD_LEN) as u64;
            if !self.space.may_allocate(needed) {
                self.close_output()?;
                return self.stall(batch, "Not enough disk space");
            }
        }

        let max = self.policy.max_file_size;
        let mut next = 0;
        while next < batch.records.len() {
            if self
                .output
                .as_ref()
                .is_some_and(|out| out.writer.record_bytes() + RECORD_LEN as u64 > max)
            {
                self.close_output()?;
            }
            if self.output.is_none() {
                if !self.space.may_allocate(self.policy.alloc_file_size) {
                    batch.records.drain(..next);
                    return self.stall(batch, "Not enough disk space");
                }
                if let Err(e) = self.open_output() {
                    batch.records.drain(..next);
                    return self.stall(batch, &format!("Unable to open an output file: {e}"));
                }
            }
            if let Some(out) = self.output.as_mut() {
                out.writer
                    .append(&batch.records[next])
                    .map_err(|source| RotationError::Write {
                        path: out.working.clone(),
                        source,
                    })?;
            }
            next += 1;
        }
        Ok(Next::Continue)
    }

    /// Returns a batch that could not be written to the queue and waits
    /// before the next attempt.
    fn stall(&mut self, batch: PduBatch, reason: &str) -> Result<Next, RotationError> {
        let held = batch.records.len();
        self.queue.push_front(batch)?;
        self.summary.stalls += 1;
        if !self.stalled {
            warn!(
                "'{}': {reason}; holding {} records and retrying every {:?}",
                self.probe.name, held, self.policy.disk_retry
            );
            self.stalled = true;
        }
        if self.stop.wait_timeout(self.policy.disk_retry) {
            let mut discarded = 0;
            while let Pop::Item(batch) = self.queue.pop_front_nb() {
                discarded += batch.records.len() as u64;
            }
            error!(
                "'{}': Shutting down while output is held; {} records were not written",
                self.probe.name, discarded
            );
            self.summary.discarded += discarded;
            return Ok(Next::Finish);
        }
        Ok(Next::Continue)
    }

    fn open_output(&mut self) -> Result<(), RotationError> {
        let dir = &self.policy.destination_dir;
        let create_error = |source| RotationError::Create {
            path: dir.clone(),
            source,
        };
        let stem = stem(unix_now()?, &self.probe.sensor, &self.probe.name).map_err(create_error)?;
        let placeholder = create_placeholder(dir, &stem).map_err(create_error)?;
        let working = working_path(&placeholder);

        let header = FileHeader {
            format: FORMAT_FLOWCAP,
            version: self.policy.file_version,
            compression: self.policy.compression,
            record_len: RECORD_LEN as u16,
            sensor: self.probe.sensor.clone(),
            probe: self.probe.name.clone(),
        };
        let writer = match ContainerWriter::create(&working, &header) {
            Ok(writer) => writer,
            Err(source) => {
                let _ = fs::remove_file(&placeholder);
                return Err(RotationError::Write {
                    path: working,
                    source,
                });
            }
        };
        if self.stalled {
            info!("'{}': Writing again", self.probe.name);
            self.stalled = false;
        }
        debug!("'{}': Opened {:?}", self.probe.name, placeholder);
        let opened = Instant::now();
        self.output = Some(OutputFile {
            placeholder,
            working,
            writer,
            header_len: header.encoded_len() as u64,
            opened,
            deadline: opened + self.policy.write_timeout,
        });
        Ok(())
    }

    fn close_output(&mut self) -> Result<(), RotationError> {
        let Some(out) = self.output.take() else {
            return Ok(());
        };
        let summary = out.writer.finish().map_err(|source| RotationError::Write {
            path: out.working.clone(),
            source,
        })?;

        if summary.records == 0 {
            for path in [&out.working, &out.placeholder] {
                if let Err(e) = fs::remove_file(path) {
                    warn!("'{}': Unable to remove empty file {:?}: {e}", self.probe.name, path);
                }
            }
            debug!("'{}': Removed empty file {:?}", self.probe.name, out.placeholder);
            return Ok(());
        }

        fs::rename(&out.working, &out.placeholder).map_err(|source| RotationError::Rename {
            from: out.working.clone(),
            to: out.placeholder.clone(),
            source,
        })?;
        self.summary.files += 1;
        self.summary.records += summary.records;
        info!(
            "'{}': Closed {:?} after {:.1}s: {} recs, {} on disk ({:.1}% of raw)",
            self.probe.name,
            out.placeholder,
            out.opened.elapsed().as_secs_f64(),
            summary.records,
            scale_bytes(summary.file_bytes),
            summary.ratio_percent(out.header_len),
        );
        Ok(())
    }
}
