//! Wires every configured probe to its source and writer.

use crate::admission::{Admission, SpaceCheck, StatvfsCheck};
use crate::rotation::{RotationError, RotationManager, RotationPolicy, RunSummary};
use anyhow::{anyhow, bail, Result};
use fcap_config::Config;
use fcap_flowsource::pdu::V5_PDU_LEN;
use fcap_flowsource::{version_filter, SourceParams, StatsSnapshot, UdpSource};
use fcap_utils::thread::StopLatch;
use std::net::SocketAddr;
use std::sync::Arc;
use std::thread::JoinHandle;
use tracing::{error, info};

type Writer = (String, JoinHandle<Result<RunSummary, RotationError>>);

/// The running probes of one daemon.
pub struct Collector {
    sources: Vec<UdpSource>,
    writers: Vec<Writer>,
    stop: Arc<StopLatch>,
}

impl Collector {
    /// Starts every probe in `config`, checking free space on the
    /// destination filesystem.
    pub fn start(config: &Config) -> Result<Self> {
        let admission = Admission {
            freespace_minimum: config.freespace_minimum().map_err(|e| anyhow!(e))?,
            space_maximum_percent: config.space_maximum_percent,
        };
        let space = Arc::new(StatvfsCheck::new(&config.destination_dir, admission));
        Self::start_with(config, space)
    }

    /// Starts every probe in `config` with a custom disk check.
    pub fn start_with<S: SpaceCheck + 'static>(config: &Config, space: Arc<S>) -> Result<Self> {
        if !config.destination_dir.is_dir() {
            bail!("Destination {:?} is not a directory", config.destination_dir);
        }
        let policy = Arc::new(RotationPolicy::from_config(config)?);
        let params = SourceParams {
            max_queued: config.max_queued_packets,
            ..SourceParams::default()
        };

        let mut collector = Self {
            sources: Vec::new(),
            writers: Vec::new(),
            stop: Arc::new(StopLatch::new()),
        };
        for probe in &config.probes {
            let probe = Arc::new(probe.clone());
            let started = UdpSource::create(
                probe.clone(),
                &params,
                V5_PDU_LEN,
                version_filter(probe.probe_type.wire_version()),
            )
            .map_err(anyhow::Error::from)
            .and_then(|source| {
                let manager = RotationManager::new(
                    probe.clone(),
                    policy.clone(),
                    space.clone(),
                    source.queue()?,
                    collector.stop.clone(),
                );
                let handle = manager.spawn()?;
                Ok((source, handle))
            });
            match started {
                Ok((source, handle)) => {
                    collector.sources.push(source);
                    collector.writers.push((probe.name.clone(), handle));
                }
                Err(e) => {
                    let _ = collector.shutdown();
                    return Err(e.context(format!("Unable to start probe '{}'", probe.name)));
                }
            }
        }
        info!(
            "Collecting from {} probes into {:?}",
            collector.sources.len(),
            config.destination_dir
        );
        Ok(collector)
    }

    /// Bound address of each probe, in configuration order.
    pub fn local_addrs(&self) -> Vec<(String, Option<SocketAddr>)> {
        self.sources
            .iter()
            .map(|s| (s.probe().name.clone(), s.local_addr()))
            .collect()
    }

    /// Current counters of each probe, without resetting them.
    pub fn snapshot(&self) -> Vec<(String, StatsSnapshot)> {
        self.sources
            .iter()
            .map(|s| (s.probe().name.clone(), s.stats().snapshot()))
            .collect()
    }

    /// Logs and resets every probe's counters.
    pub fn log_stats(&self) {
        for source in &self.sources {
            source.log_stats_and_clear();
        }
    }

    /// True once every writer has exited, as happens when all probes
    /// replay files and the files are exhausted.
    pub fn is_finished(&self) -> bool {
        self.writers.iter().all(|(_, handle)| handle.is_finished())
    }

    /// Stops receiving, lets every writer drain its queue and close its
    /// file, and returns the combined totals.
    pub fn shutdown(mut self) -> Result<RunSummary> {
        info!("Stopping {} probes", self.sources.len());
        self.stop.stop();
        for source in &self.sources {
            source.stop();
        }

        // Each receive thread unblocks its queue on exit; writers then drain
        // what is left and finish.
        for source in self.sources.drain(..) {
            source.log_stats_and_clear();
            source.destroy();
        }

        let mut total = RunSummary::default();
        let mut failed = Vec::new();
        for (name, handle) in self.writers.drain(..) {
            match handle.join() {
                Ok(Ok(summary)) => {
                    total.files += summary.files;
                    total.records += summary.records;
                    total.stalls += summary.stalls;
                    total.discarded += summary.discarded;
                }
                Ok(Err(e)) => {
                    error!("'{name}': writer failed: {e}");
                    failed.push(name);
                }
                Err(_) => {
                    error!("'{name}': writer panicked");
                    failed.push(name);
                }
            }
        }
        if !failed.is_empty() {
            bail!("Writers failed for probes: {}", failed.join(", "));
        }
        info!(
            "Wrote {} records to {} files",
            total.records, total.files
        );
        Ok(total)
    }
}
