use anyhow::Result;
use fcap_utils::thread::StopLatch;
use flowcapd::collector::Collector;
use signal_hook::{
  consts::{SIGHUP, SIGINT, SIGTERM},
  iterator::Signals,
};
use std::sync::{
  atomic::{AtomicBool, Ordering},
  Arc,
};
use std::time::{Duration, Instant};
use tracing::{error, info, level_filters::LevelFilter, warn};

// Use JemAllocator only on supported platforms
#[cfg(any(target_arch = "x86", target_arch = "x86_64"))]
use jemallocator::Jemalloc;

// Use JemAllocator only on supported platforms
#[cfg(any(target_arch = "x86", target_arch = "x86_64"))]
#[global_allocator]
static GLOBAL: Jemalloc = Jemalloc;

const TICK: Duration = Duration::from_secs(1);

/// Configure console logging; the level comes from RUST_LOG.
pub fn set_console_logging() -> anyhow::Result<()> {
  let level = if let Ok(level) = std::env::var("RUST_LOG") {
    match level.to_lowercase().as_str() {
      "trace" => LevelFilter::TRACE,
      "debug" => LevelFilter::DEBUG,
      "info" => LevelFilter::INFO,
      "warn" => LevelFilter::WARN,
      "error" => LevelFilter::ERROR,
      _ => LevelFilter::WARN,
    }
  } else {
    LevelFilter::WARN
  };

  let subscriber = tracing_subscriber::fmt()
    .with_max_level(level)
    .compact()
    .with_file(true)
    .with_line_number(true)
    .with_thread_names(true)
    .with_target(false)
    .finish();

  tracing::subscriber::set_global_default(subscriber)?;
  Ok(())
}

fn main() -> Result<()> {
  set_console_logging()?;
  info!("flowcapd starting");

  let config = fcap_config::load_config()?;
  let collector = Collector::start(&config)
    .inspect_err(|e| error!("Unable to start collection: {e:?}"))?;

  // Handle signals
  let stop = Arc::new(StopLatch::new());
  let report_now = Arc::new(AtomicBool::new(false));
  let mut signals = Signals::new([SIGINT, SIGHUP, SIGTERM])?;
  {
    let stop = stop.clone();
    let report_now = report_now.clone();
    std::thread::Builder::new().name("Signal Handler".to_string()).spawn(move || {
      for sig in signals.forever() {
        match sig {
          SIGINT => {
            warn!("Terminating on SIGINT");
            stop.stop();
          }
          SIGTERM => {
            warn!("Terminating on SIGTERM");
            stop.stop();
          }
          SIGHUP => {
            info!("Logging statistics because of SIGHUP");
            report_now.store(true, Ordering::Relaxed);
          }
          _ => warn!("No handler for signal: {sig}"),
        }
      }
    })?;
  }

  let interval = Duration::from_secs(config.stats_interval_seconds);
  let mut next_report = Instant::now() + interval;
  while !stop.wait_timeout(TICK) {
    let due = !interval.is_zero() && Instant::now() >= next_report;
    if due || report_now.swap(false, Ordering::Relaxed) {
      collector.log_stats();
      next_report = Instant::now() + interval;
    }
    if collector.is_finished() {
      info!("All probes have finished");
      break;
    }
  }

  let total = collector.shutdown().inspect_err(|e| error!("Shutdown failed: {e:?}"))?;
  warn!(
    "Main thread exiting after writing {} records to {} files",
    total.records, total.files
  );
  Ok(())
}
