use nix::sys::signal::{pthread_sigmask, SigSet, SigmaskHow, Signal};
use parking_lot::{Condvar, Mutex};
use std::{
  io,
  thread::JoinHandle,
  time::{Duration, Instant},
};
use tracing::warn;

/// Spawns a named worker thread. The name shows up in `top -H`, debuggers
/// and panic messages. Termination signals are masked in the new thread so
/// they are always delivered to the thread that owns the signal handler.
pub fn spawn_named<F, T>(name: impl Into<String>, f: F) -> io::Result<JoinHandle<T>>
where
  F: FnOnce() -> T + Send + 'static,
  T: Send + 'static,
{
  let name = name.into();
  std::thread::Builder::new().name(name.clone()).spawn(move || {
    let mut mask = SigSet::empty();
    for sig in [Signal::SIGINT, Signal::SIGTERM, Signal::SIGHUP, Signal::SIGPIPE] {
      mask.add(sig);
    }
    if let Err(e) = pthread_sigmask(SigmaskHow::SIG_BLOCK, Some(&mask), None) {
      warn!("Unable to mask signals in thread {name}: {e:?}");
    }
    f()
  })
}

/// A one-way latch used to ask worker loops to finish. Once tripped it
/// stays tripped; waiters are woken immediately.
#[derive(Default)]
pub struct StopLatch {
  stopped: Mutex<bool>,
  cond: Condvar,
}

impl StopLatch {
  /// Creates an untripped latch
  pub fn new() -> Self {
    Self::default()
  }

  /// Trips the latch. Calling it more than once is harmless.
  pub fn stop(&self) {
    let mut stopped = self.stopped.lock();
    if !*stopped {
      *stopped = true;
      self.cond.notify_all();
    }
  }

  /// Has [`StopLatch::stop`] been called?
  pub fn is_stopped(&self) -> bool {
    *self.stopped.lock()
  }

  /// Sleeps for up to `timeout`, returning early if the latch trips.
  /// Returns `true` if the latch is tripped.
  pub fn wait_timeout(&self, timeout: Duration) -> bool {
    let deadline = Instant::now() + timeout;
    let mut stopped = self.stopped.lock();
    while !*stopped {
      if self.cond.wait_until(&mut stopped, deadline).timed_out() {
        break;
      }
    }
    *stopped
  }
}

#[cfg(test)]
mod test {
  use super::*;
  use std::sync::Arc;

  #[test]
  fn named_thread_has_name() {
    let handle = spawn_named("fcap-test", || {
      std::thread::current().name().map(|s| s.to_string())
    })
    .unwrap();
    assert_eq!(handle.join().unwrap().as_deref(), Some("fcap-test"));
  }

  #[test]
  fn latch_times_out_when_untripped() {
    let latch = StopLatch::new();
    let start = Instant::now();
    assert!(!latch.wait_timeout(Duration::from_millis(20)));
    assert!(start.elapsed() >= Duration::from_millis(20));
  }

  #[test]
  fn latch_wakes_waiter() {
    let latch = Arc::new(StopLatch::new());
    let waiter = {
      let latch = latch.clone();
      spawn_named("latch-waiter", move || latch.wait_timeout(Duration::from_secs(30))).unwrap()
    };
    std::thread::sleep(Duration::from_millis(20));
    latch.stop();
    latch.stop();
    assert!(waiter.join().unwrap());
    assert!(latch.is_stopped());
  }
}
