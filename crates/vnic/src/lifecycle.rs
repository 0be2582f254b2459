//! Background thread lifecycle and the shutdown handshake
//!
//! Each controller owns one polling thread. Stopping it is a fixed sequence:
//! clear the run flag, fire the shutdown signal once, run the caller's
//! teardown, then join. The thread waits on the same signal both for its
//! bounded check and for its polling sleep, so it leaves within one wakeup
//! of being signalled.

use crate::error::{Result, VnicError};
use parking_lot::{Condvar, Mutex};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::JoinHandle;
use std::time::{Duration, Instant};
use tracing::{debug, info, instrument, warn};

/// Default polling interval of the background thread
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(50);

/// One-shot cross-thread "shutdown requested" signal with bounded waits
#[derive(Debug, Default)]
pub struct ShutdownSignal {
    fired: Mutex<bool>,
    cond: Condvar,
}

impl ShutdownSignal {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fire the signal. Returns true only for the call that fired it.
    pub fn notify(&self) -> bool {
        let mut fired = self.fired.lock();
        if *fired {
            return false;
        }
        *fired = true;
        self.cond.notify_all();
        true
    }

    pub fn is_notified(&self) -> bool {
        *self.fired.lock()
    }

    /// Wait up to `timeout` for the signal. Returns whether it has fired.
    pub fn wait_timeout(&self, timeout: Duration) -> bool {
        let mut fired = self.fired.lock();
        match Instant::now().checked_add(timeout) {
            Some(deadline) => {
                while !*fired {
                    if self.cond.wait_until(&mut fired, deadline).timed_out() {
                        break;
                    }
                }
            }
            // Too far out to represent: wait until notified.
            None => {
                while !*fired {
                    self.cond.wait(&mut fired);
                }
            }
        }
        *fired
    }
}

/// Per-tick work run by the background thread
pub trait Housekeeping: Send + Sync {
    fn housekeeping(&self);
}

/// Timing of the background thread
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct LifecycleConfig {
    /// Bounded wait on the shutdown signal at the top of each tick
    pub signal_check_timeout: Duration,
    /// Interruptible sleep between ticks
    pub poll_interval: Duration,
}

impl Default for LifecycleConfig {
    fn default() -> Self {
        Self {
            signal_check_timeout: Duration::ZERO,
            poll_interval: DEFAULT_POLL_INTERVAL,
        }
    }
}

/// Owns the background thread of one controller
#[derive(Debug)]
pub struct LifecycleController {
    name: String,
    running: Arc<AtomicBool>,
    signal: Arc<ShutdownSignal>,
    thread: Option<JoinHandle<()>>,
}

impl LifecycleController {
    /// Spawn the background thread, named `name`.
    ///
    /// Everything the thread observes is built before the spawn. If the OS
    /// refuses the thread, nothing is left running.
    #[instrument(skip_all, fields(thread = %name))]
    pub fn start(
        name: &str,
        config: LifecycleConfig,
        work: Arc<dyn Housekeeping>,
    ) -> Result<Self> {
        let running = Arc::new(AtomicBool::new(true));
        let signal = Arc::new(ShutdownSignal::new());

        let thread_running = Arc::clone(&running);
        let thread_signal = Arc::clone(&signal);
        let thread = std::thread::Builder::new()
            .name(name.to_string())
            .spawn(move || run_loop(&thread_running, &thread_signal, config, work.as_ref()))
            .map_err(|e| VnicError::Resource(format!("failed to spawn thread {}: {}", name, e)))?;

        info!(
            poll_interval_ms = config.poll_interval.as_millis() as u64,
            "Background thread started"
        );

        Ok(Self {
            name: name.to_string(),
            running,
            signal,
            thread: Some(thread),
        })
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Stop the thread: clear the run flag, fire the signal, run `teardown`,
    /// then join. Calling it again does nothing.
    #[instrument(skip_all, fields(thread = %self.name))]
    pub fn shutdown<F: FnOnce()>(&mut self, teardown: F) {
        let Some(thread) = self.thread.take() else {
            return;
        };

        self.running.store(false, Ordering::Release);
        self.signal.notify();
        teardown();

        if thread.join().is_err() {
            warn!("Background thread panicked");
        }
        info!("Background thread stopped");
    }
}

impl Drop for LifecycleController {
    fn drop(&mut self) {
        self.shutdown(|| {});
    }
}

fn run_loop(
    running: &AtomicBool,
    signal: &ShutdownSignal,
    config: LifecycleConfig,
    work: &dyn Housekeeping,
) {
    debug!("Polling loop entered");
    while running.load(Ordering::Acquire) {
        if signal.wait_timeout(config.signal_check_timeout) {
            break;
        }
        work.housekeeping();
        if signal.wait_timeout(config.poll_interval) {
            break;
        }
    }
    debug!("Polling loop exited");
}
