//! Cancellable fixed-cadence worker threads.
//!
//! A [`PeriodicJob`] owns exactly one named worker thread that invokes a
//! repeating action no more often than once per interval. The schedule is
//! deadline based on the monotonic clock: each deadline is the previous one plus
//! the interval, so sleep overshoot does not accumulate. When the action runs
//! late by more than a whole interval the missed ticks are dropped, never
//! replayed.
//!
//! Between ticks the worker blocks on a cancellation channel rather than
//! sleeping, so [`PeriodicJob::cancel`] wakes it immediately and
//! [`PeriodicJob::cancel_join`] usually returns well inside its bound.
//!
//! ```rust
//! use std::sync::Arc;
//! use std::sync::atomic::{AtomicU32, Ordering};
//! use std::time::Duration;
//! use stint::job::PeriodicJob;
//!
//! let job = PeriodicJob::new("counter", Duration::from_millis(5))?;
//! let count = Arc::new(AtomicU32::new(0));
//! let counter = Arc::clone(&count);
//! job.run(move || {
//!     counter.fetch_add(1, Ordering::Relaxed);
//! })?;
//! std::thread::sleep(Duration::from_millis(50));
//! assert!(job.cancel_join());
//! assert!(count.load(Ordering::Relaxed) > 0);
//! # Ok::<(), stint::StintError>(())
//! ```

use crossbeam_channel::{Receiver, RecvTimeoutError, Sender, bounded};
use parking_lot::Mutex;
use std::ops::ControlFlow;
use std::sync::Arc;
use std::sync::atomic::{AtomicU8, AtomicU64, Ordering};
use std::thread::{self, ThreadId};
use std::time::{Duration, Instant};
use tracing::{debug, error, trace};

use crate::types::interval_for_hz;
use crate::{Result, StintError};

/// Shortest interval a job accepts
pub const MIN_INTERVAL: Duration = Duration::from_millis(1);

/// Default bound for [`PeriodicJob::cancel_join`]
pub const DEFAULT_JOIN_TIMEOUT: Duration = Duration::from_millis(50);

/// Lifecycle of a job's worker thread
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobState {
    NotRunning,
    Running,
    CancelRequested,
}

impl JobState {
    fn from_u8(raw: u8) -> Self {
        match raw {
            1 => JobState::Running,
            2 => JobState::CancelRequested,
            _ => JobState::NotRunning,
        }
    }
}

#[derive(Debug, Default)]
struct JobShared {
    state: AtomicU8,
    ticks: AtomicU64,
}

impl JobShared {
    fn state(&self) -> JobState {
        JobState::from_u8(self.state.load(Ordering::Acquire))
    }

    fn transition(&self, from: JobState, to: JobState) -> bool {
        self.state
            .compare_exchange(from as u8, to as u8, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }
}

/// Handles to the worker of the current run
#[derive(Debug)]
struct Control {
    cancel_tx: Sender<()>,
    done_rx: Receiver<()>,
    worker: ThreadId,
}

/// Resets the job when the worker exits, including by panic
struct WorkerGuard {
    name: String,
    shared: Arc<JobShared>,
    done_tx: Sender<()>,
}

impl Drop for WorkerGuard {
    fn drop(&mut self) {
        if thread::panicking() {
            error!(job = %self.name, "Job action panicked, worker terminated");
        }
        self.shared.state.store(JobState::NotRunning as u8, Ordering::Release);
        let _ = self.done_tx.try_send(());
    }
}

/// A repeating action on its own worker thread
#[derive(Debug)]
pub struct PeriodicJob {
    name: String,
    interval: Duration,
    join_timeout: Duration,
    shared: Arc<JobShared>,
    control: Mutex<Option<Control>>,
}

impl PeriodicJob {
    /// Create a job that fires at most once per `interval`
    ///
    /// Intervals shorter than [`MIN_INTERVAL`] are rejected.
    pub fn new(name: impl Into<String>, interval: Duration) -> Result<Self> {
        if interval < MIN_INTERVAL {
            return Err(StintError::InvalidInterval { interval });
        }
        Ok(Self {
            name: name.into(),
            interval,
            join_timeout: DEFAULT_JOIN_TIMEOUT,
            shared: Arc::new(JobShared::default()),
            control: Mutex::new(None),
        })
    }

    /// Create a job that fires at most `hz` times per second
    pub fn from_hz(name: impl Into<String>, hz: u32) -> Result<Self> {
        let interval = interval_for_hz(hz).unwrap_or(Duration::ZERO);
        Self::new(name, interval)
    }

    /// Set the bound used by [`cancel_join`](Self::cancel_join)
    pub fn with_join_timeout(mut self, join_timeout: Duration) -> Self {
        self.join_timeout = join_timeout;
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    pub fn state(&self) -> JobState {
        self.shared.state()
    }

    /// Whether the worker thread is alive (running or finishing a cancel)
    pub fn is_running(&self) -> bool {
        self.state() != JobState::NotRunning
    }

    /// Number of completed action invocations across all runs
    pub fn ticks(&self) -> u64 {
        self.shared.ticks.load(Ordering::Relaxed)
    }

    /// Start the worker with an action that runs until cancelled
    pub fn run<F>(&self, mut action: F) -> Result<()>
    where
        F: FnMut() + Send + 'static,
    {
        self.start(
            move || {
                action();
                ControlFlow::Continue(())
            },
            || {},
        )
    }

    /// Start the worker with an action that can stop the job itself
    pub fn run_until<F>(&self, action: F) -> Result<()>
    where
        F: FnMut() -> ControlFlow<()> + Send + 'static,
    {
        self.start(action, || {})
    }

    /// Start the worker
    ///
    /// `after_cancel` runs on the worker thread once the loop has exited,
    /// whether by cancellation or because `action` returned `Break`. A panic in
    /// `action` terminates the worker without running it.
    pub fn start<F, A>(&self, mut action: F, after_cancel: A) -> Result<()>
    where
        F: FnMut() -> ControlFlow<()> + Send + 'static,
        A: FnOnce() + Send + 'static,
    {
        if !self.shared.transition(JobState::NotRunning, JobState::Running) {
            return Err(StintError::JobAlreadyRunning { name: self.name.clone() });
        }

        let (cancel_tx, cancel_rx) = bounded::<()>(1);
        let (done_tx, done_rx) = bounded::<()>(1);
        let guard = WorkerGuard { name: self.name.clone(), shared: Arc::clone(&self.shared), done_tx };
        let interval = self.interval;

        // Held across the spawn so a racing cancel sees this run's control
        let mut control = self.control.lock();
        let spawned = thread::Builder::new().name(self.name.clone()).spawn(move || {
            let guard = guard;
            let shared = Arc::clone(&guard.shared);
            let mut deadline = Instant::now() + interval;

            loop {
                let now = Instant::now();
                if now < deadline {
                    match cancel_rx.recv_timeout(deadline - now) {
                        Err(RecvTimeoutError::Timeout) => continue,
                        Ok(()) | Err(RecvTimeoutError::Disconnected) => break,
                    }
                }
                if shared.state() != JobState::Running {
                    break;
                }

                let flow = action();
                shared.ticks.fetch_add(1, Ordering::Relaxed);
                if flow.is_break() {
                    trace!(job = %guard.name, "Action requested stop");
                    break;
                }

                deadline += interval;
                let now = Instant::now();
                if deadline <= now {
                    // Behind by a whole interval, drop the missed ticks
                    deadline = now + interval;
                }
            }

            after_cancel();
            debug!(job = %guard.name, "Job worker finished");
        });

        match spawned {
            Ok(handle) => {
                let worker = handle.thread().id();
                *control = Some(Control { cancel_tx, done_rx, worker });
                debug!(job = %self.name, interval_ms = self.interval.as_millis() as u64, "Job started");
                Ok(())
            }
            Err(e) => {
                self.shared.state.store(JobState::NotRunning as u8, Ordering::Release);
                Err(StintError::thread_spawn(self.name.clone(), e))
            }
        }
    }

    /// Request the worker to stop after its current iteration
    ///
    /// Only meaningful while running; returns whether a request was made.
    pub fn cancel(&self) -> bool {
        if !self.shared.transition(JobState::Running, JobState::CancelRequested) {
            return false;
        }
        if let Some(control) = self.control.lock().as_ref() {
            let _ = control.cancel_tx.try_send(());
        }
        trace!(job = %self.name, "Cancel requested");
        true
    }

    /// Cancel and wait up to the join timeout for the worker to finish
    ///
    /// Returns whether the worker is known to have stopped. Never blocks longer
    /// than the join timeout; called from the worker itself it does not wait.
    pub fn cancel_join(&self) -> bool {
        self.cancel();

        let done_rx = match self.control.lock().as_ref() {
            Some(control) if control.worker == thread::current().id() => return false,
            Some(control) => control.done_rx.clone(),
            None => return true,
        };

        match done_rx.recv_timeout(self.join_timeout) {
            Ok(()) | Err(RecvTimeoutError::Disconnected) => true,
            Err(RecvTimeoutError::Timeout) => {
                debug!(job = %self.name, timeout_ms = self.join_timeout.as_millis() as u64, "Job did not stop in time");
                !self.is_running()
            }
        }
    }
}

impl Drop for PeriodicJob {
    fn drop(&mut self) {
        self.cancel();
    }
}
