//! Snapshot trackers and the topics they publish through.
//!
//! A [`Tracker`] polls one snapshot type from a [`SnapshotSource`] on its own
//! [`PeriodicJob`] and publishes every successful read to a [`Topic`]. Read
//! failures are transient: the tick is skipped and the next one tries again.
//!
//! ```rust
//! use std::sync::Arc;
//! use stint::providers::ScriptedSource;
//! use stint::tracker::Tracker;
//! use stint::types::PhysicsSnapshot;
//!
//! let source = Arc::new(ScriptedSource::new());
//! source.push_physics(PhysicsSnapshot { rpm: 6500, ..Default::default() });
//!
//! let tracker = Tracker::<PhysicsSnapshot>::start(source, 100)?;
//! let _subscription = tracker.subscribe(|physics| {
//!     let _ = physics.rpm;
//! });
//! tracker.shutdown();
//! # Ok::<(), stint::StintError>(())
//! ```

mod registry;
mod topic;

pub use registry::SubscriberId;
pub(crate) use topic::panic_message;
pub use topic::{Subscription, Topic};

use futures::stream::BoxStream;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, trace};

use crate::job::{DEFAULT_JOIN_TIMEOUT, PeriodicJob};
use crate::provider::{Snapshot, SnapshotSource};
use crate::types::UpdateRate;
use crate::{Result, StintError};

/// Log every Nth failure of a streak after the first
const FAILURE_LOG_EVERY: u64 = 100;

/// Rate-limited logging for consecutive transient failures
#[derive(Debug, Default)]
pub(crate) struct FailureStreak {
    count: u64,
}

impl FailureStreak {
    pub(crate) fn failed(&mut self, who: &str, error: &StintError) {
        self.count += 1;
        if self.count == 1 {
            debug!(who, error = %error, "Read failed, skipping tick");
        } else if self.count % FAILURE_LOG_EVERY == 0 {
            debug!(who, failures = self.count, error = %error, "Reads still failing");
        } else {
            trace!(who, failures = self.count, "Read failed");
        }
    }

    pub(crate) fn recovered(&mut self, who: &str) {
        if self.count > 0 {
            debug!(who, failures = self.count, "Reads recovered");
            self.count = 0;
        }
    }
}

/// Polls one snapshot type and fans it out to subscribers
pub struct Tracker<T: Snapshot> {
    topic: Topic<T>,
    source: Arc<dyn SnapshotSource>,
    job: PeriodicJob,
    hz: u32,
}

impl<T: Snapshot> Tracker<T> {
    /// Start polling `source` at `hz`
    pub fn start(source: Arc<dyn SnapshotSource>, hz: u32) -> Result<Self> {
        Self::start_with(source, hz, DEFAULT_JOIN_TIMEOUT)
    }

    /// Start polling with an explicit shutdown join bound
    pub fn start_with(source: Arc<dyn SnapshotSource>, hz: u32, join_timeout: Duration) -> Result<Self> {
        let name = T::KIND.as_str();
        let topic = Topic::new(name);
        let job = PeriodicJob::from_hz(format!("{name}-tracker"), hz)?.with_join_timeout(join_timeout);

        let poll_source = Arc::clone(&source);
        let poll_topic = topic.clone();
        let mut failures = FailureStreak::default();
        job.run(move || match T::read(poll_source.as_ref()) {
            Ok(snapshot) => {
                failures.recovered(name);
                poll_topic.publish(snapshot);
            }
            Err(e) => failures.failed(name, &e),
        })?;

        info!(tracker = name, hz, "Tracker started");
        Ok(Self { topic, source, job, hz })
    }

    /// The topic this tracker publishes to
    pub fn topic(&self) -> &Topic<T> {
        &self.topic
    }

    pub fn hz(&self) -> u32 {
        self.hz
    }

    /// Subscribe to every snapshot this tracker publishes
    pub fn subscribe<F>(&self, callback: F) -> Subscription
    where
        F: Fn(Arc<T>) + Send + Sync + 'static,
    {
        self.topic.subscribe(callback)
    }

    /// Most recently published snapshot
    pub fn latest(&self) -> Option<Arc<T>> {
        self.topic.latest()
    }

    /// Read the source directly, without publishing
    pub fn read_now(&self) -> Result<T> {
        T::read(self.source.as_ref())
    }

    pub fn updates(&self) -> BoxStream<'static, Arc<T>> {
        self.topic.updates()
    }

    /// Snapshot stream throttled relative to this tracker's cadence
    pub fn updates_at(&self, rate: UpdateRate) -> BoxStream<'static, Arc<T>> {
        self.topic.updates_at(rate, self.hz as f64)
    }

    pub fn is_running(&self) -> bool {
        self.job.is_running()
    }

    /// Stop the poll thread and close the topic
    ///
    /// Returns whether the poll thread stopped within the join bound.
    pub fn shutdown(&self) -> bool {
        if self.topic.is_closed() {
            return !self.job.is_running();
        }
        let stopped = self.job.cancel_join();
        self.topic.close();
        info!(tracker = T::KIND.as_str(), stopped, polls = self.job.ticks(), "Tracker shut down");
        stopped
    }
}

impl<T: Snapshot> Drop for Tracker<T> {
    fn drop(&mut self) {
        self.shutdown();
    }
}

impl<T: Snapshot> std::fmt::Debug for Tracker<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Tracker").field("topic", &self.topic).field("hz", &self.hz).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::providers::ScriptedSource;
    use crate::test_utils::wait_until;
    use crate::types::{GraphicsSnapshot, PhysicsSnapshot, SnapshotKind};
    use parking_lot::Mutex;

    #[test]
    fn publishes_polled_snapshots_in_order() {
        let source = Arc::new(ScriptedSource::new());
        for rpm in [1000, 2000, 3000] {
            source.push_physics(PhysicsSnapshot { rpm, ..Default::default() });
        }

        let tracker = Tracker::<PhysicsSnapshot>::start(source.clone(), 200).unwrap();
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        let _sub = tracker.subscribe(move |p| sink.lock().push(p.rpm));

        assert!(wait_until(Duration::from_secs(2), || seen.lock().contains(&3000)));
        tracker.shutdown();

        let seen = seen.lock().clone();
        let mut deduped = seen.clone();
        deduped.dedup();
        assert!(deduped.windows(2).all(|w| w[0] < w[1]), "out of order: {seen:?}");
    }

    #[test]
    fn transient_failures_skip_ticks() {
        let source = Arc::new(ScriptedSource::new());
        source.fail_next(SnapshotKind::Graphics, 5);
        source.push_graphics(GraphicsSnapshot { packet_id: 42, ..Default::default() });

        let tracker = Tracker::<GraphicsSnapshot>::start(source.clone(), 500).unwrap();
        assert!(wait_until(Duration::from_secs(2), || tracker.latest().is_some()));
        assert_eq!(tracker.latest().unwrap().packet_id, 42);
        assert!(source.reads(SnapshotKind::Graphics) >= 6);
        assert!(tracker.is_running());
    }

    #[test]
    fn shutdown_stops_polling_and_closes_topic() {
        let source = Arc::new(ScriptedSource::new());
        source.push_physics(PhysicsSnapshot::default());
        let tracker = Tracker::<PhysicsSnapshot>::start(source.clone(), 200).unwrap();
        assert!(wait_until(Duration::from_secs(2), || tracker.latest().is_some()));

        assert!(tracker.shutdown());
        assert!(!tracker.is_running());
        assert!(tracker.topic().is_closed());

        let reads = source.reads(SnapshotKind::Physics);
        std::thread::sleep(Duration::from_millis(30));
        assert_eq!(source.reads(SnapshotKind::Physics), reads);
    }

    #[test]
    fn read_now_bypasses_the_topic() {
        let source = Arc::new(ScriptedSource::new());
        source.push_static(crate::types::StaticSnapshot { max_rpm: 8000, ..Default::default() });
        let tracker = Tracker::<crate::types::StaticSnapshot>::start(source, 1).unwrap();

        assert_eq!(tracker.read_now().unwrap().max_rpm, 8000);
        assert!(tracker.latest().is_none());
    }

    #[test]
    fn zero_hz_is_rejected() {
        let source = Arc::new(ScriptedSource::new());
        let err = Tracker::<PhysicsSnapshot>::start(source, 0).unwrap_err();
        assert!(matches!(err, StintError::InvalidInterval { .. }));
    }
}
