//! Lap timing engine: drives the accumulator from the graphics topic

use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

use super::accumulator::{LapAccumulator, ValidityPolicy};
use crate::job::PeriodicJob;
use crate::tracker::{FailureStreak, Subscription, Topic};
use crate::types::{GraphicsSnapshot, LapTimingData};
use crate::{Result, StintError};

const LAPS_TOPIC: &str = "laps";

struct EngineState {
    accumulator: Mutex<LapAccumulator>,
    history: Mutex<Vec<LapTimingData>>,
    laps: Topic<LapTimingData>,
}

impl EngineState {
    fn feed(&self, graphics: &GraphicsSnapshot) -> Option<LapTimingData> {
        let finished = self.accumulator.lock().observe(graphics)?;
        self.history.lock().push(finished);
        // Published with no engine lock held
        self.laps.publish(finished);
        Some(finished)
    }
}

/// Derives finished laps from graphics snapshots
///
/// A spawned engine runs its own [`PeriodicJob`] that reads the latest value
/// of the graphics topic on every tick; snapshots it has already processed are
/// skipped. Finished laps are appended to the history and published on the
/// [`laps`](Self::laps) topic, synchronously on the engine thread.
pub struct LapTimingEngine {
    state: Arc<EngineState>,
    job: Option<PeriodicJob>,
}

impl LapTimingEngine {
    /// Engine without a thread, driven through [`feed`](Self::feed)
    pub fn new(policy: ValidityPolicy) -> Self {
        Self {
            state: Arc::new(EngineState {
                accumulator: Mutex::new(LapAccumulator::new(policy)),
                history: Mutex::new(Vec::new()),
                laps: Topic::new(LAPS_TOPIC),
            }),
            job: None,
        }
    }

    /// Engine reading `graphics` at `hz` on its own thread
    pub fn spawn(
        graphics: Topic<GraphicsSnapshot>,
        hz: u32,
        policy: ValidityPolicy,
        join_timeout: Duration,
    ) -> Result<Self> {
        let mut engine = Self::new(policy);
        let job = PeriodicJob::from_hz("lap-timing", hz)?.with_join_timeout(join_timeout);

        let state = Arc::clone(&engine.state);
        let mut previous: Option<Arc<GraphicsSnapshot>> = None;
        let mut failures = FailureStreak::default();
        job.run(move || {
            let Some(latest) = graphics.latest() else {
                failures.failed(LAPS_TOPIC, &StintError::read_failed("graphics", "no snapshot published yet"));
                return;
            };
            failures.recovered(LAPS_TOPIC);

            if previous.as_ref().is_some_and(|seen| Arc::ptr_eq(seen, &latest)) {
                return;
            }
            state.feed(&latest);
            previous = Some(latest);
        })?;

        info!(hz, ?policy, "Lap timing engine started");
        engine.job = Some(job);
        Ok(engine)
    }

    /// Feed one snapshot synchronously
    pub fn feed(&self, graphics: &GraphicsSnapshot) -> Option<LapTimingData> {
        self.state.feed(graphics)
    }

    /// The LapFinished topic
    pub fn laps(&self) -> &Topic<LapTimingData> {
        &self.state.laps
    }

    /// Subscribe to finished laps; callbacks must not block
    pub fn on_lap_finished<F>(&self, callback: F) -> Subscription
    where
        F: Fn(Arc<LapTimingData>) + Send + Sync + 'static,
    {
        self.state.laps.subscribe(callback)
    }

    /// Finished laps in completion order
    pub fn history(&self) -> Vec<LapTimingData> {
        self.state.history.lock().clone()
    }

    /// Fastest valid finished lap
    pub fn best_lap(&self) -> Option<LapTimingData> {
        self.state.history.lock().iter().filter(|lap| lap.is_valid).min_by_key(|lap| lap.time_ms).copied()
    }

    /// The lap being accumulated
    pub fn current_lap(&self) -> LapTimingData {
        self.state.accumulator.lock().current()
    }

    pub fn is_running(&self) -> bool {
        self.job.as_ref().is_some_and(PeriodicJob::is_running)
    }

    /// Stop the engine thread and close the laps topic
    pub fn shutdown(&self) -> bool {
        if self.state.laps.is_closed() {
            return !self.is_running();
        }
        let stopped = self.job.as_ref().is_none_or(PeriodicJob::cancel_join);
        self.state.laps.close();
        info!(stopped, laps = self.state.history.lock().len(), "Lap timing engine shut down");
        stopped
    }
}

impl Drop for LapTimingEngine {
    fn drop(&mut self) {
        self.shutdown();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::{graphics_at, wait_until};
    use crate::types::LAP_TIME_SENTINEL;

    #[test]
    fn feed_appends_history_and_publishes() {
        let engine = LapTimingEngine::new(ValidityPolicy::Sticky);
        let published = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&published);
        let _sub = engine.on_lap_finished(move |lap| sink.lock().push(*lap));

        for g in [
            graphics_at(0, 0, 0, LAP_TIME_SENTINEL),
            graphics_at(0, 1, 10_000, LAP_TIME_SENTINEL),
            graphics_at(0, 2, 21_000, LAP_TIME_SENTINEL),
            graphics_at(1, 0, 21_000, 32_500),
        ] {
            engine.feed(&g);
        }

        assert_eq!(engine.history().len(), 1);
        assert_eq!(*published.lock(), engine.history());
        assert_eq!(engine.best_lap().map(|lap| lap.time_ms), Some(32_500));
        assert_eq!(engine.current_lap().index, 1);
    }

    #[test]
    fn best_lap_ignores_invalid_laps() {
        let engine = LapTimingEngine::new(ValidityPolicy::Sticky);
        let mut invalid = graphics_at(0, 1, 9_000, LAP_TIME_SENTINEL);
        invalid.is_valid_lap = false;

        engine.feed(&graphics_at(0, 0, 0, LAP_TIME_SENTINEL));
        engine.feed(&invalid);
        engine.feed(&graphics_at(0, 2, 18_000, LAP_TIME_SENTINEL));
        engine.feed(&graphics_at(1, 0, 18_000, 27_000));
        assert_eq!(engine.best_lap(), None);
    }

    #[test]
    fn spawned_engine_follows_the_graphics_topic() {
        let graphics = Topic::new("graphics");
        let engine = LapTimingEngine::spawn(graphics.clone(), 500, ValidityPolicy::Sticky, Duration::from_millis(50))
            .unwrap();

        for g in [
            graphics_at(0, 0, 0, LAP_TIME_SENTINEL),
            graphics_at(0, 1, 10_000, LAP_TIME_SENTINEL),
            graphics_at(0, 2, 21_000, LAP_TIME_SENTINEL),
            graphics_at(1, 0, 21_000, 32_500),
        ] {
            graphics.publish(g);
            std::thread::sleep(Duration::from_millis(15));
        }

        assert!(wait_until(Duration::from_secs(2), || engine.history().len() == 1));
        assert_eq!(engine.history()[0].sectors(), [Some(10_000), Some(11_000), Some(11_500)]);
        assert!(engine.shutdown());
        assert!(engine.laps().is_closed());
    }

    #[test]
    fn missing_graphics_does_not_stop_the_engine() {
        let graphics = Topic::<GraphicsSnapshot>::new("graphics");
        let engine = LapTimingEngine::spawn(graphics, 500, ValidityPolicy::Sticky, Duration::from_millis(50))
            .unwrap();
        std::thread::sleep(Duration::from_millis(30));
        assert!(engine.is_running());
    }
}
