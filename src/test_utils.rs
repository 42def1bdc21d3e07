//! Test utilities shared by unit tests and benchmarks
//!
//! Snapshot builders, a fast-cadence configuration and a polling helper for
//! assertions on state that other threads update.

#![cfg(any(test, feature = "benchmark"))]

use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::config::StintConfig;
use crate::provider::SnapshotSource;
use crate::services::TelemetryServices;
use crate::types::{GraphicsSnapshot, LAP_TIME_SENTINEL};

/// Poll `condition` every millisecond until it holds or `timeout` passes
pub fn wait_until(timeout: Duration, mut condition: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + timeout;
    loop {
        if condition() {
            return true;
        }
        if Instant::now() >= deadline {
            return false;
        }
        std::thread::sleep(Duration::from_millis(1));
    }
}

/// Graphics snapshot at a point in a lap, on a valid lap
pub fn graphics_at(completed_laps: i32, sector: i32, last_sector_ms: i32, last_time_ms: i32) -> GraphicsSnapshot {
    GraphicsSnapshot {
        completed_laps,
        current_sector_index: sector,
        last_sector_time_ms: last_sector_ms,
        last_time_ms,
        is_valid_lap: true,
        ..Default::default()
    }
}

/// The snapshots of one full lap from its start line, sectors in ms
///
/// `completed_laps` is the count at the start of the lap; the last snapshot
/// crosses the line and carries the lap time.
pub fn full_lap(completed_laps: i32, sectors: [i32; 3]) -> Vec<GraphicsSnapshot> {
    let [s1, s2, s3] = sectors;
    vec![
        graphics_at(completed_laps, 0, 0, LAP_TIME_SENTINEL),
        graphics_at(completed_laps, 1, s1, LAP_TIME_SENTINEL),
        graphics_at(completed_laps, 2, s1 + s2, LAP_TIME_SENTINEL),
        graphics_at(completed_laps + 1, 0, s1 + s2, s1 + s2 + s3),
    ]
}

/// Default configuration with cadences fast enough for tests
pub fn fast_config() -> StintConfig {
    StintConfig { physics_hz: 200, graphics_hz: 200, static_hz: 50, ..StintConfig::default() }
}

/// Services running against `source` with [`fast_config`]
pub fn test_services(source: Arc<dyn SnapshotSource>) -> Arc<TelemetryServices> {
    match TelemetryServices::start(source, &fast_config()) {
        Ok(services) => Arc::new(services),
        Err(e) => panic!("test services failed to start: {e}"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wait_until_times_out() {
        let start = Instant::now();
        assert!(!wait_until(Duration::from_millis(20), || false));
        assert!(start.elapsed() >= Duration::from_millis(20));
        assert!(wait_until(Duration::from_millis(20), || true));
    }

    #[test]
    fn full_lap_ends_on_the_line() {
        let lap = full_lap(4, [30_000, 31_000, 32_000]);
        assert_eq!(lap.len(), 4);
        assert_eq!(lap[3].completed_laps, 5);
        assert_eq!(lap[3].last_time_ms, 93_000);
        assert_eq!(lap[2].last_sector_time_ms, 61_000);
    }
}
