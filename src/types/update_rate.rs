//! Update rate control for snapshot streams

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Update rate for snapshot streams
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum UpdateRate {
    /// Every published value, at the publisher's cadence
    Native,

    /// Throttled to maximum Hz
    /// If the requested rate exceeds source rate, Native is used
    Max(u32),
}

impl UpdateRate {
    /// Normalize rate against source frequency
    /// Returns effective rate to use
    pub fn normalize(self, source_hz: f64) -> Self {
        match self {
            UpdateRate::Native => UpdateRate::Native,
            UpdateRate::Max(0) => UpdateRate::Native,
            UpdateRate::Max(hz) if hz as f64 >= source_hz => UpdateRate::Native,
            UpdateRate::Max(hz) => UpdateRate::Max(hz),
        }
    }

    /// Get throttle interval if needed
    pub fn throttle_interval(self, source_hz: f64) -> Option<Duration> {
        match self.normalize(source_hz) {
            UpdateRate::Native => None,
            UpdateRate::Max(hz) => Some(Duration::from_secs_f64(1.0 / hz as f64)),
        }
    }
}

/// Interval between ticks of something running at `hz`.
///
/// Returns `None` for 0 Hz.
pub fn interval_for_hz(hz: u32) -> Option<Duration> {
    (hz > 0).then(|| Duration::from_secs_f64(1.0 / hz as f64))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rates_at_or_above_source_are_native() {
        assert_eq!(UpdateRate::Max(100).normalize(100.0), UpdateRate::Native);
        assert_eq!(UpdateRate::Max(200).normalize(100.0), UpdateRate::Native);
        assert_eq!(UpdateRate::Max(0).normalize(100.0), UpdateRate::Native);
        assert_eq!(UpdateRate::Max(30).normalize(100.0), UpdateRate::Max(30));
    }

    #[test]
    fn throttle_interval_only_when_slower_than_source() {
        assert_eq!(UpdateRate::Native.throttle_interval(100.0), None);
        assert_eq!(UpdateRate::Max(10).throttle_interval(100.0), Some(Duration::from_millis(100)));
    }

    #[test]
    fn interval_for_hz_rejects_zero() {
        assert_eq!(interval_for_hz(0), None);
        assert_eq!(interval_for_hz(50), Some(Duration::from_millis(20)));
    }
}
