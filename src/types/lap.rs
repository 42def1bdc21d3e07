//! Lap timing records produced by the lap timing engine.

use serde::{Deserialize, Serialize};

/// Value used for lap fields that have not been captured yet.
pub const UNSET: i32 = -1;

/// One lap's accumulated timing.
///
/// Owned by the lap accumulator while the lap is in progress; once finished it
/// is copied into history and handed to subscribers by value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct LapTimingData {
    /// Zero based lap index, [`UNSET`] until known
    pub index: i32,
    /// Total lap time in ms, [`UNSET`] until the lap is finished
    pub time_ms: i32,
    pub is_valid: bool,
    pub sector1_ms: i32,
    pub sector2_ms: i32,
    pub sector3_ms: i32,
}

impl Default for LapTimingData {
    fn default() -> Self {
        Self {
            index: UNSET,
            time_ms: UNSET,
            is_valid: true,
            sector1_ms: UNSET,
            sector2_ms: UNSET,
            sector3_ms: UNSET,
        }
    }
}

impl LapTimingData {
    /// Fresh accumulator for the lap with the given index.
    pub fn starting(index: i32) -> Self {
        Self { index, ..Self::default() }
    }

    /// Whether sector 1 was captured, i.e. the lap was observed from its start.
    pub fn has_sector1(&self) -> bool {
        self.sector1_ms != UNSET
    }

    /// Sector times, `None` for sectors not captured.
    pub fn sectors(&self) -> [Option<i32>; 3] {
        [self.sector1_ms, self.sector2_ms, self.sector3_ms].map(|s| (s != UNSET).then_some(s))
    }
}
