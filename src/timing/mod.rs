//! Lap and sector timing derived from graphics snapshots.
//!
//! [`LapAccumulator`] is the pure state machine; [`LapTimingEngine`] runs it
//! against the graphics topic and publishes each finished lap.
//!
//! Sector times are attributed when the sector index changes:
//!
//! | new index | captured value                                   |
//! |-----------|--------------------------------------------------|
//! | 1         | sector 1 = last sector time                      |
//! | 2         | sector 2 = last sector time - sector 1           |
//! | 0         | sector 3 = last lap time - sector 1 - sector 2   |
//!
//! ```rust
//! use stint::timing::{LapTimingEngine, ValidityPolicy};
//! use stint::types::{GraphicsSnapshot, LAP_TIME_SENTINEL};
//!
//! let engine = LapTimingEngine::new(ValidityPolicy::Sticky);
//! let at = |laps, sector, split, last| GraphicsSnapshot {
//!     completed_laps: laps,
//!     current_sector_index: sector,
//!     last_sector_time_ms: split,
//!     last_time_ms: last,
//!     is_valid_lap: true,
//!     ..Default::default()
//! };
//!
//! engine.feed(&at(0, 0, 0, LAP_TIME_SENTINEL));
//! engine.feed(&at(0, 1, 10_000, LAP_TIME_SENTINEL));
//! engine.feed(&at(0, 2, 21_000, LAP_TIME_SENTINEL));
//! let lap = engine.feed(&at(1, 0, 21_000, 32_500)).unwrap();
//! assert_eq!(lap.sectors(), [Some(10_000), Some(11_000), Some(11_500)]);
//! ```

mod accumulator;
mod engine;

pub use accumulator::{LapAccumulator, ValidityPolicy};
pub use engine::LapTimingEngine;
