//! Lap and sector accumulation state machine

use serde::{Deserialize, Serialize};
use tracing::{debug, trace};

use crate::types::{GraphicsSnapshot, LapTimingData, UNSET};

/// How the lap's validity follows the simulator's valid-lap flag
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ValidityPolicy {
    /// Once invalidated, a lap stays invalid until it finishes
    #[default]
    Sticky,

    /// The lap's validity mirrors every change of the flag
    Mirror,
}

/// Accumulates sector and lap times from successive graphics snapshots
///
/// The first observed snapshot only synchronises the sector and lap index;
/// attribution starts with the next sector change. A lap is emitted only when
/// its first sector was captured, so a lap joined midway is dropped silently.
#[derive(Debug, Clone)]
pub struct LapAccumulator {
    policy: ValidityPolicy,
    synced: bool,
    sector: i32,
    last_valid_flag: bool,
    current: LapTimingData,
}

impl Default for LapAccumulator {
    fn default() -> Self {
        Self::new(ValidityPolicy::default())
    }
}

impl LapAccumulator {
    pub fn new(policy: ValidityPolicy) -> Self {
        Self { policy, synced: false, sector: 0, last_valid_flag: true, current: LapTimingData::default() }
    }

    pub fn policy(&self) -> ValidityPolicy {
        self.policy
    }

    /// The lap in progress
    pub fn current(&self) -> LapTimingData {
        self.current
    }

    /// Forget all state; the next snapshot synchronises again
    pub fn reset(&mut self) {
        *self = Self::new(self.policy);
    }

    /// Feed one snapshot, returning the lap it finished, if any
    pub fn observe(&mut self, graphics: &GraphicsSnapshot) -> Option<LapTimingData> {
        if !self.synced {
            self.sync(graphics);
            return None;
        }

        // Session restart
        if graphics.completed_laps < self.current.index {
            debug!(
                completed = graphics.completed_laps,
                expected = self.current.index,
                "Lap count went backwards, resynchronising"
            );
            self.sync(graphics);
            return None;
        }

        self.track_validity(graphics.is_valid_lap);

        if graphics.current_sector_index != self.sector {
            self.attribute_sector(graphics);
            self.sector = graphics.current_sector_index;
        }

        if graphics.completed_laps > self.current.index && graphics.has_last_lap_time() {
            return self.finish_lap(graphics);
        }
        None
    }

    fn sync(&mut self, graphics: &GraphicsSnapshot) {
        self.synced = true;
        self.sector = graphics.current_sector_index;
        self.last_valid_flag = graphics.is_valid_lap;
        self.current = LapTimingData { is_valid: graphics.is_valid_lap, ..LapTimingData::starting(graphics.completed_laps) };
        trace!(lap = self.current.index, sector = self.sector, "Lap timing synchronised");
    }

    fn track_validity(&mut self, flag: bool) {
        if flag == self.last_valid_flag {
            return;
        }
        self.last_valid_flag = flag;

        match (self.policy, flag) {
            (_, false) => {
                if self.current.is_valid {
                    debug!(lap = self.current.index, "Lap invalidated");
                }
                self.current.is_valid = false;
            }
            (ValidityPolicy::Mirror, true) => self.current.is_valid = true,
            (ValidityPolicy::Sticky, true) => {}
        }
    }

    fn attribute_sector(&mut self, graphics: &GraphicsSnapshot) {
        let next = graphics.current_sector_index;
        let lap = &mut self.current;

        if !lap.has_sector1() && next != 1 {
            trace!(lap = lap.index, from = self.sector, to = next, "Sector 1 missing, skipping attribution");
            return;
        }

        match next {
            1 => lap.sector1_ms = graphics.last_sector_time_ms,
            2 => lap.sector2_ms = graphics.last_sector_time_ms.saturating_sub(lap.sector1_ms),
            0 if lap.sector2_ms != UNSET => {
                lap.sector3_ms = graphics.last_time_ms.saturating_sub(lap.sector1_ms).saturating_sub(lap.sector2_ms);
            }
            _ => {}
        }
        trace!(lap = lap.index, sector = next, sectors = ?lap.sectors(), "Sector boundary");
    }

    fn finish_lap(&mut self, graphics: &GraphicsSnapshot) -> Option<LapTimingData> {
        let mut lap = self.current;
        lap.time_ms = graphics.last_time_ms;
        lap.index = graphics.completed_laps - 1;

        // The lap time can land a tick after the sector wraps
        if lap.sector1_ms != UNSET && lap.sector2_ms != UNSET {
            lap.sector3_ms = lap.time_ms.saturating_sub(lap.sector1_ms).saturating_sub(lap.sector2_ms);
        }

        // A flag still low across the line invalidates the new lap on the next snapshot
        self.current = LapTimingData::starting(graphics.completed_laps);
        self.last_valid_flag = true;

        if lap.has_sector1() {
            debug!(lap = lap.index, time_ms = lap.time_ms, valid = lap.is_valid, "Lap finished");
            Some(lap)
        } else {
            debug!(lap = lap.index, time_ms = lap.time_ms, "Partial lap discarded");
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::LAP_TIME_SENTINEL;
    use proptest::prelude::*;

    fn snap(completed_laps: i32, sector: i32, last_sector_time_ms: i32, last_time_ms: i32) -> GraphicsSnapshot {
        GraphicsSnapshot {
            completed_laps,
            current_sector_index: sector,
            last_sector_time_ms,
            last_time_ms,
            is_valid_lap: true,
            ..Default::default()
        }
    }

    fn feed(acc: &mut LapAccumulator, snapshots: &[GraphicsSnapshot]) -> Vec<LapTimingData> {
        snapshots.iter().filter_map(|g| acc.observe(g)).collect()
    }

    #[test]
    fn full_lap_produces_exact_sectors() {
        let mut acc = LapAccumulator::default();
        let laps = feed(
            &mut acc,
            &[
                snap(0, 0, 0, LAP_TIME_SENTINEL),
                snap(0, 1, 10_000, LAP_TIME_SENTINEL),
                snap(0, 2, 21_000, LAP_TIME_SENTINEL),
                snap(1, 0, 21_000, 32_500),
            ],
        );

        assert_eq!(
            laps,
            vec![LapTimingData {
                index: 0,
                time_ms: 32_500,
                is_valid: true,
                sector1_ms: 10_000,
                sector2_ms: 11_000,
                sector3_ms: 11_500,
            }]
        );
        assert_eq!(acc.current(), LapTimingData::starting(1));
    }

    #[test]
    fn mid_lap_attach_skips_partial_lap_only() {
        let mut acc = LapAccumulator::default();
        let laps = feed(
            &mut acc,
            &[
                snap(3, 1, 30_000, 90_000),
                snap(3, 2, 61_000, 90_000),
                snap(4, 0, 61_000, 91_000),
                snap(4, 1, 29_000, 91_000),
                snap(4, 2, 59_000, 91_000),
                snap(5, 0, 59_000, 89_500),
            ],
        );

        assert_eq!(laps.len(), 1);
        assert_eq!(laps[0].index, 4);
        assert_eq!(laps[0].sectors(), [Some(29_000), Some(30_000), Some(30_500)]);
    }

    #[test]
    fn sentinel_lap_time_holds_completion() {
        let mut acc = LapAccumulator::default();
        feed(&mut acc, &[snap(0, 0, 0, LAP_TIME_SENTINEL), snap(0, 1, 10_000, LAP_TIME_SENTINEL)]);
        feed(&mut acc, &[snap(0, 2, 20_000, LAP_TIME_SENTINEL)]);

        assert_eq!(acc.observe(&snap(1, 0, 20_000, LAP_TIME_SENTINEL)), None);
        assert_eq!(acc.observe(&snap(1, 0, 20_000, 0)), None);

        let lap = acc.observe(&snap(1, 0, 20_000, 30_000)).unwrap();
        assert_eq!(lap.time_ms, 30_000);
        assert_eq!(lap.sector3_ms, 10_000);
    }

    #[test]
    fn late_lap_time_corrects_sector3() {
        let mut acc = LapAccumulator::default();
        feed(
            &mut acc,
            &[
                snap(1, 0, 0, 40_000),
                snap(1, 1, 10_000, 40_000),
                snap(1, 2, 21_000, 40_000),
                // Sector wraps one tick before the lap count and time update
                snap(1, 0, 21_000, 40_000),
            ],
        );
        let lap = acc.observe(&snap(2, 0, 21_000, 32_500)).unwrap();
        assert_eq!(lap.sector3_ms, 11_500);
    }

    #[test]
    fn sticky_policy_keeps_lap_invalid() {
        let mut acc = LapAccumulator::new(ValidityPolicy::Sticky);
        let mut invalid = snap(0, 1, 10_000, LAP_TIME_SENTINEL);
        invalid.is_valid_lap = false;

        acc.observe(&snap(0, 0, 0, LAP_TIME_SENTINEL));
        acc.observe(&invalid);
        acc.observe(&snap(0, 1, 10_000, LAP_TIME_SENTINEL));
        assert!(!acc.current().is_valid);

        acc.observe(&snap(0, 2, 20_000, LAP_TIME_SENTINEL));
        let lap = acc.observe(&snap(1, 0, 20_000, 30_000)).unwrap();
        assert!(!lap.is_valid);
        assert!(acc.current().is_valid, "next lap starts valid");
    }

    #[test]
    fn flag_low_across_the_line_invalidates_the_next_lap() {
        let mut acc = LapAccumulator::new(ValidityPolicy::Sticky);
        let cut = |mut g: GraphicsSnapshot| {
            g.is_valid_lap = false;
            g
        };
        let laps = feed(
            &mut acc,
            &[
                snap(0, 0, 0, LAP_TIME_SENTINEL),
                snap(0, 1, 10_000, LAP_TIME_SENTINEL),
                cut(snap(0, 2, 21_000, LAP_TIME_SENTINEL)),
                cut(snap(1, 0, 21_000, 32_500)),
                cut(snap(1, 1, 10_200, 32_500)),
                cut(snap(1, 2, 21_400, 32_500)),
                cut(snap(2, 0, 21_400, 33_000)),
            ],
        );

        let validity: Vec<_> = laps.iter().map(|lap| (lap.index, lap.is_valid)).collect();
        assert_eq!(validity, vec![(0, false), (1, false)]);
    }

    #[test]
    fn next_lap_recovers_when_the_flag_clears_after_the_line() {
        let mut acc = LapAccumulator::new(ValidityPolicy::Mirror);
        let mut crossing = snap(1, 0, 21_000, 32_500);
        crossing.is_valid_lap = false;
        let mut cut = snap(0, 2, 21_000, LAP_TIME_SENTINEL);
        cut.is_valid_lap = false;

        feed(&mut acc, &[snap(0, 0, 0, LAP_TIME_SENTINEL), snap(0, 1, 10_000, LAP_TIME_SENTINEL), cut]);
        assert!(!acc.observe(&crossing).unwrap().is_valid);

        let mut still_low = snap(1, 0, 21_000, 32_500);
        still_low.is_valid_lap = false;
        acc.observe(&still_low);
        assert!(!acc.current().is_valid);

        acc.observe(&snap(1, 1, 10_100, 32_500));
        assert!(acc.current().is_valid);
    }

    #[test]
    fn mirror_policy_follows_the_flag() {
        let mut acc = LapAccumulator::new(ValidityPolicy::Mirror);
        let mut invalid = snap(0, 1, 10_000, LAP_TIME_SENTINEL);
        invalid.is_valid_lap = false;

        acc.observe(&snap(0, 0, 0, LAP_TIME_SENTINEL));
        acc.observe(&invalid);
        assert!(!acc.current().is_valid);
        acc.observe(&snap(0, 1, 10_000, LAP_TIME_SENTINEL));
        assert!(acc.current().is_valid);
    }

    #[test]
    fn lap_count_going_backwards_resynchronises() {
        let mut acc = LapAccumulator::default();
        feed(&mut acc, &[snap(5, 0, 0, 90_000), snap(5, 1, 30_000, 90_000)]);
        assert!(acc.current().has_sector1());

        assert_eq!(acc.observe(&snap(0, 0, 0, LAP_TIME_SENTINEL)), None);
        assert_eq!(acc.current(), LapTimingData::starting(0));
    }

    proptest! {
        #[test]
        fn sectors_always_sum_to_lap_time(
            s1 in 1i32..200_000,
            s2 in 1i32..200_000,
            s3 in 1i32..200_000,
            completed in 0i32..500,
        ) {
            let mut acc = LapAccumulator::default();
            let laps = feed(&mut acc, &[
                snap(completed, 0, 0, LAP_TIME_SENTINEL),
                snap(completed, 1, s1, LAP_TIME_SENTINEL),
                snap(completed, 2, s1 + s2, LAP_TIME_SENTINEL),
                snap(completed + 1, 0, s1 + s2, s1 + s2 + s3),
            ]);

            prop_assert_eq!(laps.len(), 1);
            let lap = laps[0];
            prop_assert_eq!(lap.index, completed);
            prop_assert_eq!(lap.sectors(), [Some(s1), Some(s2), Some(s3)]);
            prop_assert_eq!(lap.time_ms, s1 + s2 + s3);
        }

        #[test]
        fn attaching_in_a_later_sector_never_emits_that_lap(first_sector in 1i32..3, completed in 0i32..50) {
            let mut acc = LapAccumulator::default();
            let laps = feed(&mut acc, &[
                snap(completed, first_sector, 12_000, LAP_TIME_SENTINEL),
                snap(completed, 2, 24_000, LAP_TIME_SENTINEL),
                snap(completed + 1, 0, 24_000, 36_000),
            ]);
            prop_assert!(laps.is_empty());
        }
    }
}
