//! Snapshot records captured from the simulator's shared memory pages.

use serde::{Deserialize, Serialize};

/// Sentinel the simulator reports for lap times that do not exist yet.
pub const LAP_TIME_SENTINEL: i32 = i32::MAX;

/// Which shared memory page a snapshot was read from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SnapshotKind {
    Physics,
    Graphics,
    Static,
}

impl SnapshotKind {
    /// Short name used in logs, thread names and errors.
    pub fn as_str(self) -> &'static str {
        match self {
            SnapshotKind::Physics => "physics",
            SnapshotKind::Graphics => "graphics",
            SnapshotKind::Static => "static",
        }
    }
}

/// High rate car physics, captured at one poll tick.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PhysicsSnapshot {
    /// Simulator-side update counter
    pub packet_id: i32,
    /// Throttle pedal (0..1)
    pub gas: f32,
    /// Brake pedal (0..1)
    pub brake: f32,
    /// Clutch pedal (0..1)
    pub clutch: f32,
    /// Raw gear index (0 = reverse, 1 = neutral, 2 = first)
    pub gear: i32,
    pub rpm: i32,
    pub steer_angle: f32,
    pub speed_kmh: f32,
    /// Acceleration in g: lateral, vertical, longitudinal
    pub acc_g: [f32; 3],
    /// Core tyre temperatures (FL, FR, RL, RR) in °C
    pub tyre_core_temp: [f32; 4],
    /// Tyre pressures (FL, FR, RL, RR) in psi
    pub tyre_pressure: [f32; 4],
    /// Brake disc temperatures (FL, FR, RL, RR) in °C
    pub brake_temp: [f32; 4],
    pub pit_limiter_on: bool,
    /// Traction control activation (0..1)
    pub tc: f32,
    /// ABS activation (0..1)
    pub abs: f32,
}

impl PhysicsSnapshot {
    /// Lateral acceleration in g.
    pub fn lateral_g(&self) -> f32 {
        self.acc_g[0]
    }

    /// Longitudinal acceleration in g.
    pub fn longitudinal_g(&self) -> f32 {
        self.acc_g[2]
    }
}

/// Session and timing state, captured at one poll tick.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GraphicsSnapshot {
    pub packet_id: i32,
    /// Simulator status (0 = off, 1 = replay, 2 = live, 3 = pause)
    pub status: i32,
    pub completed_laps: i32,
    pub current_time_ms: i32,
    /// Last completed lap time, [`LAP_TIME_SENTINEL`] if none
    pub last_time_ms: i32,
    pub best_time_ms: i32,
    /// Zero based index of the sector the car is in
    pub current_sector_index: i32,
    /// Cumulative lap time at the last sector boundary
    pub last_sector_time_ms: i32,
    pub is_in_pit: bool,
    pub is_valid_lap: bool,
    pub player_car_id: i32,
    pub tc_level: i32,
    pub abs_level: i32,
}

impl GraphicsSnapshot {
    /// Whether `last_time_ms` holds a real lap time rather than a sentinel.
    pub fn has_last_lap_time(&self) -> bool {
        self.last_time_ms > 0 && self.last_time_ms != LAP_TIME_SENTINEL
    }
}

/// Session constants that only change when the car or track changes.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StaticSnapshot {
    pub car_model: String,
    pub track: String,
    pub max_rpm: i32,
    pub sector_count: i32,
}
