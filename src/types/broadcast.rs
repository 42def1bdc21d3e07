//! Values published by the broadcast hub.
//!
//! These mirror the events of the simulator's UDP broadcasting client. Every
//! type has a `Default` that represents "no data", which is what consumers see
//! after a disconnect.

use serde::{Deserialize, Serialize};

/// Result of the broadcast client's registration handshake.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConnectionState {
    pub connection_id: i32,
    pub connection_success: bool,
    pub is_readonly: bool,
    pub error: String,
}

/// Session-wide realtime state.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RealtimeUpdate {
    pub event_index: u16,
    pub session_index: u16,
    pub phase: u8,
    pub session_time_ms: f64,
    pub session_end_time_ms: f64,
    pub focused_car_index: i32,
    pub ambient_temp: u8,
    pub track_temp: u8,
    pub is_replay_playing: bool,
}

/// One entry of the entry list.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CarInfo {
    pub car_index: u16,
    pub car_model_type: u8,
    pub team_name: String,
    pub race_number: i32,
    pub current_driver_index: u8,
    pub drivers: Vec<String>,
}

/// Track metadata.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrackData {
    pub track_name: String,
    pub track_id: i32,
    pub track_meters: i32,
}

/// Kind of a broadcasting event.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum BroadcastingEventKind {
    #[default]
    None,
    GreenFlag,
    SessionOver,
    PenaltyCommMsg,
    Accident,
    LapCompleted,
    BestSessionLap,
    BestPersonalLap,
}

/// A discrete session event (penalty, accident, best lap, ...).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BroadcastingEvent {
    pub kind: BroadcastingEventKind,
    pub message: String,
    pub time_ms: i32,
    pub car_id: i32,
}

/// Per-car realtime state.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RealtimeCarUpdate {
    pub car_index: u16,
    pub driver_index: u16,
    pub gear: i8,
    pub world_pos_x: f32,
    pub world_pos_y: f32,
    pub yaw: f32,
    pub kmh: u16,
    pub position: u16,
    pub track_position: u16,
    pub spline_position: f32,
    pub laps: u16,
    pub delta_ms: i32,
    pub last_lap_ms: i32,
    pub current_lap_ms: i32,
}
