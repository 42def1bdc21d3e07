//! `#[repr(C)]` prefixes of the simulator's shared memory pages
//!
//! Only the leading fields the crate reads are declared. Every page is written
//! by the simulator with 4-byte packing; the field order below must not change.

use crate::types::{GraphicsSnapshot, PhysicsSnapshot, StaticSnapshot};

/// Physics page prefix, up to and including the clutch pedal
#[repr(C)]
#[derive(Debug, Clone, Copy)]
pub struct PhysicsPage {
    pub packet_id: i32,
    pub gas: f32,
    pub brake: f32,
    pub fuel: f32,
    pub gear: i32,
    pub rpms: i32,
    pub steer_angle: f32,
    pub speed_kmh: f32,
    pub velocity: [f32; 3],
    pub acc_g: [f32; 3],
    pub wheel_slip: [f32; 4],
    pub wheel_load: [f32; 4],
    pub wheels_pressure: [f32; 4],
    pub wheel_angular_speed: [f32; 4],
    pub tyre_wear: [f32; 4],
    pub tyre_dirty_level: [f32; 4],
    pub tyre_core_temperature: [f32; 4],
    pub camber_rad: [f32; 4],
    pub suspension_travel: [f32; 4],
    pub drs: f32,
    pub tc: f32,
    pub heading: f32,
    pub pitch: f32,
    pub roll: f32,
    pub cg_height: f32,
    pub car_damage: [f32; 5],
    pub number_of_tyres_out: i32,
    pub pit_limiter_on: i32,
    pub abs: f32,
    pub kers_charge: f32,
    pub kers_input: f32,
    pub auto_shifter_on: i32,
    pub ride_height: [f32; 2],
    pub turbo_boost: f32,
    pub ballast: f32,
    pub air_density: f32,
    pub air_temp: f32,
    pub road_temp: f32,
    pub local_angular_vel: [f32; 3],
    pub final_ff: f32,
    pub performance_meter: f32,
    pub engine_brake: i32,
    pub ers_recovery_level: i32,
    pub ers_power_level: i32,
    pub ers_heat_charging: i32,
    pub ers_is_charging: i32,
    pub kers_current_kj: f32,
    pub drs_available: i32,
    pub drs_enabled: i32,
    pub brake_temp: [f32; 4],
    pub clutch: f32,
}

impl From<&PhysicsPage> for PhysicsSnapshot {
    fn from(page: &PhysicsPage) -> Self {
        Self {
            packet_id: page.packet_id,
            gas: page.gas,
            brake: page.brake,
            clutch: page.clutch,
            gear: page.gear,
            rpm: page.rpms,
            steer_angle: page.steer_angle,
            speed_kmh: page.speed_kmh,
            acc_g: page.acc_g,
            tyre_core_temp: page.tyre_core_temperature,
            tyre_pressure: page.wheels_pressure,
            brake_temp: page.brake_temp,
            pit_limiter_on: page.pit_limiter_on != 0,
            tc: page.tc,
            abs: page.abs,
        }
    }
}

/// Graphics page prefix, up to and including the valid lap flag
#[repr(C)]
#[derive(Debug, Clone, Copy)]
pub struct GraphicsPage {
    pub packet_id: i32,
    pub status: i32,
    pub session: i32,
    pub current_time: [u16; 15],
    pub last_time: [u16; 15],
    pub best_time: [u16; 15],
    pub split: [u16; 15],
    pub completed_laps: i32,
    pub position: i32,
    pub i_current_time: i32,
    pub i_last_time: i32,
    pub i_best_time: i32,
    pub session_time_left: f32,
    pub distance_traveled: f32,
    pub is_in_pit: i32,
    pub current_sector_index: i32,
    pub last_sector_time: i32,
    pub number_of_laps: i32,
    pub tyre_compound: [u16; 33],
    pub replay_time_multiplier: f32,
    pub normalized_car_position: f32,
    pub active_cars: i32,
    pub car_coordinates: [[f32; 3]; 60],
    pub car_id: [i32; 60],
    pub player_car_id: i32,
    pub penalty_time: f32,
    pub flag: i32,
    pub penalty: i32,
    pub ideal_line_on: i32,
    pub is_in_pit_lane: i32,
    pub surface_grip: f32,
    pub mandatory_pit_done: i32,
    pub wind_speed: f32,
    pub wind_direction: f32,
    pub is_setup_menu_visible: i32,
    pub main_display_index: i32,
    pub secondary_display_index: i32,
    pub tc: i32,
    pub tc_cut: i32,
    pub engine_map: i32,
    pub abs: i32,
    pub fuel_x_lap: f32,
    pub rain_lights: i32,
    pub flashing_lights: i32,
    pub lights_stage: i32,
    pub exhaust_temperature: f32,
    pub wiper_lv: i32,
    pub driver_stint_total_time_left: i32,
    pub driver_stint_time_left: i32,
    pub rain_tyres: i32,
    pub session_index: i32,
    pub used_fuel: f32,
    pub delta_lap_time: [u16; 15],
    pub i_delta_lap_time: i32,
    pub estimated_lap_time: [u16; 15],
    pub i_estimated_lap_time: i32,
    pub is_delta_positive: i32,
    pub i_split: i32,
    pub is_valid_lap: i32,
}

impl From<&GraphicsPage> for GraphicsSnapshot {
    fn from(page: &GraphicsPage) -> Self {
        Self {
            packet_id: page.packet_id,
            status: page.status,
            completed_laps: page.completed_laps,
            current_time_ms: page.i_current_time,
            last_time_ms: page.i_last_time,
            best_time_ms: page.i_best_time,
            current_sector_index: page.current_sector_index,
            last_sector_time_ms: page.last_sector_time,
            is_in_pit: page.is_in_pit != 0,
            is_valid_lap: page.is_valid_lap != 0,
            player_car_id: page.player_car_id,
            tc_level: page.tc,
            abs_level: page.abs,
        }
    }
}

/// Static page prefix, up to and including max RPM
#[repr(C)]
#[derive(Debug, Clone, Copy)]
pub struct StaticPage {
    pub sm_version: [u16; 15],
    pub ac_version: [u16; 15],
    pub number_of_sessions: i32,
    pub num_cars: i32,
    pub car_model: [u16; 33],
    pub track: [u16; 33],
    pub player_name: [u16; 33],
    pub player_surname: [u16; 33],
    pub player_nick: [u16; 33],
    pub sector_count: i32,
    pub max_torque: f32,
    pub max_power: f32,
    pub max_rpm: i32,
}

impl From<&StaticPage> for StaticSnapshot {
    fn from(page: &StaticPage) -> Self {
        Self {
            car_model: decode_wide(&page.car_model),
            track: decode_wide(&page.track),
            max_rpm: page.max_rpm,
            sector_count: page.sector_count,
        }
    }
}

/// Decode a fixed-size, NUL-padded UTF-16 field
pub fn decode_wide(raw: &[u16]) -> String {
    let end = raw.iter().position(|&c| c == 0).unwrap_or(raw.len());
    String::from_utf16_lossy(&raw[..end])
}
