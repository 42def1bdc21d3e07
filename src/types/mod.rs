//! Core value types flowing through the telemetry pipeline.
//!
//! Every type here is an immutable whole-value record: pollers build a new
//! value on each tick and publish it wholesale, so readers always observe a
//! complete snapshot or the previous one.
//!
//! - [`PhysicsSnapshot`], [`GraphicsSnapshot`] and [`StaticSnapshot`] mirror the
//!   simulator's three shared memory pages
//! - [`LapTimingData`] is the record emitted when a lap finishes
//! - The broadcast types mirror the UDP broadcasting client's events
//! - [`UpdateRate`] controls throttled stream subscriptions
//!
//! ## Usage Example
//!
//! ```rust
//! use stint::types::{GraphicsSnapshot, LapTimingData, LAP_TIME_SENTINEL};
//!
//! let graphics = GraphicsSnapshot { last_time_ms: LAP_TIME_SENTINEL, ..Default::default() };
//! assert!(!graphics.has_last_lap_time());
//!
//! let lap = LapTimingData::starting(3);
//! assert_eq!(lap.sectors(), [None, None, None]);
//! ```

mod broadcast;
mod lap;
mod snapshot;
mod update_rate;

pub use broadcast::{
    BroadcastingEvent, BroadcastingEventKind, CarInfo, ConnectionState, RealtimeCarUpdate,
    RealtimeUpdate, TrackData,
};
pub use lap::{LapTimingData, UNSET};
pub use snapshot::{
    GraphicsSnapshot, LAP_TIME_SENTINEL, PhysicsSnapshot, SnapshotKind, StaticSnapshot,
};
pub use update_rate::{UpdateRate, interval_for_hz};
