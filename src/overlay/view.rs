//! Latest telemetry values as seen by one overlay

use parking_lot::RwLock;
use std::sync::Arc;

use crate::types::{
    GraphicsSnapshot, LapTimingData, PhysicsSnapshot, RealtimeCarUpdate, RealtimeUpdate,
    StaticSnapshot, TrackData,
};

/// One atomically replaced value
#[derive(Debug)]
struct Slot<T>(RwLock<Option<Arc<T>>>);

impl<T> Default for Slot<T> {
    fn default() -> Self {
        Self(RwLock::new(None))
    }
}

impl<T> Slot<T> {
    fn get(&self) -> Option<Arc<T>> {
        self.0.read().clone()
    }

    fn set(&self, value: Option<Arc<T>>) {
        *self.0.write() = value;
    }

    /// Store `value` only if nothing was stored since the last clear
    fn fill(&self, value: Option<Arc<T>>) {
        let mut slot = self.0.write();
        if slot.is_none() {
            *slot = value;
        }
    }
}

/// The values an overlay renders from
///
/// Subscription callbacks swap whole `Arc`s in, so the redraw thread always
/// sees a complete value or the previous one. Slots stay `None` until their
/// feed has published.
#[derive(Debug, Default)]
pub struct TelemetryView {
    physics: Slot<PhysicsSnapshot>,
    graphics: Slot<GraphicsSnapshot>,
    statics: Slot<StaticSnapshot>,
    realtime_update: Slot<RealtimeUpdate>,
    track_data: Slot<TrackData>,
    local_car: Slot<RealtimeCarUpdate>,
    last_lap: Slot<LapTimingData>,
}

impl TelemetryView {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn physics(&self) -> Option<Arc<PhysicsSnapshot>> {
        self.physics.get()
    }

    pub fn graphics(&self) -> Option<Arc<GraphicsSnapshot>> {
        self.graphics.get()
    }

    pub fn statics(&self) -> Option<Arc<StaticSnapshot>> {
        self.statics.get()
    }

    pub fn realtime_update(&self) -> Option<Arc<RealtimeUpdate>> {
        self.realtime_update.get()
    }

    pub fn track_data(&self) -> Option<Arc<TrackData>> {
        self.track_data.get()
    }

    /// Latest broadcast update for the player's own car
    pub fn local_car(&self) -> Option<Arc<RealtimeCarUpdate>> {
        self.local_car.get()
    }

    /// Most recently finished lap
    pub fn last_lap(&self) -> Option<Arc<LapTimingData>> {
        self.last_lap.get()
    }

    pub fn set_physics(&self, value: Option<Arc<PhysicsSnapshot>>) {
        self.physics.set(value);
    }

    pub fn set_graphics(&self, value: Option<Arc<GraphicsSnapshot>>) {
        self.graphics.set(value);
    }

    pub fn set_statics(&self, value: Option<Arc<StaticSnapshot>>) {
        self.statics.set(value);
    }

    pub fn set_realtime_update(&self, value: Option<Arc<RealtimeUpdate>>) {
        self.realtime_update.set(value);
    }

    pub fn set_track_data(&self, value: Option<Arc<TrackData>>) {
        self.track_data.set(value);
    }

    pub fn set_local_car(&self, value: Option<Arc<RealtimeCarUpdate>>) {
        self.local_car.set(value);
    }

    pub fn set_last_lap(&self, value: Option<Arc<LapTimingData>>) {
        self.last_lap.set(value);
    }

    /// Empty every slot
    pub(super) fn clear(&self) {
        self.physics.set(None);
        self.graphics.set(None);
        self.statics.set(None);
        self.realtime_update.set(None);
        self.track_data.set(None);
        self.local_car.set(None);
        self.last_lap.set(None);
    }

    // Initial values; a value a subscription delivered first is never replaced

    pub(super) fn fill_physics(&self, value: Option<Arc<PhysicsSnapshot>>) {
        self.physics.fill(value);
    }

    pub(super) fn fill_graphics(&self, value: Option<Arc<GraphicsSnapshot>>) {
        self.graphics.fill(value);
    }

    pub(super) fn fill_statics(&self, value: Option<Arc<StaticSnapshot>>) {
        self.statics.fill(value);
    }

    pub(super) fn fill_realtime_update(&self, value: Option<Arc<RealtimeUpdate>>) {
        self.realtime_update.fill(value);
    }

    pub(super) fn fill_track_data(&self, value: Option<Arc<TrackData>>) {
        self.track_data.fill(value);
    }

    pub(super) fn fill_local_car(&self, value: Option<Arc<RealtimeCarUpdate>>) {
        self.local_car.fill(value);
    }

    pub(super) fn fill_last_lap(&self, value: Option<Arc<LapTimingData>>) {
        self.last_lap.fill(value);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn slots_start_empty_and_swap_whole_values() {
        let view = TelemetryView::new();
        assert!(view.physics().is_none());
        assert!(view.last_lap().is_none());

        let first = Arc::new(PhysicsSnapshot { rpm: 4000, ..Default::default() });
        view.set_physics(Some(Arc::clone(&first)));
        let held = view.physics().unwrap();

        view.set_physics(Some(Arc::new(PhysicsSnapshot { rpm: 7000, ..Default::default() })));
        assert_eq!(held.rpm, 4000);
        assert_eq!(view.physics().unwrap().rpm, 7000);

        view.set_physics(None);
        assert!(view.physics().is_none());
    }

    #[test]
    fn fill_never_replaces_a_delivered_value() {
        let view = TelemetryView::new();
        view.set_track_data(Some(Arc::new(TrackData { track_name: "spa".into(), ..Default::default() })));
        view.fill_track_data(Some(Arc::new(TrackData { track_name: "stale".into(), ..Default::default() })));
        assert_eq!(view.track_data().unwrap().track_name, "spa");

        view.clear();
        assert!(view.track_data().is_none());
        view.fill_track_data(Some(Arc::new(TrackData::default())));
        assert_eq!(*view.track_data().unwrap(), TrackData::default());
    }
}
