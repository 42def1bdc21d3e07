//! Process-scoped telemetry services

use std::sync::Arc;
use tracing::info;

use crate::Result;
use crate::broadcast::{BroadcastClient, BroadcastHub};
use crate::config::StintConfig;
use crate::provider::SnapshotSource;
use crate::timing::LapTimingEngine;
use crate::tracker::Tracker;
use crate::types::{GraphicsSnapshot, PhysicsSnapshot, StaticSnapshot};

/// The trackers, broadcast hub and lap timing engine of one session
///
/// Built once per process and shared with overlays as
/// `Arc<TelemetryServices>`. Every component runs its own thread;
/// [`shutdown`](Self::shutdown) stops them in reverse order of creation.
pub struct TelemetryServices {
    config: StintConfig,
    physics: Tracker<PhysicsSnapshot>,
    graphics: Tracker<GraphicsSnapshot>,
    statics: Tracker<StaticSnapshot>,
    broadcast: BroadcastHub,
    lap_timing: LapTimingEngine,
}

impl TelemetryServices {
    /// Validate `config` and start every component against `source`
    ///
    /// Components started before a failure are shut down again when they are
    /// dropped.
    pub fn start(source: Arc<dyn SnapshotSource>, config: &StintConfig) -> Result<Self> {
        config.validate()?;
        let join_timeout = config.job.join_timeout();

        let physics = Tracker::start_with(Arc::clone(&source), config.physics_hz, join_timeout)?;
        let graphics = Tracker::start_with(Arc::clone(&source), config.graphics_hz, join_timeout)?;
        let statics = Tracker::start_with(source, config.static_hz, join_timeout)?;
        let broadcast = BroadcastHub::new(graphics.topic().clone(), &config.broadcast, join_timeout);
        let lap_timing = LapTimingEngine::spawn(
            graphics.topic().clone(),
            config.lap_timing_hz(),
            config.validity_policy,
            join_timeout,
        )?;

        info!(
            physics_hz = config.physics_hz,
            graphics_hz = config.graphics_hz,
            static_hz = config.static_hz,
            "Telemetry services started"
        );
        Ok(Self { config: config.clone(), physics, graphics, statics, broadcast, lap_timing })
    }

    pub fn config(&self) -> &StintConfig {
        &self.config
    }

    pub fn physics(&self) -> &Tracker<PhysicsSnapshot> {
        &self.physics
    }

    pub fn graphics(&self) -> &Tracker<GraphicsSnapshot> {
        &self.graphics
    }

    pub fn statics(&self) -> &Tracker<StaticSnapshot> {
        &self.statics
    }

    pub fn broadcast(&self) -> &BroadcastHub {
        &self.broadcast
    }

    pub fn lap_timing(&self) -> &LapTimingEngine {
        &self.lap_timing
    }

    /// Attach a broadcast client to the hub
    pub fn connect_broadcast(&self, client: Arc<dyn BroadcastClient>) -> Result<()> {
        self.broadcast.connect(client)
    }

    /// Stop every thread, newest component first
    ///
    /// Returns whether all of them stopped within their join bound.
    pub fn shutdown(&self) -> bool {
        let results = [
            self.lap_timing.shutdown(),
            self.broadcast.shutdown(),
            self.statics.shutdown(),
            self.graphics.shutdown(),
            self.physics.shutdown(),
        ];
        let stopped = results.iter().all(|&ok| ok);
        info!(stopped, "Telemetry services shut down");
        stopped
    }
}

impl Drop for TelemetryServices {
    fn drop(&mut self) {
        self.shutdown();
    }
}

impl std::fmt::Debug for TelemetryServices {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TelemetryServices")
            .field("physics", &self.physics)
            .field("graphics", &self.graphics)
            .field("statics", &self.statics)
            .field("broadcast_connected", &self.broadcast.is_connected())
            .finish()
    }
}
