//! Overlay lifecycle: binding a consumer's visible lifetime to telemetry.
//!
//! An [`Overlay`] is the consumer: it declares which feeds it needs, its size
//! and configuration schema, and renders from a [`TelemetryView`]. The
//! [`OverlayHost`] owns it and does the rest:
//!
//! - `start` subscribes to every declared feed, performs one synchronous read
//!   so the view is populated before the first redraw, runs the
//!   `before_start` hook, applies the configured scale and launches the redraw
//!   loop on a [`PeriodicJob`](crate::job::PeriodicJob)
//! - `stop` drops every subscription it made, runs `before_stop`, persists
//!   position and configuration, and halts the redraw loop
//!
//! Hook errors and panics are logged at the host boundary and never
//! propagate, so one broken overlay cannot take others down.
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use stint::overlay::{Feeds, MemorySettingsStore, Overlay, OverlayHost, Size, TelemetryView};
//! use stint::providers::ScriptedSource;
//! use stint::{Stint, StintConfig};
//!
//! struct Speed;
//!
//! impl Overlay for Speed {
//!     fn name(&self) -> &str { "Speed" }
//!     fn size(&self) -> Size { Size::new(120, 40) }
//!     fn feeds(&self) -> Feeds { Feeds { physics: true, ..Feeds::NONE } }
//!     fn render(&mut self, view: &TelemetryView) -> anyhow::Result<()> {
//!         if let Some(physics) = view.physics() {
//!             println!("{:.0} km/h", physics.speed_kmh);
//!         }
//!         Ok(())
//!     }
//! }
//!
//! let services = Stint::start(Arc::new(ScriptedSource::new()), &StintConfig::default())?;
//! let host = OverlayHost::new(Speed, services, Arc::new(MemorySettingsStore::new()))?;
//! host.start()?;
//! host.stop();
//! # Ok::<(), stint::StintError>(())
//! ```

mod config;
mod host;
mod settings;
mod view;

pub use config::{
    ConfigField, ConfigSchema, ConfigValue, FieldKind, MAX_SCALE, MIN_SCALE, OverlayConfig, REFRESH_RATE_KEY,
    SCALE_KEY,
};
pub use host::{LivenessToken, OverlayHost};
pub use settings::{MemorySettingsStore, OverlaySettings, SettingsStore, YamlSettingsStore};
pub use view::TelemetryView;

use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;

use crate::services::TelemetryServices;

/// Screen position of an overlay's top left corner
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Position {
    pub x: i32,
    pub y: i32,
}

impl Position {
    pub const fn new(x: i32, y: i32) -> Self {
        Self { x, y }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Size {
    pub width: u32,
    pub height: u32,
}

impl Size {
    pub const fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    /// Scale both sides, rounding up
    pub fn scaled(self, factor: f64) -> Self {
        let scale = |side: u32| (side as f64 * factor).ceil().max(0.0) as u32;
        Self { width: scale(self.width), height: scale(self.height) }
    }
}

/// Which topics an overlay subscribes to
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Feeds {
    pub physics: bool,
    pub graphics: bool,
    pub statics: bool,
    pub realtime_update: bool,
    pub track_data: bool,
    pub local_car: bool,
    /// Finished laps from the lap timing engine
    pub laps: bool,
}

impl Feeds {
    pub const NONE: Feeds = Feeds {
        physics: false,
        graphics: false,
        statics: false,
        realtime_update: false,
        track_data: false,
        local_car: false,
        laps: false,
    };

    pub const ALL: Feeds = Feeds {
        physics: true,
        graphics: true,
        statics: true,
        realtime_update: true,
        track_data: true,
        local_car: true,
        laps: true,
    };

    /// The three shared memory pages
    pub const SHARED_MEMORY: Feeds = Feeds { physics: true, graphics: true, statics: true, ..Feeds::NONE };

    pub fn count(&self) -> usize {
        [
            self.physics,
            self.graphics,
            self.statics,
            self.realtime_update,
            self.track_data,
            self.local_car,
            self.laps,
        ]
        .into_iter()
        .filter(|&on| on)
        .count()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OverlayState {
    Inactive,
    Active,
    /// Active, with the position driven by external input
    Repositioning,
}

/// What an overlay gets to see in `before_start`
#[derive(Clone)]
pub struct OverlayContext {
    services: Arc<TelemetryServices>,
    view: Arc<TelemetryView>,
    config: OverlayConfig,
}

impl OverlayContext {
    pub(crate) fn new(services: Arc<TelemetryServices>, view: Arc<TelemetryView>, config: OverlayConfig) -> Self {
        Self { services, view, config }
    }

    pub fn services(&self) -> &Arc<TelemetryServices> {
        &self.services
    }

    /// The view the host keeps current; safe to read from other threads
    pub fn view(&self) -> &Arc<TelemetryView> {
        &self.view
    }

    pub fn config(&self) -> &OverlayConfig {
        &self.config
    }

    /// Join bound for jobs the overlay runs itself
    pub fn join_timeout(&self) -> Duration {
        self.services.config().job.join_timeout()
    }
}

impl std::fmt::Debug for OverlayContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OverlayContext").field("config", &self.config).finish()
    }
}

/// A consumer of telemetry with a visible lifetime
///
/// Hooks run on different threads: `before_start` and `before_stop` on the
/// caller of [`OverlayHost::start`]/[`OverlayHost::stop`], `should_render` and
/// `render` on the redraw thread. The host serialises them, so `&mut self` is
/// never shared.
pub trait Overlay: Send + 'static {
    /// Name used for settings and logs
    fn name(&self) -> &str;

    /// Declared size before scaling
    fn size(&self) -> Size;

    /// Redraw cadence, the configured default when `None`
    ///
    /// A `refresh_rate_hz` field in the overlay's config takes precedence.
    fn refresh_rate_hz(&self) -> Option<u32> {
        None
    }

    fn config_schema(&self) -> ConfigSchema {
        ConfigSchema::new()
    }

    fn allow_reposition(&self) -> bool {
        true
    }

    fn feeds(&self) -> Feeds {
        Feeds::ALL
    }

    /// Runs once per start, after the initial read and before the first redraw
    fn before_start(&mut self, _ctx: &OverlayContext) -> anyhow::Result<()> {
        Ok(())
    }

    fn before_stop(&mut self) -> anyhow::Result<()> {
        Ok(())
    }

    fn should_render(&self, _view: &TelemetryView) -> bool {
        true
    }

    fn render(&mut self, view: &TelemetryView) -> anyhow::Result<()>;
}
