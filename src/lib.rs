//! Real-time sim telemetry acquisition, fan-out and overlay scheduling.
//!
//! stint samples a racing simulator's shared memory pages and broadcast feed,
//! derives lap and sector timing from the samples, and fans typed immutable
//! snapshots out to any number of overlays, each redrawing on its own
//! schedule.
//!
//! # Features
//!
//! - **Trackers**: one poll thread per shared memory page publishing to a [`Topic`]
//! - **Broadcast hub**: broadcast client events as topics, reset on disconnect
//! - **Lap timing**: sector attribution and finished-lap events from graphics snapshots
//! - **Periodic jobs**: drift-corrected, cancellable worker threads with bounded joins
//! - **Overlay lifecycle**: symmetric subscribe/unsubscribe, hooks, settings persistence
//!
//! # Quick Start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use stint::providers::ScriptedSource;
//! use stint::{Stint, StintConfig};
//!
//! let services = Stint::start(Arc::new(ScriptedSource::new()), &StintConfig::default())?;
//!
//! let _laps = services.lap_timing().on_lap_finished(|lap| {
//!     println!("lap {} in {} ms (valid: {})", lap.index, lap.time_ms, lap.is_valid);
//! });
//! let _rpm = services.physics().subscribe(|physics| {
//!     println!("{} rpm", physics.rpm);
//! });
//!
//! services.shutdown();
//! # Ok::<(), stint::StintError>(())
//! ```

// Core types and error handling
mod error;
#[cfg_attr(any(test, feature = "benchmark"), path = "test_utils.rs")]
#[cfg(any(test, feature = "benchmark"))]
pub mod test_utils;
pub mod types;

// Acquisition and fan-out
pub mod broadcast;
pub mod job;
pub mod provider;
pub mod providers;
pub mod stream;
pub mod timing;
pub mod tracker;
pub mod windows;

// Consumers
pub mod overlay;
pub mod overlays;

pub mod config;
pub mod logging;
pub mod services;

// Core exports
pub use error::*;
pub use types::*;

// Main API exports
pub use config::StintConfig;
pub use job::PeriodicJob;
pub use overlay::{Overlay, OverlayHost};
pub use provider::{Snapshot, SnapshotSource};
pub use services::TelemetryServices;
pub use timing::{LapTimingEngine, ValidityPolicy};
pub use tracker::{Subscription, Topic, Tracker};

use std::sync::Arc;

/// Unified entry point for telemetry services.
///
/// # Examples
///
/// ## Live shared memory (Windows)
/// ```rust,no_run
/// use stint::{Stint, StintConfig};
///
/// let services = Stint::connect(&StintConfig::default())?;
/// # Ok::<(), stint::StintError>(())
/// ```
///
/// ## Scripted source (cross-platform)
/// ```rust,no_run
/// use std::sync::Arc;
/// use stint::providers::ScriptedSource;
/// use stint::{Stint, StintConfig};
///
/// let source = Arc::new(ScriptedSource::new());
/// let services = Stint::start(source, &StintConfig::default())?;
/// # Ok::<(), stint::StintError>(())
/// ```
pub struct Stint;

impl Stint {
    /// Start every service against `source`.
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - The configuration is invalid
    /// - A worker thread cannot be spawned
    pub fn start(source: Arc<dyn SnapshotSource>, config: &StintConfig) -> Result<Arc<TelemetryServices>> {
        TelemetryServices::start(source, config).map(Arc::new)
    }

    /// Start every service against the simulator's live shared memory.
    ///
    /// # Platform
    ///
    /// Only available on Windows, where the simulator runs. On other platforms
    /// this returns an `UnsupportedPlatform` error.
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - Platform is not Windows
    /// - The simulator has not created its shared memory pages
    /// - The configuration is invalid
    pub fn connect(config: &StintConfig) -> Result<Arc<TelemetryServices>> {
        #[cfg(windows)]
        {
            let source = providers::SharedMemorySource::open()?;
            Self::start(Arc::new(source), config)
        }

        #[cfg(not(windows))]
        {
            let _ = config;
            Err(StintError::unsupported_platform("Shared memory telemetry", "Windows"))
        }
    }
}
