//! Overlays shipped with the crate.
//!
//! Both compute the model a renderer would draw rather than pixels; they also
//! show how an overlay runs its own [`PeriodicJob`](crate::job::PeriodicJob)
//! alongside the host's redraw loop.

pub mod gforce_trace;
pub mod shift_bar;

pub use gforce_trace::{GForceChunk, GForceTraceOverlay, TraceBuffer, TraceStatus};
pub use shift_bar::{Calibration, ShiftBarModel, ShiftBarOverlay, ShiftBarSettings};
