//! Error types for telemetry acquisition and overlay scheduling.
//!
//! All errors implement `std::error::Error` and carry enough context to decide
//! whether the failing operation can simply be retried on the next tick.
//!
//! ## Error Categories
//!
//! - **Read Errors**: Transient shared memory or socket hiccups, skipped by pollers
//! - **Connection Errors**: The simulator or broadcast client is not available
//! - **Configuration Errors**: Invalid intervals, rates or overlay config values
//! - **Settings Errors**: Overlay settings could not be loaded or persisted
//! - **Thread Errors**: Worker threads could not be spawned or are already running
//! - **Windows API Errors**: Platform-specific shared memory failures
//!
//! ## Recovery and Retry
//!
//! ```rust
//! use stint::StintError;
//!
//! let error = StintError::read_failed("graphics", "page not mapped yet");
//! if error.is_retryable() {
//!     for suggestion in error.recovery_suggestions() {
//!         println!("  - {}", suggestion);
//!     }
//! }
//! ```

use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

#[cfg(windows)]
use windows_core as core;

/// Result type alias for stint operations.
pub type Result<T, E = StintError> = std::result::Result<T, E>;

/// Main error type for stint operations.
#[derive(Error, Debug)]
#[non_exhaustive]
pub enum StintError {
    #[error("Failed to read {page} snapshot: {reason}")]
    Read { page: &'static str, reason: String },

    #[error("Failed to connect: {reason}")]
    Connection {
        reason: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    #[error("Interval must be at least 1ms, got {interval:?}")]
    InvalidInterval { interval: Duration },

    #[error("Configuration error in {context}: {details}")]
    Config { context: String, details: String },

    #[error("Settings error: {path}")]
    Settings {
        path: PathBuf,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    #[error("Job '{name}' is already running")]
    JobAlreadyRunning { name: String },

    #[error("Failed to spawn thread '{name}'")]
    ThreadSpawn {
        name: String,
        #[source]
        source: std::io::Error,
    },

    #[error("{feature} is only available on {required_platform}")]
    UnsupportedPlatform { feature: String, required_platform: String },

    #[error("Windows API error: {operation}")]
    #[cfg(windows)]
    WindowsApi {
        operation: String,
        #[source]
        source: core::Error,
    },
}

impl StintError {
    /// Returns whether this error is potentially recoverable through retry.
    pub fn is_retryable(&self) -> bool {
        match self {
            StintError::Read { .. } => true,
            StintError::Connection { .. } => true,
            StintError::InvalidInterval { .. } => false,
            StintError::Config { .. } => false,
            StintError::Settings { .. } => false,
            StintError::JobAlreadyRunning { .. } => false,
            StintError::ThreadSpawn { .. } => false,
            StintError::UnsupportedPlatform { .. } => false,
            #[cfg(windows)]
            StintError::WindowsApi { .. } => true,
        }
    }

    /// Returns suggested recovery actions for this error.
    pub fn recovery_suggestions(&self) -> Vec<&'static str> {
        match self {
            StintError::Read { .. } => vec![
                "Wait for the next poll tick",
                "Check that the simulator is in a session",
            ],
            StintError::Connection { .. } => vec![
                "Ensure the simulator is running",
                "Check the broadcasting port and passwords",
                "Try reconnecting once the session has loaded",
            ],
            StintError::InvalidInterval { .. } => vec![
                "Use an interval of at least one millisecond",
                "Lower the configured rate in Hz",
            ],
            StintError::Config { .. } => vec![
                "Check the configuration file for typos",
                "Remove the offending value to fall back to its default",
            ],
            StintError::Settings { .. } => vec![
                "Check the settings file exists and is writable",
                "Verify the settings file is valid YAML",
            ],
            StintError::JobAlreadyRunning { .. } => vec![
                "Cancel the job before running it again",
                "Use a separate job per repeating action",
            ],
            StintError::ThreadSpawn { .. } => vec![
                "Check system thread limits",
                "Stop unused overlays to free resources",
            ],
            StintError::UnsupportedPlatform { .. } => vec![
                "Use a scripted source for cross-platform testing",
                "Check documentation for platform requirements",
            ],
            #[cfg(windows)]
            StintError::WindowsApi { .. } => vec![
                "Start the simulator before connecting",
                "Check Windows permissions for shared memory access",
            ],
        }
    }

    /// Helper constructor for transient snapshot read failures.
    pub fn read_failed(page: &'static str, reason: impl Into<String>) -> Self {
        StintError::Read { page, reason: reason.into() }
    }

    /// Helper constructor for connection errors.
    pub fn connection_failed(reason: impl Into<String>) -> Self {
        StintError::Connection { reason: reason.into(), source: None }
    }

    /// Helper constructor for connection errors with source.
    pub fn connection_failed_with_source(
        reason: impl Into<String>,
        source: Box<dyn std::error::Error + Send + Sync>,
    ) -> Self {
        StintError::Connection { reason: reason.into(), source: Some(source) }
    }

    /// Helper constructor for configuration errors.
    pub fn config_error(context: impl Into<String>, details: impl Into<String>) -> Self {
        StintError::Config { context: context.into(), details: details.into() }
    }

    /// Helper constructor for settings storage errors.
    pub fn settings_error(
        path: impl Into<PathBuf>,
        source: impl Into<Box<dyn std::error::Error + Send + Sync>>,
    ) -> Self {
        StintError::Settings { path: path.into(), source: source.into() }
    }

    /// Helper constructor for thread spawn failures.
    pub fn thread_spawn(name: impl Into<String>, source: std::io::Error) -> Self {
        StintError::ThreadSpawn { name: name.into(), source }
    }

    /// Helper constructor for Windows API errors.
    #[cfg(windows)]
    pub fn windows_api_error(operation: impl Into<String>, source: core::Error) -> Self {
        StintError::WindowsApi { operation: operation.into(), source }
    }

    /// Helper constructor for unsupported platform errors.
    pub fn unsupported_platform(
        feature: impl Into<String>,
        required_platform: impl Into<String>,
    ) -> Self {
        StintError::UnsupportedPlatform {
            feature: feature.into(),
            required_platform: required_platform.into(),
        }
    }
}

#[cfg(windows)]
impl From<core::Error> for StintError {
    fn from(err: core::Error) -> Self {
        StintError::WindowsApi { operation: "Unknown Windows operation".to_string(), source: err }
    }
}
