//! Tracing subscriber setup for applications embedding stint.
//!
//! The library itself only emits `tracing` events; nothing is printed until
//! the host application installs a subscriber, either its own or the one
//! built here.
//!
//! ```rust,no_run
//! use stint::logging::{LoggingMode, init_logging};
//!
//! init_logging(LoggingMode::Development)?;
//! # Ok::<(), stint::logging::LoggingError>(())
//! ```
//!
//! `STINT_LOG` overrides the mode's default directive, e.g.
//! `STINT_LOG=stint::tracker=trace,stint=info`.

use tracing_subscriber::{EnvFilter, Registry, fmt};

/// Environment variable holding an `EnvFilter` directive
pub const LOG_ENV: &str = "STINT_LOG";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoggingMode {
    /// No subscriber is installed
    Silent,
    /// Compact stderr output at info level
    Development,
    /// Verbose output with threads and source locations
    Debug,
}

#[derive(Debug, thiserror::Error)]
pub enum LoggingError {
    #[error("Failed to initialize tracing subscriber: {0}")]
    TracingInit(String),

    #[error("Invalid {LOG_ENV} directive: {0}")]
    InvalidEnv(String),
}

/// Install a global subscriber for `mode`
///
/// Fails if a global subscriber is already set.
pub fn init_logging(mode: LoggingMode) -> Result<(), LoggingError> {
    use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

    match mode {
        LoggingMode::Silent => Ok(()),
        LoggingMode::Development => {
            let filter = env_filter("stint=info")?;
            Registry::default()
                .with(fmt::layer().with_target(false).with_thread_names(true).compact())
                .with(filter)
                .try_init()
                .map_err(|e| LoggingError::TracingInit(e.to_string()))
        }
        LoggingMode::Debug => {
            let filter = env_filter("stint=debug")?;
            Registry::default()
                .with(fmt::layer().pretty().with_thread_names(true).with_file(true).with_line_number(true))
                .with(filter)
                .try_init()
                .map_err(|e| LoggingError::TracingInit(e.to_string()))
        }
    }
}

/// `STINT_LOG` if set, otherwise `default_directive`
fn env_filter(default_directive: &str) -> Result<EnvFilter, LoggingError> {
    match std::env::var(LOG_ENV) {
        Ok(directive) => EnvFilter::try_new(&directive).map_err(|e| LoggingError::InvalidEnv(format!("{directive}: {e}"))),
        Err(_) => Ok(EnvFilter::new(default_directive)),
    }
}

/// Whether a global subscriber has been installed
pub fn is_initialized() -> bool {
    tracing::dispatcher::has_been_set()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn silent_mode_installs_nothing() {
        assert!(init_logging(LoggingMode::Silent).is_ok());
    }

    #[test]
    fn default_directives_parse() {
        assert!(EnvFilter::try_new("stint=info").is_ok());
        assert!(EnvFilter::try_new("stint=debug").is_ok());
    }
}
