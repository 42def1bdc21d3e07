//! Runtime configuration loaded from YAML.
//!
//! Every field has a default, so an empty document is a valid configuration:
//!
//! ```rust
//! use stint::StintConfig;
//!
//! let config = StintConfig::from_yaml_str("graphics_hz: 60\nbroadcast:\n  request_cooldown_ms: 2000\n")?;
//! assert_eq!(config.graphics_hz, 60);
//! assert_eq!(config.lap_timing_hz(), 60);
//! assert_eq!(config.physics_hz, 100);
//! # Ok::<(), stint::StintError>(())
//! ```

use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

use crate::timing::ValidityPolicy;
use crate::{Result, StintError};

/// Highest cadence a poller or redraw loop accepts (1 ms interval)
pub const MAX_RATE_HZ: u32 = 1000;

/// Process-wide settings for trackers, timing, broadcast and overlays
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StintConfig {
    pub physics_hz: u32,
    pub graphics_hz: u32,
    pub static_hz: u32,

    /// Lap timing cadence, the graphics cadence when unset
    pub lap_timing_hz: Option<u32>,

    pub validity_policy: ValidityPolicy,
    pub broadcast: BroadcastConfig,
    pub overlay: OverlayDefaults,
    pub job: JobConfig,
}

impl Default for StintConfig {
    fn default() -> Self {
        Self {
            physics_hz: 100,
            graphics_hz: 100,
            static_hz: 1,
            lap_timing_hz: None,
            validity_policy: ValidityPolicy::Sticky,
            broadcast: BroadcastConfig::default(),
            overlay: OverlayDefaults::default(),
            job: JobConfig::default(),
        }
    }
}

/// Broadcast hub settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BroadcastConfig {
    /// Minimum time between two forwarded data requests
    pub request_cooldown_ms: u64,
    /// Idle interval after which the drain thread logs that the client is quiet
    pub poll_timeout_ms: u64,
}

impl Default for BroadcastConfig {
    fn default() -> Self {
        Self { request_cooldown_ms: 5000, poll_timeout_ms: 50 }
    }
}

impl BroadcastConfig {
    pub fn request_cooldown(&self) -> Duration {
        Duration::from_millis(self.request_cooldown_ms)
    }

    pub fn poll_timeout(&self) -> Duration {
        Duration::from_millis(self.poll_timeout_ms)
    }
}

/// Defaults applied to overlays that don't override them
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct OverlayDefaults {
    pub default_refresh_hz: u32,
}

impl Default for OverlayDefaults {
    fn default() -> Self {
        Self { default_refresh_hz: 30 }
    }
}

/// Worker thread settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct JobConfig {
    /// Upper bound for joining a cancelled worker
    pub join_timeout_ms: u64,
}

impl Default for JobConfig {
    fn default() -> Self {
        Self { join_timeout_ms: 50 }
    }
}

impl JobConfig {
    pub fn join_timeout(&self) -> Duration {
        Duration::from_millis(self.join_timeout_ms)
    }
}

impl StintConfig {
    /// Parse and validate a YAML document
    pub fn from_yaml_str(yaml: &str) -> Result<Self> {
        let config: Self = serde_yaml_ng::from_str(yaml)
            .map_err(|e| StintError::config_error("config", format!("invalid YAML: {e}")))?;
        config.validate()?;
        Ok(config)
    }

    /// Load and validate a YAML file
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let yaml = std::fs::read_to_string(path).map_err(|e| {
            StintError::config_error("config", format!("cannot read {}: {e}", path.display()))
        })?;
        Self::from_yaml_str(&yaml)
    }

    pub fn to_yaml(&self) -> Result<String> {
        serde_yaml_ng::to_string(self).map_err(|e| StintError::config_error("config", e.to_string()))
    }

    /// Effective lap timing cadence
    pub fn lap_timing_hz(&self) -> u32 {
        self.lap_timing_hz.unwrap_or(self.graphics_hz)
    }

    /// Reject values that would fail later when threads are spawned
    pub fn validate(&self) -> Result<()> {
        let rates = [
            ("physics_hz", self.physics_hz),
            ("graphics_hz", self.graphics_hz),
            ("static_hz", self.static_hz),
            ("lap_timing_hz", self.lap_timing_hz()),
            ("overlay.default_refresh_hz", self.overlay.default_refresh_hz),
        ];
        for (field, hz) in rates {
            if hz == 0 || hz > MAX_RATE_HZ {
                return Err(StintError::config_error(field, format!("{hz} Hz is outside 1..={MAX_RATE_HZ}")));
            }
        }

        let timeouts = [
            ("broadcast.request_cooldown_ms", self.broadcast.request_cooldown_ms),
            ("broadcast.poll_timeout_ms", self.broadcast.poll_timeout_ms),
            ("job.join_timeout_ms", self.job.join_timeout_ms),
        ];
        for (field, ms) in timeouts {
            if ms == 0 {
                return Err(StintError::config_error(field, "must be greater than zero"));
            }
        }
        Ok(())
    }
}
