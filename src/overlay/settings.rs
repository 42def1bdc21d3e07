//! Persisted overlay settings keyed by overlay name

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

use super::Position;
use crate::{Result, StintError};

/// What is stored per overlay: where it sits and its raw config values
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct OverlaySettings {
    pub position: Position,
    pub config: BTreeMap<String, String>,
}

/// Storage for overlay settings
///
/// The host loads settings once when it is created and saves them whenever
/// the overlay stops or leaves repositioning.
pub trait SettingsStore: Send + Sync + 'static {
    /// Settings for `overlay`, `None` if nothing was saved yet
    fn load(&self, overlay: &str) -> Result<Option<OverlaySettings>>;

    fn save(&self, overlay: &str, settings: &OverlaySettings) -> Result<()>;
}

/// Settings kept in memory only
#[derive(Debug, Default)]
pub struct MemorySettingsStore {
    entries: Mutex<BTreeMap<String, OverlaySettings>>,
    saves: Mutex<u64>,
}

impl MemorySettingsStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store pre-seeded with settings for one overlay
    pub fn with(overlay: impl Into<String>, settings: OverlaySettings) -> Self {
        let store = Self::new();
        store.entries.lock().insert(overlay.into(), settings);
        store
    }

    /// Number of successful saves
    pub fn saves(&self) -> u64 {
        *self.saves.lock()
    }
}

impl SettingsStore for MemorySettingsStore {
    fn load(&self, overlay: &str) -> Result<Option<OverlaySettings>> {
        Ok(self.entries.lock().get(overlay).cloned())
    }

    fn save(&self, overlay: &str, settings: &OverlaySettings) -> Result<()> {
        self.entries.lock().insert(overlay.to_string(), settings.clone());
        *self.saves.lock() += 1;
        Ok(())
    }
}

/// All overlays' settings in one YAML document
///
/// The document maps overlay names to their settings. It is read once on
/// open and rewritten in full on every save.
#[derive(Debug)]
pub struct YamlSettingsStore {
    path: PathBuf,
    entries: Mutex<BTreeMap<String, OverlaySettings>>,
}

impl YamlSettingsStore {
    /// Open `path`, starting empty if the file does not exist yet
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let entries = if path.exists() {
            let yaml = std::fs::read_to_string(&path).map_err(|e| StintError::settings_error(&path, e))?;
            if yaml.trim().is_empty() {
                BTreeMap::new()
            } else {
                serde_yaml_ng::from_str(&yaml).map_err(|e| StintError::settings_error(&path, e))?
            }
        } else {
            debug!(path = %path.display(), "No settings file yet");
            BTreeMap::new()
        };
        info!(path = %path.display(), overlays = entries.len(), "Overlay settings opened");
        Ok(Self { path, entries: Mutex::new(entries) })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl SettingsStore for YamlSettingsStore {
    fn load(&self, overlay: &str) -> Result<Option<OverlaySettings>> {
        Ok(self.entries.lock().get(overlay).cloned())
    }

    fn save(&self, overlay: &str, settings: &OverlaySettings) -> Result<()> {
        let mut entries = self.entries.lock();
        entries.insert(overlay.to_string(), settings.clone());

        let yaml = serde_yaml_ng::to_string(&*entries).map_err(|e| StintError::settings_error(&self.path, e))?;
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(|e| StintError::settings_error(&self.path, e))?;
        }
        std::fs::write(&self.path, yaml).map_err(|e| StintError::settings_error(&self.path, e))?;
        debug!(overlay, path = %self.path.display(), "Overlay settings saved");
        Ok(())
    }
}
