//! Typed per-overlay configuration.
//!
//! An overlay declares its settings as a [`ConfigSchema`]; values are stored
//! as strings keyed by field name and parsed back against the schema. Numbers
//! outside a field's range are clipped to it, anything that does not parse is
//! rejected.
//!
//! ```rust
//! use std::collections::BTreeMap;
//! use stint::overlay::{ConfigField, ConfigSchema, OverlayConfig};
//!
//! let schema = ConfigSchema::new()
//!     .field(ConfigField::int("redline_percent", 94, 80, 100, 1))
//!     .allow_rescale();
//!
//! let stored = BTreeMap::from([("redline_percent".to_string(), "120".to_string())]);
//! let config = OverlayConfig::load("Shift Bar", &schema, &stored)?;
//! assert_eq!(config.int("redline_percent"), Some(100));
//! assert_eq!(config.scale(), 1.0);
//! # Ok::<(), stint::StintError>(())
//! ```

use std::collections::BTreeMap;
use std::fmt;
use tracing::debug;

use crate::{Result, StintError};

/// Key of the field added by [`ConfigSchema::allow_rescale`]
pub const SCALE_KEY: &str = "scale";
/// Optional field that overrides an overlay's redraw cadence
pub const REFRESH_RATE_KEY: &str = "refresh_rate_hz";
pub const MIN_SCALE: f64 = 0.5;
pub const MAX_SCALE: f64 = 2.0;

/// Value type and range of a field
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum FieldKind {
    /// Integer clipped to `min..=max`; `step` is the editing increment
    Int { min: i64, max: i64, step: i64 },
    Float { min: f64, max: f64 },
    Bool,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ConfigValue {
    Int(i64),
    Float(f64),
    Bool(bool),
}

impl fmt::Display for ConfigValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigValue::Int(v) => write!(f, "{v}"),
            ConfigValue::Float(v) => write!(f, "{v}"),
            ConfigValue::Bool(v) => write!(f, "{v}"),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ConfigField {
    pub key: &'static str,
    pub kind: FieldKind,
    pub default: ConfigValue,
}

impl ConfigField {
    pub fn int(key: &'static str, default: i64, min: i64, max: i64, step: i64) -> Self {
        Self { key, kind: FieldKind::Int { min, max, step }, default: ConfigValue::Int(default.max(min).min(max)) }
    }

    pub fn float(key: &'static str, default: f64, min: f64, max: f64) -> Self {
        Self { key, kind: FieldKind::Float { min, max }, default: ConfigValue::Float(default.max(min).min(max)) }
    }

    pub fn bool(key: &'static str, default: bool) -> Self {
        Self { key, kind: FieldKind::Bool, default: ConfigValue::Bool(default) }
    }

    /// Parse a stored string, clipping numbers into range
    pub fn parse(&self, raw: &str) -> Result<ConfigValue> {
        let raw = raw.trim();
        let invalid = |what: &str| StintError::config_error(self.key, format!("{raw:?} is not {what}"));
        match self.kind {
            FieldKind::Int { min, max, .. } => {
                let value: i64 = raw.parse().map_err(|_| invalid("an integer"))?;
                Ok(ConfigValue::Int(value.max(min).min(max)))
            }
            FieldKind::Float { min, max } => {
                let value: f64 = raw.parse().map_err(|_| invalid("a number"))?;
                if !value.is_finite() {
                    return Err(invalid("a finite number"));
                }
                Ok(ConfigValue::Float(value.max(min).min(max)))
            }
            FieldKind::Bool => raw.parse().map(ConfigValue::Bool).map_err(|_| invalid("true or false")),
        }
    }

    /// Check a value's type and clip it into range
    pub fn coerce(&self, value: ConfigValue) -> Result<ConfigValue> {
        match (self.kind, value) {
            (FieldKind::Int { min, max, .. }, ConfigValue::Int(v)) => Ok(ConfigValue::Int(v.max(min).min(max))),
            (FieldKind::Float { min, max }, ConfigValue::Float(v)) if v.is_finite() => {
                Ok(ConfigValue::Float(v.max(min).min(max)))
            }
            (FieldKind::Bool, ConfigValue::Bool(v)) => Ok(ConfigValue::Bool(v)),
            (kind, value) => Err(StintError::config_error(self.key, format!("{value} does not fit {kind:?}"))),
        }
    }
}

/// The fields an overlay can be configured with
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ConfigSchema {
    fields: Vec<ConfigField>,
}

impl ConfigSchema {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a field, replacing any field with the same key
    pub fn field(mut self, field: ConfigField) -> Self {
        self.fields.retain(|f| f.key != field.key);
        self.fields.push(field);
        self
    }

    /// Add the `scale` field applied to the overlay's declared size
    pub fn allow_rescale(self) -> Self {
        self.field(ConfigField::float(SCALE_KEY, 1.0, MIN_SCALE, MAX_SCALE))
    }

    pub fn is_rescalable(&self) -> bool {
        self.get(SCALE_KEY).is_some()
    }

    pub fn fields(&self) -> &[ConfigField] {
        &self.fields
    }

    pub fn get(&self, key: &str) -> Option<&ConfigField> {
        self.fields.iter().find(|f| f.key == key)
    }
}

/// Resolved configuration values of one overlay
#[derive(Debug, Clone, PartialEq)]
pub struct OverlayConfig {
    schema: ConfigSchema,
    values: BTreeMap<&'static str, ConfigValue>,
}

impl OverlayConfig {
    /// Every field at its default
    pub fn defaults(schema: &ConfigSchema) -> Self {
        let values = schema.fields.iter().map(|f| (f.key, f.default)).collect();
        Self { schema: schema.clone(), values }
    }

    /// Resolve stored values against `schema`
    ///
    /// Missing keys take their default and unknown keys are ignored. A value
    /// that does not parse fails the whole load.
    pub fn load(overlay: &str, schema: &ConfigSchema, stored: &BTreeMap<String, String>) -> Result<Self> {
        let mut config = Self::defaults(schema);
        for (key, raw) in stored {
            let Some(field) = schema.get(key) else {
                debug!(overlay, key = %key, "Ignoring unknown stored setting");
                continue;
            };
            let value = field.parse(raw).map_err(|e| match e {
                StintError::Config { context, details } => {
                    StintError::config_error(format!("{overlay}.{context}"), details)
                }
                other => other,
            })?;
            config.values.insert(field.key, value);
        }
        Ok(config)
    }

    pub fn schema(&self) -> &ConfigSchema {
        &self.schema
    }

    pub fn get(&self, key: &str) -> Option<ConfigValue> {
        self.values.get(key).copied()
    }

    pub fn int(&self, key: &str) -> Option<i64> {
        match self.get(key)? {
            ConfigValue::Int(v) => Some(v),
            _ => None,
        }
    }

    pub fn float(&self, key: &str) -> Option<f64> {
        match self.get(key)? {
            ConfigValue::Float(v) => Some(v),
            ConfigValue::Int(v) => Some(v as f64),
            ConfigValue::Bool(_) => None,
        }
    }

    pub fn bool(&self, key: &str) -> Option<bool> {
        match self.get(key)? {
            ConfigValue::Bool(v) => Some(v),
            _ => None,
        }
    }

    /// Update one field, clipped into its range
    pub fn set(&mut self, key: &str, value: ConfigValue) -> Result<()> {
        let field = self
            .schema
            .get(key)
            .ok_or_else(|| StintError::config_error(key, "no such field"))?;
        let value = field.coerce(value)?;
        self.values.insert(field.key, value);
        Ok(())
    }

    /// Configured redraw cadence, if the schema has a refresh rate field
    pub fn refresh_rate_hz(&self) -> Option<u32> {
        self.int(REFRESH_RATE_KEY).and_then(|hz| u32::try_from(hz).ok())
    }

    /// Size factor, 1.0 for overlays that cannot be rescaled
    pub fn scale(&self) -> f64 {
        self.float(SCALE_KEY).unwrap_or(1.0)
    }

    /// String form for the settings store
    pub fn to_stored(&self) -> BTreeMap<String, String> {
        self.values.iter().map(|(key, value)| (key.to_string(), value.to_string())).collect()
    }
}
