//! RPM shift bar

use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

use crate::job::PeriodicJob;
use crate::overlay::{
    ConfigField, ConfigSchema, Feeds, Overlay, OverlayContext, REFRESH_RATE_KEY, Size, TelemetryView,
};

pub const NAME: &str = "Shift Bar";

/// Fraction of max RPM where the normal colour band starts
pub const NORMAL_THRESHOLD: f64 = 0.6;

/// Smallest fill drawn; below this fraction the bar is empty
pub const MIN_FILL: f64 = 0.02;

const EARLY_KEY: &str = "early_percent";
const REDLINE_KEY: &str = "redline_percent";
const VISIBLE_RPM_KEY: &str = "visible_rpm";
const MIN_VISIBLE_RPM_KEY: &str = "min_visible_rpm";

const DETECTION_INTERVAL: Duration = Duration::from_secs(1);

/// Colour band thresholds as fractions of max RPM: normal, early, redline
pub fn band_thresholds(early_percent: i64, redline_percent: i64) -> [f64; 3] {
    [NORMAL_THRESHOLD, early_percent as f64 / 100.0, redline_percent as f64 / 100.0]
}

/// Highest band whose threshold `fraction` has reached, 0 below all of them
pub fn band_index(fraction: f64, thresholds: &[f64; 3]) -> usize {
    thresholds.iter().rposition(|&t| fraction >= t).unwrap_or(0)
}

/// RPM below which the bar shows nothing
///
/// The bar spans the top `visible_rpm` of the range, but never less than
/// `min_visible_rpm`.
pub fn hidden_rpm(max_rpm: i32, visible_rpm: i32, min_visible_rpm: i32) -> i32 {
    let hide = max_rpm.saturating_sub(visible_rpm).max(0);
    hide.min(max_rpm.saturating_sub(min_visible_rpm))
}

/// Fraction of the bar's width `rpm` maps to once the hidden range is cut off
pub fn adjusted_fraction(rpm: i32, max_rpm: i32, hide_rpm: i32, min_visible_rpm: i32) -> f64 {
    let hide = hide_rpm.min(max_rpm.saturating_sub(min_visible_rpm));
    let span = max_rpm.saturating_sub(hide);
    if span <= 0 {
        return 1.0;
    }
    f64::from(rpm.saturating_sub(hide)) / f64::from(span)
}

/// Bar settings resolved from the overlay config
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ShiftBarSettings {
    pub early_percent: i64,
    pub redline_percent: i64,
    pub visible_rpm: i32,
    pub min_visible_rpm: i32,
}

impl Default for ShiftBarSettings {
    fn default() -> Self {
        Self { early_percent: 94, redline_percent: 97, visible_rpm: 3000, min_visible_rpm: 1000 }
    }
}

/// What the bar shows for one redraw
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ShiftBarModel {
    /// RPM clamped to `0..=max_rpm`
    pub rpm: i32,
    pub max_rpm: i32,
    /// `rpm / max_rpm`, 0 without a max
    pub fraction: f64,
    pub band: usize,
    /// Drawn width as a fraction of the bar, 0 when the bar is empty
    pub fill: f64,
    pub pit_limiter: bool,
}

impl ShiftBarModel {
    pub fn compute(rpm: i32, max_rpm: i32, pit_limiter: bool, calibration: &Calibration) -> Self {
        let max_rpm = max_rpm.max(0);
        let rpm = rpm.clamp(0, max_rpm);
        let fraction = if rpm > 0 && max_rpm > 0 { f64::from(rpm) / f64::from(max_rpm) } else { 0.0 };

        let fill = if fraction < MIN_FILL {
            0.0
        } else {
            adjusted_fraction(rpm, max_rpm, calibration.hide_rpm, calibration.settings.min_visible_rpm)
                .clamp(MIN_FILL, 1.0)
        };

        Self { rpm, max_rpm, fraction, band: band_index(fraction, &calibration.thresholds), fill, pit_limiter }
    }

    /// Whether the bar is in its last band
    pub fn is_redline(&self) -> bool {
        self.band == 2
    }
}

/// Everything derived from max RPM, rebuilt when it changes
#[derive(Debug, Clone, PartialEq)]
pub struct Calibration {
    pub settings: ShiftBarSettings,
    pub max_rpm: i32,
    pub thresholds: [f64; 3],
    pub hide_rpm: i32,
    /// Positions of the 1000 RPM marks as bar fractions, from the top down
    pub marks: Vec<f64>,
    /// Position of the redline marker
    pub redline_mark: Option<f64>,
}

impl Calibration {
    pub fn new(settings: ShiftBarSettings, max_rpm: i32) -> Self {
        let thresholds = band_thresholds(settings.early_percent, settings.redline_percent);
        let hide_rpm = hidden_rpm(max_rpm, settings.visible_rpm, settings.min_visible_rpm);
        let mut calibration =
            Self { settings, max_rpm, thresholds, hide_rpm, marks: Vec::new(), redline_mark: None };
        if max_rpm > 0 {
            calibration.marks = calibration.rpm_marks();
            let redline_rpm = (f64::from(max_rpm) * settings.redline_percent as f64 / 100.0) as i32;
            calibration.redline_mark = Some(calibration.position(redline_rpm));
        }
        calibration
    }

    fn position(&self, rpm: i32) -> f64 {
        adjusted_fraction(rpm, self.max_rpm, self.hide_rpm, self.settings.min_visible_rpm)
    }

    fn rpm_marks(&self) -> Vec<f64> {
        let visible = (self.max_rpm - self.hide_rpm).max(self.settings.min_visible_rpm);
        let left_over = self.max_rpm % 1000;
        let mut count = visible / 1000;
        // A mark this close to max RPM would sit on the bar's edge
        if left_over != 0 && left_over < 70 {
            count -= 1;
        }
        (1..=count.max(0)).map(|i| self.position(self.max_rpm - i * 1000 - left_over)).collect()
    }
}

/// Horizontal RPM bar with colour bands and a pit limiter flag
///
/// A detection job checks the static page's max RPM once a second and
/// rebuilds the [`Calibration`] when it changes, so renders never recompute it.
pub struct ShiftBarOverlay {
    calibration: Arc<Mutex<Calibration>>,
    detection: Option<PeriodicJob>,
    detection_interval: Duration,
    model: Option<ShiftBarModel>,
}

impl Default for ShiftBarOverlay {
    fn default() -> Self {
        Self::new()
    }
}

impl ShiftBarOverlay {
    pub fn new() -> Self {
        Self {
            calibration: Arc::new(Mutex::new(Calibration::new(ShiftBarSettings::default(), 0))),
            detection: None,
            detection_interval: DETECTION_INTERVAL,
            model: None,
        }
    }

    /// Check for max RPM changes at a different interval
    pub fn with_detection_interval(mut self, interval: Duration) -> Self {
        self.detection_interval = interval;
        self
    }

    /// Model of the last render
    pub fn model(&self) -> Option<ShiftBarModel> {
        self.model
    }

    pub fn calibration(&self) -> Calibration {
        self.calibration.lock().clone()
    }
}

impl Overlay for ShiftBarOverlay {
    fn name(&self) -> &str {
        NAME
    }

    fn size(&self) -> Size {
        Size::new(301, 31)
    }

    fn refresh_rate_hz(&self) -> Option<u32> {
        Some(50)
    }

    fn config_schema(&self) -> ConfigSchema {
        let defaults = ShiftBarSettings::default();
        ConfigSchema::new()
            .field(ConfigField::int(EARLY_KEY, defaults.early_percent, 50, 100, 1))
            .field(ConfigField::int(REDLINE_KEY, defaults.redline_percent, 50, 100, 1))
            .field(ConfigField::int(VISIBLE_RPM_KEY, i64::from(defaults.visible_rpm), 1000, 15000, 100))
            .field(ConfigField::int(MIN_VISIBLE_RPM_KEY, i64::from(defaults.min_visible_rpm), 500, 5000, 100))
            .field(ConfigField::int(REFRESH_RATE_KEY, 50, 20, 200, 10))
            .allow_rescale()
    }

    fn feeds(&self) -> Feeds {
        Feeds { physics: true, statics: true, ..Feeds::NONE }
    }

    fn before_start(&mut self, ctx: &OverlayContext) -> anyhow::Result<()> {
        let config = ctx.config();
        let defaults = ShiftBarSettings::default();
        let settings = ShiftBarSettings {
            early_percent: config.int(EARLY_KEY).unwrap_or(defaults.early_percent),
            redline_percent: config.int(REDLINE_KEY).unwrap_or(defaults.redline_percent),
            visible_rpm: config.int(VISIBLE_RPM_KEY).map_or(defaults.visible_rpm, |v| v as i32),
            min_visible_rpm: config.int(MIN_VISIBLE_RPM_KEY).map_or(defaults.min_visible_rpm, |v| v as i32),
        };
        let max_rpm = ctx.view().statics().map_or(0, |s| s.max_rpm);
        *self.calibration.lock() = Calibration::new(settings, max_rpm);

        let job = PeriodicJob::new("shift-bar-max-rpm", self.detection_interval)?
            .with_join_timeout(ctx.join_timeout());
        let view = Arc::clone(ctx.view());
        let calibration = Arc::clone(&self.calibration);
        let mut last_max_rpm = max_rpm;
        job.run(move || {
            let max_rpm = view.statics().map_or(0, |s| s.max_rpm);
            if max_rpm != last_max_rpm {
                debug!(from = last_max_rpm, to = max_rpm, "Max RPM changed, rebuilding shift bar");
                let mut current = calibration.lock();
                *current = Calibration::new(current.settings, max_rpm);
                last_max_rpm = max_rpm;
            }
        })?;
        self.detection = Some(job);
        Ok(())
    }

    fn before_stop(&mut self) -> anyhow::Result<()> {
        if let Some(job) = self.detection.take() {
            job.cancel_join();
        }
        Ok(())
    }

    fn should_render(&self, view: &TelemetryView) -> bool {
        view.physics().is_some()
    }

    fn render(&mut self, view: &TelemetryView) -> anyhow::Result<()> {
        let Some(physics) = view.physics() else {
            return Ok(());
        };
        let max_rpm = view.statics().map_or(0, |s| s.max_rpm);
        let calibration = self.calibration.lock();
        self.model = Some(ShiftBarModel::compute(physics.rpm, max_rpm, physics.pit_limiter_on, &calibration));
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::overlay::{MemorySettingsStore, OverlayHost};
    use crate::providers::ScriptedSource;
    use crate::test_utils::{test_services, wait_until};
    use crate::types::{PhysicsSnapshot, StaticSnapshot};

    fn calibration(max_rpm: i32) -> Calibration {
        Calibration::new(ShiftBarSettings::default(), max_rpm)
    }

    #[test]
    fn band_index_picks_highest_reached_threshold() {
        let thresholds = band_thresholds(94, 97);
        assert_eq!(band_index(0.3, &thresholds), 0);
        assert_eq!(band_index(0.6, &thresholds), 0);
        assert_eq!(band_index(0.939, &thresholds), 0);
        assert_eq!(band_index(0.94, &thresholds), 1);
        assert_eq!(band_index(0.97, &thresholds), 2);
        assert_eq!(band_index(1.0, &thresholds), 2);
    }

    #[test]
    fn hidden_range_respects_min_visible() {
        assert_eq!(hidden_rpm(8000, 3000, 1000), 5000);
        assert_eq!(hidden_rpm(2500, 3000, 1000), 0);
        assert_eq!(hidden_rpm(8000, 500, 1000), 7000);
    }

    #[test]
    fn model_clamps_and_fills() {
        let cal = calibration(8000);

        let model = ShiftBarModel::compute(9000, 8000, false, &cal);
        assert_eq!(model.rpm, 8000);
        assert_eq!(model.fill, 1.0);
        assert!(model.is_redline());

        let model = ShiftBarModel::compute(6500, 8000, true, &cal);
        assert!((model.fill - 0.5).abs() < 1e-9);
        assert!(model.pit_limiter);

        let model = ShiftBarModel::compute(5020, 8000, false, &cal);
        assert_eq!(model.fill, MIN_FILL);
        assert_eq!(model.band, 0);

        let model = ShiftBarModel::compute(-50, 8000, false, &cal);
        assert_eq!((model.rpm, model.fill), (0, 0.0));
    }

    #[test]
    fn unknown_max_rpm_shows_an_empty_bar() {
        let model = ShiftBarModel::compute(4000, 0, false, &calibration(0));
        assert_eq!(model.rpm, 0);
        assert_eq!(model.fraction, 0.0);
        assert_eq!(model.fill, 0.0);
    }

    #[test]
    fn marks_cover_the_visible_range() {
        let cal = calibration(8000);
        assert_eq!(cal.marks.len(), 3);
        assert!((cal.marks[0] - 2.0 / 3.0).abs() < 1e-9);
        assert!(cal.marks.windows(2).all(|w| w[0] > w[1]));
        assert!(cal.redline_mark.is_some_and(|m| m > 0.9 && m < 1.0));

        // Leftover under 70 RPM drops the topmost mark
        assert_eq!(calibration(8050).marks.len(), 2);
        assert!(calibration(0).marks.is_empty());
    }

    #[test]
    fn detection_job_rebuilds_calibration_when_max_rpm_changes() {
        let source = ScriptedSource::new();
        source.push_physics(PhysicsSnapshot { rpm: 7800, ..Default::default() });
        source.push_static(StaticSnapshot { max_rpm: 8000, ..Default::default() });
        let source = Arc::new(source);
        let services = test_services(source.clone());

        let overlay = ShiftBarOverlay::new().with_detection_interval(Duration::from_millis(10));
        let host = OverlayHost::new(overlay, services, Arc::new(MemorySettingsStore::new())).unwrap();
        host.start().unwrap();

        assert_eq!(host.with_overlay(|o| o.calibration().max_rpm), 8000);
        assert!(wait_until(Duration::from_secs(2), || host.with_overlay(|o| o.model().is_some())));
        assert!(host.with_overlay(|o| o.model().is_some_and(|m| m.is_redline())));

        source.push_static(StaticSnapshot { max_rpm: 9000, ..Default::default() });
        assert!(wait_until(Duration::from_secs(2), || host.with_overlay(|o| o.calibration().max_rpm) == 9000));
        assert!(host.stop());
    }
}
