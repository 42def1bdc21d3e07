//! Overlay hosts running against shared telemetry services
//!
//! Covers the visible lifetime of overlays end to end: subscriptions made on
//! start and dropped on stop, settings persisted to a YAML file and restored
//! by a new host, and independence between overlays sharing one service set.

use std::sync::Arc;
use std::time::{Duration, Instant};

use stint::overlay::{
    Feeds, MemorySettingsStore, Overlay, OverlayHost, OverlayState, Position, Size, TelemetryView,
    YamlSettingsStore,
};
use stint::overlays::{GForceTraceOverlay, ShiftBarOverlay};
use stint::providers::ScriptedSource;
use stint::types::{PhysicsSnapshot, StaticSnapshot};
use stint::{Stint, StintConfig, TelemetryServices};

fn wait_until(timeout: Duration, mut condition: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + timeout;
    while Instant::now() < deadline {
        if condition() {
            return true;
        }
        std::thread::sleep(Duration::from_millis(1));
    }
    condition()
}

fn services(rpm: i32, max_rpm: i32) -> Arc<TelemetryServices> {
    let source = ScriptedSource::new();
    source.push_physics(PhysicsSnapshot { rpm, acc_g: [0.8, 0.0, -1.2], ..Default::default() });
    source.push_static(StaticSnapshot { max_rpm, ..Default::default() });
    let config = StintConfig { physics_hz: 200, graphics_hz: 200, static_hz: 50, ..StintConfig::default() };
    let services = Stint::start(Arc::new(source), &config).unwrap();
    assert!(wait_until(Duration::from_secs(2), || {
        services.physics().latest().is_some() && services.statics().latest().is_some()
    }));
    services
}

/// Counts renders and nothing else
struct Counter;

impl Overlay for Counter {
    fn name(&self) -> &str {
        "Counter"
    }

    fn size(&self) -> Size {
        Size::new(100, 20)
    }

    fn refresh_rate_hz(&self) -> Option<u32> {
        Some(200)
    }

    fn feeds(&self) -> Feeds {
        Feeds { physics: true, ..Feeds::NONE }
    }

    fn render(&mut self, _view: &TelemetryView) -> anyhow::Result<()> {
        Ok(())
    }
}

#[test]
fn shift_bar_renders_from_live_telemetry() {
    let services = services(7_850, 8_000);
    let host = OverlayHost::new(
        ShiftBarOverlay::new().with_detection_interval(Duration::from_millis(10)),
        Arc::clone(&services),
        Arc::new(MemorySettingsStore::new()),
    )
    .unwrap();

    host.start().unwrap();
    assert!(wait_until(Duration::from_secs(2), || host.with_overlay(|bar| bar.model().is_some())));

    let model = host.with_overlay(ShiftBarOverlay::model).unwrap();
    assert_eq!(model.max_rpm, 8_000);
    assert!(model.is_redline());
    assert!(model.fill > 0.9);
    assert_eq!(host.with_overlay(ShiftBarOverlay::calibration).marks.len(), 3);

    assert!(host.stop());
    assert_eq!(host.state(), OverlayState::Inactive);
}

#[test]
fn stop_releases_every_subscription() {
    let services = services(5_000, 8_000);
    let physics_before = services.physics().topic().subscriber_count();
    let statics_before = services.statics().topic().subscriber_count();

    let host =
        OverlayHost::new(ShiftBarOverlay::new(), Arc::clone(&services), Arc::new(MemorySettingsStore::new())).unwrap();
    for _ in 0..3 {
        host.start().unwrap();
        assert_eq!(services.physics().topic().subscriber_count(), physics_before + 1);
        assert_eq!(services.statics().topic().subscriber_count(), statics_before + 1);
        assert_eq!(services.graphics().topic().subscriber_count(), 0);

        host.stop();
        assert_eq!(services.physics().topic().subscriber_count(), physics_before);
        assert_eq!(services.statics().topic().subscriber_count(), statics_before);
    }
}

#[test]
fn settings_survive_a_new_host() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("overlays").join("settings.yaml");
    std::fs::create_dir_all(path.parent().unwrap()).unwrap();
    std::fs::write(&path, "Shift Bar:\n  config:\n    scale: \"2.0\"\n    redline_percent: \"98\"\n").unwrap();
    let services = services(5_000, 8_000);

    {
        let store = Arc::new(YamlSettingsStore::open(&path).unwrap());
        let host = OverlayHost::new(ShiftBarOverlay::new(), Arc::clone(&services), store).unwrap();
        host.start().unwrap();
        assert_eq!(host.size(), Size::new(602, 62));

        assert!(host.enable_reposition(true));
        assert!(host.reposition_to(Position::new(640, 1020)));
        assert!(host.enable_reposition(false));
        host.stop();
    }

    let store = Arc::new(YamlSettingsStore::open(&path).unwrap());
    let host = OverlayHost::new(ShiftBarOverlay::new(), services, store).unwrap();
    assert_eq!(host.position(), Position::new(640, 1020));
    assert_eq!(host.config().int("redline_percent"), Some(98));
    assert_eq!(host.config().scale(), 2.0);
}

#[test]
fn overlays_on_shared_services_are_independent() {
    let services = services(6_000, 8_000);
    let counter = OverlayHost::new(Counter, Arc::clone(&services), Arc::new(MemorySettingsStore::new())).unwrap();
    let trace = OverlayHost::new(
        GForceTraceOverlay::new().with_sample_hz(200),
        Arc::clone(&services),
        Arc::new(MemorySettingsStore::new()),
    )
    .unwrap();

    counter.start().unwrap();
    trace.start().unwrap();
    assert!(wait_until(Duration::from_secs(2), || counter.renders() > 3 && trace.renders() > 3));

    trace.liveness().kill();
    assert!(wait_until(Duration::from_secs(2), || !trace.is_active()));

    let rendered = counter.renders();
    assert!(wait_until(Duration::from_secs(2), || counter.renders() > rendered + 3));
    assert!(counter.is_active());
    assert!(trace.with_overlay(|t| t.buffer().active_len() > 0 || t.buffer().chunk_count() > 0));
    assert_eq!(services.physics().topic().subscriber_count(), 1);
}
