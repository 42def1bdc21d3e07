//! Start/stop lifecycle and redraw loop for one overlay

use parking_lot::Mutex;
use std::ops::ControlFlow;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use tracing::{debug, error, info, trace, warn};

use super::settings::{OverlaySettings, SettingsStore};
use super::view::TelemetryView;
use super::{Feeds, Overlay, OverlayConfig, OverlayContext, OverlayState, Position, Size};
use crate::job::PeriodicJob;
use crate::provider::Snapshot;
use crate::services::TelemetryServices;
use crate::tracker::{Subscription, Topic, Tracker, panic_message};
use crate::Result;

/// Shared flag an external owner flips to tear an overlay down
///
/// The redraw loop checks it every tick and stops the overlay once it is
/// killed. Starting the overlay again revives it.
#[derive(Debug, Clone)]
pub struct LivenessToken(Arc<AtomicBool>);

impl LivenessToken {
    fn new() -> Self {
        Self(Arc::new(AtomicBool::new(true)))
    }

    pub fn kill(&self) {
        self.0.store(false, Ordering::Release);
    }

    pub fn is_alive(&self) -> bool {
        self.0.load(Ordering::Acquire)
    }

    fn revive(&self) {
        self.0.store(true, Ordering::Release);
    }
}

#[derive(Debug)]
struct Status {
    state: OverlayState,
    position: Position,
    size: Size,
    config: OverlayConfig,
}

struct HostShared<O: Overlay> {
    name: String,
    allow_reposition: bool,
    overlay: Mutex<O>,
    services: Arc<TelemetryServices>,
    store: Arc<dyn SettingsStore>,
    view: Arc<TelemetryView>,
    status: Mutex<Status>,
    subscriptions: Mutex<Vec<Subscription>>,
    redraw: Mutex<Option<PeriodicJob>>,
    /// Serialises start and stop
    lifecycle: Mutex<()>,
    liveness: LivenessToken,
    renders: AtomicU64,
}

fn bind<T: Send + Sync + 'static>(
    topic: &Topic<T>,
    view: &Arc<TelemetryView>,
    set: fn(&TelemetryView, Option<Arc<T>>),
) -> Subscription {
    let view = Arc::clone(view);
    topic.subscribe(move |value| set(&view, Some(value)))
}

/// Last published value, or a direct source read before the first publish
fn read_tracker<T: Snapshot>(tracker: &Tracker<T>) -> Option<Arc<T>> {
    if let Some(latest) = tracker.latest() {
        return Some(latest);
    }
    match tracker.read_now() {
        Ok(snapshot) => Some(Arc::new(snapshot)),
        Err(e) => {
            trace!(tracker = T::KIND.as_str(), error = %e, "Nothing published and the source read failed");
            None
        }
    }
}

impl<O: Overlay> HostShared<O> {
    fn subscribe(&self, feeds: Feeds) -> Vec<Subscription> {
        let services = &self.services;
        let hub = services.broadcast();
        let mut subscriptions = Vec::with_capacity(feeds.count());

        if feeds.physics {
            subscriptions.push(bind(services.physics().topic(), &self.view, TelemetryView::set_physics));
        }
        if feeds.graphics {
            subscriptions.push(bind(services.graphics().topic(), &self.view, TelemetryView::set_graphics));
        }
        if feeds.statics {
            subscriptions.push(bind(services.statics().topic(), &self.view, TelemetryView::set_statics));
        }
        if feeds.realtime_update {
            subscriptions.push(bind(hub.realtime_update(), &self.view, TelemetryView::set_realtime_update));
        }
        if feeds.track_data {
            subscriptions.push(bind(hub.track_data(), &self.view, TelemetryView::set_track_data));
        }
        if feeds.local_car {
            subscriptions.push(bind(hub.local_car_update(), &self.view, TelemetryView::set_local_car));
        }
        if feeds.laps {
            subscriptions.push(bind(services.lap_timing().laps(), &self.view, TelemetryView::set_last_lap));
        }
        subscriptions
    }

    fn initial_read(&self, feeds: Feeds) {
        let services = &self.services;
        let hub = services.broadcast();

        if feeds.physics {
            self.view.fill_physics(read_tracker(services.physics()));
        }
        if feeds.graphics {
            self.view.fill_graphics(read_tracker(services.graphics()));
        }
        if feeds.statics {
            self.view.fill_statics(read_tracker(services.statics()));
        }
        if feeds.realtime_update {
            self.view.fill_realtime_update(hub.realtime_update().latest());
        }
        if feeds.track_data {
            self.view.fill_track_data(hub.track_data().latest());
        }
        if feeds.local_car {
            self.view.fill_local_car(hub.local_car_update().latest());
        }
        if feeds.laps {
            self.view.fill_last_lap(services.lap_timing().laps().latest());
        }
    }

    fn persist(&self) {
        let settings = {
            let status = self.status.lock();
            OverlaySettings { position: status.position, config: status.config.to_stored() }
        };
        match self.store.save(&self.name, &settings) {
            Ok(()) => trace!(overlay = %self.name, position = ?settings.position, "Overlay settings persisted"),
            Err(e) => warn!(overlay = %self.name, error = %e, "Failed to persist overlay settings"),
        }
    }

    fn redraw_tick(&self) -> ControlFlow<()> {
        if !self.liveness.is_alive() {
            info!(overlay = %self.name, "Overlay torn down externally, stopping");
            self.stop();
            return ControlFlow::Break(());
        }
        if self.status.lock().state == OverlayState::Inactive {
            return ControlFlow::Break(());
        }

        let mut overlay = self.overlay.lock();
        let view = self.view.as_ref();
        let outcome = panic::catch_unwind(AssertUnwindSafe(|| {
            if overlay.should_render(view) { overlay.render(view).map(|()| true) } else { Ok(false) }
        }));
        match outcome {
            Ok(Ok(true)) => {
                self.renders.fetch_add(1, Ordering::Relaxed);
            }
            Ok(Ok(false)) => {}
            Ok(Err(e)) => warn!(overlay = %self.name, error = %format!("{e:#}"), "Render failed"),
            Err(panic) => error!(overlay = %self.name, panic = panic_message(&*panic), "Render panicked"),
        }
        ControlFlow::Continue(())
    }

    fn unsubscribe_all(&self) -> usize {
        let subscriptions = std::mem::take(&mut *self.subscriptions.lock());
        let count = subscriptions.len();
        for subscription in subscriptions {
            subscription.unsubscribe();
        }
        count
    }

    fn run_before_stop(&self) {
        let outcome = panic::catch_unwind(AssertUnwindSafe(|| self.overlay.lock().before_stop()));
        match outcome {
            Ok(Ok(())) => {}
            Ok(Err(e)) => warn!(overlay = %self.name, error = %format!("{e:#}"), "before_stop failed"),
            Err(panic) => error!(overlay = %self.name, panic = panic_message(&*panic), "before_stop panicked"),
        }
    }

    /// Undo a start whose redraw loop never launched
    ///
    /// `before_start` already ran, so `before_stop` runs too.
    fn abandon_start(&self) {
        self.status.lock().state = OverlayState::Inactive;
        self.unsubscribe_all();
        self.run_before_stop();
    }

    fn stop(&self) -> bool {
        let _lifecycle = self.lifecycle.lock();
        {
            let mut status = self.status.lock();
            if status.state == OverlayState::Inactive {
                return true;
            }
            if status.state == OverlayState::Repositioning {
                debug!(overlay = %self.name, "Repositioning ended by stop");
            }
            status.state = OverlayState::Inactive;
        }

        let unsubscribed = self.unsubscribe_all();
        self.run_before_stop();
        self.persist();

        let job = self.redraw.lock().take();
        let stopped = job.as_ref().is_none_or(PeriodicJob::cancel_join);
        info!(overlay = %self.name, unsubscribed, stopped, "Overlay stopped");
        stopped
    }
}

/// Owns an overlay and binds its lifetime to telemetry
///
/// Created inactive. Settings are loaded once, on creation: a stored config
/// value that does not parse fails construction. Dropping the host stops the
/// overlay.
pub struct OverlayHost<O: Overlay> {
    shared: Arc<HostShared<O>>,
}

impl<O: Overlay> OverlayHost<O> {
    pub fn new(overlay: O, services: Arc<TelemetryServices>, store: Arc<dyn SettingsStore>) -> Result<Self> {
        let name = overlay.name().to_string();
        let stored = store.load(&name)?.unwrap_or_default();
        let config = OverlayConfig::load(&name, &overlay.config_schema(), &stored.config)?;
        let size = overlay.size().scaled(config.scale());
        debug!(overlay = %name, position = ?stored.position, "Overlay settings loaded");

        Ok(Self {
            shared: Arc::new(HostShared {
                allow_reposition: overlay.allow_reposition(),
                overlay: Mutex::new(overlay),
                services,
                store,
                view: Arc::new(TelemetryView::new()),
                status: Mutex::new(Status {
                    state: OverlayState::Inactive,
                    position: stored.position,
                    size,
                    config,
                }),
                subscriptions: Mutex::new(Vec::new()),
                redraw: Mutex::new(None),
                lifecycle: Mutex::new(()),
                liveness: LivenessToken::new(),
                renders: AtomicU64::new(0),
                name,
            }),
        })
    }

    /// Subscribe, read once, run `before_start` and launch the redraw loop
    ///
    /// Starting an active overlay does nothing. Errors only come from an
    /// invalid refresh rate or a redraw thread that cannot be spawned; hook
    /// failures are logged and startup continues.
    pub fn start(&self) -> Result<()> {
        let shared = &self.shared;
        let _lifecycle = shared.lifecycle.lock();
        if shared.status.lock().state != OverlayState::Inactive {
            debug!(overlay = %shared.name, "Overlay already active");
            return Ok(());
        }

        let (feeds, refresh_hz) = {
            let overlay = shared.overlay.lock();
            let configured = shared.status.lock().config.refresh_rate_hz();
            let default_hz = shared.services.config().overlay.default_refresh_hz;
            (overlay.feeds(), configured.or(overlay.refresh_rate_hz()).unwrap_or(default_hz))
        };
        let job = PeriodicJob::from_hz(format!("{}-redraw", shared.name), refresh_hz)?
            .with_join_timeout(shared.services.config().job.join_timeout());

        shared.liveness.revive();
        shared.view.clear();
        *shared.subscriptions.lock() = shared.subscribe(feeds);
        shared.initial_read(feeds);

        let config = shared.status.lock().config.clone();
        let ctx = OverlayContext::new(Arc::clone(&shared.services), Arc::clone(&shared.view), config);
        let outcome = panic::catch_unwind(AssertUnwindSafe(|| shared.overlay.lock().before_start(&ctx)));
        match outcome {
            Ok(Ok(())) => {}
            Ok(Err(e)) => warn!(overlay = %shared.name, error = %format!("{e:#}"), "before_start failed"),
            Err(panic) => error!(overlay = %shared.name, panic = panic_message(&*panic), "before_start panicked"),
        }

        {
            let declared = shared.overlay.lock().size();
            let mut status = shared.status.lock();
            status.size = declared.scaled(status.config.scale());
            status.state = OverlayState::Active;
        }

        let weak: Weak<HostShared<O>> = Arc::downgrade(shared);
        let spawned = job.run_until(move || match weak.upgrade() {
            Some(shared) => shared.redraw_tick(),
            None => ControlFlow::Break(()),
        });
        if let Err(e) = spawned {
            error!(overlay = %shared.name, error = %e, "Redraw loop failed to start");
            shared.abandon_start();
            return Err(e);
        }
        *shared.redraw.lock() = Some(job);

        info!(overlay = %shared.name, feeds = feeds.count(), refresh_hz, "Overlay started");
        Ok(())
    }

    /// Unsubscribe, run `before_stop`, persist settings and halt the redraw loop
    ///
    /// Returns whether the redraw thread stopped within its join bound.
    /// Stopping an inactive overlay does nothing.
    pub fn stop(&self) -> bool {
        self.shared.stop()
    }

    /// Enter or leave repositioning
    ///
    /// Only an active overlay that allows repositioning can enter it. Leaving
    /// persists the final position. Returns whether the mode changed.
    pub fn enable_reposition(&self, enabled: bool) -> bool {
        let shared = &self.shared;
        let changed = {
            let mut status = shared.status.lock();
            match (enabled, status.state) {
                (true, OverlayState::Active) if shared.allow_reposition => {
                    status.state = OverlayState::Repositioning;
                    true
                }
                (false, OverlayState::Repositioning) => {
                    status.state = OverlayState::Active;
                    true
                }
                _ => false,
            }
        };

        if changed {
            debug!(overlay = %shared.name, enabled, "Repositioning toggled");
            if !enabled {
                shared.persist();
            }
        }
        changed
    }

    /// Move the overlay from external input; ignored unless repositioning
    pub fn reposition_to(&self, position: Position) -> bool {
        let mut status = self.shared.status.lock();
        if status.state != OverlayState::Repositioning {
            return false;
        }
        status.position = position;
        true
    }

    pub fn name(&self) -> &str {
        &self.shared.name
    }

    pub fn state(&self) -> OverlayState {
        self.shared.status.lock().state
    }

    pub fn is_active(&self) -> bool {
        self.state() != OverlayState::Inactive
    }

    pub fn is_repositioning(&self) -> bool {
        self.state() == OverlayState::Repositioning
    }

    pub fn position(&self) -> Position {
        self.shared.status.lock().position
    }

    /// Declared size after scaling
    pub fn size(&self) -> Size {
        self.shared.status.lock().size
    }

    pub fn config(&self) -> OverlayConfig {
        self.shared.status.lock().config.clone()
    }

    /// Token that tears the overlay down from outside when killed
    pub fn liveness(&self) -> LivenessToken {
        self.shared.liveness.clone()
    }

    pub fn view(&self) -> &Arc<TelemetryView> {
        &self.shared.view
    }

    /// Number of completed renders across all runs
    pub fn renders(&self) -> u64 {
        self.shared.renders.load(Ordering::Relaxed)
    }

    /// Run `f` against the overlay, waiting for any render in progress
    pub fn with_overlay<R>(&self, f: impl FnOnce(&O) -> R) -> R {
        f(&self.shared.overlay.lock())
    }
}

impl<O: Overlay> Drop for OverlayHost<O> {
    fn drop(&mut self) {
        self.shared.stop();
    }
}

impl<O: Overlay> std::fmt::Debug for OverlayHost<O> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OverlayHost")
            .field("name", &self.shared.name)
            .field("status", &*self.shared.status.lock())
            .finish()
    }
}
