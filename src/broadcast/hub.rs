//! Fan-out of broadcast client events

use crossbeam_channel::{Receiver, RecvTimeoutError, Sender, bounded, select};
use parking_lot::Mutex;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::{self, ThreadId};
use std::time::{Duration, Instant};
use tracing::{debug, info, trace, warn};

use super::client::{BroadcastClient, BroadcastMessage};
use crate::config::BroadcastConfig;
use crate::tracker::Topic;
use crate::types::{
    BroadcastingEvent, CarInfo, ConnectionState, GraphicsSnapshot, RealtimeCarUpdate,
    RealtimeUpdate, TrackData,
};
use crate::{Result, StintError};

struct HubShared {
    connection_state: Topic<ConnectionState>,
    realtime_update: Topic<RealtimeUpdate>,
    entry_list: Topic<CarInfo>,
    track_data: Topic<TrackData>,
    broadcast_event: Topic<BroadcastingEvent>,
    realtime_car_update: Topic<RealtimeCarUpdate>,
    local_car_update: Topic<RealtimeCarUpdate>,
    /// Source of the local player's car id
    graphics: Topic<GraphicsSnapshot>,
    connected: AtomicBool,
}

impl HubShared {
    fn dispatch(&self, message: BroadcastMessage) {
        trace!(kind = message.kind(), "Broadcast message");
        match message {
            BroadcastMessage::ConnectionState(state) => {
                info!(
                    connection_id = state.connection_id,
                    success = state.connection_success,
                    readonly = state.is_readonly,
                    error = %state.error,
                    "Broadcast connection state changed"
                );
                self.connection_state.publish(state);
            }
            BroadcastMessage::RealtimeUpdate(update) => {
                self.realtime_update.publish(update);
            }
            BroadcastMessage::EntryList(car) => {
                self.entry_list.publish(car);
            }
            BroadcastMessage::TrackData(track) => {
                self.track_data.publish(track);
            }
            BroadcastMessage::BroadcastingEvent(event) => {
                self.broadcast_event.publish(event);
            }
            BroadcastMessage::RealtimeCarUpdate(update) => {
                let update = Arc::new(update);
                self.realtime_car_update.publish_arc(Arc::clone(&update));
                if self.is_local_car(&update) {
                    self.local_car_update.publish_arc(update);
                }
            }
        }
    }

    fn is_local_car(&self, update: &RealtimeCarUpdate) -> bool {
        self.graphics.latest().is_some_and(|graphics| graphics.player_car_id == i32::from(update.car_index))
    }

    /// Publish "no data" on every topic
    fn reset_all(&self) {
        self.connection_state.reset();
        self.realtime_update.reset();
        self.entry_list.reset();
        self.track_data.reset();
        self.broadcast_event.reset();
        self.realtime_car_update.reset();
        self.local_car_update.reset();
        debug!("Broadcast topics reset to defaults");
    }

    fn close_all(&self) {
        self.connection_state.close();
        self.realtime_update.close();
        self.entry_list.close();
        self.track_data.close();
        self.broadcast_event.close();
        self.realtime_car_update.close();
        self.local_car_update.close();
    }
}

struct Connection {
    client: Arc<dyn BroadcastClient>,
    stop_tx: Sender<()>,
    done_rx: Receiver<()>,
    worker: ThreadId,
}

/// Publish/subscribe adapter over a [`BroadcastClient`]
///
/// A drain thread forwards every client event to its topic. Data requests are
/// rate limited to one per cool-down, and a disconnect (explicit, or the
/// client's channel closing) resets every topic to its default so consumers
/// never hold stale values across a reconnect.
pub struct BroadcastHub {
    shared: Arc<HubShared>,
    request_cooldown: Duration,
    poll_timeout: Duration,
    join_timeout: Duration,
    last_request: Mutex<Option<Instant>>,
    connection: Mutex<Option<Connection>>,
}

impl BroadcastHub {
    /// Create a disconnected hub
    ///
    /// `graphics` supplies the player car id for the local car topic.
    pub fn new(graphics: Topic<GraphicsSnapshot>, config: &BroadcastConfig, join_timeout: Duration) -> Self {
        Self {
            shared: Arc::new(HubShared {
                connection_state: Topic::new("connection_state"),
                realtime_update: Topic::new("realtime_update"),
                entry_list: Topic::new("entry_list"),
                track_data: Topic::new("track_data"),
                broadcast_event: Topic::new("broadcast_event"),
                realtime_car_update: Topic::new("realtime_car_update"),
                local_car_update: Topic::new("local_car_update"),
                graphics,
                connected: AtomicBool::new(false),
            }),
            request_cooldown: config.request_cooldown(),
            poll_timeout: config.poll_timeout(),
            join_timeout,
            last_request: Mutex::new(None),
            connection: Mutex::new(None),
        }
    }

    /// Attach a client and start draining its events
    ///
    /// An existing connection is disconnected first.
    pub fn connect(&self, client: Arc<dyn BroadcastClient>) -> Result<()> {
        if self.connection.lock().is_some() {
            self.disconnect();
        }

        let messages = client.messages();
        let (stop_tx, stop_rx) = bounded::<()>(1);
        let (done_tx, done_rx) = bounded::<()>(1);
        let shared = Arc::clone(&self.shared);
        let poll_timeout = self.poll_timeout;

        shared.connected.store(true, Ordering::Release);
        let spawned = thread::Builder::new().name("broadcast-drain".into()).spawn(move || {
            let _done = done_tx;
            loop {
                select! {
                    recv(stop_rx) -> _ => break,
                    recv(messages) -> message => match message {
                        // A stop raised while this message was in flight wins
                        Ok(_) if !stop_rx.is_empty() => break,
                        Ok(message) => shared.dispatch(message),
                        Err(_) => {
                            info!("Broadcast client channel closed");
                            shared.connected.store(false, Ordering::Release);
                            shared.reset_all();
                            break;
                        }
                    },
                    default(poll_timeout) => trace!("Broadcast client idle"),
                }
            }
            debug!("Broadcast drain thread finished");
        });

        let handle = match spawned {
            Ok(handle) => handle,
            Err(e) => {
                self.shared.connected.store(false, Ordering::Release);
                return Err(StintError::thread_spawn("broadcast-drain", e));
            }
        };

        *self.connection.lock() = Some(Connection { client, stop_tx, done_rx, worker: handle.thread().id() });
        info!(poll_timeout_ms = self.poll_timeout.as_millis() as u64, "Broadcast hub connected");
        Ok(())
    }

    /// Shut the client down, stop the drain thread and reset every topic
    ///
    /// Returns whether the drain thread stopped within the join bound.
    pub fn disconnect(&self) -> bool {
        let connection = self.connection.lock().take();
        let stopped = match connection {
            Some(connection) => {
                let _ = connection.stop_tx.try_send(());
                connection.client.shutdown();
                if connection.worker == thread::current().id() {
                    false
                } else {
                    matches!(
                        connection.done_rx.recv_timeout(self.join_timeout),
                        Ok(()) | Err(RecvTimeoutError::Disconnected)
                    )
                }
            }
            None => true,
        };

        self.shared.connected.store(false, Ordering::Release);
        self.shared.reset_all();
        *self.last_request.lock() = None;
        info!(stopped, "Broadcast hub disconnected");
        stopped
    }

    pub fn is_connected(&self) -> bool {
        self.shared.connected.load(Ordering::Acquire)
    }

    /// Forward a data request unless one was sent within the cool-down
    ///
    /// Returns whether the request reached the client.
    pub fn request_data(&self) -> bool {
        let mut last_request = self.last_request.lock();
        if (*last_request).is_some_and(|last| last.elapsed() < self.request_cooldown) {
            trace!("Data request suppressed by cool-down");
            return false;
        }

        let connection = self.connection.lock();
        let Some(connection) = connection.as_ref().filter(|_| self.is_connected()) else {
            trace!("Data request without a connected client");
            return false;
        };

        *last_request = Some(Instant::now());
        match connection.client.request_data() {
            Ok(()) => {
                debug!("Broadcast data requested");
                true
            }
            Err(e) => {
                warn!(error = %e, "Broadcast data request failed");
                false
            }
        }
    }

    pub fn connection_state(&self) -> &Topic<ConnectionState> {
        &self.shared.connection_state
    }

    pub fn realtime_update(&self) -> &Topic<RealtimeUpdate> {
        &self.shared.realtime_update
    }

    pub fn entry_list(&self) -> &Topic<CarInfo> {
        &self.shared.entry_list
    }

    pub fn track_data(&self) -> &Topic<TrackData> {
        &self.shared.track_data
    }

    pub fn broadcast_event(&self) -> &Topic<BroadcastingEvent> {
        &self.shared.broadcast_event
    }

    pub fn realtime_car_update(&self) -> &Topic<RealtimeCarUpdate> {
        &self.shared.realtime_car_update
    }

    /// Per-car updates for the local player's car only
    pub fn local_car_update(&self) -> &Topic<RealtimeCarUpdate> {
        &self.shared.local_car_update
    }

    /// Disconnect and close every topic
    pub fn shutdown(&self) -> bool {
        let stopped = if self.connection.lock().is_some() { self.disconnect() } else { true };
        self.shared.close_all();
        stopped
    }
}

impl Drop for BroadcastHub {
    fn drop(&mut self) {
        self.shutdown();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::broadcast::ChannelClient;
    use crate::test_utils::wait_until;

    fn hub_with(cooldown_ms: u64) -> (BroadcastHub, Topic<GraphicsSnapshot>) {
        let graphics = Topic::new("graphics");
        let config = BroadcastConfig { request_cooldown_ms: cooldown_ms, poll_timeout_ms: 5 };
        (BroadcastHub::new(graphics.clone(), &config, Duration::from_millis(100)), graphics)
    }

    #[test]
    fn request_data_is_rate_limited() {
        let (hub, _graphics) = hub_with(60_000);
        let (client, _tx) = ChannelClient::new();
        let client = Arc::new(client);
        hub.connect(client.clone()).unwrap();

        assert!(hub.request_data());
        assert!(!hub.request_data());
        assert!(!hub.request_data());
        assert_eq!(client.requests(), 1);
    }

    #[test]
    fn request_data_without_client_is_dropped() {
        let (hub, _graphics) = hub_with(10);
        assert!(!hub.request_data());
    }

    #[test]
    fn local_car_updates_match_player_car_id() {
        let (hub, graphics) = hub_with(5000);
        graphics.publish(GraphicsSnapshot { player_car_id: 7, ..Default::default() });

        let (client, tx) = ChannelClient::new();
        hub.connect(Arc::new(client)).unwrap();

        for car_index in [3u16, 7, 12] {
            tx.send(BroadcastMessage::RealtimeCarUpdate(RealtimeCarUpdate { car_index, ..Default::default() }))
                .unwrap();
        }

        assert!(wait_until(Duration::from_secs(2), || hub.realtime_car_update().published() == 3));
        assert_eq!(hub.local_car_update().published(), 1);
        assert_eq!(hub.local_car_update().latest().unwrap().car_index, 7);
    }

    #[test]
    fn disconnect_resets_all_topics() {
        let (hub, _graphics) = hub_with(5000);
        let (client, tx) = ChannelClient::new();
        let client = Arc::new(client);
        hub.connect(client.clone()).unwrap();

        tx.send(BroadcastMessage::TrackData(TrackData { track_name: "monza".into(), ..Default::default() }))
            .unwrap();
        tx.send(BroadcastMessage::ConnectionState(ConnectionState {
            connection_id: 4,
            connection_success: true,
            ..Default::default()
        }))
        .unwrap();
        assert!(wait_until(Duration::from_secs(2), || hub.connection_state().published() == 1));
        assert_eq!(hub.track_data().latest().unwrap().track_name, "monza");

        assert!(hub.disconnect());
        assert!(client.is_shut_down());
        assert!(!hub.is_connected());
        assert_eq!(*hub.track_data().latest().unwrap(), TrackData::default());
        assert_eq!(*hub.connection_state().latest().unwrap(), ConnectionState::default());
        assert_eq!(*hub.local_car_update().latest().unwrap(), RealtimeCarUpdate::default());
    }

    #[test]
    fn closed_channel_counts_as_disconnect() {
        let (hub, _graphics) = hub_with(5000);
        let (client, tx) = ChannelClient::new();
        hub.connect(Arc::new(client)).unwrap();
        assert!(hub.is_connected());

        tx.send(BroadcastMessage::RealtimeUpdate(RealtimeUpdate { session_index: 2, ..Default::default() }))
            .unwrap();
        assert!(wait_until(Duration::from_secs(2), || hub.realtime_update().published() == 1));

        drop(tx);
        assert!(wait_until(Duration::from_secs(2), || !hub.is_connected()));
        assert_eq!(hub.realtime_update().latest().unwrap().session_index, 0);
    }

    #[test]
    fn disconnect_does_not_wait_out_the_poll_timeout() {
        let graphics = Topic::new("graphics");
        let config = BroadcastConfig { request_cooldown_ms: 5000, poll_timeout_ms: 2_000 };
        let hub = BroadcastHub::new(graphics, &config, Duration::from_secs(5));

        for _ in 0..20 {
            let (client, _tx) = ChannelClient::new();
            hub.connect(Arc::new(client)).unwrap();
            let started = Instant::now();
            assert!(hub.disconnect());
            assert!(started.elapsed() < Duration::from_millis(500), "disconnect took {:?}", started.elapsed());
        }
    }

    #[test]
    fn no_dispatch_after_disconnect_returns() {
        let (hub, _graphics) = hub_with(5000);
        let (client, tx) = ChannelClient::new();
        hub.connect(Arc::new(client)).unwrap();

        assert!(hub.disconnect());
        // The drain thread is gone, so the send may find no receiver
        let _ = tx.send(BroadcastMessage::TrackData(TrackData { track_name: "zolder".into(), ..Default::default() }));
        std::thread::sleep(Duration::from_millis(30));
        assert_eq!(*hub.track_data().latest().unwrap(), TrackData::default());
    }

    #[test]
    fn requests_stop_once_the_client_channel_closes() {
        let (hub, _graphics) = hub_with(0);
        let (client, tx) = ChannelClient::new();
        let client = Arc::new(client);
        hub.connect(client.clone()).unwrap();
        assert!(hub.request_data());

        drop(tx);
        assert!(wait_until(Duration::from_secs(2), || !hub.is_connected()));
        assert!(!hub.request_data());
        assert_eq!(client.requests(), 1);
    }
}
