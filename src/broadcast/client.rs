//! Broadcast client abstraction and an in-process channel client

use crossbeam_channel::{Receiver, Sender, unbounded};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use tracing::{debug, trace};

use crate::types::{
    BroadcastingEvent, CarInfo, ConnectionState, RealtimeCarUpdate, RealtimeUpdate, TrackData,
};
use crate::{Result, StintError};

/// One event delivered by a broadcast client
#[derive(Debug, Clone, PartialEq)]
pub enum BroadcastMessage {
    ConnectionState(ConnectionState),
    RealtimeUpdate(RealtimeUpdate),
    EntryList(CarInfo),
    TrackData(TrackData),
    BroadcastingEvent(BroadcastingEvent),
    RealtimeCarUpdate(RealtimeCarUpdate),
}

impl BroadcastMessage {
    /// Short kind name for logs
    pub fn kind(&self) -> &'static str {
        match self {
            BroadcastMessage::ConnectionState(_) => "connection_state",
            BroadcastMessage::RealtimeUpdate(_) => "realtime_update",
            BroadcastMessage::EntryList(_) => "entry_list",
            BroadcastMessage::TrackData(_) => "track_data",
            BroadcastMessage::BroadcastingEvent(_) => "broadcast_event",
            BroadcastMessage::RealtimeCarUpdate(_) => "realtime_car_update",
        }
    }
}

/// Event-based client for the simulator's broadcast feed
///
/// The wire protocol lives behind this trait. The hub drains
/// [`messages`](Self::messages) on its own thread; when every sender of that
/// channel is gone the hub treats the client as disconnected.
pub trait BroadcastClient: Send + Sync + 'static {
    /// Receiving end of the client's event channel
    fn messages(&self) -> Receiver<BroadcastMessage>;

    /// Ask the simulator to resend entry list and track data
    fn request_data(&self) -> Result<()>;

    /// Close the connection; further calls are no-ops
    fn shutdown(&self);
}

/// Client fed from an in-process channel, for replays and tests
#[derive(Debug)]
pub struct ChannelClient {
    rx: Receiver<BroadcastMessage>,
    requests: AtomicU64,
    shut_down: AtomicBool,
}

impl ChannelClient {
    /// Create a client and the sender that feeds it
    pub fn new() -> (Self, Sender<BroadcastMessage>) {
        let (tx, rx) = unbounded();
        (Self { rx, requests: AtomicU64::new(0), shut_down: AtomicBool::new(false) }, tx)
    }

    /// Number of data requests forwarded to this client
    pub fn requests(&self) -> u64 {
        self.requests.load(Ordering::Relaxed)
    }

    pub fn is_shut_down(&self) -> bool {
        self.shut_down.load(Ordering::Acquire)
    }
}

impl BroadcastClient for ChannelClient {
    fn messages(&self) -> Receiver<BroadcastMessage> {
        self.rx.clone()
    }

    fn request_data(&self) -> Result<()> {
        if self.is_shut_down() {
            return Err(StintError::connection_failed("broadcast client is shut down"));
        }
        let n = self.requests.fetch_add(1, Ordering::Relaxed) + 1;
        trace!(requests = n, "Data requested");
        Ok(())
    }

    fn shutdown(&self) {
        if !self.shut_down.swap(true, Ordering::AcqRel) {
            debug!("Channel broadcast client shut down");
        }
    }
}
