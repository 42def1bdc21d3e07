//! Broadcast feed adapter.
//!
//! The simulator's broadcast client pushes session events (connection state,
//! realtime updates, entry list, track data, broadcasting events and per-car
//! updates). [`BroadcastHub`] republishes each kind on its own
//! [`Topic`](crate::tracker::Topic), derives the local car stream, rate limits
//! data requests and resets everything to defaults on disconnect.

mod client;
mod hub;

pub use client::{BroadcastClient, BroadcastMessage, ChannelClient};
pub use hub::BroadcastHub;
