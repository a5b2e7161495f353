//! Transport layer for Lupus.
//!
//! A room is a named pub/sub channel with two logical topics: the Host's
//! broadcasts to everyone, and players' intents addressed to the Host.
//! This crate knows nothing about the messages themselves. It moves opaque
//! byte payloads between the members of a room and tells each member who
//! else is subscribed (presence).
//!
//! - [`Broker`] / [`Link`]: the abstraction over concrete pub/sub backends.
//! - [`MemoryBroker`]: an in-process hub for tests and single-process tables.
//! - [`RelayServer`] / [`WsBroker`]: a WebSocket relay and its client
//!   (feature `websocket`, on by default).
//! - [`RoomChannel`]: a joined room with bounded-time subscribe and presence.
//! - [`StatusTracker`]: the 4-state connection status observed by the UI.
//!
//! Every broker delivers a member's own publications back to it
//! (self-delivery).

#![allow(async_fn_in_trait)]

mod channel;
mod error;
mod memory;
#[cfg(feature = "websocket")]
mod relay;
mod status;
#[cfg(feature = "websocket")]
mod websocket;

pub use channel::{ChannelConfig, RoomChannel};
pub use error::TransportError;
pub use memory::{MemoryBroker, MemoryLink};
#[cfg(feature = "websocket")]
pub use relay::{RelayFrame, RelayServer};
pub use status::{ConnectionStatus, StatusTracker};
#[cfg(feature = "websocket")]
pub use websocket::{WsBroker, WsLink};

use std::fmt;
use std::future::Future;

use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

/// The two logical topics of a room channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Topic {
    /// Host → all members.
    HostBroadcast,
    /// Player → Host.
    PlayerMessage,
}

impl fmt::Display for Topic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::HostBroadcast => write!(f, "host->all"),
            Self::PlayerMessage => write!(f, "player->host"),
        }
    }
}

/// A payload delivered on a topic, stamped with the publishing member.
///
/// `from` is filled in by the broker, not by the publisher, so receivers
/// can trust it as the sender's identity within the room.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    pub topic: Topic,
    pub from: String,
    pub payload: Vec<u8>,
}

/// Everything a subscriber can observe on its room channel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChannelEvent {
    /// A published payload.
    Frame(Frame),
    /// The full, current member list of the room.
    Presence(Vec<String>),
    /// The broker dropped this subscription.
    Closed,
}

/// A confirmed subscription: the publishing half and the event stream.
pub struct Subscription<L> {
    pub link: L,
    pub events: mpsc::UnboundedReceiver<ChannelEvent>,
}

/// Room-scoped publish/subscribe backend.
///
/// The futures are declared `Send` so runtimes can drive them from
/// spawned tasks without knowing the concrete broker.
pub trait Broker: Send + Sync + 'static {
    /// The publishing half handed out per subscription.
    type Link: Link;

    /// Subscribes `member` to `room`. Resolves once the broker has
    /// confirmed the subscription.
    fn subscribe(
        &self,
        room: &str,
        member: &str,
    ) -> impl Future<Output = Result<Subscription<Self::Link>, TransportError>> + Send;
}

/// The publishing half of a subscription.
pub trait Link: Send + Sync + 'static {
    /// Publishes `payload` on `topic`. Returns once the transport accepted
    /// it; remote delivery is not guaranteed.
    fn publish(
        &self,
        topic: Topic,
        payload: &[u8],
    ) -> impl Future<Output = Result<(), TransportError>> + Send;

    /// Unsubscribes from the room.
    fn leave(&self) -> impl Future<Output = Result<(), TransportError>> + Send;
}
