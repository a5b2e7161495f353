//! In-process broker.
//!
//! All rooms live in one shared hub guarded by a Tokio mutex. Publishing
//! fans the frame out to every member of the room, the publisher included.
//! The hub also carries a few switches for simulating a bad network:
//! failing a member's publishes, muting deliveries to a member, and
//! stalling new subscriptions.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::Arc;

use tokio::sync::{Mutex, mpsc};

use crate::{Broker, ChannelEvent, Frame, Link, Subscription, Topic, TransportError};

type MemberSender = mpsc::UnboundedSender<ChannelEvent>;

#[derive(Default)]
struct Hub {
    /// room → member → event sender.
    rooms: HashMap<String, BTreeMap<String, MemberSender>>,
    failing_publishers: HashSet<String>,
    muted_members: HashSet<String>,
    stall_subscriptions: bool,
}

impl Hub {
    /// Sends the current member list to everyone in `room`.
    fn announce_presence(&self, room: &str) {
        let Some(members) = self.rooms.get(room) else {
            return;
        };
        let names: Vec<String> = members.keys().cloned().collect();
        for tx in members.values() {
            let _ = tx.send(ChannelEvent::Presence(names.clone()));
        }
    }
}

/// An in-process [`Broker`]. Clones share the same hub.
#[derive(Clone, Default)]
pub struct MemoryBroker {
    hub: Arc<Mutex<Hub>>,
}

impl MemoryBroker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes every publish by `member` fail with `SendFailed`.
    pub async fn fail_publishes(&self, member: &str, failing: bool) {
        let mut hub = self.hub.lock().await;
        if failing {
            hub.failing_publishers.insert(member.to_string());
        } else {
            hub.failing_publishers.remove(member);
        }
    }

    /// Silently drops every frame addressed to `member` (lossy network).
    pub async fn mute(&self, member: &str, muted: bool) {
        let mut hub = self.hub.lock().await;
        if muted {
            hub.muted_members.insert(member.to_string());
        } else {
            hub.muted_members.remove(member);
        }
    }

    /// New subscriptions never get confirmed while this is set.
    pub async fn stall_subscriptions(&self, stalled: bool) {
        self.hub.lock().await.stall_subscriptions = stalled;
    }

    /// Drops every subscription to `room`, as if the backend went away.
    pub async fn close_room(&self, room: &str) {
        let mut hub = self.hub.lock().await;
        if let Some(members) = hub.rooms.remove(room) {
            for tx in members.values() {
                let _ = tx.send(ChannelEvent::Closed);
            }
            tracing::debug!(room, members = members.len(), "memory room closed");
        }
    }

    /// Current members of `room`.
    pub async fn members(&self, room: &str) -> Vec<String> {
        self.hub
            .lock()
            .await
            .rooms
            .get(room)
            .map(|m| m.keys().cloned().collect())
            .unwrap_or_default()
    }
}

impl Broker for MemoryBroker {
    type Link = MemoryLink;

    async fn subscribe(
        &self,
        room: &str,
        member: &str,
    ) -> Result<Subscription<MemoryLink>, TransportError> {
        let stalled = self.hub.lock().await.stall_subscriptions;
        if stalled {
            // The broker never answers; the caller's timeout decides.
            std::future::pending::<()>().await;
        }

        let (tx, rx) = mpsc::unbounded_channel();
        {
            let mut hub = self.hub.lock().await;
            let members = hub.rooms.entry(room.to_string()).or_default();
            if members.insert(member.to_string(), tx).is_some() {
                tracing::debug!(room, member, "memory subscription replaced");
            }
            hub.announce_presence(room);
        }

        Ok(Subscription {
            link: MemoryLink {
                broker: self.clone(),
                room: room.to_string(),
                member: member.to_string(),
            },
            events: rx,
        })
    }
}

/// Publishing half of a [`MemoryBroker`] subscription.
pub struct MemoryLink {
    broker: MemoryBroker,
    room: String,
    member: String,
}

impl Link for MemoryLink {
    async fn publish(&self, topic: Topic, payload: &[u8]) -> Result<(), TransportError> {
        let hub = self.broker.hub.lock().await;
        if hub.failing_publishers.contains(&self.member) {
            return Err(TransportError::send_failed("publish rejected by broker"));
        }
        let members = hub
            .rooms
            .get(&self.room)
            .filter(|m| m.contains_key(&self.member))
            .ok_or_else(|| {
                TransportError::ConnectionClosed(format!(
                    "{} is not subscribed to {}",
                    self.member, self.room
                ))
            })?;

        for (name, tx) in members {
            if hub.muted_members.contains(name) {
                continue;
            }
            let _ = tx.send(ChannelEvent::Frame(Frame {
                topic,
                from: self.member.clone(),
                payload: payload.to_vec(),
            }));
        }
        Ok(())
    }

    async fn leave(&self) -> Result<(), TransportError> {
        let mut hub = self.broker.hub.lock().await;
        let removed = hub
            .rooms
            .get_mut(&self.room)
            .and_then(|m| m.remove(&self.member))
            .is_some();
        if removed {
            if hub.rooms.get(&self.room).is_some_and(|m| m.is_empty()) {
                hub.rooms.remove(&self.room);
            } else {
                hub.announce_presence(&self.room);
            }
        }
        Ok(())
    }
}
