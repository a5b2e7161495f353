//! A joined room channel.

use std::collections::BTreeSet;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

use crate::{Broker, ChannelEvent, Link, StatusTracker, Topic, TransportError};

/// Settings for joining a room channel.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChannelConfig {
    /// How long to wait for the broker to confirm the subscription.
    pub subscribe_timeout: Duration,
}

impl Default for ChannelConfig {
    fn default() -> Self {
        Self {
            subscribe_timeout: Duration::from_secs(8),
        }
    }
}

/// One member's view of a room channel: the publishing link, the status
/// tracker shared with the replica, and the presence set.
///
/// The event stream is handed back separately by [`RoomChannel::join`] so
/// the owning actor can poll it in its own `select!` loop.
pub struct RoomChannel<L: Link> {
    room_code: String,
    self_id: String,
    link: L,
    status: StatusTracker,
    members: BTreeSet<String>,
}

impl<L: Link> RoomChannel<L> {
    /// Subscribes `self_id` to `room_code` within `config.subscribe_timeout`.
    ///
    /// On timeout or broker error the status becomes `Disconnected` and the
    /// join fails; nothing is left subscribed.
    pub async fn join<B>(
        broker: &B,
        room_code: &str,
        self_id: &str,
        config: &ChannelConfig,
        status: StatusTracker,
    ) -> Result<(Self, mpsc::UnboundedReceiver<ChannelEvent>), TransportError>
    where
        B: Broker<Link = L>,
    {
        tracing::debug!(room_code, self_id, "joining room channel");

        let subscribed = tokio::time::timeout(
            config.subscribe_timeout,
            broker.subscribe(room_code, self_id),
        )
        .await;

        let subscription = match subscribed {
            Ok(Ok(sub)) => sub,
            Ok(Err(e)) => {
                tracing::warn!(room_code, self_id, error = %e, "subscribe failed");
                status.mark_disconnected();
                return Err(e);
            }
            Err(_) => {
                tracing::warn!(
                    room_code,
                    self_id,
                    timeout = ?config.subscribe_timeout,
                    "subscribe timed out"
                );
                status.mark_disconnected();
                return Err(TransportError::SubscribeTimeout {
                    room: room_code.to_string(),
                    after: config.subscribe_timeout,
                });
            }
        };

        tracing::info!(room_code, self_id, "joined room channel");

        let channel = Self {
            room_code: room_code.to_string(),
            self_id: self_id.to_string(),
            link: subscription.link,
            status,
            members: BTreeSet::new(),
        };
        Ok((channel, subscription.events))
    }

    pub fn room_code(&self) -> &str {
        &self.room_code
    }

    pub fn self_id(&self) -> &str {
        &self.self_id
    }

    pub fn status(&self) -> &StatusTracker {
        &self.status
    }

    /// Fire-and-forget publish. Failures are logged and returned; the
    /// caller decides whether they matter.
    pub async fn send(&self, topic: Topic, payload: &[u8]) -> Result<(), TransportError> {
        let result = self.link.publish(topic, payload).await;
        if let Err(e) = &result {
            tracing::warn!(
                room_code = %self.room_code,
                %topic,
                error = %e,
                "publish failed"
            );
        }
        result
    }

    pub fn mark_as_syncing(&self) {
        self.status.mark_as_syncing();
    }

    pub fn mark_as_live(&self) {
        self.status.mark_as_live();
    }

    /// Replaces the presence set with the broker's latest member list.
    pub fn apply_presence(&mut self, members: Vec<String>) {
        let next: BTreeSet<String> = members.into_iter().collect();
        for joined in next.difference(&self.members) {
            tracing::debug!(room_code = %self.room_code, member = %joined, "member present");
        }
        for left in self.members.difference(&next) {
            tracing::debug!(room_code = %self.room_code, member = %left, "member gone");
        }
        self.members = next;
    }

    /// Members currently subscribed to the room.
    pub fn members(&self) -> Vec<String> {
        self.members.iter().cloned().collect()
    }

    pub fn is_present(&self, member: &str) -> bool {
        self.members.contains(member)
    }

    /// Leaves the room and marks the channel disconnected.
    pub async fn leave(&mut self) -> Result<(), TransportError> {
        self.members.clear();
        self.status.mark_disconnected();
        let result = self.link.leave().await;
        tracing::info!(room_code = %self.room_code, self_id = %self.self_id, "left room channel");
        result
    }
}
