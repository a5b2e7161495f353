//! State and plumbing shared by the host and player actors.

use lupus_protocol::{
    ActionExtra, Codec, JsonCodec, PlayerMessage, RoleId, Seat, Uid,
};
use lupus_session::{Replica, ReplicaEvent};
use lupus_transport::{Link, RoomChannel, Topic};
use tokio::sync::broadcast;

use crate::{ClientView, LupusError, RoomEvent};

/// Capacity of the [`RoomEvent`] broadcast channel. Slow listeners lag
/// rather than block the actor.
pub(crate) const EVENT_CAPACITY: usize = 64;

/// One participant's channel, replica and event fan-out.
pub(crate) struct ClientCore<L: Link> {
    pub(crate) uid: Uid,
    pub(crate) channel: RoomChannel<L>,
    pub(crate) replica: Replica,
    pub(crate) codec: JsonCodec,
    pub(crate) events: broadcast::Sender<RoomEvent>,
}

impl<L: Link> ClientCore<L> {
    pub(crate) fn view(&self) -> ClientView {
        ClientView::of(&self.replica)
    }

    /// Encodes and publishes an intent on the player→host topic.
    pub(crate) async fn send_intent(&self, msg: &PlayerMessage) -> Result<(), LupusError> {
        let bytes = self.codec.encode(msg)?;
        self.channel.send(Topic::PlayerMessage, &bytes).await?;
        Ok(())
    }

    /// Publishes public events for outside listeners. A send error only
    /// means nobody is listening.
    pub(crate) fn emit(&self, events: &[ReplicaEvent]) {
        for event in events {
            if let ReplicaEvent::Public(broadcast) = event {
                if let Some(room_event) = RoomEvent::from_broadcast(broadcast) {
                    let _ = self.events.send(room_event);
                }
            }
        }
    }

    fn seat(&self) -> Result<Seat, LupusError> {
        self.replica.my_seat().ok_or(LupusError::NotSeated)
    }

    fn role(&self) -> Result<RoleId, LupusError> {
        self.replica.private_view().role().ok_or(LupusError::NoRole)
    }

    /// Turns an intent into the message for this participant's seat.
    pub(crate) fn intent(&self, intent: Intent) -> Result<PlayerMessage, LupusError> {
        let seat = self.seat()?;
        Ok(match intent {
            Intent::Action { target, extra } => PlayerMessage::Action {
                seat,
                role: self.role()?,
                target,
                extra,
            },
            Intent::WolfVote { target } => PlayerMessage::WolfVote { seat, target },
            Intent::ViewedRole => PlayerMessage::ViewedRole { seat },
            Intent::RevealAck => PlayerMessage::RevealAck {
                seat,
                role: self.role()?,
                revision: self.replica.last_applied().unwrap_or(0),
            },
        })
    }
}

/// A seat-bound intent, before the seat and role are filled in.
#[derive(Debug)]
pub(crate) enum Intent {
    Action {
        target: Option<Seat>,
        extra: Option<ActionExtra>,
    },
    WolfVote {
        target: Seat,
    },
    ViewedRole,
    RevealAck,
}
