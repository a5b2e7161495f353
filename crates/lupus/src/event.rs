//! Notifications for layers outside the core (audio, toasts).

use lupus_protocol::{
    BroadcastGameState, HostBroadcast, RoleId, Seat, StepId, Uid,
};
use lupus_session::{PrivateView, Replica};

/// A room happening worth reacting to, published on the client's
/// `broadcast` channel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RoomEvent {
    /// A night step began; `pending_seats` is only filled for the wolves.
    RoleTurn {
        role: RoleId,
        pending_seats: Vec<Seat>,
        step_id: Option<StepId>,
    },
    NightEnded { deaths: Vec<Seat> },
    Restarted,
    PlayerJoined { seat: Seat, uid: Uid },
    PlayerLeft { seat: Seat },
}

impl RoomEvent {
    /// The event a public broadcast announces, if any.
    pub(crate) fn from_broadcast(broadcast: &HostBroadcast) -> Option<Self> {
        match broadcast {
            HostBroadcast::RoleTurn {
                role,
                pending_seats,
                step_id,
                ..
            } => Some(Self::RoleTurn {
                role: *role,
                pending_seats: pending_seats.clone(),
                step_id: *step_id,
            }),
            HostBroadcast::NightEnd { deaths } => Some(Self::NightEnded {
                deaths: deaths.clone(),
            }),
            HostBroadcast::GameRestarted => Some(Self::Restarted),
            HostBroadcast::PlayerJoined { seat, player } => Some(Self::PlayerJoined {
                seat: *seat,
                uid: player.uid.clone(),
            }),
            HostBroadcast::PlayerLeft { seat } => Some(Self::PlayerLeft { seat: *seat }),
            _ => None,
        }
    }
}

/// A copy of what a participant currently sees.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientView {
    pub uid: Uid,
    pub state: Option<BroadcastGameState>,
    pub revision: Option<u64>,
    pub my_seat: Option<Seat>,
    pub private: PrivateView,
}

impl ClientView {
    pub(crate) fn of(replica: &Replica) -> Self {
        Self {
            uid: replica.uid().clone(),
            state: replica.state().cloned(),
            revision: replica.last_applied(),
            my_seat: replica.my_seat(),
            private: replica.private_view().clone(),
        }
    }

    /// The dealt role, once the `ROLE_CARD` arrived.
    pub fn role(&self) -> Option<RoleId> {
        self.private.role()
    }
}
