//! The Host's client: owns the authoritative room.
//!
//! One Tokio task (the host actor) owns the [`HostRoom`], the channel and
//! the Host's own replica. [`HostClient`] is a cheap handle that sends it
//! commands and awaits the replies.
//!
//! ```text
//! player frame ──→ HostRoom ──→ envelopes ─┬─→ channel (host→all)
//! host command ──↗                          └─→ own replica (local delivery)
//! ```
//!
//! The Host's replica is fed directly instead of relying on the broker's
//! self-delivery, so the Host sees its own private messages on every
//! transport. Host-topic frames coming back from the broker are ignored.
//!
//! ## Lifecycle
//!
//! [`HostClient::initialize_as_host`] builds the room first, so a bad
//! template fails before anything touches the network. It then joins the
//! channel and spawns the actor, whose first act is to publish revision 1.
//! Players that joined earlier and are waiting on a snapshot pick that
//! update up like any other.
//!
//! The actor runs until [`HostClient::leave_room`] is called or every
//! handle is dropped, and leaves the channel on the way out. If the channel
//! closes first, the actor stays up with the status `Disconnected`: the
//! room still answers commands, but nothing reaches the players.
//!
//! The Host's own seat requests never wait on the network. They are
//! applied to the room and settled from the same batch, before the command
//! returns.
//!
//! ## The Host as a player
//!
//! The Host may sit at its own table. Its seat requests and night actions
//! go through the same [`HostRoom::handle_player_message`] path as
//! everyone else's, stamped with the Host's uid, so the rules cannot tell
//! the difference.

use std::ops::ControlFlow;

use lupus_protocol::{
    ActionExtra, Codec, HostEnvelope, JsonCodec, PlayerMessage, RequestId, RoleId, RoomCode,
    Seat, SeatAction, Uid,
};
use lupus_room::HostRoom;
use lupus_session::{Replica, ReplicaEvent, SessionError};
use lupus_transport::{
    Broker, ChannelEvent, ConnectionStatus, Frame, Link, RoomChannel, StatusTracker, Topic,
};
use tokio::sync::{broadcast, mpsc, oneshot, watch};
use tokio::time::Instant;

use crate::core::{ClientCore, EVENT_CAPACITY, Intent};
use crate::{ClientConfig, ClientView, LupusError, RoomEvent};

type Reply<T> = oneshot::Sender<Result<T, LupusError>>;

/// Operations only the Host may run.
#[derive(Debug, Clone, Copy)]
enum HostOp {
    AssignRoles,
    StartNight,
    RestartGame,
    EmergencyRestart,
    SetAudioPlaying(bool),
}

enum HostCommand {
    TakeSeat {
        seat: Seat,
        display_name: Option<String>,
        avatar_url: Option<String>,
        reply: Reply<Seat>,
    },
    LeaveSeat {
        reply: Reply<Seat>,
    },
    Intent {
        intent: Intent,
        reply: Reply<()>,
    },
    Host {
        op: HostOp,
        reply: Reply<()>,
    },
    RequestSnapshot {
        reply: Reply<()>,
    },
    View {
        reply: oneshot::Sender<ClientView>,
    },
    Members {
        reply: oneshot::Sender<Vec<String>>,
    },
    Leave {
        reply: Reply<()>,
    },
}

/// Handle to a running host actor.
///
/// Cheap to clone. Once [`HostClient::leave_room`] has run, every call
/// fails with [`LupusError::Unavailable`].
#[derive(Clone)]
pub struct HostClient {
    uid: Uid,
    room_code: RoomCode,
    commands: mpsc::Sender<HostCommand>,
    events: broadcast::Sender<RoomEvent>,
    status: StatusTracker,
}

impl HostClient {
    /// Creates the room, joins its channel and starts the host actor.
    ///
    /// The step registry is validated before anything is joined, so a bad
    /// template fails here rather than mid-night.
    pub async fn initialize_as_host<B: Broker>(
        broker: &B,
        room_code: RoomCode,
        host_uid: Uid,
        template: Vec<RoleId>,
        config: ClientConfig,
    ) -> Result<Self, LupusError> {
        let room = HostRoom::new(room_code.clone(), host_uid.clone(), template, config.room.clone())?;

        let status = StatusTracker::new();
        let (channel, channel_events) = RoomChannel::join(
            broker,
            room_code.as_str(),
            host_uid.as_str(),
            &config.channel,
            status.clone(),
        )
        .await?;

        let (commands_tx, commands_rx) = mpsc::channel(64);
        let (events_tx, _) = broadcast::channel(EVENT_CAPACITY);
        let actor = HostActor {
            core: ClientCore {
                uid: host_uid.clone(),
                channel,
                replica: Replica::new(host_uid.clone(), true, status.clone()),
                codec: JsonCodec,
                events: events_tx.clone(),
            },
            room,
            config,
            commands: commands_rx,
            channel_events,
            channel_open: true,
        };
        tokio::spawn(actor.run());

        tracing::info!(%room_code, %host_uid, "host initialized");
        Ok(Self {
            uid: host_uid,
            room_code,
            commands: commands_tx,
            events: events_tx,
            status,
        })
    }

    pub fn uid(&self) -> &Uid {
        &self.uid
    }

    pub fn room_code(&self) -> &RoomCode {
        &self.room_code
    }

    async fn call<T>(&self, make: impl FnOnce(oneshot::Sender<T>) -> HostCommand) -> Result<T, LupusError> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.commands
            .send(make(reply_tx))
            .await
            .map_err(|_| LupusError::Unavailable)?;
        reply_rx.await.map_err(|_| LupusError::Unavailable)
    }

    // -- Seats and intents ------------------------------------------------

    /// Sits the Host down at `seat`; resolves with the seat on success.
    pub async fn take_seat(
        &self,
        seat: Seat,
        display_name: Option<String>,
        avatar_url: Option<String>,
    ) -> Result<Seat, LupusError> {
        self.call(|reply| HostCommand::TakeSeat {
            seat,
            display_name,
            avatar_url,
            reply,
        })
        .await?
    }

    /// Gives up the Host's seat. Resolves with the seat that was left.
    pub async fn leave_seat(&self) -> Result<Seat, LupusError> {
        self.call(|reply| HostCommand::LeaveSeat { reply }).await?
    }

    async fn intent(&self, intent: Intent) -> Result<(), LupusError> {
        self.call(|reply| HostCommand::Intent { intent, reply }).await?
    }

    /// Acts for the Host's own role in the current step. A refusal arrives
    /// as the view's `last_rejection`.
    pub async fn submit_action(&self, target: Option<Seat>, extra: Option<ActionExtra>) -> Result<(), LupusError> {
        self.intent(Intent::Action { target, extra }).await
    }

    pub async fn submit_wolf_vote(&self, target: Seat) -> Result<(), LupusError> {
        self.intent(Intent::WolfVote { target }).await
    }

    pub async fn mark_viewed_role(&self) -> Result<(), LupusError> {
        self.intent(Intent::ViewedRole).await
    }

    pub async fn ack_reveal(&self) -> Result<(), LupusError> {
        self.intent(Intent::RevealAck).await
    }

    // -- Host operations --------------------------------------------------

    async fn host_op(&self, op: HostOp) -> Result<(), LupusError> {
        self.call(|reply| HostCommand::Host { op, reply }).await?
    }

    pub async fn assign_roles(&self) -> Result<(), LupusError> {
        self.host_op(HostOp::AssignRoles).await
    }

    pub async fn start_night(&self) -> Result<(), LupusError> {
        self.host_op(HostOp::StartNight).await
    }

    pub async fn restart_game(&self) -> Result<(), LupusError> {
        self.host_op(HostOp::RestartGame).await
    }

    pub async fn emergency_restart_and_reshuffle_roles(&self) -> Result<(), LupusError> {
        self.host_op(HostOp::EmergencyRestart).await
    }

    pub async fn set_audio_playing(&self, playing: bool) -> Result<(), LupusError> {
        self.host_op(HostOp::SetAudioPlaying(playing)).await
    }

    /// The Host already holds the truth, so this succeeds at once.
    pub async fn request_snapshot(&self) -> Result<(), LupusError> {
        self.call(|reply| HostCommand::RequestSnapshot { reply }).await?
    }

    // -- Observation ------------------------------------------------------

    pub async fn view(&self) -> Result<ClientView, LupusError> {
        self.call(|reply| HostCommand::View { reply }).await
    }

    pub fn status(&self) -> ConnectionStatus {
        self.status.current()
    }

    pub fn watch_status(&self) -> watch::Receiver<ConnectionStatus> {
        self.status.subscribe()
    }

    pub fn events(&self) -> broadcast::Receiver<RoomEvent> {
        self.events.subscribe()
    }

    /// Members currently present on the room channel.
    pub async fn members(&self) -> Result<Vec<String>, LupusError> {
        self.call(|reply| HostCommand::Members { reply }).await
    }

    /// Leaves the channel and stops the actor.
    pub async fn leave_room(&self) -> Result<(), LupusError> {
        self.call(|reply| HostCommand::Leave { reply }).await?
    }
}

// ---------------------------------------------------------------------------
// Actor
// ---------------------------------------------------------------------------

struct HostActor<L: Link> {
    core: ClientCore<L>,
    room: HostRoom,
    config: ClientConfig,
    commands: mpsc::Receiver<HostCommand>,
    channel_events: mpsc::UnboundedReceiver<ChannelEvent>,
    channel_open: bool,
}

impl<L: Link> HostActor<L> {
    async fn run(mut self) {
        tracing::info!(room_code = %self.room.room_code(), "host actor started");

        // First publication: everyone, the Host included, gets revision 1.
        let uid = self.core.uid.clone();
        let out = self
            .room
            .handle_player_message(&uid, PlayerMessage::RequestState { uid: uid.clone() });
        self.publish(out).await;

        loop {
            tokio::select! {
                cmd = self.commands.recv() => {
                    let Some(cmd) = cmd else {
                        // every handle dropped
                        let _ = self.shutdown().await;
                        break;
                    };
                    if self.handle_command(cmd).await.is_break() {
                        break;
                    }
                }
                event = self.channel_events.recv(), if self.channel_open => {
                    self.handle_channel_event(event).await;
                }
            }
        }

        tracing::info!(room_code = %self.room.room_code(), "host actor stopped");
    }

    async fn handle_command(&mut self, cmd: HostCommand) -> ControlFlow<()> {
        match cmd {
            HostCommand::TakeSeat {
                seat,
                display_name,
                avatar_url,
                reply,
            } => {
                let result = self.seat_action(SeatAction::Sit, seat, display_name, avatar_url).await;
                let _ = reply.send(result);
            }
            HostCommand::LeaveSeat { reply } => {
                let result = match self.core.replica.my_seat() {
                    Some(seat) => self.seat_action(SeatAction::Standup, seat, None, None).await,
                    None => Err(LupusError::NotSeated),
                };
                let _ = reply.send(result);
            }
            HostCommand::Intent { intent, reply } => {
                let result = match self.core.intent(intent) {
                    Ok(msg) => {
                        self.feed_own(msg).await;
                        Ok(())
                    }
                    Err(e) => Err(e),
                };
                let _ = reply.send(result);
            }
            HostCommand::Host { op, reply } => {
                let result = self.host_op(op).await;
                let _ = reply.send(result);
            }
            HostCommand::RequestSnapshot { reply } => {
                let timeout = self.config.replica.snapshot_timeout;
                let _ = self.core.replica.begin_snapshot(timeout, Instant::now());
                let _ = reply.send(Ok(()));
            }
            HostCommand::View { reply } => {
                let _ = reply.send(self.core.view());
            }
            HostCommand::Members { reply } => {
                let _ = reply.send(self.core.channel.members());
            }
            HostCommand::Leave { reply } => {
                let result = self.shutdown().await;
                let _ = reply.send(result);
                return ControlFlow::Break(());
            }
        }
        ControlFlow::Continue(())
    }

    async fn host_op(&mut self, op: HostOp) -> Result<(), LupusError> {
        let uid = self.core.uid.clone();
        let out = match op {
            HostOp::AssignRoles => self.room.assign_roles(&uid),
            HostOp::StartNight => self.room.start_night(&uid),
            HostOp::RestartGame => self.room.restart_game(&uid),
            HostOp::EmergencyRestart => self.room.emergency_restart_and_reshuffle_roles(&uid),
            HostOp::SetAudioPlaying(playing) => self.room.set_audio_playing(&uid, playing),
        }?;
        tracing::debug!(room_code = %self.room.room_code(), ?op, envelopes = out.len(), "host operation applied");
        self.publish(out).await;
        Ok(())
    }

    /// Runs a seat change through the room and settles it from the ACK the
    /// Host's own replica receives.
    async fn seat_action(
        &mut self,
        action: SeatAction,
        seat: Seat,
        display_name: Option<String>,
        avatar_url: Option<String>,
    ) -> Result<Seat, LupusError> {
        let timeout = self.config.replica.seat_request_timeout;
        let (request_id, msg) =
            self.core
                .replica
                .begin_seat_action(action, seat, display_name, avatar_url, timeout, Instant::now());
        let events = self.feed_own(msg).await;
        match seat_outcome(&events, &request_id) {
            Some(result) => Ok(result?),
            None => {
                self.core.replica.abandon_seat_action(&request_id);
                Err(SessionError::Disconnected.into())
            }
        }
    }

    /// Applies one of the Host's own intents without a transport round trip.
    async fn feed_own(&mut self, msg: PlayerMessage) -> Vec<ReplicaEvent> {
        let uid = self.core.uid.clone();
        let out = self.room.handle_player_message(&uid, msg);
        self.publish(out).await
    }

    /// Publishes every envelope on the host topic and hands it to the
    /// Host's own replica.
    async fn publish(&mut self, envelopes: Vec<HostEnvelope>) -> Vec<ReplicaEvent> {
        let mut events = Vec::new();
        for envelope in envelopes {
            match self.core.codec.encode(&envelope) {
                Ok(bytes) => {
                    // Failures are logged by the channel; replicas recover
                    // through snapshots.
                    let _ = self.core.channel.send(Topic::HostBroadcast, &bytes).await;
                }
                Err(e) => {
                    tracing::warn!(room_code = %self.room.room_code(), error = %e, "envelope encode failed");
                }
            }
            events.extend(self.core.replica.handle_envelope(envelope));
        }
        self.core.emit(&events);
        events
    }

    async fn handle_channel_event(&mut self, event: Option<ChannelEvent>) {
        match event {
            Some(ChannelEvent::Frame(frame)) => self.handle_frame(frame).await,
            Some(ChannelEvent::Presence(members)) => self.core.channel.apply_presence(members),
            Some(ChannelEvent::Closed) | None => {
                tracing::warn!(room_code = %self.room.room_code(), "room channel closed");
                self.channel_open = false;
                self.core.replica.status().mark_disconnected();
            }
        }
    }

    async fn handle_frame(&mut self, frame: Frame) {
        match frame.topic {
            Topic::HostBroadcast => {
                if frame.from != self.core.uid.as_str() {
                    tracing::warn!(
                        room_code = %self.room.room_code(),
                        from = %frame.from,
                        "host-topic frame from another member dropped"
                    );
                }
            }
            Topic::PlayerMessage => {
                if frame.from == self.core.uid.as_str() {
                    return;
                }
                let msg: PlayerMessage = match self.core.codec.decode(&frame.payload) {
                    Ok(msg) => msg,
                    Err(e) => {
                        tracing::debug!(from = %frame.from, error = %e, "undecodable intent dropped");
                        return;
                    }
                };
                let out = self.room.handle_player_message(&Uid::new(frame.from), msg);
                self.publish(out).await;
            }
        }
    }

    async fn shutdown(&mut self) -> Result<(), LupusError> {
        self.core.replica.clear_pending();
        if !self.channel_open {
            return Ok(());
        }
        self.channel_open = false;
        self.core.channel.leave().await?;
        Ok(())
    }
}

/// The settled result of `request_id` among `events`, if it settled.
fn seat_outcome(events: &[ReplicaEvent], request_id: &RequestId) -> Option<Result<Seat, SessionError>> {
    events.iter().find_map(|event| match event {
        ReplicaEvent::SeatActionSettled {
            request_id: id,
            result,
        } if id == request_id => Some(result.clone()),
        _ => None,
    })
}
