//! A player's client: a replica of the room kept in sync over the channel.
//!
//! Like the host, a player runs as one actor task owning the channel and
//! the replica. Reliable requests (snapshots, seat changes) park a oneshot
//! waiter keyed by request id; the actor resolves it when the replica
//! settles the request, either from the Host's answer or from a timer.

use std::collections::HashMap;
use std::ops::ControlFlow;
use std::time::Duration;

use lupus_protocol::{
    ActionExtra, Codec, HostEnvelope, JsonCodec, PlayerMessage, RequestId, RoomCode, Seat,
    SeatAction, Uid,
};
use lupus_session::{Replica, ReplicaEvent, SessionError, SnapshotStart};
use lupus_transport::{
    Broker, ChannelEvent, ConnectionStatus, Frame, Link, RoomChannel, StatusTracker, Topic,
};
use tokio::sync::{broadcast, mpsc, oneshot, watch};
use tokio::time::Instant;

use crate::core::{ClientCore, EVENT_CAPACITY, Intent};
use crate::{ClientConfig, ClientView, LupusError, RoomEvent};

type Reply<T> = oneshot::Sender<Result<T, LupusError>>;

enum PlayerCommand {
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
    RequestState {
        reply: Reply<()>,
    },
    RequestSnapshot {
        timeout: Option<Duration>,
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

/// Handle to a running player actor.
#[derive(Clone)]
pub struct PlayerClient {
    uid: Uid,
    room_code: RoomCode,
    commands: mpsc::Sender<PlayerCommand>,
    events: broadcast::Sender<RoomEvent>,
    status: StatusTracker,
}

impl PlayerClient {
    /// Joins the room channel and asks the Host for a snapshot.
    ///
    /// Returns once the subscription is confirmed. The first snapshot
    /// completes in the background; watch [`PlayerClient::watch_status`]
    /// for `Live`, or await [`PlayerClient::request_snapshot`].
    pub async fn join_as_player<B: Broker>(
        broker: &B,
        room_code: RoomCode,
        uid: Uid,
        config: ClientConfig,
    ) -> Result<Self, LupusError> {
        let status = StatusTracker::new();
        let (channel, channel_events) = RoomChannel::join(
            broker,
            room_code.as_str(),
            uid.as_str(),
            &config.channel,
            status.clone(),
        )
        .await?;

        let (commands_tx, commands_rx) = mpsc::channel(64);
        let (events_tx, _) = broadcast::channel(EVENT_CAPACITY);
        let actor = PlayerActor {
            core: ClientCore {
                uid: uid.clone(),
                channel,
                replica: Replica::new(uid.clone(), false, status.clone()),
                codec: JsonCodec,
                events: events_tx.clone(),
            },
            config,
            commands: commands_rx,
            channel_events,
            channel_open: true,
            snapshot_waiter: None,
            seat_waiters: HashMap::new(),
        };
        tokio::spawn(actor.run());

        tracing::info!(%room_code, %uid, "player joined");
        Ok(Self {
            uid,
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

    async fn call<T>(&self, make: impl FnOnce(oneshot::Sender<T>) -> PlayerCommand) -> Result<T, LupusError> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.commands
            .send(make(reply_tx))
            .await
            .map_err(|_| LupusError::Unavailable)?;
        reply_rx.await.map_err(|_| LupusError::Unavailable)
    }

    /// Requests `seat`. Resolves with the Host's ACK, or fails with
    /// [`SessionError::SeatRequestTimeout`] if none arrives in time.
    pub async fn take_seat(
        &self,
        seat: Seat,
        display_name: Option<String>,
        avatar_url: Option<String>,
    ) -> Result<Seat, LupusError> {
        self.call(|reply| PlayerCommand::TakeSeat {
            seat,
            display_name,
            avatar_url,
            reply,
        })
        .await?
    }

    /// Gives up the current seat. Resolves with the seat that was left.
    pub async fn leave_seat(&self) -> Result<Seat, LupusError> {
        self.call(|reply| PlayerCommand::LeaveSeat { reply }).await?
    }

    async fn intent(&self, intent: Intent) -> Result<(), LupusError> {
        self.call(|reply| PlayerCommand::Intent { intent, reply }).await?
    }

    /// Sends a night action for this player's role. Fire-and-forget: a
    /// refusal shows up as the view's `last_rejection`.
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

    /// Asks the Host to republish the state. No waiting.
    pub async fn request_state(&self) -> Result<(), LupusError> {
        self.call(|reply| PlayerCommand::RequestState { reply }).await?
    }

    /// Fetches the authoritative state. Supersedes any request already in
    /// flight, which then fails with [`SessionError::Superseded`].
    pub async fn request_snapshot(&self, timeout: Option<Duration>) -> Result<(), LupusError> {
        self.call(|reply| PlayerCommand::RequestSnapshot { timeout, reply }).await?
    }

    pub async fn view(&self) -> Result<ClientView, LupusError> {
        self.call(|reply| PlayerCommand::View { reply }).await
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

    pub async fn members(&self) -> Result<Vec<String>, LupusError> {
        self.call(|reply| PlayerCommand::Members { reply }).await
    }

    /// Leaves the channel. Outstanding requests fail with
    /// [`SessionError::Disconnected`].
    pub async fn leave_room(&self) -> Result<(), LupusError> {
        self.call(|reply| PlayerCommand::Leave { reply }).await?
    }
}

// ---------------------------------------------------------------------------
// Actor
// ---------------------------------------------------------------------------

struct PlayerActor<L: Link> {
    core: ClientCore<L>,
    config: ClientConfig,
    commands: mpsc::Receiver<PlayerCommand>,
    channel_events: mpsc::UnboundedReceiver<ChannelEvent>,
    channel_open: bool,
    snapshot_waiter: Option<(RequestId, Reply<()>)>,
    seat_waiters: HashMap<RequestId, Reply<Seat>>,
}

impl<L: Link> PlayerActor<L> {
    async fn run(mut self) {
        tracing::info!(uid = %self.core.uid, "player actor started");

        let timeout = self.config.replica.snapshot_timeout;
        self.start_snapshot(timeout, None).await;

        loop {
            let deadline = self.core.replica.next_deadline();
            tokio::select! {
                cmd = self.commands.recv() => {
                    let Some(cmd) = cmd else {
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
                _ = sleep_until(deadline), if deadline.is_some() => {
                    let events = self.core.replica.expire(Instant::now());
                    self.settle(events).await;
                }
            }
        }

        tracing::info!(uid = %self.core.uid, "player actor stopped");
    }

    async fn handle_command(&mut self, cmd: PlayerCommand) -> ControlFlow<()> {
        match cmd {
            PlayerCommand::TakeSeat {
                seat,
                display_name,
                avatar_url,
                reply,
            } => {
                self.start_seat_action(SeatAction::Sit, seat, display_name, avatar_url, reply)
                    .await;
            }
            PlayerCommand::LeaveSeat { reply } => match self.core.replica.my_seat() {
                Some(seat) => {
                    self.start_seat_action(SeatAction::Standup, seat, None, None, reply)
                        .await;
                }
                None => {
                    let _ = reply.send(Err(LupusError::NotSeated));
                }
            },
            PlayerCommand::Intent { intent, reply } => {
                let result = match self.core.intent(intent) {
                    Ok(msg) => self.core.send_intent(&msg).await,
                    Err(e) => Err(e),
                };
                let _ = reply.send(result);
            }
            PlayerCommand::RequestState { reply } => {
                let msg = PlayerMessage::RequestState {
                    uid: self.core.uid.clone(),
                };
                let _ = reply.send(self.core.send_intent(&msg).await);
            }
            PlayerCommand::RequestSnapshot { timeout, reply } => {
                let timeout = timeout.unwrap_or(self.config.replica.snapshot_timeout);
                self.start_snapshot(timeout, Some(reply)).await;
            }
            PlayerCommand::View { reply } => {
                let _ = reply.send(self.core.view());
            }
            PlayerCommand::Members { reply } => {
                let _ = reply.send(self.core.channel.members());
            }
            PlayerCommand::Leave { reply } => {
                let result = self.shutdown().await;
                let _ = reply.send(result);
                return ControlFlow::Break(());
            }
        }
        ControlFlow::Continue(())
    }

    // -- Reliable requests ------------------------------------------------

    async fn start_snapshot(&mut self, timeout: Duration, waiter: Option<Reply<()>>) {
        let SnapshotStart::Request {
            request_id,
            message,
            superseded,
        } = self.core.replica.begin_snapshot(timeout, Instant::now())
        else {
            if let Some(reply) = waiter {
                let _ = reply.send(Ok(()));
            }
            return;
        };

        if let Some(old) = superseded {
            if let Some((id, reply)) = self.snapshot_waiter.take() {
                if id == old {
                    let _ = reply.send(Err(SessionError::Superseded.into()));
                }
            }
        }
        if let Some(reply) = waiter {
            self.snapshot_waiter = Some((request_id.clone(), reply));
        }

        if let Err(e) = self.core.send_intent(&message).await {
            tracing::warn!(uid = %self.core.uid, %request_id, error = %e, "snapshot request not sent");
            if let Some(ReplicaEvent::SnapshotFailed { error, .. }) = self.core.replica.abandon_snapshot(&request_id) {
                self.resolve_snapshot(&request_id, Err(error.into()));
            }
        }
    }

    async fn start_seat_action(
        &mut self,
        action: SeatAction,
        seat: Seat,
        display_name: Option<String>,
        avatar_url: Option<String>,
        reply: Reply<Seat>,
    ) {
        let timeout = self.config.replica.seat_request_timeout;
        let (request_id, message) =
            self.core
                .replica
                .begin_seat_action(action, seat, display_name, avatar_url, timeout, Instant::now());
        self.seat_waiters.insert(request_id.clone(), reply);

        if let Err(e) = self.core.send_intent(&message).await {
            tracing::warn!(uid = %self.core.uid, %request_id, error = %e, "seat request not sent");
            self.core.replica.abandon_seat_action(&request_id);
            if let Some(reply) = self.seat_waiters.remove(&request_id) {
                let _ = reply.send(Err(SessionError::Disconnected.into()));
            }
        }
    }

    /// Resolves waiters and reacts to what the replica reported.
    async fn settle(&mut self, events: Vec<ReplicaEvent>) {
        let mut resync = false;
        for event in &events {
            match event {
                ReplicaEvent::SnapshotCompleted { request_id, .. } => {
                    self.resolve_snapshot(request_id, Ok(()));
                }
                ReplicaEvent::SnapshotFailed { request_id, error } => {
                    self.resolve_snapshot(request_id, Err(error.clone().into()));
                }
                ReplicaEvent::SeatActionSettled { request_id, result } => {
                    if let Some(reply) = self.seat_waiters.remove(request_id) {
                        let _ = reply.send(result.clone().map_err(LupusError::from));
                    }
                }
                ReplicaEvent::ResyncNeeded { revision } => {
                    tracing::debug!(uid = %self.core.uid, revision, "resync needed");
                    resync = true;
                }
                _ => {}
            }
        }
        self.core.emit(&events);

        if resync && self.core.replica.pending_snapshot().is_none() {
            let timeout = self.config.replica.snapshot_timeout;
            self.start_snapshot(timeout, None).await;
        }
    }

    fn resolve_snapshot(&mut self, request_id: &RequestId, result: Result<(), LupusError>) {
        if self
            .snapshot_waiter
            .as_ref()
            .is_some_and(|(id, _)| id == request_id)
        {
            if let Some((_, reply)) = self.snapshot_waiter.take() {
                let _ = reply.send(result);
            }
        }
    }

    // -- Channel ----------------------------------------------------------

    async fn handle_channel_event(&mut self, event: Option<ChannelEvent>) {
        match event {
            Some(ChannelEvent::Frame(frame)) => self.handle_frame(frame).await,
            Some(ChannelEvent::Presence(members)) => self.core.channel.apply_presence(members),
            Some(ChannelEvent::Closed) | None => {
                tracing::warn!(uid = %self.core.uid, "room channel closed");
                self.channel_open = false;
                self.core.replica.status().mark_disconnected();
            }
        }
    }

    async fn handle_frame(&mut self, frame: Frame) {
        if frame.topic != Topic::HostBroadcast {
            return;
        }
        if let Some(state) = self.core.replica.state() {
            if frame.from != state.host_uid.as_str() {
                tracing::warn!(uid = %self.core.uid, from = %frame.from, "host-topic frame from a non-host dropped");
                return;
            }
        }
        let envelope: HostEnvelope = match self.core.codec.decode(&frame.payload) {
            Ok(envelope) => envelope,
            Err(e) => {
                tracing::debug!(uid = %self.core.uid, error = %e, "undecodable host frame dropped");
                return;
            }
        };
        let events = self.core.replica.handle_envelope(envelope);
        self.settle(events).await;
    }

    async fn shutdown(&mut self) -> Result<(), LupusError> {
        if let Some((_, reply)) = self.snapshot_waiter.take() {
            let _ = reply.send(Err(SessionError::Disconnected.into()));
        }
        for (_, reply) in self.seat_waiters.drain() {
            let _ = reply.send(Err(SessionError::Disconnected.into()));
        }
        self.core.replica.clear_pending();

        if !self.channel_open {
            self.core.replica.status().mark_disconnected();
            return Ok(());
        }
        self.channel_open = false;
        self.core.channel.leave().await?;
        Ok(())
    }
}

/// Sleeps until `deadline`; pends forever when there is none.
async fn sleep_until(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => tokio::time::sleep_until(deadline).await,
        None => std::future::pending().await,
    }
}
