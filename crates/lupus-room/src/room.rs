//! The Host's authoritative room.
//!
//! `HostRoom` is plain synchronous state: the runtime feeds it player
//! messages and Host commands one at a time, and publishes whatever
//! envelopes each call returns. Only this type ever bumps the revision.
//!
//! ## One call, one batch
//!
//! Every operation collects its output in a [`Batch`] and flushes it once
//! at the end. Flushing is where the revision moves: if anything visible
//! changed, the revision goes up by exactly one and a single
//! `STATE_UPDATE` carries the new projection. Private messages produced
//! by the same call are stamped with that new revision, so a replica can
//! tell whether it has already seen the state they refer to.
//!
//! ```text
//! handle_player_message ─┐
//! assign_roles ──────────┼─→ Batch ─→ flush ─→ [events, STATE_UPDATE, replies, privates]
//! start_night ...  ──────┘              │
//!                                       └─ revision += 1 only if touched
//! ```
//!
//! Rejected intents never touch the batch, so a refused action costs the
//! table no revision and no broadcast. The refusal goes back privately.
//!
//! ## What leaves the Host
//!
//! The projection ([`HostRoom::projection`]) is built from
//! [`BroadcastPlayer`], which has no role field. True roles live in
//! [`SeatedPlayer::role`] and are only ever sent in the owner's
//! `ROLE_CARD`.

use std::collections::BTreeMap;

use lupus_protocol::{
    BroadcastGameState, BroadcastPlayer, HostBroadcast, HostEnvelope, PlayerMessage,
    PrivatePayload, RejectReason, Rejection, RequestId, RoleCard, RoleId, RoomCode, RoomStatus,
    Seat, SeatAction, SeatRejectReason, StepId, Uid, WitchInfo,
};
use lupus_rules::{NightActions, StepRegistry, Table, night_plan};
use rand::Rng;
use rand::seq::SliceRandom;

use crate::batch::Batch;
use crate::{RoomConfig, RoomError};

/// A player in their seat, as the Host knows them.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SeatedPlayer {
    pub uid: Uid,
    pub display_name: String,
    pub avatar_url: Option<String>,
    /// The true role, once dealt. Never leaves the Host except in the
    /// owner's `ROLE_CARD`.
    pub role: Option<RoleId>,
    pub has_viewed_role: bool,
}

/// The last refused action, kept for the Host's own diagnostics.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RejectedAction {
    pub uid: Uid,
    pub rejection: Rejection,
}

/// The canonical room state, owned by the Host.
///
/// Seats are keyed `0..template.len()` and never grow or shrink. The night
/// is tracked by `step_index` into `plan`, the steps this template plays;
/// `None` means no night is running.
pub struct HostRoom {
    pub(crate) room_code: RoomCode,
    pub(crate) host_uid: Uid,
    pub(crate) config: RoomConfig,
    pub(crate) registry: StepRegistry,
    pub(crate) status: RoomStatus,
    pub(crate) template: Vec<RoleId>,
    pub(crate) seats: BTreeMap<Seat, Option<SeatedPlayer>>,
    pub(crate) plan: Vec<StepId>,
    pub(crate) step_index: Option<usize>,
    pub(crate) wolf_votes: BTreeMap<Seat, Seat>,
    pub(crate) actions: NightActions,
    pub(crate) witch_context: Option<WitchInfo>,
    pub(crate) action_rejected: Option<RejectedAction>,
    pub(crate) reveals: BTreeMap<RoleId, PrivatePayload>,
    pub(crate) awaiting_reveal_ack: Option<Seat>,
    pub(crate) audio_playing: bool,
    pub(crate) dead: Vec<Seat>,
    pub(crate) revision: u64,
}

impl HostRoom {
    /// Creates a room with one empty seat per template role, using the
    /// built-in step registry.
    pub fn new(
        room_code: RoomCode,
        host_uid: Uid,
        template: Vec<RoleId>,
        config: RoomConfig,
    ) -> Result<Self, RoomError> {
        Self::with_registry(room_code, host_uid, template, config, StepRegistry::standard())
    }

    /// Like [`HostRoom::new`] with a custom registry. Fails if any step of
    /// the template's night lacks a schema or resolver.
    pub fn with_registry(
        room_code: RoomCode,
        host_uid: Uid,
        template: Vec<RoleId>,
        config: RoomConfig,
        registry: StepRegistry,
    ) -> Result<Self, RoomError> {
        let plan = night_plan(&template);
        registry.validate(&plan)?;

        let seats = (0..template.len() as u32).map(|n| (Seat(n), None)).collect();
        tracing::info!(
            %room_code,
            %host_uid,
            seats = template.len(),
            steps = plan.len(),
            "room created"
        );

        Ok(Self {
            room_code,
            host_uid,
            config,
            registry,
            status: RoomStatus::Unseated,
            template,
            seats,
            plan,
            step_index: None,
            wolf_votes: BTreeMap::new(),
            actions: NightActions::default(),
            witch_context: None,
            action_rejected: None,
            reveals: BTreeMap::new(),
            awaiting_reveal_ack: None,
            audio_playing: false,
            dead: Vec::new(),
            revision: 0,
        })
    }

    // -----------------------------------------------------------------------
    // Accessors
    // -----------------------------------------------------------------------

    pub fn room_code(&self) -> &RoomCode {
        &self.room_code
    }

    pub fn host_uid(&self) -> &Uid {
        &self.host_uid
    }

    pub fn revision(&self) -> u64 {
        self.revision
    }

    pub fn status(&self) -> RoomStatus {
        self.status
    }

    pub fn role_of(&self, seat: Seat) -> Option<RoleId> {
        self.seats.get(&seat)?.as_ref()?.role
    }

    pub fn player(&self, seat: Seat) -> Option<&SeatedPlayer> {
        self.seats.get(&seat)?.as_ref()
    }

    /// Cached check results, by the role that received them.
    pub fn reveals(&self) -> &BTreeMap<RoleId, PrivatePayload> {
        &self.reveals
    }

    pub fn action_rejected(&self) -> Option<&RejectedAction> {
        self.action_rejected.as_ref()
    }

    pub fn night_actions(&self) -> &NightActions {
        &self.actions
    }

    pub fn night_plan(&self) -> &[StepId] {
        &self.plan
    }

    /// The step being played, if the night is running.
    pub fn current_step(&self) -> Option<StepId> {
        self.step_index.and_then(|i| self.plan.get(i).copied())
    }

    /// The public projection everyone may see.
    pub fn projection(&self) -> BroadcastGameState {
        let players = self
            .seats
            .iter()
            .map(|(seat, p)| (*seat, p.as_ref().map(|p| public_player(*seat, p))))
            .collect();
        let wolf_vote_status = (self.current_step() == Some(StepId::WolfKill)).then(|| {
            self.pending_voters()
                .into_iter()
                .map(|seat| (seat, self.wolf_votes.contains_key(&seat)))
                .collect()
        });

        BroadcastGameState {
            room_code: self.room_code.clone(),
            host_uid: self.host_uid.clone(),
            status: self.status,
            template_roles: self.template.clone(),
            players,
            current_step_index: self.step_index,
            is_audio_playing: self.audio_playing,
            wolf_vote_status,
            nightmare_blocked_seat: self.actions.nightmare_block,
            deaths: self.dead.clone(),
        }
    }

    // -----------------------------------------------------------------------
    // Player messages
    // -----------------------------------------------------------------------

    /// Handles one intent. `from` is the publisher identity stamped by the
    /// transport; intents naming another uid or someone else's seat are
    /// refused.
    pub fn handle_player_message(&mut self, from: &Uid, msg: PlayerMessage) -> Vec<HostEnvelope> {
        tracing::debug!(room_code = %self.room_code, %from, kind = msg.kind(), "player message");
        let mut batch = Batch::default();

        match msg {
            PlayerMessage::RequestState { uid } => {
                if &uid == from {
                    batch.touch();
                }
            }
            PlayerMessage::Join {
                seat,
                uid,
                display_name,
                avatar_url,
            } => {
                if self.is_impersonation(from, &uid) {
                    return Vec::new();
                }
                if let Err(reason) = self.sit(&mut batch, &uid, seat, Some(display_name), avatar_url) {
                    batch.reply(HostBroadcast::SeatRejected {
                        seat,
                        request_uid: uid,
                        reason,
                    });
                }
            }
            PlayerMessage::Leave { seat, uid } => {
                if self.is_impersonation(from, &uid) {
                    return Vec::new();
                }
                if let Err(reason) = self.stand(&mut batch, &uid, seat) {
                    tracing::debug!(room_code = %self.room_code, %uid, %seat, ?reason, "leave refused");
                }
            }
            PlayerMessage::SeatActionRequest {
                request_id,
                action,
                seat,
                uid,
                display_name,
                avatar_url,
            } => {
                if self.is_impersonation(from, &uid) {
                    return Vec::new();
                }
                self.handle_seat_request(&mut batch, request_id, action, seat, uid, display_name, avatar_url);
            }
            PlayerMessage::SnapshotRequest { request_id, uid, .. } => {
                if self.is_impersonation(from, &uid) {
                    return Vec::new();
                }
                self.handle_snapshot_request(&mut batch, request_id, uid);
            }
            PlayerMessage::ViewedRole { seat } => self.handle_viewed_role(&mut batch, from, seat),
            PlayerMessage::Action {
                seat,
                role,
                target,
                extra,
            } => self.handle_action(&mut batch, from, seat, role, target, extra),
            PlayerMessage::WolfVote { seat, target } => {
                self.handle_wolf_vote(&mut batch, from, seat, target)
            }
            PlayerMessage::RevealAck { seat, revision, .. } => {
                self.handle_reveal_ack(&mut batch, from, seat, revision)
            }
        }

        self.flush(batch)
    }

    fn is_impersonation(&self, from: &Uid, claimed: &Uid) -> bool {
        if from == claimed {
            return false;
        }
        tracing::warn!(room_code = %self.room_code, %from, %claimed, "intent names another uid, dropped");
        true
    }

    #[allow(clippy::too_many_arguments)]
    fn handle_seat_request(
        &mut self,
        batch: &mut Batch,
        request_id: RequestId,
        action: SeatAction,
        seat: Seat,
        uid: Uid,
        display_name: Option<String>,
        avatar_url: Option<String>,
    ) {
        let result = match action {
            SeatAction::Sit => self.sit(batch, &uid, seat, display_name, avatar_url),
            SeatAction::Standup => self.stand(batch, &uid, seat),
        };
        batch.reply(HostBroadcast::SeatActionAck {
            request_id,
            to_uid: uid,
            success: result.is_ok(),
            seat,
            reason: result.err(),
        });
    }

    /// Replies with the current state (no revision bump) and replays the
    /// requester's private information.
    fn handle_snapshot_request(&mut self, batch: &mut Batch, request_id: RequestId, uid: Uid) {
        batch.reply(HostBroadcast::SnapshotResponse {
            request_id,
            to_uid: uid.clone(),
            state: self.projection(),
            revision: self.revision,
        });

        let Some(seat) = self.seat_of(&uid) else {
            return;
        };
        if let Some(card) = self.role_card(seat) {
            batch.private(&uid, PrivatePayload::RoleCard(card));
        }
        let Some(role) = self.role_of(seat) else {
            return;
        };
        if let Some(reveal) = self.reveals.get(&role) {
            batch.private(&uid, reveal.clone());
        }
        if let (RoleId::Witch, Some(ctx)) = (role, self.witch_context) {
            batch.private(&uid, PrivatePayload::WitchContext(ctx));
        }
    }

    fn handle_viewed_role(&mut self, batch: &mut Batch, from: &Uid, seat: Seat) {
        if self.status != RoomStatus::Assigned {
            return;
        }
        let Some(player) = self.seats.get_mut(&seat).and_then(Option::as_mut) else {
            return;
        };
        if &player.uid != from || player.has_viewed_role {
            return;
        }
        player.has_viewed_role = true;
        batch.touch();

        let all_viewed = self.seats.values().flatten().all(|p| p.has_viewed_role);
        if all_viewed {
            self.set_status(RoomStatus::Ready);
        }
    }

    // -----------------------------------------------------------------------
    // Seats
    // -----------------------------------------------------------------------

    pub(crate) fn seat_of(&self, uid: &Uid) -> Option<Seat> {
        self.seats
            .iter()
            .find_map(|(seat, p)| p.as_ref().filter(|p| &p.uid == uid).map(|_| *seat))
    }

    pub(crate) fn occupant(&self, seat: Seat) -> Option<&Uid> {
        self.seats.get(&seat)?.as_ref().map(|p| &p.uid)
    }

    fn all_seats_filled(&self) -> bool {
        self.seats.values().all(Option::is_some)
    }

    fn seated_count(&self) -> usize {
        self.seats.values().flatten().count()
    }

    /// Seats `uid` at `seat`, moving them if they sat elsewhere. Sitting
    /// down on one's own seat again succeeds without changing anything.
    fn sit(
        &mut self,
        batch: &mut Batch,
        uid: &Uid,
        seat: Seat,
        display_name: Option<String>,
        avatar_url: Option<String>,
    ) -> Result<(), SeatRejectReason> {
        if !self.status.allows_seat_changes() {
            return Err(SeatRejectReason::GameInProgress);
        }
        match self.seats.get(&seat) {
            None => return Err(SeatRejectReason::NoSuchSeat),
            Some(Some(p)) if &p.uid == uid => return Ok(()),
            Some(Some(_)) => return Err(SeatRejectReason::SeatTaken),
            Some(None) => {}
        }

        if let Some(previous) = self.seat_of(uid) {
            self.seats.insert(previous, None);
            batch.event(HostBroadcast::PlayerLeft { seat: previous });
        }

        let player = SeatedPlayer {
            uid: uid.clone(),
            display_name: display_name.unwrap_or_else(|| uid.to_string()),
            avatar_url,
            role: None,
            has_viewed_role: false,
        };
        batch.event(HostBroadcast::PlayerJoined {
            seat,
            player: public_player(seat, &player),
        });
        self.seats.insert(seat, Some(player));
        batch.touch();
        tracing::info!(room_code = %self.room_code, %uid, %seat, "player seated");

        if self.status == RoomStatus::Unseated && self.all_seats_filled() {
            self.set_status(RoomStatus::Seated);
        }
        Ok(())
    }

    fn stand(&mut self, batch: &mut Batch, uid: &Uid, seat: Seat) -> Result<(), SeatRejectReason> {
        if !self.status.allows_seat_changes() {
            return Err(SeatRejectReason::GameInProgress);
        }
        match self.seats.get(&seat) {
            None => return Err(SeatRejectReason::NoSuchSeat),
            Some(Some(p)) if &p.uid == uid => {}
            Some(_) => return Err(SeatRejectReason::NotSeatOwner),
        }

        self.seats.insert(seat, None);
        batch.event(HostBroadcast::PlayerLeft { seat });
        batch.touch();
        tracing::info!(room_code = %self.room_code, %uid, %seat, "player left seat");

        if self.status == RoomStatus::Seated {
            self.set_status(RoomStatus::Unseated);
        }
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Host operations
    // -----------------------------------------------------------------------

    fn require_host(&self, caller: &Uid) -> Result<(), RoomError> {
        if caller == &self.host_uid {
            Ok(())
        } else {
            Err(RoomError::NotHost(caller.clone()))
        }
    }

    fn require_status(&self, op: &'static str, allowed: &[RoomStatus]) -> Result<(), RoomError> {
        if allowed.contains(&self.status) {
            Ok(())
        } else {
            Err(RoomError::InvalidState {
                op,
                status: self.status,
            })
        }
    }

    /// Deals the template at random and sends every player their card.
    pub fn assign_roles(&mut self, caller: &Uid) -> Result<Vec<HostEnvelope>, RoomError> {
        self.assign_roles_with_rng(caller, &mut rand::rng())
    }

    /// [`HostRoom::assign_roles`] with a caller-supplied random source.
    pub fn assign_roles_with_rng<R: Rng + ?Sized>(
        &mut self,
        caller: &Uid,
        rng: &mut R,
    ) -> Result<Vec<HostEnvelope>, RoomError> {
        self.require_host(caller)?;
        self.require_status("assign roles", &[RoomStatus::Seated])?;
        if self.template.is_empty() {
            return Err(RoomError::NoTemplate);
        }

        let mut deck = self.template.clone();
        deck.shuffle(rng);
        for (player, role) in self.seats.values_mut().flatten().zip(deck) {
            player.role = Some(role);
            player.has_viewed_role = false;
        }

        let mut batch = Batch::default();
        self.set_status(RoomStatus::Assigned);
        batch.touch();
        let seats: Vec<Seat> = self.seats.keys().copied().collect();
        for seat in seats {
            if let (Some(card), Some(uid)) = (self.role_card(seat), self.occupant(seat)) {
                batch.private(uid, PrivatePayload::RoleCard(card));
            }
        }
        tracing::info!(room_code = %self.room_code, "roles assigned");
        Ok(self.flush(batch))
    }

    /// `seat`'s role card, with pack teammates for wolves that hunt
    /// together.
    fn role_card(&self, seat: Seat) -> Option<RoleCard> {
        let role = self.role_of(seat)?;
        let wolf_teammates = if role.votes_with_wolves() {
            self.table()
                .wolf_pack()
                .into_iter()
                .filter(|s| *s != seat)
                .collect()
        } else {
            Vec::new()
        };
        Some(RoleCard {
            seat,
            role,
            wolf_teammates,
        })
    }

    /// Starts the night: `Ready → Ongoing`, entering the first step.
    pub fn start_night(&mut self, caller: &Uid) -> Result<Vec<HostEnvelope>, RoomError> {
        self.require_host(caller)?;
        self.require_status("start the night", &[RoomStatus::Ready])?;

        let mut batch = Batch::default();
        self.set_status(RoomStatus::Ongoing);
        self.actions = NightActions::default();
        self.wolf_votes.clear();
        self.step_index = Some(0);
        tracing::info!(room_code = %self.room_code, steps = self.plan.len(), "night started");
        self.enter_step(&mut batch);
        Ok(self.flush(batch))
    }

    /// Clears roles and the night and returns everyone to their seats.
    pub fn restart_game(&mut self, caller: &Uid) -> Result<Vec<HostEnvelope>, RoomError> {
        self.require_host(caller)?;
        if self.status == RoomStatus::Unseated {
            return Err(RoomError::InvalidState {
                op: "restart",
                status: self.status,
            });
        }
        Ok(self.reset_to_seats())
    }

    /// Restart used when a game went wrong mid-night. Refused, with nothing
    /// changed, unless the caller is the host, the room is `Seated` or
    /// `Ongoing`, every seat is filled to match the role pool, and enough
    /// players are seated.
    pub fn emergency_restart_and_reshuffle_roles(
        &mut self,
        caller: &Uid,
    ) -> Result<Vec<HostEnvelope>, RoomError> {
        self.require_host(caller)?;
        if self.template.is_empty() {
            return Err(RoomError::NoTemplate);
        }
        self.require_status("emergency restart", &[RoomStatus::Seated, RoomStatus::Ongoing])?;
        let seated = self.seated_count();
        if seated != self.template.len() {
            return Err(RoomError::SeatMismatch {
                seated,
                roles: self.template.len(),
            });
        }
        if seated < self.config.min_players {
            return Err(RoomError::TooFewPlayers {
                seated,
                min: self.config.min_players,
            });
        }
        tracing::warn!(room_code = %self.room_code, status = %self.status, "emergency restart");
        Ok(self.reset_to_seats())
    }

    fn reset_to_seats(&mut self) -> Vec<HostEnvelope> {
        for player in self.seats.values_mut().flatten() {
            player.role = None;
            player.has_viewed_role = false;
        }
        self.clear_night();
        self.reveals.clear();
        self.action_rejected = None;
        self.dead.clear();

        let next = if self.all_seats_filled() {
            RoomStatus::Seated
        } else {
            RoomStatus::Unseated
        };
        self.set_status(next);

        let mut batch = Batch::default();
        batch.event(HostBroadcast::GameRestarted);
        batch.touch();
        tracing::info!(room_code = %self.room_code, status = %self.status, "game restarted");
        self.flush(batch)
    }

    pub fn set_audio_playing(&mut self, caller: &Uid, playing: bool) -> Result<Vec<HostEnvelope>, RoomError> {
        self.require_host(caller)?;
        let mut batch = Batch::default();
        if self.audio_playing != playing {
            self.audio_playing = playing;
            batch.touch();
        }
        Ok(self.flush(batch))
    }

    // -----------------------------------------------------------------------
    // Internals shared with the night flow
    // -----------------------------------------------------------------------

    pub(crate) fn table(&self) -> Table {
        let roles = self
            .seats
            .iter()
            .filter_map(|(seat, p)| Some((*seat, p.as_ref()?.role?)))
            .collect();
        Table::new(roles).with_dead(self.dead.iter().copied())
    }

    pub(crate) fn clear_night(&mut self) {
        self.step_index = None;
        self.wolf_votes.clear();
        self.actions = NightActions::default();
        self.witch_context = None;
        self.awaiting_reveal_ack = None;
    }

    pub(crate) fn set_status(&mut self, next: RoomStatus) {
        if !self.status.can_transition_to(next) {
            tracing::warn!(room_code = %self.room_code, from = %self.status, to = %next, "unexpected status transition");
        }
        tracing::debug!(room_code = %self.room_code, from = %self.status, to = %next, "status changed");
        self.status = next;
    }

    pub(crate) fn reject(&mut self, batch: &mut Batch, uid: &Uid, reason: RejectReason) {
        let rejection = Rejection {
            step: self.current_step(),
            reason,
        };
        tracing::debug!(room_code = %self.room_code, %uid, ?reason, "action rejected");
        batch.private(uid, PrivatePayload::ActionRejected(rejection));
        self.action_rejected = Some(RejectedAction {
            uid: uid.clone(),
            rejection,
        });
    }

    /// Bumps the revision if the projection changed and orders the output.
    pub(crate) fn flush(&mut self, batch: Batch) -> Vec<HostEnvelope> {
        let update = if batch.changed() {
            self.revision += 1;
            Some(HostBroadcast::StateUpdate {
                state: self.projection(),
                revision: self.revision,
            })
        } else {
            None
        };
        batch.into_envelopes(update, self.revision)
    }
}

fn public_player(seat: Seat, p: &SeatedPlayer) -> BroadcastPlayer {
    BroadcastPlayer {
        uid: p.uid.clone(),
        seat,
        display_name: p.display_name.clone(),
        avatar_url: p.avatar_url.clone(),
        has_viewed_role: p.has_viewed_role,
    }
}
