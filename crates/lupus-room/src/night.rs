//! The night: step entry, actions, the wolf vote, and death resolution.
//!
//! A night walks the room's plan one step at a time:
//!
//! ```text
//! enter_step ─→ ROLE_TURN (+ WITCH_CONTEXT / CONFIRM_STATUS to the actor)
//!     │
//!     ├─ ACTION accepted, no result ───────────────→ advance
//!     ├─ ACTION accepted, check result ─→ reveal ─→ REVEAL_ACK ─→ advance
//!     └─ WOLF_VOTE until every pending voter voted ─→ tally ─→ advance
//!
//! advance past the last step ─→ calculate_deaths ─→ NIGHT_END, status Ended
//! ```
//!
//! The room decides *whether* an input is acceptable (right step, right
//! seat, right role, not blocked); the step's schema and resolver in
//! `lupus-rules` decide what the input *means*. A refused input is answered
//! with a private `ACTION_REJECTED` and changes nothing.

use lupus_protocol::{
    ActionExtra, HostBroadcast, PrivatePayload, RejectReason, RoleId, RoomStatus, Seat, StepId,
    Uid,
};
use lupus_rules::{ActionKind, ResolveInput, StepSchema, calculate_deaths, confirm_status, witch_context};

use crate::HostRoom;
use crate::batch::Batch;

impl HostRoom {
    /// Pack wolves who still have to vote: the living pack minus the seat
    /// the nightmare blocked.
    pub(crate) fn pending_voters(&self) -> Vec<Seat> {
        self.table()
            .wolf_pack()
            .into_iter()
            .filter(|seat| !self.actions.is_blocked(*seat))
            .collect()
    }

    fn current_schema(&self) -> Result<(StepId, StepSchema), RejectReason> {
        if self.status != RoomStatus::Ongoing {
            return Err(RejectReason::NightNotActive);
        }
        let step = self.current_step().ok_or(RejectReason::NightNotActive)?;
        let schema = self.registry.schema(step).cloned().ok_or(RejectReason::NightNotActive)?;
        Ok((step, schema))
    }

    pub(crate) fn handle_action(
        &mut self,
        batch: &mut Batch,
        from: &Uid,
        seat: Seat,
        role: RoleId,
        target: Option<Seat>,
        extra: Option<ActionExtra>,
    ) {
        if let Err(reason) = self.try_action(batch, from, seat, role, target, extra) {
            self.reject(batch, from, reason);
        }
    }

    fn try_action(
        &mut self,
        batch: &mut Batch,
        from: &Uid,
        seat: Seat,
        role: RoleId,
        target: Option<Seat>,
        extra: Option<ActionExtra>,
    ) -> Result<(), RejectReason> {
        let (step, schema) = self.current_schema()?;
        if self.occupant(seat) != Some(from) {
            return Err(RejectReason::NotSeatOwner);
        }
        if schema.kind == ActionKind::WolfVote
            || self.role_of(seat) != Some(schema.actor)
            || role != schema.actor
        {
            return Err(RejectReason::NotYourTurn);
        }
        if self.awaiting_reveal_ack.is_some() {
            return Err(RejectReason::AwaitingRevealAck);
        }
        if self.actions.is_blocked(seat) {
            if target.is_some() {
                return Err(RejectReason::BlockedByNightmare);
            }
            tracing::debug!(room_code = %self.room_code, %step, %seat, "blocked actor skipped");
            self.advance(batch);
            return Ok(());
        }

        let table = self.table();
        schema.check_target(seat, target, &table)?;
        let outcome = self.registry.resolve(&ResolveInput {
            step,
            actor_seat: seat,
            target,
            extra,
            table: &table,
            actions: &self.actions,
            wolf_votes: &self.wolf_votes,
        })?;

        tracing::debug!(room_code = %self.room_code, %step, %seat, ?target, "action accepted");
        if let Some(record) = outcome.record {
            self.actions.apply(record);
        }
        match outcome.reveal {
            Some(reveal) => {
                self.reveals.insert(role, reveal.clone());
                batch.private(from, reveal);
                self.awaiting_reveal_ack = Some(seat);
            }
            None => self.advance(batch),
        }
        Ok(())
    }

    pub(crate) fn handle_wolf_vote(&mut self, batch: &mut Batch, from: &Uid, seat: Seat, target: Seat) {
        if let Err(reason) = self.try_wolf_vote(batch, from, seat, target) {
            self.reject(batch, from, reason);
        }
    }

    fn try_wolf_vote(
        &mut self,
        batch: &mut Batch,
        from: &Uid,
        seat: Seat,
        target: Seat,
    ) -> Result<(), RejectReason> {
        let (step, schema) = self.current_schema()?;
        if step != StepId::WolfKill {
            return Err(RejectReason::NotYourTurn);
        }
        if self.occupant(seat) != Some(from) {
            return Err(RejectReason::NotSeatOwner);
        }
        let table = self.table();
        if !table.wolf_pack().contains(&seat) {
            return Err(RejectReason::NotYourTurn);
        }
        if self.actions.is_blocked(seat) {
            return Err(RejectReason::BlockedByNightmare);
        }
        schema.check_target(seat, Some(target), &table)?;

        self.wolf_votes.insert(seat, target);
        batch.touch();
        tracing::debug!(room_code = %self.room_code, %seat, %target, "wolf vote recorded");

        let pending = self.pending_voters();
        if pending.iter().all(|s| self.wolf_votes.contains_key(s)) {
            self.resolve_wolf_kill();
            self.advance(batch);
        }
        Ok(())
    }

    pub(crate) fn handle_reveal_ack(&mut self, batch: &mut Batch, from: &Uid, seat: Seat, revision: u64) {
        if self.awaiting_reveal_ack != Some(seat) || self.occupant(seat) != Some(from) {
            tracing::debug!(room_code = %self.room_code, %from, %seat, "unexpected reveal ack ignored");
            return;
        }
        tracing::debug!(room_code = %self.room_code, %seat, revision, "reveal acknowledged");
        self.awaiting_reveal_ack = None;
        self.advance(batch);
    }

    fn resolve_wolf_kill(&mut self) {
        let table = self.table();
        let actor_seat = self.wolf_votes.keys().next().copied().unwrap_or(Seat(0));
        let outcome = self.registry.resolve(&ResolveInput {
            step: StepId::WolfKill,
            actor_seat,
            target: None,
            extra: None,
            table: &table,
            actions: &self.actions,
            wolf_votes: &self.wolf_votes,
        });
        match outcome {
            Ok(outcome) => {
                if let Some(record) = outcome.record {
                    self.actions.apply(record);
                }
            }
            Err(reason) => {
                tracing::warn!(room_code = %self.room_code, ?reason, "wolf kill could not be resolved");
            }
        }
    }

    fn advance(&mut self, batch: &mut Batch) {
        if let Some(i) = self.step_index {
            self.step_index = Some(i + 1);
        }
        self.enter_step(batch);
    }

    /// Announces the current step and sends its actor any private context.
    /// Runs past steps that need no input and ends the night after the last.
    ///
    /// The wolf step is announced even when no pack wolf is left to vote,
    /// so listeners hear the same sequence of turns every night for a given
    /// template.
    pub(crate) fn enter_step(&mut self, batch: &mut Batch) {
        loop {
            let Some(step) = self.current_step() else {
                self.end_night(batch);
                return;
            };
            let Some(schema) = self.registry.schema(step).cloned() else {
                tracing::warn!(room_code = %self.room_code, %step, "no schema, step skipped");
                self.step_index = self.step_index.map(|i| i + 1);
                continue;
            };

            let pending_seats = if step == StepId::WolfKill {
                self.pending_voters()
            } else {
                Vec::new()
            };
            batch.event(HostBroadcast::RoleTurn {
                role: schema.actor,
                pending_seats: pending_seats.clone(),
                killed_index: None,
                step_id: Some(step),
            });
            batch.touch();
            tracing::debug!(room_code = %self.room_code, %step, "step entered");

            let table = self.table();
            let actor_seat = table.seat_of(schema.actor);
            match (schema.kind, actor_seat) {
                (ActionKind::WolfVote, _) if pending_seats.is_empty() => {
                    self.step_index = self.step_index.map(|i| i + 1);
                    continue;
                }
                (ActionKind::Potion, Some(seat)) => {
                    let ctx = witch_context(&self.actions, seat);
                    self.witch_context = Some(ctx);
                    if let Some(uid) = self.occupant(seat) {
                        batch.private(uid, PrivatePayload::WitchContext(ctx));
                    }
                }
                (ActionKind::Confirm, Some(seat)) => {
                    let status = confirm_status(schema.actor, seat, &self.actions);
                    if let Some(uid) = self.occupant(seat) {
                        batch.private(uid, PrivatePayload::ConfirmStatus(status));
                    }
                }
                _ => {}
            }
            return;
        }
    }

    fn end_night(&mut self, batch: &mut Batch) {
        let deaths = calculate_deaths(&self.actions, &self.table().role_seat_map());
        tracing::info!(room_code = %self.room_code, ?deaths, "night ended");

        self.dead = deaths.clone();
        self.clear_night();
        self.set_status(RoomStatus::Ended);
        batch.event(HostBroadcast::NightEnd { deaths });
        batch.touch();
    }
}
