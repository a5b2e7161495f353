//! A participant's replica of the room.
//!
//! The replica is pure bookkeeping: it never sends anything and never
//! sleeps. Operations that need a message sent return it; timers are
//! exposed as deadlines the runtime sleeps until, then reports back through
//! [`Replica::expire`].
//!
//! ```text
//!             begin_snapshot                handle_snapshot_response
//! [no slot] ─────────────────→ [Request] ─────────────────────────→ [no slot] Live
//!                                  │
//!                                  ├── expire / snapshot_timed_out ─→ Disconnected
//!                                  └── abandon_snapshot (send failed) → Disconnected
//! ```
//!
//! # Private messages across restarts
//!
//! Private messages carry the revision current when the Host sent them, and
//! the transport may reorder them against state updates. A restart has no
//! revision of its own; it shows up as a projection whose status has no
//! roles dealt. The first such projection after a dealt one sets the
//! *deal floor*: addressed privates stamped below it belong to a deal that
//! no longer exists, so they are dropped on arrival and purged from the
//! [`PrivateView`]. Privates at or above the floor survive, even when they
//! overtook the restart on the wire.

use std::collections::HashMap;
use std::time::Duration;

use lupus_protocol::{
    BroadcastGameState, HostBroadcast, HostEnvelope, PlayerMessage, PrivateMessage,
    PrivatePayload, RequestId, Seat, SeatAction, SeatRejectReason, Uid,
};
use lupus_transport::StatusTracker;
use rand::Rng;
use tokio::time::Instant;

use crate::{PrivateView, SessionError};

// ---------------------------------------------------------------------------
// ReplicaConfig
// ---------------------------------------------------------------------------

/// Timeouts for the replica's reliable requests.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReplicaConfig {
    /// How long to wait for a `SNAPSHOT_RESPONSE`.
    pub snapshot_timeout: Duration,
    /// How long to wait for a `SEAT_ACTION_ACK`.
    pub seat_request_timeout: Duration,
}

impl Default for ReplicaConfig {
    fn default() -> Self {
        Self {
            snapshot_timeout: Duration::from_secs(5),
            seat_request_timeout: Duration::from_secs(5),
        }
    }
}

// ---------------------------------------------------------------------------
// Pending requests
// ---------------------------------------------------------------------------

/// A request waiting for its correlated answer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingRequest {
    pub request_id: RequestId,
    pub issued_at: Instant,
    pub timeout: Duration,
}

impl PendingRequest {
    fn new(timeout: Duration, now: Instant) -> Self {
        Self {
            request_id: generate_request_id(),
            issued_at: now,
            timeout,
        }
    }

    pub fn deadline(&self) -> Instant {
        self.issued_at + self.timeout
    }

    fn is_expired(&self, now: Instant) -> bool {
        now >= self.deadline()
    }
}

/// How a snapshot was started.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SnapshotStart {
    /// The Host already holds the truth; nothing to ask.
    Immediate,
    /// Send `message` and wait for the matching response.
    Request {
        request_id: RequestId,
        message: PlayerMessage,
        /// The request this one replaced, whose waiter should be failed.
        superseded: Option<RequestId>,
    },
}

// ---------------------------------------------------------------------------
// ReplicaEvent
// ---------------------------------------------------------------------------

/// Something the runtime should react to after feeding the replica.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReplicaEvent {
    /// A newer projection replaced the old one.
    StateApplied { revision: u64 },
    /// The outstanding snapshot request was answered.
    SnapshotCompleted { request_id: RequestId, revision: u64 },
    /// The outstanding snapshot request failed.
    SnapshotFailed {
        request_id: RequestId,
        error: SessionError,
    },
    /// A seat request got its answer, or gave up waiting.
    SeatActionSettled {
        request_id: RequestId,
        result: Result<Seat, SessionError>,
    },
    /// A private message for this participant.
    Private(PrivatePayload),
    /// A private message refers to a revision this replica hasn't seen.
    ResyncNeeded { revision: u64 },
    /// A public event (`ROLE_TURN`, `NIGHT_END`, seat changes, restarts).
    Public(HostBroadcast),
}

// ---------------------------------------------------------------------------
// Replica
// ---------------------------------------------------------------------------

/// One participant's eventually consistent copy of the room.
#[derive(Debug)]
pub struct Replica {
    uid: Uid,
    is_host: bool,
    status: StatusTracker,
    state: Option<BroadcastGameState>,
    last_applied: Option<u64>,
    my_seat: Option<Seat>,
    private: PrivateView,
    /// Applied privates in arrival order, so the view can be rebuilt
    /// without the ones a restart voided.
    private_log: Vec<(u64, PrivatePayload)>,
    deal_floor: Option<u64>,
    snapshot: Option<PendingRequest>,
    seat_requests: HashMap<RequestId, PendingRequest>,
}

impl Replica {
    pub fn new(uid: Uid, is_host: bool, status: StatusTracker) -> Self {
        Self {
            uid,
            is_host,
            status,
            state: None,
            last_applied: None,
            my_seat: None,
            private: PrivateView::default(),
            private_log: Vec::new(),
            deal_floor: None,
            snapshot: None,
            seat_requests: HashMap::new(),
        }
    }

    pub fn uid(&self) -> &Uid {
        &self.uid
    }

    pub fn is_host(&self) -> bool {
        self.is_host
    }

    /// The last applied projection, if any.
    pub fn state(&self) -> Option<&BroadcastGameState> {
        self.state.as_ref()
    }

    pub fn last_applied(&self) -> Option<u64> {
        self.last_applied
    }

    pub fn my_seat(&self) -> Option<Seat> {
        self.my_seat
    }

    pub fn private_view(&self) -> &PrivateView {
        &self.private
    }

    /// Revision of the projection that ended the last deal. Privates below
    /// it are ignored.
    pub fn deal_floor(&self) -> Option<u64> {
        self.deal_floor
    }

    pub fn status(&self) -> &StatusTracker {
        &self.status
    }

    /// The outstanding snapshot request, if one is in flight.
    pub fn pending_snapshot(&self) -> Option<&RequestId> {
        self.snapshot.as_ref().map(|p| &p.request_id)
    }

    pub fn pending_seat_requests(&self) -> usize {
        self.seat_requests.len()
    }

    // -----------------------------------------------------------------------
    // State updates
    // -----------------------------------------------------------------------

    /// Applies a `STATE_UPDATE` unless it is not newer than what we have.
    ///
    /// Returns whether the projection was replaced. An empty replica takes
    /// any revision.
    pub fn apply_state_update(&mut self, state: BroadcastGameState, revision: u64) -> bool {
        if let Some(last) = self.last_applied {
            if revision <= last {
                tracing::debug!(uid = %self.uid, revision, last_applied = last, "stale state update dropped");
                return false;
            }
        }
        self.replace_state(state, revision);
        self.status.mark_as_live();
        true
    }

    fn replace_state(&mut self, state: BroadcastGameState, revision: u64) {
        let deal_ended = !state.status.has_roles_dealt()
            && self.state.as_ref().is_none_or(|old| old.status.has_roles_dealt());
        if deal_ended {
            self.void_privates_before(revision);
        }
        self.my_seat = state.seat_of(&self.uid);
        self.state = Some(state);
        self.last_applied = Some(revision);
        tracing::debug!(uid = %self.uid, revision, seat = ?self.my_seat, "state applied");
    }

    // -----------------------------------------------------------------------
    // Snapshots
    // -----------------------------------------------------------------------

    /// Starts a snapshot request, replacing any outstanding one.
    pub fn begin_snapshot(&mut self, timeout: Duration, now: Instant) -> SnapshotStart {
        if self.is_host {
            return SnapshotStart::Immediate;
        }

        let pending = PendingRequest::new(timeout, now);
        let request_id = pending.request_id.clone();
        let superseded = self.snapshot.replace(pending).map(|old| old.request_id);
        if let Some(old) = &superseded {
            tracing::debug!(uid = %self.uid, superseded = %old, "snapshot request superseded");
        }
        self.status.mark_as_syncing();
        tracing::debug!(uid = %self.uid, %request_id, "snapshot requested");

        SnapshotStart::Request {
            message: PlayerMessage::SnapshotRequest {
                request_id: request_id.clone(),
                uid: self.uid.clone(),
                last_revision: self.last_applied,
            },
            request_id,
            superseded,
        }
    }

    /// Applies a `SNAPSHOT_RESPONSE` if it answers our outstanding request.
    pub fn handle_snapshot_response(
        &mut self,
        request_id: &RequestId,
        to_uid: &Uid,
        state: BroadcastGameState,
        revision: u64,
    ) -> Option<ReplicaEvent> {
        if to_uid != &self.uid {
            return None;
        }
        if self.pending_snapshot() != Some(request_id) {
            tracing::debug!(uid = %self.uid, %request_id, "snapshot response for an old request ignored");
            return None;
        }
        self.snapshot = None;

        if self.last_applied.is_none_or(|last| revision >= last) {
            self.replace_state(state, revision);
        }
        self.status.mark_as_live();
        tracing::info!(uid = %self.uid, %request_id, revision, "snapshot applied");

        Some(ReplicaEvent::SnapshotCompleted {
            request_id: request_id.clone(),
            revision,
        })
    }

    /// The timer for `request_id` fired. Only the current request can time
    /// out; older generations were already superseded.
    pub fn snapshot_timed_out(&mut self, request_id: &RequestId) -> Option<ReplicaEvent> {
        self.fail_snapshot(request_id, SessionError::SnapshotTimeout)
    }

    /// Gives up on `request_id` at once, e.g. because it could not be sent.
    pub fn abandon_snapshot(&mut self, request_id: &RequestId) -> Option<ReplicaEvent> {
        self.fail_snapshot(request_id, SessionError::Disconnected)
    }

    fn fail_snapshot(&mut self, request_id: &RequestId, error: SessionError) -> Option<ReplicaEvent> {
        if self.pending_snapshot() != Some(request_id) {
            return None;
        }
        self.snapshot = None;
        self.status.mark_disconnected();
        tracing::warn!(uid = %self.uid, %request_id, %error, "snapshot failed");
        Some(ReplicaEvent::SnapshotFailed {
            request_id: request_id.clone(),
            error,
        })
    }

    // -----------------------------------------------------------------------
    // Seat requests
    // -----------------------------------------------------------------------

    /// Starts a reliable seat change. Returns the id to wait on and the
    /// message to send.
    pub fn begin_seat_action(
        &mut self,
        action: SeatAction,
        seat: Seat,
        display_name: Option<String>,
        avatar_url: Option<String>,
        timeout: Duration,
        now: Instant,
    ) -> (RequestId, PlayerMessage) {
        let pending = PendingRequest::new(timeout, now);
        let request_id = pending.request_id.clone();
        self.seat_requests.insert(request_id.clone(), pending);
        tracing::debug!(uid = %self.uid, %request_id, ?action, %seat, "seat request issued");

        let message = PlayerMessage::SeatActionRequest {
            request_id: request_id.clone(),
            action,
            seat,
            uid: self.uid.clone(),
            display_name,
            avatar_url,
        };
        (request_id, message)
    }

    /// Settles a seat request from its ACK. ACKs for someone else, or for a
    /// request already settled, change nothing.
    pub fn handle_seat_ack(
        &mut self,
        request_id: &RequestId,
        to_uid: &Uid,
        success: bool,
        seat: Seat,
        reason: Option<SeatRejectReason>,
    ) -> Option<ReplicaEvent> {
        if to_uid != &self.uid {
            return None;
        }
        self.seat_requests.remove(request_id)?;

        let result = if success {
            Ok(seat)
        } else {
            Err(SessionError::SeatRejected(reason))
        };
        tracing::debug!(uid = %self.uid, %request_id, ?result, "seat request settled");
        Some(ReplicaEvent::SeatActionSettled {
            request_id: request_id.clone(),
            result,
        })
    }

    /// Drops a seat request whose message could not be sent.
    pub fn abandon_seat_action(&mut self, request_id: &RequestId) -> Option<ReplicaEvent> {
        self.seat_requests.remove(request_id)?;
        Some(ReplicaEvent::SeatActionSettled {
            request_id: request_id.clone(),
            result: Err(SessionError::Disconnected),
        })
    }

    // -----------------------------------------------------------------------
    // Private messages
    // -----------------------------------------------------------------------

    /// Takes in a private message if it is addressed to us and was not sent
    /// for a deal a restart has since replaced.
    pub fn handle_private(&mut self, msg: PrivateMessage) -> Vec<ReplicaEvent> {
        if !msg.is_addressed_to(&self.uid) {
            return Vec::new();
        }
        if let Some(floor) = self.deal_floor.filter(|floor| msg.revision < *floor) {
            tracing::debug!(uid = %self.uid, revision = msg.revision, floor, "private from a replaced deal dropped");
            return Vec::new();
        }

        let mut events = Vec::new();
        if self.last_applied.is_none_or(|last| msg.revision > last) {
            tracing::debug!(uid = %self.uid, revision = msg.revision, "private message ahead of state");
            events.push(ReplicaEvent::ResyncNeeded {
                revision: msg.revision,
            });
        }
        self.private.apply(&msg.payload);
        self.private_log.push((msg.revision, msg.payload.clone()));
        events.push(ReplicaEvent::Private(msg.payload));
        events
    }

    /// Raises the deal floor to `revision` and rebuilds the private view from
    /// what is left.
    fn void_privates_before(&mut self, revision: u64) {
        self.deal_floor = Some(revision);
        self.private_log.retain(|(rev, _)| *rev >= revision);
        self.private = PrivateView::default();
        for (_, payload) in &self.private_log {
            self.private.apply(payload);
        }
        tracing::debug!(uid = %self.uid, floor = revision, kept = self.private_log.len(), "private view reset for a new deal");
    }

    // -----------------------------------------------------------------------
    // Dispatch and timers
    // -----------------------------------------------------------------------

    /// Feeds one envelope from the host topic.
    pub fn handle_envelope(&mut self, envelope: HostEnvelope) -> Vec<ReplicaEvent> {
        match envelope {
            HostEnvelope::Private(msg) => self.handle_private(msg),
            HostEnvelope::Public(broadcast) => self.handle_broadcast(broadcast).into_iter().collect(),
        }
    }

    fn handle_broadcast(&mut self, broadcast: HostBroadcast) -> Option<ReplicaEvent> {
        match broadcast {
            HostBroadcast::StateUpdate { state, revision } => self
                .apply_state_update(state, revision)
                .then_some(ReplicaEvent::StateApplied { revision }),
            HostBroadcast::SnapshotResponse {
                request_id,
                to_uid,
                state,
                revision,
            } => self.handle_snapshot_response(&request_id, &to_uid, state, revision),
            HostBroadcast::SeatActionAck {
                request_id,
                to_uid,
                success,
                seat,
                reason,
            } => self.handle_seat_ack(&request_id, &to_uid, success, seat, reason),
            HostBroadcast::SeatRejected { ref request_uid, .. } if request_uid != &self.uid => None,
            other => Some(ReplicaEvent::Public(other)),
        }
    }

    /// The earliest instant a pending request runs out.
    pub fn next_deadline(&self) -> Option<Instant> {
        self.snapshot
            .iter()
            .chain(self.seat_requests.values())
            .map(PendingRequest::deadline)
            .min()
    }

    /// Fails every request whose deadline has passed.
    pub fn expire(&mut self, now: Instant) -> Vec<ReplicaEvent> {
        let mut events = Vec::new();

        if let Some(id) = self
            .snapshot
            .as_ref()
            .filter(|p| p.is_expired(now))
            .map(|p| p.request_id.clone())
        {
            events.extend(self.snapshot_timed_out(&id));
        }

        let expired: Vec<RequestId> = self
            .seat_requests
            .values()
            .filter(|p| p.is_expired(now))
            .map(|p| p.request_id.clone())
            .collect();
        for request_id in expired {
            self.seat_requests.remove(&request_id);
            tracing::warn!(uid = %self.uid, %request_id, "seat request timed out");
            events.push(ReplicaEvent::SeatActionSettled {
                request_id,
                result: Err(SessionError::SeatRequestTimeout),
            });
        }

        events
    }

    /// Drops every pending request, returning their ids so waiters can be
    /// failed. Used when leaving the room.
    pub fn clear_pending(&mut self) -> Vec<RequestId> {
        let mut ids: Vec<RequestId> = self.snapshot.take().map(|p| p.request_id).into_iter().collect();
        ids.extend(self.seat_requests.drain().map(|(id, _)| id));
        ids
    }
}

/// 128 random bits as 32 lowercase hex characters.
fn generate_request_id() -> RequestId {
    let bytes: [u8; 16] = rand::rng().random();
    RequestId::new(bytes.iter().map(|b| format!("{b:02x}")).collect::<String>())
}
