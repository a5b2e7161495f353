//! The three message families exchanged over a room channel.
//!
//! ```text
//!   host->all     HostEnvelope::Public(HostBroadcast)     everyone renders it
//!   host->all     HostEnvelope::Private(PrivateMessage)   only `to_uid` reads it
//!   player->host  PlayerMessage                           only the Host reads it
//! ```
//!
//! The public family is built exclusively from types that cannot hold a
//! seat's role, a check result, or a status gate: [`BroadcastPlayer`] has no
//! role field and results only exist as [`PrivatePayload`] variants. Putting
//! hidden information on the public path therefore does not compile.
//!
//! All three families are internally tagged JSON (`{"type": "STATE_UPDATE",
//! ...}`) with camelCase fields, matching what browser clients expect.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::{Alignment, RequestId, RoleId, RoomCode, RoomStatus, Seat, StepId, Uid};

// ---------------------------------------------------------------------------
// Public projection
// ---------------------------------------------------------------------------

/// A seated player as everyone sees them.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BroadcastPlayer {
    pub uid: Uid,
    pub seat: Seat,
    pub display_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub avatar_url: Option<String>,
    pub has_viewed_role: bool,
}

/// The public projection of a room, rebuilt wholesale on every update.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BroadcastGameState {
    pub room_code: RoomCode,
    pub host_uid: Uid,
    pub status: RoomStatus,
    pub template_roles: Vec<RoleId>,
    /// One entry per seat; `None` is an empty seat.
    pub players: BTreeMap<Seat, Option<BroadcastPlayer>>,
    /// `None` outside the night.
    #[serde(default)]
    pub current_step_index: Option<usize>,
    pub is_audio_playing: bool,
    /// Which wolves have voted, during the wolf step only. Targets stay
    /// hidden, but the keys are the wolf seats, so every reader of the
    /// public channel learns who the voting wolves are while the step runs.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub wolf_vote_status: Option<BTreeMap<Seat, bool>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub nightmare_blocked_seat: Option<Seat>,
    /// Seats that died in the resolved night.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub deaths: Vec<Seat>,
}

impl BroadcastGameState {
    /// The seat `uid` occupies, if any.
    pub fn seat_of(&self, uid: &Uid) -> Option<Seat> {
        self.players
            .iter()
            .find_map(|(seat, p)| p.as_ref().filter(|p| &p.uid == uid).map(|_| *seat))
    }

    /// The uid sitting in `seat`, if any.
    pub fn occupant(&self, seat: Seat) -> Option<&Uid> {
        self.players.get(&seat)?.as_ref().map(|p| &p.uid)
    }
}

/// Why a seat request failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SeatRejectReason {
    SeatTaken,
    NotSeatOwner,
    NoSuchSeat,
    GameInProgress,
}

// ---------------------------------------------------------------------------
// HostBroadcast: the public whitelist
// ---------------------------------------------------------------------------

/// Everything the Host may say to the whole room.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(
    tag = "type",
    rename_all = "SCREAMING_SNAKE_CASE",
    rename_all_fields = "camelCase"
)]
pub enum HostBroadcast {
    /// A fresh projection. `revision` is strictly greater than the previous
    /// update's.
    StateUpdate {
        state: BroadcastGameState,
        revision: u64,
    },

    /// A night step begins.
    ///
    /// `pending_seats` is only filled for the wolf vote. It names the wolf
    /// seats still to vote, on the public channel, so non-wolves can read
    /// it too. Single-actor steps leave it empty.
    ///
    /// `killed_index` is part of the wire shape and accepted from peers
    /// that send it, but this Host never fills it: the wolves' target
    /// goes to the witch alone in `WITCH_CONTEXT`.
    RoleTurn {
        role: RoleId,
        pending_seats: Vec<Seat>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        killed_index: Option<Seat>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        step_id: Option<StepId>,
    },

    NightEnd {
        deaths: Vec<Seat>,
    },

    PlayerJoined {
        seat: Seat,
        player: BroadcastPlayer,
    },

    PlayerLeft {
        seat: Seat,
    },

    GameRestarted,

    /// A legacy `JOIN` failed.
    SeatRejected {
        seat: Seat,
        request_uid: Uid,
        reason: SeatRejectReason,
    },

    /// Answers a `SEAT_ACTION_REQUEST`. Duplicates are harmless: the
    /// requester resolves on the first and ignores the rest.
    SeatActionAck {
        request_id: RequestId,
        to_uid: Uid,
        success: bool,
        seat: Seat,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        reason: Option<SeatRejectReason>,
    },

    /// Answers a `SNAPSHOT_REQUEST`, correlated on both `request_id` and
    /// `to_uid`.
    SnapshotResponse {
        request_id: RequestId,
        to_uid: Uid,
        state: BroadcastGameState,
        revision: u64,
    },
}

impl HostBroadcast {
    /// Short name for logs.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::StateUpdate { .. } => "STATE_UPDATE",
            Self::RoleTurn { .. } => "ROLE_TURN",
            Self::NightEnd { .. } => "NIGHT_END",
            Self::PlayerJoined { .. } => "PLAYER_JOINED",
            Self::PlayerLeft { .. } => "PLAYER_LEFT",
            Self::GameRestarted => "GAME_RESTARTED",
            Self::SeatRejected { .. } => "SEAT_REJECTED",
            Self::SeatActionAck { .. } => "SEAT_ACTION_ACK",
            Self::SnapshotResponse { .. } => "SNAPSHOT_RESPONSE",
        }
    }
}

// ---------------------------------------------------------------------------
// Private payloads
// ---------------------------------------------------------------------------

/// A player's own role card. Wolves that hunt together also learn their
/// teammates' seats.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RoleCard {
    pub seat: Seat,
    pub role: RoleId,
    #[serde(default)]
    pub wolf_teammates: Vec<Seat>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SeerResult {
    pub target: Seat,
    pub alignment: Alignment,
}

/// An exact-role reveal (psychic, gargoyle, wolf robot).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RoleResult {
    pub target: Seat,
    pub role: RoleId,
}

/// What the witch needs to decide: who the wolves killed, and whether the
/// antidote may be used.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WitchInfo {
    pub killed_seat: Option<Seat>,
    pub can_save: bool,
}

/// Whether a hunter-like role may fire when they die.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConfirmInfo {
    pub role: RoleId,
    pub can_shoot: bool,
}

/// Stable reasons an action or vote was refused.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RejectReason {
    NightNotActive,
    NotSeatOwner,
    NotYourTurn,
    BlockedByNightmare,
    InvalidTarget,
    SelfTargetNotAllowed,
    TargetNotAlive,
    SkipNotAllowed,
    MissingExtra,
    AwaitingRevealAck,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Rejection {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub step: Option<StepId>,
    pub reason: RejectReason,
}

/// Information meant for exactly one participant.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PrivatePayload {
    RoleCard(RoleCard),
    SeerReveal(SeerResult),
    PsychicReveal(RoleResult),
    GargoyleReveal(RoleResult),
    WolfRobotReveal(RoleResult),
    WitchContext(WitchInfo),
    ConfirmStatus(ConfirmInfo),
    ActionRejected(Rejection),
}

impl PrivatePayload {
    /// The role whose reveal this is, for the four check results.
    pub fn reveal_role(&self) -> Option<RoleId> {
        match self {
            Self::SeerReveal(_) => Some(RoleId::Seer),
            Self::PsychicReveal(_) => Some(RoleId::Psychic),
            Self::GargoyleReveal(_) => Some(RoleId::Gargoyle),
            Self::WolfRobotReveal(_) => Some(RoleId::WolfRobot),
            _ => None,
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Self::RoleCard(_) => "ROLE_CARD",
            Self::SeerReveal(_) => "SEER_REVEAL",
            Self::PsychicReveal(_) => "PSYCHIC_REVEAL",
            Self::GargoyleReveal(_) => "GARGOYLE_REVEAL",
            Self::WolfRobotReveal(_) => "WOLF_ROBOT_REVEAL",
            Self::WitchContext(_) => "WITCH_CONTEXT",
            Self::ConfirmStatus(_) => "CONFIRM_STATUS",
            Self::ActionRejected(_) => "ACTION_REJECTED",
        }
    }
}

/// An addressed message. The transport may hand it to everyone; only the
/// addressee may act on it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PrivateMessage {
    pub to_uid: Uid,
    /// The Host's revision when this was sent.
    pub revision: u64,
    pub payload: PrivatePayload,
}

impl PrivateMessage {
    pub fn is_addressed_to(&self, uid: &Uid) -> bool {
        &self.to_uid == uid
    }
}

/// What travels on the host->all topic.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "channel", content = "message", rename_all = "snake_case")]
pub enum HostEnvelope {
    Public(HostBroadcast),
    Private(PrivateMessage),
}

// ---------------------------------------------------------------------------
// PlayerMessage
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SeatAction {
    Sit,
    Standup,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Potion {
    Save,
    Poison,
}

/// Extra data some steps need beyond a single target.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum ActionExtra {
    /// Magician: `target` is swapped with `second`.
    SwapWith { second: Seat },
    /// Witch: which potion `target` receives.
    Potion { potion: Potion },
}

/// Everything a participant may ask of the Host.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(
    tag = "type",
    rename_all = "SCREAMING_SNAKE_CASE",
    rename_all_fields = "camelCase"
)]
pub enum PlayerMessage {
    RequestState {
        uid: Uid,
    },

    Join {
        seat: Seat,
        uid: Uid,
        display_name: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        avatar_url: Option<String>,
    },

    Leave {
        seat: Seat,
        uid: Uid,
    },

    /// A night action. `target: None` is a skip, or the acknowledgement of
    /// a confirm step.
    Action {
        seat: Seat,
        role: RoleId,
        target: Option<Seat>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        extra: Option<ActionExtra>,
    },

    WolfVote {
        seat: Seat,
        target: Seat,
    },

    ViewedRole {
        seat: Seat,
    },

    /// The actor has seen their reveal; the night may move on.
    RevealAck {
        seat: Seat,
        role: RoleId,
        revision: u64,
    },

    SeatActionRequest {
        request_id: RequestId,
        action: SeatAction,
        seat: Seat,
        uid: Uid,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        display_name: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        avatar_url: Option<String>,
    },

    SnapshotRequest {
        request_id: RequestId,
        uid: Uid,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        last_revision: Option<u64>,
    },
}

impl PlayerMessage {
    pub fn kind(&self) -> &'static str {
        match self {
            Self::RequestState { .. } => "REQUEST_STATE",
            Self::Join { .. } => "JOIN",
            Self::Leave { .. } => "LEAVE",
            Self::Action { .. } => "ACTION",
            Self::WolfVote { .. } => "WOLF_VOTE",
            Self::ViewedRole { .. } => "VIEWED_ROLE",
            Self::RevealAck { .. } => "REVEAL_ACK",
            Self::SeatActionRequest { .. } => "SEAT_ACTION_REQUEST",
            Self::SnapshotRequest { .. } => "SNAPSHOT_REQUEST",
        }
    }
}

// =========================================================================
// Tests
// =========================================================================

#[cfg(test)]
mod tests {
    //! These pin the JSON shapes browser clients parse.

    use super::*;

    fn state() -> BroadcastGameState {
        let mut players = BTreeMap::new();
        players.insert(
            Seat(0),
            Some(BroadcastPlayer {
                uid: Uid::new("p0"),
                seat: Seat(0),
                display_name: "Ana".into(),
                avatar_url: None,
                has_viewed_role: false,
            }),
        );
        players.insert(Seat(1), None);
        BroadcastGameState {
            room_code: RoomCode::new("ABCD"),
            host_uid: Uid::new("p0"),
            status: RoomStatus::Unseated,
            template_roles: vec![RoleId::Wolf, RoleId::Seer],
            players,
            current_step_index: None,
            is_audio_playing: false,
            wolf_vote_status: None,
            nightmare_blocked_seat: None,
            deaths: Vec::new(),
        }
    }

    // =====================================================================
    // Public messages
    // =====================================================================

    #[test]
    fn test_state_update_json_format() {
        let msg = HostBroadcast::StateUpdate {
            state: state(),
            revision: 3,
        };
        let json = serde_json::to_value(&msg).unwrap();

        assert_eq!(json["type"], "STATE_UPDATE");
        assert_eq!(json["revision"], 3);
        assert_eq!(json["state"]["roomCode"], "ABCD");
        assert_eq!(json["state"]["templateRoles"][0], "wolf");
        assert_eq!(json["state"]["players"]["0"]["displayName"], "Ana");
        assert!(json["state"]["players"]["1"].is_null());
        assert!(json["state"].get("wolfVoteStatus").is_none());
    }

    #[test]
    fn test_state_update_decodes_inside_envelope() {
        let env = HostEnvelope::Public(HostBroadcast::StateUpdate {
            state: state(),
            revision: 9,
        });
        let bytes = serde_json::to_vec(&env).unwrap();
        let back: HostEnvelope = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(back, env);
    }

    #[test]
    fn test_broadcast_player_has_no_role_field() {
        let json = serde_json::to_value(&state()).unwrap();
        let player = json["players"]["0"].as_object().unwrap();
        assert!(!player.contains_key("role"));
    }

    #[test]
    fn test_role_turn_json_format() {
        let msg = HostBroadcast::RoleTurn {
            role: RoleId::Wolf,
            pending_seats: vec![Seat(1), Seat(4)],
            killed_index: None,
            step_id: Some(StepId::WolfKill),
        };
        let json = serde_json::to_value(&msg).unwrap();
        assert_eq!(json["type"], "ROLE_TURN");
        assert_eq!(json["pendingSeats"][1], 4);
        assert_eq!(json["stepId"], "wolfKill");
        assert!(!json.as_object().unwrap().contains_key("killedIndex"));
    }

    #[test]
    fn test_role_turn_killed_index_json_format() {
        let json = r#"{"type":"ROLE_TURN","role":"witch","pendingSeats":[],"killedIndex":3,"stepId":"witchAction"}"#;
        let msg: HostBroadcast = serde_json::from_str(json).unwrap();
        assert_eq!(
            msg,
            HostBroadcast::RoleTurn {
                role: RoleId::Witch,
                pending_seats: vec![],
                killed_index: Some(Seat(3)),
                step_id: Some(StepId::WitchAction),
            }
        );
        assert_eq!(serde_json::to_value(&msg).unwrap()["killedIndex"], 3);
    }

    #[test]
    fn test_seat_ack_json_format() {
        let msg = HostBroadcast::SeatActionAck {
            request_id: RequestId::new("r1"),
            to_uid: Uid::new("p2"),
            success: false,
            seat: Seat(3),
            reason: Some(SeatRejectReason::SeatTaken),
        };
        let json = serde_json::to_value(&msg).unwrap();
        assert_eq!(json["type"], "SEAT_ACTION_ACK");
        assert_eq!(json["requestId"], "r1");
        assert_eq!(json["toUid"], "p2");
        assert_eq!(json["reason"], "seat_taken");
    }

    #[test]
    fn test_game_restarted_is_just_a_tag() {
        let json = serde_json::to_string(&HostBroadcast::GameRestarted).unwrap();
        assert_eq!(json, r#"{"type":"GAME_RESTARTED"}"#);
    }

    #[test]
    fn test_state_lookups() {
        let s = state();
        assert_eq!(s.seat_of(&Uid::new("p0")), Some(Seat(0)));
        assert_eq!(s.seat_of(&Uid::new("p9")), None);
        assert_eq!(s.occupant(Seat(0)), Some(&Uid::new("p0")));
        assert_eq!(s.occupant(Seat(1)), None);
    }

    // =====================================================================
    // Private messages
    // =====================================================================

    #[test]
    fn test_private_message_json_format() {
        let msg = PrivateMessage {
            to_uid: Uid::new("p8"),
            revision: 12,
            payload: PrivatePayload::SeerReveal(SeerResult {
                target: Seat(4),
                alignment: Alignment::Wolf,
            }),
        };
        let json = serde_json::to_value(&msg).unwrap();
        assert_eq!(json["toUid"], "p8");
        assert_eq!(json["payload"]["kind"], "SEER_REVEAL");
        assert_eq!(json["payload"]["target"], 4);
        assert_eq!(json["payload"]["alignment"], "wolf");
    }

    #[test]
    fn test_confirm_status_json_format() {
        let payload = PrivatePayload::ConfirmStatus(ConfirmInfo {
            role: RoleId::Hunter,
            can_shoot: false,
        });
        let json = serde_json::to_value(&payload).unwrap();
        assert_eq!(json["kind"], "CONFIRM_STATUS");
        assert_eq!(json["canShoot"], false);
    }

    #[test]
    fn test_private_addressing() {
        let msg = PrivateMessage {
            to_uid: Uid::new("p8"),
            revision: 1,
            payload: PrivatePayload::ActionRejected(Rejection {
                step: None,
                reason: RejectReason::NotYourTurn,
            }),
        };
        assert!(msg.is_addressed_to(&Uid::new("p8")));
        assert!(!msg.is_addressed_to(&Uid::new("p9")));
    }

    #[test]
    fn test_reveal_role_only_for_check_results() {
        let reveal = PrivatePayload::GargoyleReveal(RoleResult {
            target: Seat(1),
            role: RoleId::Witch,
        });
        assert_eq!(reveal.reveal_role(), Some(RoleId::Gargoyle));
        let card = PrivatePayload::RoleCard(RoleCard {
            seat: Seat(1),
            role: RoleId::Seer,
            wolf_teammates: Vec::new(),
        });
        assert_eq!(card.reveal_role(), None);
    }

    #[test]
    fn test_envelope_keeps_public_and_private_apart() {
        let env = HostEnvelope::Public(HostBroadcast::NightEnd {
            deaths: vec![Seat(2)],
        });
        let json = serde_json::to_value(&env).unwrap();
        assert_eq!(json["channel"], "public");
        assert_eq!(json["message"]["type"], "NIGHT_END");

        let back: HostEnvelope = serde_json::from_value(json).unwrap();
        assert_eq!(back, env);
    }

    // =====================================================================
    // Player messages
    // =====================================================================

    #[test]
    fn test_action_with_extra_json_format() {
        let msg = PlayerMessage::Action {
            seat: Seat(2),
            role: RoleId::Witch,
            target: Some(Seat(5)),
            extra: Some(ActionExtra::Potion {
                potion: Potion::Poison,
            }),
        };
        let json = serde_json::to_value(&msg).unwrap();
        assert_eq!(json["type"], "ACTION");
        assert_eq!(json["extra"]["kind"], "potion");
        assert_eq!(json["extra"]["potion"], "poison");
    }

    #[test]
    fn test_skip_action_has_null_target() {
        let json = r#"{"type":"ACTION","seat":1,"role":"guard","target":null}"#;
        let msg: PlayerMessage = serde_json::from_str(json).unwrap();
        assert_eq!(
            msg,
            PlayerMessage::Action {
                seat: Seat(1),
                role: RoleId::Guard,
                target: None,
                extra: None,
            }
        );
    }

    #[test]
    fn test_seat_action_request_parses_client_json() {
        let json = r#"{
            "type": "SEAT_ACTION_REQUEST",
            "requestId": "abc",
            "action": "standup",
            "seat": 4,
            "uid": "p4"
        }"#;
        let msg: PlayerMessage = serde_json::from_str(json).unwrap();
        assert!(matches!(
            msg,
            PlayerMessage::SeatActionRequest {
                action: SeatAction::Standup,
                seat: Seat(4),
                display_name: None,
                ..
            }
        ));
    }

    #[test]
    fn test_snapshot_request_without_last_revision() {
        let msg = PlayerMessage::SnapshotRequest {
            request_id: RequestId::new("r"),
            uid: Uid::new("p1"),
            last_revision: None,
        };
        let json = serde_json::to_value(&msg).unwrap();
        assert_eq!(json["type"], "SNAPSHOT_REQUEST");
        assert!(json.get("lastRevision").is_none());
    }
}
