//! Identity types and game vocabulary shared by every Lupus layer.

use std::fmt;

use serde::de::{self, Unexpected, Visitor};
use serde::{Deserialize, Deserializer, Serialize};

// ---------------------------------------------------------------------------
// Identity types
// ---------------------------------------------------------------------------

/// A seat number at the table.
///
/// A plain number on the wire, and a string key when used in a JSON map
/// (`{"3": {...}}`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(transparent)]
pub struct Seat(pub u32);

// Hand-written so seat-keyed maps also decode inside internally tagged
// messages, where serde buffers keys as strings and never parses them back
// into integers.
impl<'de> Deserialize<'de> for Seat {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        struct SeatVisitor;

        impl Visitor<'_> for SeatVisitor {
            type Value = Seat;

            fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str("a seat number")
            }

            fn visit_u64<E: de::Error>(self, v: u64) -> Result<Seat, E> {
                u32::try_from(v)
                    .map(Seat)
                    .map_err(|_| E::invalid_value(Unexpected::Unsigned(v), &self))
            }

            fn visit_i64<E: de::Error>(self, v: i64) -> Result<Seat, E> {
                u32::try_from(v)
                    .map(Seat)
                    .map_err(|_| E::invalid_value(Unexpected::Signed(v), &self))
            }

            fn visit_str<E: de::Error>(self, v: &str) -> Result<Seat, E> {
                v.parse()
                    .map(Seat)
                    .map_err(|_| E::invalid_value(Unexpected::Str(v), &self))
            }
        }

        deserializer.deserialize_any(SeatVisitor)
    }
}

impl fmt::Display for Seat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// A participant's identity, stable across reconnects.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Uid(pub String);

impl Uid {
    pub fn new(uid: impl Into<String>) -> Self {
        Self(uid.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Uid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// The short code players type to find a room.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RoomCode(pub String);

impl RoomCode {
    pub fn new(code: impl Into<String>) -> Self {
        Self(code.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for RoomCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Correlates a reliable request with its acknowledgement.
///
/// Generated client-side with enough entropy that two live requests in one
/// room never collide.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RequestId(pub String);

impl RequestId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }
}

impl fmt::Display for RequestId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

// ---------------------------------------------------------------------------
// Roles
// ---------------------------------------------------------------------------

/// Every role a template can contain.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum RoleId {
    Villager,
    Wolf,
    Seer,
    Witch,
    Hunter,
    Guard,
    Psychic,
    Gargoyle,
    WolfRobot,
    WolfQueen,
    Nightmare,
    Celebrity,
    Magician,
    Witcher,
    SpiritKnight,
    DarkWolfKing,
}

/// Which side a role plays for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Faction {
    Villager,
    God,
    Wolf,
}

/// What a seer learns about a seat.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Alignment {
    Good,
    Wolf,
}

impl RoleId {
    pub fn faction(self) -> Faction {
        match self {
            Self::Villager => Faction::Villager,
            Self::Wolf
            | Self::Gargoyle
            | Self::WolfRobot
            | Self::WolfQueen
            | Self::Nightmare
            | Self::SpiritKnight
            | Self::DarkWolfKing => Faction::Wolf,
            Self::Seer
            | Self::Witch
            | Self::Hunter
            | Self::Guard
            | Self::Psychic
            | Self::Celebrity
            | Self::Magician
            | Self::Witcher => Faction::God,
        }
    }

    pub fn is_wolf(self) -> bool {
        self.faction() == Faction::Wolf
    }

    /// Wolves that wake together, see each other and vote on the kill.
    /// The gargoyle and the wolf robot are wolf-aligned but act alone.
    pub fn votes_with_wolves(self) -> bool {
        matches!(
            self,
            Self::Wolf | Self::WolfQueen | Self::Nightmare | Self::SpiritKnight | Self::DarkWolfKing
        )
    }

    pub fn alignment(self) -> Alignment {
        if self.is_wolf() {
            Alignment::Wolf
        } else {
            Alignment::Good
        }
    }
}

impl fmt::Display for RoleId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Villager => "villager",
            Self::Wolf => "wolf",
            Self::Seer => "seer",
            Self::Witch => "witch",
            Self::Hunter => "hunter",
            Self::Guard => "guard",
            Self::Psychic => "psychic",
            Self::Gargoyle => "gargoyle",
            Self::WolfRobot => "wolfRobot",
            Self::WolfQueen => "wolfQueen",
            Self::Nightmare => "nightmare",
            Self::Celebrity => "celebrity",
            Self::Magician => "magician",
            Self::Witcher => "witcher",
            Self::SpiritKnight => "spiritKnight",
            Self::DarkWolfKing => "darkWolfKing",
        };
        f.write_str(name)
    }
}

// ---------------------------------------------------------------------------
// Night steps
// ---------------------------------------------------------------------------

/// Identifies one step of the night sequence.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum StepId {
    MagicianSwap,
    CelebrityDream,
    NightmareBlock,
    GuardProtect,
    WolfKill,
    WolfQueenCharm,
    WitchAction,
    SeerCheck,
    PsychicCheck,
    GargoyleCheck,
    WolfRobotLearn,
    HunterConfirm,
    DarkWolfKingConfirm,
}

impl fmt::Display for StepId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::MagicianSwap => "magicianSwap",
            Self::CelebrityDream => "celebrityDream",
            Self::NightmareBlock => "nightmareBlock",
            Self::GuardProtect => "guardProtect",
            Self::WolfKill => "wolfKill",
            Self::WolfQueenCharm => "wolfQueenCharm",
            Self::WitchAction => "witchAction",
            Self::SeerCheck => "seerCheck",
            Self::PsychicCheck => "psychicCheck",
            Self::GargoyleCheck => "gargoyleCheck",
            Self::WolfRobotLearn => "wolfRobotLearn",
            Self::HunterConfirm => "hunterConfirm",
            Self::DarkWolfKingConfirm => "darkWolfKingConfirm",
        };
        f.write_str(name)
    }
}

// ---------------------------------------------------------------------------
// RoomStatus
// ---------------------------------------------------------------------------

/// Lifecycle of a room.
///
/// ```text
/// Unseated ⇄ Seated → Assigned → Ready → Ongoing → Ended
///               ↑                                    │
///               └──────────── restart ───────────────┘
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RoomStatus {
    /// At least one seat is empty.
    Unseated,
    /// Every seat is filled, roles not yet dealt.
    Seated,
    /// Roles dealt, waiting for everyone to look at their card.
    Assigned,
    /// Everyone has seen their role.
    Ready,
    /// The night is running.
    Ongoing,
    /// The night has been resolved.
    Ended,
}

impl RoomStatus {
    /// Returns `true` if the room may move from `self` to `next`.
    ///
    /// Restarts send any dealt room back to `Seated`; an emergency restart
    /// may also be triggered from `Seated` itself.
    pub fn can_transition_to(self, next: RoomStatus) -> bool {
        use RoomStatus::*;
        matches!(
            (self, next),
            (Unseated, Seated)
                | (Seated, Unseated)
                | (Seated, Assigned)
                | (Assigned, Ready)
                | (Ready, Ongoing)
                | (Ongoing, Ended)
                | (Seated | Assigned | Ready | Ongoing | Ended, Seated)
        )
    }

    /// Seats may only change hands before roles are dealt.
    pub fn allows_seat_changes(self) -> bool {
        matches!(self, RoomStatus::Unseated | RoomStatus::Seated)
    }

    /// Whether cards are on the table. A room leaves this set only through
    /// a restart, so a replica seeing a state outside it knows every
    /// private message from an earlier deal is void.
    pub fn has_roles_dealt(self) -> bool {
        !self.allows_seat_changes()
    }
}

impl fmt::Display for RoomStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Unseated => "unseated",
            Self::Seated => "seated",
            Self::Assigned => "assigned",
            Self::Ready => "ready",
            Self::Ongoing => "ongoing",
            Self::Ended => "ended",
        };
        f.write_str(name)
    }
}

// =========================================================================
// Tests
// =========================================================================

#[cfg(test)]
mod tests {
    use super::*;

    // =====================================================================
    // Identity types
    // =====================================================================

    #[test]
    fn test_seat_serializes_as_plain_number() {
        assert_eq!(serde_json::to_string(&Seat(4)).unwrap(), "4");
        let seat: Seat = serde_json::from_str("7").unwrap();
        assert_eq!(seat, Seat(7));
    }

    #[test]
    fn test_seat_works_as_json_map_key() {
        let mut map = std::collections::BTreeMap::new();
        map.insert(Seat(2), true);
        let json = serde_json::to_string(&map).unwrap();
        assert_eq!(json, r#"{"2":true}"#);
        let back: std::collections::BTreeMap<Seat, bool> = serde_json::from_str(&json).unwrap();
        assert_eq!(back, map);
    }

    #[test]
    fn test_seat_rejects_negative_and_non_numeric() {
        assert!(serde_json::from_str::<Seat>("-1").is_err());
        assert!(serde_json::from_str::<Seat>("\"x\"").is_err());
    }

    #[test]
    fn test_uid_serializes_as_plain_string() {
        assert_eq!(serde_json::to_string(&Uid::new("p8")).unwrap(), "\"p8\"");
        assert_eq!(Uid::new("p8").to_string(), "p8");
    }

    // =====================================================================
    // Roles
    // =====================================================================

    #[test]
    fn test_role_ids_are_camel_case_on_the_wire() {
        assert_eq!(serde_json::to_string(&RoleId::WolfQueen).unwrap(), "\"wolfQueen\"");
        assert_eq!(serde_json::to_string(&RoleId::Seer).unwrap(), "\"seer\"");
        let role: RoleId = serde_json::from_str("\"darkWolfKing\"").unwrap();
        assert_eq!(role, RoleId::DarkWolfKing);
    }

    #[test]
    fn test_role_display_matches_wire_name() {
        for role in [RoleId::WolfRobot, RoleId::SpiritKnight, RoleId::Villager] {
            let wire = serde_json::to_string(&role).unwrap();
            assert_eq!(wire.trim_matches('"'), role.to_string());
        }
    }

    #[test]
    fn test_lone_wolves_do_not_vote() {
        assert!(RoleId::Gargoyle.is_wolf());
        assert!(!RoleId::Gargoyle.votes_with_wolves());
        assert!(!RoleId::WolfRobot.votes_with_wolves());
        assert!(RoleId::WolfQueen.votes_with_wolves());
    }

    #[test]
    fn test_seer_alignment() {
        assert_eq!(RoleId::SpiritKnight.alignment(), Alignment::Wolf);
        assert_eq!(RoleId::Witcher.alignment(), Alignment::Good);
        assert_eq!(RoleId::Villager.alignment(), Alignment::Good);
    }

    #[test]
    fn test_step_display_matches_wire_name() {
        let wire = serde_json::to_string(&StepId::DarkWolfKingConfirm).unwrap();
        assert_eq!(wire, "\"darkWolfKingConfirm\"");
        assert_eq!(StepId::DarkWolfKingConfirm.to_string(), "darkWolfKingConfirm");
    }

    // =====================================================================
    // RoomStatus
    // =====================================================================

    #[test]
    fn test_status_forward_path_is_allowed() {
        use RoomStatus::*;
        let path = [Unseated, Seated, Assigned, Ready, Ongoing, Ended];
        for pair in path.windows(2) {
            assert!(pair[0].can_transition_to(pair[1]), "{} -> {}", pair[0], pair[1]);
        }
    }

    #[test]
    fn test_status_skips_are_rejected() {
        use RoomStatus::*;
        assert!(!Unseated.can_transition_to(Ongoing));
        assert!(!Seated.can_transition_to(Ready));
        assert!(!Ended.can_transition_to(Ongoing));
        assert!(!Unseated.can_transition_to(Unseated));
    }

    #[test]
    fn test_status_restart_edges() {
        use RoomStatus::*;
        assert!(Ongoing.can_transition_to(Seated));
        assert!(Seated.can_transition_to(Seated));
        assert!(Ended.can_transition_to(Seated));
    }

    #[test]
    fn test_seat_changes_only_before_dealing() {
        assert!(RoomStatus::Unseated.allows_seat_changes());
        assert!(RoomStatus::Seated.allows_seat_changes());
        assert!(!RoomStatus::Assigned.allows_seat_changes());
        assert!(!RoomStatus::Ongoing.allows_seat_changes());
        assert!(RoomStatus::Ended.has_roles_dealt());
        assert!(!RoomStatus::Seated.has_roles_dealt());
    }
}
