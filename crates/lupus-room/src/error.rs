//! Error types for the room layer.

use lupus_protocol::{RoomStatus, Uid};
use lupus_rules::RulesError;

/// Why a Host-only operation was refused.
///
/// Every precondition is checked before anything is touched, so an error
/// always means the room is unchanged.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RoomError {
    /// The caller is not the room's host.
    #[error("{0} is not the host")]
    NotHost(Uid),

    /// The room has no role template.
    #[error("room has no role template")]
    NoTemplate,

    /// The number of seated players differs from the role pool.
    #[error("{seated} players seated for {roles} roles")]
    SeatMismatch { seated: usize, roles: usize },

    #[error("{seated} players seated, at least {min} required")]
    TooFewPlayers { seated: usize, min: usize },

    /// The room's status doesn't allow this operation.
    #[error("cannot {op} while room is {status}")]
    InvalidState {
        op: &'static str,
        status: RoomStatus,
    },

    /// The step registry doesn't cover the template's night.
    #[error(transparent)]
    Rules(#[from] RulesError),
}
