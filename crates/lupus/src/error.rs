//! Unified error type for Lupus.

use lupus_protocol::ProtocolError;
use lupus_room::RoomError;
use lupus_rules::RulesError;
use lupus_session::SessionError;
use lupus_transport::TransportError;

/// Top-level error that wraps every layer's error.
///
/// The `#[from]` variants let `?` convert layer errors automatically.
#[derive(Debug, thiserror::Error)]
pub enum LupusError {
    #[error(transparent)]
    Transport(#[from] TransportError),

    #[error(transparent)]
    Protocol(#[from] ProtocolError),

    #[error(transparent)]
    Rules(#[from] RulesError),

    /// A Host operation was refused.
    #[error(transparent)]
    Room(#[from] RoomError),

    /// A reliable request failed (timeout, superseded, rejected).
    #[error(transparent)]
    Session(#[from] SessionError),

    /// The operation needs a seat and this participant has none.
    #[error("not seated")]
    NotSeated,

    /// The operation needs a dealt role and none has arrived yet.
    #[error("no role assigned")]
    NoRole,

    /// The client's actor has stopped (the room was left).
    #[error("client is no longer running")]
    Unavailable,
}
