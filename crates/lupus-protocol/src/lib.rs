//! Wire protocol for Lupus.
//!
//! This crate defines the "language" spoken inside a room:
//!
//! - **Types** ([`Seat`], [`Uid`], [`RoleId`], [`StepId`], [`RoomStatus`]):
//!   the shared game vocabulary.
//! - **Messages** ([`HostBroadcast`], [`PrivateMessage`], [`PlayerMessage`]):
//!   the public whitelist, the addressed payloads, and player intents.
//! - **Codec** ([`Codec`] trait, [`JsonCodec`]): how messages become bytes.
//! - **Errors** ([`ProtocolError`]).
//!
//! # Architecture
//!
//! ```text
//! Transport (bytes) → Protocol (HostEnvelope / PlayerMessage) → Room / Replica
//! ```
//!
//! The protocol layer knows nothing about connections or timers.

mod codec;
mod error;
mod messages;
mod types;

pub use codec::Codec;
#[cfg(feature = "json")]
pub use codec::JsonCodec;
pub use error::ProtocolError;
pub use messages::{
    ActionExtra, BroadcastGameState, BroadcastPlayer, ConfirmInfo, HostBroadcast, HostEnvelope,
    PlayerMessage, Potion, PrivateMessage, PrivatePayload, RejectReason, Rejection, RoleCard,
    RoleResult, SeatAction, SeatRejectReason, SeerResult, WitchInfo,
};
pub use types::{Alignment, Faction, RequestId, RoleId, RoomCode, RoomStatus, Seat, StepId, Uid};
