//! The Host's authoritative room for Lupus.
//!
//! [`HostRoom`] owns the canonical game state: seats, dealt roles, the night
//! in progress and the revision counter. It is synchronous and does no I/O.
//! Every call that can change something returns the [`HostEnvelope`]s the
//! Host must publish, already in wire order:
//!
//! ```text
//! events → STATE_UPDATE (revision + 1) → replies → private messages
//! ```
//!
//! # Key types
//!
//! - [`HostRoom`]: the state machine
//! - [`RoomConfig`]: room settings
//! - [`RoomError`]: why a Host operation was refused
//!
//! [`HostEnvelope`]: lupus_protocol::HostEnvelope

mod batch;
mod config;
mod error;
mod night;
mod room;

pub use config::RoomConfig;
pub use error::RoomError;
pub use room::{HostRoom, RejectedAction, SeatedPlayer};
