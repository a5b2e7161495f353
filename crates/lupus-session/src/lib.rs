//! Replica reconciliation for Lupus.
//!
//! Every participant, the Host included, keeps a [`Replica`]: the last
//! public projection it applied, the private information addressed to it,
//! and the requests it is waiting on.
//!
//! # How it fits in the stack
//!
//! ```text
//! Runtime (above)   ← feeds envelopes in, sends what the replica returns
//!     ↕
//! Session (this crate)   ← revisions, snapshot slot, seat ACKs, private view
//!     ↕
//! Protocol / Transport (below)   ← message types, connection status
//! ```
//!
//! Reconciliation rules:
//!
//! 1. A `STATE_UPDATE` is applied only if its revision is newer than the
//!    last one applied, so duplicates and late arrivals are harmless.
//! 2. A replica has at most one snapshot request outstanding; starting a
//!    new one supersedes the old one, whose timer can then never fire.
//! 3. Responses and ACKs are matched on both request id and addressee.

mod error;
mod replica;
mod view;

pub use error::SessionError;
pub use replica::{PendingRequest, Replica, ReplicaConfig, ReplicaEvent, SnapshotStart};
pub use view::PrivateView;
