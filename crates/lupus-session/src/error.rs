//! Error types for the replica layer.

use lupus_protocol::SeatRejectReason;

/// Why a request a replica made did not complete.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SessionError {
    /// No `SNAPSHOT_RESPONSE` arrived before the deadline.
    #[error("snapshot request timed out")]
    SnapshotTimeout,

    /// A newer snapshot request took this one's slot.
    #[error("snapshot request superseded by a newer one")]
    Superseded,

    /// No `SEAT_ACTION_ACK` arrived before the deadline.
    #[error("seat request timed out")]
    SeatRequestTimeout,

    /// The Host answered the seat request with a failure.
    #[error("seat request rejected: {0:?}")]
    SeatRejected(Option<SeatRejectReason>),

    /// The request could not be sent, or the room was left.
    #[error("disconnected from room")]
    Disconnected,
}
