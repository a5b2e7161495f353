//! Connection status as seen by the UI layer.
//!
//! ```text
//! Connecting ──→ Syncing ──→ Live
//!      │            │          │
//!      └────────────┴──────────┴──→ Disconnected
//! ```
//!
//! Transitions are driven from outside: the replica marks `Syncing` when it
//! asks for a snapshot and `Live` when a state update lands. Any state can
//! fall back to `Disconnected`, and recovery goes through `Syncing` again.

use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tokio::sync::watch;

/// The 4-state connection status of a room channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConnectionStatus {
    Connecting,
    Syncing,
    Live,
    Disconnected,
}

impl fmt::Display for ConnectionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Connecting => write!(f, "connecting"),
            Self::Syncing => write!(f, "syncing"),
            Self::Live => write!(f, "live"),
            Self::Disconnected => write!(f, "disconnected"),
        }
    }
}

/// Shared owner of the connection status.
///
/// Cheap to clone; every clone updates the same `watch` channel, so the
/// channel, the replica and the UI all agree on one value.
#[derive(Debug, Clone)]
pub struct StatusTracker {
    tx: Arc<watch::Sender<ConnectionStatus>>,
}

impl StatusTracker {
    /// Creates a tracker in the `Connecting` state.
    pub fn new() -> Self {
        let (tx, _) = watch::channel(ConnectionStatus::Connecting);
        Self { tx: Arc::new(tx) }
    }

    /// The current status.
    pub fn current(&self) -> ConnectionStatus {
        *self.tx.borrow()
    }

    /// Subscribes to status changes.
    pub fn subscribe(&self) -> watch::Receiver<ConnectionStatus> {
        self.tx.subscribe()
    }

    pub fn mark_as_syncing(&self) {
        self.set(ConnectionStatus::Syncing);
    }

    pub fn mark_as_live(&self) {
        self.set(ConnectionStatus::Live);
    }

    pub fn mark_disconnected(&self) {
        self.set(ConnectionStatus::Disconnected);
    }

    /// Sets the status, notifying watchers only on an actual change.
    fn set(&self, next: ConnectionStatus) {
        let changed = self.tx.send_if_modified(|current| {
            if *current == next {
                false
            } else {
                *current = next;
                true
            }
        });
        if changed {
            tracing::debug!(status = %next, "connection status changed");
        }
    }
}

impl Default for StatusTracker {
    fn default() -> Self {
        Self::new()
    }
}
