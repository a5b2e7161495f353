//! Room configuration.

use serde::{Deserialize, Serialize};

/// Configuration for a hosted room.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RoomConfig {
    /// Minimum seated players for an emergency restart to be allowed.
    pub min_players: usize,
}

impl Default for RoomConfig {
    fn default() -> Self {
        Self { min_players: 3 }
    }
}
