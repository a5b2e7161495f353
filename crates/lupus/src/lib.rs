//! # Lupus
//!
//! Host-authoritative room sync for werewolf tables.
//!
//! One participant, the Host, owns the only authoritative copy of the room
//! and runs the night's rules. Everyone else keeps a replica that is
//! updated from the Host's broadcasts and repaired with snapshots. Players
//! never change state themselves; they send intents and the Host decides.
//!
//! - [`HostClient`]: creates a room and drives it.
//! - [`PlayerClient`]: joins a room and follows it.
//! - [`ClientView`]: what a participant currently sees.
//! - [`RoomEvent`]: turns, deaths and seat changes for the UI layer.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use lupus::prelude::*;
//!
//! # async fn run() -> Result<(), LupusError> {
//! let broker = MemoryBroker::new();
//! let template = vec![RoleId::Wolf, RoleId::Seer, RoleId::Villager];
//!
//! let host = HostClient::initialize_as_host(
//!     &broker,
//!     RoomCode::new("4821"),
//!     Uid::new("host"),
//!     template,
//!     ClientConfig::default(),
//! )
//! .await?;
//! let player = PlayerClient::join_as_player(
//!     &broker,
//!     RoomCode::new("4821"),
//!     Uid::new("ana"),
//!     ClientConfig::default(),
//! )
//! .await?;
//!
//! player.request_snapshot(None).await?;
//! player.take_seat(Seat(1), Some("Ana".into()), None).await?;
//! # host.leave_room().await?;
//! # Ok(())
//! # }
//! ```

mod config;
mod core;
mod error;
mod event;
mod host;
mod player;

pub use config::ClientConfig;
pub use error::LupusError;
pub use event::{ClientView, RoomEvent};
pub use host::HostClient;
pub use player::PlayerClient;

pub use lupus_protocol as protocol;
pub use lupus_room as room;
pub use lupus_rules as rules;
pub use lupus_session as session;
pub use lupus_transport as transport;

/// Installs a `tracing` subscriber that logs to stderr.
///
/// The filter comes from `RUST_LOG`, defaulting to `info`. Does nothing if
/// a global subscriber is already set.
pub fn init_tracing() {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init();
}

/// The types most programs need.
pub mod prelude {
    pub use crate::{ClientConfig, ClientView, HostClient, LupusError, PlayerClient, RoomEvent};
    pub use lupus_protocol::{
        ActionExtra, BroadcastGameState, Potion, PrivatePayload, RoleId, RoomCode, RoomStatus,
        Seat, StepId, Uid,
    };
    pub use lupus_session::SessionError;
    pub use lupus_transport::{ConnectionStatus, MemoryBroker};
    #[cfg(feature = "websocket")]
    pub use lupus_transport::WsBroker;
}
