//! Client configuration.

use lupus_room::RoomConfig;
use lupus_session::ReplicaConfig;
use lupus_transport::ChannelConfig;

/// Everything a host or player client can be tuned with.
#[derive(Debug, Clone, Default)]
pub struct ClientConfig {
    pub channel: ChannelConfig,
    /// Only read by the Host.
    pub room: RoomConfig,
    pub replica: ReplicaConfig,
}
