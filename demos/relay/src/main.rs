//! Stand-alone WebSocket relay for Lupus tables.
//!
//! ```text
//! lupus-relay [ADDR]        # default 127.0.0.1:9000
//! ```
//!
//! Clients reach it with `WsBroker::new("ws://ADDR")`. The relay only moves
//! frames between room members; the Host of each room stays authoritative.

use lupus_transport::RelayServer;

const DEFAULT_ADDR: &str = "127.0.0.1:9000";

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    lupus::init_tracing();

    let addr = std::env::args().nth(1).unwrap_or_else(|| DEFAULT_ADDR.to_string());
    let relay = RelayServer::bind(&addr).await?;
    tracing::info!(addr = %relay.local_addr()?, "lupus relay ready");

    relay.run().await?;
    Ok(())
}
