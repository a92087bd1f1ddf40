//! # Bridge Node
//!
//! Runs the event bus bridge over WebSocket.
//!
//! ## Startup Sequence
//!
//! 1. Initialise logging (from env)
//! 2. Load configuration (file named by `BRIDGE_CONFIG` or the first argument)
//! 3. Create the in-memory bus and token identities
//! 4. Build the bridge (rules are validated here)
//! 5. Serve until Ctrl+C, then shut down gracefully

mod config;
mod telemetry;

use anyhow::{Context, Result};
use eventbus_bridge::{BridgeService, EventBusBridge, TokenIdentityProvider};
use shared_bus::InMemoryEventBus;
use std::sync::Arc;
use tracing::{info, warn};

#[tokio::main]
async fn main() -> Result<()> {
    telemetry::init(&telemetry::TelemetryConfig::from_env())
        .context("failed to initialise logging")?;

    let config = config::load().context("failed to load configuration")?;
    if config.bridge.inbound_permitted.is_empty() && config.bridge.outbound_permitted.is_empty() {
        warn!("No permitted rules configured; every client action will be denied");
    }

    let bus = Arc::new(InMemoryEventBus::new());
    let identities = Arc::new(TokenIdentityProvider::new(config.identities));
    info!(identities = identities.len(), "Loaded identities");

    let bridge = EventBusBridge::new(bus, config.bridge).context("invalid bridge options")?;
    let service =
        BridgeService::new(config.server, bridge, identities).context("invalid server options")?;
    let handle = service.start().await.context("failed to start bridge service")?;

    info!(addr = %handle.local_addr(), "Bridge node is running. Press Ctrl+C to stop.");
    tokio::signal::ctrl_c().await?;

    info!("Shutting down");
    handle.shutdown().await?;

    Ok(())
}
