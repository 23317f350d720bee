//! MCP Chat Relay server
//!
//! Entry point for the relay binary.

use mimalloc::MiMalloc;

/// Global allocator for improved performance.
#[global_allocator]
static GLOBAL: MiMalloc = MiMalloc;

use std::sync::Arc;

use anyhow::Context;
use dotenvy::dotenv;
use tracing::info;

use mcp_chat_relay::config::AppConfig;
use mcp_chat_relay::{server, telemetry};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env before reading configuration
    dotenv().ok();

    let config = AppConfig::load().context("failed to load configuration")?;
    telemetry::init(config.log.format)?;

    info!(
        name: "app.config.loaded",
        host = %config.server.host,
        port = config.server.port,
        mcp_servers = config.mcp.servers.len(),
        "Configuration loaded"
    );

    server::start_server(Arc::new(config)).await
}
