//! Tether Broker Daemon
//!
//! A standalone broker that accepts node connections on a Unix socket and
//! routes requests and platform events between them and the bot
//! connections.
//!
//! Runs with the in-memory loopback driver. A real platform driver plugs
//! in through the `ChatClientFactory` seam in `tether-gateway`.

use anyhow::Result;
use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use tether_gateway::loopback::{GuildFixture, LoopbackFactory, LoopbackWorld};
use tether_router::{Router, RouterConfig};
use tether_transport::UnixSocketServer;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "tetherd")]
#[command(about = "Tether Broker Daemon")]
#[command(version)]
struct Cli {
    /// Socket path to bind
    #[arg(short, long, default_value = tether_core::DEFAULT_SOCKET_PATH)]
    socket: PathBuf,

    /// Broker name used in logs
    #[arg(short, long, default_value = "Tether Broker")]
    name: String,

    /// Bot user id the loopback driver reports after login
    #[arg(long, default_value = "loopback-bot")]
    bot_user_id: String,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let filter = if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::new("info")
    };
    tracing_subscriber::fmt().with_env_filter(filter).init();

    tracing::info!("Starting Tether broker");
    tracing::info!("Listening on: {}", cli.socket.display());

    // A small demo world so list and send requests have something to hit.
    let world = LoopbackWorld::new(cli.bot_user_id).with_guild(
        GuildFixture::new("guild-1", "Loopback Guild")
            .with_channel("channel-1", "general")
            .with_role("role-1", "members"),
    );
    let factory = Arc::new(LoopbackFactory::new(world));

    let config = RouterConfig {
        name: cli.name.clone(),
        ..Default::default()
    };
    let router = Router::new(config, factory);
    let server = UnixSocketServer::bind(&cli.socket)?;

    tracing::info!("Broker ready, accepting connections...");
    router.serve_on(server).await?;

    Ok(())
}
