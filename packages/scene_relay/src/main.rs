use anyhow::{Context, Result};
use clap::Parser;
use std::path::PathBuf;
use tracing::{info, warn};
use tracing_subscriber::prelude::*;

use scene_relay::{FileConfig, RelayConfig, RelayServer, load_config};

#[derive(Parser)]
#[command(name = "relay")]
#[command(about = "Relay messages between show-control and browser WebSocket clients")]
struct Args {
    /// Optional relay.toml; RELAY_* env vars override it
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Enable debug logging (logs every relayed payload)
    #[arg(short, long)]
    debug: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // Setup logging
    let default_directive = if args.debug {
        "scene_relay=debug,relay=debug,tower_http=debug,info"
    } else {
        "scene_relay=info,relay=info,tower_http=info,warn"
    };
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_directive));
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer())
        .with(env_filter)
        .init();

    let file_config: FileConfig = load_config(args.config.as_deref())
        .extract()
        .context("Failed to load configuration")?;
    let config = RelayConfig::from_file(&file_config)?;
    info!(
        send_timeout_ms = config.send_timeout.as_millis() as u64,
        outbound_buffer = config.outbound_buffer,
        "Starting scene relay"
    );

    let server = RelayServer::bind(config)
        .await
        .context("Failed to bind relay endpoints")?;

    let shutdown_signal = async {
        match tokio::signal::ctrl_c().await {
            Ok(()) => info!("Received shutdown signal, stopping relay..."),
            Err(e) => {
                warn!("Failed to install Ctrl+C handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    server.serve(shutdown_signal).await?;

    info!("Shutdown complete");
    Ok(())
}
