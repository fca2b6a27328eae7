mod capture;
mod config;
mod coordinator;
mod cursor;
mod dispatcher;
mod monitor;
mod pacing;
mod parser;
mod platform;
mod scheduler;
mod triggers;

#[cfg(test)]
mod testing;

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use crate::config::Config;
use crate::coordinator::Coordinator;
use crate::platform::discord::DiscordClient;

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,rollbot=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting bot...");

    // The token is checked before anything touches the network
    let token = config::token_from_env()?;

    let config_path = std::env::args()
        .nth(1)
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from("config.toml"));

    info!("Loading configuration from: {}", config_path.display());
    let config = Config::load(&config_path)
        .with_context(|| format!("Failed to load config from {}", config_path.display()))?;

    info!("Configuration loaded successfully");
    info!("  Channel: {}", config::CHANNEL_ID);
    info!("  Game bot: {}", config::PEER_ID);
    info!("  Roll command: {}", config.claim.roll_command);
    info!("  Capture log: {}", config.capture.path.display());

    let client = DiscordClient::new(&token, config::API_BASE, config.transport.clone())?;
    let coordinator = Coordinator::new(
        Arc::new(client),
        config,
        config::CHANNEL_ID,
        config::PEER_ID,
    );

    let running = coordinator.run_flag();
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => {
                info!("Bot stopped by user, finishing current work");
                running.stop();
            }
            Err(e) => error!("Failed to listen for Ctrl-C: {}", e),
        }
    });

    coordinator.run().await
}
