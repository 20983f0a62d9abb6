//! Duel room server binary.

use anyhow::Result;
use clap::Parser;
use duel_server::{Cli, ServerConfig, server};
use tracing::info;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("info,duel_server=debug")),
        )
        .init();

    let cli = Cli::parse();
    let config = ServerConfig::load(&cli)?;
    info!(?config, "Starting Duel server");

    server::run(config).await
}
