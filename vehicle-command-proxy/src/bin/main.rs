use anyhow::{Context, Result};
use clap::Parser;
use tokio::signal;
use tracing_subscriber::prelude::*;
use tracing_subscriber::EnvFilter;

use vehicle_command_proxy::{config::load_config, http::router, AppState};

#[derive(Parser)]
#[command(name = "vehicle-command-proxy", about = "Fleet API-compatible command proxy")]
struct Cli {
    #[arg(long, default_value = "vehicle-command-proxy.toml")]
    config: String,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(tracing_subscriber::fmt::layer())
        .init();

    let cli = Cli::parse();
    let config = load_config(&cli.config).context("failed to load configuration")?;
    let bind_addr = format!("{}:{}", config.http.host, config.http.port);

    let state = AppState::new(config).context("failed to build proxy state")?;
    let app = router(state);

    let listener = tokio::net::TcpListener::bind(&bind_addr).await.context("failed to bind listener")?;
    tracing::info!(%bind_addr, "vehicle-command-proxy listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            match signal::ctrl_c().await {
                Ok(()) => tracing::info!("received Ctrl+C, shutting down"),
                Err(err) => tracing::error!(error = %err, "failed to listen for shutdown signal"),
            }
        })
        .await
        .context("server error")?;

    Ok(())
}
