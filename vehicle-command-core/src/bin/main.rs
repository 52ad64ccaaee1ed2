use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tokio::signal;
use tracing_subscriber::prelude::*;
use tracing_subscriber::EnvFilter;

use vehicle_command_core::config::load_config;
use vehicle_command_core::transport::https::HttpsTransport;
use vehicle_command_core::transport::Transport;
use vehicle_command_core::{SessionCache, Vehicle};
use vehicle_command_proto::Domain;

#[derive(Parser)]
#[command(name = "vehicle-command", about = "Authenticated vehicle command client")]
struct Cli {
    #[arg(long, default_value = "vehicle-command.toml")]
    config: String,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Establish sessions with a vehicle and keep them warm until Ctrl+C.
    Connect {
        vin: String,
    },
    /// Send one opaque command payload (hex-encoded) to a domain.
    Send {
        vin: String,
        #[arg(value_enum)]
        domain: DomainArg,
        payload_hex: String,
    },
}

#[derive(Clone, clap::ValueEnum)]
enum DomainArg {
    Vcsec,
    Infotainment,
}

impl From<DomainArg> for Domain {
    fn from(value: DomainArg) -> Self {
        match value {
            DomainArg::Vcsec => Domain::Vcsec,
            DomainArg::Infotainment => Domain::Infotainment,
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(tracing_subscriber::fmt::layer())
        .init();

    let cli = Cli::parse();
    let config = load_config(&cli.config).context("failed to load configuration")?;

    match cli.command {
        Commands::Connect { vin } => run_connect(&config, vin).await,
        Commands::Send { vin, domain, payload_hex } => run_send(&config, vin, domain.into(), payload_hex).await,
    }
}

async fn run_connect(config: &vehicle_command_core::Config, vin: String) -> Result<()> {
    let vehicle = build_vehicle(config, vin).await?;
    vehicle.start().await;
    vehicle.load_cache().await?;

    for (domain, result) in vehicle.connect().await {
        match result {
            Ok(()) => tracing::info!(?domain, "session established"),
            Err(e) => tracing::warn!(?domain, error = %e, "failed to establish session"),
        }
    }

    match signal::ctrl_c().await {
        Ok(()) => tracing::info!("received Ctrl+C, shutting down"),
        Err(err) => tracing::error!(error = %err, "failed to listen for shutdown signal"),
    }

    vehicle.save_cache().await?;
    vehicle.stop().await;
    Ok(())
}

async fn run_send(config: &vehicle_command_core::Config, vin: String, domain: Domain, payload_hex: String) -> Result<()> {
    let payload = hex::decode(&payload_hex).context("payload must be valid hex")?;

    let vehicle = build_vehicle(config, vin).await?;
    vehicle.start().await;
    vehicle.load_cache().await?;

    let reply = vehicle
        .send_command(domain, &payload, Duration::from_secs(10))
        .await
        .context("command failed")?;
    tracing::info!(?reply, "command accepted");

    vehicle.save_cache().await?;
    vehicle.stop().await;
    Ok(())
}

async fn build_vehicle(config: &vehicle_command_core::Config, vin: String) -> Result<Vehicle> {
    let base_url = config
        .transport
        .relay_base_url
        .clone()
        .context("transport.relay-base-url must be set for the https transport")?;
    let client = reqwest::Client::builder().build().context("failed to build HTTP client")?;
    let transport: Arc<dyn Transport> = Arc::new(
        HttpsTransport::new(client, base_url, vin.clone(), Duration::from_millis(config.transport.allowed_latency_ms))
            .with_retry_interval(Duration::from_millis(config.transport.retry_interval_ms)),
    );

    let cache = SessionCache::open(&config.cache.data_dir, config.cache.max_entries)?;
    Ok(Vehicle::new(vin, transport).with_cache(Arc::new(cache)))
}
