//! mb-exporter - Prometheus exporter for Mercedes-Benz vehicle data
//!
//! Polls the vehicle data API on behalf of one authenticated customer and
//! republishes the readings as Prometheus gauges.

mod api;
mod auth;
mod collector;
mod config;
mod server;

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use metrics_exporter_prometheus::PrometheusBuilder;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use crate::auth::{AuthorizationFlow, TokenManager, TokenStore};
use crate::collector::Collector;
use crate::config::Config;
use crate::server::AppState;

#[derive(Parser)]
#[command(name = "mb-exporter")]
#[command(about = "Prometheus exporter for Mercedes-Benz vehicle data", long_about = None)]
struct Cli {
    /// Path to the config file (defaults to the platform config directory)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Listen address, overriding the config file
    #[arg(short, long)]
    listen: Option<String>,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize logging
    let filter = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| filter.into()),
        )
        .with(tracing_subscriber::fmt::layer().with_target(false))
        .init();

    let config = Config::load(cli.config.as_deref())?;

    let prometheus = PrometheusBuilder::new()
        .install_recorder()
        .context("Failed to install metrics recorder")?;
    collector::describe();

    let oauth = auth::build_oauth_client(&config)?;
    let store = TokenStore::new(config.state_path()?);
    let tokens = Arc::new(TokenManager::new(
        oauth.clone(),
        store,
        auth::requested_scopes(),
    ));
    let flow = Arc::new(AuthorizationFlow::new(
        oauth,
        auth::requested_scopes(),
        Arc::clone(&tokens),
    ));
    let client = api::VehicleClient::new(
        Arc::clone(&tokens),
        config.api_base_url.clone(),
        config.vin.clone(),
    )?;
    let collector = Arc::new(Collector::new(client));

    let app = server::build_app(AppState {
        tokens,
        flow,
        collector,
        prometheus,
    });

    let listen = cli.listen.unwrap_or(config.listen);
    let addr: SocketAddr = listen
        .parse()
        .with_context(|| format!("Invalid listen address {listen}"))?;
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind {addr}"))?;
    tracing::info!("Listening on {}, authorize via http://{}/oauth.auth", addr, addr);

    axum::serve(listener, app).await?;

    Ok(())
}
