//! skyfleet - Multi-cloud infrastructure control plane
//!
//! Serves the HTTP control surface backed by a RocksDB store and a CSP
//! gateway. Scheduled jobs persisted by a previous run are re-armed at
//! start-up.
//!
//! # Environment
//!
//! - `LISTEN_ADDR` - HTTP listen address (default `0.0.0.0:1323`)
//! - `DATA_DIR` - RocksDB directory (default `/data/skyfleet`)
//! - `CSP_GATEWAY_URL` - CSP gateway base URL (default `http://localhost:1024/spider`)

use std::sync::Arc;

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use skyfleet_api::{create_router, ApiConfig, ApiState};
use skyfleet_call::{CallConfig, CallGateway};
use skyfleet_control::{ControlPlaneService, HttpCspClient, Registrar};
use skyfleet_jobs::JobManager;
use skyfleet_store::RocksStore;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,skyfleet=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("Starting skyfleet");

    let mut config = ApiConfig::default();
    if let Ok(listen_addr) = std::env::var("LISTEN_ADDR") {
        config.listen_addr = listen_addr;
    }
    let data_dir = std::env::var("DATA_DIR").unwrap_or_else(|_| "/data/skyfleet".into());
    let csp_gateway_url = std::env::var("CSP_GATEWAY_URL")
        .unwrap_or_else(|_| "http://localhost:1024/spider".into());

    tracing::info!(
        listen_addr = %config.listen_addr,
        data_dir = %data_dir,
        csp_gateway_url = %csp_gateway_url,
        "Configuration loaded"
    );

    tracing::info!(path = %data_dir, "Opening RocksDB store");
    let store = Arc::new(RocksStore::open(&data_dir)?);

    let gateway = CallGateway::new(CallConfig::default())?;
    let csp = Arc::new(HttpCspClient::new(gateway, csp_gateway_url));

    let control = Arc::new(ControlPlaneService::with_defaults(
        Arc::clone(&store),
        Arc::clone(&csp),
    ));
    let registrar = Arc::new(Registrar::new(Arc::clone(&store), csp));
    let jobs = Arc::new(JobManager::with_defaults(store, registrar));

    let restored = jobs.restore()?;
    tracing::info!(restored, "Scheduled jobs re-armed");

    let listen_addr = config.listen_addr.clone();
    let app = create_router(ApiState::new(control, jobs, config));

    tracing::info!(listen_addr = %listen_addr, "Starting HTTP server");
    let listener = tokio::net::TcpListener::bind(&listen_addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
