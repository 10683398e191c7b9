//! ==============================================================================
//! main.rs - windsensor proxy entry point
//! ==============================================================================
//!
//! purpose:
//!     serves the averages and history documents of one remote wind sensor
//!     to browsers, refreshing them only while somebody is looking.
//!
//! responsibilities:
//!     - load and validate configuration (file + environment)
//!     - initialise logging at the configured level
//!     - wire fetcher, polling controller and access gate together
//!     - serve http until ctrl-c
//!
//! relationships:
//!     - config.rs   settings, fatal on anything missing
//!     - fetcher.rs  outbound GET + json parsing
//!     - poller.rs   demand-driven polling and the two cache slots
//!     - access.rs   api key and cors allow-list
//!     - server.rs   axum routes
//!
//! architecture:
//!
//!     ┌──────────────────────────────────────────────────────────┐
//!     │                  windsensor-proxy                        │
//!     │  ┌─────────────┐   note_access()   ┌──────────────────┐  │
//!     │  │ web server  │ ────────────────▶ │ polling          │  │
//!     │  │ (axum)      │ ◀──────────────── │ controller       │  │
//!     │  └──────┬──────┘   current_value   └────────┬─────────┘  │
//!     │         │ authorize / cors                  │ every 10s  │
//!     │  ┌──────┴──────┐                   ┌────────┴─────────┐  │
//!     │  │ access gate │                   │ fetcher (reqwest)│  │
//!     │  └─────────────┘                   └────────┬─────────┘  │
//!     └─────────────────────────────────────────────┼────────────┘
//!                                                   ▼
//!                                      remote wind sensor api
//!
//! ==============================================================================

mod access;
mod config;
mod domain;
mod fetcher;
mod poller;
mod server;

#[cfg(test)]
mod testing;

use anyhow::Result;
use std::sync::Arc;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    // step 1: load configuration
    // logging depends on it, so errors are reported after step 2
    let config = config::ServerConfig::load();

    // step 2: initialise logging
    let level = config.as_ref().map(|c| c.log_level).unwrap_or_default();
    init_logging(level);

    let config = match config {
        Ok(config) => config,
        Err(e) => {
            error!("{}", e);
            return Err(e.into());
        }
    };

    let info = domain::ServerInfo::capture();
    info!("windsensor-proxy version = {}", info.version);
    config.print_summary();

    // step 3: wire the components
    let endpoints = domain::SensorEndpoints::new(&config.sensor_url, &config.sensor_id);
    let fetcher = fetcher::HttpFetcher::new()?;
    let state = Arc::new(server::AppState {
        poller: poller::PollingController::new(fetcher, endpoints, config.polling),
        gate: access::AccessGate::new(config.api_key.clone(), config.allowed_origin.clone()),
        info,
    });

    // step 4: serve until ctrl-c
    server::run(state, config.port).await
}

fn init_logging(level: config::LogLevel) {
    // RUST_LOG may still refine individual targets
    let filter = EnvFilter::builder()
        .with_default_directive(level.as_filter().into())
        .from_env_lossy();

    tracing_subscriber::fmt().with_env_filter(filter).init();
}
