//! ==============================================================================
//! server.rs - http surface
//! ==============================================================================
//!
//! endpoints:
//!     GET /windsensor/averages?apikey=..   cached averages, or {}
//!     GET /windsensor/history?apikey=..    cached history, or {}
//!     GET /info                            {version, start}, no key needed
//!
//! a data request with a bad or missing key gets 400 "invalid request" and
//! does not touch the polling session.
//!
//! ==============================================================================

use crate::access::AccessGate;
use crate::domain::{ServerInfo, Slot};
use crate::fetcher::Fetcher;
use crate::poller::{PollingController, PollingState};

use anyhow::Result;
use axum::{
    extract::{Query, State},
    http::{header, HeaderMap, HeaderValue, StatusCode},
    response::{IntoResponse, Json, Response},
    routing::get,
    Router,
};
use serde::Deserialize;
use std::sync::Arc;
use tower_http::trace::TraceLayer;
use tracing::{error, info, warn};

/// shared between all handlers
pub struct AppState<F> {
    pub poller: PollingController<F>,
    pub gate: AccessGate,
    pub info: ServerInfo,
}

#[derive(Debug, Deserialize)]
pub struct AccessQuery {
    apikey: Option<String>,
}

pub fn router<F: Fetcher>(state: Arc<AppState<F>>) -> Router {
    Router::new()
        .route("/windsensor/averages", get(averages_handler::<F>))
        .route("/windsensor/history", get(history_handler::<F>))
        .route("/info", get(info_handler::<F>))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// serve until ctrl-c, then stop polling
pub async fn run<F: Fetcher>(state: Arc<AppState<F>>, port: u16) -> Result<()> {
    let app = router(Arc::clone(&state));

    let listener = tokio::net::TcpListener::bind(("0.0.0.0", port)).await?;
    info!("server listening on port {}", port);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    stop_polling(&state);
    info!("server stopped");
    Ok(())
}

fn stop_polling<F: Fetcher>(state: &AppState<F>) {
    if state.poller.state() == PollingState::Active {
        info!("polling still active, cancelling timers ...");
    }
    state.poller.shutdown();
}

async fn shutdown_signal() {
    match tokio::signal::ctrl_c().await {
        Ok(()) => info!("shutdown requested ..."),
        Err(e) => {
            error!("failed to listen for ctrl-c: {}", e);
            std::future::pending::<()>().await;
        }
    }
}

// ==============================================================================
// handlers
// ==============================================================================

async fn averages_handler<F: Fetcher>(
    State(state): State<Arc<AppState<F>>>,
    query: Option<Query<AccessQuery>>,
    headers: HeaderMap,
) -> Response {
    send_slot(&state, Slot::Averages, query, &headers).await
}

async fn history_handler<F: Fetcher>(
    State(state): State<Arc<AppState<F>>>,
    query: Option<Query<AccessQuery>>,
    headers: HeaderMap,
) -> Response {
    send_slot(&state, Slot::History, query, &headers).await
}

async fn info_handler<F: Fetcher>(State(state): State<Arc<AppState<F>>>) -> Json<ServerInfo> {
    Json(state.info.clone())
}

async fn send_slot<F: Fetcher>(
    state: &AppState<F>,
    slot: Slot,
    query: Option<Query<AccessQuery>>,
    headers: &HeaderMap,
) -> Response {
    let presented = query.as_ref().and_then(|Query(q)| q.apikey.as_deref());
    if !state.gate.authorize(presented) {
        return (StatusCode::BAD_REQUEST, "invalid request").into_response();
    }

    state.poller.note_access();
    let data = state
        .poller
        .current_value(slot)
        .await
        .unwrap_or_else(|| serde_json::json!({}));

    let mut response = Json(data).into_response();

    let origin = headers.get(header::ORIGIN).and_then(|v| v.to_str().ok());
    if let Some(allowed) = state.gate.cors_header_for(origin) {
        match HeaderValue::from_str(&allowed) {
            Ok(value) => {
                response.headers_mut().append(header::ACCESS_CONTROL_ALLOW_ORIGIN, value);
            }
            Err(e) => warn!("cannot echo origin {:?}: {}", allowed, e),
        }
    }

    response
}
