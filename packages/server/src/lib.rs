//! Kintree sync server
//!
//! Thin transport over [`SyncHub`]: a WebSocket endpoint carrying the
//! session protocol, plus account signup/login over HTTP.
//!
//! # Endpoints
//!
//! - `GET /ws` - WebSocket session (JSON `ClientMessage` in, `ServerMessage` out)
//! - `GET /health`, `POST /signup`, `POST /login` - see [`routes`]
//!
//! # Usage
//!
//! ```bash
//! KINTREE_PORT=3001 RUST_LOG=debug cargo run --bin kintree-server
//! ```

use std::sync::Arc;

use axum::{
    http::{header, Method},
    Router,
};
use kintree_core::{SyncConfig, SyncHub};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

mod http_error;
pub mod routes;
pub mod ws;

pub use http_error::HttpError;

/// Application state shared across all endpoints
#[derive(Clone)]
pub struct AppState {
    pub hub: Arc<SyncHub>,
}

impl AppState {
    pub fn new(hub: Arc<SyncHub>) -> Self {
        Self { hub }
    }
}

/// Create the main application router with all endpoint modules
pub fn create_router(state: AppState) -> Router {
    let cors = cors_layer(&state.hub.config().cors_origins);
    Router::new()
        .merge(routes::routes(state.clone()))
        .merge(ws::routes(state))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
}

/// CORS layer for browser clients
///
/// An empty origin list allows any origin. Entries that are not valid
/// header values are skipped with a warning.
fn cors_layer(origins: &[String]) -> CorsLayer {
    let layer = CorsLayer::new()
        .allow_methods([Method::GET, Method::POST])
        .allow_headers(Any)
        .allow_credentials(false);

    if origins.is_empty() {
        return layer.allow_origin(Any);
    }

    let origins: Vec<header::HeaderValue> = origins
        .iter()
        .filter_map(|origin| match origin.parse::<header::HeaderValue>() {
            Ok(value) => Some(value),
            Err(e) => {
                tracing::warn!("⚠️ Ignoring invalid CORS origin '{}': {}", origin, e);
                None
            }
        })
        .collect();
    layer.allow_origin(origins)
}

/// Start the sync server
///
/// # Errors
///
/// Returns error if the configured address is invalid or the server fails
/// to bind or start.
pub async fn start_server(hub: Arc<SyncHub>) -> anyhow::Result<()> {
    let config: SyncConfig = hub.config().clone();
    let addr = config.socket_addr()?;
    let app = create_router(AppState::new(hub));

    tracing::info!("🚀 Kintree sync server starting on http://{}", addr);
    tracing::info!("📡 WebSocket sessions on ws://{}/ws", addr);
    if config.cors_origins.is_empty() {
        tracing::info!("📡 CORS enabled for any origin");
    } else {
        tracing::info!("📡 CORS enabled for {}", config.cors_origins.join(", "));
    }

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
