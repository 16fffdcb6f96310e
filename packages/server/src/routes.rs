//! Account and health endpoints
//!
//! - `GET /health` - Health check endpoint
//! - `POST /signup` - Create an account, returning its member id
//! - `POST /login` - Check credentials, returning the account's member id

use axum::{extract::State, response::Json, routing::get, routing::post, Router};
use kintree_core::sync::{AuthResponse, LoginRequest, SignupRequest};
use serde::{Deserialize, Serialize};

use crate::{AppState, HttpError};

#[derive(Debug, Serialize, Deserialize)]
pub struct HealthStatus {
    pub status: String,
    pub version: String,
}

/// Health check endpoint
///
/// ```bash
/// curl http://localhost:3001/health
/// ```
async fn health_check() -> Json<HealthStatus> {
    Json(HealthStatus {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}

/// Create an account
///
/// Duplicate emails are rejected with `409 CONFLICT`, missing fields with
/// `400 VALIDATION_ERROR`.
async fn signup(
    State(state): State<AppState>,
    Json(request): Json<SignupRequest>,
) -> Result<Json<AuthResponse>, HttpError> {
    let response = state.hub.signup(request).await?;
    Ok(Json(response))
}

/// Check credentials; unknown email or wrong password is `401`
async fn login(
    State(state): State<AppState>,
    Json(request): Json<LoginRequest>,
) -> Result<Json<AuthResponse>, HttpError> {
    let response = state.hub.login(request).await?;
    Ok(Json(response))
}

pub fn routes(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health_check))
        .route("/signup", post(signup))
        .route("/login", post(login))
        .with_state(state)
}
