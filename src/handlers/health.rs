use axum::{extract::State, response::Json, routing::get, Router};
use serde::{Deserialize, Serialize};

use crate::handlers::AppState;

/// Runtime version captured at build time
pub const RUNTIME_VERSION: &str = match option_env!("RUSTC_VERSION") {
    Some(version) => version,
    None => "unknown",
};

/// Liveness response
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthResponse {
    pub ok: bool,
    pub uptime_s: f64,
    /// Runtime version; the field name is kept for existing dashboards
    pub node: String,
}

/// Which secrets are configured, never their values
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EnvCheckResponse {
    pub ok: bool,
    pub has_api_secret: bool,
    pub has_url: bool,
    pub has_service_role: bool,
    pub port: u16,
}

/// Unauthenticated operational routes
///
/// - GET /health    - liveness probe, always 200 while the process runs
/// - GET /env-check - presence of required settings
pub fn health_routes() -> Router<AppState> {
    Router::new()
        .route("/health", get(liveness_check))
        .route("/env-check", get(env_check))
}

async fn liveness_check(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        ok: true,
        uptime_s: state.started_at.elapsed().as_secs_f64(),
        node: RUNTIME_VERSION.to_string(),
    })
}

async fn env_check(State(state): State<AppState>) -> Json<EnvCheckResponse> {
    let config = &state.config;
    Json(EnvCheckResponse {
        ok: true,
        has_api_secret: config.has_api_secret(),
        has_url: config.has_database_url(),
        has_service_role: config.has_service_key(),
        port: config.port,
    })
}
