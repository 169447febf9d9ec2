//! Reporting API Library
//!
//! Authenticated, read-only HTTP reports (sales, visits, stock) computed
//! from a remote PostgREST store.
#![forbid(unsafe_code)]
#![deny(rust_2018_idioms)]
#![warn(clippy::all, clippy::perf, clippy::dbg_macro)]

pub mod auth;
pub mod config;
pub mod db;
pub mod errors;
pub mod handlers;
pub mod middleware_helpers;
pub mod reports;
pub mod services;
pub mod tracing;

use axum::{
    http::{header, HeaderValue, Method},
    middleware, Router,
};
use std::sync::Arc;
use std::time::Instant;
use tower_http::cors::CorsLayer;

use crate::auth::ApiSecret;
use crate::config::AppConfig;
use crate::db::ReportStore;
use crate::services::ReportService;

// App state definition
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<AppConfig>,
    pub api_secret: ApiSecret,
    pub reports: ReportService,
    pub started_at: Instant,
}

impl AppState {
    pub fn new(config: AppConfig, store: Arc<dyn ReportStore>) -> Self {
        Self {
            api_secret: ApiSecret::new(config.api_secret.clone()),
            config: Arc::new(config),
            reports: ReportService::new(store),
            started_at: Instant::now(),
        }
    }
}

/// Full application router: public health routes, bearer-protected reports
/// and the shared request-id, tracing and CORS layers.
///
/// Unmatched paths fall through to axum's default 404, unauthenticated.
pub fn app_router(state: AppState) -> Router {
    let protected = handlers::reports::report_routes().route_layer(
        middleware::from_fn_with_state(state.api_secret.clone(), auth::require_bearer),
    );

    Router::new()
        .merge(handlers::health::health_routes())
        .merge(protected)
        .layer(crate::tracing::configure_http_tracing())
        .layer(cors_layer(&state.config))
        .layer(middleware::from_fn(
            middleware_helpers::request_id::request_id_middleware,
        ))
        .with_state(state)
}

fn cors_layer(config: &AppConfig) -> CorsLayer {
    let origins: Vec<HeaderValue> = config
        .cors_allowed_origins
        .as_deref()
        .map(|raw| {
            raw.split(',')
                .map(str::trim)
                .filter(|origin| !origin.is_empty())
                .filter_map(|origin| HeaderValue::from_str(origin).ok())
                .collect()
        })
        .unwrap_or_default();

    if origins.is_empty() {
        return CorsLayer::permissive();
    }

    CorsLayer::new()
        .allow_origin(origins)
        .allow_methods([Method::GET])
        .allow_headers([header::AUTHORIZATION, header::CONTENT_TYPE])
}
