use axum::{
    extract::{Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use chrono::Utc;
use serde::Deserialize;

use crate::{
    db::DbError,
    errors::ServiceError,
    handlers::AppState,
    reports::{
        format_date, DailySalesReport, DailyVisitsReport, DateRange, KpiSummary, ProbeReport,
        StockSnapshot,
    },
    tracing::{log_error, ErrorKind},
};

/// Body text for a probe where no candidate table answered
pub const PROBE_FAILURE_MESSAGE: &str = "no candidate table answered";

/// Optional `from` / `to` bounds, used verbatim when present
#[derive(Debug, Default, Deserialize)]
pub struct RangeQuery {
    pub from: Option<String>,
    pub to: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct SnapshotQuery {
    pub date: Option<String>,
}

/// Bearer-protected report routes
pub fn report_routes() -> Router<AppState> {
    Router::new()
        .route("/kpis", get(get_kpis))
        .route("/sales/daily", get(get_daily_sales))
        .route("/visits/daily", get(get_daily_visits))
        .route("/stock/full", get(get_stock_snapshot))
        .route("/ping-supa", get(ping_backend))
}

fn backend_failure(handler: &str, err: DbError) -> ServiceError {
    log_error(&err, ErrorKind::Backend, handler);
    ServiceError::Backend(err)
}

fn today() -> chrono::NaiveDate {
    Utc::now().date_naive()
}

/// 30-day sales, visits and conversion
pub async fn get_kpis(State(state): State<AppState>) -> Result<Json<KpiSummary>, ServiceError> {
    let summary = state
        .reports
        .kpis(today())
        .await
        .map_err(|e| backend_failure("kpis", e))?;

    Ok(Json(summary))
}

/// Units sold per day
pub async fn get_daily_sales(
    State(state): State<AppState>,
    Query(params): Query<RangeQuery>,
) -> Result<Json<DailySalesReport>, ServiceError> {
    let range = DateRange::resolve(params.from, params.to, today());
    let report = state
        .reports
        .daily_sales(range)
        .await
        .map_err(|e| backend_failure("sales_daily", e))?;

    Ok(Json(report))
}

/// Visits per day
pub async fn get_daily_visits(
    State(state): State<AppState>,
    Query(params): Query<RangeQuery>,
) -> Result<Json<DailyVisitsReport>, ServiceError> {
    let range = DateRange::resolve(params.from, params.to, today());
    let report = state
        .reports
        .daily_visits(range)
        .await
        .map_err(|e| backend_failure("visits_daily", e))?;

    Ok(Json(report))
}

/// Raw stock rows for one date, today by default
pub async fn get_stock_snapshot(
    State(state): State<AppState>,
    Query(params): Query<SnapshotQuery>,
) -> Result<Json<StockSnapshot>, ServiceError> {
    let date = params
        .date
        .filter(|d| !d.is_empty())
        .unwrap_or_else(|| format_date(today()));

    let snapshot = state
        .reports
        .stock_snapshot(date)
        .await
        .map_err(|e| backend_failure("stock_full", e))?;

    Ok(Json(snapshot))
}

/// Backend connectivity probe
pub async fn ping_backend(State(state): State<AppState>) -> Response {
    match state.reports.probe().await {
        Ok(table) => Json(ProbeReport::reachable(table)).into_response(),
        Err(err) => {
            log_error(&err, ErrorKind::Backend, "ping");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(ProbeReport::unreachable(PROBE_FAILURE_MESSAGE)),
            )
                .into_response()
        }
    }
}
