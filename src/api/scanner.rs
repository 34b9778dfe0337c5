//! Catalyst Scanner HTTP surface (port 5001): on-demand and constrained
//! scans, and idempotent scan-result lookups.

use crate::api::envelope::{envelope, ok};
use crate::api::AppState;
use crate::models::CycleMode;
use crate::CoreError;
use axum::extract::{Query, State};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::Deserialize;
use serde_json::json;

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/scan", get(scan))
        .route("/scan_symbols", post(scan_symbols))
        .route("/get_scan_results", get(get_scan_results))
        .with_state(state)
}

async fn health() -> axum::response::Response {
    envelope("scanner", json!({}))
}

#[derive(Debug, Deserialize)]
struct ScanQuery {
    mode: Option<CycleMode>,
}

async fn scan(
    State(state): State<AppState>,
    Query(q): Query<ScanQuery>,
) -> Result<axum::response::Response, CoreError> {
    let mode = q.mode.unwrap_or(CycleMode::Normal);
    let result = state.scanner.scan(mode).await?;
    Ok(ok("scanner", "scan", result))
}

#[derive(Debug, Deserialize)]
struct ScanSymbolsRequest {
    symbols: Vec<String>,
}

async fn scan_symbols(
    State(state): State<AppState>,
    Json(req): Json<ScanSymbolsRequest>,
) -> Result<axum::response::Response, CoreError> {
    let result = state.scanner.scan_symbols(&req.symbols).await?;
    Ok(ok("scanner", "scan", result))
}

#[derive(Debug, Deserialize)]
struct ScanResultsQuery {
    scan_id: String,
}

async fn get_scan_results(
    State(state): State<AppState>,
    Query(q): Query<ScanResultsQuery>,
) -> Result<axum::response::Response, CoreError> {
    let result = state.scanner.get_scan_results(&q.scan_id).await?;
    Ok(ok("scanner", "scan", result))
}
