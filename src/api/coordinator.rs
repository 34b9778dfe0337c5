//! Coordinator HTTP surface (port 5000): cycle control, status, collaborator
//! health, dynamic configuration, and the Prometheus metrics exposition.

use crate::api::envelope::{envelope, ok};
use crate::api::AppState;
use crate::config::ConfigValue;
use crate::models::CycleMode;
use crate::CoreError;
use axum::extract::{Path, State};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use serde_json::json;

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/start_trading_cycle", post(start_trading_cycle))
        .route("/cancel_cycle", post(cancel_cycle))
        .route("/current_cycle", get(current_cycle))
        .route("/cycle/:cycle_id", get(get_cycle))
        .route("/service_health", get(service_health))
        .route("/workflow_config", post(workflow_config))
        .route("/reload", post(reload))
        .route("/metrics", get(metrics))
        .with_state(state)
}

async fn health() -> Response {
    envelope("coordinator", json!({}))
}

#[derive(Debug, Deserialize)]
struct StartCycleRequest {
    mode: Option<CycleMode>,
}

async fn start_trading_cycle(
    State(state): State<AppState>,
    body: Option<Json<StartCycleRequest>>,
) -> Result<Response, CoreError> {
    let mode = body.and_then(|Json(r)| r.mode);
    let cycle_id = state.coordinator.start_cycle(mode).await?;
    Ok(ok("coordinator", "cycle_id", cycle_id))
}

/// Signals the active cycle's stage loops to stop; the cycle finalizes as
/// `failed` with reason `cancelled` within one in-flight collaborator call.
async fn cancel_cycle(State(state): State<AppState>) -> Response {
    let cancelled = state.coordinator.cancel_cycle();
    ok("coordinator", "cancelled", cancelled)
}

async fn current_cycle(State(state): State<AppState>) -> Result<Response, CoreError> {
    match state.coordinator.current_cycle() {
        Some(view) => Ok(ok("coordinator", "cycle", view)),
        None => Ok(ok("coordinator", "cycle", serde_json::Value::Null)),
    }
}

async fn get_cycle(
    State(state): State<AppState>,
    Path(cycle_id): Path<String>,
) -> Result<Response, CoreError> {
    let cycle = state.coordinator.get_cycle(&cycle_id).await?;
    Ok(ok("coordinator", "cycle", cycle))
}

async fn service_health(State(state): State<AppState>) -> Response {
    let statuses = state.coordinator.service_health().await;
    ok("coordinator", "services", statuses)
}

#[derive(Debug, Deserialize)]
struct WorkflowConfigRequest {
    key: String,
    value: ConfigValue,
}

#[derive(Debug, Serialize)]
struct WorkflowConfigResponse {
    key: String,
}

async fn workflow_config(
    State(state): State<AppState>,
    Json(req): Json<WorkflowConfigRequest>,
) -> Response {
    state.coordinator.update_config(&req.key, req.value);
    ok("coordinator", "updated", WorkflowConfigResponse { key: req.key })
}

/// Operator control: re-read schedule boundaries from the configuration
/// store without restarting the process.
async fn reload(State(state): State<AppState>) -> Response {
    state.coordinator.reload();
    ok("coordinator", "reloaded", true)
}

async fn metrics(State(state): State<AppState>) -> impl IntoResponse {
    state.metrics.render()
}
