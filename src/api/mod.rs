//! Three Axum routers (Coordinator / News Collector / Catalyst Scanner)
//! sharing one `AppState` injected at boot, per the one-process model.

pub mod coordinator;
pub mod envelope;
pub mod news;
pub mod scanner;

use crate::coordinator::Coordinator;
use crate::news::{NarrativeSweep, NewsCollector};
use crate::scanner::CatalystScanner;
use metrics_exporter_prometheus::PrometheusHandle;
use std::sync::Arc;

/// Shared application state injected into every handler. Each router only
/// uses the fields relevant to its component, but all three see the same
/// instances — there is exactly one of each component per process.
#[derive(Clone)]
pub struct AppState {
    pub coordinator: Arc<Coordinator>,
    pub news: Arc<NewsCollector>,
    pub narratives: Arc<NarrativeSweep>,
    pub scanner: Arc<CatalystScanner>,
    pub metrics: PrometheusHandle,
}

pub fn coordinator_router(state: AppState) -> axum::Router {
    with_ambient_layers(coordinator::router(state))
}

pub fn news_router(state: AppState) -> axum::Router {
    with_ambient_layers(news::router(state))
}

pub fn scanner_router(state: AppState) -> axum::Router {
    with_ambient_layers(scanner::router(state))
}

fn with_ambient_layers(router: axum::Router) -> axum::Router {
    router
        .layer(tower_http::cors::CorsLayer::permissive())
        .layer(axum::middleware::from_fn(request_logging))
}

/// Logs method, path, status, and latency for every request except health
/// checks, which would otherwise drown out everything else at `info` level.
async fn request_logging(
    request: axum::http::Request<axum::body::Body>,
    next: axum::middleware::Next,
) -> axum::response::Response {
    let method = request.method().clone();
    let path = request.uri().path().to_string();
    if path == "/health" {
        return next.run(request).await;
    }
    let start = std::time::Instant::now();
    let response = next.run(request).await;
    let latency_ms = start.elapsed().as_millis() as u64;
    let status = response.status().as_u16();
    if status >= 500 {
        tracing::warn!(%method, %path, status, latency_ms, "request failed");
    } else {
        tracing::info!(%method, %path, status, latency_ms, "request handled");
    }
    response
}
