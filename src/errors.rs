//! Core error kinds and their HTTP/propagation policy.
//! Pilot in Command: failure classification
//! Mission: never let a collaborator hiccup take down a cycle it didn't need to.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Json, Response};
use serde_json::json;

/// Error kinds grouped by failure semantics, not by underlying type.
#[derive(Debug, thiserror::Error)]
pub enum CoreError {
    /// Remote I/O failure; retried in-stage with backoff.
    #[error("transient network error: {0}")]
    TransientNetwork(String),

    /// A source's own rate limit was hit; it is dropped from the current cycle.
    #[error("rate limited by source {0}")]
    RateLimited(String),

    /// Malformed operator/upstream input. Never retried.
    #[error("validation error: {0}")]
    Validation(String),

    /// start_cycle while one is already active.
    #[error("a cycle is already running")]
    Busy,

    /// Unknown cycle_id / scan_id / news_id.
    #[error("not found: {0}")]
    NotFound(String),

    /// Persistence unreachable, or a required collaborator failed its health check.
    /// Fatal to the current cycle.
    #[error("dependency unavailable: {0}")]
    DependencyDown(String),

    /// Stage timeout. Treated as stage-partial unless the persistence port itself
    /// timed out, in which case callers should promote this to `DependencyDown`.
    #[error("deadline exceeded: {0}")]
    DeadlineExceeded(String),
}

impl CoreError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            CoreError::TransientNetwork(_) => StatusCode::BAD_GATEWAY,
            CoreError::RateLimited(_) => StatusCode::TOO_MANY_REQUESTS,
            CoreError::Validation(_) => StatusCode::BAD_REQUEST,
            CoreError::Busy => StatusCode::CONFLICT,
            CoreError::NotFound(_) => StatusCode::NOT_FOUND,
            CoreError::DependencyDown(_) => StatusCode::SERVICE_UNAVAILABLE,
            CoreError::DeadlineExceeded(_) => StatusCode::GATEWAY_TIMEOUT,
        }
    }

    pub fn code(&self) -> &'static str {
        match self {
            CoreError::TransientNetwork(_) => "transient_network_error",
            CoreError::RateLimited(_) => "rate_limited",
            CoreError::Validation(_) => "validation_error",
            CoreError::Busy => "busy",
            CoreError::NotFound(_) => "not_found",
            CoreError::DependencyDown(_) => "dependency_down",
            CoreError::DeadlineExceeded(_) => "deadline_exceeded",
        }
    }
}

impl IntoResponse for CoreError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let body = Json(json!({
            "status": "error",
            "code": self.code(),
            "message": self.to_string(),
        }));
        (status, body).into_response()
    }
}

impl From<rusqlite::Error> for CoreError {
    fn from(err: rusqlite::Error) -> Self {
        CoreError::DependencyDown(format!("persistence: {err}"))
    }
}

impl From<reqwest::Error> for CoreError {
    fn from(err: reqwest::Error) -> Self {
        CoreError::TransientNetwork(err.to_string())
    }
}

impl From<tokio::time::error::Elapsed> for CoreError {
    fn from(_: tokio::time::error::Elapsed) -> Self {
        CoreError::DeadlineExceeded("operation exceeded its deadline".to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_codes_map_by_failure_kind() {
        assert_eq!(CoreError::Busy.status_code(), StatusCode::CONFLICT);
        assert_eq!(
            CoreError::NotFound("x".into()).status_code(),
            StatusCode::NOT_FOUND
        );
        assert_eq!(
            CoreError::Validation("x".into()).status_code(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            CoreError::DependencyDown("x".into()).status_code(),
            StatusCode::SERVICE_UNAVAILABLE
        );
    }
}
