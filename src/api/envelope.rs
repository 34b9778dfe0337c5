//! Shared response envelope: every success response carries
//! `{status, service, timestamp}`.

use axum::response::{IntoResponse, Json, Response};
use chrono::Utc;
use serde::Serialize;
use serde_json::{json, Value};

pub fn envelope(service: &str, data: Value) -> Response {
    let mut body = json!({
        "status": "ok",
        "service": service,
        "timestamp": Utc::now().to_rfc3339(),
    });
    if let Value::Object(map) = &mut body {
        if let Value::Object(fields) = data {
            map.extend(fields);
        } else {
            map.insert("data".to_string(), data);
        }
    }
    Json(body).into_response()
}

pub fn ok<T: Serialize>(service: &str, field: &str, value: T) -> Response {
    envelope(service, json!({ field: value }))
}
