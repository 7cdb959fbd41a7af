//! API route handlers
//!
//! - `remediation`: the learner-facing citation lookup
//! - `collections`: template collection administration and exam metadata
//! - `health`: liveness, readiness and Prometheus metrics

pub mod collections;
pub mod health;
pub mod remediation;

use crate::error::{ServerError, ServerResult};
use axum::response::IntoResponse;
use axum::Json;
use serde_json::json;

/// API version and base info (`GET /`)
pub async fn api_info() -> ServerResult<impl IntoResponse> {
    Ok(Json(json!({
        "name": "Remediation Server",
        "version": env!("CARGO_PKG_VERSION"),
        "api_version": "v1",
        "endpoints": [
            "/api/remediation",
            "/api/exams/metadata",
            "/api/v1/collections",
            "/api/v1/collections/{template_id}",
            "/api/v1/collections/{template_id}/analysis",
            "/health",
            "/ready",
            "/metrics"
        ]
    })))
}

/// 404 Not Found handler
pub async fn not_found() -> ServerError {
    ServerError::NotFound
}
