use crate::state::ServerState;
use axum::body::Bytes;
use axum::extract::State;
use axum::Json;
use matcher::{RemediationRequest, RemediationResponse};
use std::sync::Arc;

/// Remediation lookup (`POST /api/remediation`)
///
/// Always answers `200 OK`. A body that is empty or not a JSON object is treated as a
/// request with no fields, which resolves to an empty item list (or the fixture item while
/// the fixture is enabled).
///
/// # Request
///
/// ```json
/// {
///   "questionId": "q-17",
///   "keywords": ["splint", "wrist"],
///   "prompt": "Which orthosis positions the wrist in extension?",
///   "domain": "intervention",
///   "limit": 3,
///   "testId": "otr-baseline"
/// }
/// ```
///
/// # Response
///
/// ```json
/// { "items": [ { "id": "...", "title": "...", "excerpt": "...", "source": "..." } ] }
/// ```
pub async fn resolve_remediation(
    State(state): State<Arc<ServerState>>,
    body: Bytes,
) -> Json<RemediationResponse> {
    let request = parse_request(&body);
    Json(state.pipeline.resolve(&request).await)
}

fn parse_request(body: &[u8]) -> RemediationRequest {
    if body.iter().all(u8::is_ascii_whitespace) {
        return RemediationRequest::default();
    }
    serde_json::from_slice(body).unwrap_or_else(|err| {
        tracing::debug!(error = %err, "unreadable remediation body; treating as empty");
        RemediationRequest::default()
    })
}
