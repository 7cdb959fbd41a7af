use crate::error::{ServerError, ServerResult};
use crate::state::ServerState;
use axum::extract::{Path, Query, State};
use axum::response::IntoResponse;
use axum::Json;
use index::{ExamAnalysis, TemplateMetadata};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

#[derive(Debug, Serialize, Deserialize)]
pub struct CollectionList {
    /// Template ids with a collection on the backend.
    pub templates: Vec<String>,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeleteResponse {
    pub template_id: String,
    pub deleted: bool,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MetadataQuery {
    #[serde(default)]
    pub template_id: Option<String>,
}

/// List template collections (`GET /api/v1/collections`)
pub async fn list_collections(
    State(state): State<Arc<ServerState>>,
) -> ServerResult<impl IntoResponse> {
    let templates = state.collections.list_collections().await;
    Ok(Json(CollectionList { templates }))
}

/// Drop a template collection (`DELETE /api/v1/collections/{template_id}`)
///
/// Backend failures are reported as `deleted: false`, not as an error status.
pub async fn delete_collection(
    State(state): State<Arc<ServerState>>,
    Path(template_id): Path<String>,
) -> ServerResult<impl IntoResponse> {
    let template_id = required(Some(template_id))?;
    let deleted = state.collections.delete_collection(&template_id).await;
    tracing::info!(template_id = %template_id, deleted, "collection delete requested");
    Ok(Json(DeleteResponse {
        template_id,
        deleted,
    }))
}

/// Domain, difficulty and type histograms (`GET /api/v1/collections/{template_id}/analysis`)
pub async fn analyze_collection(
    State(state): State<Arc<ServerState>>,
    Path(template_id): Path<String>,
) -> ServerResult<Json<ExamAnalysis>> {
    let template_id = required(Some(template_id))?;
    Ok(Json(state.collections.analyze(&template_id).await))
}

/// Exam metadata for the template picker (`GET /api/exams/metadata?templateId=`)
///
/// Unknown templates yield empty lists and a zero total.
pub async fn exam_metadata(
    State(state): State<Arc<ServerState>>,
    Query(query): Query<MetadataQuery>,
) -> ServerResult<Json<TemplateMetadata>> {
    let template_id = required(query.template_id)?;
    Ok(Json(state.collections.template_metadata(&template_id).await))
}

fn required(template_id: Option<String>) -> ServerResult<String> {
    template_id
        .map(|id| id.trim().to_string())
        .filter(|id| !id.is_empty())
        .ok_or_else(|| ServerError::BadRequest("templateId is required".to_string()))
}
