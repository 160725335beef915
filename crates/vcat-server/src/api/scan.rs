use axum::{extract::State, Extension, Json};
use serde::Deserialize;

use crate::middleware::RequestId;

use super::{map_engine_error, ApiError, ApiResponse, AppState, ResponseMeta};

#[derive(Debug, Deserialize)]
pub(super) struct ScanStructureRequest {
    pub url: String,
    #[serde(default)]
    pub deep: bool,
}

/// Synchronous structure scan: the crawl-plan preview. Long sites are
/// bounded by the scan depth and per-target timeouts rather than a
/// request-level deadline.
pub(super) async fn scan_structure(
    State(state): State<AppState>,
    Extension(req_id): Extension<RequestId>,
    Json(body): Json<ScanStructureRequest>,
) -> Result<Json<ApiResponse<vcat_scraper::NavNode>>, ApiError> {
    let tree = state
        .orchestrator
        .scan_structure(&body.url, body.deep)
        .await
        .map_err(|e| map_engine_error(req_id.0.clone(), &e))?;

    Ok(Json(ApiResponse {
        data: tree,
        meta: ResponseMeta::new(req_id.0),
    }))
}
