use axum::{
    extract::{Path, State},
    Extension, Json,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::middleware::RequestId;

use super::{map_db_error, map_engine_error, ApiError, ApiResponse, AppState, ResponseMeta};

#[derive(Debug, Serialize)]
pub(super) struct JobItem {
    pub job_id: Uuid,
    pub job_type: String,
    pub status: String,
    /// Targets planned but not yet processed.
    pub queued: i32,
    pub total_targets: i32,
    pub processed: i32,
    pub succeeded: i32,
    pub failed: i32,
    pub error_message: Option<String>,
    pub summary: Option<serde_json::Value>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
}

impl JobItem {
    fn from_row(row: vcat_db::JobRow) -> Self {
        Self {
            job_id: row.public_id,
            job_type: row.job_type,
            status: row.status,
            queued: (row.total_targets - row.processed).max(0),
            total_targets: row.total_targets,
            processed: row.processed,
            succeeded: row.succeeded,
            failed: row.failed,
            error_message: row.error_message,
            summary: row.summary,
            created_at: row.created_at,
            updated_at: row.updated_at,
            completed_at: row.completed_at,
        }
    }
}

#[derive(Debug, Deserialize)]
pub(super) struct StopJobRequest {
    #[serde(default)]
    pub delete_data: bool,
}

pub(super) async fn submit_job(
    State(state): State<AppState>,
    Extension(req_id): Extension<RequestId>,
    Json(spec): Json<vcat_engine::JobSpec>,
) -> Result<Json<ApiResponse<JobItem>>, ApiError> {
    let job = state
        .orchestrator
        .submit(&spec)
        .await
        .map_err(|e| map_engine_error(req_id.0.clone(), &e))?;

    std::sync::Arc::clone(&state.orchestrator).spawn(job.id);

    Ok(Json(ApiResponse {
        data: JobItem::from_row(job),
        meta: ResponseMeta::new(req_id.0),
    }))
}

pub(super) async fn list_active_jobs(
    State(state): State<AppState>,
    Extension(req_id): Extension<RequestId>,
) -> Result<Json<ApiResponse<Vec<JobItem>>>, ApiError> {
    let rows = vcat_db::list_active_jobs(&state.pool)
        .await
        .map_err(|e| map_db_error(req_id.0.clone(), &e))?;

    let data = rows.into_iter().map(JobItem::from_row).collect();

    Ok(Json(ApiResponse {
        data,
        meta: ResponseMeta::new(req_id.0),
    }))
}

pub(super) async fn get_job(
    State(state): State<AppState>,
    Extension(req_id): Extension<RequestId>,
    Path(id): Path<Uuid>,
) -> Result<Json<ApiResponse<JobItem>>, ApiError> {
    let row = vcat_db::get_job_by_public_id(&state.pool, id)
        .await
        .map_err(|e| map_db_error(req_id.0.clone(), &e))?;

    Ok(Json(ApiResponse {
        data: JobItem::from_row(row),
        meta: ResponseMeta::new(req_id.0),
    }))
}

pub(super) async fn stop_job(
    State(state): State<AppState>,
    Extension(req_id): Extension<RequestId>,
    Path(id): Path<Uuid>,
    Json(body): Json<StopJobRequest>,
) -> Result<Json<ApiResponse<JobItem>>, ApiError> {
    let row = vcat_db::get_job_by_public_id(&state.pool, id)
        .await
        .map_err(|e| map_db_error(req_id.0.clone(), &e))?;

    let row = state
        .orchestrator
        .request_stop(row.id, body.delete_data)
        .await
        .map_err(|e| map_engine_error(req_id.0.clone(), &e))?;

    Ok(Json(ApiResponse {
        data: JobItem::from_row(row),
        meta: ResponseMeta::new(req_id.0),
    }))
}
