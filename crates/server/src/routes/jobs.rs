use axum::{
    Router,
    extract::{Path, Query, State},
    response::Json as ResponseJson,
    routing::get,
};
use serde::Deserialize;
use services::services::background_jobs::JobRecord;
use utils::response::ApiResponse;
use uuid::Uuid;

use crate::{error::ApiError, state::AppState};

#[derive(Debug, Default, Deserialize)]
pub struct JobQuery {
    pub subject_id: Option<Uuid>,
}

/// GET /api/jobs, newest first
pub async fn list_jobs(
    State(state): State<AppState>,
    Query(query): Query<JobQuery>,
) -> Result<ResponseJson<ApiResponse<Vec<JobRecord>>>, ApiError> {
    Ok(ResponseJson(ApiResponse::success(state.jobs().list(query.subject_id).await)))
}

pub async fn get_job(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<ResponseJson<ApiResponse<JobRecord>>, ApiError> {
    let job = state
        .jobs()
        .get(id)
        .await
        .ok_or_else(|| ApiError::NotFound("job not found".to_string()))?;
    Ok(ResponseJson(ApiResponse::success(job)))
}

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/jobs", get(list_jobs))
        .route("/jobs/{id}", get(get_job))
}
