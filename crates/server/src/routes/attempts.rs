use axum::{
    Json, Router,
    extract::{Path, Query, State},
    response::Json as ResponseJson,
    routing::{get, post, put},
};
use chrono::Utc;
use db::models::{
    attempt::{Attempt, AttemptFilter, SaveAnswer, StartAttempt},
    result::{SkillResult, SkillResultView},
};
use serde::{Deserialize, Serialize};
use services::services::background_jobs::{JobKind, JobRecord};
use ts_rs::TS;
use utils::{
    pagination::{ListParams, Page},
    response::ApiResponse,
};
use uuid::Uuid;

use crate::{error::ApiError, state::AppState};

/// Submitted attempt with the grading job started for it
#[derive(Debug, Clone, Serialize, Deserialize, TS)]
pub struct AttemptSubmitted {
    pub attempt: Attempt,
    pub job: JobRecord,
}

async fn load_attempt(state: &AppState, id: Uuid) -> Result<Attempt, ApiError> {
    Attempt::find_by_id(state.pool(), id)
        .await?
        .ok_or_else(|| ApiError::NotFound("attempt not found".to_string()))
}

pub async fn list_attempts(
    State(state): State<AppState>,
    Query(filter): Query<AttemptFilter>,
    Query(params): Query<ListParams>,
) -> Result<ResponseJson<ApiResponse<Page<Attempt>>>, ApiError> {
    let page = Attempt::list(state.pool(), &filter, &params).await?;
    Ok(ResponseJson(ApiResponse::success(page)))
}

pub async fn start_attempt(
    State(state): State<AppState>,
    Json(payload): Json<StartAttempt>,
) -> Result<ResponseJson<ApiResponse<Attempt>>, ApiError> {
    let attempt = state.attempts().start(&payload).await?;
    Ok(ResponseJson(ApiResponse::success(attempt)))
}

pub async fn get_attempt(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<ResponseJson<ApiResponse<Attempt>>, ApiError> {
    Ok(ResponseJson(ApiResponse::success(load_attempt(&state, id).await?)))
}

pub async fn save_answer(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(payload): Json<SaveAnswer>,
) -> Result<ResponseJson<ApiResponse<Attempt>>, ApiError> {
    let attempt = state.attempts().save_answer(id, &payload.answer).await?;
    Ok(ResponseJson(ApiResponse::success(attempt)))
}

/// POST /api/attempts/{id}/submit
///
/// Also resubmits an attempt whose grading failed.
pub async fn submit_attempt(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<ResponseJson<ApiResponse<AttemptSubmitted>>, ApiError> {
    let attempt = state.attempts().submit(id, Utc::now()).await?;

    let grading = state.grading();
    let job = state
        .jobs()
        .submit(JobKind::Grading, id, async move { grading.grade_attempt(id).await.map(|_| ()) })
        .await;
    tracing::info!(attempt_id = %id, job_id = %job.id, "Grading started");

    Ok(ResponseJson(ApiResponse::success(AttemptSubmitted { attempt, job })))
}

pub async fn get_attempt_results(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<ResponseJson<ApiResponse<Vec<SkillResultView>>>, ApiError> {
    load_attempt(&state, id).await?;
    let results = SkillResult::find_by_attempt_id(state.pool(), id).await?;
    Ok(ResponseJson(ApiResponse::success(results)))
}

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/attempts", get(list_attempts).post(start_attempt))
        .route("/attempts/{id}", get(get_attempt))
        .route("/attempts/{id}/answer", put(save_answer))
        .route("/attempts/{id}/submit", post(submit_attempt))
        .route("/attempts/{id}/results", get(get_attempt_results))
}
