use axum::{
    Json, Router,
    extract::{Path, Query, State},
    response::Json as ResponseJson,
    routing::{get, post},
};
use chrono::Utc;
use db::models::dispute::{Dispute, DisputeFilter, ResolveDispute};
use utils::{
    pagination::{ListParams, Page},
    response::ApiResponse,
};
use uuid::Uuid;

use crate::{error::ApiError, state::AppState};

pub async fn list_disputes(
    State(state): State<AppState>,
    Query(filter): Query<DisputeFilter>,
    Query(params): Query<ListParams>,
) -> Result<ResponseJson<ApiResponse<Page<Dispute>>>, ApiError> {
    let page = Dispute::list(state.pool(), &filter, &params).await?;
    Ok(ResponseJson(ApiResponse::success(page)))
}

pub async fn get_dispute(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<ResponseJson<ApiResponse<Dispute>>, ApiError> {
    let dispute = Dispute::find_by_id(state.pool(), id)
        .await?
        .ok_or_else(|| ApiError::NotFound("dispute not found".to_string()))?;
    Ok(ResponseJson(ApiResponse::success(dispute)))
}

pub async fn resolve_dispute(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(payload): Json<ResolveDispute>,
) -> Result<ResponseJson<ApiResponse<Dispute>>, ApiError> {
    let dispute = state.disputes().resolve(id, &payload, Utc::now()).await?;
    Ok(ResponseJson(ApiResponse::success(dispute)))
}

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/disputes", get(list_disputes))
        .route("/disputes/{id}", get(get_dispute))
        .route("/disputes/{id}/resolve", post(resolve_dispute))
}
