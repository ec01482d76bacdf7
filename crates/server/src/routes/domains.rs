use axum::{
    Json, Router,
    extract::{Path, Query, State},
    response::Json as ResponseJson,
    routing::get,
};
use db::models::{
    domain::{CreateDomain, Domain, UpdateDomain},
    skill::Skill,
};
use utils::{
    pagination::{ListParams, Page},
    response::ApiResponse,
};
use uuid::Uuid;

use crate::{error::ApiError, state::AppState};

pub async fn list_domains(
    State(state): State<AppState>,
    Query(params): Query<ListParams>,
) -> Result<ResponseJson<ApiResponse<Page<Domain>>>, ApiError> {
    let page = Domain::list(state.pool(), &params).await?;
    Ok(ResponseJson(ApiResponse::success(page)))
}

pub async fn create_domain(
    State(state): State<AppState>,
    Json(payload): Json<CreateDomain>,
) -> Result<ResponseJson<ApiResponse<Domain>>, ApiError> {
    if payload.name.trim().is_empty() {
        return Err(ApiError::BadRequest("name must not be empty".to_string()));
    }
    let domain = Domain::create(state.pool(), Uuid::new_v4(), &payload).await?;
    Ok(ResponseJson(ApiResponse::success(domain)))
}

pub async fn get_domain(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<ResponseJson<ApiResponse<Domain>>, ApiError> {
    let domain = Domain::find_by_id(state.pool(), id)
        .await?
        .ok_or_else(|| ApiError::NotFound("domain not found".to_string()))?;
    Ok(ResponseJson(ApiResponse::success(domain)))
}

pub async fn update_domain(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(payload): Json<UpdateDomain>,
) -> Result<ResponseJson<ApiResponse<Domain>>, ApiError> {
    if payload.name.as_deref().is_some_and(|n| n.trim().is_empty()) {
        return Err(ApiError::BadRequest("name must not be empty".to_string()));
    }
    let domain = Domain::update(state.pool(), id, &payload)
        .await?
        .ok_or_else(|| ApiError::NotFound("domain not found".to_string()))?;
    Ok(ResponseJson(ApiResponse::success(domain)))
}

pub async fn delete_domain(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<ResponseJson<ApiResponse<()>>, ApiError> {
    if Domain::delete(state.pool(), id).await? == 0 {
        return Err(ApiError::NotFound("domain not found".to_string()));
    }
    Ok(ResponseJson(ApiResponse::success(())))
}

pub async fn list_domain_skills(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<ResponseJson<ApiResponse<Vec<Skill>>>, ApiError> {
    if Domain::find_by_id(state.pool(), id).await?.is_none() {
        return Err(ApiError::NotFound("domain not found".to_string()));
    }
    let skills = Skill::find_by_domain_id(state.pool(), id).await?;
    Ok(ResponseJson(ApiResponse::success(skills)))
}

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/domains", get(list_domains).post(create_domain))
        .route("/domains/{id}", get(get_domain).put(update_domain).delete(delete_domain))
        .route("/domains/{id}/skills", get(list_domain_skills))
}
