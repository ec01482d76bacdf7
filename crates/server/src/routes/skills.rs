use std::collections::HashSet;

use axum::{
    Json, Router,
    extract::{Path, Query, State},
    response::Json as ResponseJson,
    routing::get,
};
use db::models::{
    domain::Domain,
    skill::{CreateSkill, Skill, SkillFilter, SkillWithLevels, UpdateSkill},
    skill_level::{NewSkillLevel, SkillLevel},
};
use utils::{
    pagination::{ListParams, Page},
    response::ApiResponse,
};
use uuid::Uuid;

use crate::{error::ApiError, state::AppState};

/// Labels must be present and distinct ignoring case
fn validate_levels(levels: &[NewSkillLevel]) -> Result<(), ApiError> {
    let mut seen = HashSet::new();
    for level in levels {
        let label = level.label.trim();
        if label.is_empty() {
            return Err(ApiError::BadRequest("level labels must not be empty".to_string()));
        }
        if !seen.insert(label.to_lowercase()) {
            return Err(ApiError::BadRequest(format!("duplicate level label: {label}")));
        }
    }
    Ok(())
}

async fn load_skill(state: &AppState, id: Uuid) -> Result<Skill, ApiError> {
    Skill::find_by_id(state.pool(), id)
        .await?
        .ok_or_else(|| ApiError::NotFound("skill not found".to_string()))
}

pub async fn list_skills(
    State(state): State<AppState>,
    Query(filter): Query<SkillFilter>,
    Query(params): Query<ListParams>,
) -> Result<ResponseJson<ApiResponse<Page<Skill>>>, ApiError> {
    let page = Skill::list(state.pool(), &filter, &params).await?;
    Ok(ResponseJson(ApiResponse::success(page)))
}

pub async fn create_skill(
    State(state): State<AppState>,
    Json(payload): Json<CreateSkill>,
) -> Result<ResponseJson<ApiResponse<SkillWithLevels>>, ApiError> {
    if payload.name.trim().is_empty() {
        return Err(ApiError::BadRequest("name must not be empty".to_string()));
    }
    let levels = payload.levels.clone().unwrap_or_default();
    validate_levels(&levels)?;
    if Domain::find_by_id(state.pool(), payload.domain_id).await?.is_none() {
        return Err(ApiError::BadRequest("domain does not exist".to_string()));
    }

    let skill = Skill::create(state.pool(), Uuid::new_v4(), &payload).await?;
    let levels = SkillLevel::replace_for_skill(state.pool(), skill.id, &levels).await?;
    tracing::info!(skill_id = %skill.id, level_count = levels.len(), "Skill created");
    Ok(ResponseJson(ApiResponse::success(SkillWithLevels { skill, levels })))
}

pub async fn get_skill(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<ResponseJson<ApiResponse<SkillWithLevels>>, ApiError> {
    let skill = Skill::find_with_levels(state.pool(), id)
        .await?
        .ok_or_else(|| ApiError::NotFound("skill not found".to_string()))?;
    Ok(ResponseJson(ApiResponse::success(skill)))
}

pub async fn update_skill(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(payload): Json<UpdateSkill>,
) -> Result<ResponseJson<ApiResponse<Skill>>, ApiError> {
    if payload.name.as_deref().is_some_and(|n| n.trim().is_empty()) {
        return Err(ApiError::BadRequest("name must not be empty".to_string()));
    }
    let skill = Skill::update(state.pool(), id, &payload)
        .await?
        .ok_or_else(|| ApiError::NotFound("skill not found".to_string()))?;
    Ok(ResponseJson(ApiResponse::success(skill)))
}

pub async fn delete_skill(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<ResponseJson<ApiResponse<()>>, ApiError> {
    if Skill::delete(state.pool(), id).await? == 0 {
        return Err(ApiError::NotFound("skill not found".to_string()));
    }
    Ok(ResponseJson(ApiResponse::success(())))
}

pub async fn get_levels(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<ResponseJson<ApiResponse<Vec<SkillLevel>>>, ApiError> {
    load_skill(&state, id).await?;
    let levels = SkillLevel::find_by_skill_id(state.pool(), id).await?;
    Ok(ResponseJson(ApiResponse::success(levels)))
}

/// PUT /api/skills/{id}/levels replaces the whole ordered list
pub async fn replace_levels(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(payload): Json<Vec<NewSkillLevel>>,
) -> Result<ResponseJson<ApiResponse<Vec<SkillLevel>>>, ApiError> {
    load_skill(&state, id).await?;
    validate_levels(&payload)?;
    if SkillLevel::in_use(state.pool(), id).await? {
        return Err(ApiError::Conflict(
            "levels are referenced by graded results and cannot be replaced".to_string(),
        ));
    }

    let levels = SkillLevel::replace_for_skill(state.pool(), id, &payload).await?;
    Ok(ResponseJson(ApiResponse::success(levels)))
}

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/skills", get(list_skills).post(create_skill))
        .route("/skills/{id}", get(get_skill).put(update_skill).delete(delete_skill))
        .route("/skills/{id}/levels", get(get_levels).put(replace_levels))
}
