use axum::{
    Json, Router,
    extract::{Path, Query, State},
    response::Json as ResponseJson,
    routing::get,
};
use db::models::user::{CreateUser, UpdateUser, User, UserFilter};
use utils::{
    pagination::{ListParams, Page},
    response::ApiResponse,
};
use uuid::Uuid;

use crate::{error::ApiError, state::AppState};

fn validate_email(email: &str) -> Result<(), ApiError> {
    let email = email.trim();
    match email.split_once('@') {
        Some((local, domain)) if !local.is_empty() && !domain.is_empty() => Ok(()),
        _ => Err(ApiError::BadRequest(format!("invalid email address: {email}"))),
    }
}

/// GET /api/users
pub async fn list_users(
    State(state): State<AppState>,
    Query(filter): Query<UserFilter>,
    Query(params): Query<ListParams>,
) -> Result<ResponseJson<ApiResponse<Page<User>>>, ApiError> {
    let page = User::list(state.pool(), &filter, &params).await?;
    Ok(ResponseJson(ApiResponse::success(page)))
}

/// POST /api/users
pub async fn create_user(
    State(state): State<AppState>,
    Json(payload): Json<CreateUser>,
) -> Result<ResponseJson<ApiResponse<User>>, ApiError> {
    validate_email(&payload.email)?;
    if payload.name.trim().is_empty() {
        return Err(ApiError::BadRequest("name must not be empty".to_string()));
    }

    let user = User::create(state.pool(), Uuid::new_v4(), &payload).await?;
    tracing::info!(user_id = %user.id, role = %user.role, "User created");
    Ok(ResponseJson(ApiResponse::success(user)))
}

/// GET /api/users/{id}
pub async fn get_user(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<ResponseJson<ApiResponse<User>>, ApiError> {
    let user = User::find_by_id(state.pool(), id)
        .await?
        .ok_or_else(|| ApiError::NotFound("user not found".to_string()))?;
    Ok(ResponseJson(ApiResponse::success(user)))
}

/// PUT /api/users/{id}
pub async fn update_user(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(payload): Json<UpdateUser>,
) -> Result<ResponseJson<ApiResponse<User>>, ApiError> {
    if let Some(email) = &payload.email {
        validate_email(email)?;
    }
    let user = User::update(state.pool(), id, &payload)
        .await?
        .ok_or_else(|| ApiError::NotFound("user not found".to_string()))?;
    Ok(ResponseJson(ApiResponse::success(user)))
}

/// DELETE /api/users/{id}
pub async fn delete_user(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<ResponseJson<ApiResponse<()>>, ApiError> {
    if User::delete(state.pool(), id).await? == 0 {
        return Err(ApiError::NotFound("user not found".to_string()));
    }
    Ok(ResponseJson(ApiResponse::success(())))
}

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/users", get(list_users).post(create_user))
        .route("/users/{id}", get(get_user).put(update_user).delete(delete_user))
}
