use axum::{
    Json, Router,
    extract::{Path, Query, State},
    response::Json as ResponseJson,
    routing::{delete, get},
};
use db::models::{
    group::{AddGroupMember, CreateGroup, Group, GroupFilter, UpdateGroup},
    user::{User, UserRole},
};
use utils::{
    pagination::{ListParams, Page},
    response::ApiResponse,
};
use uuid::Uuid;

use crate::{error::ApiError, state::AppState};

async fn load_group(state: &AppState, id: Uuid) -> Result<Group, ApiError> {
    Group::find_by_id(state.pool(), id)
        .await?
        .ok_or_else(|| ApiError::NotFound("group not found".to_string()))
}

/// Groups are owned by teachers or admins
async fn ensure_teacher(state: &AppState, teacher_id: Uuid) -> Result<(), ApiError> {
    let teacher = User::find_by_id(state.pool(), teacher_id)
        .await?
        .ok_or_else(|| ApiError::BadRequest("teacher does not exist".to_string()))?;
    if teacher.role == UserRole::Student {
        return Err(ApiError::BadRequest("a student cannot own a group".to_string()));
    }
    Ok(())
}

pub async fn list_groups(
    State(state): State<AppState>,
    Query(filter): Query<GroupFilter>,
    Query(params): Query<ListParams>,
) -> Result<ResponseJson<ApiResponse<Page<Group>>>, ApiError> {
    let page = Group::list(state.pool(), &filter, &params).await?;
    Ok(ResponseJson(ApiResponse::success(page)))
}

pub async fn create_group(
    State(state): State<AppState>,
    Json(payload): Json<CreateGroup>,
) -> Result<ResponseJson<ApiResponse<Group>>, ApiError> {
    if payload.name.trim().is_empty() {
        return Err(ApiError::BadRequest("name must not be empty".to_string()));
    }
    ensure_teacher(&state, payload.teacher_id).await?;

    let group = Group::create(state.pool(), Uuid::new_v4(), &payload).await?;
    tracing::info!(group_id = %group.id, teacher_id = %group.teacher_id, "Group created");
    Ok(ResponseJson(ApiResponse::success(group)))
}

pub async fn get_group(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<ResponseJson<ApiResponse<Group>>, ApiError> {
    Ok(ResponseJson(ApiResponse::success(load_group(&state, id).await?)))
}

pub async fn update_group(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(payload): Json<UpdateGroup>,
) -> Result<ResponseJson<ApiResponse<Group>>, ApiError> {
    if let Some(teacher_id) = payload.teacher_id {
        ensure_teacher(&state, teacher_id).await?;
    }
    let group = Group::update(state.pool(), id, &payload)
        .await?
        .ok_or_else(|| ApiError::NotFound("group not found".to_string()))?;
    Ok(ResponseJson(ApiResponse::success(group)))
}

pub async fn delete_group(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<ResponseJson<ApiResponse<()>>, ApiError> {
    if Group::delete(state.pool(), id).await? == 0 {
        return Err(ApiError::NotFound("group not found".to_string()));
    }
    Ok(ResponseJson(ApiResponse::success(())))
}

pub async fn list_members(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<ResponseJson<ApiResponse<Vec<User>>>, ApiError> {
    load_group(&state, id).await?;
    let members = Group::members(state.pool(), id).await?;
    Ok(ResponseJson(ApiResponse::success(members)))
}

pub async fn add_member(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(payload): Json<AddGroupMember>,
) -> Result<ResponseJson<ApiResponse<Vec<User>>>, ApiError> {
    load_group(&state, id).await?;
    let user = User::find_by_id(state.pool(), payload.user_id)
        .await?
        .ok_or_else(|| ApiError::NotFound("user not found".to_string()))?;
    if user.role != UserRole::Student {
        return Err(ApiError::BadRequest("only students can join a group".to_string()));
    }

    if !Group::add_member(state.pool(), id, user.id).await? {
        return Err(ApiError::Conflict("user is already a member".to_string()));
    }
    let members = Group::members(state.pool(), id).await?;
    Ok(ResponseJson(ApiResponse::success(members)))
}

pub async fn remove_member(
    State(state): State<AppState>,
    Path((id, user_id)): Path<(Uuid, Uuid)>,
) -> Result<ResponseJson<ApiResponse<()>>, ApiError> {
    if Group::remove_member(state.pool(), id, user_id).await? == 0 {
        return Err(ApiError::NotFound("membership not found".to_string()));
    }
    Ok(ResponseJson(ApiResponse::success(())))
}

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/groups", get(list_groups).post(create_group))
        .route("/groups/{id}", get(get_group).put(update_group).delete(delete_group))
        .route("/groups/{id}/members", get(list_members).post(add_member))
        .route("/groups/{id}/members/{user_id}", delete(remove_member))
}

#[cfg(test)]
mod tests {
    use axum::http::{Method, StatusCode};
    use serde_json::json;

    use crate::routes::test_helpers::{create_user, send, test_app};

    #[tokio::test]
    async fn test_group_membership() {
        let (app, _) = test_app().await;
        let teacher = create_user(&app, "t@example.edu", "teacher").await;
        let student = create_user(&app, "s@example.edu", "student").await;

        let (status, _) = send(
            &app,
            Method::POST,
            "/api/groups",
            Some(json!({ "name": "Class A", "teacher_id": student["id"] })),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        let (status, body) = send(
            &app,
            Method::POST,
            "/api/groups",
            Some(json!({ "name": "Class A", "teacher_id": teacher["id"] })),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        let group_id = body["data"]["id"].as_str().unwrap().to_string();
        let members_uri = format!("/api/groups/{group_id}/members");

        let (status, body) = send(&app, Method::POST, &members_uri, Some(json!({ "user_id": student["id"] }))).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["data"].as_array().unwrap().len(), 1);

        let (status, _) = send(&app, Method::POST, &members_uri, Some(json!({ "user_id": student["id"] }))).await;
        assert_eq!(status, StatusCode::CONFLICT);

        let (status, _) = send(&app, Method::POST, &members_uri, Some(json!({ "user_id": teacher["id"] }))).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        let student_id = student["id"].as_str().unwrap();
        let (status, _) = send(&app, Method::DELETE, &format!("{members_uri}/{student_id}"), None).await;
        assert_eq!(status, StatusCode::OK);
        let (status, _) = send(&app, Method::DELETE, &format!("{members_uri}/{student_id}"), None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }
}
