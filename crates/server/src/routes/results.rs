use axum::{
    Json, Router,
    extract::{Path, State},
    response::Json as ResponseJson,
    routing::{get, post},
};
use chrono::Utc;
use db::models::{
    dispute::{Dispute, OpenDispute},
    result::SkillResult,
};
use utils::response::ApiResponse;
use uuid::Uuid;

use crate::{error::ApiError, state::AppState};

pub async fn get_result(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<ResponseJson<ApiResponse<SkillResult>>, ApiError> {
    let result = SkillResult::find_by_id(state.pool(), id)
        .await?
        .ok_or_else(|| ApiError::NotFound("result not found".to_string()))?;
    Ok(ResponseJson(ApiResponse::success(result)))
}

/// POST /api/results/{id}/disputes
pub async fn open_dispute(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(payload): Json<OpenDispute>,
) -> Result<ResponseJson<ApiResponse<Dispute>>, ApiError> {
    let dispute = state
        .disputes()
        .open(id, payload.student_id, &payload.reason, Utc::now())
        .await?;
    Ok(ResponseJson(ApiResponse::success(dispute)))
}

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/results/{id}", get(get_result))
        .route("/results/{id}/disputes", post(open_dispute))
}

#[cfg(test)]
mod tests {
    use axum::http::{Method, StatusCode};
    use serde_json::json;

    use crate::routes::{attempts::tests::graded, test_helpers::send};

    #[tokio::test]
    async fn test_open_dispute_rules() {
        let graded = graded().await;
        let result_id = graded.results[0]["id"].as_str().unwrap().to_string();
        let uri = format!("/api/results/{result_id}/disputes");

        let (status, body) = send(&graded.app, Method::GET, &format!("/api/results/{result_id}"), None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["data"]["attempt_id"], graded.attempt_id.as_str());

        let (status, _) = send(
            &graded.app,
            Method::POST,
            &uri,
            Some(json!({ "student_id": graded.teacher["id"], "reason": "Not mine" })),
        )
        .await;
        assert_eq!(status, StatusCode::FORBIDDEN);

        let (status, _) = send(
            &graded.app,
            Method::POST,
            &uri,
            Some(json!({ "student_id": graded.student["id"], "reason": "   " })),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        let (status, body) = send(
            &graded.app,
            Method::POST,
            &uri,
            Some(json!({ "student_id": graded.student["id"], "reason": " I covered the risks " })),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["data"]["status"], "open");
        assert_eq!(body["data"]["reason"], "I covered the risks");

        let (status, _) = send(
            &graded.app,
            Method::POST,
            &uri,
            Some(json!({ "student_id": graded.student["id"], "reason": "Again" })),
        )
        .await;
        assert_eq!(status, StatusCode::CONFLICT);
    }
}
