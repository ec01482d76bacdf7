use axum::{
    Json, Router,
    extract::{Path, Query, State},
    response::Json as ResponseJson,
    routing::{get, post},
};
use db::models::{
    assessment::{Assessment, AssessmentDetail, AssessmentFilter, CreateAssessment, UpdateAssessment},
    attempt::{Attempt, AttemptFilter},
};
use serde::{Deserialize, Serialize};
use services::services::{
    ai_client::AiError,
    background_jobs::{JobKind, JobRecord},
    case_generator::GenerateRequest,
};
use ts_rs::TS;
use utils::{
    pagination::{ListParams, Page},
    response::ApiResponse,
};
use uuid::Uuid;

use crate::{error::ApiError, state::AppState};

/// Assessment as claimed for generation, with the job doing the work
#[derive(Debug, Clone, Serialize, Deserialize, TS)]
pub struct GenerationStarted {
    pub assessment: Assessment,
    pub job: JobRecord,
}

pub async fn list_assessments(
    State(state): State<AppState>,
    Query(filter): Query<AssessmentFilter>,
    Query(params): Query<ListParams>,
) -> Result<ResponseJson<ApiResponse<Page<Assessment>>>, ApiError> {
    let page = Assessment::list(state.pool(), &filter, &params).await?;
    Ok(ResponseJson(ApiResponse::success(page)))
}

pub async fn create_assessment(
    State(state): State<AppState>,
    Json(payload): Json<CreateAssessment>,
) -> Result<ResponseJson<ApiResponse<AssessmentDetail>>, ApiError> {
    let assessment = state.assessments().create(&payload).await?;
    Ok(ResponseJson(ApiResponse::success(assessment)))
}

pub async fn get_assessment(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<ResponseJson<ApiResponse<AssessmentDetail>>, ApiError> {
    let assessment = Assessment::find_detail(state.pool(), id)
        .await?
        .ok_or_else(|| ApiError::NotFound("assessment not found".to_string()))?;
    Ok(ResponseJson(ApiResponse::success(assessment)))
}

pub async fn update_assessment(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(payload): Json<UpdateAssessment>,
) -> Result<ResponseJson<ApiResponse<AssessmentDetail>>, ApiError> {
    let assessment = state.assessments().update(id, &payload).await?;
    Ok(ResponseJson(ApiResponse::success(assessment)))
}

pub async fn delete_assessment(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<ResponseJson<ApiResponse<()>>, ApiError> {
    if Assessment::delete(state.pool(), id).await? == 0 {
        return Err(ApiError::NotFound("assessment not found".to_string()));
    }
    Ok(ResponseJson(ApiResponse::success(())))
}

pub async fn publish_assessment(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<ResponseJson<ApiResponse<AssessmentDetail>>, ApiError> {
    let assessment = state.assessments().publish(id).await?;
    Ok(ResponseJson(ApiResponse::success(assessment)))
}

pub async fn close_assessment(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<ResponseJson<ApiResponse<AssessmentDetail>>, ApiError> {
    let assessment = state.assessments().close(id).await?;
    Ok(ResponseJson(ApiResponse::success(assessment)))
}

/// POST /api/assessments/{id}/generate
///
/// Claims the draft and writes its case and model solution in the background.
pub async fn generate_case(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(payload): Json<GenerateRequest>,
) -> Result<ResponseJson<ApiResponse<GenerationStarted>>, ApiError> {
    if !state.settings().ai_configured {
        return Err(AiError::MissingApiKey.into());
    }

    let generator = state.case_generator();
    let assessment = generator.claim(id).await?;
    let job = state
        .jobs()
        .submit(JobKind::CaseGeneration, id, async move { generator.generate(id, payload).await })
        .await;
    tracing::info!(assessment_id = %id, job_id = %job.id, "Case generation started");

    Ok(ResponseJson(ApiResponse::success(GenerationStarted { assessment, job })))
}

pub async fn list_assessment_attempts(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Query(params): Query<ListParams>,
) -> Result<ResponseJson<ApiResponse<Page<Attempt>>>, ApiError> {
    if Assessment::find_by_id(state.pool(), id).await?.is_none() {
        return Err(ApiError::NotFound("assessment not found".to_string()));
    }
    let filter = AttemptFilter {
        assessment_id: Some(id),
        ..Default::default()
    };
    let page = Attempt::list(state.pool(), &filter, &params).await?;
    Ok(ResponseJson(ApiResponse::success(page)))
}

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/assessments", get(list_assessments).post(create_assessment))
        .route(
            "/assessments/{id}",
            get(get_assessment).put(update_assessment).delete(delete_assessment),
        )
        .route("/assessments/{id}/publish", post(publish_assessment))
        .route("/assessments/{id}/close", post(close_assessment))
        .route("/assessments/{id}/generate", post(generate_case))
        .route("/assessments/{id}/attempts", get(list_assessment_attempts))
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use axum::http::{Method, StatusCode};
    use serde_json::{Value, json};
    use services::services::{background_jobs::JobStatus, testing::ScriptedProvider};
    use uuid::Uuid;

    use crate::routes::{
        router,
        test_helpers::{create_user, send, test_state},
    };

    async fn create_skill(app: &axum::Router) -> Value {
        let (_, domain) = send(app, Method::POST, "/api/domains", Some(json!({ "name": "Operations" }))).await;
        let (status, skill) = send(
            app,
            Method::POST,
            "/api/skills",
            Some(json!({
                "domain_id": domain["data"]["id"],
                "name": "Risk analysis",
                "levels": [{ "label": "Low" }, { "label": "High" }]
            })),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        skill["data"].clone()
    }

    #[tokio::test]
    async fn test_generate_then_publish() {
        let provider = ScriptedProvider::new()
            .with_reply(r#"{"case_text": "A supplier fails an audit."}"#)
            .with_reply(r#"{"solution": "Find a second supplier."}"#);
        let state = test_state(provider).await;
        let app = router(state.clone());

        let teacher = create_user(&app, "t@example.edu", "teacher").await;
        let skill = create_skill(&app).await;

        let (status, body) = send(
            &app,
            Method::POST,
            "/api/assessments",
            Some(json!({ "title": "Supply chain", "teacher_id": teacher["id"], "skill_ids": [skill["id"]] })),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["data"]["status"], "draft");
        let id = body["data"]["id"].as_str().unwrap().to_string();

        let (status, _) = send(&app, Method::POST, &format!("/api/assessments/{id}/publish"), None).await;
        assert_eq!(status, StatusCode::CONFLICT);

        let (status, body) = send(&app, Method::POST, &format!("/api/assessments/{id}/generate"), Some(json!({}))).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["data"]["assessment"]["generation_status"], "pending");
        let job_id: Uuid = body["data"]["job"]["id"].as_str().unwrap().parse().unwrap();

        let job = state.jobs().wait(job_id, Duration::from_secs(5)).await.unwrap();
        assert_eq!(job.status, JobStatus::Completed, "{:?}", job.error);

        let (_, body) = send(&app, Method::GET, &format!("/api/assessments/{id}"), None).await;
        assert_eq!(body["data"]["generation_status"], "completed");
        assert_eq!(body["data"]["case_text"], "A supplier fails an audit.");
        assert_eq!(body["data"]["solution"], "Find a second supplier.");

        let (status, body) = send(&app, Method::POST, &format!("/api/assessments/{id}/publish"), None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["data"]["status"], "published");

        let (status, _) = send(
            &app,
            Method::PUT,
            &format!("/api/assessments/{id}"),
            Some(json!({ "case_text": "Rewritten" })),
        )
        .await;
        assert_eq!(status, StatusCode::CONFLICT);

        let (status, _) = send(&app, Method::POST, &format!("/api/assessments/{id}/generate"), Some(json!({}))).await;
        assert_eq!(status, StatusCode::CONFLICT);

        let (status, body) = send(&app, Method::POST, &format!("/api/assessments/{id}/close"), None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["data"]["status"], "closed");
    }

    #[tokio::test]
    async fn test_student_cannot_own_assessment() {
        let state = test_state(ScriptedProvider::new()).await;
        let app = router(state);
        let student = create_user(&app, "s@example.edu", "student").await;

        let (status, _) = send(
            &app,
            Method::POST,
            "/api/assessments",
            Some(json!({ "title": "Quiz", "teacher_id": student["id"] })),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }
}
