use axum::{
    Json, Router,
    extract::{Path, Query, State},
    response::Json as ResponseJson,
    routing::{get, post},
};
use db::models::source::{CreateSource, Source, SourceFilter, SourceStatus};
use serde::{Deserialize, Serialize};
use services::services::{
    background_jobs::{JobKind, JobRecord},
    embeddings::{self, RetrievedChunk},
};
use ts_rs::TS;
use utils::{
    pagination::{ListParams, Page},
    response::ApiResponse,
};
use uuid::Uuid;

use crate::{error::ApiError, state::AppState};

/// Newly stored source with the embedding job started for it
#[derive(Debug, Clone, Serialize, Deserialize, TS)]
pub struct SourceWithJob {
    pub source: Source,
    pub job: JobRecord,
}

#[derive(Debug, Clone, Serialize, Deserialize, TS)]
pub struct SearchSources {
    pub query: String,
    /// Restrict the search to these sources; all ready sources when absent
    pub source_ids: Option<Vec<Uuid>>,
    pub top_k: Option<usize>,
    pub min_score: Option<f32>,
}

async fn start_embedding(state: &AppState, source_id: Uuid) -> JobRecord {
    let ai = state.ai();
    let pool = state.pool().clone();
    let chunk_size = state.settings().chunk_size;

    state
        .jobs()
        .submit(JobKind::SourceEmbedding, source_id, async move {
            embeddings::embed_source(ai.as_ref(), &pool, source_id, chunk_size)
                .await
                .map(|_| ())
        })
        .await
}

pub async fn list_sources(
    State(state): State<AppState>,
    Query(filter): Query<SourceFilter>,
    Query(params): Query<ListParams>,
) -> Result<ResponseJson<ApiResponse<Page<Source>>>, ApiError> {
    let page = Source::list(state.pool(), &filter, &params).await?;
    Ok(ResponseJson(ApiResponse::success(page)))
}

/// POST /api/sources stores the document and embeds it in the background
pub async fn create_source(
    State(state): State<AppState>,
    Json(payload): Json<CreateSource>,
) -> Result<ResponseJson<ApiResponse<SourceWithJob>>, ApiError> {
    if payload.title.trim().is_empty() {
        return Err(ApiError::BadRequest("title must not be empty".to_string()));
    }
    if payload.content.trim().is_empty() {
        return Err(ApiError::BadRequest("content must not be empty".to_string()));
    }

    let source = Source::create(state.pool(), Uuid::new_v4(), &payload).await?;
    let job = start_embedding(&state, source.id).await;
    tracing::info!(source_id = %source.id, job_id = %job.id, "Source uploaded");

    Ok(ResponseJson(ApiResponse::success(SourceWithJob { source, job })))
}

pub async fn get_source(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<ResponseJson<ApiResponse<Source>>, ApiError> {
    let source = Source::find_by_id(state.pool(), id)
        .await?
        .ok_or_else(|| ApiError::NotFound("source not found".to_string()))?;
    Ok(ResponseJson(ApiResponse::success(source)))
}

pub async fn delete_source(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<ResponseJson<ApiResponse<()>>, ApiError> {
    if Source::delete(state.pool(), id).await? == 0 {
        return Err(ApiError::NotFound("source not found".to_string()));
    }
    Ok(ResponseJson(ApiResponse::success(())))
}

/// POST /api/sources/{id}/reprocess re-embeds a source, e.g. after a failure
pub async fn reprocess_source(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<ResponseJson<ApiResponse<JobRecord>>, ApiError> {
    let source = Source::find_by_id(state.pool(), id)
        .await?
        .ok_or_else(|| ApiError::NotFound("source not found".to_string()))?;
    if source.status == SourceStatus::Processing {
        return Err(ApiError::Conflict("source is already being processed".to_string()));
    }

    Source::update_status(state.pool(), id, SourceStatus::Pending, None).await?;
    let job = start_embedding(&state, id).await;
    Ok(ResponseJson(ApiResponse::success(job)))
}

pub async fn search_sources(
    State(state): State<AppState>,
    Json(payload): Json<SearchSources>,
) -> Result<ResponseJson<ApiResponse<Vec<RetrievedChunk>>>, ApiError> {
    if payload.query.trim().is_empty() {
        return Err(ApiError::BadRequest("query must not be empty".to_string()));
    }

    let ai = state.ai();
    let chunks = embeddings::retrieve(
        ai.as_ref(),
        state.pool(),
        &payload.query,
        payload.source_ids.as_deref(),
        payload.top_k.unwrap_or(state.settings().retrieval_top_k),
        payload.min_score.unwrap_or(0.0),
    )
    .await?;
    Ok(ResponseJson(ApiResponse::success(chunks)))
}

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/sources", get(list_sources).post(create_source))
        .route("/sources/search", post(search_sources))
        .route("/sources/{id}", get(get_source).delete(delete_source))
        .route("/sources/{id}/reprocess", post(reprocess_source))
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use axum::http::{Method, StatusCode};
    use serde_json::json;
    use services::services::{background_jobs::JobStatus, testing::ScriptedProvider};
    use uuid::Uuid;

    use crate::routes::{
        router,
        test_helpers::{send, test_state},
    };

    #[tokio::test]
    async fn test_upload_embed_and_search() {
        let state = test_state(ScriptedProvider::new().with_keywords(&["supplier", "weather"])).await;
        let app = router(state.clone());

        let (status, body) = send(
            &app,
            Method::POST,
            "/api/sources",
            Some(json!({
                "title": "Handbook",
                "kind": "markdown",
                "content": "Supplier contracts run for two years.\n\nThe weather was mild."
            })),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["data"]["job"]["kind"], "source_embedding");
        let source_id = body["data"]["source"]["id"].as_str().unwrap().to_string();
        let job_id: Uuid = body["data"]["job"]["id"].as_str().unwrap().parse().unwrap();

        let job = state.jobs().wait(job_id, Duration::from_secs(5)).await.unwrap();
        assert_eq!(job.status, JobStatus::Completed);

        let (_, body) = send(&app, Method::GET, &format!("/api/sources/{source_id}"), None).await;
        assert_eq!(body["data"]["status"], "ready");
        assert!(body["data"].get("chunks").is_none());

        let (status, body) = send(
            &app,
            Method::POST,
            "/api/sources/search",
            Some(json!({ "query": "who is our supplier", "top_k": 1 })),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        let hits = body["data"].as_array().unwrap();
        assert_eq!(hits.len(), 1);
        assert!(hits[0]["text"].as_str().unwrap().contains("Supplier"));
        assert_eq!(hits[0]["source_title"], "Handbook");
    }

    #[tokio::test]
    async fn test_rejects_blank_content_and_unknown_source() {
        let state = test_state(ScriptedProvider::new()).await;
        let app = router(state);

        let (status, _) = send(
            &app,
            Method::POST,
            "/api/sources",
            Some(json!({ "title": "Blank", "content": "  " })),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        let (status, _) = send(
            &app,
            Method::POST,
            &format!("/api/sources/{}/reprocess", Uuid::new_v4()),
            None,
        )
        .await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }
}
