use axum::{Router, extract::State, response::Json as ResponseJson, routing::get};
use serde::Serialize;
use services::services::database_validator::{DatabaseValidator, ValidationResult};
use ts_rs::TS;
use utils::response::ApiResponse;

use crate::{error::ApiError, state::AppState};

#[derive(Debug, Clone, Serialize, TS)]
pub struct HealthStatus {
    pub ok: bool,
    pub summary: String,
    pub database: ValidationResult,
    pub ai_configured: bool,
}

/// GET /api/health
pub async fn health(State(state): State<AppState>) -> Result<ResponseJson<ApiResponse<HealthStatus>>, ApiError> {
    let database = DatabaseValidator::new(state.pool().clone()).validate().await?;

    Ok(ResponseJson(ApiResponse::success(HealthStatus {
        ok: database.is_ok(),
        summary: database.summary(),
        database,
        ai_configured: state.settings().ai_configured,
    })))
}

pub fn router() -> Router<AppState> {
    Router::new().route("/health", get(health))
}

#[cfg(test)]
mod tests {
    use axum::http::{Method, StatusCode};

    use crate::routes::test_helpers::{send, test_app};

    #[tokio::test]
    async fn test_health_reports_database() {
        let (app, _) = test_app().await;
        let (status, body) = send(&app, Method::GET, "/api/health", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["success"], true);
        assert_eq!(body["data"]["ok"], true);
        assert_eq!(body["data"]["ai_configured"], true);
    }
}
