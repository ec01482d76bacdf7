use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use services::services::{
    ai_client::AiError, assessments::AssessmentError, attempts::AttemptError,
    case_generator::CaseGenerationError, database_validator::DatabaseValidationError,
    disputes::DisputeError, embeddings::EmbeddingError, grading::GradingError,
};
use thiserror::Error;
use tracing::error;
use utils::response::ApiResponse;

#[derive(Debug, Error)]
pub enum ApiError {
    #[error(transparent)]
    Database(#[from] sqlx::Error),
    #[error(transparent)]
    Ai(#[from] AiError),
    #[error(transparent)]
    Embedding(#[from] EmbeddingError),
    #[error(transparent)]
    CaseGeneration(#[from] CaseGenerationError),
    #[error(transparent)]
    Grading(#[from] GradingError),
    #[error(transparent)]
    Dispute(#[from] DisputeError),
    #[error(transparent)]
    Assessment(#[from] AssessmentError),
    #[error(transparent)]
    Attempt(#[from] AttemptError),
    #[error(transparent)]
    DatabaseValidation(#[from] DatabaseValidationError),
    #[error("{0}")]
    NotFound(String),
    #[error("{0}")]
    BadRequest(String),
    #[error("{0}")]
    Conflict(String),
}

fn database_status(e: &sqlx::Error) -> StatusCode {
    match e {
        sqlx::Error::RowNotFound => StatusCode::NOT_FOUND,
        sqlx::Error::Database(db_err) if db_err.is_unique_violation() => StatusCode::CONFLICT,
        sqlx::Error::Database(db_err) if db_err.is_foreign_key_violation() || db_err.is_check_violation() => {
            StatusCode::BAD_REQUEST
        }
        sqlx::Error::PoolTimedOut => StatusCode::SERVICE_UNAVAILABLE,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

fn ai_status(e: &AiError) -> StatusCode {
    match e {
        AiError::MissingApiKey => StatusCode::SERVICE_UNAVAILABLE,
        _ => StatusCode::BAD_GATEWAY,
    }
}

fn embedding_status(e: &EmbeddingError) -> StatusCode {
    match e {
        EmbeddingError::Database(e) => database_status(e),
        EmbeddingError::Ai(e) => ai_status(e),
        EmbeddingError::SourceNotFound => StatusCode::NOT_FOUND,
        EmbeddingError::EmptySource => StatusCode::BAD_REQUEST,
        EmbeddingError::CountMismatch { .. } => StatusCode::BAD_GATEWAY,
    }
}

impl ApiError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            ApiError::Database(e) => database_status(e),
            ApiError::Ai(e) => ai_status(e),
            ApiError::Embedding(e) => embedding_status(e),
            ApiError::CaseGeneration(e) => match e {
                CaseGenerationError::Database(e) => database_status(e),
                CaseGenerationError::Ai(e) => ai_status(e),
                CaseGenerationError::Retrieval(e) => embedding_status(e),
                CaseGenerationError::NotFound => StatusCode::NOT_FOUND,
                CaseGenerationError::AlreadyInProgress | CaseGenerationError::NotDraft => StatusCode::CONFLICT,
                CaseGenerationError::EmptyOutput(_) => StatusCode::BAD_GATEWAY,
            },
            ApiError::Grading(e) => match e {
                GradingError::Database(e) => database_status(e),
                GradingError::Ai(e) => ai_status(e),
                GradingError::NotFound | GradingError::AssessmentNotFound => StatusCode::NOT_FOUND,
                GradingError::NotSubmitted | GradingError::MissingCase | GradingError::NoSkills => {
                    StatusCode::CONFLICT
                }
                GradingError::MissingSkill(_) | GradingError::UnknownLevel { .. } => StatusCode::BAD_GATEWAY,
            },
            ApiError::Dispute(e) => match e {
                DisputeError::Database(e) => database_status(e),
                DisputeError::NotFound(_) => StatusCode::NOT_FOUND,
                DisputeError::EmptyReason | DisputeError::LevelOnReject | DisputeError::LevelSkillMismatch => {
                    StatusCode::BAD_REQUEST
                }
                DisputeError::NotOwner | DisputeError::NotAuthorized => StatusCode::FORBIDDEN,
                DisputeError::NotGraded
                | DisputeError::WindowClosed(_)
                | DisputeError::AlreadyOpen
                | DisputeError::AlreadyResolved => StatusCode::CONFLICT,
            },
            ApiError::Assessment(e) => match e {
                AssessmentError::Database(e) => database_status(e),
                AssessmentError::NotFound => StatusCode::NOT_FOUND,
                AssessmentError::Validation(_) | AssessmentError::NotTeacher => StatusCode::BAD_REQUEST,
                AssessmentError::NotDraft
                | AssessmentError::InvalidTransition { .. }
                | AssessmentError::MissingCase
                | AssessmentError::NoSkills
                | AssessmentError::GenerationInProgress => StatusCode::CONFLICT,
            },
            ApiError::Attempt(e) => match e {
                AttemptError::Database(e) => database_status(e),
                AttemptError::NotFound(_) => StatusCode::NOT_FOUND,
                AttemptError::EmptyAnswer => StatusCode::BAD_REQUEST,
                AttemptError::NotStudent | AttemptError::NotInGroup => StatusCode::FORBIDDEN,
                AttemptError::NotPublished
                | AttemptError::AlreadyStarted
                | AttemptError::NotInProgress
                | AttemptError::NotSubmittable => StatusCode::CONFLICT,
            },
            ApiError::DatabaseValidation(DatabaseValidationError::Database(e)) => database_status(e),
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::Conflict(_) => StatusCode::CONFLICT,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status_code = self.status_code();

        let message = if status_code.is_server_error() {
            error!(error = %self, status = %status_code, "Request failed");
            match status_code {
                StatusCode::INTERNAL_SERVER_ERROR => "Internal server error".to_string(),
                _ => self.to_string(),
            }
        } else {
            match status_code {
                StatusCode::CONFLICT if matches!(self, ApiError::Database(_)) => {
                    "A record with these values already exists".to_string()
                }
                StatusCode::BAD_REQUEST if matches!(self, ApiError::Database(_)) => {
                    "Referenced record does not exist or a value is out of range".to_string()
                }
                _ => self.to_string(),
            }
        };

        (status_code, Json(ApiResponse::<()>::error(&message))).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_mapping() {
        assert_eq!(ApiError::Ai(AiError::MissingApiKey).status_code(), StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(ApiError::Ai(AiError::RateLimited).status_code(), StatusCode::BAD_GATEWAY);
        assert_eq!(ApiError::Database(sqlx::Error::RowNotFound).status_code(), StatusCode::NOT_FOUND);
        assert_eq!(
            ApiError::Dispute(DisputeError::AlreadyOpen).status_code(),
            StatusCode::CONFLICT
        );
        assert_eq!(
            ApiError::Grading(GradingError::Ai(AiError::MissingApiKey)).status_code(),
            StatusCode::SERVICE_UNAVAILABLE
        );
        assert_eq!(
            ApiError::Attempt(AttemptError::NotInGroup).status_code(),
            StatusCode::FORBIDDEN
        );
    }
}
