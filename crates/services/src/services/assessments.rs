//! Assessment lifecycle: draft, published, closed.

use db::models::{
    assessment::{
        Assessment, AssessmentDetail, AssessmentStatus, CreateAssessment, MAX_DISPUTE_PERIOD_DAYS,
        UpdateAssessment,
    },
    user::{User, UserRole},
};
use sqlx::SqlitePool;
use thiserror::Error;
use tracing::info;
use uuid::Uuid;

#[derive(Debug, Error)]
pub enum AssessmentError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("assessment not found")]
    NotFound,
    #[error("{0}")]
    Validation(String),
    #[error("only teachers and admins can own assessments")]
    NotTeacher,
    #[error("only draft assessments can change case, solution, skills or sources")]
    NotDraft,
    #[error("cannot move assessment from {from} to {to}")]
    InvalidTransition {
        from: AssessmentStatus,
        to: AssessmentStatus,
    },
    #[error("assessment needs a case text before publishing")]
    MissingCase,
    #[error("assessment needs at least one skill before publishing")]
    NoSkills,
    #[error("case generation is still running")]
    GenerationInProgress,
}

fn validate_period(days: Option<i64>) -> Result<(), AssessmentError> {
    match days {
        Some(days) if !(0..=MAX_DISPUTE_PERIOD_DAYS).contains(&days) => Err(AssessmentError::Validation(
            format!("dispute_period_days must be between 0 and {MAX_DISPUTE_PERIOD_DAYS}"),
        )),
        _ => Ok(()),
    }
}

#[derive(Clone)]
pub struct AssessmentService {
    pool: SqlitePool,
}

impl AssessmentService {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub async fn create(&self, data: &CreateAssessment) -> Result<AssessmentDetail, AssessmentError> {
        if data.title.trim().is_empty() {
            return Err(AssessmentError::Validation("title must not be empty".to_string()));
        }
        validate_period(data.dispute_period_days)?;

        let teacher = User::find_by_id(&self.pool, data.teacher_id)
            .await?
            .ok_or_else(|| AssessmentError::Validation("teacher does not exist".to_string()))?;
        if teacher.role == UserRole::Student {
            return Err(AssessmentError::NotTeacher);
        }

        let assessment = Assessment::create(&self.pool, Uuid::new_v4(), data).await?;
        info!(assessment_id = %assessment.id, teacher_id = %teacher.id, "Assessment created");
        Ok(assessment)
    }

    pub async fn update(&self, id: Uuid, data: &UpdateAssessment) -> Result<AssessmentDetail, AssessmentError> {
        let existing = Assessment::find_by_id(&self.pool, id)
            .await?
            .ok_or(AssessmentError::NotFound)?;
        if data.changes_content() && existing.status != AssessmentStatus::Draft {
            return Err(AssessmentError::NotDraft);
        }
        if data.title.as_deref().is_some_and(|t| t.trim().is_empty()) {
            return Err(AssessmentError::Validation("title must not be empty".to_string()));
        }
        validate_period(data.dispute_period_days)?;

        Assessment::update(&self.pool, id, data)
            .await?
            .ok_or(AssessmentError::NotFound)
    }

    pub async fn publish(&self, id: Uuid) -> Result<AssessmentDetail, AssessmentError> {
        let assessment = Assessment::find_detail(&self.pool, id)
            .await?
            .ok_or(AssessmentError::NotFound)?;
        if assessment.status != AssessmentStatus::Draft {
            return Err(AssessmentError::InvalidTransition {
                from: assessment.status,
                to: AssessmentStatus::Published,
            });
        }
        if assessment.generation_status.is_running() {
            return Err(AssessmentError::GenerationInProgress);
        }
        if !assessment.has_case() {
            return Err(AssessmentError::MissingCase);
        }
        if assessment.skill_ids.is_empty() {
            return Err(AssessmentError::NoSkills);
        }

        self.transition(id, AssessmentStatus::Published).await
    }

    pub async fn close(&self, id: Uuid) -> Result<AssessmentDetail, AssessmentError> {
        let assessment = Assessment::find_by_id(&self.pool, id)
            .await?
            .ok_or(AssessmentError::NotFound)?;
        if assessment.status != AssessmentStatus::Published {
            return Err(AssessmentError::InvalidTransition {
                from: assessment.status,
                to: AssessmentStatus::Closed,
            });
        }

        self.transition(id, AssessmentStatus::Closed).await
    }

    async fn transition(&self, id: Uuid, to: AssessmentStatus) -> Result<AssessmentDetail, AssessmentError> {
        Assessment::update_status(&self.pool, id, to).await?;
        info!(assessment_id = %id, status = %to, "Assessment status changed");
        Assessment::find_detail(&self.pool, id)
            .await?
            .ok_or(AssessmentError::NotFound)
    }
}
