//! Starting, answering and submitting attempts.

use chrono::{DateTime, Utc};
use db::models::{
    assessment::{Assessment, AssessmentStatus},
    attempt::{Attempt, StartAttempt},
    group::Group,
    user::{User, UserRole},
};
use sqlx::SqlitePool;
use thiserror::Error;
use tracing::info;
use uuid::Uuid;

#[derive(Debug, Error)]
pub enum AttemptError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("{0} not found")]
    NotFound(&'static str),
    #[error("assessment is not open for attempts")]
    NotPublished,
    #[error("only students can start attempts")]
    NotStudent,
    #[error("student is not a member of the assessment's group")]
    NotInGroup,
    #[error("student already has an attempt for this assessment")]
    AlreadyStarted,
    #[error("attempt is no longer in progress")]
    NotInProgress,
    #[error("attempt cannot be submitted in its current state")]
    NotSubmittable,
    #[error("answer must not be empty")]
    EmptyAnswer,
}

#[derive(Clone)]
pub struct AttemptService {
    pool: SqlitePool,
}

impl AttemptService {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub async fn start(&self, data: &StartAttempt) -> Result<Attempt, AttemptError> {
        let assessment = Assessment::find_by_id(&self.pool, data.assessment_id)
            .await?
            .ok_or(AttemptError::NotFound("assessment"))?;
        if assessment.status != AssessmentStatus::Published {
            return Err(AttemptError::NotPublished);
        }

        let student = User::find_by_id(&self.pool, data.student_id)
            .await?
            .ok_or(AttemptError::NotFound("student"))?;
        if student.role != UserRole::Student {
            return Err(AttemptError::NotStudent);
        }
        if let Some(group_id) = assessment.group_id {
            if !Group::is_member(&self.pool, group_id, student.id).await? {
                return Err(AttemptError::NotInGroup);
            }
        }

        if Attempt::find_by_assessment_and_student(&self.pool, assessment.id, student.id)
            .await?
            .is_some()
        {
            return Err(AttemptError::AlreadyStarted);
        }

        let attempt = Attempt::create(&self.pool, Uuid::new_v4(), data)
            .await
            .map_err(|e| match &e {
                sqlx::Error::Database(db_err) if db_err.is_unique_violation() => AttemptError::AlreadyStarted,
                _ => e.into(),
            })?;
        info!(attempt_id = %attempt.id, assessment_id = %assessment.id, student_id = %student.id, "Attempt started");
        Ok(attempt)
    }

    pub async fn save_answer(&self, id: Uuid, answer: &str) -> Result<Attempt, AttemptError> {
        if let Some(attempt) = Attempt::save_answer(&self.pool, id, answer).await? {
            return Ok(attempt);
        }
        match Attempt::find_by_id(&self.pool, id).await? {
            Some(_) => Err(AttemptError::NotInProgress),
            None => Err(AttemptError::NotFound("attempt")),
        }
    }

    /// Move the attempt to `Submitted`. The caller queues grading.
    pub async fn submit(&self, id: Uuid, now: DateTime<Utc>) -> Result<Attempt, AttemptError> {
        let attempt = Attempt::find_by_id(&self.pool, id)
            .await?
            .ok_or(AttemptError::NotFound("attempt"))?;
        if attempt.answer.trim().is_empty() {
            return Err(AttemptError::EmptyAnswer);
        }

        let submitted = Attempt::mark_submitted(&self.pool, id, now)
            .await?
            .ok_or(AttemptError::NotSubmittable)?;
        info!(attempt_id = %id, "Attempt submitted");
        Ok(submitted)
    }
}

#[cfg(test)]
mod tests {
    use db::models::{
        group::CreateGroup,
        test_support::{create_assessment, create_skill, create_user, pool},
    };

    use super::*;
    use crate::services::assessments::AssessmentService;

    #[tokio::test]
    async fn test_start_rules() {
        let pool = pool().await;
        let service = AttemptService::new(pool.clone());
        let skill = create_skill(&pool, "Analysis", &["Low"]).await;
        let assessment = create_assessment(&pool, &[skill.id]).await;
        let student = create_user(&pool, "s@example.edu", UserRole::Student).await;
        let teacher = create_user(&pool, "t@example.edu", UserRole::Teacher).await;

        let start = StartAttempt {
            assessment_id: assessment.id,
            student_id: student.id,
        };
        assert!(matches!(service.start(&start).await, Err(AttemptError::NotPublished)));

        AssessmentService::new(pool.clone()).publish(assessment.id).await.unwrap();
        let as_teacher = StartAttempt {
            assessment_id: assessment.id,
            student_id: teacher.id,
        };
        assert!(matches!(service.start(&as_teacher).await, Err(AttemptError::NotStudent)));

        service.start(&start).await.unwrap();
        assert!(matches!(service.start(&start).await, Err(AttemptError::AlreadyStarted)));
    }

    #[tokio::test]
    async fn test_group_membership_required() {
        let pool = pool().await;
        let service = AttemptService::new(pool.clone());
        let skill = create_skill(&pool, "Analysis", &["Low"]).await;
        let assessment = create_assessment(&pool, &[skill.id]).await;
        let group = Group::create(
            &pool,
            Uuid::new_v4(),
            &CreateGroup {
                name: "Cohort A".to_string(),
                description: None,
                teacher_id: assessment.teacher_id,
            },
        )
        .await
        .unwrap();
        let assessments = AssessmentService::new(pool.clone());
        assessments
            .update(
                assessment.id,
                &db::models::assessment::UpdateAssessment {
                    group_id: Some(group.id),
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        assessments.publish(assessment.id).await.unwrap();

        let student = create_user(&pool, "s@example.edu", UserRole::Student).await;
        let start = StartAttempt {
            assessment_id: assessment.id,
            student_id: student.id,
        };
        assert!(matches!(service.start(&start).await, Err(AttemptError::NotInGroup)));

        Group::add_member(&pool, group.id, student.id).await.unwrap();
        service.start(&start).await.unwrap();
    }

    #[tokio::test]
    async fn test_answer_and_submit() {
        let pool = pool().await;
        let service = AttemptService::new(pool.clone());
        let skill = create_skill(&pool, "Analysis", &["Low"]).await;
        let assessment = create_assessment(&pool, &[skill.id]).await;
        AssessmentService::new(pool.clone()).publish(assessment.id).await.unwrap();
        let student = create_user(&pool, "s@example.edu", UserRole::Student).await;
        let attempt = service
            .start(&StartAttempt {
                assessment_id: assessment.id,
                student_id: student.id,
            })
            .await
            .unwrap();

        assert!(matches!(service.submit(attempt.id, Utc::now()).await, Err(AttemptError::EmptyAnswer)));
        service.save_answer(attempt.id, "Diversify suppliers").await.unwrap();
        let submitted = service.submit(attempt.id, Utc::now()).await.unwrap();
        assert!(submitted.submitted_at.is_some());

        assert!(matches!(
            service.save_answer(attempt.id, "edit").await,
            Err(AttemptError::NotInProgress)
        ));
        assert!(matches!(service.submit(attempt.id, Utc::now()).await, Err(AttemptError::NotSubmittable)));
        assert!(matches!(
            service.save_answer(Uuid::new_v4(), "x").await,
            Err(AttemptError::NotFound("attempt"))
        ));
    }
}
