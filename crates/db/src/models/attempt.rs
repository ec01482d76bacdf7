use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{FromRow, QueryBuilder, Sqlite, SqlitePool, Type};
use strum_macros::{Display, EnumString};
use ts_rs::TS;
use utils::pagination::{ListParams, Page};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, Type, Serialize, Deserialize, PartialEq, Eq, TS, EnumString, Display, Default)]
#[sqlx(type_name = "attempt_status", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum AttemptStatus {
    #[default]
    InProgress,
    Submitted,
    Grading,
    Graded,
    /// Dispute period is over; results are final
    Finalized,
    /// Grading failed; the attempt can be submitted again
    Failed,
}

/// One student's run through an assessment
#[derive(Debug, Clone, FromRow, Serialize, Deserialize, TS)]
pub struct Attempt {
    pub id: Uuid,
    pub assessment_id: Uuid,
    pub student_id: Uuid,
    pub status: AttemptStatus,
    pub answer: String,
    pub overall_feedback: Option<String>,
    pub grading_error: Option<String>,
    pub started_at: DateTime<Utc>,
    pub submitted_at: Option<DateTime<Utc>>,
    pub graded_at: Option<DateTime<Utc>>,
    pub finalized_at: Option<DateTime<Utc>>,
}

/// Graded attempt joined with its assessment's dispute period
#[derive(Debug, Clone, FromRow)]
pub struct GradedAttempt {
    #[sqlx(flatten)]
    pub attempt: Attempt,
    pub dispute_period_days: i64,
}

impl GradedAttempt {
    /// End of the dispute window. `None` when ungraded or the window runs past the representable range.
    pub fn dispute_deadline(&self) -> Option<DateTime<Utc>> {
        self.attempt
            .graded_at
            .and_then(|graded_at| dispute_deadline(graded_at, self.dispute_period_days))
    }
}

/// `graded_at` plus the dispute period, or `None` on overflow
pub fn dispute_deadline(graded_at: DateTime<Utc>, period_days: i64) -> Option<DateTime<Utc>> {
    chrono::TimeDelta::try_days(period_days).and_then(|period| graded_at.checked_add_signed(period))
}

#[derive(Debug, Clone, Serialize, Deserialize, TS)]
pub struct StartAttempt {
    pub assessment_id: Uuid,
    pub student_id: Uuid,
}

#[derive(Debug, Clone, Serialize, Deserialize, TS)]
pub struct SaveAnswer {
    pub answer: String,
}

#[derive(Debug, Clone, Default, Deserialize, TS)]
pub struct AttemptFilter {
    pub assessment_id: Option<Uuid>,
    pub student_id: Option<Uuid>,
    pub status: Option<AttemptStatus>,
}

const SORTABLE: &[&str] = &["started_at", "submitted_at", "graded_at", "status"];

impl Attempt {
    pub async fn create(pool: &SqlitePool, id: Uuid, data: &StartAttempt) -> Result<Self, sqlx::Error> {
        sqlx::query_as::<_, Attempt>(
            r#"INSERT INTO attempts (id, assessment_id, student_id)
               VALUES ($1, $2, $3)
               RETURNING *"#,
        )
        .bind(id)
        .bind(data.assessment_id)
        .bind(data.student_id)
        .fetch_one(pool)
        .await
    }

    pub async fn find_by_id(pool: &SqlitePool, id: Uuid) -> Result<Option<Self>, sqlx::Error> {
        sqlx::query_as::<_, Attempt>("SELECT * FROM attempts WHERE id = $1")
            .bind(id)
            .fetch_optional(pool)
            .await
    }

    pub async fn find_by_assessment_and_student(
        pool: &SqlitePool,
        assessment_id: Uuid,
        student_id: Uuid,
    ) -> Result<Option<Self>, sqlx::Error> {
        sqlx::query_as::<_, Attempt>("SELECT * FROM attempts WHERE assessment_id = $1 AND student_id = $2")
            .bind(assessment_id)
            .bind(student_id)
            .fetch_optional(pool)
            .await
    }

    pub async fn list(
        pool: &SqlitePool,
        filter: &AttemptFilter,
        params: &ListParams,
    ) -> Result<Page<Self>, sqlx::Error> {
        let mut count = QueryBuilder::<Sqlite>::new("SELECT COUNT(*) FROM attempts WHERE 1 = 1");
        push_filters(&mut count, filter);
        let total = count.build_query_scalar::<i64>().fetch_one(pool).await?;

        let mut query = QueryBuilder::<Sqlite>::new("SELECT * FROM attempts WHERE 1 = 1");
        push_filters(&mut query, filter);
        query
            .push(" ORDER BY ")
            .push(params.sort_column(SORTABLE, "started_at"))
            .push(" ")
            .push(params.order().as_sql())
            .push(" LIMIT ")
            .push_bind(params.limit())
            .push(" OFFSET ")
            .push_bind(params.offset());
        let items = query.build_query_as::<Attempt>().fetch_all(pool).await?;

        Ok(Page::new(items, total, params))
    }

    /// Save the answer of an in-progress attempt. Returns None if the attempt is not in progress.
    pub async fn save_answer(pool: &SqlitePool, id: Uuid, answer: &str) -> Result<Option<Self>, sqlx::Error> {
        sqlx::query_as::<_, Attempt>(
            r#"UPDATE attempts
               SET answer = $2
               WHERE id = $1 AND status = 'in_progress'
               RETURNING *"#,
        )
        .bind(id)
        .bind(answer)
        .fetch_optional(pool)
        .await
    }

    /// Move an in-progress or failed attempt to `Submitted`. Returns None if it is in any other state.
    pub async fn mark_submitted(
        pool: &SqlitePool,
        id: Uuid,
        submitted_at: DateTime<Utc>,
    ) -> Result<Option<Self>, sqlx::Error> {
        sqlx::query_as::<_, Attempt>(
            r#"UPDATE attempts
               SET status = 'submitted',
                   grading_error = NULL,
                   submitted_at = COALESCE(submitted_at, $2)
               WHERE id = $1 AND status IN ('in_progress', 'failed')
               RETURNING *"#,
        )
        .bind(id)
        .bind(submitted_at)
        .fetch_optional(pool)
        .await
    }

    /// Claim a submitted attempt for grading. Returns false if it is not `Submitted`.
    pub async fn claim_for_grading(pool: &SqlitePool, id: Uuid) -> Result<bool, sqlx::Error> {
        let result = sqlx::query("UPDATE attempts SET status = 'grading' WHERE id = $1 AND status = 'submitted'")
            .bind(id)
            .execute(pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    pub async fn mark_graded(
        pool: &SqlitePool,
        id: Uuid,
        overall_feedback: Option<&str>,
        graded_at: DateTime<Utc>,
    ) -> Result<(), sqlx::Error> {
        sqlx::query(
            r#"UPDATE attempts
               SET status = 'graded',
                   overall_feedback = $2,
                   grading_error = NULL,
                   graded_at = $3
               WHERE id = $1"#,
        )
        .bind(id)
        .bind(overall_feedback)
        .bind(graded_at)
        .execute(pool)
        .await?;
        Ok(())
    }

    pub async fn mark_failed(pool: &SqlitePool, id: Uuid, error_message: &str) -> Result<(), sqlx::Error> {
        sqlx::query("UPDATE attempts SET status = 'failed', grading_error = $2 WHERE id = $1")
            .bind(id)
            .bind(error_message)
            .execute(pool)
            .await?;
        Ok(())
    }

    /// Graded attempts together with the dispute period of their assessment
    pub async fn find_graded_with_period(pool: &SqlitePool) -> Result<Vec<GradedAttempt>, sqlx::Error> {
        sqlx::query_as::<_, GradedAttempt>(
            r#"SELECT att.*, a.dispute_period_days
               FROM attempts att
               JOIN assessments a ON a.id = att.assessment_id
               WHERE att.status = 'graded' AND att.graded_at IS NOT NULL"#,
        )
        .fetch_all(pool)
        .await
    }

    /// Finalize a graded attempt unless it has an open dispute. Returns whether it was finalized.
    pub async fn finalize(pool: &SqlitePool, id: Uuid, finalized_at: DateTime<Utc>) -> Result<bool, sqlx::Error> {
        let result = sqlx::query(
            r#"UPDATE attempts
               SET status = 'finalized',
                   finalized_at = $2
               WHERE id = $1
                 AND status = 'graded'
                 AND NOT EXISTS (
                     SELECT 1 FROM disputes d
                     JOIN results r ON r.id = d.result_id
                     WHERE r.attempt_id = $1 AND d.status = 'open'
                 )"#,
        )
        .bind(id)
        .bind(finalized_at)
        .execute(pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    pub async fn delete(pool: &SqlitePool, id: Uuid) -> Result<u64, sqlx::Error> {
        let result = sqlx::query("DELETE FROM attempts WHERE id = $1")
            .bind(id)
            .execute(pool)
            .await?;
        Ok(result.rows_affected())
    }
}

fn push_filters(query: &mut QueryBuilder<'_, Sqlite>, filter: &AttemptFilter) {
    if let Some(assessment_id) = filter.assessment_id {
        query.push(" AND assessment_id = ").push_bind(assessment_id);
    }
    if let Some(student_id) = filter.student_id {
        query.push(" AND student_id = ").push_bind(student_id);
    }
    if let Some(status) = filter.status {
        query.push(" AND status = ").push_bind(status);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{
        test_support::{create_assessment, create_user, pool},
        user::UserRole,
    };

    #[tokio::test]
    async fn test_attempt_state_transitions() {
        let pool = pool().await;
        let assessment = create_assessment(&pool, &[]).await;
        let student = create_user(&pool, "s@example.edu", UserRole::Student).await;
        let start = StartAttempt {
            assessment_id: assessment.id,
            student_id: student.id,
        };
        let attempt = Attempt::create(&pool, Uuid::new_v4(), &start).await.unwrap();
        assert_eq!(attempt.status, AttemptStatus::InProgress);
        assert!(Attempt::create(&pool, Uuid::new_v4(), &start).await.is_err());

        let saved = Attempt::save_answer(&pool, attempt.id, "My answer").await.unwrap().unwrap();
        assert_eq!(saved.answer, "My answer");

        assert!(!Attempt::claim_for_grading(&pool, attempt.id).await.unwrap());
        let submitted = Attempt::mark_submitted(&pool, attempt.id, Utc::now()).await.unwrap().unwrap();
        assert_eq!(submitted.status, AttemptStatus::Submitted);
        assert!(submitted.submitted_at.is_some());
        assert!(Attempt::save_answer(&pool, attempt.id, "late edit").await.unwrap().is_none());
        assert!(Attempt::mark_submitted(&pool, attempt.id, Utc::now()).await.unwrap().is_none());

        assert!(Attempt::claim_for_grading(&pool, attempt.id).await.unwrap());
        Attempt::mark_failed(&pool, attempt.id, "model unavailable").await.unwrap();
        let resubmitted = Attempt::mark_submitted(&pool, attempt.id, Utc::now()).await.unwrap().unwrap();
        assert_eq!(resubmitted.status, AttemptStatus::Submitted);
        assert!(resubmitted.grading_error.is_none());

        assert!(Attempt::claim_for_grading(&pool, attempt.id).await.unwrap());
        Attempt::mark_graded(&pool, attempt.id, Some("Solid work"), Utc::now()).await.unwrap();
        let graded = Attempt::find_by_id(&pool, attempt.id).await.unwrap().unwrap();
        assert_eq!(graded.status, AttemptStatus::Graded);
        assert_eq!(graded.overall_feedback.as_deref(), Some("Solid work"));

        let pending = Attempt::find_graded_with_period(&pool).await.unwrap();
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].dispute_period_days, assessment.dispute_period_days);
        assert!(pending[0].dispute_deadline().is_some());

        assert!(Attempt::finalize(&pool, attempt.id, Utc::now()).await.unwrap());
        assert!(!Attempt::finalize(&pool, attempt.id, Utc::now()).await.unwrap());
    }
}
