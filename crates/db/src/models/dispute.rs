use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{Executor, FromRow, QueryBuilder, Sqlite, SqlitePool, Type};
use strum_macros::{Display, EnumString};
use ts_rs::TS;
use utils::pagination::{ListParams, Page};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, Type, Serialize, Deserialize, PartialEq, Eq, TS, EnumString, Display, Default)]
#[sqlx(type_name = "dispute_status", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum DisputeStatus {
    #[default]
    Open,
    Accepted,
    Rejected,
}

/// Student challenge to an AI-assigned result
#[derive(Debug, Clone, FromRow, Serialize, Deserialize, TS)]
pub struct Dispute {
    pub id: Uuid,
    pub result_id: Uuid,
    pub student_id: Uuid,
    pub reason: String,
    pub status: DisputeStatus,
    pub resolution: Option<String>,
    pub resolved_by: Option<Uuid>,
    pub created_at: DateTime<Utc>,
    pub resolved_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Serialize, Deserialize, TS)]
pub struct OpenDispute {
    pub student_id: Uuid,
    pub reason: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, TS)]
pub struct ResolveDispute {
    pub resolver_id: Uuid,
    pub accept: bool,
    pub resolution: Option<String>,
    /// New level for the disputed result; only applied when accepting
    pub new_skill_level_id: Option<Uuid>,
}

#[derive(Debug, Clone, Default, Deserialize, TS)]
pub struct DisputeFilter {
    pub status: Option<DisputeStatus>,
    pub student_id: Option<Uuid>,
    pub assessment_id: Option<Uuid>,
}

const SORTABLE: &[&str] = &["created_at", "resolved_at", "status"];

impl Dispute {
    pub async fn create(
        pool: &SqlitePool,
        id: Uuid,
        result_id: Uuid,
        student_id: Uuid,
        reason: &str,
    ) -> Result<Self, sqlx::Error> {
        sqlx::query_as::<_, Dispute>(
            r#"INSERT INTO disputes (id, result_id, student_id, reason)
               VALUES ($1, $2, $3, $4)
               RETURNING *"#,
        )
        .bind(id)
        .bind(result_id)
        .bind(student_id)
        .bind(reason.trim())
        .fetch_one(pool)
        .await
    }

    pub async fn find_by_id(pool: &SqlitePool, id: Uuid) -> Result<Option<Self>, sqlx::Error> {
        sqlx::query_as::<_, Dispute>("SELECT * FROM disputes WHERE id = $1")
            .bind(id)
            .fetch_optional(pool)
            .await
    }

    pub async fn find_open_for_result(pool: &SqlitePool, result_id: Uuid) -> Result<Option<Self>, sqlx::Error> {
        sqlx::query_as::<_, Dispute>("SELECT * FROM disputes WHERE result_id = $1 AND status = 'open'")
            .bind(result_id)
            .fetch_optional(pool)
            .await
    }

    pub async fn list(
        pool: &SqlitePool,
        filter: &DisputeFilter,
        params: &ListParams,
    ) -> Result<Page<Self>, sqlx::Error> {
        let mut count = QueryBuilder::<Sqlite>::new("SELECT COUNT(*) FROM disputes d WHERE 1 = 1");
        push_filters(&mut count, filter, params);
        let total = count.build_query_scalar::<i64>().fetch_one(pool).await?;

        let mut query = QueryBuilder::<Sqlite>::new("SELECT d.* FROM disputes d WHERE 1 = 1");
        push_filters(&mut query, filter, params);
        query
            .push(" ORDER BY d.")
            .push(params.sort_column(SORTABLE, "created_at"))
            .push(" ")
            .push(params.order().as_sql())
            .push(" LIMIT ")
            .push_bind(params.limit())
            .push(" OFFSET ")
            .push_bind(params.offset());
        let items = query.build_query_as::<Dispute>().fetch_all(pool).await?;

        Ok(Page::new(items, total, params))
    }

    /// Close an open dispute. Returns None if it was not open.
    pub async fn resolve<'e, E>(
        executor: E,
        id: Uuid,
        status: DisputeStatus,
        resolution: Option<&str>,
        resolved_by: Uuid,
        resolved_at: DateTime<Utc>,
    ) -> Result<Option<Self>, sqlx::Error>
    where
        E: Executor<'e, Database = Sqlite>,
    {
        sqlx::query_as::<_, Dispute>(
            r#"UPDATE disputes
               SET status = $2,
                   resolution = $3,
                   resolved_by = $4,
                   resolved_at = $5
               WHERE id = $1 AND status = 'open'
               RETURNING *"#,
        )
        .bind(id)
        .bind(status)
        .bind(resolution)
        .bind(resolved_by)
        .bind(resolved_at)
        .fetch_optional(executor)
        .await
    }
}

fn push_filters(query: &mut QueryBuilder<'_, Sqlite>, filter: &DisputeFilter, params: &ListParams) {
    if let Some(status) = filter.status {
        query.push(" AND d.status = ").push_bind(status);
    }
    if let Some(student_id) = filter.student_id {
        query.push(" AND d.student_id = ").push_bind(student_id);
    }
    if let Some(assessment_id) = filter.assessment_id {
        query
            .push(
                " AND EXISTS (SELECT 1 FROM results r JOIN attempts att ON att.id = r.attempt_id \
                 WHERE r.id = d.result_id AND att.assessment_id = ",
            )
            .push_bind(assessment_id)
            .push(")");
    }
    if let Some(pattern) = params.search_pattern() {
        query.push(" AND d.reason LIKE ").push_bind(pattern);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{
        attempt::{Attempt, StartAttempt},
        result::{NewSkillResult, SkillResult},
        skill_level::SkillLevel,
        test_support::{create_assessment, create_skill, create_user, pool},
        user::UserRole,
    };

    #[tokio::test]
    async fn test_single_open_dispute_and_resolution() {
        let pool = pool().await;
        let skill = create_skill(&pool, "Reasoning", &["Weak", "Strong"]).await;
        let levels = SkillLevel::find_by_skill_id(&pool, skill.id).await.unwrap();
        let assessment = create_assessment(&pool, &[skill.id]).await;
        let student = create_user(&pool, "s@example.edu", UserRole::Student).await;
        let teacher = create_user(&pool, "t@example.edu", UserRole::Teacher).await;
        let attempt = Attempt::create(
            &pool,
            Uuid::new_v4(),
            &StartAttempt {
                assessment_id: assessment.id,
                student_id: student.id,
            },
        )
        .await
        .unwrap();
        Attempt::mark_graded(&pool, attempt.id, None, Utc::now()).await.unwrap();
        let results = SkillResult::replace_for_attempt(
            &pool,
            attempt.id,
            &[NewSkillResult {
                skill_id: skill.id,
                skill_level_id: levels[0].id,
                feedback: None,
            }],
        )
        .await
        .unwrap();
        let result_id = results[0].id;

        let dispute = Dispute::create(&pool, Uuid::new_v4(), result_id, student.id, "  I cited two sources ")
            .await
            .unwrap();
        assert_eq!(dispute.status, DisputeStatus::Open);
        assert_eq!(dispute.reason, "I cited two sources");
        assert!(
            Dispute::create(&pool, Uuid::new_v4(), result_id, student.id, "again")
                .await
                .is_err()
        );

        // An open dispute holds the attempt back from finalization
        assert!(!Attempt::finalize(&pool, attempt.id, Utc::now()).await.unwrap());

        let filter = DisputeFilter {
            assessment_id: Some(assessment.id),
            ..Default::default()
        };
        let page = Dispute::list(&pool, &filter, &ListParams::default()).await.unwrap();
        assert_eq!(page.total, 1);

        let resolved = Dispute::resolve(
            &pool,
            dispute.id,
            DisputeStatus::Rejected,
            Some("Level stands"),
            teacher.id,
            Utc::now(),
        )
        .await
        .unwrap()
        .unwrap();
        assert_eq!(resolved.status, DisputeStatus::Rejected);
        assert_eq!(resolved.resolved_by, Some(teacher.id));
        assert!(
            Dispute::resolve(&pool, dispute.id, DisputeStatus::Accepted, None, teacher.id, Utc::now())
                .await
                .unwrap()
                .is_none()
        );
        assert!(Dispute::find_open_for_result(&pool, result_id).await.unwrap().is_none());

        // A closed dispute frees the slot for a new one
        Dispute::create(&pool, Uuid::new_v4(), result_id, student.id, "new evidence")
            .await
            .unwrap();
    }
}
