use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{Executor, FromRow, Sqlite, SqlitePool};
use ts_rs::TS;
use uuid::Uuid;

/// Level assigned to one skill of a graded attempt
#[derive(Debug, Clone, FromRow, Serialize, Deserialize, TS)]
pub struct SkillResult {
    pub id: Uuid,
    pub attempt_id: Uuid,
    pub skill_id: Uuid,
    pub skill_level_id: Uuid,
    pub feedback: Option<String>,
    /// Set when a teacher changed the level while resolving a dispute
    pub overridden: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Result joined with the skill name and level label, for display
#[derive(Debug, Clone, FromRow, Serialize, Deserialize, TS)]
pub struct SkillResultView {
    #[sqlx(flatten)]
    #[serde(flatten)]
    #[ts(flatten)]
    pub result: SkillResult,
    pub skill_name: String,
    pub level_label: String,
    pub level_position: i64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct NewSkillResult {
    pub skill_id: Uuid,
    pub skill_level_id: Uuid,
    pub feedback: Option<String>,
}

impl SkillResult {
    pub async fn find_by_id(pool: &SqlitePool, id: Uuid) -> Result<Option<Self>, sqlx::Error> {
        sqlx::query_as::<_, SkillResult>("SELECT * FROM results WHERE id = $1")
            .bind(id)
            .fetch_optional(pool)
            .await
    }

    pub async fn find_by_attempt_id(pool: &SqlitePool, attempt_id: Uuid) -> Result<Vec<SkillResultView>, sqlx::Error> {
        sqlx::query_as::<_, SkillResultView>(
            r#"SELECT r.*,
                      s.name      AS skill_name,
                      sl.label    AS level_label,
                      sl.position AS level_position
               FROM results r
               JOIN skills s ON s.id = r.skill_id
               JOIN skill_levels sl ON sl.id = r.skill_level_id
               WHERE r.attempt_id = $1
               ORDER BY s.name"#,
        )
        .bind(attempt_id)
        .fetch_all(pool)
        .await
    }

    /// Replace all results of an attempt in one transaction
    pub async fn replace_for_attempt(
        pool: &SqlitePool,
        attempt_id: Uuid,
        results: &[NewSkillResult],
    ) -> Result<Vec<Self>, sqlx::Error> {
        let mut tx = pool.begin().await?;

        sqlx::query("DELETE FROM results WHERE attempt_id = $1")
            .bind(attempt_id)
            .execute(&mut *tx)
            .await?;

        let mut created = Vec::with_capacity(results.len());
        for result in results {
            let row = sqlx::query_as::<_, SkillResult>(
                r#"INSERT INTO results (id, attempt_id, skill_id, skill_level_id, feedback)
                   VALUES ($1, $2, $3, $4, $5)
                   RETURNING *"#,
            )
            .bind(Uuid::new_v4())
            .bind(attempt_id)
            .bind(result.skill_id)
            .bind(result.skill_level_id)
            .bind(&result.feedback)
            .fetch_one(&mut *tx)
            .await?;
            created.push(row);
        }

        tx.commit().await?;
        Ok(created)
    }

    pub async fn override_level<'e, E>(
        executor: E,
        id: Uuid,
        skill_level_id: Uuid,
    ) -> Result<Option<Self>, sqlx::Error>
    where
        E: Executor<'e, Database = Sqlite>,
    {
        sqlx::query_as::<_, SkillResult>(
            r#"UPDATE results
               SET skill_level_id = $2,
                   overridden = 1,
                   updated_at = datetime('now', 'subsec')
               WHERE id = $1
               RETURNING *"#,
        )
        .bind(id)
        .bind(skill_level_id)
        .fetch_optional(executor)
        .await
    }
}
