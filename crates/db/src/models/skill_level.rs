use serde::{Deserialize, Serialize};
use sqlx::{FromRow, SqlitePool};
use ts_rs::TS;
use uuid::Uuid;

/// One proficiency label of a skill. `position` 0 is the lowest level.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize, PartialEq, TS)]
pub struct SkillLevel {
    pub id: Uuid,
    pub skill_id: Uuid,
    pub label: String,
    pub description: Option<String>,
    pub position: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize, TS)]
pub struct NewSkillLevel {
    pub label: String,
    pub description: Option<String>,
}

impl SkillLevel {
    pub async fn find_by_id(pool: &SqlitePool, id: Uuid) -> Result<Option<Self>, sqlx::Error> {
        sqlx::query_as::<_, SkillLevel>("SELECT * FROM skill_levels WHERE id = $1")
            .bind(id)
            .fetch_optional(pool)
            .await
    }

    pub async fn find_by_skill_id(pool: &SqlitePool, skill_id: Uuid) -> Result<Vec<Self>, sqlx::Error> {
        sqlx::query_as::<_, SkillLevel>(
            "SELECT * FROM skill_levels WHERE skill_id = $1 ORDER BY position ASC",
        )
        .bind(skill_id)
        .fetch_all(pool)
        .await
    }

    /// Whether any graded result points at one of this skill's levels
    pub async fn in_use(pool: &SqlitePool, skill_id: Uuid) -> Result<bool, sqlx::Error> {
        let count = sqlx::query_scalar::<_, i64>(
            r#"SELECT COUNT(*)
               FROM results r
               JOIN skill_levels sl ON sl.id = r.skill_level_id
               WHERE sl.skill_id = $1"#,
        )
        .bind(skill_id)
        .fetch_one(pool)
        .await?;
        Ok(count > 0)
    }

    /// Replace every level of a skill in one transaction; list order becomes `position`.
    pub async fn replace_for_skill(
        pool: &SqlitePool,
        skill_id: Uuid,
        levels: &[NewSkillLevel],
    ) -> Result<Vec<Self>, sqlx::Error> {
        let mut tx = pool.begin().await?;

        sqlx::query("DELETE FROM skill_levels WHERE skill_id = $1")
            .bind(skill_id)
            .execute(&mut *tx)
            .await?;

        let mut created = Vec::with_capacity(levels.len());
        for (position, level) in levels.iter().enumerate() {
            let row = sqlx::query_as::<_, SkillLevel>(
                r#"INSERT INTO skill_levels (id, skill_id, label, description, position)
                   VALUES ($1, $2, $3, $4, $5)
                   RETURNING *"#,
            )
            .bind(Uuid::new_v4())
            .bind(skill_id)
            .bind(level.label.trim())
            .bind(&level.description)
            .bind(position as i64)
            .fetch_one(&mut *tx)
            .await?;
            created.push(row);
        }

        tx.commit().await?;
        Ok(created)
    }
}
