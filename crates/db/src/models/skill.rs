use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{FromRow, QueryBuilder, Sqlite, SqlitePool};
use ts_rs::TS;
use utils::pagination::{ListParams, Page};
use uuid::Uuid;

use super::skill_level::{NewSkillLevel, SkillLevel};

/// A graded competency dimension
#[derive(Debug, Clone, FromRow, Serialize, Deserialize, TS)]
pub struct Skill {
    pub id: Uuid,
    pub domain_id: Uuid,
    pub name: String,
    pub description: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Skill together with its ordered proficiency levels
#[derive(Debug, Clone, Serialize, Deserialize, TS)]
pub struct SkillWithLevels {
    #[serde(flatten)]
    #[ts(flatten)]
    pub skill: Skill,
    pub levels: Vec<SkillLevel>,
}

impl std::ops::Deref for SkillWithLevels {
    type Target = Skill;
    fn deref(&self) -> &Self::Target {
        &self.skill
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, TS)]
pub struct CreateSkill {
    pub domain_id: Uuid,
    pub name: String,
    pub description: Option<String>,
    /// Optional initial levels, lowest proficiency first
    pub levels: Option<Vec<NewSkillLevel>>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, TS)]
pub struct UpdateSkill {
    pub name: Option<String>,
    pub description: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize, TS)]
pub struct SkillFilter {
    pub domain_id: Option<Uuid>,
}

const SORTABLE: &[&str] = &["name", "created_at"];

impl Skill {
    pub async fn create(pool: &SqlitePool, id: Uuid, data: &CreateSkill) -> Result<Self, sqlx::Error> {
        sqlx::query_as::<_, Skill>(
            r#"INSERT INTO skills (id, domain_id, name, description)
               VALUES ($1, $2, $3, $4)
               RETURNING *"#,
        )
        .bind(id)
        .bind(data.domain_id)
        .bind(data.name.trim())
        .bind(&data.description)
        .fetch_one(pool)
        .await
    }

    pub async fn find_by_id(pool: &SqlitePool, id: Uuid) -> Result<Option<Self>, sqlx::Error> {
        sqlx::query_as::<_, Skill>("SELECT * FROM skills WHERE id = $1")
            .bind(id)
            .fetch_optional(pool)
            .await
    }

    pub async fn find_with_levels(pool: &SqlitePool, id: Uuid) -> Result<Option<SkillWithLevels>, sqlx::Error> {
        let Some(skill) = Self::find_by_id(pool, id).await? else {
            return Ok(None);
        };
        let levels = SkillLevel::find_by_skill_id(pool, id).await?;
        Ok(Some(SkillWithLevels { skill, levels }))
    }

    pub async fn find_by_domain_id(pool: &SqlitePool, domain_id: Uuid) -> Result<Vec<Self>, sqlx::Error> {
        sqlx::query_as::<_, Skill>("SELECT * FROM skills WHERE domain_id = $1 ORDER BY name")
            .bind(domain_id)
            .fetch_all(pool)
            .await
    }

    /// Skills linked to an assessment, each with its levels
    pub async fn find_for_assessment(
        pool: &SqlitePool,
        assessment_id: Uuid,
    ) -> Result<Vec<SkillWithLevels>, sqlx::Error> {
        let skills = sqlx::query_as::<_, Skill>(
            r#"SELECT s.*
               FROM skills s
               JOIN assessment_skills a ON a.skill_id = s.id
               WHERE a.assessment_id = $1
               ORDER BY s.name"#,
        )
        .bind(assessment_id)
        .fetch_all(pool)
        .await?;

        let mut with_levels = Vec::with_capacity(skills.len());
        for skill in skills {
            let levels = SkillLevel::find_by_skill_id(pool, skill.id).await?;
            with_levels.push(SkillWithLevels { skill, levels });
        }
        Ok(with_levels)
    }

    pub async fn list(
        pool: &SqlitePool,
        filter: &SkillFilter,
        params: &ListParams,
    ) -> Result<Page<Self>, sqlx::Error> {
        let mut count = QueryBuilder::<Sqlite>::new("SELECT COUNT(*) FROM skills WHERE 1 = 1");
        push_filters(&mut count, filter, params);
        let total = count.build_query_scalar::<i64>().fetch_one(pool).await?;

        let mut query = QueryBuilder::<Sqlite>::new("SELECT * FROM skills WHERE 1 = 1");
        push_filters(&mut query, filter, params);
        query
            .push(" ORDER BY ")
            .push(params.sort_column(SORTABLE, "name"))
            .push(" ")
            .push(params.order().as_sql())
            .push(" LIMIT ")
            .push_bind(params.limit())
            .push(" OFFSET ")
            .push_bind(params.offset());
        let items = query.build_query_as::<Skill>().fetch_all(pool).await?;

        Ok(Page::new(items, total, params))
    }

    pub async fn update(pool: &SqlitePool, id: Uuid, data: &UpdateSkill) -> Result<Option<Self>, sqlx::Error> {
        sqlx::query_as::<_, Skill>(
            r#"UPDATE skills
               SET name        = COALESCE($2, name),
                   description = COALESCE($3, description),
                   updated_at  = datetime('now', 'subsec')
               WHERE id = $1
               RETURNING *"#,
        )
        .bind(id)
        .bind(data.name.as_deref().map(str::trim))
        .bind(&data.description)
        .fetch_optional(pool)
        .await
    }

    pub async fn delete(pool: &SqlitePool, id: Uuid) -> Result<u64, sqlx::Error> {
        let result = sqlx::query("DELETE FROM skills WHERE id = $1")
            .bind(id)
            .execute(pool)
            .await?;
        Ok(result.rows_affected())
    }
}

fn push_filters(query: &mut QueryBuilder<'_, Sqlite>, filter: &SkillFilter, params: &ListParams) {
    if let Some(domain_id) = filter.domain_id {
        query.push(" AND domain_id = ").push_bind(domain_id);
    }
    if let Some(pattern) = params.search_pattern() {
        query.push(" AND name LIKE ").push_bind(pattern);
    }
}
