use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{FromRow, QueryBuilder, Sqlite, SqlitePool, Type};
use strum_macros::{Display, EnumString};
use ts_rs::TS;
use utils::pagination::{ListParams, Page};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, Type, Serialize, Deserialize, PartialEq, Eq, TS, EnumString, Display, Default)]
#[sqlx(type_name = "assessment_status", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum AssessmentStatus {
    #[default]
    Draft,
    Published,
    Closed,
}

/// Progress of AI case/solution generation
#[derive(Debug, Clone, Copy, Type, Serialize, Deserialize, PartialEq, Eq, TS, EnumString, Display, Default)]
#[sqlx(type_name = "generation_status", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum GenerationStatus {
    #[default]
    Idle,
    Pending,
    GeneratingCase,
    GeneratingSolution,
    Completed,
    Failed,
}

impl GenerationStatus {
    pub fn is_running(&self) -> bool {
        matches!(
            self,
            GenerationStatus::Pending | GenerationStatus::GeneratingCase | GenerationStatus::GeneratingSolution
        )
    }
}

/// AI-graded case-study exercise
#[derive(Debug, Clone, FromRow, Serialize, Deserialize, TS)]
pub struct Assessment {
    pub id: Uuid,
    pub title: String,
    pub description: Option<String>,
    pub teacher_id: Uuid,
    pub group_id: Option<Uuid>,
    pub domain_id: Option<Uuid>,
    pub status: AssessmentStatus,
    pub case_text: Option<String>,
    pub solution: Option<String>,
    pub generation_status: GenerationStatus,
    pub generation_error: Option<String>,
    pub dispute_period_days: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Assessment {
    pub fn has_case(&self) -> bool {
        self.case_text.as_deref().is_some_and(|c| !c.trim().is_empty())
    }
}

/// Assessment with the ids of its linked skills and sources
#[derive(Debug, Clone, Serialize, Deserialize, TS)]
pub struct AssessmentDetail {
    #[serde(flatten)]
    #[ts(flatten)]
    pub assessment: Assessment,
    pub skill_ids: Vec<Uuid>,
    pub source_ids: Vec<Uuid>,
}

impl std::ops::Deref for AssessmentDetail {
    type Target = Assessment;
    fn deref(&self) -> &Self::Target {
        &self.assessment
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, TS)]
pub struct CreateAssessment {
    pub title: String,
    pub description: Option<String>,
    pub teacher_id: Uuid,
    pub group_id: Option<Uuid>,
    pub domain_id: Option<Uuid>,
    pub case_text: Option<String>,
    pub dispute_period_days: Option<i64>,
    #[serde(default)]
    pub skill_ids: Vec<Uuid>,
    #[serde(default)]
    pub source_ids: Vec<Uuid>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, TS)]
pub struct UpdateAssessment {
    pub title: Option<String>,
    pub description: Option<String>,
    pub group_id: Option<Uuid>,
    pub domain_id: Option<Uuid>,
    pub case_text: Option<String>,
    pub solution: Option<String>,
    pub dispute_period_days: Option<i64>,
    pub skill_ids: Option<Vec<Uuid>>,
    pub source_ids: Option<Vec<Uuid>>,
    /// Unset the group; takes precedence over `group_id`
    #[serde(default)]
    pub clear_group: bool,
    /// Unset the domain; takes precedence over `domain_id`
    #[serde(default)]
    pub clear_domain: bool,
}

impl UpdateAssessment {
    /// Whether the update touches content that is frozen once an assessment is published
    pub fn changes_content(&self) -> bool {
        self.case_text.is_some() || self.solution.is_some() || self.skill_ids.is_some() || self.source_ids.is_some()
    }
}

#[derive(Debug, Clone, Default, Deserialize, TS)]
pub struct AssessmentFilter {
    pub teacher_id: Option<Uuid>,
    pub group_id: Option<Uuid>,
    pub domain_id: Option<Uuid>,
    pub status: Option<AssessmentStatus>,
}

pub const DEFAULT_DISPUTE_PERIOD_DAYS: i64 = 7;
/// Longest dispute period an assessment may declare
pub const MAX_DISPUTE_PERIOD_DAYS: i64 = 3650;

const SORTABLE: &[&str] = &["title", "status", "created_at", "updated_at"];

impl Assessment {
    pub async fn create(pool: &SqlitePool, id: Uuid, data: &CreateAssessment) -> Result<AssessmentDetail, sqlx::Error> {
        let mut tx = pool.begin().await?;

        let assessment = sqlx::query_as::<_, Assessment>(
            r#"INSERT INTO assessments (id, title, description, teacher_id, group_id, domain_id, case_text, dispute_period_days)
               VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
               RETURNING *"#,
        )
        .bind(id)
        .bind(data.title.trim())
        .bind(&data.description)
        .bind(data.teacher_id)
        .bind(data.group_id)
        .bind(data.domain_id)
        .bind(&data.case_text)
        .bind(data.dispute_period_days.unwrap_or(DEFAULT_DISPUTE_PERIOD_DAYS))
        .fetch_one(&mut *tx)
        .await?;

        for skill_id in &data.skill_ids {
            sqlx::query("INSERT OR IGNORE INTO assessment_skills (assessment_id, skill_id) VALUES ($1, $2)")
                .bind(id)
                .bind(skill_id)
                .execute(&mut *tx)
                .await?;
        }
        for source_id in &data.source_ids {
            sqlx::query("INSERT OR IGNORE INTO assessment_sources (assessment_id, source_id) VALUES ($1, $2)")
                .bind(id)
                .bind(source_id)
                .execute(&mut *tx)
                .await?;
        }

        tx.commit().await?;

        Ok(AssessmentDetail {
            assessment,
            skill_ids: dedup(&data.skill_ids),
            source_ids: dedup(&data.source_ids),
        })
    }

    pub async fn find_by_id(pool: &SqlitePool, id: Uuid) -> Result<Option<Self>, sqlx::Error> {
        sqlx::query_as::<_, Assessment>("SELECT * FROM assessments WHERE id = $1")
            .bind(id)
            .fetch_optional(pool)
            .await
    }

    pub async fn find_detail(pool: &SqlitePool, id: Uuid) -> Result<Option<AssessmentDetail>, sqlx::Error> {
        let Some(assessment) = Self::find_by_id(pool, id).await? else {
            return Ok(None);
        };
        let skill_ids = Self::skill_ids(pool, id).await?;
        let source_ids = Self::source_ids(pool, id).await?;
        Ok(Some(AssessmentDetail {
            assessment,
            skill_ids,
            source_ids,
        }))
    }

    pub async fn skill_ids(pool: &SqlitePool, id: Uuid) -> Result<Vec<Uuid>, sqlx::Error> {
        sqlx::query_scalar::<_, Uuid>(
            "SELECT skill_id FROM assessment_skills WHERE assessment_id = $1 ORDER BY rowid",
        )
        .bind(id)
        .fetch_all(pool)
        .await
    }

    pub async fn source_ids(pool: &SqlitePool, id: Uuid) -> Result<Vec<Uuid>, sqlx::Error> {
        sqlx::query_scalar::<_, Uuid>(
            "SELECT source_id FROM assessment_sources WHERE assessment_id = $1 ORDER BY rowid",
        )
        .bind(id)
        .fetch_all(pool)
        .await
    }

    pub async fn list(
        pool: &SqlitePool,
        filter: &AssessmentFilter,
        params: &ListParams,
    ) -> Result<Page<Self>, sqlx::Error> {
        let mut count = QueryBuilder::<Sqlite>::new("SELECT COUNT(*) FROM assessments WHERE 1 = 1");
        push_filters(&mut count, filter, params);
        let total = count.build_query_scalar::<i64>().fetch_one(pool).await?;

        let mut query = QueryBuilder::<Sqlite>::new("SELECT * FROM assessments WHERE 1 = 1");
        push_filters(&mut query, filter, params);
        query
            .push(" ORDER BY ")
            .push(params.sort_column(SORTABLE, "created_at"))
            .push(" ")
            .push(params.order().as_sql())
            .push(" LIMIT ")
            .push_bind(params.limit())
            .push(" OFFSET ")
            .push_bind(params.offset());
        let items = query.build_query_as::<Assessment>().fetch_all(pool).await?;

        Ok(Page::new(items, total, params))
    }

    /// Apply the set fields of `data`; link lists, when given, replace the current links.
    pub async fn update(
        pool: &SqlitePool,
        id: Uuid,
        data: &UpdateAssessment,
    ) -> Result<Option<AssessmentDetail>, sqlx::Error> {
        let mut tx = pool.begin().await?;

        let updated = sqlx::query_as::<_, Assessment>(
            r#"UPDATE assessments
               SET title               = COALESCE($2, title),
                   description         = COALESCE($3, description),
                   group_id            = CASE WHEN $9 THEN NULL ELSE COALESCE($4, group_id) END,
                   domain_id           = CASE WHEN $10 THEN NULL ELSE COALESCE($5, domain_id) END,
                   case_text           = COALESCE($6, case_text),
                   solution            = COALESCE($7, solution),
                   dispute_period_days = COALESCE($8, dispute_period_days),
                   updated_at          = datetime('now', 'subsec')
               WHERE id = $1
               RETURNING *"#,
        )
        .bind(id)
        .bind(data.title.as_deref().map(str::trim))
        .bind(&data.description)
        .bind(data.group_id)
        .bind(data.domain_id)
        .bind(&data.case_text)
        .bind(&data.solution)
        .bind(data.dispute_period_days)
        .bind(data.clear_group)
        .bind(data.clear_domain)
        .fetch_optional(&mut *tx)
        .await?;

        if updated.is_none() {
            return Ok(None);
        }

        if let Some(skill_ids) = &data.skill_ids {
            sqlx::query("DELETE FROM assessment_skills WHERE assessment_id = $1")
                .bind(id)
                .execute(&mut *tx)
                .await?;
            for skill_id in skill_ids {
                sqlx::query("INSERT OR IGNORE INTO assessment_skills (assessment_id, skill_id) VALUES ($1, $2)")
                    .bind(id)
                    .bind(skill_id)
                    .execute(&mut *tx)
                    .await?;
            }
        }
        if let Some(source_ids) = &data.source_ids {
            sqlx::query("DELETE FROM assessment_sources WHERE assessment_id = $1")
                .bind(id)
                .execute(&mut *tx)
                .await?;
            for source_id in source_ids {
                sqlx::query("INSERT OR IGNORE INTO assessment_sources (assessment_id, source_id) VALUES ($1, $2)")
                    .bind(id)
                    .bind(source_id)
                    .execute(&mut *tx)
                    .await?;
            }
        }

        tx.commit().await?;
        Self::find_detail(pool, id).await
    }

    pub async fn update_status(pool: &SqlitePool, id: Uuid, status: AssessmentStatus) -> Result<(), sqlx::Error> {
        sqlx::query(
            r#"UPDATE assessments
               SET status = $2,
                   updated_at = datetime('now', 'subsec')
               WHERE id = $1"#,
        )
        .bind(id)
        .bind(status)
        .execute(pool)
        .await?;
        Ok(())
    }

    pub async fn update_generation_status(
        pool: &SqlitePool,
        id: Uuid,
        status: GenerationStatus,
        error_message: Option<&str>,
    ) -> Result<(), sqlx::Error> {
        sqlx::query(
            r#"UPDATE assessments
               SET generation_status = $2,
                   generation_error = $3,
                   updated_at = datetime('now', 'subsec')
               WHERE id = $1"#,
        )
        .bind(id)
        .bind(status)
        .bind(error_message)
        .execute(pool)
        .await?;
        Ok(())
    }

    /// Atomically move an assessment into `Pending` generation unless one is already running.
    /// Returns false when another generation holds the assessment.
    pub async fn claim_generation(pool: &SqlitePool, id: Uuid) -> Result<bool, sqlx::Error> {
        let result = sqlx::query(
            r#"UPDATE assessments
               SET generation_status = 'pending',
                   generation_error = NULL,
                   updated_at = datetime('now', 'subsec')
               WHERE id = $1
                 AND generation_status NOT IN ('pending', 'generating_case', 'generating_solution')"#,
        )
        .bind(id)
        .execute(pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    pub async fn store_case_text(pool: &SqlitePool, id: Uuid, case_text: &str) -> Result<(), sqlx::Error> {
        sqlx::query(
            r#"UPDATE assessments
               SET case_text = $2,
                   updated_at = datetime('now', 'subsec')
               WHERE id = $1"#,
        )
        .bind(id)
        .bind(case_text)
        .execute(pool)
        .await?;
        Ok(())
    }

    pub async fn store_solution(pool: &SqlitePool, id: Uuid, solution: &str) -> Result<(), sqlx::Error> {
        sqlx::query(
            r#"UPDATE assessments
               SET solution = $2,
                   updated_at = datetime('now', 'subsec')
               WHERE id = $1"#,
        )
        .bind(id)
        .bind(solution)
        .execute(pool)
        .await?;
        Ok(())
    }

    pub async fn delete(pool: &SqlitePool, id: Uuid) -> Result<u64, sqlx::Error> {
        let result = sqlx::query("DELETE FROM assessments WHERE id = $1")
            .bind(id)
            .execute(pool)
            .await?;
        Ok(result.rows_affected())
    }
}

fn push_filters(query: &mut QueryBuilder<'_, Sqlite>, filter: &AssessmentFilter, params: &ListParams) {
    if let Some(teacher_id) = filter.teacher_id {
        query.push(" AND teacher_id = ").push_bind(teacher_id);
    }
    if let Some(group_id) = filter.group_id {
        query.push(" AND group_id = ").push_bind(group_id);
    }
    if let Some(domain_id) = filter.domain_id {
        query.push(" AND domain_id = ").push_bind(domain_id);
    }
    if let Some(status) = filter.status {
        query.push(" AND status = ").push_bind(status);
    }
    if let Some(pattern) = params.search_pattern() {
        query
            .push(" AND (title LIKE ")
            .push_bind(pattern.clone())
            .push(" OR description LIKE ")
            .push_bind(pattern)
            .push(")");
    }
}

fn dedup(ids: &[Uuid]) -> Vec<Uuid> {
    let mut seen = Vec::with_capacity(ids.len());
    for id in ids {
        if !seen.contains(id) {
            seen.push(*id);
        }
    }
    seen
}
