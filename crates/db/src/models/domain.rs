use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{FromRow, QueryBuilder, Sqlite, SqlitePool};
use ts_rs::TS;
use utils::pagination::{ListParams, Page};
use uuid::Uuid;

/// Subject area grouping related skills
#[derive(Debug, Clone, FromRow, Serialize, Deserialize, TS)]
pub struct Domain {
    pub id: Uuid,
    pub name: String,
    pub description: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, TS)]
pub struct CreateDomain {
    pub name: String,
    pub description: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, TS)]
pub struct UpdateDomain {
    pub name: Option<String>,
    pub description: Option<String>,
}

const SORTABLE: &[&str] = &["name", "created_at"];

impl Domain {
    pub async fn create(pool: &SqlitePool, id: Uuid, data: &CreateDomain) -> Result<Self, sqlx::Error> {
        sqlx::query_as::<_, Domain>(
            "INSERT INTO domains (id, name, description) VALUES ($1, $2, $3) RETURNING *",
        )
        .bind(id)
        .bind(data.name.trim())
        .bind(&data.description)
        .fetch_one(pool)
        .await
    }

    pub async fn find_by_id(pool: &SqlitePool, id: Uuid) -> Result<Option<Self>, sqlx::Error> {
        sqlx::query_as::<_, Domain>("SELECT * FROM domains WHERE id = $1")
            .bind(id)
            .fetch_optional(pool)
            .await
    }

    pub async fn list(pool: &SqlitePool, params: &ListParams) -> Result<Page<Self>, sqlx::Error> {
        let pattern = params.search_pattern();

        let mut count = QueryBuilder::<Sqlite>::new("SELECT COUNT(*) FROM domains");
        if let Some(pattern) = &pattern {
            count.push(" WHERE name LIKE ").push_bind(pattern.clone());
        }
        let total = count.build_query_scalar::<i64>().fetch_one(pool).await?;

        let mut query = QueryBuilder::<Sqlite>::new("SELECT * FROM domains");
        if let Some(pattern) = pattern {
            query.push(" WHERE name LIKE ").push_bind(pattern);
        }
        query
            .push(" ORDER BY ")
            .push(params.sort_column(SORTABLE, "name"))
            .push(" ")
            .push(params.order().as_sql())
            .push(" LIMIT ")
            .push_bind(params.limit())
            .push(" OFFSET ")
            .push_bind(params.offset());
        let items = query.build_query_as::<Domain>().fetch_all(pool).await?;

        Ok(Page::new(items, total, params))
    }

    pub async fn update(pool: &SqlitePool, id: Uuid, data: &UpdateDomain) -> Result<Option<Self>, sqlx::Error> {
        sqlx::query_as::<_, Domain>(
            r#"UPDATE domains
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
        let result = sqlx::query("DELETE FROM domains WHERE id = $1")
            .bind(id)
            .execute(pool)
            .await?;
        Ok(result.rows_affected())
    }
}
