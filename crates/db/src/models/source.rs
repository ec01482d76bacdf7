use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{FromRow, QueryBuilder, Sqlite, SqlitePool, Type};
use strum_macros::{Display, EnumString};
use ts_rs::TS;
use utils::pagination::{ListParams, Page};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, Type, Serialize, Deserialize, PartialEq, Eq, TS, EnumString, Display, Default)]
#[sqlx(type_name = "source_kind", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum SourceKind {
    #[default]
    Text,
    Markdown,
}

/// Embedding pipeline state of a source
#[derive(Debug, Clone, Copy, Type, Serialize, Deserialize, PartialEq, Eq, TS, EnumString, Display, Default)]
#[sqlx(type_name = "source_status", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum SourceStatus {
    #[default]
    Pending,
    Processing,
    Ready,
    Failed,
}

/// A chunk of source text with its embedding, as stored in `sources.chunks`
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct EmbeddedChunk {
    pub index: usize,
    /// Byte offset of the chunk in the source content
    pub offset: usize,
    pub text: String,
    pub embedding: Vec<f32>,
}

/// Uploaded reference document
#[derive(Debug, Clone, FromRow, Serialize, Deserialize, TS)]
pub struct Source {
    pub id: Uuid,
    pub title: String,
    pub kind: SourceKind,
    pub content: String,
    #[serde(skip)]
    #[ts(skip)]
    pub chunks: Option<String>, // JSON-serialized Vec<EmbeddedChunk>
    pub chunk_count: i64,
    pub status: SourceStatus,
    pub error_message: Option<String>,
    pub uploaded_by: Option<Uuid>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Source {
    /// Parse the stored chunks. Sources that have not been embedded yet have none.
    pub fn parsed_chunks(&self) -> Result<Vec<EmbeddedChunk>, serde_json::Error> {
        match &self.chunks {
            Some(json) => serde_json::from_str(json),
            None => Ok(Vec::new()),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, TS)]
pub struct CreateSource {
    pub title: String,
    pub kind: Option<SourceKind>,
    pub content: String,
    pub uploaded_by: Option<Uuid>,
}

#[derive(Debug, Clone, Default, Deserialize, TS)]
pub struct SourceFilter {
    pub status: Option<SourceStatus>,
    pub uploaded_by: Option<Uuid>,
}

const SORTABLE: &[&str] = &["title", "status", "created_at"];

impl Source {
    pub async fn create(pool: &SqlitePool, id: Uuid, data: &CreateSource) -> Result<Self, sqlx::Error> {
        sqlx::query_as::<_, Source>(
            r#"INSERT INTO sources (id, title, kind, content, uploaded_by)
               VALUES ($1, $2, $3, $4, $5)
               RETURNING *"#,
        )
        .bind(id)
        .bind(data.title.trim())
        .bind(data.kind.unwrap_or_default())
        .bind(&data.content)
        .bind(data.uploaded_by)
        .fetch_one(pool)
        .await
    }

    pub async fn find_by_id(pool: &SqlitePool, id: Uuid) -> Result<Option<Self>, sqlx::Error> {
        sqlx::query_as::<_, Source>("SELECT * FROM sources WHERE id = $1")
            .bind(id)
            .fetch_optional(pool)
            .await
    }

    /// Embedded sources, restricted to `ids` when given, in creation order
    pub async fn find_ready(pool: &SqlitePool, ids: Option<&[Uuid]>) -> Result<Vec<Self>, sqlx::Error> {
        let mut query = QueryBuilder::<Sqlite>::new("SELECT * FROM sources WHERE status = 'ready'");
        if let Some(ids) = ids {
            if ids.is_empty() {
                return Ok(Vec::new());
            }
            query.push(" AND id IN ");
            query.push_tuples(ids.iter().copied(), |mut b, id| {
                b.push_bind(id);
            });
        }
        query.push(" ORDER BY created_at ASC, id ASC");
        query.build_query_as::<Source>().fetch_all(pool).await
    }

    pub async fn list(
        pool: &SqlitePool,
        filter: &SourceFilter,
        params: &ListParams,
    ) -> Result<Page<Self>, sqlx::Error> {
        let mut count = QueryBuilder::<Sqlite>::new("SELECT COUNT(*) FROM sources WHERE 1 = 1");
        push_filters(&mut count, filter, params);
        let total = count.build_query_scalar::<i64>().fetch_one(pool).await?;

        let mut query = QueryBuilder::<Sqlite>::new("SELECT * FROM sources WHERE 1 = 1");
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
        let items = query.build_query_as::<Source>().fetch_all(pool).await?;

        Ok(Page::new(items, total, params))
    }

    pub async fn update_status(
        pool: &SqlitePool,
        id: Uuid,
        status: SourceStatus,
        error_message: Option<&str>,
    ) -> Result<(), sqlx::Error> {
        sqlx::query(
            r#"UPDATE sources
               SET status = $2,
                   error_message = $3,
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

    /// Store embedded chunks and mark the source ready
    pub async fn store_chunks(pool: &SqlitePool, id: Uuid, chunks: &[EmbeddedChunk]) -> Result<(), sqlx::Error> {
        let json = serde_json::to_string(chunks).map_err(|e| sqlx::Error::Protocol(e.to_string()))?;
        sqlx::query(
            r#"UPDATE sources
               SET chunks = $2,
                   chunk_count = $3,
                   status = 'ready',
                   error_message = NULL,
                   updated_at = datetime('now', 'subsec')
               WHERE id = $1"#,
        )
        .bind(id)
        .bind(json)
        .bind(chunks.len() as i64)
        .execute(pool)
        .await?;
        Ok(())
    }

    pub async fn delete(pool: &SqlitePool, id: Uuid) -> Result<u64, sqlx::Error> {
        let result = sqlx::query("DELETE FROM sources WHERE id = $1")
            .bind(id)
            .execute(pool)
            .await?;
        Ok(result.rows_affected())
    }
}

fn push_filters(query: &mut QueryBuilder<'_, Sqlite>, filter: &SourceFilter, params: &ListParams) {
    if let Some(status) = filter.status {
        query.push(" AND status = ").push_bind(status);
    }
    if let Some(uploaded_by) = filter.uploaded_by {
        query.push(" AND uploaded_by = ").push_bind(uploaded_by);
    }
    if let Some(pattern) = params.search_pattern() {
        query.push(" AND title LIKE ").push_bind(pattern);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::test_support::pool;

    fn chunk(index: usize, text: &str) -> EmbeddedChunk {
        EmbeddedChunk {
            index,
            offset: index * 10,
            text: text.to_string(),
            embedding: vec![0.5, 0.25],
        }
    }

    #[tokio::test]
    async fn test_store_chunks_marks_ready() {
        let pool = pool().await;
        let source = Source::create(
            &pool,
            Uuid::new_v4(),
            &CreateSource {
                title: "Handbook".to_string(),
                kind: Some(SourceKind::Markdown),
                content: "# Handbook".to_string(),
                uploaded_by: None,
            },
        )
        .await
        .unwrap();
        assert_eq!(source.status, SourceStatus::Pending);
        assert!(source.parsed_chunks().unwrap().is_empty());
        assert!(Source::find_ready(&pool, None).await.unwrap().is_empty());

        let chunks = vec![chunk(0, "first"), chunk(1, "second")];
        Source::store_chunks(&pool, source.id, &chunks).await.unwrap();

        let stored = Source::find_by_id(&pool, source.id).await.unwrap().unwrap();
        assert_eq!(stored.status, SourceStatus::Ready);
        assert_eq!(stored.chunk_count, 2);
        assert_eq!(stored.parsed_chunks().unwrap(), chunks);

        let ready = Source::find_ready(&pool, Some(&[source.id])).await.unwrap();
        assert_eq!(ready.len(), 1);
        assert!(Source::find_ready(&pool, Some(&[])).await.unwrap().is_empty());
    }
}
