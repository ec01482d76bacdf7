//! Source chunking, embedding and brute-force similarity retrieval.
//!
//! Embedded chunks live as JSON in `sources.chunks`; retrieval loads every
//! ready source in scope and ranks all of its chunks by cosine similarity.

use db::{
    models::source::{EmbeddedChunk, Source, SourceStatus},
    retry::with_retry,
};
use serde::{Deserialize, Serialize};
use sqlx::SqlitePool;
use text_splitter::MarkdownSplitter;
use thiserror::Error;
use tracing::{info, warn};
use ts_rs::TS;
use uuid::Uuid;

use super::ai_client::{AiError, AiProvider};

pub const DEFAULT_CHUNK_SIZE: usize = 1000;
pub const EMBED_BATCH_SIZE: usize = 64;
pub const DEFAULT_TOP_K: usize = 5;

#[derive(Debug, Error)]
pub enum EmbeddingError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("ai error: {0}")]
    Ai(#[from] AiError),
    #[error("source not found")]
    SourceNotFound,
    #[error("source has no text to embed")]
    EmptySource,
    #[error("expected {expected} embeddings, got {got}")]
    CountMismatch { expected: usize, got: usize },
}

/// A piece of source text before embedding
#[derive(Debug, Clone, PartialEq)]
pub struct TextChunk {
    pub index: usize,
    /// Byte offset into the original text
    pub offset: usize,
    pub text: String,
}

/// A ranked chunk returned by [`retrieve`]
#[derive(Debug, Clone, Serialize, Deserialize, TS)]
pub struct RetrievedChunk {
    pub source_id: Uuid,
    pub source_title: String,
    pub chunk_index: usize,
    pub text: String,
    pub score: f32,
}

/// Split text into markdown-aware chunks of at most `chunk_size` characters.
/// Whitespace-only chunks are dropped; indexes stay contiguous.
pub fn chunk_text(text: &str, chunk_size: usize) -> Vec<TextChunk> {
    let splitter = MarkdownSplitter::new(chunk_size.max(1));
    splitter
        .chunk_indices(text)
        .filter(|(_, t)| !t.trim().is_empty())
        .enumerate()
        .map(|(index, (offset, text))| TextChunk {
            index,
            offset,
            text: text.to_string(),
        })
        .collect()
}

pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() {
        return 0.0;
    }

    let dot_product: f32 = a.iter().zip(b.iter()).map(|(x, y)| x * y).sum();
    let magnitude_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let magnitude_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();

    if magnitude_a == 0.0 || magnitude_b == 0.0 {
        return 0.0;
    }

    dot_product / (magnitude_a * magnitude_b)
}

/// Chunk and embed a source, storing the result and marking it ready.
///
/// On failure the source is marked failed with the error message. Returns the number of chunks stored.
pub async fn embed_source(
    provider: &dyn AiProvider,
    pool: &SqlitePool,
    source_id: Uuid,
    chunk_size: usize,
) -> Result<usize, EmbeddingError> {
    let source = Source::find_by_id(pool, source_id)
        .await?
        .ok_or(EmbeddingError::SourceNotFound)?;

    Source::update_status(pool, source_id, SourceStatus::Processing, None).await?;

    let stored = match embed_chunks(provider, &source.content, chunk_size).await {
        Ok(embedded) => with_retry("store_chunks", || Source::store_chunks(pool, source_id, &embedded))
            .await
            .map(|()| embedded.len())
            .map_err(EmbeddingError::from),
        Err(e) => Err(e),
    };

    match stored {
        Ok(chunk_count) => {
            info!(source_id = %source_id, chunk_count, "Source embedded");
            Ok(chunk_count)
        }
        Err(e) => {
            warn!(source_id = %source_id, error = %e, "Source embedding failed");
            Source::update_status(pool, source_id, SourceStatus::Failed, Some(&e.to_string())).await?;
            Err(e)
        }
    }
}

async fn embed_chunks(
    provider: &dyn AiProvider,
    content: &str,
    chunk_size: usize,
) -> Result<Vec<EmbeddedChunk>, EmbeddingError> {
    let chunks = chunk_text(content, chunk_size);
    if chunks.is_empty() {
        return Err(EmbeddingError::EmptySource);
    }

    let mut embedded = Vec::with_capacity(chunks.len());
    for batch in chunks.chunks(EMBED_BATCH_SIZE) {
        let inputs: Vec<String> = batch.iter().map(|c| c.text.clone()).collect();
        let vectors = provider.embed(&inputs).await?;
        if vectors.len() != batch.len() {
            return Err(EmbeddingError::CountMismatch {
                expected: batch.len(),
                got: vectors.len(),
            });
        }

        embedded.extend(batch.iter().zip(vectors).map(|(chunk, embedding)| EmbeddedChunk {
            index: chunk.index,
            offset: chunk.offset,
            text: chunk.text.clone(),
            embedding,
        }));
    }

    Ok(embedded)
}

/// Rank every chunk of the ready sources in scope against `query`.
///
/// `source_ids` of `None` searches all ready sources. Results are ordered by
/// descending score; equal scores keep source then chunk order.
pub async fn retrieve(
    provider: &dyn AiProvider,
    pool: &SqlitePool,
    query: &str,
    source_ids: Option<&[Uuid]>,
    top_k: usize,
    min_score: f32,
) -> Result<Vec<RetrievedChunk>, EmbeddingError> {
    if query.trim().is_empty() || top_k == 0 {
        return Ok(Vec::new());
    }

    let sources = Source::find_ready(pool, source_ids).await?;
    if sources.is_empty() {
        return Ok(Vec::new());
    }

    let query_embedding = provider
        .embed(&[query.to_string()])
        .await?
        .into_iter()
        .next()
        .ok_or(EmbeddingError::CountMismatch { expected: 1, got: 0 })?;

    let mut ranked = Vec::new();
    for source in &sources {
        let chunks = match source.parsed_chunks() {
            Ok(chunks) => chunks,
            Err(e) => {
                warn!(source_id = %source.id, error = %e, "Skipping source with unreadable chunks");
                continue;
            }
        };

        for chunk in chunks {
            let score = cosine_similarity(&query_embedding, &chunk.embedding);
            if score >= min_score {
                ranked.push(RetrievedChunk {
                    source_id: source.id,
                    source_title: source.title.clone(),
                    chunk_index: chunk.index,
                    text: chunk.text,
                    score,
                });
            }
        }
    }

    // Stable sort keeps source/chunk order among equal scores
    ranked.sort_by(|a, b| b.score.total_cmp(&a.score));
    ranked.truncate(top_k);
    Ok(ranked)
}

#[cfg(test)]
mod tests {
    use db::models::{source::CreateSource, test_support::pool};

    use super::*;
    use crate::services::testing::ScriptedProvider;

    async fn ready_source(pool: &SqlitePool, provider: &ScriptedProvider, title: &str, content: &str) -> Uuid {
        let source = Source::create(
            pool,
            Uuid::new_v4(),
            &CreateSource {
                title: title.to_string(),
                kind: None,
                content: content.to_string(),
                uploaded_by: None,
            },
        )
        .await
        .unwrap();
        embed_source(provider, pool, source.id, 40).await.unwrap();
        source.id
    }

    #[test]
    fn test_cosine_similarity() {
        assert!((cosine_similarity(&[1.0, 0.0], &[1.0, 0.0]) - 1.0).abs() < 1e-6);
        assert_eq!(cosine_similarity(&[1.0, 0.0], &[0.0, 1.0]), 0.0);
        assert_eq!(cosine_similarity(&[1.0, 0.0], &[1.0, 0.0, 0.0]), 0.0);
        assert_eq!(cosine_similarity(&[0.0, 0.0], &[1.0, 0.0]), 0.0);
    }

    #[test]
    fn test_chunk_text_drops_blank_chunks() {
        let text = "# Heading\n\nFirst paragraph about suppliers.\n\n\n\nSecond paragraph about audits.";
        let chunks = chunk_text(text, 40);
        assert!(chunks.len() >= 2);
        for (i, chunk) in chunks.iter().enumerate() {
            assert_eq!(chunk.index, i);
            assert!(!chunk.text.trim().is_empty());
            assert_eq!(&text[chunk.offset..chunk.offset + chunk.text.len()], chunk.text);
        }
        assert!(chunk_text("   \n\n  ", 40).is_empty());
    }

    #[tokio::test]
    async fn test_embed_source_marks_ready_or_failed() {
        let pool = pool().await;
        let provider = ScriptedProvider::new().with_keywords(&["supplier", "audit"]);

        let id = ready_source(&pool, &provider, "Handbook", "Suppliers are audited.\n\nAudits happen yearly.").await;
        let source = Source::find_by_id(&pool, id).await.unwrap().unwrap();
        assert_eq!(source.status, SourceStatus::Ready);
        assert_eq!(source.chunk_count as usize, source.parsed_chunks().unwrap().len());

        let empty = Source::create(
            &pool,
            Uuid::new_v4(),
            &CreateSource {
                title: "Blank".to_string(),
                kind: None,
                content: "   ".to_string(),
                uploaded_by: None,
            },
        )
        .await
        .unwrap();
        let err = embed_source(&provider, &pool, empty.id, 40).await.unwrap_err();
        assert!(matches!(err, EmbeddingError::EmptySource));
        let failed = Source::find_by_id(&pool, empty.id).await.unwrap().unwrap();
        assert_eq!(failed.status, SourceStatus::Failed);
        assert!(failed.error_message.is_some());
    }

    #[tokio::test]
    async fn test_store_failure_marks_source_failed() {
        let pool = pool().await;
        let provider = ScriptedProvider::new().with_keywords(&["supplier"]);
        let source = Source::create(
            &pool,
            Uuid::new_v4(),
            &CreateSource {
                title: "Handbook".to_string(),
                kind: None,
                content: "Suppliers are audited.".to_string(),
                uploaded_by: None,
            },
        )
        .await
        .unwrap();
        sqlx::query(
            "CREATE TRIGGER sources_full BEFORE UPDATE OF chunks ON sources
             BEGIN SELECT RAISE(ABORT, 'disk full'); END",
        )
        .execute(&pool)
        .await
        .unwrap();

        let err = embed_source(&provider, &pool, source.id, 40).await.unwrap_err();
        assert!(matches!(err, EmbeddingError::Database(_)));
        let failed = Source::find_by_id(&pool, source.id).await.unwrap().unwrap();
        assert_eq!(failed.status, SourceStatus::Failed);
        assert!(failed.error_message.unwrap().contains("disk full"));
    }

    #[tokio::test]
    async fn test_retrieve_ranks_and_filters() {
        let pool = pool().await;
        let provider = ScriptedProvider::new().with_keywords(&["supplier", "audit", "weather"]);

        let handbook = ready_source(&pool, &provider, "Handbook", "Supplier audit checklist.\n\nWeather report for May.").await;
        let memo = ready_source(&pool, &provider, "Memo", "Every supplier signs the code.").await;
        Source::create(
            &pool,
            Uuid::new_v4(),
            &CreateSource {
                title: "Pending".to_string(),
                kind: None,
                content: "Supplier supplier supplier".to_string(),
                uploaded_by: None,
            },
        )
        .await
        .unwrap();

        let hits = retrieve(&provider, &pool, "supplier audit", None, 10, 0.1).await.unwrap();
        assert!(!hits.is_empty());
        assert!(hits.iter().all(|h| h.source_id == handbook || h.source_id == memo));
        assert!(hits.windows(2).all(|w| w[0].score >= w[1].score));
        assert!(hits[0].text.contains("audit"));
        assert!(hits.iter().all(|h| !h.text.contains("Weather")));

        let scoped = retrieve(&provider, &pool, "supplier", Some(&[memo]), 10, 0.0).await.unwrap();
        assert!(scoped.iter().all(|h| h.source_id == memo));

        let top_one = retrieve(&provider, &pool, "supplier", None, 1, 0.0).await.unwrap();
        assert_eq!(top_one.len(), 1);

        assert!(retrieve(&provider, &pool, "supplier", Some(&[]), 10, 0.0).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_retrieve_keeps_source_then_chunk_order_on_ties() {
        let pool = pool().await;
        let provider = ScriptedProvider::new().with_keywords(&["supplier"]);
        let text = "Supplier one is audited yearly.\n\nSupplier two is audited monthly.";

        let second = ready_source(&pool, &provider, "Second", text).await;
        let first = ready_source(&pool, &provider, "First", text).await;
        for (id, created_at) in [(first, "2025-01-01 00:00:00.000"), (second, "2025-01-02 00:00:00.000")] {
            sqlx::query("UPDATE sources SET created_at = $1 WHERE id = $2")
                .bind(created_at)
                .bind(id)
                .execute(&pool)
                .await
                .unwrap();
        }

        let hits = retrieve(&provider, &pool, "supplier", None, 10, 0.0).await.unwrap();
        let order: Vec<(Uuid, usize)> = hits.iter().map(|h| (h.source_id, h.chunk_index)).collect();
        assert_eq!(order, vec![(first, 0), (first, 1), (second, 0), (second, 1)]);
        assert!(hits.windows(2).all(|w| w[0].score == w[1].score));
    }
}
