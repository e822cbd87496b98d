//! Vector index adapter.
//!
//! The gateway stores priced chunks in Postgres with a pgvector embedding
//! column. The [`VectorIndex`] capability keeps the rest of the system
//! ignorant of the ANN implementation: upsert by chunk id, k-NN search with
//! metadata equality filters, and positional fetch by id.

use async_trait::async_trait;
use pgvector::Vector;
use serde::{Deserialize, Serialize};
use sqlx::postgres::PgPool;
use sqlx::Row;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use uuid::Uuid;

use crate::embedding::{EmbedError, Embedder};

/// Origin of an indexed document.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DocType {
    Pdf,
    Web,
}

impl fmt::Display for DocType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DocType::Pdf => write!(f, "pdf"),
            DocType::Web => write!(f, "web"),
        }
    }
}

/// Metadata stored alongside each chunk in the vector store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChunkMetadata {
    pub source: String,
    pub doc_type: DocType,
    pub doc_id: String,
    pub chunk_index: u32,
    /// Price in asset base units.
    pub price: u64,
}

/// A chunk ready for indexing. The adapter computes the embedding.
#[derive(Debug, Clone)]
pub struct ChunkToIndex {
    pub id: Uuid,
    pub text: String,
    pub metadata: ChunkMetadata,
}

/// A chunk returned from the index.
#[derive(Debug, Clone, PartialEq)]
pub struct RetrievedChunk {
    pub id: Uuid,
    pub text: String,
    pub metadata: ChunkMetadata,
}

#[derive(Debug, thiserror::Error)]
pub enum IndexError {
    #[error("vector store query failed")]
    Database(#[from] sqlx::Error),
    #[error(transparent)]
    Embedding(#[from] EmbedError),
    #[error("stored chunk metadata is malformed: {0}")]
    Metadata(#[from] serde_json::Error),
}

/// Capability surface of the vector store.
#[async_trait]
pub trait VectorIndex: Send + Sync {
    /// Upserts chunks by id, embedding their text.
    async fn add(&self, chunks: Vec<ChunkToIndex>) -> Result<(), IndexError>;

    /// k-NN search over the query text, with optional metadata equality
    /// filters. Returns at most `k` chunks, nearest first.
    async fn search(
        &self,
        query: &str,
        k: usize,
        filters: Option<&HashMap<String, String>>,
    ) -> Result<Vec<RetrievedChunk>, IndexError>;

    /// Positional fetch: results preserve the order of `ids`; missing ids are
    /// silently omitted.
    async fn get_by_ids(&self, ids: &[Uuid]) -> Result<Vec<RetrievedChunk>, IndexError>;
}

/// Postgres + pgvector implementation of [`VectorIndex`].
pub struct PgVectorIndex {
    pool: PgPool,
    embedder: Arc<dyn Embedder>,
}

impl PgVectorIndex {
    pub fn new(pool: PgPool, embedder: Arc<dyn Embedder>) -> Self {
        Self { pool, embedder }
    }

    /// Creates the extension and chunk table if they do not exist yet.
    /// The vector column width is pinned to the embedder's dimension.
    pub async fn ensure_schema(pool: &PgPool, dimension: usize) -> Result<(), sqlx::Error> {
        sqlx::query("CREATE EXTENSION IF NOT EXISTS vector")
            .execute(pool)
            .await?;
        let create_table = format!(
            "CREATE TABLE IF NOT EXISTS document_chunks (
                id UUID PRIMARY KEY,
                content TEXT NOT NULL,
                embedding vector({dimension}) NOT NULL,
                metadata JSONB NOT NULL
            )"
        );
        sqlx::query(&create_table).execute(pool).await?;
        Ok(())
    }

    fn row_to_chunk(row: &sqlx::postgres::PgRow) -> Result<RetrievedChunk, IndexError> {
        let id: Uuid = row.try_get("id")?;
        let text: String = row.try_get("content")?;
        let metadata: serde_json::Value = row.try_get("metadata")?;
        let metadata: ChunkMetadata = serde_json::from_value(metadata)?;
        Ok(RetrievedChunk { id, text, metadata })
    }
}

#[async_trait]
impl VectorIndex for PgVectorIndex {
    async fn add(&self, chunks: Vec<ChunkToIndex>) -> Result<(), IndexError> {
        if chunks.is_empty() {
            return Ok(());
        }
        let texts: Vec<String> = chunks.iter().map(|c| c.text.clone()).collect();
        let embeddings = self.embedder.embed_documents(&texts).await?;

        let mut tx = self.pool.begin().await?;
        for (chunk, embedding) in chunks.into_iter().zip(embeddings) {
            let metadata = serde_json::to_value(&chunk.metadata)?;
            sqlx::query(
                "INSERT INTO document_chunks (id, content, embedding, metadata)
                 VALUES ($1, $2, $3, $4)
                 ON CONFLICT (id) DO UPDATE SET
                     content = EXCLUDED.content,
                     embedding = EXCLUDED.embedding,
                     metadata = EXCLUDED.metadata",
            )
            .bind(chunk.id)
            .bind(chunk.text)
            .bind(Vector::from(embedding))
            .bind(metadata)
            .execute(&mut *tx)
            .await?;
        }
        tx.commit().await?;
        Ok(())
    }

    async fn search(
        &self,
        query: &str,
        k: usize,
        filters: Option<&HashMap<String, String>>,
    ) -> Result<Vec<RetrievedChunk>, IndexError> {
        if k == 0 {
            return Ok(vec![]);
        }
        let query_vector = Vector::from(self.embedder.embed_query(query).await?);

        // Equality filters compile to a JSONB containment check.
        let filter_object = filters
            .map(|map| {
                serde_json::Value::Object(
                    map.iter()
                        .map(|(key, value)| (key.clone(), serde_json::Value::from(value.clone())))
                        .collect(),
                )
            })
            .unwrap_or_else(|| serde_json::json!({}));

        let rows = sqlx::query(
            "SELECT id, content, metadata FROM document_chunks
             WHERE metadata @> $1
             ORDER BY embedding <=> $2
             LIMIT $3",
        )
        .bind(filter_object)
        .bind(query_vector)
        .bind(k as i64)
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(Self::row_to_chunk).collect()
    }

    async fn get_by_ids(&self, ids: &[Uuid]) -> Result<Vec<RetrievedChunk>, IndexError> {
        if ids.is_empty() {
            return Ok(vec![]);
        }
        let rows = sqlx::query(
            "SELECT id, content, metadata FROM document_chunks WHERE id = ANY($1)",
        )
        .bind(ids)
        .fetch_all(&self.pool)
        .await?;

        let mut by_id: HashMap<Uuid, RetrievedChunk> = rows
            .iter()
            .map(Self::row_to_chunk)
            .map(|chunk| chunk.map(|c| (c.id, c)))
            .collect::<Result<_, _>>()?;

        Ok(ids.iter().filter_map(|id| by_id.remove(id)).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn metadata_serde_shape() {
        let metadata = ChunkMetadata {
            source: "https://example.com/a".to_string(),
            doc_type: DocType::Web,
            doc_id: "abc123".to_string(),
            chunk_index: 4,
            price: 1500,
        };
        let json = serde_json::to_value(&metadata).unwrap();
        assert_eq!(json["doc_type"], "web");
        assert_eq!(json["chunk_index"], 4);
        assert_eq!(json["price"], 1500);
        let back: ChunkMetadata = serde_json::from_value(json).unwrap();
        assert_eq!(back, metadata);
    }

    #[test]
    fn doc_type_display() {
        assert_eq!(DocType::Pdf.to_string(), "pdf");
        assert_eq!(DocType::Web.to_string(), "web");
    }
}
