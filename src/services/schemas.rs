//! Request and response schemas for the document endpoints.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use uuid::Uuid;

use crate::index::{DocType, RetrievedChunk};

/// A document to index, addressed by file path.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DocumentToIndex {
    pub path: String,
    pub price_usd: f64,
}

/// A web page to index, addressed by URL.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WebPageToIndex {
    pub url: String,
    pub price_usd: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IndexDocsRequest {
    pub documents: Vec<DocumentToIndex>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IndexWebPagesRequest {
    pub pages: Vec<WebPageToIndex>,
}

fn default_k() -> usize {
    5
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchRequest {
    pub query: String,
    #[serde(default = "default_k")]
    pub k: usize,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub filters: Option<HashMap<String, String>>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FetchChunksByRangeRequest {
    pub doc_id: String,
    /// Starting chunk index (inclusive).
    pub start_chunk: u32,
    /// Ending chunk index (inclusive). Defaults to `start_chunk`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub end_chunk: Option<u32>,
}

/// Client-visible chunk metadata. The `chunk_id` here is the stable UUID that
/// keys the purchase ledger and range fetches.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChunkMetadataView {
    pub source: String,
    pub doc_type: DocType,
    pub doc_id: String,
    pub chunk_id: Uuid,
    pub price: u64,
}

/// A single retrieved chunk as returned to clients.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DocumentChunk {
    pub text: String,
    pub metadata: ChunkMetadataView,
}

impl From<RetrievedChunk> for DocumentChunk {
    fn from(chunk: RetrievedChunk) -> Self {
        Self {
            text: chunk.text,
            metadata: ChunkMetadataView {
                source: chunk.metadata.source,
                doc_type: chunk.metadata.doc_type,
                doc_id: chunk.metadata.doc_id,
                chunk_id: chunk.id,
                price: chunk.metadata.price,
            },
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchResult {
    pub chunks: Vec<DocumentChunk>,
    pub total: usize,
}

impl SearchResult {
    pub fn from_chunks(chunks: Vec<RetrievedChunk>) -> Self {
        let chunks: Vec<DocumentChunk> = chunks.into_iter().map(Into::into).collect();
        let total = chunks.len();
        Self { chunks, total }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FetchChunksByRangeResult {
    pub chunks: Vec<DocumentChunk>,
    pub doc_id: String,
    pub total: usize,
}

impl FetchChunksByRangeResult {
    pub fn from_chunks(doc_id: impl Into<String>, chunks: Vec<RetrievedChunk>) -> Self {
        let chunks: Vec<DocumentChunk> = chunks.into_iter().map(Into::into).collect();
        let total = chunks.len();
        Self {
            chunks,
            doc_id: doc_id.into(),
            total,
        }
    }
}

/// Outcome of indexing a single source.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IndexedDocument {
    pub doc_id: String,
    pub source: String,
    pub chunks_count: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IndexResult {
    pub indexed_documents: Vec<IndexedDocument>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::index::ChunkMetadata;

    #[test]
    fn search_request_defaults() {
        let request: SearchRequest = serde_json::from_str(r#"{"query": "rust"}"#).unwrap();
        assert_eq!(request.k, 5);
        assert!(request.filters.is_none());
    }

    #[test]
    fn chunk_view_exposes_stable_id() {
        let id = Uuid::new_v4();
        let retrieved = RetrievedChunk {
            id,
            text: "body".to_string(),
            metadata: ChunkMetadata {
                source: "https://example.com".to_string(),
                doc_type: DocType::Web,
                doc_id: "d".to_string(),
                chunk_index: 2,
                price: 42,
            },
        };
        let view: DocumentChunk = retrieved.into();
        assert_eq!(view.metadata.chunk_id, id);
        let json = serde_json::to_value(&view).unwrap();
        assert_eq!(json["metadata"]["price"], 42);
        assert_eq!(json["metadata"]["doc_type"], "web");
        assert!(json["metadata"].get("chunk_index").is_none());
    }

    #[test]
    fn range_request_end_defaults_to_none() {
        let request: FetchChunksByRangeRequest =
            serde_json::from_str(r#"{"doc_id": "d", "start_chunk": 3}"#).unwrap();
        assert_eq!(request.start_chunk, 3);
        assert!(request.end_chunk.is_none());
    }
}
