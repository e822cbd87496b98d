//! Retrieval: similarity search and chunk-range fetches.

use std::collections::HashMap;
use std::sync::Arc;
use uuid::Uuid;

use crate::identity::chunk_id;
use crate::index::{IndexError, RetrievedChunk, VectorIndex};

pub struct RetrievalService {
    vector_index: Arc<dyn VectorIndex>,
    max_retrieved_chunks: usize,
}

impl RetrievalService {
    pub fn new(vector_index: Arc<dyn VectorIndex>, max_retrieved_chunks: usize) -> Self {
        Self {
            vector_index,
            max_retrieved_chunks: max_retrieved_chunks.max(1),
        }
    }

    /// Similarity search. `k` is clamped to the server-wide maximum.
    pub async fn search(
        &self,
        query: &str,
        k: usize,
        filters: Option<&HashMap<String, String>>,
    ) -> Result<Vec<RetrievedChunk>, IndexError> {
        let k = k.min(self.max_retrieved_chunks);
        self.vector_index.search(query, k, filters).await
    }

    /// Fetches the inclusive chunk range `[start_chunk, end_chunk]` of a
    /// document. `end_chunk` defaults to `start_chunk`; the range is clamped
    /// to the server-wide maximum; ids with no stored chunk are omitted.
    pub async fn chunk_range(
        &self,
        doc_id: &str,
        start_chunk: u32,
        end_chunk: Option<u32>,
    ) -> Result<Vec<RetrievedChunk>, IndexError> {
        let mut end = end_chunk.unwrap_or(start_chunk);
        if end < start_chunk {
            return Ok(vec![]);
        }
        let requested = (end - start_chunk) as usize + 1;
        if requested > self.max_retrieved_chunks {
            end = start_chunk + (self.max_retrieved_chunks as u32) - 1;
        }

        let ids: Vec<Uuid> = (start_chunk..=end).map(|i| chunk_id(doc_id, i)).collect();
        self.vector_index.get_by_ids(&ids).await
    }
}
