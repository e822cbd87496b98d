//! Indexing pipeline: load content, split, price, and upsert into the
//! vector store.

use futures_util::future::try_join_all;
use std::sync::Arc;

use crate::identity::{chunk_id, doc_id};
use crate::index::{ChunkMetadata, ChunkToIndex, DocType, IndexError, VectorIndex};
use crate::loader::{LoaderError, PdfParser, WebLoader};
use crate::pricing::{allocate, usd_to_base_units, PriceError};
use crate::splitter::TextSplitter;

use super::schemas::{DocumentToIndex, IndexResult, IndexedDocument, WebPageToIndex};

#[derive(Debug, thiserror::Error)]
pub enum IndexServiceError {
    #[error(transparent)]
    Loader(#[from] LoaderError),
    #[error(transparent)]
    Index(#[from] IndexError),
    #[error(transparent)]
    Price(#[from] PriceError),
}

pub struct IndexService {
    vector_index: Arc<dyn VectorIndex>,
    pdf_parser: Arc<dyn PdfParser>,
    web_loader: Arc<WebLoader>,
    splitter: TextSplitter,
    asset_decimals: u32,
}

impl IndexService {
    pub fn new(
        vector_index: Arc<dyn VectorIndex>,
        pdf_parser: Arc<dyn PdfParser>,
        web_loader: Arc<WebLoader>,
        splitter: TextSplitter,
        asset_decimals: u32,
    ) -> Self {
        Self {
            vector_index,
            pdf_parser,
            web_loader,
            splitter,
            asset_decimals,
        }
    }

    /// Indexes documents from file paths. Contents load concurrently; empty
    /// documents are skipped with a warning.
    pub async fn index_documents(
        &self,
        documents: Vec<DocumentToIndex>,
    ) -> Result<IndexResult, IndexServiceError> {
        let contents = try_join_all(
            documents
                .iter()
                .map(|doc| self.pdf_parser.to_markdown(&doc.path)),
        )
        .await?;

        let mut indexed_documents = Vec::with_capacity(documents.len());
        for (doc, content) in documents.iter().zip(contents) {
            if let Some(indexed) = self
                .index_one(&doc.path, &content, doc.price_usd, DocType::Pdf)
                .await?
            {
                tracing::debug!(
                    source = doc.path,
                    chunks = indexed.chunks_count,
                    price_usd = doc.price_usd,
                    "indexed document"
                );
                indexed_documents.push(indexed);
            }
        }
        Ok(IndexResult { indexed_documents })
    }

    /// Indexes web pages from URLs. Pages load concurrently; pages with no
    /// extractable text are skipped with a warning.
    pub async fn index_web_pages(
        &self,
        pages: Vec<WebPageToIndex>,
    ) -> Result<IndexResult, IndexServiceError> {
        let contents =
            try_join_all(pages.iter().map(|page| self.web_loader.load(&page.url))).await?;

        let mut indexed_documents = Vec::with_capacity(pages.len());
        for (page, content) in pages.iter().zip(contents) {
            if let Some(indexed) = self
                .index_one(&page.url, &content, page.price_usd, DocType::Web)
                .await?
            {
                tracing::debug!(
                    source = page.url,
                    chunks = indexed.chunks_count,
                    price_usd = page.price_usd,
                    "indexed web page"
                );
                indexed_documents.push(indexed);
            }
        }
        Ok(IndexResult { indexed_documents })
    }

    async fn index_one(
        &self,
        source: &str,
        content: &str,
        price_usd: f64,
        doc_type: DocType,
    ) -> Result<Option<IndexedDocument>, IndexServiceError> {
        let document_id = doc_id(source);
        let texts = self.splitter.split_text(content);
        if texts.is_empty() {
            tracing::warn!(source, "no chunks found for document");
            return Ok(None);
        }

        let total_base = usd_to_base_units(price_usd, self.asset_decimals)?;
        let chunk_chars: Vec<usize> = texts.iter().map(|t| t.chars().count()).collect();
        let prices = allocate(total_base, &chunk_chars);

        let chunks: Vec<ChunkToIndex> = texts
            .into_iter()
            .zip(prices)
            .enumerate()
            .map(|(i, (text, price))| ChunkToIndex {
                id: chunk_id(&document_id, i as u32),
                text,
                metadata: ChunkMetadata {
                    source: source.to_string(),
                    doc_type,
                    doc_id: document_id.clone(),
                    chunk_index: i as u32,
                    price,
                },
            })
            .collect();
        let chunks_count = chunks.len();

        self.vector_index.add(chunks).await?;

        Ok(Some(IndexedDocument {
            doc_id: document_id,
            source: source.to_string(),
            chunks_count,
        }))
    }
}
