//! Process-wide runtime context.
//!
//! Everything the request handlers need (settings, the chunk store, the
//! purchase ledger, the payment handler) is constructed once at startup and
//! shared behind an `Arc`. There is no runtime service locator; construction
//! order below is the dependency order.

use reqwest::Client;
use sqlx::postgres::{PgPool, PgPoolOptions};
use std::sync::Arc;

use crate::config::Config;
use crate::embedding::{build_embedder, EmbedError};
use crate::index::PgVectorIndex;
use crate::ledger::{PgPurchaseLedger, PurchaseLedger};
use crate::loader::{CommandPdfParser, WebLoader};
use crate::server::x402::{PaymentHandler, PaymentHandlerInitError};
use crate::services::{IndexService, RetrievalService};
use crate::splitter::TextSplitter;

#[derive(Debug, thiserror::Error)]
pub enum ContextError {
    #[error("database initialization failed")]
    Database(#[from] sqlx::Error),
    #[error(transparent)]
    Embedding(#[from] EmbedError),
    #[error(transparent)]
    Payments(#[from] PaymentHandlerInitError),
}

pub struct RuntimeContext {
    pub config: Config,
    pub ledger: Arc<dyn PurchaseLedger>,
    pub index_service: IndexService,
    pub retrieval_service: RetrievalService,
    pub payments: PaymentHandler,
}

impl RuntimeContext {
    pub async fn create(config: Config) -> Result<Arc<Self>, ContextError> {
        let pool: PgPool = PgPoolOptions::new()
            .max_connections(16)
            .connect(&config.database_url)
            .await?;

        let http_client = Client::new();
        let embedder = build_embedder(
            config.embedding_provider,
            config.embedding_model(),
            config.embedding_api_key(),
            http_client.clone(),
        )?;

        PgVectorIndex::ensure_schema(&pool, embedder.dimension()).await?;
        PgPurchaseLedger::ensure_schema(&pool).await?;

        let vector_index = Arc::new(PgVectorIndex::new(pool.clone(), embedder.clone()));
        let ledger = Arc::new(PgPurchaseLedger::new(pool));

        let splitter = TextSplitter::new(config.chunk_size, config.chunk_overlap);
        let pdf_parser = Arc::new(CommandPdfParser::new(config.pdf_command.clone()));
        let web_loader = Arc::new(WebLoader::new(http_client, config.min_text_len));

        let index_service = IndexService::new(
            vector_index.clone(),
            pdf_parser,
            web_loader,
            splitter,
            config.x402.asset_decimals,
        );
        let retrieval_service =
            RetrievalService::new(vector_index, config.max_retrieved_chunks);
        let payments = PaymentHandler::new(config.x402.clone())?;

        tracing::info!(
            provider = ?config.embedding_provider,
            model = config.embedding_model(),
            dimension = embedder.dimension(),
            x402_enabled = config.x402.enabled,
            network = %config.x402.network,
            "runtime context initialized"
        );

        Ok(Arc::new(Self {
            config,
            ledger,
            index_service,
            retrieval_service,
            payments,
        }))
    }
}
