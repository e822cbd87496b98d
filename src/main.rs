//! Retrieval gateway HTTP entrypoint.
//!
//! Launches the axum server exposing document indexing and payment-gated
//! retrieval:
//!
//! - `GET /health` – liveness
//! - `POST /docs/index` – index PDF documents
//! - `POST /docs/index/web` – index web pages
//! - `POST /docs/search` – paid similarity search
//! - `POST /docs/chunks` – paid chunk-range retrieval
//!
//! Environment:
//! - `.env` values loaded at startup
//! - `SERVER_HOST`, `SERVER_PORT` control binding address
//! - `DATABASE_URL`, `EMBEDDING_PROVIDER`, `X402_*` configure the stack

use std::net::SocketAddr;

use tracing_subscriber::EnvFilter;

use x402_retrieval::config::Config;
use x402_retrieval::context::RuntimeContext;
use x402_retrieval::server;
use x402_retrieval::util::SigDown;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    dotenvy::dotenv().ok();

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("warn,x402_retrieval=info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let config = Config::load();
    let addr = SocketAddr::new(config.host, config.port);

    let context = RuntimeContext::create(config).await?;
    let router = server::routes(context);

    tracing::info!("Starting server at http://{}", addr);
    let listener = tokio::net::TcpListener::bind(addr).await?;

    let sig_down = SigDown::try_new()?;
    let cancellation_token = sig_down.cancellation_token();
    let graceful_shutdown = async move { cancellation_token.cancelled().await };
    axum::serve(listener, router)
        .with_graceful_shutdown(graceful_shutdown)
        .await?;

    Ok(())
}
