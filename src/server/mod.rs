//! HTTP surface of the retrieval gateway.

pub mod error;
pub mod handlers;
pub mod x402;

use axum::http::Method;
use axum::routing::{get, post};
use axum::Router;
use std::sync::Arc;
use tower_http::cors;
use tower_http::trace::TraceLayer;

use crate::context::RuntimeContext;

pub type AppState = Arc<RuntimeContext>;

/// Builds the gateway router: health, indexing, and the two payment-gated
/// retrieval endpoints.
pub fn routes(state: AppState) -> Router {
    Router::new()
        .route("/health", get(handlers::get_health))
        .route("/docs/index", post(handlers::post_index_docs))
        .route("/docs/index/web", post(handlers::post_index_web_pages))
        .route("/docs/search", post(handlers::post_search))
        .route("/docs/chunks", post(handlers::post_chunk_range))
        .layer(TraceLayer::new_for_http())
        .layer(
            cors::CorsLayer::new()
                .allow_origin(cors::Any)
                .allow_methods([Method::GET, Method::POST])
                .allow_headers(cors::Any),
        )
        .with_state(state)
}
