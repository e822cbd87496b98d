//! Endpoint handlers.
//!
//! Retrieval requests run the full lifecycle here: authenticate the caller's
//! wallet, retrieve chunks, diff them against the purchase ledger, and when
//! anything is owed: challenge, verify, settle, record. The diff is always
//! computed against the chunks actually retrieved, not the request
//! parameters.

use axum::extract::{OriginalUri, State};
use axum::http::{HeaderMap, HeaderValue, Uri};
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;
use tracing::instrument;
use uuid::Uuid;

use crate::auth::verify_authorization_header;
use crate::index::RetrievedChunk;
use crate::ledger::{split_by_paid, PurchaseLedger as _};
use crate::services::index::IndexServiceError;
use crate::services::schemas::{
    FetchChunksByRangeRequest, FetchChunksByRangeResult, IndexDocsRequest, IndexResult,
    IndexWebPagesRequest, SearchRequest, SearchResult,
};
use crate::types::{SettleResponse, SolanaAddress, TokenAmount};

use super::error::ApiError;
use super::AppState;

/// `GET /health`: liveness probe.
pub async fn get_health() -> impl IntoResponse {
    Json(json!({ "status": "healthy" }))
}

/// Authenticates the caller from the `Authorization` header, binding the
/// signature to this request's absolute URL.
fn authenticate(
    state: &AppState,
    headers: &HeaderMap,
    uri: &Uri,
) -> Result<SolanaAddress, ApiError> {
    let header = headers
        .get(axum::http::header::AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .ok_or(ApiError::MissingAuthorization)?;
    let request_url = state.config.request_url(uri.path(), uri.query());
    let wallet =
        verify_authorization_header(header, request_url.as_str(), state.config.auth_window())?;
    Ok(wallet)
}

/// `POST /docs/index`: index documents from file paths.
#[instrument(skip_all)]
pub async fn post_index_docs(
    State(state): State<AppState>,
    OriginalUri(uri): OriginalUri,
    headers: HeaderMap,
    Json(params): Json<IndexDocsRequest>,
) -> Result<Json<IndexResult>, ApiError> {
    let wallet = authenticate(&state, &headers, &uri)?;
    tracing::debug!(%wallet, count = params.documents.len(), "indexing documents");
    let result = state
        .index_service
        .index_documents(params.documents)
        .await
        .map_err(price_as_bad_request)?;
    Ok(Json(result))
}

/// `POST /docs/index/web`: index web pages from URLs.
#[instrument(skip_all)]
pub async fn post_index_web_pages(
    State(state): State<AppState>,
    OriginalUri(uri): OriginalUri,
    headers: HeaderMap,
    Json(params): Json<IndexWebPagesRequest>,
) -> Result<Json<IndexResult>, ApiError> {
    let wallet = authenticate(&state, &headers, &uri)?;
    tracing::debug!(%wallet, count = params.pages.len(), "indexing web pages");
    let result = state
        .index_service
        .index_web_pages(params.pages)
        .await
        .map_err(price_as_bad_request)?;
    Ok(Json(result))
}

/// `POST /docs/search`: similarity search, gated by payment for the chunks it
/// actually returns.
#[instrument(skip_all)]
pub async fn post_search(
    State(state): State<AppState>,
    OriginalUri(uri): OriginalUri,
    headers: HeaderMap,
    Json(params): Json<SearchRequest>,
) -> Result<Response, ApiError> {
    let wallet = authenticate(&state, &headers, &uri)?;
    if params.k == 0 {
        return Err(ApiError::BadRequest("k must be >= 1".to_string()));
    }

    let chunks = state
        .retrieval_service
        .search(&params.query, params.k, params.filters.as_ref())
        .await?;
    tracing::debug!(%wallet, total = chunks.len(), "search retrieved chunks");

    let preview: String = params.query.chars().take(50).collect();
    let description = format!("Searching documents for query: {preview}...");
    let settlement = charge_for_chunks(&state, &headers, &uri, &wallet, &chunks, description).await?;

    Ok(with_payment_response(
        Json(SearchResult::from_chunks(chunks)),
        settlement,
    ))
}

/// `POST /docs/chunks`: fetch a contiguous chunk range of one document, gated
/// by payment for the chunks it actually returns.
#[instrument(skip_all)]
pub async fn post_chunk_range(
    State(state): State<AppState>,
    OriginalUri(uri): OriginalUri,
    headers: HeaderMap,
    Json(params): Json<FetchChunksByRangeRequest>,
) -> Result<Response, ApiError> {
    let wallet = authenticate(&state, &headers, &uri)?;
    if let Some(end) = params.end_chunk {
        if end < params.start_chunk {
            return Err(ApiError::BadRequest(
                "end_chunk must be >= start_chunk".to_string(),
            ));
        }
    }

    let chunks = state
        .retrieval_service
        .chunk_range(&params.doc_id, params.start_chunk, params.end_chunk)
        .await?;
    let end = params.end_chunk.unwrap_or(params.start_chunk);
    tracing::debug!(%wallet, doc_id = params.doc_id, total = chunks.len(), "fetched chunk range");

    let description = format!(
        "Fetching chunks for document {} from chunk {} to {}",
        params.doc_id, params.start_chunk, end
    );
    let settlement = charge_for_chunks(&state, &headers, &uri, &wallet, &chunks, description).await?;

    Ok(with_payment_response(
        Json(FetchChunksByRangeResult::from_chunks(params.doc_id, chunks)),
        settlement,
    ))
}

/// The payment phase of the retrieval lifecycle.
///
/// Diffs the retrieved chunks against the wallet's ledger; when something is
/// owed, runs challenge → verify → settle → record. Returns the settlement
/// record when a payment went through, `None` when nothing was owed. The
/// ledger write is strictly after the settle: settlement is the commit point,
/// and a record failure afterwards is a logged divergence surfaced as 500.
async fn charge_for_chunks(
    state: &AppState,
    headers: &HeaderMap,
    uri: &Uri,
    wallet: &SolanaAddress,
    chunks: &[RetrievedChunk],
    description: String,
) -> Result<Option<SettleResponse>, ApiError> {
    if !state.payments.enabled() || chunks.is_empty() {
        return Ok(None);
    }

    let wallet = wallet.to_string();
    let ids: Vec<Uuid> = chunks.iter().map(|chunk| chunk.id).collect();
    let paid = state.ledger.paid_subset(&wallet, &ids).await?;
    let (unpaid, _) = split_by_paid(chunks.to_vec(), &paid);

    let total_owed: u64 = unpaid.iter().map(|chunk| chunk.metadata.price).sum();
    if total_owed == 0 {
        tracing::debug!(%wallet, "all retrieved chunks already paid");
        return Ok(None);
    }

    let resource = state.config.request_url(uri.path(), uri.query());
    let context = state
        .payments
        .verify_payment(headers, TokenAmount(total_owed), resource, description)
        .await?;

    let settlement = state.payments.settle_payment(&context, headers).await?;

    let unpaid_ids: Vec<Uuid> = unpaid.iter().map(|chunk| chunk.id).collect();
    // The record write runs on a detached task: settlement already stands, so
    // the write must be attempted even if the client disconnects and this
    // request future is dropped.
    let record = {
        let ledger = state.ledger.clone();
        let wallet = wallet.clone();
        let ids = unpaid_ids.clone();
        tokio::spawn(async move { ledger.record(&wallet, &ids).await })
    };
    let recorded = match record.await {
        Ok(result) => result.map_err(|e| e.to_string()),
        Err(join_error) => Err(join_error.to_string()),
    };
    if let Err(error) = recorded {
        // The payment has settled on-chain but the ownership record did not
        // land. Never re-settle here; flag for operator reconciliation.
        tracing::error!(
            %wallet,
            chunk_ids = ?unpaid_ids,
            error = %error,
            "settlement succeeded but purchase record failed"
        );
        return Err(ApiError::Internal(
            "payment settled but purchase record failed".to_string(),
        ));
    }

    Ok(Some(settlement))
}

/// Wraps a JSON body, attaching `X-PAYMENT-RESPONSE` when a settlement
/// happened.
fn with_payment_response<T: IntoResponse>(
    body: T,
    settlement: Option<SettleResponse>,
) -> Response {
    let mut response = body.into_response();
    if let Some(settlement) = settlement {
        match settlement
            .to_base64()
            .map_err(|e| e.to_string())
            .and_then(|b64| {
                HeaderValue::from_bytes(b64.as_ref()).map_err(|e| e.to_string())
            }) {
            Ok(header_value) => {
                response
                    .headers_mut()
                    .insert("X-PAYMENT-RESPONSE", header_value);
            }
            Err(error) => {
                tracing::error!(error = %error, "failed to encode X-PAYMENT-RESPONSE header");
            }
        }
    }
    response
}

/// Pricing rejections are caller mistakes (negative or non-finite price),
/// not server faults.
fn price_as_bad_request(error: IndexServiceError) -> ApiError {
    match error {
        IndexServiceError::Price(price_error) => ApiError::BadRequest(price_error.to_string()),
        other => ApiError::IndexService(other),
    }
}
