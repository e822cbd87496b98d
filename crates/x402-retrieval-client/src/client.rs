//! Typed client for the retrieval gateway.

use reqwest::Client;
use reqwest_middleware as rqm;
use serde::de::DeserializeOwned;
use serde::Serialize;
use solana_keypair::Keypair;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use url::Url;

use x402_retrieval::services::schemas::{
    DocumentToIndex, FetchChunksByRangeRequest, FetchChunksByRangeResult, IndexDocsRequest,
    IndexResult, IndexWebPagesRequest, SearchRequest, SearchResult, WebPageToIndex,
};

use crate::auth::SolanaAuthorization;
use crate::payments::{PaymentReceipt, X402Payments};
use crate::wallet::{SenderWallet, SolanaPayerWallet};

const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    #[error("invalid base URL: {0}")]
    InvalidBaseUrl(#[from] url::ParseError),
    #[error("failed to build HTTP client: {0}")]
    Build(#[source] reqwest::Error),
    #[error("server returned {status}: {detail}")]
    Http { status: u16, detail: String },
    #[error("transport error: {0}")]
    Transport(#[from] rqm::Error),
    #[error("failed to decode response: {0}")]
    Decode(#[source] reqwest::Error),
}

/// Client for the retrieval gateway.
///
/// Every request is wallet-signed; 402 challenges are paid automatically and
/// retried once. See the crate docs for an end-to-end example.
pub struct RetrievalClient {
    base_url: Url,
    http: rqm::ClientWithMiddleware,
    payments: X402Payments,
}

impl RetrievalClient {
    /// Builds a client around the given wallet keypair, with default RPC
    /// endpoints per network.
    pub fn new(base_url: &str, keypair: Keypair) -> Result<Self, ClientError> {
        let keypair = Arc::new(keypair);
        let wallet = Arc::new(SolanaPayerWallet::new(keypair.clone()));
        Self::with_sender_wallet(base_url, keypair, wallet)
    }

    /// Builds a client with custom RPC endpoints for payment construction.
    pub fn with_rpc_endpoints(
        base_url: &str,
        keypair: Keypair,
        rpc_by_network: HashMap<x402_retrieval::types::SolanaNetwork, String>,
    ) -> Result<Self, ClientError> {
        let keypair = Arc::new(keypair);
        let mut wallet = SolanaPayerWallet::new(keypair.clone());
        for (network, url) in rpc_by_network {
            wallet = wallet.with_rpc(network, url);
        }
        Self::with_sender_wallet(base_url, keypair, Arc::new(wallet))
    }

    /// Builds a client around an arbitrary [`SenderWallet`]. The keypair
    /// still signs the per-request `Authorization` header.
    pub fn with_sender_wallet(
        base_url: &str,
        keypair: Arc<Keypair>,
        wallet: Arc<dyn SenderWallet>,
    ) -> Result<Self, ClientError> {
        let mut normalized = base_url.trim_end_matches('/').to_string();
        normalized.push('/');
        let base_url = Url::parse(&normalized)?;

        let inner = Client::builder()
            .timeout(DEFAULT_TIMEOUT)
            .build()
            .map_err(ClientError::Build)?;
        let payments = X402Payments::with_wallet(wallet);
        // Authorization runs after payments so the paid retry is re-signed
        // with a fresh issuedAt for its own URL.
        let http = rqm::ClientBuilder::new(inner)
            .with(payments.clone())
            .with(SolanaAuthorization::new(keypair))
            .build();

        Ok(Self {
            base_url,
            http,
            payments,
        })
    }

    /// What the most recent paid request paid, and to whom.
    pub fn last_payment(&self) -> Option<PaymentReceipt> {
        self.payments.last_receipt()
    }

    /// Index documents from file paths visible to the server.
    pub async fn index_docs(
        &self,
        documents: Vec<DocumentToIndex>,
    ) -> Result<IndexResult, ClientError> {
        self.post_json("docs/index", &IndexDocsRequest { documents })
            .await
    }

    /// Index web pages from URLs.
    pub async fn index_web_pages(
        &self,
        pages: Vec<WebPageToIndex>,
    ) -> Result<IndexResult, ClientError> {
        self.post_json("docs/index/web", &IndexWebPagesRequest { pages })
            .await
    }

    /// Similarity search; pays for newly retrieved chunks when challenged.
    pub async fn search(
        &self,
        query: &str,
        k: usize,
        filters: Option<HashMap<String, String>>,
    ) -> Result<SearchResult, ClientError> {
        self.post_json(
            "docs/search",
            &SearchRequest {
                query: query.to_string(),
                k,
                filters,
            },
        )
        .await
    }

    /// Fetch an inclusive chunk range of a document; pays when challenged.
    pub async fn get_chunk_range(
        &self,
        doc_id: &str,
        start_chunk: u32,
        end_chunk: Option<u32>,
    ) -> Result<FetchChunksByRangeResult, ClientError> {
        self.post_json(
            "docs/chunks",
            &FetchChunksByRangeRequest {
                doc_id: doc_id.to_string(),
                start_chunk,
                end_chunk,
            },
        )
        .await
    }

    async fn post_json<T, R>(&self, path: &str, body: &T) -> Result<R, ClientError>
    where
        T: Serialize + ?Sized,
        R: DeserializeOwned,
    {
        let url = self.base_url.join(path)?;
        let response = self.http.post(url).json(body).send().await?;

        let status = response.status();
        if !status.is_success() {
            let detail = extract_detail(response).await;
            return Err(ClientError::Http {
                status: status.as_u16(),
                detail,
            });
        }
        response.json::<R>().await.map_err(ClientError::Decode)
    }
}

/// Pulls a human-readable reason out of an error body: `{detail}` for
/// auth/server errors, `{error}` for x402 bodies, raw text otherwise.
async fn extract_detail(response: reqwest::Response) -> String {
    let text = response.text().await.unwrap_or_default();
    if let Ok(value) = serde_json::from_str::<serde_json::Value>(&text) {
        if let Some(detail) = value.get("detail").and_then(|v| v.as_str()) {
            return detail.to_string();
        }
        if let Some(error) = value.get("error").and_then(|v| v.as_str()) {
            return error.to_string();
        }
    }
    if text.is_empty() {
        "Unknown error".to_string()
    } else {
        text
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use serde_json::json;
    use wiremock::matchers::{body_partial_json, header_exists, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};
    use x402_retrieval::auth::{verify_authorization_header, AuthWindow};
    use x402_retrieval::types::{
        ExactSolanaPayload, PaymentPayload, PaymentRequirements, Scheme, X402Version,
    };
    use crate::wallet::X402PaymentsError;

    struct StubWallet;

    #[async_trait]
    impl SenderWallet for StubWallet {
        fn can_handle(&self, _requirements: &PaymentRequirements) -> bool {
            true
        }

        async fn payment_payload(
            &self,
            selected: PaymentRequirements,
        ) -> Result<PaymentPayload, X402PaymentsError> {
            Ok(PaymentPayload {
                x402_version: X402Version::V1,
                scheme: Scheme::Exact,
                network: selected.network,
                payload: ExactSolanaPayload {
                    transaction: "c3R1Yg==".to_string(),
                },
            })
        }
    }

    fn client(base_url: &str) -> RetrievalClient {
        let keypair = Arc::new(Keypair::new());
        RetrievalClient::with_sender_wallet(base_url, keypair, Arc::new(StubWallet)).unwrap()
    }

    fn search_body() -> serde_json::Value {
        json!({
            "chunks": [{
                "text": "chunk text",
                "metadata": {
                    "source": "/tmp/doc.pdf",
                    "doc_type": "pdf",
                    "doc_id": "abc",
                    "chunk_id": "9c9ab3e9-02b1-8b52-a2a5-b8f58c7eac73",
                    "price": 3000
                }
            }],
            "total": 1
        })
    }

    fn challenge_body() -> serde_json::Value {
        json!({
            "x402Version": 1,
            "accepts": [{
                "scheme": "exact",
                "network": "solana-devnet",
                "maxAmountRequired": "3000",
                "resource": "http://localhost:8000/docs/search",
                "description": "",
                "mimeType": "application/json",
                "payTo": "4zMMC9srt5Ri5X14GAgXhaHii3GnPAEERYPJgZJDncDU",
                "maxTimeoutSeconds": 60,
                "asset": "EPjFWdd5AufqSSqeM2qN1xzybapC8G4wEGGkZwyTDt1v",
                "extra": { "feePayer": "2wKupLR9q6wXYppw8Gr2NvWxKBUqm4PPJKkQfoxHDBg4" }
            }],
            "error": "No X-PAYMENT header provided"
        })
    }

    #[tokio::test]
    async fn search_parses_results_without_payment() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/docs/search"))
            .and(body_partial_json(json!({ "query": "rust", "k": 5 })))
            .respond_with(ResponseTemplate::new(200).set_body_json(search_body()))
            .mount(&server)
            .await;

        let client = client(&server.uri());
        let result = client.search("rust", 5, None).await.unwrap();
        assert_eq!(result.total, 1);
        assert_eq!(result.chunks[0].metadata.price, 3000);
        assert!(client.last_payment().is_none());
    }

    #[tokio::test]
    async fn search_pays_challenge_and_reports_receipt() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/docs/search"))
            .and(header_exists("X-PAYMENT"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(search_body())
                    .insert_header("X-PAYMENT-RESPONSE", "c2V0dGxlZA=="),
            )
            .with_priority(1)
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/docs/search"))
            .respond_with(ResponseTemplate::new(402).set_body_json(challenge_body()))
            .mount(&server)
            .await;

        let client = client(&server.uri());
        let result = client.search("rust", 5, None).await.unwrap();
        assert_eq!(result.total, 1);

        let receipt = client.last_payment().unwrap();
        assert_eq!(receipt.paid_amount, 3000);
        assert_eq!(receipt.pay_to, "4zMMC9srt5Ri5X14GAgXhaHii3GnPAEERYPJgZJDncDU");

        // Both the original and the retry carry fresh wallet signatures.
        let requests = server.received_requests().await.unwrap();
        assert_eq!(requests.len(), 2);
        let url = format!("{}/docs/search", server.uri());
        for request in &requests {
            let header = request.headers.get("authorization").unwrap().to_str().unwrap();
            verify_authorization_header(header, &url, AuthWindow::default()).unwrap();
        }
        assert!(requests[1].headers.contains_key("x-payment"));
    }

    #[tokio::test]
    async fn auth_failure_surfaces_detail() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/docs/chunks"))
            .respond_with(ResponseTemplate::new(401).set_body_json(json!({
                "detail": "Authentication failed: message expired"
            })))
            .mount(&server)
            .await;

        let client = client(&server.uri());
        let err = client.get_chunk_range("doc", 0, Some(2)).await.unwrap_err();
        match err {
            ClientError::Http { status, detail } => {
                assert_eq!(status, 401);
                assert_eq!(detail, "Authentication failed: message expired");
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[tokio::test]
    async fn index_docs_round_trip() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/docs/index"))
            .and(body_partial_json(json!({
                "documents": [{ "path": "/data/paper.pdf", "price_usd": 0.01 }]
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "indexed_documents": [{
                    "doc_id": "abc",
                    "source": "/data/paper.pdf",
                    "chunks_count": 7
                }]
            })))
            .mount(&server)
            .await;

        let client = client(&server.uri());
        let result = client
            .index_docs(vec![DocumentToIndex {
                path: "/data/paper.pdf".to_string(),
                price_usd: 0.01,
            }])
            .await
            .unwrap();
        assert_eq!(result.indexed_documents.len(), 1);
        assert_eq!(result.indexed_documents[0].chunks_count, 7);
    }
}
