//! Request-signing middleware.
//!
//! Attaches `Authorization: Solana <b64url(JSON)>` to every outgoing request,
//! freshly minted with the current UTC time so the server's freshness window
//! always sees a recent `issuedAt`. Because the header binds to the request
//! URL, the middleware signs per request rather than caching a token.

use chrono::Utc;
use http::Extensions;
use reqwest::{Request, Response};
use reqwest_middleware as rqm;
use solana_keypair::Keypair;
use std::sync::Arc;

use x402_retrieval::auth::build_authorization_header;

/// Middleware that signs every request with the held wallet keypair.
///
/// Add this *after* [`crate::payments::X402Payments`] in the middleware chain
/// so the payment retry is re-signed too.
#[derive(Clone)]
pub struct SolanaAuthorization {
    keypair: Arc<Keypair>,
}

impl SolanaAuthorization {
    pub fn new(keypair: Arc<Keypair>) -> Self {
        Self { keypair }
    }
}

#[async_trait::async_trait]
impl rqm::Middleware for SolanaAuthorization {
    async fn handle(
        &self,
        mut req: Request,
        extensions: &mut Extensions,
        next: rqm::Next<'_>,
    ) -> rqm::Result<Response> {
        let uri = req.url().to_string();
        let header = build_authorization_header(&self.keypair, &uri, Utc::now())
            .map_err(|e| rqm::Error::Middleware(e.into()))?;
        let header_value = http::HeaderValue::from_str(&header)
            .map_err(|e| rqm::Error::Middleware(e.into()))?;
        req.headers_mut()
            .insert(http::header::AUTHORIZATION, header_value);
        next.run(req, extensions).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use reqwest::Client;
    use solana_signer::Signer;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};
    use x402_retrieval::auth::{verify_authorization_header, AuthWindow};

    #[tokio::test]
    async fn every_request_carries_a_verifiable_signature() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/docs/ping"))
            .respond_with(ResponseTemplate::new(200))
            .mount(&server)
            .await;

        let keypair = Keypair::new();
        let expected_address = keypair.pubkey().to_string();
        let client = rqm::ClientBuilder::new(Client::new())
            .with(SolanaAuthorization::new(Arc::new(keypair)))
            .build();

        let url = format!("{}/docs/ping", server.uri());
        client.get(&url).send().await.unwrap();

        let requests = server.received_requests().await.unwrap();
        assert_eq!(requests.len(), 1);
        let header = requests[0]
            .headers
            .get("authorization")
            .expect("authorization header present")
            .to_str()
            .unwrap()
            .to_string();
        let address =
            verify_authorization_header(&header, &url, AuthWindow::default()).unwrap();
        assert_eq!(address.to_string(), expected_address);
    }
}
