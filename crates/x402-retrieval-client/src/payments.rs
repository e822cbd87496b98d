//! Middleware for handling HTTP 402 Payment Required responses.
//!
//! On a 402, the middleware parses the x402 body, selects a requirement
//! (first acceptable entry in `accepts`), asks the wallet to build a
//! partially-signed payment, attaches it as `X-PAYMENT`, and retries the
//! request exactly once. A second 402 is surfaced to the caller untouched.

use http::{Extensions, HeaderValue, StatusCode};
use reqwest::{Request, Response};
use reqwest_middleware as rqm;
use std::sync::{Arc, Mutex};

use x402_retrieval::types::{PaymentRequiredResponse, PaymentRequirements};
use x402_retrieval::util::Base64Bytes;

use crate::wallet::{SenderWallet, X402PaymentsError};

/// What the last successful payment retry paid, and to whom. Extracted from
/// the selected requirement for caller-side reporting.
#[derive(Debug, Clone, PartialEq)]
pub struct PaymentReceipt {
    /// Amount paid, in asset base units.
    pub paid_amount: u64,
    /// Recipient wallet address.
    pub pay_to: String,
    /// Network the payment went through.
    pub network: String,
}

/// Middleware that pays x402 challenges with the configured wallet.
#[derive(Clone)]
pub struct X402Payments {
    wallet: Arc<dyn SenderWallet>,
    last_receipt: Arc<Mutex<Option<PaymentReceipt>>>,
}

impl X402Payments {
    pub fn with_wallet(wallet: Arc<dyn SenderWallet>) -> Self {
        Self {
            wallet,
            last_receipt: Arc::new(Mutex::new(None)),
        }
    }

    /// The receipt of the most recent paid retry, if any request on this
    /// client has paid.
    pub fn last_receipt(&self) -> Option<PaymentReceipt> {
        self.last_receipt.lock().expect("receipt lock").clone()
    }

    /// Selects the requirement to pay: the first entry the wallet can
    /// handle.
    fn select_requirement(
        &self,
        accepts: &[PaymentRequirements],
    ) -> Result<PaymentRequirements, X402PaymentsError> {
        accepts
            .iter()
            .find(|requirement| self.wallet.can_handle(requirement))
            .cloned()
            .ok_or(X402PaymentsError::NoSuitablePaymentMethod)
    }

    /// Builds the `X-PAYMENT` header for the selected requirement.
    pub async fn build_payment_header(
        &self,
        selected: PaymentRequirements,
    ) -> Result<HeaderValue, X402PaymentsError> {
        let payload = self.wallet.payment_payload(selected).await?;
        let json = serde_json::to_vec(&payload).map_err(X402PaymentsError::JsonEncodeError)?;
        let b64 = Base64Bytes::encode(json);
        HeaderValue::from_bytes(b64.as_ref()).map_err(X402PaymentsError::HeaderValueEncodeError)
    }
}

#[async_trait::async_trait]
impl rqm::Middleware for X402Payments {
    async fn handle(
        &self,
        req: Request,
        extensions: &mut Extensions,
        next: rqm::Next<'_>,
    ) -> rqm::Result<Response> {
        let retry_req = req.try_clone();

        let res = next.clone().run(req, extensions).await?;
        if res.status() != StatusCode::PAYMENT_REQUIRED {
            return Ok(res);
        }

        tracing::debug!("received 402 Payment Required, constructing payment");
        let payment_required = res
            .json::<PaymentRequiredResponse>()
            .await
            .map_err(rqm::Error::Reqwest)?;

        let selected = self
            .select_requirement(&payment_required.accepts)
            .map_err(into_middleware_error)?;
        let receipt = PaymentReceipt {
            paid_amount: selected.max_amount_required.inner(),
            pay_to: selected.pay_to.to_string(),
            network: selected.network.to_string(),
        };

        let payment_header = self
            .build_payment_header(selected)
            .await
            .map_err(into_middleware_error)?;

        let mut req = retry_req
            .ok_or(X402PaymentsError::RequestNotCloneable)
            .map_err(into_middleware_error)?;
        let headers = req.headers_mut();
        headers.insert("X-PAYMENT", payment_header);
        headers.insert(
            "Access-Control-Expose-Headers",
            HeaderValue::from_static("X-PAYMENT-RESPONSE"),
        );

        // One retry only; a second 402 goes back to the caller as-is.
        let response = next.run(req, extensions).await?;
        if response.status() != StatusCode::PAYMENT_REQUIRED {
            tracing::info!(
                paid_amount = receipt.paid_amount,
                pay_to = receipt.pay_to,
                network = receipt.network,
                "x402 payment accepted"
            );
            *self.last_receipt.lock().expect("receipt lock") = Some(receipt);
        }
        Ok(response)
    }
}

fn into_middleware_error(error: X402PaymentsError) -> rqm::Error {
    rqm::Error::Middleware(error.into())
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use reqwest::Client;
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use wiremock::matchers::{header_exists, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};
    use x402_retrieval::types::{ExactSolanaPayload, PaymentPayload, Scheme, X402Version};

    /// Wallet stub that signs nothing and counts invocations.
    struct StubWallet {
        calls: AtomicUsize,
    }

    impl StubWallet {
        fn new() -> Arc<Self> {
            Arc::new(Self {
                calls: AtomicUsize::new(0),
            })
        }
    }

    #[async_trait]
    impl SenderWallet for StubWallet {
        fn can_handle(&self, requirements: &PaymentRequirements) -> bool {
            requirements.scheme == Scheme::Exact
        }

        async fn payment_payload(
            &self,
            selected: PaymentRequirements,
        ) -> Result<PaymentPayload, X402PaymentsError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
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

    fn challenge_body() -> serde_json::Value {
        json!({
            "x402Version": 1,
            "accepts": [{
                "scheme": "exact",
                "network": "solana-devnet",
                "maxAmountRequired": "6000",
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

    fn paid_client(wallet: Arc<StubWallet>) -> (rqm::ClientWithMiddleware, X402Payments) {
        let payments = X402Payments::with_wallet(wallet);
        let client = rqm::ClientBuilder::new(Client::new())
            .with(payments.clone())
            .build();
        (client, payments)
    }

    #[tokio::test]
    async fn pays_once_and_retries() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/docs/search"))
            .and(header_exists("X-PAYMENT"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(json!({ "chunks": [], "total": 0 }))
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

        let wallet = StubWallet::new();
        let (client, payments) = paid_client(wallet.clone());
        let response = client
            .post(format!("{}/docs/search", server.uri()))
            .json(&json!({ "query": "q", "k": 2 }))
            .send()
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        assert!(response.headers().contains_key("X-PAYMENT-RESPONSE"));
        assert_eq!(wallet.calls.load(Ordering::SeqCst), 1);

        let receipt = payments.last_receipt().unwrap();
        assert_eq!(receipt.paid_amount, 6000);
        assert_eq!(receipt.pay_to, "4zMMC9srt5Ri5X14GAgXhaHii3GnPAEERYPJgZJDncDU");
        assert_eq!(receipt.network, "solana-devnet");
    }

    #[tokio::test]
    async fn second_402_is_not_retried() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/docs/search"))
            .respond_with(ResponseTemplate::new(402).set_body_json(challenge_body()))
            .mount(&server)
            .await;

        let wallet = StubWallet::new();
        let (client, payments) = paid_client(wallet.clone());
        let response = client
            .post(format!("{}/docs/search", server.uri()))
            .json(&json!({ "query": "q" }))
            .send()
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::PAYMENT_REQUIRED);
        // The wallet built exactly one payment; the middleware did not loop.
        assert_eq!(wallet.calls.load(Ordering::SeqCst), 1);
        assert_eq!(server.received_requests().await.unwrap().len(), 2);
        assert!(payments.last_receipt().is_none());
    }

    #[tokio::test]
    async fn non_402_passes_through_untouched() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/docs/index"))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(json!({ "indexed_documents": [] })),
            )
            .mount(&server)
            .await;

        let wallet = StubWallet::new();
        let (client, _) = paid_client(wallet.clone());
        let response = client
            .post(format!("{}/docs/index", server.uri()))
            .json(&json!({ "documents": [] }))
            .send()
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(wallet.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn unpayable_challenge_errors_out() {
        let server = MockServer::start().await;
        let mut body = challenge_body();
        // A challenge with nothing this wallet can pay.
        body["accepts"] = json!([]);
        Mock::given(method("POST"))
            .and(path("/docs/search"))
            .respond_with(ResponseTemplate::new(402).set_body_json(body))
            .mount(&server)
            .await;

        let wallet = StubWallet::new();
        let (client, _) = paid_client(wallet);
        let result = client
            .post(format!("{}/docs/search", server.uri()))
            .json(&json!({ "query": "q" }))
            .send()
            .await;
        assert!(result.is_err());
    }
}
