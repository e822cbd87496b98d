//! Server-side x402 payment handling.
//!
//! The gateway is a *seller*: it challenges unpaid requests with a 402 body
//! carrying [`PaymentRequirements`], verifies submitted payments against a
//! remote facilitator, and settles them after the response body is prepared.
//! Settlement is the commit point: the purchase ledger is only written after
//! a successful settle.

use http::{HeaderMap, StatusCode};
use reqwest::Client;
use serde::de::DeserializeOwned;
use serde::Serialize;
use solana_message::VersionedMessage;
use solana_pubkey::{pubkey, Pubkey};
use solana_transaction::versioned::VersionedTransaction;
use std::time::Duration;
use url::Url;

use crate::config::X402Config;
use crate::types::{
    PaymentPayload, PaymentRequiredResponse, PaymentRequirements, PaymentExtra, Scheme,
    SettleRequest, SettleResponse, SolanaAddress, TokenAmount, VerifyRequest, VerifyResponse,
    X402Version,
};
use crate::util::Base64Bytes;

const ATA_PROGRAM_PUBKEY: Pubkey = pubkey!("ATokenGPvbdGVxr1b2hvZbsiqW5xWH25efTNsLJA8knL");

/// A client for communicating with a remote x402 facilitator.
///
/// Handles `/verify` and `/settle` endpoints via JSON HTTP POST. Cheap to
/// clone; shares a connection pool via `reqwest::Client`.
#[derive(Clone, Debug)]
pub struct FacilitatorClient {
    base_url: Url,
    verify_url: Url,
    settle_url: Url,
    client: Client,
    timeout: Option<Duration>,
}

/// Errors that can occur while interacting with a remote facilitator.
#[derive(Debug, thiserror::Error)]
pub enum FacilitatorClientError {
    #[error("URL parse error: {context}: {source}")]
    UrlParse {
        context: &'static str,
        #[source]
        source: url::ParseError,
    },
    #[error("HTTP error: {context}: {source}")]
    Http {
        context: &'static str,
        #[source]
        source: reqwest::Error,
    },
    #[error("Failed to deserialize JSON: {context}: {source}")]
    JsonDeserialization {
        context: &'static str,
        #[source]
        source: reqwest::Error,
    },
    #[error("Unexpected HTTP status {status}: {context}: {body}")]
    HttpStatus {
        context: &'static str,
        status: StatusCode,
        body: String,
    },
}

impl FacilitatorClient {
    /// Constructs a new [`FacilitatorClient`] from a base URL.
    pub fn try_new(base_url: Url) -> Result<Self, FacilitatorClientError> {
        let verify_url =
            base_url
                .join("./verify")
                .map_err(|e| FacilitatorClientError::UrlParse {
                    context: "Failed to construct ./verify URL",
                    source: e,
                })?;
        let settle_url =
            base_url
                .join("./settle")
                .map_err(|e| FacilitatorClientError::UrlParse {
                    context: "Failed to construct ./settle URL",
                    source: e,
                })?;
        Ok(Self {
            base_url,
            verify_url,
            settle_url,
            client: Client::new(),
            timeout: None,
        })
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    /// Sets a timeout for all future requests.
    pub fn with_timeout(&self, timeout: Duration) -> Self {
        let mut this = self.clone();
        this.timeout = Some(timeout);
        this
    }

    /// Sends a `POST /verify` request to the facilitator.
    #[tracing::instrument(name = "x402.facilitator.verify", skip_all, err)]
    pub async fn verify(
        &self,
        request: &VerifyRequest,
    ) -> Result<VerifyResponse, FacilitatorClientError> {
        self.post_json(&self.verify_url, "POST /verify", request)
            .await
    }

    /// Sends a `POST /settle` request to the facilitator.
    #[tracing::instrument(name = "x402.facilitator.settle", skip_all, err)]
    pub async fn settle(
        &self,
        request: &SettleRequest,
    ) -> Result<SettleResponse, FacilitatorClientError> {
        self.post_json(&self.settle_url, "POST /settle", request)
            .await
    }

    async fn post_json<T, R>(
        &self,
        url: &Url,
        context: &'static str,
        payload: &T,
    ) -> Result<R, FacilitatorClientError>
    where
        T: Serialize + ?Sized,
        R: DeserializeOwned,
    {
        let mut req = self.client.post(url.clone()).json(payload);
        if let Some(timeout) = self.timeout {
            req = req.timeout(timeout);
        }
        let http_response = req
            .send()
            .await
            .map_err(|e| FacilitatorClientError::Http { context, source: e })?;

        if http_response.status() == StatusCode::OK {
            http_response
                .json::<R>()
                .await
                .map_err(|e| FacilitatorClientError::JsonDeserialization { context, source: e })
        } else {
            let status = http_response.status();
            let body = http_response.text().await.unwrap_or_default();
            Err(FacilitatorClientError::HttpStatus {
                context,
                status,
                body,
            })
        }
    }
}

impl TryFrom<&Url> for FacilitatorClient {
    type Error = FacilitatorClientError;

    fn try_from(value: &Url) -> Result<Self, Self::Error> {
        // Normalize: strip trailing slashes and add a single trailing slash
        // so relative joins land under the base path.
        let mut normalized = value.as_str().trim_end_matches('/').to_string();
        normalized.push('/');
        let url = Url::parse(&normalized).map_err(|e| FacilitatorClientError::UrlParse {
            context: "Failed to parse base url",
            source: e,
        })?;
        FacilitatorClient::try_new(url)
    }
}

/// A `402 Payment Required` response in flight: the x402 body plus whether
/// the caller should see the HTML paywall instead of JSON.
#[derive(Debug, Clone)]
pub struct PaymentChallenge {
    pub body: PaymentRequiredResponse,
    pub browser: bool,
    /// Asset decimals, for rendering human amounts on the paywall page.
    pub asset_decimals: u32,
}

/// Verified payment state carried between the verify and settle steps.
#[derive(Debug, Clone)]
pub struct PaymentContext {
    pub payment: PaymentPayload,
    pub requirements: PaymentRequirements,
}

/// Does the request look like it comes from an interactive browser?
pub fn is_browser_request(headers: &HeaderMap) -> bool {
    let accepts_html = headers
        .get(http::header::ACCEPT)
        .and_then(|v| v.to_str().ok())
        .is_some_and(|accept| accept.contains("text/html"));
    let mozilla_agent = headers
        .get(http::header::USER_AGENT)
        .and_then(|v| v.to_str().ok())
        .is_some_and(|agent| agent.starts_with("Mozilla"));
    accepts_html && mozilla_agent
}

/// Handles x402 payment verification and settlement for gated endpoints.
pub struct PaymentHandler {
    config: X402Config,
    pay_to: SolanaAddress,
    facilitator: FacilitatorClient,
}

impl PaymentHandler {
    pub fn new(config: X402Config) -> Result<Self, PaymentHandlerInitError> {
        let pay_to = match config.pay_to_address {
            Some(address) => address,
            // A disabled gateway never charges, so any placeholder works;
            // reuse the fee payer to keep requirements well-formed.
            None if !config.enabled => config.fee_payer,
            None => return Err(PaymentHandlerInitError::MissingPayTo),
        };
        let facilitator = FacilitatorClient::try_from(&config.facilitator_url)?
            .with_timeout(Duration::from_secs(config.max_timeout_seconds));
        Ok(Self {
            config,
            pay_to,
            facilitator,
        })
    }

    pub fn enabled(&self) -> bool {
        self.config.enabled
    }

    /// Builds the payment requirements for a request that owes `total_owed`.
    pub fn payment_requirements(
        &self,
        total_owed: TokenAmount,
        resource: Url,
        description: String,
    ) -> PaymentRequirements {
        PaymentRequirements {
            scheme: Scheme::Exact,
            network: self.config.network,
            max_amount_required: total_owed,
            resource,
            description,
            mime_type: "application/json".to_string(),
            output_schema: None,
            pay_to: self.pay_to,
            max_timeout_seconds: self.config.max_timeout_seconds,
            asset: self.config.asset,
            extra: Some(PaymentExtra {
                fee_payer: self.config.fee_payer,
            }),
        }
    }

    fn challenge(
        &self,
        error: impl Into<String>,
        requirements: &PaymentRequirements,
        headers: &HeaderMap,
    ) -> PaymentChallenge {
        PaymentChallenge {
            body: PaymentRequiredResponse {
                x402_version: X402Version::V1,
                accepts: vec![requirements.clone()],
                error: error.into(),
            },
            browser: is_browser_request(headers),
            asset_decimals: self.config.asset_decimals,
        }
    }

    /// Verifies payment for a request that owes `total_owed > 0`.
    ///
    /// Returns a [`PaymentContext`] ready for settlement, or the 402 challenge
    /// to send back: missing header, malformed header, requirement mismatch,
    /// facilitator error, and facilitator rejection all re-challenge with the
    /// specific reason.
    #[tracing::instrument(name = "x402.verify_payment", skip_all, fields(amount = %total_owed))]
    pub async fn verify_payment(
        &self,
        headers: &HeaderMap,
        total_owed: TokenAmount,
        resource: Url,
        description: String,
    ) -> Result<PaymentContext, Box<PaymentChallenge>> {
        let requirements = self.payment_requirements(total_owed, resource, description);

        let payment_header = headers
            .get("X-PAYMENT")
            .and_then(|value| value.to_str().ok());
        let payment_header = match payment_header {
            Some(value) if !value.is_empty() => value,
            _ => {
                return Err(Box::new(self.challenge(
                    "No X-PAYMENT header provided",
                    &requirements,
                    headers,
                )));
            }
        };

        let payment =
            match PaymentPayload::try_from(Base64Bytes::from(payment_header.as_bytes())) {
                Ok(payment) => payment,
                Err(error) => {
                    tracing::warn!(%error, "invalid payment header");
                    return Err(Box::new(self.challenge(
                        "Invalid payment header format",
                        &requirements,
                        headers,
                    )));
                }
            };

        if let Err(reason) = payment_matches_requirements(&payment, &requirements) {
            tracing::warn!(reason, "payment does not match requirements");
            return Err(Box::new(self.challenge(
                "Payment does not match requirements",
                &requirements,
                headers,
            )));
        }

        let verify_request = VerifyRequest {
            x402_version: payment.x402_version,
            payment_payload: payment.clone(),
            payment_requirements: requirements.clone(),
        };
        let verify_response = match self.facilitator.verify(&verify_request).await {
            Ok(response) => response,
            Err(error) => {
                tracing::error!(%error, "facilitator verification call failed");
                return Err(Box::new(self.challenge(
                    format!("Payment verification failed: {error}"),
                    &requirements,
                    headers,
                )));
            }
        };

        if !verify_response.is_valid {
            let reason = verify_response
                .invalid_reason
                .unwrap_or_else(|| "Unknown error".to_string());
            return Err(Box::new(self.challenge(
                format!("Invalid payment: {reason}"),
                &requirements,
                headers,
            )));
        }

        Ok(PaymentContext {
            payment,
            requirements,
        })
    }

    /// Settles a verified payment. On success returns the facilitator's
    /// settlement record for the `X-PAYMENT-RESPONSE` header; on failure the
    /// caller must abort with 402 and leave the ledger untouched.
    #[tracing::instrument(name = "x402.settle_payment", skip_all)]
    pub async fn settle_payment(
        &self,
        context: &PaymentContext,
        headers: &HeaderMap,
    ) -> Result<SettleResponse, Box<PaymentChallenge>> {
        let settle_request = SettleRequest {
            x402_version: context.payment.x402_version,
            payment_payload: context.payment.clone(),
            payment_requirements: context.requirements.clone(),
        };
        let settlement = match self.facilitator.settle(&settle_request).await {
            Ok(settlement) => settlement,
            Err(error) => {
                tracing::error!(%error, "facilitator settlement call failed");
                return Err(Box::new(self.challenge(
                    format!("Settlement failed: {error}"),
                    &context.requirements,
                    headers,
                )));
            }
        };
        if settlement.success {
            Ok(settlement)
        } else {
            let reason = settlement
                .error_reason
                .unwrap_or_else(|| "Unknown error".to_string());
            tracing::error!(reason, "settlement rejected");
            Err(Box::new(self.challenge(
                format!("Settlement failed: {reason}"),
                &context.requirements,
                headers,
            )))
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum PaymentHandlerInitError {
    #[error("X402_PAY_TO_ADDRESS is required while payments are enabled")]
    MissingPayTo,
    #[error(transparent)]
    Facilitator(#[from] FacilitatorClientError),
}

/// Derives the associated token account for `(owner, mint)` under the classic
/// SPL token program.
pub fn derive_ata(owner: &Pubkey, mint: &Pubkey) -> Pubkey {
    let (ata, _) = Pubkey::find_program_address(
        &[owner.as_ref(), spl_token::ID.as_ref(), mint.as_ref()],
        &ATA_PROGRAM_PUBKEY,
    );
    ata
}

/// Structural check that the submitted payment corresponds to the challenge:
/// scheme and network match, and the decoded transaction carries a
/// `TransferChecked` of exactly the owed amount of the right mint into the
/// payee's associated token account.
pub fn payment_matches_requirements(
    payment: &PaymentPayload,
    requirements: &PaymentRequirements,
) -> Result<(), &'static str> {
    if payment.scheme != requirements.scheme {
        return Err("scheme mismatch");
    }
    if payment.network != requirements.network {
        return Err("network mismatch");
    }

    let raw = Base64Bytes::from(payment.payload.transaction.as_bytes())
        .decode()
        .map_err(|_| "transaction is not valid base64")?;
    let transaction: VersionedTransaction =
        bincode::deserialize(&raw).map_err(|_| "transaction does not deserialize")?;
    let message: &VersionedMessage = &transaction.message;
    let account_keys = message.static_account_keys();

    let expected_destination = derive_ata(
        requirements.pay_to.pubkey(),
        requirements.asset.pubkey(),
    );

    for instruction in message.instructions() {
        let program_id = instruction.program_id(account_keys);
        if *program_id != spl_token::ID {
            continue;
        }
        let token_instruction =
            spl_token::instruction::TokenInstruction::unpack(&instruction.data)
                .map_err(|_| "token instruction does not decode")?;
        let amount = match token_instruction {
            spl_token::instruction::TokenInstruction::TransferChecked { amount, .. } => amount,
            _ => continue,
        };
        // TransferChecked accounts: source, mint, destination, authority.
        let mint = instruction
            .accounts
            .get(1)
            .and_then(|index| account_keys.get(*index as usize))
            .ok_or("transfer instruction accounts are malformed")?;
        let destination = instruction
            .accounts
            .get(2)
            .and_then(|index| account_keys.get(*index as usize))
            .ok_or("transfer instruction accounts are malformed")?;

        if amount != requirements.max_amount_required.inner() {
            return Err("transfer amount mismatch");
        }
        if mint != requirements.asset.pubkey() {
            return Err("transfer asset mismatch");
        }
        if *destination != expected_destination {
            return Err("transfer destination mismatch");
        }
        return Ok(());
    }
    Err("no token transfer instruction found")
}

/// Minimal HTML paywall shown to browser callers instead of the JSON body.
pub fn paywall_html(body: &PaymentRequiredResponse, asset_decimals: u32) -> String {
    let (amount, pay_to, network) = body
        .accepts
        .first()
        .map(|req| {
            let units = req.max_amount_required.inner();
            let scale = 10u64.pow(asset_decimals);
            let amount = format!("{}.{:0width$}", units / scale, units % scale, width = asset_decimals as usize);
            (amount, req.pay_to.to_string(), req.network.to_string())
        })
        .unwrap_or_else(|| ("0".to_string(), String::new(), String::new()));

    format!(
        "<!doctype html>\n<html>\n<head><meta charset=\"utf-8\"><title>Payment Required</title></head>\n\
         <body>\n<h1>402 Payment Required</h1>\n\
         <p>{error}</p>\n\
         <p>Amount: <strong>{amount} USDC</strong> on <code>{network}</code></p>\n\
         <p>Pay to: <code>{pay_to}</code></p>\n\
         <p>Retry the request with an <code>X-PAYMENT</code> header produced by an x402-capable client.</p>\n\
         </body>\n</html>\n",
        error = body.error,
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::ExactSolanaPayload;
    use http::header::{ACCEPT, USER_AGENT};
    use serde_json::json;
    use solana_keypair::Keypair;
    use solana_message::v0::Message as MessageV0;
    use solana_signer::Signer;
    use std::str::FromStr;
    use wiremock::matchers::{body_partial_json, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn test_config(facilitator_url: &str) -> X402Config {
        X402Config {
            enabled: true,
            pay_to_address: Some(
                SolanaAddress::from_str("4zMMC9srt5Ri5X14GAgXhaHii3GnPAEERYPJgZJDncDU").unwrap(),
            ),
            network: crate::types::SolanaNetwork::SolanaDevnet,
            asset: SolanaAddress::from_str("EPjFWdd5AufqSSqeM2qN1xzybapC8G4wEGGkZwyTDt1v")
                .unwrap(),
            asset_decimals: 6,
            fee_payer: SolanaAddress::from_str("2wKupLR9q6wXYppw8Gr2NvWxKBUqm4PPJKkQfoxHDBg4")
                .unwrap(),
            facilitator_url: facilitator_url.parse().unwrap(),
            max_timeout_seconds: 60,
        }
    }

    fn handler(facilitator_url: &str) -> PaymentHandler {
        PaymentHandler::new(test_config(facilitator_url)).unwrap()
    }

    fn resource() -> Url {
        "http://localhost:8000/docs/search".parse().unwrap()
    }

    /// Builds a payload whose inner transaction transfers `amount` of the
    /// handler's asset to the payee ATA, signed by a throwaway wallet.
    fn matching_payment(handler: &PaymentHandler, amount: u64) -> PaymentPayload {
        let requirements =
            handler.payment_requirements(TokenAmount(amount), resource(), String::new());
        let payer = Keypair::new();
        let source = derive_ata(&payer.pubkey(), requirements.asset.pubkey());
        let destination = derive_ata(
            requirements.pay_to.pubkey(),
            requirements.asset.pubkey(),
        );
        let transfer = spl_token::instruction::transfer_checked(
            &spl_token::ID,
            &source,
            requirements.asset.pubkey(),
            &destination,
            &payer.pubkey(),
            &[],
            amount,
            6,
        )
        .unwrap();
        let fee_payer: Pubkey = handler.config.fee_payer.into();
        let message = MessageV0::try_compile(
            &fee_payer,
            &[transfer],
            &[],
            solana_hash::Hash::default(),
        )
        .unwrap();
        let transaction = VersionedTransaction {
            signatures: vec![],
            message: VersionedMessage::V0(message),
        };
        let bytes = bincode::serialize(&transaction).unwrap();
        PaymentPayload {
            x402_version: X402Version::V1,
            scheme: Scheme::Exact,
            network: requirements.network,
            payload: ExactSolanaPayload {
                transaction: Base64Bytes::encode(bytes).to_string(),
            },
        }
    }

    #[test]
    fn browser_detection() {
        let mut headers = HeaderMap::new();
        headers.insert(ACCEPT, "text/html,application/xhtml+xml".parse().unwrap());
        headers.insert(USER_AGENT, "Mozilla/5.0".parse().unwrap());
        assert!(is_browser_request(&headers));

        let mut api_headers = HeaderMap::new();
        api_headers.insert(ACCEPT, "application/json".parse().unwrap());
        api_headers.insert(USER_AGENT, "reqwest/0.12".parse().unwrap());
        assert!(!is_browser_request(&api_headers));
    }

    #[test]
    fn requirements_carry_config() {
        let handler = handler("https://facilitator.example/");
        let requirements =
            handler.payment_requirements(TokenAmount(6000), resource(), "2 chunks".to_string());
        assert_eq!(requirements.scheme, Scheme::Exact);
        assert_eq!(requirements.max_amount_required.inner(), 6000);
        assert_eq!(
            requirements.extra.unwrap().fee_payer.to_string(),
            "2wKupLR9q6wXYppw8Gr2NvWxKBUqm4PPJKkQfoxHDBg4"
        );
    }

    #[tokio::test]
    async fn missing_header_challenges() {
        let handler = handler("https://facilitator.example/");
        let challenge = handler
            .verify_payment(
                &HeaderMap::new(),
                TokenAmount(6000),
                resource(),
                String::new(),
            )
            .await
            .unwrap_err();
        assert_eq!(challenge.body.error, "No X-PAYMENT header provided");
        assert_eq!(challenge.body.accepts.len(), 1);
        assert_eq!(
            challenge.body.accepts[0].max_amount_required,
            TokenAmount(6000)
        );
    }

    #[tokio::test]
    async fn malformed_header_challenges() {
        let handler = handler("https://facilitator.example/");
        let mut headers = HeaderMap::new();
        headers.insert("X-PAYMENT", "!!not-base64!!".parse().unwrap());
        let challenge = handler
            .verify_payment(&headers, TokenAmount(6000), resource(), String::new())
            .await
            .unwrap_err();
        assert_eq!(challenge.body.error, "Invalid payment header format");
    }

    #[tokio::test]
    async fn mismatched_payment_challenges() {
        let handler = handler("https://facilitator.example/");
        // Transfer of the wrong amount.
        let payment = matching_payment(&handler, 999);
        let header = payment.to_base64().unwrap().to_string();
        let mut headers = HeaderMap::new();
        headers.insert("X-PAYMENT", header.parse().unwrap());
        let challenge = handler
            .verify_payment(&headers, TokenAmount(6000), resource(), String::new())
            .await
            .unwrap_err();
        assert_eq!(challenge.body.error, "Payment does not match requirements");
    }

    #[tokio::test]
    async fn facilitator_rejection_carries_reason() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/verify"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "isValid": false,
                "invalidReason": "insufficient funds"
            })))
            .mount(&server)
            .await;

        let handler = handler(&server.uri());
        let payment = matching_payment(&handler, 6000);
        let mut headers = HeaderMap::new();
        headers.insert(
            "X-PAYMENT",
            payment.to_base64().unwrap().to_string().parse().unwrap(),
        );
        let challenge = handler
            .verify_payment(&headers, TokenAmount(6000), resource(), String::new())
            .await
            .unwrap_err();
        assert_eq!(challenge.body.error, "Invalid payment: insufficient funds");
    }

    #[tokio::test]
    async fn verify_then_settle_round_trip() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/verify"))
            .and(body_partial_json(json!({
                "paymentRequirements": { "maxAmountRequired": "6000" }
            })))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(json!({ "isValid": true })),
            )
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/settle"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "success": true,
                "transaction": "5signature",
                "network": "solana-devnet"
            })))
            .mount(&server)
            .await;

        let handler = handler(&server.uri());
        let payment = matching_payment(&handler, 6000);
        let mut headers = HeaderMap::new();
        headers.insert(
            "X-PAYMENT",
            payment.to_base64().unwrap().to_string().parse().unwrap(),
        );
        let context = handler
            .verify_payment(&headers, TokenAmount(6000), resource(), String::new())
            .await
            .unwrap();
        let settlement = handler.settle_payment(&context, &headers).await.unwrap();
        assert!(settlement.success);
        assert_eq!(settlement.transaction.as_deref(), Some("5signature"));
    }

    #[tokio::test]
    async fn settle_failure_challenges_with_reason() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/verify"))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(json!({ "isValid": true })),
            )
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/settle"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "success": false,
                "errorReason": "blockhash expired"
            })))
            .mount(&server)
            .await;

        let handler = handler(&server.uri());
        let payment = matching_payment(&handler, 6000);
        let mut headers = HeaderMap::new();
        headers.insert(
            "X-PAYMENT",
            payment.to_base64().unwrap().to_string().parse().unwrap(),
        );
        let context = handler
            .verify_payment(&headers, TokenAmount(6000), resource(), String::new())
            .await
            .unwrap();
        let challenge = handler
            .settle_payment(&context, &headers)
            .await
            .unwrap_err();
        assert_eq!(challenge.body.error, "Settlement failed: blockhash expired");
    }

    #[test]
    fn paywall_html_renders_the_offer() {
        let handler = handler("https://facilitator.example/");
        let requirements =
            handler.payment_requirements(TokenAmount(6000), resource(), String::new());
        let body = PaymentRequiredResponse {
            x402_version: X402Version::V1,
            accepts: vec![requirements],
            error: "No X-PAYMENT header provided".to_string(),
        };
        let html = paywall_html(&body, 6);
        assert!(html.contains("402 Payment Required"));
        assert!(html.contains("0.006000 USDC"));
        assert!(html.contains("solana-devnet"));
        assert!(html.contains("4zMMC9srt5Ri5X14GAgXhaHii3GnPAEERYPJgZJDncDU"));
    }
}
