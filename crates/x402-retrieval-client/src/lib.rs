//! Client SDK for the x402-retrieval gateway.
//!
//! Wraps `reqwest` with two middleware layers:
//!
//! - [`auth::SolanaAuthorization`] mints a fresh wallet-signed
//!   `Authorization` header for every outgoing request (including payment
//!   retries), binding the signature to the exact request URL.
//! - [`payments::X402Payments`] intercepts `402 Payment Required` responses,
//!   builds a partially-signed gasless USDC transfer via the configured
//!   wallet, attaches it as `X-PAYMENT`, and retries exactly once.
//!
//! [`client::RetrievalClient`] layers a typed API for every gateway endpoint
//! on top, and reports what the last request paid and to whom.
//!
//! ```rust,no_run
//! use solana_keypair::Keypair;
//! use x402_retrieval_client::RetrievalClient;
//!
//! # async fn run() -> Result<(), Box<dyn std::error::Error>> {
//! let keypair = Keypair::new();
//! let client = RetrievalClient::new("http://localhost:8000", keypair)?;
//! let result = client.search("consensus algorithms", 5, None).await?;
//! for chunk in &result.chunks {
//!     println!("{}: {}", chunk.metadata.chunk_id, chunk.text);
//! }
//! # Ok(())
//! # }
//! ```

pub mod auth;
pub mod client;
pub mod payments;
pub mod wallet;

pub use client::{ClientError, RetrievalClient};
pub use payments::{PaymentReceipt, X402Payments};
pub use wallet::{SenderWallet, SolanaPayerWallet, X402PaymentsError};
