//! Paywalled retrieval gateway over x402 Solana payments.
//!
//! This crate indexes documents and web pages into a Postgres/pgvector store,
//! exposes similarity search and chunk-range retrieval over HTTP, and gates
//! retrieval behind per-chunk micropayments settled through an x402
//! facilitator on Solana USDC. Callers authenticate every request with a
//! wallet-signed bearer token; the gateway charges that wallet for the chunks
//! it returns, remembers what the wallet already purchased, and never bills
//! twice.
//!
//! # Request lifecycle
//!
//! `request → auth → retrieve → ledger diff → [402 challenge → verify →
//! settle] → record → response`. Verification and settlement are delegated to
//! a remote facilitator over HTTP; settlement is the commit point for the
//! purchase ledger.
//!
//! # Modules
//!
//! - [`auth`] — wallet-signed `Authorization: Solana ...` header scheme.
//! - [`types`] — x402 wire types (requirements, payloads, facilitator pairs).
//! - [`identity`] — deterministic document and chunk ids.
//! - [`pricing`] — USD → base units and proportional per-chunk allocation.
//! - [`splitter`] — recursive character text splitting.
//! - [`embedding`] — embedding provider capability and variants.
//! - [`loader`] — PDF and web content loaders.
//! - [`index`] — pgvector-backed vector index adapter.
//! - [`ledger`] — durable per-wallet purchase ledger.
//! - [`services`] — indexing and retrieval services plus wire schemas.
//! - [`server`] — axum routes, payment state machine, error mapping.
//! - [`config`] / [`context`] — environment config and startup wiring.
//!
//! The companion `x402-retrieval-client` crate holds the buyer side: request
//! signing, automatic 402 handling, and gasless payment construction.

pub mod auth;
pub mod config;
pub mod context;
pub mod embedding;
pub mod identity;
pub mod index;
pub mod ledger;
pub mod loader;
pub mod pricing;
pub mod server;
pub mod services;
pub mod splitter;
pub mod types;
pub mod util;
