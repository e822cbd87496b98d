//! Purchase ledger.
//!
//! A durable set of `(wallet, chunk_id)` rows recording which chunks a wallet
//! has already paid for. The composite primary key makes inserts idempotent,
//! which is what absorbs concurrent duplicate purchases; rows are never
//! deleted. Reads are snapshot-consistent within a request, and writes commit
//! before the HTTP response is finalized.

use async_trait::async_trait;
use sqlx::postgres::PgPool;
use sqlx::Row;
use std::collections::HashSet;
use uuid::Uuid;

use crate::index::RetrievedChunk;

#[derive(Debug, thiserror::Error)]
#[error("purchase ledger query failed: {0}")]
pub struct LedgerError(pub String);

impl From<sqlx::Error> for LedgerError {
    fn from(error: sqlx::Error) -> Self {
        Self(error.to_string())
    }
}

/// Capability surface of the purchase ledger.
#[async_trait]
pub trait PurchaseLedger: Send + Sync {
    /// Returns the subset of `chunk_ids` the wallet already owns.
    async fn paid_subset(
        &self,
        wallet: &str,
        chunk_ids: &[Uuid],
    ) -> Result<HashSet<Uuid>, LedgerError>;

    /// Records purchases for the wallet, idempotently.
    async fn record(&self, wallet: &str, chunk_ids: &[Uuid]) -> Result<(), LedgerError>;

    /// Splits retrieved chunks into `(unpaid, paid)` for the wallet,
    /// preserving the input order within each list.
    async fn split(
        &self,
        wallet: &str,
        chunks: Vec<RetrievedChunk>,
    ) -> Result<(Vec<RetrievedChunk>, Vec<RetrievedChunk>), LedgerError> {
        if chunks.is_empty() {
            return Ok((vec![], vec![]));
        }
        let ids: Vec<Uuid> = chunks.iter().map(|c| c.id).collect();
        let paid = self.paid_subset(wallet, &ids).await?;
        Ok(split_by_paid(chunks, &paid))
    }
}

/// Postgres-backed [`PurchaseLedger`].
#[derive(Clone)]
pub struct PgPurchaseLedger {
    pool: PgPool,
}

impl PgPurchaseLedger {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn ensure_schema(pool: &PgPool) -> Result<(), sqlx::Error> {
        sqlx::query(
            "CREATE TABLE IF NOT EXISTS chunk_purchases (
                user_address TEXT NOT NULL,
                chunk_id TEXT NOT NULL,
                purchased_at TIMESTAMPTZ NOT NULL DEFAULT now(),
                PRIMARY KEY (user_address, chunk_id)
            )",
        )
        .execute(pool)
        .await?;
        Ok(())
    }
}

#[async_trait]
impl PurchaseLedger for PgPurchaseLedger {
    async fn paid_subset(
        &self,
        wallet: &str,
        chunk_ids: &[Uuid],
    ) -> Result<HashSet<Uuid>, LedgerError> {
        if chunk_ids.is_empty() {
            return Ok(HashSet::new());
        }
        let ids: Vec<String> = chunk_ids.iter().map(Uuid::to_string).collect();
        let rows = sqlx::query(
            "SELECT chunk_id FROM chunk_purchases
             WHERE user_address = $1 AND chunk_id = ANY($2)",
        )
        .bind(wallet)
        .bind(&ids)
        .fetch_all(&self.pool)
        .await?;

        let mut paid = HashSet::with_capacity(rows.len());
        for row in rows {
            let id: String = row.try_get("chunk_id")?;
            if let Ok(uuid) = Uuid::parse_str(&id) {
                paid.insert(uuid);
            }
        }
        Ok(paid)
    }

    /// Conflicts on the `(wallet, chunk_id)` primary key are suppressed, so
    /// replays and races are harmless.
    async fn record(&self, wallet: &str, chunk_ids: &[Uuid]) -> Result<(), LedgerError> {
        if chunk_ids.is_empty() {
            return Ok(());
        }
        let ids: Vec<String> = chunk_ids.iter().map(Uuid::to_string).collect();
        sqlx::query(
            "INSERT INTO chunk_purchases (user_address, chunk_id)
             SELECT $1, unnest($2::text[])
             ON CONFLICT (user_address, chunk_id) DO NOTHING",
        )
        .bind(wallet)
        .bind(&ids)
        .execute(&self.pool)
        .await?;
        tracing::debug!(wallet, count = chunk_ids.len(), "recorded chunk purchases");
        Ok(())
    }
}

/// Order-preserving partition of chunks by ledger membership.
pub fn split_by_paid(
    chunks: Vec<RetrievedChunk>,
    paid: &HashSet<Uuid>,
) -> (Vec<RetrievedChunk>, Vec<RetrievedChunk>) {
    let mut unpaid = Vec::new();
    let mut owned = Vec::new();
    for chunk in chunks {
        if paid.contains(&chunk.id) {
            owned.push(chunk);
        } else {
            unpaid.push(chunk);
        }
    }
    (unpaid, owned)
}
