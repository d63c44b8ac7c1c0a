//! Replica store: the indexer's single-writer view of the escrow mirror.

use anyhow::Result;
use async_trait::async_trait;
use sqlx::types::chrono::Utc;
use sqlx::PgPool;

use super::model::{EscrowRow, EscrowStatus};

/// Write interface over the replica, owned exclusively by the indexer.
///
/// All writes are idempotent: inserts are keyed by `(chain_id, escrow_id)`
/// and re-applying an already-applied event is a no-op.
#[async_trait]
pub trait ReplicaStore: Send + Sync {
    /// Highest fully-processed height for a chain, if any cycle completed.
    async fn cursor(&self, chain_id: u64) -> Result<Option<u64>>;

    /// Persist the watermark after a window (or prefix of one) is applied.
    async fn set_cursor(&self, chain_id: u64, height: u64) -> Result<()>;

    async fn get(&self, chain_id: u64, escrow_id: u64) -> Result<Option<EscrowRow>>;

    /// Insert a record if absent. Returns true when a row was written.
    async fn insert(&self, row: EscrowRow) -> Result<bool>;

    /// Reconcile status (and realized fee, on release) with canonical truth.
    async fn update_status(
        &self,
        chain_id: u64,
        escrow_id: u64,
        status: EscrowStatus,
        fee_amount: Option<i64>,
        source_tx_hash: &str,
        source_height: u64,
    ) -> Result<()>;
}

/// Postgres-backed replica store.
#[derive(Clone)]
pub struct PgReplicaStore {
    pool: PgPool,
}

impl PgReplicaStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl ReplicaStore for PgReplicaStore {
    async fn cursor(&self, chain_id: u64) -> Result<Option<u64>> {
        let row: Option<(i64,)> =
            sqlx::query_as("SELECT cursor FROM indexer_state WHERE chain_id = $1")
                .bind(chain_id as i64)
                .fetch_optional(&self.pool)
                .await?;

        Ok(row.map(|(cursor,)| cursor as u64))
    }

    async fn set_cursor(&self, chain_id: u64, height: u64) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO indexer_state (chain_id, cursor, updated_at)
            VALUES ($1, $2, NOW())
            ON CONFLICT (chain_id)
            DO UPDATE SET cursor = EXCLUDED.cursor, updated_at = NOW()
            "#,
        )
        .bind(chain_id as i64)
        .bind(height as i64)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn get(&self, chain_id: u64, escrow_id: u64) -> Result<Option<EscrowRow>> {
        let row = sqlx::query_as::<_, EscrowRow>(
            "SELECT * FROM escrows WHERE chain_id = $1 AND escrow_id = $2",
        )
        .bind(chain_id as i64)
        .bind(escrow_id as i64)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row)
    }

    async fn insert(&self, row: EscrowRow) -> Result<bool> {
        let result = sqlx::query(
            r#"
            INSERT INTO escrows (
                chain_id, escrow_id, client, provider, arbitrator, asset, amount,
                fee_rate_bps, fee_amount, status, deadline, description,
                source_tx_hash, source_height, created_at, updated_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16)
            ON CONFLICT (chain_id, escrow_id) DO NOTHING
            "#,
        )
        .bind(row.chain_id)
        .bind(row.escrow_id)
        .bind(&row.client)
        .bind(&row.provider)
        .bind(&row.arbitrator)
        .bind(&row.asset)
        .bind(row.amount)
        .bind(row.fee_rate_bps)
        .bind(row.fee_amount)
        .bind(row.status)
        .bind(row.deadline)
        .bind(&row.description)
        .bind(&row.source_tx_hash)
        .bind(row.source_height)
        .bind(row.created_at)
        .bind(row.updated_at)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    async fn update_status(
        &self,
        chain_id: u64,
        escrow_id: u64,
        status: EscrowStatus,
        fee_amount: Option<i64>,
        source_tx_hash: &str,
        source_height: u64,
    ) -> Result<()> {
        sqlx::query(
            r#"
            UPDATE escrows
            SET status = $1,
                fee_amount = COALESCE($2, fee_amount),
                source_tx_hash = $3,
                source_height = $4,
                updated_at = $5
            WHERE chain_id = $6 AND escrow_id = $7
            "#,
        )
        .bind(status)
        .bind(fee_amount)
        .bind(source_tx_hash)
        .bind(source_height as i64)
        .bind(Utc::now())
        .bind(chain_id as i64)
        .bind(escrow_id as i64)
        .execute(&self.pool)
        .await?;

        Ok(())
    }
}
