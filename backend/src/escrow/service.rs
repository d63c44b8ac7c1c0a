//! Escrow query service - read-only projections over the replica
//!
//! The indexer is the only writer; this service serves API reads and never
//! mutates the replica.

use anyhow::Result;
use sqlx::PgPool;

use crate::escrow::{EscrowRow, EscrowStats, ListEscrowsQuery, StatusCount};

/// Read model over the replica store
pub struct EscrowQueryService {
    db_pool: PgPool,
}

impl EscrowQueryService {
    pub fn new(db_pool: PgPool) -> Self {
        Self { db_pool }
    }

    /// Get a single escrow by its (chain, id) identity
    pub async fn get_escrow(&self, chain_id: i64, escrow_id: i64) -> Result<Option<EscrowRow>> {
        let escrow = sqlx::query_as::<_, EscrowRow>(
            "SELECT * FROM escrows WHERE chain_id = $1 AND escrow_id = $2",
        )
        .bind(chain_id)
        .bind(escrow_id)
        .fetch_optional(&self.db_pool)
        .await?;

        Ok(escrow)
    }

    /// List escrows with filtering and pagination
    pub async fn list_escrows(&self, query: ListEscrowsQuery) -> Result<Vec<EscrowRow>> {
        let page = query.page.unwrap_or(1).max(1);
        let limit = query.limit.unwrap_or(20).clamp(1, 100);
        let offset = (page - 1) * limit;

        let mut query_builder: sqlx::QueryBuilder<sqlx::Postgres> =
            sqlx::QueryBuilder::new("SELECT * FROM escrows WHERE 1=1");

        if let Some(chain_id) = query.chain_id {
            query_builder.push(" AND chain_id = ");
            query_builder.push_bind(chain_id);
        }
        if let Some(status) = query.status {
            query_builder.push(" AND status = ");
            query_builder.push_bind(status);
        }
        if let Some(participant) = query.participant {
            query_builder.push(" AND (client = ");
            query_builder.push_bind(participant.clone());
            query_builder.push(" OR provider = ");
            query_builder.push_bind(participant);
            query_builder.push(")");
        }

        query_builder.push(" ORDER BY created_at DESC LIMIT ");
        query_builder.push_bind(limit as i64);
        query_builder.push(" OFFSET ");
        query_builder.push_bind(offset as i64);

        let escrows = query_builder
            .build_query_as::<EscrowRow>()
            .fetch_all(&self.db_pool)
            .await?;

        Ok(escrows)
    }

    /// All escrows a participant is party to, on either side
    pub async fn get_by_participant(&self, participant: &str) -> Result<Vec<EscrowRow>> {
        let escrows = sqlx::query_as::<_, EscrowRow>(
            r#"
            SELECT * FROM escrows
            WHERE client = $1 OR provider = $1
            ORDER BY created_at DESC
            "#,
        )
        .bind(participant)
        .fetch_all(&self.db_pool)
        .await?;

        Ok(escrows)
    }

    /// Aggregate statistics: count per status and total principal
    pub async fn stats(&self, chain_id: Option<i64>) -> Result<EscrowStats> {
        let mut count_query: sqlx::QueryBuilder<sqlx::Postgres> =
            sqlx::QueryBuilder::new("SELECT status, COUNT(*) AS count FROM escrows WHERE 1=1");
        if let Some(chain_id) = chain_id {
            count_query.push(" AND chain_id = ");
            count_query.push_bind(chain_id);
        }
        count_query.push(" GROUP BY status ORDER BY status");

        let count_by_status = count_query
            .build_query_as::<StatusCount>()
            .fetch_all(&self.db_pool)
            .await?;

        let mut sum_query: sqlx::QueryBuilder<sqlx::Postgres> = sqlx::QueryBuilder::new(
            "SELECT COALESCE(SUM(amount), 0)::BIGINT FROM escrows WHERE 1=1",
        );
        if let Some(chain_id) = chain_id {
            sum_query.push(" AND chain_id = ");
            sum_query.push_bind(chain_id);
        }

        let (total_amount,): (i64,) = sum_query
            .build_query_as()
            .fetch_one(&self.db_pool)
            .await?;

        Ok(EscrowStats {
            count_by_status,
            total_amount,
        })
    }
}
