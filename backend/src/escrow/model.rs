//! Replica models and data structures for escrow records

use anyhow::{anyhow, Result};
use paywarden_ledger::{Asset, EscrowRecord};
use serde::{Deserialize, Serialize};
use sqlx::types::chrono::{DateTime, Utc};

/// Replica escrow status. Integer codes match the ledger's
/// [`paywarden_ledger::EscrowStatus`] and the `status` SMALLINT column.
#[derive(Debug, Serialize, Deserialize, sqlx::Type, Clone, Copy, PartialEq, Eq)]
#[repr(i16)]
#[serde(rename_all = "lowercase")]
pub enum EscrowStatus {
    Created = 0,
    Funded = 1,
    Disputed = 2,
    Released = 3,
    Refunded = 4,
    Cancelled = 5,
}

impl From<paywarden_ledger::EscrowStatus> for EscrowStatus {
    fn from(status: paywarden_ledger::EscrowStatus) -> Self {
        use paywarden_ledger::EscrowStatus as Ledger;
        match status {
            Ledger::Created => EscrowStatus::Created,
            Ledger::Funded => EscrowStatus::Funded,
            Ledger::Disputed => EscrowStatus::Disputed,
            Ledger::Released => EscrowStatus::Released,
            Ledger::Refunded => EscrowStatus::Refunded,
            Ledger::Cancelled => EscrowStatus::Cancelled,
        }
    }
}

/// One replica row mirroring an on-ledger escrow record.
#[derive(Debug, Serialize, Deserialize, sqlx::FromRow, Clone)]
pub struct EscrowRow {
    pub chain_id: i64,
    pub escrow_id: i64,
    pub client: String,
    pub provider: String,
    pub arbitrator: Option<String>,
    pub asset: String,
    pub amount: i64,
    pub fee_rate_bps: i16,
    /// Realized fee, populated once the record is released.
    pub fee_amount: Option<i64>,
    pub status: EscrowStatus,
    pub deadline: Option<i64>,
    pub description: String,
    pub source_tx_hash: String,
    pub source_height: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl EscrowRow {
    /// Build a replica row from a canonical ledger record.
    ///
    /// Amounts are narrowed to BIGINT; anything wider is a hard error
    /// rather than a silent truncation.
    pub fn from_canonical(
        chain_id: u64,
        record: &EscrowRecord,
        source_tx_hash: &str,
        source_height: u64,
    ) -> Result<Self> {
        let now = Utc::now();
        Ok(EscrowRow {
            chain_id: chain_id as i64,
            escrow_id: i64::try_from(record.id).map_err(|_| anyhow!("escrow id too large"))?,
            client: record.client.to_string(),
            provider: record.provider.to_string(),
            arbitrator: record.arbitrator.as_ref().map(|a| a.to_string()),
            asset: asset_code(&record.asset),
            amount: i64::try_from(record.amount).map_err(|_| anyhow!("amount too large"))?,
            fee_rate_bps: record.fee_rate_bps as i16,
            fee_amount: None,
            status: record.status.into(),
            deadline: record.deadline.map(|d| d as i64),
            description: record.description.clone(),
            source_tx_hash: source_tx_hash.to_string(),
            source_height: source_height as i64,
            created_at: now,
            updated_at: now,
        })
    }
}

/// Stable text encoding of an asset for the replica's `asset` column.
pub fn asset_code(asset: &Asset) -> String {
    match asset {
        Asset::Native => "native".to_string(),
        Asset::Token(addr) => format!("token:{}", addr),
    }
}

/// Query parameters for listing escrows
#[derive(Debug, Default, Deserialize)]
pub struct ListEscrowsQuery {
    pub chain_id: Option<i64>,
    pub status: Option<EscrowStatus>,
    /// Matches either side of the agreement.
    pub participant: Option<String>,
    pub page: Option<i32>,
    pub limit: Option<i32>,
}

/// Aggregate statistics over the replica
#[derive(Debug, Serialize)]
pub struct EscrowStats {
    pub count_by_status: Vec<StatusCount>,
    pub total_amount: i64,
}

#[derive(Debug, Serialize, sqlx::FromRow)]
pub struct StatusCount {
    pub status: EscrowStatus,
    pub count: i64,
}
