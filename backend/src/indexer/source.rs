//! Read access to an authoritative ledger.
//!
//! The trait is what the reconciliation logic depends on; the RPC
//! implementation talks JSON-RPC to a remote chain node. Tests wrap an
//! in-process ledger behind the same trait.

use std::time::Duration;

use async_trait::async_trait;
use paywarden_ledger::{EscrowRecord, LogEvent};
use reqwest::Client;
use serde_json::json;
use thiserror::Error;

use super::types::{GetEventsResult, GetHeightResult, GetRecordResult, RpcResponse};

/// Failures reading from a ledger source.
///
/// `Transport` errors (timeouts, connection loss) are transient: the caller
/// logs them, leaves the cursor alone, and retries next cycle.
#[derive(Debug, Error)]
pub enum SourceError {
    #[error("ledger source transport error: {0}")]
    Transport(String),

    #[error("ledger source returned malformed data: {0}")]
    Malformed(String),

    #[error("ledger source rejected request ({code}): {message}")]
    Rpc { code: i64, message: String },
}

impl From<reqwest::Error> for SourceError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_decode() {
            SourceError::Malformed(err.to_string())
        } else {
            SourceError::Transport(err.to_string())
        }
    }
}

/// Read-only view of the authoritative ledger for one chain.
#[async_trait]
pub trait LedgerSource: Send + Sync {
    /// Highest height whose events are final.
    async fn confirmed_height(&self) -> Result<u64, SourceError>;

    /// Contract events with `from <= height <= to`, ordered by
    /// `(height, log_index)` ascending.
    async fn events_in_range(&self, from: u64, to: u64) -> Result<Vec<LogEvent>, SourceError>;

    /// Current canonical state of one escrow record.
    async fn canonical_record(&self, id: u64) -> Result<Option<EscrowRecord>, SourceError>;
}

/// JSON-RPC ledger source.
pub struct RpcLedgerSource {
    rpc_url: String,
    contract_address: String,
    confirmation_depth: u64,
    client: Client,
}

impl RpcLedgerSource {
    pub fn new(rpc_url: String, contract_address: String, confirmation_depth: u64) -> Self {
        Self {
            rpc_url,
            contract_address,
            confirmation_depth,
            client: Client::builder()
                .timeout(Duration::from_secs(30))
                .build()
                .unwrap_or_else(|_| Client::new()),
        }
    }

    async fn call<T: serde::de::DeserializeOwned>(
        &self,
        method: &str,
        params: serde_json::Value,
    ) -> Result<T, SourceError> {
        let payload = json!({
            "jsonrpc": "2.0",
            "id": 1,
            "method": method,
            "params": params,
        });

        let resp: RpcResponse<T> = self
            .client
            .post(&self.rpc_url)
            .json(&payload)
            .send()
            .await?
            .json()
            .await?;

        if let Some(err) = resp.error {
            return Err(SourceError::Rpc {
                code: err.code,
                message: err.message,
            });
        }

        resp.result
            .ok_or_else(|| SourceError::Malformed("missing result in RPC response".to_string()))
    }
}

#[async_trait]
impl LedgerSource for RpcLedgerSource {
    async fn confirmed_height(&self) -> Result<u64, SourceError> {
        let result: GetHeightResult = self.call("escrow_getHeight", json!({})).await?;
        Ok(result.height.saturating_sub(self.confirmation_depth))
    }

    async fn events_in_range(&self, from: u64, to: u64) -> Result<Vec<LogEvent>, SourceError> {
        let result: GetEventsResult = self
            .call(
                "escrow_getEvents",
                json!({
                    "contract": self.contract_address,
                    "fromHeight": from,
                    "toHeight": to,
                }),
            )
            .await?;

        let mut events = result.events;
        // The node is expected to return log order, but the replica depends
        // on it, so enforce it here.
        events.sort_by_key(|e| (e.height, e.log_index));
        Ok(events)
    }

    async fn canonical_record(&self, id: u64) -> Result<Option<EscrowRecord>, SourceError> {
        let result: GetRecordResult = self
            .call(
                "escrow_getRecord",
                json!({
                    "contract": self.contract_address,
                    "id": id,
                }),
            )
            .await?;
        Ok(result.record)
    }
}
