//! Event indexer: reconciles the replica with authoritative ledger state.
//!
//! One `ChainIndexer` per configured chain, each serialized with itself
//! (a cycle never overlaps the previous one for the same chain) while
//! different chains run concurrently and share no mutable state. The
//! replica and its cursor have exactly one writer: this module.

use anyhow::{anyhow, Context, Result};
use paywarden_ledger::{EscrowEventKind, EscrowRecord, LogEvent};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::MissedTickBehavior;

pub mod source;
pub mod types;

pub use source::{LedgerSource, RpcLedgerSource, SourceError};

use crate::config::Config;
use crate::escrow::{EscrowRow, PgReplicaStore, ReplicaStore};
use crate::notifier::{Notification, NotificationKind, Notifier};

/// Supervisor that runs one indexer task per chain source.
pub struct IndexerService {
    config: Config,
    replica: Arc<dyn ReplicaStore>,
    notifier: Arc<dyn Notifier>,
}

impl IndexerService {
    pub fn new(config: Config, pool: sqlx::PgPool, notifier: Arc<dyn Notifier>) -> Self {
        Self {
            config,
            replica: Arc::new(PgReplicaStore::new(pool)),
            notifier,
        }
    }

    pub async fn start(self) {
        tracing::info!("Starting ledger indexer service...");

        let handles: Vec<_> = self
            .config
            .chain_sources
            .iter()
            .map(|source| {
                let indexer = ChainIndexer::new(
                    source.chain_id,
                    Arc::new(RpcLedgerSource::new(
                        source.rpc_url.clone(),
                        self.config.contract_address.clone(),
                        self.config.confirmation_depth,
                    )),
                    self.replica.clone(),
                    self.notifier.clone(),
                );
                let poll_interval = Duration::from_secs(self.config.poll_interval_secs);
                tokio::spawn(async move { indexer.run(poll_interval).await })
            })
            .collect();

        for handle in handles {
            let _ = handle.await;
        }
    }
}

/// Indexer for a single chain source.
pub struct ChainIndexer {
    chain_id: u64,
    source: Arc<dyn LedgerSource>,
    replica: Arc<dyn ReplicaStore>,
    notifier: Arc<dyn Notifier>,
    // Serializes cycles for this chain; a tick is skipped when the
    // previous cycle is still in flight.
    busy: tokio::sync::Mutex<()>,
}

impl ChainIndexer {
    pub fn new(
        chain_id: u64,
        source: Arc<dyn LedgerSource>,
        replica: Arc<dyn ReplicaStore>,
        notifier: Arc<dyn Notifier>,
    ) -> Self {
        Self {
            chain_id,
            source,
            replica,
            notifier,
            busy: tokio::sync::Mutex::new(()),
        }
    }

    pub async fn run(&self, poll_interval: Duration) {
        tracing::info!(chain_id = self.chain_id, "Indexer started");

        let mut ticker = tokio::time::interval(poll_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            ticker.tick().await;
            match self.busy.try_lock() {
                Ok(_guard) => {
                    if let Err(e) = self.run_cycle().await {
                        tracing::error!(chain_id = self.chain_id, error = %e, "Indexing cycle failed; will retry");
                    }
                }
                Err(_) => {
                    tracing::debug!(chain_id = self.chain_id, "Previous cycle still in flight, skipping tick");
                }
            }
        }
    }

    /// One polling cycle: apply every confirmed event past the cursor.
    ///
    /// The cursor advances only over fully-applied heights; a failure
    /// leaves it at the last completed height so the next cycle retries
    /// the remainder. Re-application is safe because every write is
    /// idempotent.
    pub async fn run_cycle(&self) -> Result<()> {
        let cursor = self.replica.cursor(self.chain_id).await?.unwrap_or(0);
        let from = cursor + 1;
        let to = self.source.confirmed_height().await?;

        if from > to {
            return Ok(());
        }

        let events = self.source.events_in_range(from, to).await?;
        if events.is_empty() {
            self.replica.set_cursor(self.chain_id, to).await?;
            return Ok(());
        }

        tracing::debug!(
            chain_id = self.chain_id,
            from,
            to,
            count = events.len(),
            "Applying event window"
        );

        // Events sharing a height are applied as a unit: the cursor only
        // ever points at height boundaries.
        let mut applied_through = cursor;
        let mut idx = 0;
        while idx < events.len() {
            let height = events[idx].height;
            let group_end = idx
                + events[idx..]
                    .iter()
                    .take_while(|e| e.height == height)
                    .count();

            for event in &events[idx..group_end] {
                if let Err(e) = self.apply_event(event).await {
                    tracing::error!(
                        chain_id = self.chain_id,
                        height = event.height,
                        log_index = event.log_index,
                        error = %e,
                        "Failed to apply event; halting window"
                    );
                    if applied_through > cursor {
                        self.replica
                            .set_cursor(self.chain_id, applied_through)
                            .await?;
                    }
                    return Err(e);
                }
            }

            applied_through = height;
            idx = group_end;
        }

        self.replica.set_cursor(self.chain_id, to).await?;
        Ok(())
    }

    async fn apply_event(&self, event: &LogEvent) -> Result<()> {
        match &event.kind {
            EscrowEventKind::Created { id, .. } => self.apply_creation(event, *id).await,
            EscrowEventKind::Funded { id } => {
                self.apply_transition(event, *id, None, NotificationKind::Funded)
                    .await
            }
            EscrowEventKind::Released { id, fee_amount } => {
                let fee = i64::try_from(*fee_amount).map_err(|_| anyhow!("fee amount too large"))?;
                self.apply_transition(event, *id, Some(fee), NotificationKind::Released)
                    .await
            }
            EscrowEventKind::Refunded { id } => {
                self.apply_transition(event, *id, None, NotificationKind::Refunded)
                    .await
            }
            EscrowEventKind::Disputed { id } => {
                self.apply_transition(event, *id, None, NotificationKind::Disputed)
                    .await
            }
            EscrowEventKind::Cancelled { id } => {
                self.apply_transition(event, *id, None, NotificationKind::Cancelled)
                    .await
            }
            // Advisory: the settlement lands as a Released/Refunded event
            // in the same height.
            EscrowEventKind::DisputeResolved { id, favor_client } => {
                tracing::debug!(
                    chain_id = self.chain_id,
                    escrow_id = id,
                    favor_client,
                    "Dispute resolution observed"
                );
                Ok(())
            }
            EscrowEventKind::EmergencyDrained { asset, to, amount } => {
                tracing::warn!(
                    chain_id = self.chain_id,
                    ?asset,
                    to = %to,
                    amount,
                    "Emergency drain observed"
                );
                Ok(())
            }
        }
    }

    /// Insert a new replica record, or skip if it already exists
    /// (duplicate delivery / window redo).
    async fn apply_creation(&self, event: &LogEvent, id: u64) -> Result<()> {
        if self.replica.get(self.chain_id, id).await?.is_some() {
            tracing::debug!(
                chain_id = self.chain_id,
                escrow_id = id,
                "Creation already replicated, skipping"
            );
            return Ok(());
        }

        // The event payload is complete except for the description; a
        // canonical read fills the gaps.
        let row = match self.source.canonical_record(id).await? {
            Some(record) => {
                EscrowRow::from_canonical(self.chain_id, &record, &event.tx_hash, event.height)?
            }
            None => {
                tracing::warn!(
                    chain_id = self.chain_id,
                    escrow_id = id,
                    "Canonical record missing for creation event, using event payload"
                );
                self.row_from_creation_event(event, id)?
            }
        };

        let client = row.client.clone();
        let provider = row.provider.clone();
        if self.replica.insert(row).await? {
            self.notify_parties(&client, &provider, NotificationKind::Created, id, event)
                .await;
        }
        Ok(())
    }

    /// Reconcile a transition with canonical truth. An unknown id is a
    /// missing-creation anomaly and is backfilled rather than failed.
    async fn apply_transition(
        &self,
        event: &LogEvent,
        id: u64,
        fee_amount: Option<i64>,
        kind: NotificationKind,
    ) -> Result<()> {
        let canonical = self
            .source
            .canonical_record(id)
            .await?
            .ok_or_else(|| anyhow!("no canonical record for escrow {id}"))?;

        let (client, provider) = match self.replica.get(self.chain_id, id).await? {
            Some(existing) => {
                self.replica
                    .update_status(
                        self.chain_id,
                        id,
                        canonical.status.into(),
                        fee_amount,
                        &event.tx_hash,
                        event.height,
                    )
                    .await?;
                (existing.client, existing.provider)
            }
            None => {
                tracing::warn!(
                    chain_id = self.chain_id,
                    escrow_id = id,
                    "Transition for unknown record, backfilling from canonical state"
                );
                let mut row = EscrowRow::from_canonical(
                    self.chain_id,
                    &canonical,
                    &event.tx_hash,
                    event.height,
                )?;
                row.fee_amount = fee_amount;
                let (client, provider) = (row.client.clone(), row.provider.clone());
                self.replica.insert(row).await?;
                (client, provider)
            }
        };

        self.notify_parties(&client, &provider, kind, id, event).await;
        Ok(())
    }

    fn row_from_creation_event(&self, event: &LogEvent, id: u64) -> Result<EscrowRow> {
        let EscrowEventKind::Created {
            client,
            provider,
            arbitrator,
            asset,
            amount,
            fee_rate_bps,
            deadline,
            ..
        } = &event.kind
        else {
            return Err(anyhow!("not a creation event"));
        };

        let record = EscrowRecord {
            id,
            client: client.clone(),
            provider: provider.clone(),
            arbitrator: arbitrator.clone(),
            asset: asset.clone(),
            amount: *amount,
            fee_rate_bps: *fee_rate_bps,
            status: paywarden_ledger::EscrowStatus::Created,
            created_at: 0,
            deadline: *deadline,
            description: String::new(),
        };
        EscrowRow::from_canonical(self.chain_id, &record, &event.tx_hash, event.height)
            .context("building row from creation event")
    }

    /// Best-effort notification of both parties: one attempt each,
    /// failures logged and never allowed to abort indexing.
    async fn notify_parties(
        &self,
        client: &str,
        provider: &str,
        kind: NotificationKind,
        escrow_id: u64,
        event: &LogEvent,
    ) {
        let details = serde_json::json!({
            "tx_hash": event.tx_hash,
            "height": event.height,
        });

        for participant in [client, provider] {
            let notification = Notification {
                participant: participant.to_string(),
                kind,
                chain_id: self.chain_id,
                escrow_id,
                details: details.clone(),
            };
            if let Err(e) = self.notifier.notify(notification).await {
                tracing::warn!(
                    chain_id = self.chain_id,
                    escrow_id,
                    participant,
                    error = %e,
                    "Notification delivery failed"
                );
            }
        }
    }
}
