//! Reconciliation tests: indexer against an in-process ledger.
//!
//! These drive the real ledger state machine behind the `LedgerSource`
//! trait and an in-memory replica behind `ReplicaStore`, so the full
//! poll-apply-advance path runs without a database or a node.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use anyhow::Result;
use async_trait::async_trait;

use paywarden_backend::escrow::{EscrowRow, EscrowStatus, ReplicaStore};
use paywarden_backend::indexer::{ChainIndexer, LedgerSource, SourceError};
use paywarden_backend::notifier::{Notification, NotificationKind, Notifier};
use paywarden_ledger::{
    Address, Asset, EscrowLedger, EscrowRecord, LogEvent, NoopBackend, PlatformConfig,
};

const CHAIN: u64 = 1;

// ----- test doubles ---------------------------------------------------------

struct InProcessLedger {
    ledger: Arc<Mutex<EscrowLedger<NoopBackend>>>,
}

#[async_trait]
impl LedgerSource for InProcessLedger {
    async fn confirmed_height(&self) -> Result<u64, SourceError> {
        Ok(self.ledger.lock().unwrap().confirmed_height())
    }

    async fn events_in_range(&self, from: u64, to: u64) -> Result<Vec<LogEvent>, SourceError> {
        Ok(self.ledger.lock().unwrap().events_in_range(from, to))
    }

    async fn canonical_record(&self, id: u64) -> Result<Option<EscrowRecord>, SourceError> {
        Ok(self.ledger.lock().unwrap().record(id).cloned())
    }
}

#[derive(Default)]
struct MemoryReplica {
    rows: Mutex<HashMap<(u64, u64), EscrowRow>>,
    cursors: Mutex<HashMap<u64, u64>>,
    /// When set, the next update_status for this escrow id fails once.
    fail_update_for: Mutex<Option<u64>>,
}

#[async_trait]
impl ReplicaStore for MemoryReplica {
    async fn cursor(&self, chain_id: u64) -> Result<Option<u64>> {
        Ok(self.cursors.lock().unwrap().get(&chain_id).copied())
    }

    async fn set_cursor(&self, chain_id: u64, height: u64) -> Result<()> {
        self.cursors.lock().unwrap().insert(chain_id, height);
        Ok(())
    }

    async fn get(&self, chain_id: u64, escrow_id: u64) -> Result<Option<EscrowRow>> {
        Ok(self
            .rows
            .lock()
            .unwrap()
            .get(&(chain_id, escrow_id))
            .cloned())
    }

    async fn insert(&self, row: EscrowRow) -> Result<bool> {
        let key = (row.chain_id as u64, row.escrow_id as u64);
        let mut rows = self.rows.lock().unwrap();
        if rows.contains_key(&key) {
            return Ok(false);
        }
        rows.insert(key, row);
        Ok(true)
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
        let mut fail = self.fail_update_for.lock().unwrap();
        if *fail == Some(escrow_id) {
            *fail = None;
            anyhow::bail!("injected replica failure");
        }
        drop(fail);

        let mut rows = self.rows.lock().unwrap();
        let row = rows
            .get_mut(&(chain_id, escrow_id))
            .ok_or_else(|| anyhow::anyhow!("row missing"))?;
        row.status = status;
        if fee_amount.is_some() {
            row.fee_amount = fee_amount;
        }
        row.source_tx_hash = source_tx_hash.to_string();
        row.source_height = source_height as i64;
        Ok(())
    }
}

#[derive(Default)]
struct RecordingNotifier {
    sent: Mutex<Vec<Notification>>,
    fail_all: bool,
}

#[async_trait]
impl Notifier for RecordingNotifier {
    async fn notify(&self, notification: Notification) -> Result<()> {
        if self.fail_all {
            anyhow::bail!("sink unavailable");
        }
        self.sent.lock().unwrap().push(notification);
        Ok(())
    }
}

// ----- helpers --------------------------------------------------------------

fn addr(s: &str) -> Address {
    Address::new(s)
}

fn new_ledger() -> Arc<Mutex<EscrowLedger<NoopBackend>>> {
    let config = PlatformConfig::new(addr("owner"), addr("collector"), 250).unwrap();
    let mut ledger = EscrowLedger::new(config, NoopBackend);
    ledger.set_now(1_000);
    Arc::new(Mutex::new(ledger))
}

struct Harness {
    ledger: Arc<Mutex<EscrowLedger<NoopBackend>>>,
    replica: Arc<MemoryReplica>,
    notifier: Arc<RecordingNotifier>,
    indexer: ChainIndexer,
}

fn harness_with_notifier(notifier: RecordingNotifier) -> Harness {
    let ledger = new_ledger();
    let replica = Arc::new(MemoryReplica::default());
    let notifier = Arc::new(notifier);
    let indexer = ChainIndexer::new(
        CHAIN,
        Arc::new(InProcessLedger {
            ledger: ledger.clone(),
        }),
        replica.clone(),
        notifier.clone(),
    );
    Harness {
        ledger,
        replica,
        notifier,
        indexer,
    }
}

fn harness() -> Harness {
    harness_with_notifier(RecordingNotifier::default())
}

fn create_funded(ledger: &Arc<Mutex<EscrowLedger<NoopBackend>>>, amount: u128) -> u64 {
    let mut ledger = ledger.lock().unwrap();
    let id = ledger
        .create(
            &addr("alice"),
            addr("bob"),
            None,
            Asset::Native,
            amount,
            None,
            "deliverable".into(),
        )
        .unwrap();
    ledger.fund(&addr("alice"), id, amount).unwrap();
    id
}

// ----- tests ----------------------------------------------------------------

#[tokio::test]
async fn full_lifecycle_is_mirrored() {
    let h = harness();
    let id = create_funded(&h.ledger, 1_000_000);
    h.ledger
        .lock()
        .unwrap()
        .release(&addr("alice"), id)
        .unwrap();

    h.indexer.run_cycle().await.unwrap();

    let row = h.replica.get(CHAIN, id).await.unwrap().unwrap();
    assert_eq!(row.status, EscrowStatus::Released);
    assert_eq!(row.client, "alice");
    assert_eq!(row.provider, "bob");
    assert_eq!(row.amount, 1_000_000);
    assert_eq!(row.fee_rate_bps, 250);
    assert_eq!(row.fee_amount, Some(25_000));
    assert_eq!(row.description, "deliverable");

    // Cursor lands on the confirmed tip.
    assert_eq!(h.replica.cursor(CHAIN).await.unwrap(), Some(3));

    // Both parties were notified of each transition.
    let sent = h.notifier.sent.lock().unwrap();
    let to_alice: Vec<NotificationKind> = sent
        .iter()
        .filter(|n| n.participant == "alice")
        .map(|n| n.kind)
        .collect();
    assert_eq!(
        to_alice,
        vec![
            NotificationKind::Created,
            NotificationKind::Funded,
            NotificationKind::Released
        ]
    );
    assert_eq!(sent.iter().filter(|n| n.participant == "bob").count(), 3);
}

#[tokio::test]
async fn replaying_a_window_is_idempotent() {
    let h = harness();
    let id = create_funded(&h.ledger, 500);

    h.indexer.run_cycle().await.unwrap();
    assert_eq!(h.replica.rows.lock().unwrap().len(), 1);

    // Simulate a crash before the cursor persisted: redo the whole window.
    h.replica.set_cursor(CHAIN, 0).await.unwrap();
    h.indexer.run_cycle().await.unwrap();

    let rows = h.replica.rows.lock().unwrap();
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[&(CHAIN, id)].status, EscrowStatus::Funded);
}

#[tokio::test]
async fn unknown_record_transition_backfills_from_canonical() {
    let h = harness();
    let id = create_funded(&h.ledger, 750);
    h.ledger
        .lock()
        .unwrap()
        .release(&addr("alice"), id)
        .unwrap();

    // Pretend creation and funding were processed before a replica wipe:
    // the cycle starts at the release event only.
    h.replica.set_cursor(CHAIN, 2).await.unwrap();
    h.indexer.run_cycle().await.unwrap();

    // The backfilled record is fully populated, not partial.
    let row = h.replica.get(CHAIN, id).await.unwrap().unwrap();
    assert_eq!(row.status, EscrowStatus::Released);
    assert_eq!(row.client, "alice");
    assert_eq!(row.provider, "bob");
    assert_eq!(row.amount, 750);
    assert_eq!(row.description, "deliverable");
    assert_eq!(row.fee_amount, Some(18)); // floor(750 * 250 / 10000)
}

#[tokio::test]
async fn failure_halts_window_at_last_applied_height() {
    let h = harness();
    let first = create_funded(&h.ledger, 100); // heights 1, 2
    let second = create_funded(&h.ledger, 200); // heights 3, 4

    // First funded-update for the second escrow fails.
    *h.replica.fail_update_for.lock().unwrap() = Some(second);
    assert!(h.indexer.run_cycle().await.is_err());

    // Cursor stops after the second escrow's creation (height 3); the
    // first escrow is fully applied.
    assert_eq!(h.replica.cursor(CHAIN).await.unwrap(), Some(3));
    let row = h.replica.get(CHAIN, first).await.unwrap().unwrap();
    assert_eq!(row.status, EscrowStatus::Funded);
    let row = h.replica.get(CHAIN, second).await.unwrap().unwrap();
    assert_eq!(row.status, EscrowStatus::Created);

    // Next cycle retries only the remainder and converges.
    h.indexer.run_cycle().await.unwrap();
    assert_eq!(h.replica.cursor(CHAIN).await.unwrap(), Some(4));
    let row = h.replica.get(CHAIN, second).await.unwrap().unwrap();
    assert_eq!(row.status, EscrowStatus::Funded);
}

#[tokio::test]
async fn notifier_failures_never_abort_indexing() {
    let h = harness_with_notifier(RecordingNotifier {
        fail_all: true,
        ..Default::default()
    });
    let id = create_funded(&h.ledger, 300);

    h.indexer.run_cycle().await.unwrap();

    assert_eq!(h.replica.cursor(CHAIN).await.unwrap(), Some(2));
    let row = h.replica.get(CHAIN, id).await.unwrap().unwrap();
    assert_eq!(row.status, EscrowStatus::Funded);
    assert!(h.notifier.sent.lock().unwrap().is_empty());
}

#[tokio::test]
async fn dispute_resolution_settles_in_one_height() {
    let h = harness();
    {
        let mut ledger = h.ledger.lock().unwrap();
        ledger.add_arbitrator(&addr("owner"), addr("judge")).unwrap();
    }
    let id = create_funded(&h.ledger, 1_000);
    {
        let mut ledger = h.ledger.lock().unwrap();
        ledger.open_dispute(&addr("bob"), id).unwrap();
        ledger.resolve_dispute(&addr("judge"), id, true).unwrap();
    }

    h.indexer.run_cycle().await.unwrap();

    let row = h.replica.get(CHAIN, id).await.unwrap().unwrap();
    assert_eq!(row.status, EscrowStatus::Refunded);
    // Refunds never realize a fee.
    assert_eq!(row.fee_amount, None);
    assert_eq!(h.replica.cursor(CHAIN).await.unwrap(), Some(4));
}

#[tokio::test]
async fn empty_window_is_a_no_op() {
    let h = harness();
    create_funded(&h.ledger, 100);

    h.indexer.run_cycle().await.unwrap();
    let cursor = h.replica.cursor(CHAIN).await.unwrap();

    // Nothing new on the ledger: cursor and replica unchanged.
    h.indexer.run_cycle().await.unwrap();
    assert_eq!(h.replica.cursor(CHAIN).await.unwrap(), cursor);
    assert_eq!(h.replica.rows.lock().unwrap().len(), 1);
}
