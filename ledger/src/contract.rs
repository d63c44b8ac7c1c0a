//! The escrow ledger state machine.
//!
//! All fund custody and status transitions live here. Calls execute
//! serialized, to completion, in the order submitted; each successful
//! mutation occupies its own height in the event log. External value
//! movement goes through an [`AssetBackend`], and state is finalized
//! before any backend call (checks-effects-interactions) with an explicit
//! execution lock held across the transfer section.

use std::collections::BTreeMap;

use crate::error::{LedgerError, TransferError};
use crate::event::{EscrowEventKind, LogEvent};
use crate::policy::{fee_split, PlatformConfig};
use crate::record::{Address, Asset, EscrowRecord, EscrowStatus};

/// Capability interface for moving value per asset variant.
///
/// `transfer_in` pulls tokens from a holder into escrow custody (the
/// native variant never uses it: native value arrives attached to the
/// call). `transfer_out` pays out of escrow custody.
pub trait AssetBackend {
    fn transfer_in(
        &mut self,
        asset: &Asset,
        from: &Address,
        amount: u128,
    ) -> Result<(), TransferError>;

    fn transfer_out(
        &mut self,
        asset: &Asset,
        to: &Address,
        amount: u128,
    ) -> Result<(), TransferError>;
}

/// Backend where every transfer succeeds. For wiring tests and demos.
#[derive(Debug, Default, Clone)]
pub struct NoopBackend;

impl AssetBackend for NoopBackend {
    fn transfer_in(&mut self, _: &Asset, _: &Address, _: u128) -> Result<(), TransferError> {
        Ok(())
    }

    fn transfer_out(&mut self, _: &Asset, _: &Address, _: u128) -> Result<(), TransferError> {
        Ok(())
    }
}

/// The authoritative escrow ledger.
pub struct EscrowLedger<B: AssetBackend> {
    config: PlatformConfig,
    backend: B,
    records: BTreeMap<u64, EscrowRecord>,
    collected_fees: BTreeMap<Asset, u128>,
    log: Vec<LogEvent>,
    next_id: u64,
    height: u64,
    now: u64,
    entered: bool,
}

impl<B: AssetBackend> EscrowLedger<B> {
    pub fn new(config: PlatformConfig, backend: B) -> Self {
        EscrowLedger {
            config,
            backend,
            records: BTreeMap::new(),
            collected_fees: BTreeMap::new(),
            log: Vec::new(),
            next_id: 0,
            height: 0,
            now: 0,
            entered: false,
        }
    }

    // ----- read surface ----------------------------------------------------

    pub fn record(&self, id: u64) -> Option<&EscrowRecord> {
        self.records.get(&id)
    }

    /// Height of the last applied mutation. Everything at or below this
    /// height is final.
    pub fn confirmed_height(&self) -> u64 {
        self.height
    }

    pub fn events(&self) -> &[LogEvent] {
        &self.log
    }

    /// Events with `from <= height <= to`, in `(height, log_index)` order.
    pub fn events_in_range(&self, from: u64, to: u64) -> Vec<LogEvent> {
        self.log
            .iter()
            .filter(|e| e.height >= from && e.height <= to)
            .cloned()
            .collect()
    }

    /// Cumulative fees collected for an asset.
    pub fn collected_fees(&self, asset: &Asset) -> u128 {
        self.collected_fees.get(asset).copied().unwrap_or(0)
    }

    pub fn config(&self) -> &PlatformConfig {
        &self.config
    }

    /// Ledger time, used for `created_at` and deadline validation.
    pub fn set_now(&mut self, now: u64) {
        self.now = now;
    }

    // ----- escrow operations -----------------------------------------------

    /// Create a new escrow in CREATED status and return its id.
    ///
    /// Snapshots the current default fee rate; later changes to the default
    /// never affect this record.
    pub fn create(
        &mut self,
        caller: &Address,
        provider: Address,
        arbitrator: Option<Address>,
        asset: Asset,
        amount: u128,
        deadline: Option<u64>,
        description: String,
    ) -> Result<u64, LedgerError> {
        if provider.as_str().is_empty() {
            return Err(LedgerError::InvalidParty("provider is unset".into()));
        }
        if provider == *caller {
            return Err(LedgerError::InvalidParty(
                "provider must differ from client".into(),
            ));
        }
        if amount == 0 {
            return Err(LedgerError::InvalidAmount);
        }
        if let Some(d) = deadline {
            if d <= self.now {
                return Err(LedgerError::InvalidDeadline);
            }
        }

        let id = self.next_id;
        self.next_id += 1;

        let record = EscrowRecord {
            id,
            client: caller.clone(),
            provider: provider.clone(),
            arbitrator: arbitrator.clone(),
            asset: asset.clone(),
            amount,
            fee_rate_bps: self.config.default_fee_bps(),
            status: EscrowStatus::Created,
            created_at: self.now,
            deadline,
            description,
        };
        self.records.insert(id, record);

        let height = self.advance_height();
        self.emit(
            height,
            0,
            EscrowEventKind::Created {
                id,
                client: caller.clone(),
                provider,
                arbitrator,
                asset,
                amount,
                fee_rate_bps: self.config.default_fee_bps(),
                deadline,
            },
        );
        Ok(id)
    }

    /// Deposit the principal. Caller must be the client, record must be
    /// CREATED.
    ///
    /// Native escrows require the attached value to equal the principal
    /// exactly; token escrows reject any attached value and pull the
    /// principal from the client through the asset backend.
    pub fn fund(
        &mut self,
        caller: &Address,
        id: u64,
        attached_value: u128,
    ) -> Result<(), LedgerError> {
        let record = self.records.get(&id).ok_or(LedgerError::NotFound(id))?;
        if record.client != *caller {
            return Err(LedgerError::Unauthorized);
        }
        if record.status != EscrowStatus::Created {
            return Err(LedgerError::InvalidState {
                actual: record.status,
            });
        }

        let asset = record.asset.clone();
        let amount = record.amount;
        match asset {
            Asset::Native => {
                if attached_value != amount {
                    return Err(LedgerError::AmountMismatch {
                        expected: amount,
                        actual: attached_value,
                    });
                }
            }
            Asset::Token(_) => {
                if attached_value != 0 {
                    return Err(LedgerError::UnexpectedValue);
                }
                // External pull; guarded against reentrant re-invocation.
                self.acquire_lock()?;
                let pulled = self.backend.transfer_in(&asset, caller, amount);
                self.release_lock();
                pulled?;
            }
        }

        self.set_status(id, EscrowStatus::Funded);

        let height = self.advance_height();
        self.emit(height, 0, EscrowEventKind::Funded { id });
        Ok(())
    }

    /// Pay out a FUNDED escrow: fee to the collector, remainder to the
    /// provider. Caller must be the client or an authorized arbitrator.
    pub fn release(&mut self, caller: &Address, id: u64) -> Result<(), LedgerError> {
        let record = self.records.get(&id).ok_or(LedgerError::NotFound(id))?;
        if record.client != *caller && !self.config.is_arbitrator_for(caller, record) {
            return Err(LedgerError::Unauthorized);
        }
        if record.status != EscrowStatus::Funded {
            return Err(LedgerError::InvalidState {
                actual: record.status,
            });
        }

        let fee_amount = self.settle_release(id)?;
        let height = self.advance_height();
        self.emit(height, 0, EscrowEventKind::Released { id, fee_amount });
        Ok(())
    }

    /// Return the full principal (no fee) to the client. Arbitrator only;
    /// record must be FUNDED or DISPUTED.
    pub fn refund(&mut self, caller: &Address, id: u64) -> Result<(), LedgerError> {
        let record = self.records.get(&id).ok_or(LedgerError::NotFound(id))?;
        if !self.config.is_arbitrator_for(caller, record) {
            return Err(LedgerError::Unauthorized);
        }
        if !matches!(record.status, EscrowStatus::Funded | EscrowStatus::Disputed) {
            return Err(LedgerError::InvalidState {
                actual: record.status,
            });
        }

        self.settle_refund(id)?;
        let height = self.advance_height();
        self.emit(height, 0, EscrowEventKind::Refunded { id });
        Ok(())
    }

    /// Move a FUNDED escrow into DISPUTED. Client or provider only. No fund
    /// movement.
    pub fn open_dispute(&mut self, caller: &Address, id: u64) -> Result<(), LedgerError> {
        let record = self.records.get_mut(&id).ok_or(LedgerError::NotFound(id))?;
        if record.client != *caller && record.provider != *caller {
            return Err(LedgerError::Unauthorized);
        }
        if record.status != EscrowStatus::Funded {
            return Err(LedgerError::InvalidState {
                actual: record.status,
            });
        }

        record.status = EscrowStatus::Disputed;
        let height = self.advance_height();
        self.emit(height, 0, EscrowEventKind::Disputed { id });
        Ok(())
    }

    /// Settle a DISPUTED escrow. Arbitrator only. `favor_client` refunds,
    /// otherwise releases (fee applies only on the release path).
    ///
    /// The resolution intent is logged before settlement so it stays
    /// observable even when the delegated transfer fails; the status change
    /// itself is atomic and remains DISPUTED on failure.
    pub fn resolve_dispute(
        &mut self,
        caller: &Address,
        id: u64,
        favor_client: bool,
    ) -> Result<(), LedgerError> {
        let record = self.records.get(&id).ok_or(LedgerError::NotFound(id))?;
        if !self.config.is_arbitrator_for(caller, record) {
            return Err(LedgerError::Unauthorized);
        }
        if record.status != EscrowStatus::Disputed {
            return Err(LedgerError::InvalidState {
                actual: record.status,
            });
        }

        let height = self.advance_height();
        self.emit(height, 0, EscrowEventKind::DisputeResolved { id, favor_client });

        if favor_client {
            self.settle_refund(id)?;
            self.emit(height, 1, EscrowEventKind::Refunded { id });
        } else {
            let fee_amount = self.settle_release(id)?;
            self.emit(height, 1, EscrowEventKind::Released { id, fee_amount });
        }
        Ok(())
    }

    /// Abandon a never-funded escrow. Client only; record must be CREATED.
    pub fn cancel(&mut self, caller: &Address, id: u64) -> Result<(), LedgerError> {
        let record = self.records.get_mut(&id).ok_or(LedgerError::NotFound(id))?;
        if record.client != *caller {
            return Err(LedgerError::Unauthorized);
        }
        if record.status != EscrowStatus::Created {
            return Err(LedgerError::InvalidState {
                actual: record.status,
            });
        }

        record.status = EscrowStatus::Cancelled;
        let height = self.advance_height();
        self.emit(height, 0, EscrowEventKind::Cancelled { id });
        Ok(())
    }

    // ----- owner operations ------------------------------------------------

    pub fn set_default_fee(&mut self, caller: &Address, bps: u16) -> Result<(), LedgerError> {
        self.config.set_default_fee(caller, bps)
    }

    pub fn set_fee_collector(
        &mut self,
        caller: &Address,
        collector: Address,
    ) -> Result<(), LedgerError> {
        self.config.set_fee_collector(caller, collector)
    }

    pub fn add_arbitrator(&mut self, caller: &Address, arbitrator: Address) -> Result<(), LedgerError> {
        self.config.add_arbitrator(caller, arbitrator)
    }

    pub fn remove_arbitrator(
        &mut self,
        caller: &Address,
        arbitrator: &Address,
    ) -> Result<(), LedgerError> {
        self.config.remove_arbitrator(caller, arbitrator)
    }

    /// Operator recovery of a stuck balance. Owner only, irreversible,
    /// logged. Not part of any normal flow.
    pub fn emergency_drain(
        &mut self,
        caller: &Address,
        asset: Asset,
        to: Address,
        amount: u128,
    ) -> Result<(), LedgerError> {
        self.config.require_owner(caller)?;

        self.acquire_lock()?;
        let result = self.backend.transfer_out(&asset, &to, amount);
        self.release_lock();
        result?;

        let height = self.advance_height();
        self.emit(height, 0, EscrowEventKind::EmergencyDrained { asset, to, amount });
        Ok(())
    }

    // ----- settlement helpers ----------------------------------------------

    /// Shared release path for `release` and `resolve_dispute`.
    ///
    /// Status goes to RELEASED before any transfer; a transfer failure
    /// restores the prior status so the whole unit is all-or-nothing.
    /// Returns the realized fee amount.
    fn settle_release(&mut self, id: u64) -> Result<u128, LedgerError> {
        let record = self.records.get(&id).ok_or(LedgerError::NotFound(id))?;
        let (provider_amount, fee_amount) = fee_split(record.amount, record.fee_rate_bps)?;
        let asset = record.asset.clone();
        let provider = record.provider.clone();
        let collector = self.config.fee_collector.clone();
        let prior = record.status;

        self.acquire_lock()?;
        self.set_status(id, EscrowStatus::Released);

        let transferred = self
            .backend
            .transfer_out(&asset, &provider, provider_amount)
            .and_then(|_| {
                if fee_amount > 0 {
                    self.backend.transfer_out(&asset, &collector, fee_amount)
                } else {
                    Ok(())
                }
            });
        self.release_lock();

        if let Err(e) = transferred {
            self.set_status(id, prior);
            return Err(e.into());
        }

        *self.collected_fees.entry(asset).or_insert(0) += fee_amount;
        Ok(fee_amount)
    }

    /// Shared refund path for `refund` and `resolve_dispute`. Returns the
    /// full principal to the client, never deducting a fee.
    fn settle_refund(&mut self, id: u64) -> Result<(), LedgerError> {
        let record = self.records.get(&id).ok_or(LedgerError::NotFound(id))?;
        let asset = record.asset.clone();
        let client = record.client.clone();
        let amount = record.amount;
        let prior = record.status;

        self.acquire_lock()?;
        self.set_status(id, EscrowStatus::Refunded);
        let transferred = self.backend.transfer_out(&asset, &client, amount);
        self.release_lock();

        if let Err(e) = transferred {
            self.set_status(id, prior);
            return Err(e.into());
        }
        Ok(())
    }

    fn set_status(&mut self, id: u64, status: EscrowStatus) {
        if let Some(record) = self.records.get_mut(&id) {
            record.status = status;
        }
    }

    // ----- log plumbing ----------------------------------------------------

    fn advance_height(&mut self) -> u64 {
        self.height += 1;
        self.height
    }

    fn emit(&mut self, height: u64, log_index: u32, kind: EscrowEventKind) {
        self.log.push(LogEvent {
            height,
            log_index,
            tx_hash: format!("{:#018x}", height),
            kind,
        });
    }

    fn acquire_lock(&mut self) -> Result<(), LedgerError> {
        if self.entered {
            return Err(LedgerError::ReentrantCall);
        }
        self.entered = true;
        Ok(())
    }

    fn release_lock(&mut self) {
        self.entered = false;
    }
}
