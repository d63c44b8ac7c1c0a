//! Fee policy and access control.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use crate::error::LedgerError;
use crate::record::{Address, EscrowRecord};

/// Upper bound on any fee rate, in basis points (10%).
pub const MAX_FEE_BPS: u16 = 1000;

/// Split `amount` into `(provider_amount, fee_amount)` at `fee_rate_bps`.
///
/// Fee is truncating: `fee = floor(amount * rate / 10000)`. The two parts
/// always sum back to `amount` exactly. Overflow is a fatal validation
/// error, never wraparound.
pub fn fee_split(amount: u128, fee_rate_bps: u16) -> Result<(u128, u128), LedgerError> {
    let fee = amount
        .checked_mul(fee_rate_bps as u128)
        .ok_or(LedgerError::Overflow)?
        / 10_000;
    Ok((amount - fee, fee))
}

/// Platform-level configuration owned by the ledger.
///
/// Replaces the original singleton access-control object: the owner identity
/// is an explicit field compared on each privileged call, and the arbitrator
/// registry is a plain set with owner-gated membership.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlatformConfig {
    pub owner: Address,
    pub fee_collector: Address,
    default_fee_bps: u16,
    arbitrators: BTreeSet<Address>,
}

impl PlatformConfig {
    pub fn new(owner: Address, fee_collector: Address, default_fee_bps: u16) -> Result<Self, LedgerError> {
        if default_fee_bps > MAX_FEE_BPS {
            return Err(LedgerError::FeeTooHigh {
                requested: default_fee_bps,
                max: MAX_FEE_BPS,
            });
        }
        Ok(PlatformConfig {
            owner,
            fee_collector,
            default_fee_bps,
            arbitrators: BTreeSet::new(),
        })
    }

    pub fn default_fee_bps(&self) -> u16 {
        self.default_fee_bps
    }

    pub fn require_owner(&self, caller: &Address) -> Result<(), LedgerError> {
        if *caller != self.owner {
            return Err(LedgerError::Unauthorized);
        }
        Ok(())
    }

    /// Change the default fee for records created from now on. Existing
    /// records keep their snapshotted rate.
    pub fn set_default_fee(&mut self, caller: &Address, bps: u16) -> Result<(), LedgerError> {
        self.require_owner(caller)?;
        if bps > MAX_FEE_BPS {
            return Err(LedgerError::FeeTooHigh {
                requested: bps,
                max: MAX_FEE_BPS,
            });
        }
        self.default_fee_bps = bps;
        Ok(())
    }

    pub fn set_fee_collector(&mut self, caller: &Address, collector: Address) -> Result<(), LedgerError> {
        self.require_owner(caller)?;
        self.fee_collector = collector;
        Ok(())
    }

    pub fn add_arbitrator(&mut self, caller: &Address, arbitrator: Address) -> Result<(), LedgerError> {
        self.require_owner(caller)?;
        self.arbitrators.insert(arbitrator);
        Ok(())
    }

    pub fn remove_arbitrator(&mut self, caller: &Address, arbitrator: &Address) -> Result<(), LedgerError> {
        self.require_owner(caller)?;
        self.arbitrators.remove(arbitrator);
        Ok(())
    }

    pub fn is_registered_arbitrator(&self, who: &Address) -> bool {
        self.arbitrators.contains(who)
    }

    /// Whether `caller` may take arbitrator-gated action on `record`.
    ///
    /// Either global registry membership or the record's own arbitrator
    /// assignment suffices; assignment alone grants authority with no
    /// acceptance step.
    pub fn is_arbitrator_for(&self, caller: &Address, record: &EscrowRecord) -> bool {
        self.is_registered_arbitrator(caller) || record.arbitrator.as_ref() == Some(caller)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::{Asset, EscrowStatus};

    fn addr(s: &str) -> Address {
        Address::new(s)
    }

    fn record_with_arbitrator(arbitrator: Option<Address>) -> EscrowRecord {
        EscrowRecord {
            id: 0,
            client: addr("client"),
            provider: addr("provider"),
            arbitrator,
            asset: Asset::Native,
            amount: 1_000,
            fee_rate_bps: 250,
            status: EscrowStatus::Funded,
            created_at: 100,
            deadline: None,
            description: String::new(),
        }
    }

    #[test]
    fn fee_split_truncates_and_conserves() {
        let (provider, fee) = fee_split(1_000_000, 250).unwrap();
        assert_eq!(provider, 975_000);
        assert_eq!(fee, 25_000);

        // Remainder stays with the provider.
        let (provider, fee) = fee_split(999, 250).unwrap();
        assert_eq!(fee, 24); // floor(999 * 250 / 10000) = 24.975 -> 24
        assert_eq!(provider + fee, 999);

        let (provider, fee) = fee_split(1, 9999).unwrap();
        assert_eq!(fee, 0);
        assert_eq!(provider, 1);
    }

    #[test]
    fn fee_split_overflow_is_fatal() {
        assert_eq!(fee_split(u128::MAX, 2).unwrap_err(), LedgerError::Overflow);
    }

    #[test]
    fn default_fee_bounded() {
        let mut config = PlatformConfig::new(addr("owner"), addr("fees"), 250).unwrap();
        assert_eq!(
            config.set_default_fee(&addr("owner"), 1001).unwrap_err(),
            LedgerError::FeeTooHigh { requested: 1001, max: 1000 }
        );
        // Unchanged after the rejected update.
        assert_eq!(config.default_fee_bps(), 250);

        config.set_default_fee(&addr("owner"), 1000).unwrap();
        assert_eq!(config.default_fee_bps(), 1000);
    }

    #[test]
    fn owner_gates_privileged_calls() {
        let mut config = PlatformConfig::new(addr("owner"), addr("fees"), 250).unwrap();
        assert_eq!(
            config.set_default_fee(&addr("mallory"), 100).unwrap_err(),
            LedgerError::Unauthorized
        );
        assert_eq!(
            config.add_arbitrator(&addr("mallory"), addr("arb")).unwrap_err(),
            LedgerError::Unauthorized
        );
    }

    #[test]
    fn registry_membership_toggles() {
        let mut config = PlatformConfig::new(addr("owner"), addr("fees"), 250).unwrap();
        let arb = addr("arb");

        assert!(!config.is_registered_arbitrator(&arb));
        config.add_arbitrator(&addr("owner"), arb.clone()).unwrap();
        assert!(config.is_registered_arbitrator(&arb));
        config.remove_arbitrator(&addr("owner"), &arb).unwrap();
        assert!(!config.is_registered_arbitrator(&arb));
    }

    #[test]
    fn per_record_arbitrator_suffices() {
        let config = PlatformConfig::new(addr("owner"), addr("fees"), 250).unwrap();
        let record = record_with_arbitrator(Some(addr("judge")));

        assert!(config.is_arbitrator_for(&addr("judge"), &record));
        assert!(!config.is_arbitrator_for(&addr("other"), &record));

        let unassigned = record_with_arbitrator(None);
        assert!(!config.is_arbitrator_for(&addr("judge"), &unassigned));
    }
}
