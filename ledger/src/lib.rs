//! Paywarden escrow ledger
//!
//! This crate models the authoritative escrow state machine: record custody,
//! status transitions, fee policy, arbitrator authorization, and the ordered
//! event log the off-chain indexer reconciles against. All mutations run
//! serialized (one call to completion at a time), matching the execution
//! guarantees of the target ledger environment.

mod contract;
mod error;
mod event;
mod policy;
mod record;

pub use contract::{AssetBackend, EscrowLedger, NoopBackend};
pub use error::{LedgerError, TransferError};
pub use event::{EscrowEventKind, LogEvent};
pub use policy::{fee_split, PlatformConfig, MAX_FEE_BPS};
pub use record::{Address, Asset, EscrowRecord, EscrowStatus};
