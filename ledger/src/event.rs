//! Ordered event log emitted by the ledger.
//!
//! Events are final once confirmed and totally ordered by
//! `(height, log_index)`. Creation events carry every field the indexer
//! needs to reconstruct a record without a follow-up read; transition
//! events carry the id and new status (plus the realized fee on release)
//! and are advisory -- canonical state is always re-readable.

use serde::{Deserialize, Serialize};

use crate::record::{Address, Asset, EscrowStatus};

/// One log entry in the ledger's append-only event stream.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogEvent {
    pub height: u64,
    pub log_index: u32,
    pub tx_hash: String,
    #[serde(flatten)]
    pub kind: EscrowEventKind,
}

/// Payload of a ledger event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum EscrowEventKind {
    Created {
        id: u64,
        client: Address,
        provider: Address,
        arbitrator: Option<Address>,
        asset: Asset,
        amount: u128,
        fee_rate_bps: u16,
        deadline: Option<u64>,
    },
    Funded {
        id: u64,
    },
    Released {
        id: u64,
        fee_amount: u128,
    },
    Refunded {
        id: u64,
    },
    Disputed {
        id: u64,
    },
    /// Emitted before the delegated settlement so resolution intent is
    /// observable even though the combined operation is atomic.
    DisputeResolved {
        id: u64,
        favor_client: bool,
    },
    Cancelled {
        id: u64,
    },
    /// Operator recovery of a stuck balance. Never part of normal flow.
    EmergencyDrained {
        asset: Asset,
        to: Address,
        amount: u128,
    },
}

impl EscrowEventKind {
    /// Escrow id this event concerns, when it concerns one.
    pub fn escrow_id(&self) -> Option<u64> {
        match self {
            EscrowEventKind::Created { id, .. }
            | EscrowEventKind::Funded { id }
            | EscrowEventKind::Released { id, .. }
            | EscrowEventKind::Refunded { id }
            | EscrowEventKind::Disputed { id }
            | EscrowEventKind::DisputeResolved { id, .. }
            | EscrowEventKind::Cancelled { id } => Some(*id),
            EscrowEventKind::EmergencyDrained { .. } => None,
        }
    }

    /// Status a record holds after this event, when the event implies one.
    pub fn implied_status(&self) -> Option<EscrowStatus> {
        match self {
            EscrowEventKind::Created { .. } => Some(EscrowStatus::Created),
            EscrowEventKind::Funded { .. } => Some(EscrowStatus::Funded),
            EscrowEventKind::Released { .. } => Some(EscrowStatus::Released),
            EscrowEventKind::Refunded { .. } => Some(EscrowStatus::Refunded),
            EscrowEventKind::Disputed { .. } => Some(EscrowStatus::Disputed),
            EscrowEventKind::Cancelled { .. } => Some(EscrowStatus::Cancelled),
            // Resolution lands as a follow-up Released/Refunded event.
            EscrowEventKind::DisputeResolved { .. } => None,
            EscrowEventKind::EmergencyDrained { .. } => None,
        }
    }
}
