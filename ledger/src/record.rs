//! Escrow record types shared by the ledger and its off-chain consumers.

use serde::{Deserialize, Serialize};

/// Participant identity on the ledger.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Address(pub String);

impl Address {
    pub fn new(s: impl Into<String>) -> Self {
        Address(s.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for Address {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for Address {
    fn from(s: &str) -> Self {
        Address(s.to_string())
    }
}

/// Denomination of an escrow's principal.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(tag = "kind", content = "token", rename_all = "lowercase")]
pub enum Asset {
    /// The chain's native currency.
    Native,
    /// A fungible token identified by its contract address.
    Token(Address),
}

/// Lifecycle status of an escrow record.
///
/// Integer codes are stable and shared with the replica store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EscrowStatus {
    Created = 0,
    Funded = 1,
    Disputed = 2,
    Released = 3,
    Refunded = 4,
    Cancelled = 5,
}

impl EscrowStatus {
    pub fn code(self) -> i16 {
        self as i16
    }

    pub fn from_code(code: i16) -> Option<Self> {
        match code {
            0 => Some(EscrowStatus::Created),
            1 => Some(EscrowStatus::Funded),
            2 => Some(EscrowStatus::Disputed),
            3 => Some(EscrowStatus::Released),
            4 => Some(EscrowStatus::Refunded),
            5 => Some(EscrowStatus::Cancelled),
            _ => None,
        }
    }

    /// Terminal statuses admit no further transition.
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            EscrowStatus::Released | EscrowStatus::Refunded | EscrowStatus::Cancelled
        )
    }

    pub fn as_str(self) -> &'static str {
        match self {
            EscrowStatus::Created => "created",
            EscrowStatus::Funded => "funded",
            EscrowStatus::Disputed => "disputed",
            EscrowStatus::Released => "released",
            EscrowStatus::Refunded => "refunded",
            EscrowStatus::Cancelled => "cancelled",
        }
    }
}

/// One client-provider value-holding agreement.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EscrowRecord {
    pub id: u64,
    pub client: Address,
    pub provider: Address,
    /// Per-escrow arbitrator; `None` means only globally registered
    /// arbitrators may act on this record.
    pub arbitrator: Option<Address>,
    pub asset: Asset,
    /// Principal in the asset's smallest unit.
    pub amount: u128,
    /// Fee rate in basis points, snapshotted at creation.
    pub fee_rate_bps: u16,
    pub status: EscrowStatus,
    pub created_at: u64,
    /// Informational deadline; the ledger never acts on it.
    pub deadline: Option<u64>,
    pub description: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_codes_round_trip() {
        for status in [
            EscrowStatus::Created,
            EscrowStatus::Funded,
            EscrowStatus::Disputed,
            EscrowStatus::Released,
            EscrowStatus::Refunded,
            EscrowStatus::Cancelled,
        ] {
            assert_eq!(EscrowStatus::from_code(status.code()), Some(status));
        }
        assert_eq!(EscrowStatus::from_code(6), None);
        assert_eq!(EscrowStatus::from_code(-1), None);
    }

    #[test]
    fn terminal_statuses() {
        assert!(!EscrowStatus::Created.is_terminal());
        assert!(!EscrowStatus::Funded.is_terminal());
        assert!(!EscrowStatus::Disputed.is_terminal());
        assert!(EscrowStatus::Released.is_terminal());
        assert!(EscrowStatus::Refunded.is_terminal());
        assert!(EscrowStatus::Cancelled.is_terminal());
    }
}
