//! Error taxonomy for ledger operations.

use thiserror::Error;

use crate::record::EscrowStatus;

/// Failure of an underlying asset movement, reported by an [`AssetBackend`].
///
/// [`AssetBackend`]: crate::AssetBackend
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransferError {
    #[error("asset transfer failed: {0}")]
    TransferFailed(String),

    #[error("insufficient allowance: need {needed}, have {available}")]
    InsufficientAllowance { needed: u128, available: u128 },
}

/// Errors surfaced synchronously by ledger operations.
///
/// Validation, authorization, and state errors are rejected before any
/// mutation. Transfer errors roll the operation back as one unit, so the
/// record's status is unchanged and the call can be retried once the
/// external condition is fixed.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LedgerError {
    #[error("invalid party: {0}")]
    InvalidParty(String),

    #[error("invalid amount: must be greater than zero")]
    InvalidAmount,

    #[error("invalid deadline: must be in the future")]
    InvalidDeadline,

    #[error("fee rate {requested} exceeds maximum {max} basis points")]
    FeeTooHigh { requested: u16, max: u16 },

    #[error("amount mismatch: expected {expected}, got {actual}")]
    AmountMismatch { expected: u128, actual: u128 },

    #[error("unexpected native value on token-denominated escrow")]
    UnexpectedValue,

    #[error("caller is not authorized for this operation")]
    Unauthorized,

    #[error("invalid state: escrow is {actual:?}")]
    InvalidState { actual: EscrowStatus },

    #[error("escrow {0} not found")]
    NotFound(u64),

    #[error("arithmetic overflow in fund computation")]
    Overflow,

    #[error("reentrant call rejected")]
    ReentrantCall,

    #[error(transparent)]
    Transfer(#[from] TransferError),
}
