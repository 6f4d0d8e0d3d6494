//! Error taxonomy for ledger operations.
//!
//! Each layer has its own enum; [`LedgerError`] unifies them so callers can
//! match on the category (and a host can map categories to status codes)
//! without losing the detail.

use pawnda_protocol::crypto::SignatureError;
use pawnda_protocol::identity::Address;
use pawnda_protocol::terms::ValidationError;
use thiserror::Error;

use crate::ledger::LoanId;

/// Loan-state violations.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StateError {
    /// No loan with this id has been created.
    #[error("loan {0} not found")]
    NotFound(LoanId),

    /// The loan is already repaid in full.
    #[error("loan {0} is closed")]
    Closed(LoanId),

    /// Repayment larger than the outstanding debt. Never clamped.
    #[error("overpayment: attempted to repay {attempted} but only {outstanding} outstanding")]
    Overpayment {
        /// Amount the caller tried to repay.
        attempted: u128,
        /// Remaining debt.
        outstanding: u128,
    },
}

/// Failures reported by an asset contract.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransferError {
    #[error("{account} holds {balance} of {asset}, needs {required}")]
    InsufficientBalance {
        asset: Address,
        account: Address,
        balance: u128,
        required: u128,
    },

    #[error("{spender} may move {allowance} of {asset} for {owner}, needs {required}")]
    InsufficientAllowance {
        asset: Address,
        owner: Address,
        spender: Address,
        allowance: u128,
        required: u128,
    },

    #[error("item {item_id} of {asset} is not owned by {claimed}")]
    NotOwner {
        asset: Address,
        item_id: u128,
        claimed: Address,
    },

    #[error("{operator} is not approved to move item {item_id} of {asset}")]
    NotApproved {
        asset: Address,
        item_id: u128,
        operator: Address,
    },

    #[error("item {item_id} of {asset} does not exist")]
    UnknownItem { asset: Address, item_id: u128 },

    #[error("no asset contract registered at {0}")]
    UnknownAsset(Address),

    #[error("arithmetic overflow in {asset}")]
    Overflow { asset: Address },
}

/// Any error a ledger operation can return.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LedgerError {
    #[error("validation failed: {0}")]
    Validation(#[from] ValidationError),

    #[error("signature rejected: {0}")]
    Signature(#[from] SignatureError),

    #[error("invalid loan state: {0}")]
    State(#[from] StateError),

    #[error("asset transfer failed: {0}")]
    Transfer(#[from] TransferError),
}

impl LedgerError {
    /// Short category label, used for metrics and logs.
    pub fn kind(&self) -> &'static str {
        match self {
            LedgerError::Validation(_) => "validation",
            LedgerError::Signature(_) => "signature",
            LedgerError::State(_) => "state",
            LedgerError::Transfer(_) => "transfer",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn conversions_keep_category() {
        let e: LedgerError = ValidationError::ZeroAmount.into();
        assert_eq!(e.kind(), "validation");

        let e: LedgerError = SignatureError::ZeroRecovery.into();
        assert_eq!(e.kind(), "signature");

        let e: LedgerError = StateError::Closed(3).into();
        assert_eq!(e.kind(), "state");
        assert_eq!(e.to_string(), "invalid loan state: loan 3 is closed");

        let e: LedgerError = TransferError::UnknownAsset(Address::ZERO).into();
        assert_eq!(e.kind(), "transfer");
    }
}
