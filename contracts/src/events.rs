//! Notifications emitted by the ledger.
//!
//! The ledger appends one event per observable state change. Hosts read
//! them with `events()` or take them with `drain_events()` and forward them
//! wherever they need to go (the node serves them over HTTP).

use pawnda_protocol::identity::Address;
use pawnda_protocol::terms::amount_string;
use serde::{Deserialize, Serialize};

use crate::ledger::LoanId;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "event")]
pub enum LedgerEvent {
    /// A loan was settled and its collateral escrowed.
    LoanCreated {
        loan_id: LoanId,
        borrower: Address,
        lender: Address,
    },

    /// Part or all of a loan's debt was paid.
    LoanRepaid {
        loan_id: LoanId,
        payer: Address,
        #[serde(with = "amount_string")]
        amount: u128,
        #[serde(with = "amount_string")]
        remaining_debt: u128,
    },

    /// The debt reached zero and the collateral went back to the borrower.
    LoanClosed { loan_id: LoanId, borrower: Address },
}

impl LedgerEvent {
    pub fn loan_id(&self) -> LoanId {
        match self {
            LedgerEvent::LoanCreated { loan_id, .. }
            | LedgerEvent::LoanRepaid { loan_id, .. }
            | LedgerEvent::LoanClosed { loan_id, .. } => *loan_id,
        }
    }
}
