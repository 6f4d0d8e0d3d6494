//! # Pawnda Contracts
//!
//! The stateful half of Pawnda: a peer-to-peer lending ledger that turns
//! signed loan terms into collateralized loans.
//!
//! - **Loan Ledger**: the loan state machine: signature-authorized
//!   creation, partial and full repayment, collateral release.
//! - **Asset Escrow**: all-or-nothing movement of currency and collateral
//!   through external asset contracts.
//! - **Fixture Assets**: a faucet token and a faucet collectible for the
//!   development network and tests.
//!
//! ## Design Principles
//!
//! 1. All monetary arithmetic is checked. Overflow is an error, never a wrap.
//! 2. State transitions are explicit enum variants, not boolean flags.
//! 3. A signature over the canonical terms digest gates loan creation.
//! 4. Validation happens before any side effect; transfers are batched and
//!    rolled back as a unit.

pub mod assets;
pub mod error;
pub mod escrow;
pub mod events;
pub mod ledger;
pub mod nft;
pub mod token;

pub use assets::{FungibleCurrency, Journaled, NonFungibleCollateral};
pub use error::{LedgerError, StateError, TransferError};
pub use escrow::{AssetEscrow, AssetTransfer};
pub use events::LedgerEvent;
pub use ledger::{Loan, LoanId, LoanLedger, LoanStatus};
pub use nft::CollectibleRegistry;
pub use token::FungibleToken;
