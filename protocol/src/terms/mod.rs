//! # Loan Terms
//!
//! The thing borrower, lender and (optionally) a broker agree on off-line.
//! Terms are never stored verbatim: they are hashed, signed, presented once
//! to the ledger, and turned into a loan record.
//!
//! Two shapes exist at the boundary:
//!
//! - the structured [`LoanTerms`], which is what the rest of the codebase
//!   speaks, and
//! - the *positional* form inherited from EVM-style tooling
//!   (`addresses[3]`, parallel collateral arrays, `values[5]`), decoded once
//!   by [`LoanTerms::from_positional`].
//!
//! Validation ([`LoanTerms::validate`]) is side-effect free and runs before
//! any signature or asset is looked at.

pub mod encoding;

use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use thiserror::Error;

use crate::config::{BASIS_POINTS_DENOMINATOR, MAX_COLLATERAL_ITEMS, MAX_RATE_BPS};
use crate::identity::Address;

pub use encoding::{get_signer, hash_repayment, hash_terms};

/// Rejections raised before any side effect.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("terms carry no collateral")]
    EmptyCollateral,

    #[error("collateral list too long: {count} items (max {max})")]
    TooManyCollateralItems { count: usize, max: usize },

    #[error("collateral item {item_id} of {contract} listed more than once")]
    DuplicateCollateral { contract: Address, item_id: u128 },

    #[error("collateral arrays differ in length: {contracts} contracts, {ids} ids")]
    CollateralLengthMismatch { contracts: usize, ids: usize },

    #[error("rate {0} bps exceeds the maximum of 10000 bps")]
    RateOutOfRange(u32),

    #[error("amount must be greater than zero")]
    ZeroAmount,

    #[error("borrower is the zero address")]
    ZeroBorrower,

    #[error("broker is the zero address; omit it instead")]
    ZeroBroker,

    #[error("terms open with no debt: {amount} at {rate} bps rounds to zero")]
    ZeroDebt { amount: u128, rate: u32 },

    #[error("debt computation overflows for amount {amount} at rate {rate}")]
    AmountOverflow { amount: u128, rate: u32 },

    #[error("positional value {index} does not fit: {value}")]
    ValueOutOfRange { index: usize, value: u128 },
}

/// One non-fungible item pledged as security.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CollateralItem {
    /// The collectible contract.
    pub contract: Address,
    /// Item id within that contract.
    #[serde(with = "amount_string")]
    pub item_id: u128,
}

impl CollateralItem {
    pub fn new(contract: Address, item_id: u128) -> Self {
        Self { contract, item_id }
    }
}

/// The signed agreement.
///
/// # Examples
///
/// ```
/// use pawnda_protocol::identity::Address;
/// use pawnda_protocol::terms::{CollateralItem, LoanTerms};
///
/// let terms = LoanTerms {
///     borrower: Address::from_label("borrower"),
///     broker: None,
///     currency: Address::from_label("token"),
///     collateral: vec![CollateralItem::new(Address::from_label("nifties"), 0)],
///     borrower_nonce: 0,
///     broker_nonce: 0,
///     amount: 100_000_000_000_000_000_000,
///     rate: 100,
///     deadline: 1_700_000_000,
/// };
/// assert_eq!(terms.compute_debt().unwrap(), 1_000_000_000_000_000_000);
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoanTerms {
    pub borrower: Address,
    /// Optional intermediary who co-signs the terms.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub broker: Option<Address>,
    /// The fungible currency the principal is paid in.
    pub currency: Address,
    /// Ordered; order is part of the signed digest.
    pub collateral: Vec<CollateralItem>,
    pub borrower_nonce: u64,
    #[serde(default)]
    pub broker_nonce: u64,
    /// Principal, in the currency's smallest unit.
    #[serde(with = "amount_string")]
    pub amount: u128,
    /// Basis points applied to the principal to get the debt.
    pub rate: u32,
    /// Unix seconds. Recorded on the loan, never enforced.
    pub deadline: u64,
}

impl LoanTerms {
    /// Decodes the positional form used by EVM-style clients.
    ///
    /// - `addresses = [borrower, broker, currency]`, a zero broker meaning
    ///   "no broker";
    /// - `collateral_contracts[i]` pairs with `collateral_ids[i]`;
    /// - `values = [borrower_nonce, broker_nonce, amount, rate, deadline]`.
    pub fn from_positional(
        addresses: [Address; 3],
        collateral_contracts: &[Address],
        collateral_ids: &[u128],
        values: [u128; 5],
    ) -> Result<Self, ValidationError> {
        if collateral_contracts.len() != collateral_ids.len() {
            return Err(ValidationError::CollateralLengthMismatch {
                contracts: collateral_contracts.len(),
                ids: collateral_ids.len(),
            });
        }

        let [borrower, broker, currency] = addresses;
        let [borrower_nonce, broker_nonce, amount, rate, deadline] = values;

        let narrow_u64 = |index: usize, value: u128| {
            u64::try_from(value).map_err(|_| ValidationError::ValueOutOfRange { index, value })
        };
        let rate = u32::try_from(rate)
            .map_err(|_| ValidationError::ValueOutOfRange { index: 3, value: rate })?;

        Ok(Self {
            borrower,
            broker: if broker.is_zero() { None } else { Some(broker) },
            currency,
            collateral: collateral_contracts
                .iter()
                .zip(collateral_ids)
                .map(|(contract, id)| CollateralItem::new(*contract, *id))
                .collect(),
            borrower_nonce: narrow_u64(0, borrower_nonce)?,
            broker_nonce: narrow_u64(1, broker_nonce)?,
            amount,
            rate,
            deadline: narrow_u64(4, deadline)?,
        })
    }

    /// The broker address as it appears in the encoding: zero when absent.
    pub fn broker_or_zero(&self) -> Address {
        self.broker.unwrap_or(Address::ZERO)
    }

    /// `floor(amount * rate / 10000)`, with overflow reported.
    pub fn compute_debt(&self) -> Result<u128, ValidationError> {
        self.amount
            .checked_mul(u128::from(self.rate))
            .map(|scaled| scaled / BASIS_POINTS_DENOMINATOR)
            .ok_or(ValidationError::AmountOverflow {
                amount: self.amount,
                rate: self.rate,
            })
    }

    /// Checks every structural rule and returns the debt the loan would
    /// open with.
    pub fn validate(&self) -> Result<u128, ValidationError> {
        if self.collateral.is_empty() {
            return Err(ValidationError::EmptyCollateral);
        }
        if self.collateral.len() > MAX_COLLATERAL_ITEMS {
            return Err(ValidationError::TooManyCollateralItems {
                count: self.collateral.len(),
                max: MAX_COLLATERAL_ITEMS,
            });
        }

        let mut seen = HashSet::with_capacity(self.collateral.len());
        for item in &self.collateral {
            if !seen.insert(*item) {
                return Err(ValidationError::DuplicateCollateral {
                    contract: item.contract,
                    item_id: item.item_id,
                });
            }
        }

        if self.rate > MAX_RATE_BPS {
            return Err(ValidationError::RateOutOfRange(self.rate));
        }
        if self.amount == 0 {
            return Err(ValidationError::ZeroAmount);
        }
        if self.borrower.is_zero() {
            return Err(ValidationError::ZeroBorrower);
        }
        if self.broker.is_some_and(|broker| broker.is_zero()) {
            return Err(ValidationError::ZeroBroker);
        }

        // Nothing owed means nothing can ever close the loan.
        let debt = self.compute_debt()?;
        if debt == 0 {
            return Err(ValidationError::ZeroDebt {
                amount: self.amount,
                rate: self.rate,
            });
        }
        Ok(debt)
    }
}

// ---------------------------------------------------------------------------
// Serde helper: u128 amounts as decimal strings
// ---------------------------------------------------------------------------

/// Serde helper for `u128` fields.
///
/// JSON numbers lose precision past 2^53 in most clients, and amounts
/// quoted with 18 decimals are far beyond that. Amounts are written as
/// decimal strings; reading accepts either a string or a plain integer.
///
/// ```ignore
/// #[derive(Serialize, Deserialize)]
/// struct Repay {
///     #[serde(with = "pawnda_protocol::terms::amount_string")]
///     amount: u128,
/// }
/// ```
pub mod amount_string {
    use serde::{Deserialize, Deserializer, Serializer};

    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Repr {
        Text(String),
        Number(u64),
    }

    pub fn serialize<S: Serializer>(value: &u128, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(value)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<u128, D::Error> {
        match Repr::deserialize(deserializer)? {
            Repr::Text(s) => s.trim().parse::<u128>().map_err(serde::de::Error::custom),
            Repr::Number(n) => Ok(u128::from(n)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const ONE_TOKEN: u128 = 1_000_000_000_000_000_000;

    fn terms() -> LoanTerms {
        LoanTerms {
            borrower: Address::from_label("borrower"),
            broker: None,
            currency: Address::from_label("token"),
            collateral: vec![CollateralItem::new(Address::from_label("nifties"), 0)],
            borrower_nonce: 0,
            broker_nonce: 0,
            amount: 100 * ONE_TOKEN,
            rate: 100,
            deadline: 1_700_000_000,
        }
    }

    #[test]
    fn debt_is_basis_points_of_principal() {
        assert_eq!(terms().validate().unwrap(), ONE_TOKEN);

        let mut full = terms();
        full.rate = 10_000;
        assert_eq!(full.compute_debt().unwrap(), 100 * ONE_TOKEN);
    }

    #[test]
    fn zero_debt_is_rejected() {
        let mut free = terms();
        free.rate = 0;
        assert_eq!(
            free.validate(),
            Err(ValidationError::ZeroDebt {
                amount: 100 * ONE_TOKEN,
                rate: 0
            })
        );

        let mut dust = terms();
        dust.amount = 9_999;
        dust.rate = 1;
        assert!(matches!(
            dust.validate(),
            Err(ValidationError::ZeroDebt { .. })
        ));
    }

    #[test]
    fn explicit_zero_broker_is_rejected() {
        let mut t = terms();
        t.broker = Some(Address::ZERO);
        assert_eq!(t.validate(), Err(ValidationError::ZeroBroker));

        t.broker = None;
        assert!(t.validate().is_ok());
    }

    #[test]
    fn debt_rounds_down() {
        let mut t = terms();
        t.amount = 3;
        t.rate = 5_000;
        assert_eq!(t.compute_debt().unwrap(), 1);
    }

    #[test]
    fn overflow_is_reported() {
        let mut t = terms();
        t.amount = u128::MAX;
        t.rate = 2;
        assert_eq!(
            t.validate(),
            Err(ValidationError::AmountOverflow {
                amount: u128::MAX,
                rate: 2
            })
        );
    }

    #[test]
    fn empty_collateral_rejected() {
        let mut t = terms();
        t.collateral.clear();
        assert_eq!(t.validate(), Err(ValidationError::EmptyCollateral));
    }

    #[test]
    fn duplicate_collateral_rejected() {
        let mut t = terms();
        t.collateral.push(t.collateral[0]);
        assert!(matches!(
            t.validate(),
            Err(ValidationError::DuplicateCollateral { item_id: 0, .. })
        ));
    }

    #[test]
    fn same_id_on_different_contracts_is_fine() {
        let mut t = terms();
        t.collateral
            .push(CollateralItem::new(Address::from_label("other nifties"), 0));
        assert!(t.validate().is_ok());
    }

    #[test]
    fn rate_above_max_rejected() {
        let mut t = terms();
        t.rate = MAX_RATE_BPS + 1;
        assert_eq!(t.validate(), Err(ValidationError::RateOutOfRange(10_001)));
    }

    #[test]
    fn zero_amount_and_zero_borrower_rejected() {
        let mut t = terms();
        t.amount = 0;
        assert_eq!(t.validate(), Err(ValidationError::ZeroAmount));

        let mut t = terms();
        t.borrower = Address::ZERO;
        assert_eq!(t.validate(), Err(ValidationError::ZeroBorrower));
    }

    #[test]
    fn positional_decoding() {
        let t = terms();
        let decoded = LoanTerms::from_positional(
            [t.borrower, Address::ZERO, t.currency],
            &[Address::from_label("nifties")],
            &[0],
            [0, 0, 100 * ONE_TOKEN, 100, 1_700_000_000],
        )
        .unwrap();
        assert_eq!(decoded, t);
    }

    #[test]
    fn positional_nonzero_broker_is_kept() {
        let broker = Address::from_label("broker");
        let decoded = LoanTerms::from_positional(
            [Address::from_label("borrower"), broker, Address::from_label("token")],
            &[Address::from_label("nifties")],
            &[7],
            [1, 2, 10, 100, 0],
        )
        .unwrap();
        assert_eq!(decoded.broker, Some(broker));
        assert_eq!(decoded.broker_nonce, 2);
    }

    #[test]
    fn positional_length_mismatch_rejected() {
        let err = LoanTerms::from_positional(
            [Address::from_label("b"), Address::ZERO, Address::from_label("t")],
            &[Address::from_label("n"), Address::from_label("m")],
            &[0],
            [0, 0, 1, 1, 0],
        )
        .unwrap_err();
        assert_eq!(
            err,
            ValidationError::CollateralLengthMismatch {
                contracts: 2,
                ids: 1
            }
        );
    }

    #[test]
    fn positional_narrowing_rejected() {
        let err = LoanTerms::from_positional(
            [Address::from_label("b"), Address::ZERO, Address::from_label("t")],
            &[Address::from_label("n")],
            &[0],
            [0, 0, 1, u128::from(u32::MAX) + 1, 0],
        )
        .unwrap_err();
        assert!(matches!(err, ValidationError::ValueOutOfRange { index: 3, .. }));
    }

    #[test]
    fn json_amounts_are_strings() {
        let t = terms();
        let json = serde_json::to_value(&t).unwrap();
        assert_eq!(json["amount"], "100000000000000000000");
        assert_eq!(json["collateral"][0]["item_id"], "0");
        assert!(json.get("broker").is_none());

        let back: LoanTerms = serde_json::from_value(json).unwrap();
        assert_eq!(back, t);
    }

    #[test]
    fn json_amounts_accept_numbers() {
        let json = serde_json::json!({
            "borrower": Address::from_label("borrower"),
            "currency": Address::from_label("token"),
            "collateral": [{ "contract": Address::from_label("nifties"), "item_id": 3 }],
            "borrower_nonce": 4,
            "amount": 250,
            "rate": 100,
            "deadline": 0
        });
        let t: LoanTerms = serde_json::from_value(json).unwrap();
        assert_eq!(t.amount, 250);
        assert_eq!(t.collateral[0].item_id, 3);
        assert_eq!(t.broker, None);
        assert_eq!(t.broker_nonce, 0);
    }
}
