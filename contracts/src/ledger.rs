//! # Loan Ledger
//!
//! The loan state machine. The lifecycle is:
//!
//! 1. **Create**: the lender submits terms signed by the borrower (and the
//!    broker, if one is named). Collateral moves to the ledger's custodian,
//!    principal moves from lender to borrower, and the loan opens with
//!    `debt = floor(amount * rate / 10000)`.
//! 2. **Repay**: anyone may pay toward an open loan. Payments go to the
//!    lender and never exceed the outstanding debt.
//! 3. **Close**: when the debt reaches zero the collateral goes back to the
//!    borrower. A closed loan never reopens.
//!
//! ## Authorization
//!
//! There is no separate authentication step. The borrower's consent *is*
//! the signature over the terms digest, and each signed nonce can open at
//! most one loan. The lender authorizes the principal transfer by approving
//! the custodian on the currency contract.
//!
//! ## Atomicity
//!
//! Every check runs before anything moves. Asset transfers go through the
//! [`AssetEscrow`] as one batch, and ledger state (nonces, records, events)
//! is written only after the batch has landed. A failed call leaves the
//! ledger and every asset contract exactly as they were.

use chrono::{DateTime, Utc};
use pawnda_protocol::crypto::{
    merkle_root, recover_signer, Digest, RecoverableSignature, Secp256k1Scheme, SignatureError,
    SignatureScheme,
};
use pawnda_protocol::crypto::hash::blake3_hash_multi;
use pawnda_protocol::identity::Address;
use pawnda_protocol::terms::{self, amount_string, CollateralItem, LoanTerms, ValidationError};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};

use crate::error::{LedgerError, StateError};
use crate::escrow::{AssetEscrow, AssetTransfer};
use crate::events::LedgerEvent;

/// Dense loan identifier, assigned from 0 in creation order.
pub type LoanId = u64;

// ---------------------------------------------------------------------------
// Types
// ---------------------------------------------------------------------------

/// Whether a loan still carries debt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum LoanStatus {
    /// Debt outstanding, collateral held by the custodian.
    Open,
    /// Repaid in full, collateral returned. Terminal.
    Closed,
}

impl std::fmt::Display for LoanStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            LoanStatus::Open => write!(f, "Open"),
            LoanStatus::Closed => write!(f, "Closed"),
        }
    }
}

/// A settled loan.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Loan {
    pub id: LoanId,
    pub borrower: Address,
    pub lender: Address,
    pub currency: Address,
    /// Items held by the custodian while the loan is open.
    pub collateral: Vec<CollateralItem>,
    /// Amount the lender paid out.
    #[serde(with = "amount_string")]
    pub principal: u128,
    /// Basis points.
    pub rate: u32,
    /// Unix seconds. Informational.
    pub deadline: u64,
    /// Outstanding debt. Zero exactly when the loan is closed.
    #[serde(with = "amount_string")]
    pub debt: u128,
    pub status: LoanStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Loan {
    pub fn is_open(&self) -> bool {
        self.status == LoanStatus::Open
    }

    /// Whether `now` (unix seconds) is past the agreed deadline.
    ///
    /// Nothing in the ledger acts on this; there is no expiry or
    /// liquidation. It is exposed for reporting.
    pub fn is_past_deadline(&self, now: u64) -> bool {
        now > self.deadline
    }

    /// BLAKE3 commitment over the record, timestamps excluded.
    pub fn record_hash(&self) -> [u8; 32] {
        let id = self.id.to_be_bytes();
        let principal = self.principal.to_be_bytes();
        let rate = self.rate.to_be_bytes();
        let deadline = self.deadline.to_be_bytes();
        let debt = self.debt.to_be_bytes();
        let status = [self.status as u8];

        let mut collateral = Vec::with_capacity(self.collateral.len() * 36);
        for item in &self.collateral {
            collateral.extend_from_slice(item.contract.as_bytes());
            collateral.extend_from_slice(&item.item_id.to_be_bytes());
        }

        blake3_hash_multi(&[
            &id,
            self.borrower.as_bytes(),
            self.lender.as_bytes(),
            self.currency.as_bytes(),
            &collateral,
            &principal,
            &rate,
            &deadline,
            &debt,
            &status,
        ])
    }
}

// ---------------------------------------------------------------------------
// Ledger
// ---------------------------------------------------------------------------

/// The lending ledger.
///
/// Every mutating method takes `&mut self`; a host that shares the ledger
/// across tasks wraps it in a lock and holds the write guard for the whole
/// call, which is also what keeps id assignment gap-free.
pub struct LoanLedger<S: SignatureScheme = Secp256k1Scheme> {
    scheme: S,
    custodian: Address,
    escrow: AssetEscrow,
    loans: Vec<Loan>,
    consumed_nonces: HashMap<Address, HashSet<u64>>,
    events: Vec<LedgerEvent>,
}

impl LoanLedger<Secp256k1Scheme> {
    /// A ledger that verifies real secp256k1 signatures.
    pub fn new(custodian: Address, escrow: AssetEscrow) -> Self {
        Self::with_scheme(Secp256k1Scheme, custodian, escrow)
    }
}

impl<S: SignatureScheme> LoanLedger<S> {
    pub fn with_scheme(scheme: S, custodian: Address, escrow: AssetEscrow) -> Self {
        Self {
            scheme,
            custodian,
            escrow,
            loans: Vec::new(),
            consumed_nonces: HashMap::new(),
            events: Vec::new(),
        }
    }

    /// The address that holds escrowed collateral and spends approved
    /// currency.
    pub fn custodian(&self) -> Address {
        self.custodian
    }

    pub fn escrow(&self) -> &AssetEscrow {
        &self.escrow
    }

    /// Mutable access to the escrow, for registering assets after
    /// construction.
    pub fn escrow_mut(&mut self) -> &mut AssetEscrow {
        &mut self.escrow
    }

    /// Settles signed terms into a new open loan.
    ///
    /// `lender` is the submitting party. A broker signature is only looked
    /// at when the terms name a broker.
    ///
    /// # Errors
    ///
    /// - [`LedgerError::Validation`] for malformed terms.
    /// - [`LedgerError::Signature`] if a signature does not come from the
    ///   declared party, a required broker signature is missing, or a nonce
    ///   was already used.
    /// - [`LedgerError::Transfer`] if collateral or principal cannot move.
    ///
    /// On any error nothing has changed.
    pub fn create_loan(
        &mut self,
        lender: Address,
        terms: &LoanTerms,
        borrower_signature: &RecoverableSignature,
        broker_signature: Option<&RecoverableSignature>,
    ) -> Result<LoanId, LedgerError> {
        let debt = terms.validate().map_err(|err| {
            tracing::warn!(error = %err, "loan terms rejected");
            err
        })?;

        let digest = terms::hash_terms(terms);
        self.authorize(terms, &digest, borrower_signature, broker_signature)
            .map_err(|err| {
                tracing::warn!(digest = %digest, error = %err, "loan signatures rejected");
                err
            })?;

        let mut transfers: Vec<AssetTransfer> = terms
            .collateral
            .iter()
            .map(|item| AssetTransfer::Collateral {
                asset: item.contract,
                from: terms.borrower,
                to: self.custodian,
                item_id: item.item_id,
            })
            .collect();
        transfers.push(AssetTransfer::Currency {
            asset: terms.currency,
            from: lender,
            to: terms.borrower,
            amount: terms.amount,
        });
        self.escrow.execute(&self.custodian, &transfers)?;

        self.consume_nonce(terms.borrower, terms.borrower_nonce);
        if let Some(broker) = terms.broker {
            self.consume_nonce(broker, terms.broker_nonce);
        }

        let loan_id = self.loans.len() as LoanId;
        let now = Utc::now();
        self.loans.push(Loan {
            id: loan_id,
            borrower: terms.borrower,
            lender,
            currency: terms.currency,
            collateral: terms.collateral.clone(),
            principal: terms.amount,
            rate: terms.rate,
            deadline: terms.deadline,
            debt,
            status: LoanStatus::Open,
            created_at: now,
            updated_at: now,
        });
        self.events.push(LedgerEvent::LoanCreated {
            loan_id,
            borrower: terms.borrower,
            lender,
        });

        tracing::info!(
            loan_id,
            borrower = %terms.borrower,
            lender = %lender,
            principal = terms.amount,
            debt,
            collateral = terms.collateral.len(),
            "loan created"
        );
        Ok(loan_id)
    }

    /// [`create_loan`](Self::create_loan) for a lender who is not trusted
    /// in-process: `lender_signature` must recover to `lender` over the same
    /// terms digest the borrower signed.
    ///
    /// # Errors
    ///
    /// As [`create_loan`](Self::create_loan), plus [`LedgerError::Signature`]
    /// when the lender signature does not come from `lender`.
    pub fn create_signed_loan(
        &mut self,
        lender: Address,
        lender_signature: &RecoverableSignature,
        terms: &LoanTerms,
        borrower_signature: &RecoverableSignature,
        broker_signature: Option<&RecoverableSignature>,
    ) -> Result<LoanId, LedgerError> {
        terms.validate()?;

        let digest = terms::hash_terms(terms);
        self.expect_signer(lender, lender_signature, &digest)
            .map_err(|err| {
                tracing::warn!(lender = %lender, error = %err, "lender signature rejected");
                err
            })?;

        self.create_loan(lender, terms, borrower_signature, broker_signature)
    }

    /// [`pay_back_loan`](Self::pay_back_loan) for a payer who is not trusted
    /// in-process. `payer_signature` must recover to `payer` over
    /// [`terms::hash_repayment`] of the loan id, `amount` and the debt
    /// outstanding right now.
    ///
    /// # Errors
    ///
    /// [`StateError::NotFound`], then [`LedgerError::Signature`] when the
    /// payer did not sign, then anything
    /// [`pay_back_loan`](Self::pay_back_loan) reports.
    pub fn pay_back_signed(
        &mut self,
        payer: Address,
        payer_signature: &RecoverableSignature,
        loan_id: LoanId,
        amount: u128,
    ) -> Result<u128, LedgerError> {
        let outstanding = self.get_loan(loan_id)?.debt;
        let digest = terms::hash_repayment(loan_id, amount, outstanding);
        self.expect_signer(payer, payer_signature, &digest)
            .map_err(|err| {
                tracing::warn!(loan_id, payer = %payer, error = %err, "payer signature rejected");
                err
            })?;

        self.pay_back_loan(payer, loan_id, amount)
    }

    /// Pays `amount` toward loan `loan_id` and returns the remaining debt.
    ///
    /// The payer must have approved the custodian for `amount` on the loan's
    /// currency. When the debt reaches zero the loan closes and its
    /// collateral is returned to the borrower in the same batch.
    ///
    /// # Errors
    ///
    /// Checked in this order: [`StateError::NotFound`],
    /// [`StateError::Closed`], [`ValidationError::ZeroAmount`],
    /// [`StateError::Overpayment`], then any [`LedgerError::Transfer`].
    pub fn pay_back_loan(
        &mut self,
        payer: Address,
        loan_id: LoanId,
        amount: u128,
    ) -> Result<u128, LedgerError> {
        let loan = self.get_loan(loan_id)?;
        if !loan.is_open() {
            tracing::warn!(loan_id, "repayment against a closed loan");
            return Err(StateError::Closed(loan_id).into());
        }
        if amount == 0 {
            return Err(LedgerError::Validation(ValidationError::ZeroAmount));
        }
        if amount > loan.debt {
            tracing::warn!(
                loan_id,
                attempted = amount,
                outstanding = loan.debt,
                "overpayment rejected"
            );
            return Err(StateError::Overpayment {
                attempted: amount,
                outstanding: loan.debt,
            }
            .into());
        }

        let remaining = loan.debt - amount;
        let borrower = loan.borrower;

        let mut transfers = vec![AssetTransfer::Currency {
            asset: loan.currency,
            from: payer,
            to: loan.lender,
            amount,
        }];
        if remaining == 0 {
            transfers.extend(loan.collateral.iter().map(|item| AssetTransfer::Collateral {
                asset: item.contract,
                from: self.custodian,
                to: borrower,
                item_id: item.item_id,
            }));
        }
        self.escrow.execute(&self.custodian, &transfers)?;

        let loan = self.loan_mut(loan_id)?;
        loan.debt = remaining;
        loan.updated_at = Utc::now();
        if remaining == 0 {
            loan.status = LoanStatus::Closed;
        }

        self.events.push(LedgerEvent::LoanRepaid {
            loan_id,
            payer,
            amount,
            remaining_debt: remaining,
        });
        tracing::info!(loan_id, payer = %payer, amount, remaining, "loan repaid");

        if remaining == 0 {
            self.events.push(LedgerEvent::LoanClosed { loan_id, borrower });
            tracing::info!(loan_id, borrower = %borrower, "loan closed, collateral released");
        }

        Ok(remaining)
    }

    // -- Queries ------------------------------------------------------------

    /// Outstanding debt of a loan. Zero for closed loans.
    pub fn get_due_amount(&self, loan_id: LoanId) -> Result<u128, LedgerError> {
        Ok(self.get_loan(loan_id)?.debt)
    }

    pub fn get_loan(&self, loan_id: LoanId) -> Result<&Loan, LedgerError> {
        usize::try_from(loan_id)
            .ok()
            .and_then(|index| self.loans.get(index))
            .ok_or_else(|| StateError::NotFound(loan_id).into())
    }

    pub fn loan_count(&self) -> usize {
        self.loans.len()
    }

    pub fn loans(&self) -> impl Iterator<Item = &Loan> {
        self.loans.iter()
    }

    pub fn open_loan_count(&self) -> usize {
        self.loans.iter().filter(|loan| loan.is_open()).count()
    }

    pub fn is_nonce_consumed(&self, account: &Address, nonce: u64) -> bool {
        self.consumed_nonces
            .get(account)
            .is_some_and(|used| used.contains(&nonce))
    }

    pub fn events(&self) -> &[LedgerEvent] {
        &self.events
    }

    /// Takes every event emitted so far.
    pub fn drain_events(&mut self) -> Vec<LedgerEvent> {
        std::mem::take(&mut self.events)
    }

    /// Merkle root over every loan record, in id order.
    pub fn state_root(&self) -> [u8; 32] {
        let leaves: Vec<[u8; 32]> = self.loans.iter().map(Loan::record_hash).collect();
        merkle_root(&leaves)
    }

    pub fn hash_terms(&self, terms: &LoanTerms) -> Digest {
        terms::hash_terms(terms)
    }

    /// Recovers the signer of `terms` with this ledger's scheme.
    pub fn get_signer(
        &self,
        signature: &RecoverableSignature,
        terms: &LoanTerms,
    ) -> Result<Address, SignatureError> {
        terms::get_signer(&self.scheme, signature, terms)
    }

    // -- Internals ----------------------------------------------------------

    fn authorize(
        &self,
        terms: &LoanTerms,
        digest: &Digest,
        borrower_signature: &RecoverableSignature,
        broker_signature: Option<&RecoverableSignature>,
    ) -> Result<(), SignatureError> {
        self.expect_signer(terms.borrower, borrower_signature, digest)?;

        if let Some(broker) = terms.broker {
            let signature =
                broker_signature.ok_or(SignatureError::MissingBrokerSignature(broker))?;
            self.expect_signer(broker, signature, digest)?;
        }

        self.ensure_fresh(terms.borrower, terms.borrower_nonce)?;
        if let Some(broker) = terms.broker {
            self.ensure_fresh(broker, terms.broker_nonce)?;
        }
        Ok(())
    }

    fn expect_signer(
        &self,
        expected: Address,
        signature: &RecoverableSignature,
        digest: &Digest,
    ) -> Result<(), SignatureError> {
        let recovered = recover_signer(&self.scheme, signature, digest)?;
        if recovered != expected {
            return Err(SignatureError::Mismatch {
                expected,
                recovered,
            });
        }
        tracing::debug!(signer = %recovered, "signature verified");
        Ok(())
    }

    fn ensure_fresh(&self, account: Address, nonce: u64) -> Result<(), SignatureError> {
        if self.is_nonce_consumed(&account, nonce) {
            return Err(SignatureError::Replayed { account, nonce });
        }
        Ok(())
    }

    fn consume_nonce(&mut self, account: Address, nonce: u64) {
        self.consumed_nonces.entry(account).or_default().insert(nonce);
    }

    fn loan_mut(&mut self, loan_id: LoanId) -> Result<&mut Loan, LedgerError> {
        usize::try_from(loan_id)
            .ok()
            .and_then(|index| self.loans.get_mut(index))
            .ok_or_else(|| StateError::NotFound(loan_id).into())
    }
}

impl<S: SignatureScheme> std::fmt::Debug for LoanLedger<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LoanLedger")
            .field("custodian", &self.custodian)
            .field("loans", &self.loans.len())
            .field("events", &self.events.len())
            .finish()
    }
}
