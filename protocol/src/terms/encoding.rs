//! # Canonical Terms Encoding
//!
//! The digest every party signs. Off-line tooling must reproduce it byte
//! for byte, so the layout below is frozen for `pawnda/loan-terms/v1`:
//!
//! ```text
//! encoding  := DOMAIN_TAG field*
//! address   := 0xA0 ‖ 20 bytes
//! uint      := 0x10 ‖ 32 bytes big-endian
//! list      := 0x4C ‖ u32 big-endian count ‖ (address ‖ uint)*
//!
//! borrower, broker (zero if none), currency, list(collateral),
//! borrower_nonce, broker_nonce, amount, rate, deadline
//! ```
//!
//! Every field is tagged and fixed-width, and the list carries its count,
//! so no two distinct terms share an encoding. An absent broker encodes as
//! zero, which is why [`LoanTerms::validate`] refuses `Some(Address::ZERO)`.
//!
//! Repayments are authorized by the payer over a separate digest:
//!
//! ```text
//! repayment := REPAYMENT_DOMAIN_TAG uint(loan_id) uint(amount) uint(outstanding)
//! ```
//!
//! `outstanding` is the debt before the payment. Any accepted payment
//! lowers it, so an authorization cannot be replayed.

use crate::config::{
    REPAYMENT_DOMAIN_TAG, TAG_ADDRESS, TAG_LIST, TAG_UINT, TERMS_DOMAIN_TAG, UINT_ENCODED_LENGTH,
};
use crate::crypto::hash::{keccak256, Digest};
use crate::crypto::signatures::{
    recover_signer, RecoverableSignature, SignatureError, SignatureScheme,
};
use crate::identity::Address;

use super::LoanTerms;

/// Appends tagged fields to a buffer.
struct FieldWriter {
    buf: Vec<u8>,
}

impl FieldWriter {
    fn with_domain(domain: &[u8], capacity: usize) -> Self {
        let mut buf = Vec::with_capacity(domain.len() + capacity);
        buf.extend_from_slice(domain);
        Self { buf }
    }

    fn address(&mut self, address: &Address) {
        self.buf.push(TAG_ADDRESS);
        self.buf.extend_from_slice(address.as_bytes());
    }

    fn uint(&mut self, value: u128) {
        self.buf.push(TAG_UINT);
        let be = value.to_be_bytes();
        self.buf
            .extend(std::iter::repeat(0u8).take(UINT_ENCODED_LENGTH - be.len()));
        self.buf.extend_from_slice(&be);
    }

    fn list_header(&mut self, count: u32) {
        self.buf.push(TAG_LIST);
        self.buf.extend_from_slice(&count.to_be_bytes());
    }

    fn finish(self) -> Vec<u8> {
        self.buf
    }
}

const ADDRESS_FIELD: usize = 1 + 20;
const UINT_FIELD: usize = 1 + UINT_ENCODED_LENGTH;

impl LoanTerms {
    /// The canonical byte encoding that [`hash_terms`] digests.
    pub fn canonical_bytes(&self) -> Vec<u8> {
        let capacity = 3 * ADDRESS_FIELD
            + 5
            + self.collateral.len() * (ADDRESS_FIELD + UINT_FIELD)
            + 5 * UINT_FIELD;
        let mut w = FieldWriter::with_domain(TERMS_DOMAIN_TAG, capacity);

        w.address(&self.borrower);
        w.address(&self.broker_or_zero());
        w.address(&self.currency);

        // Lists past u32::MAX cannot be held in memory; validate() caps the
        // count far below that anyway.
        w.list_header(self.collateral.len() as u32);
        for item in &self.collateral {
            w.address(&item.contract);
            w.uint(item.item_id);
        }

        w.uint(u128::from(self.borrower_nonce));
        w.uint(u128::from(self.broker_nonce));
        w.uint(self.amount);
        w.uint(u128::from(self.rate));
        w.uint(u128::from(self.deadline));

        w.finish()
    }
}

/// Deterministic digest of a set of terms.
pub fn hash_terms(terms: &LoanTerms) -> Digest {
    Digest::from_bytes(keccak256(&terms.canonical_bytes()))
}

/// Digest a payer signs to authorize paying `amount` toward `loan_id`
/// while `outstanding` is still owed.
pub fn hash_repayment(loan_id: u64, amount: u128, outstanding: u128) -> Digest {
    let mut w = FieldWriter::with_domain(REPAYMENT_DOMAIN_TAG, 3 * UINT_FIELD);
    w.uint(u128::from(loan_id));
    w.uint(amount);
    w.uint(outstanding);
    Digest::from_bytes(keccak256(&w.finish()))
}

/// Recovers whoever signed `terms`.
///
/// Equivalent to `recover_signer(scheme, signature, &hash_terms(terms))`.
pub fn get_signer<S: SignatureScheme + ?Sized>(
    scheme: &S,
    signature: &RecoverableSignature,
    terms: &LoanTerms,
) -> Result<Address, SignatureError> {
    recover_signer(scheme, signature, &hash_terms(terms))
}
