// Copyright (c) 2026 Pawnda Contributors. MIT License.
// See LICENSE for details.

//! # Pawnda Protocol: Core Library
//!
//! Shared vocabulary for Pawnda, a peer-to-peer collateralized lending
//! ledger. Borrower and lender agree on terms off-line and each sign a
//! canonical digest of them; whoever submits the signed terms never has to
//! authenticate any other way.
//!
//! ## Architecture
//!
//! - **config**: Protocol constants: encoding tags, widths, rate bounds,
//!   network names, default ports.
//! - **crypto**: Keccak/BLAKE3 hashing, secp256k1 keys, signature recovery.
//! - **identity**: 20-byte addresses for accounts and asset contracts.
//! - **terms**: Loan terms, their validation and their canonical digest.
//!
//! The ledger itself lives in `pawnda-contracts`; this crate has no state.

pub mod config;
pub mod crypto;
pub mod identity;
pub mod terms;
