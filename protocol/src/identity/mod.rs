//! # Identity Module
//!
//! Every participant and every asset contract in Pawnda is identified by a
//! 20-byte [`Address`]. Participants own a secp256k1 key (see
//! [`crate::crypto::keys`]); their address is derived from the public key,
//! which is what makes signature *recovery* sufficient for authentication:
//! recover the key, derive the address, compare.

pub mod address;

pub use address::{Address, AddressError};
