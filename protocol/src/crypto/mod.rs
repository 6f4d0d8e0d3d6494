//! # Cryptographic Primitives for Pawnda
//!
//! Everything that touches a signature or a hash goes through here.
//!
//! - **secp256k1 ECDSA** with public key recovery, so a signature alone
//!   identifies its author. Wallet-held keys work unchanged.
//! - **Keccak-256** for terms digests and address derivation.
//! - **BLAKE3** for internal commitments nobody signs.
//!
//! All of it is a thin, typed wrapper around audited crates (`k256`, `sha3`,
//! `blake3`). Nothing here implements curve arithmetic by hand.

pub mod hash;
pub mod keys;
pub mod signatures;

pub use hash::{blake3_hash, keccak256, merkle_root, signed_message_hash, Digest};
pub use keys::{KeyError, SigningKeypair};
pub use signatures::{
    recover_signer, MockScheme, RecoverableSignature, Secp256k1Scheme, SignatureError,
    SignatureScheme,
};
