//! # Key Management
//!
//! secp256k1 keypairs for Pawnda participants.
//!
//! Borrowers, lenders and brokers sign loan terms off-line; the ledger never
//! sees their keys, only the signatures. This module is therefore mostly
//! used by client tooling (`pawnda-node sign-terms`), tests, and the node's
//! own custodial identity.
//!
//! ## Security considerations
//!
//! - Key generation uses the OS RNG (`OsRng`).
//! - `SigningKeypair` does not implement `Serialize`. Exporting the secret
//!   is an explicit call to [`SigningKeypair::secret_key_hex`].
//! - `Debug` prints the address, never key material.

use k256::ecdsa::SigningKey;
use k256::elliptic_curve::sec1::ToEncodedPoint;
use k256::PublicKey;
use rand::rngs::OsRng;
use std::fmt;
use thiserror::Error;

use super::hash::{signed_message_hash, Digest};
use super::signatures::RecoverableSignature;
use crate::config::SECRET_KEY_LENGTH;
use crate::identity::Address;

/// Errors that can occur during key operations.
#[derive(Debug, Error)]
pub enum KeyError {
    #[error("invalid secret key: wrong length or not a valid scalar")]
    InvalidSecretKey,

    #[error("signing failed")]
    SigningFailed,
}

/// A secp256k1 signing keypair.
///
/// # Examples
///
/// ```
/// use pawnda_protocol::crypto::keys::SigningKeypair;
/// use pawnda_protocol::crypto::hash::{keccak256, Digest};
///
/// let kp = SigningKeypair::generate();
/// let digest = Digest::from_bytes(keccak256(b"terms"));
/// let sig = kp.sign_digest(&digest).unwrap();
/// assert_eq!(sig.to_bytes().len(), 65);
/// ```
#[derive(Clone)]
pub struct SigningKeypair {
    signing_key: SigningKey,
}

impl SigningKeypair {
    /// Generate a fresh keypair using the OS cryptographic RNG.
    pub fn generate() -> Self {
        Self {
            signing_key: SigningKey::random(&mut OsRng),
        }
    }

    /// Reconstruct a keypair from a raw 32-byte secret scalar.
    ///
    /// Zero and values ≥ the curve order are rejected.
    pub fn from_bytes(secret: &[u8; SECRET_KEY_LENGTH]) -> Result<Self, KeyError> {
        let signing_key =
            SigningKey::from_slice(secret).map_err(|_| KeyError::InvalidSecretKey)?;
        Ok(Self { signing_key })
    }

    /// Reconstruct a keypair from a hex-encoded secret key (`0x` optional).
    pub fn from_hex(hex_str: &str) -> Result<Self, KeyError> {
        let trimmed = hex_str.trim();
        let bytes = hex::decode(trimmed.strip_prefix("0x").unwrap_or(trimmed))
            .map_err(|_| KeyError::InvalidSecretKey)?;
        if bytes.len() != SECRET_KEY_LENGTH {
            return Err(KeyError::InvalidSecretKey);
        }
        let mut arr = [0u8; SECRET_KEY_LENGTH];
        arr.copy_from_slice(&bytes);
        Self::from_bytes(&arr)
    }

    /// The address this key signs as.
    pub fn address(&self) -> Address {
        let public_key = PublicKey::from(self.signing_key.verifying_key());
        let point = public_key.to_encoded_point(false);
        Address::from_public_key_body(&point.as_bytes()[1..])
    }

    /// Sign a terms digest.
    ///
    /// The digest is wrapped with the signed-message prefix before signing
    /// (see [`signed_message_hash`]), matching what wallets produce.
    pub fn sign_digest(&self, digest: &Digest) -> Result<RecoverableSignature, KeyError> {
        let prehash = signed_message_hash(digest);
        let (signature, recovery_id) = self
            .signing_key
            .sign_prehash_recoverable(&prehash)
            .map_err(|_| KeyError::SigningFailed)?;

        let bytes = signature.to_bytes();
        let mut r = [0u8; 32];
        let mut s = [0u8; 32];
        r.copy_from_slice(&bytes[..32]);
        s.copy_from_slice(&bytes[32..]);
        RecoverableSignature::from_parts(r, s, recovery_id.to_byte())
            .map_err(|_| KeyError::SigningFailed)
    }

    /// Exports the raw secret scalar. Handle with care.
    pub fn secret_key_bytes(&self) -> [u8; SECRET_KEY_LENGTH] {
        let mut out = [0u8; SECRET_KEY_LENGTH];
        out.copy_from_slice(&self.signing_key.to_bytes());
        out
    }

    /// Exports the secret scalar as `0x`-prefixed hex.
    pub fn secret_key_hex(&self) -> String {
        format!("0x{}", hex::encode(self.secret_key_bytes()))
    }
}

impl fmt::Debug for SigningKeypair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "SigningKeypair(address={})", self.address())
    }
}

impl PartialEq for SigningKeypair {
    /// Two keypairs are equal if they sign as the same address.
    fn eq(&self, other: &Self) -> bool {
        self.address() == other.address()
    }
}

impl Eq for SigningKeypair {}
