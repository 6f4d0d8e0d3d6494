//! # Signature Recovery
//!
//! Pawnda authenticates callers by *recovering* the signer of a digest
//! rather than verifying against a known key. The recovered address is then
//! compared with the party the terms name. No key registry, no handshake.
//!
//! Recovery sits behind the [`SignatureScheme`] trait so the loan state
//! machine can be exercised without real elliptic-curve math:
//!
//! - [`Secp256k1Scheme`]: production. ECDSA over secp256k1 via `k256`.
//! - [`MockScheme`]: deterministic, for tests. The "signature" carries the
//!   signer and the digest in the clear.
//!
//! ## Canonical form
//!
//! A [`RecoverableSignature`] is 65 bytes: `r ‖ s ‖ v`. Clients disagree on
//! `v`: some emit `{0, 1}`, others `{27, 28}`. Both are folded to `{0, 1}`
//! on parse, everything else is rejected as malformed. High-`s` signatures
//! are accepted and normalized before recovery, flipping the parity bit so
//! the same key comes back.

use k256::ecdsa::{RecoveryId, Signature as EcdsaSignature, VerifyingKey};
use k256::elliptic_curve::sec1::ToEncodedPoint;
use k256::PublicKey;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use thiserror::Error;

use super::hash::{signed_message_hash, Digest};
use crate::config::{LEGACY_RECOVERY_OFFSET, SIGNATURE_LENGTH};
use crate::identity::Address;

/// Errors during signature handling and signer authorization.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SignatureError {
    /// Wrong width, bad hex, or a recovery discriminator outside the
    /// canonical range.
    #[error("malformed signature: {0}")]
    Malformed(String),

    /// Recovery produced the null identifier (or no identity at all).
    #[error("signature recovers to the zero address")]
    ZeroRecovery,

    /// The recovered signer is not the party the terms declare.
    #[error("signer mismatch: expected {expected}, recovered {recovered}")]
    Mismatch {
        /// The declared party.
        expected: Address,
        /// Who actually signed.
        recovered: Address,
    },

    /// The terms name a broker but no broker signature was supplied.
    #[error("terms declare broker {0} but no broker signature was supplied")]
    MissingBrokerSignature(Address),

    /// The nonce was already consumed by an earlier loan for this account.
    #[error("nonce {nonce} already used by {account}")]
    Replayed {
        /// The signing account.
        account: Address,
        /// The reused nonce.
        nonce: u64,
    },
}

// ---------------------------------------------------------------------------
// RecoverableSignature
// ---------------------------------------------------------------------------

/// A 65-byte recoverable ECDSA signature with a canonical `v ∈ {0, 1}`.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct RecoverableSignature {
    r: [u8; 32],
    s: [u8; 32],
    v: u8,
}

impl RecoverableSignature {
    /// Assembles a signature from its scalars and discriminator.
    ///
    /// `v` may use either client convention; it is stored canonically.
    pub fn from_parts(r: [u8; 32], s: [u8; 32], v: u8) -> Result<Self, SignatureError> {
        let v = canonical_recovery_id(v)?;
        Ok(Self { r, s, v })
    }

    /// Parses the 65-byte wire form `r ‖ s ‖ v`.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, SignatureError> {
        if bytes.len() != SIGNATURE_LENGTH {
            return Err(SignatureError::Malformed(format!(
                "expected {} bytes, got {}",
                SIGNATURE_LENGTH,
                bytes.len()
            )));
        }
        let mut r = [0u8; 32];
        let mut s = [0u8; 32];
        r.copy_from_slice(&bytes[..32]);
        s.copy_from_slice(&bytes[32..64]);
        Self::from_parts(r, s, bytes[64])
    }

    /// Parses hex, with or without `0x`.
    pub fn from_hex(s: &str) -> Result<Self, SignatureError> {
        let trimmed = s.trim();
        let bytes = hex::decode(trimmed.strip_prefix("0x").unwrap_or(trimmed))
            .map_err(|e| SignatureError::Malformed(format!("invalid hex: {}", e)))?;
        Self::from_bytes(&bytes)
    }

    /// The 65-byte wire form with canonical `v`.
    pub fn to_bytes(&self) -> [u8; SIGNATURE_LENGTH] {
        let mut out = [0u8; SIGNATURE_LENGTH];
        out[..32].copy_from_slice(&self.r);
        out[32..64].copy_from_slice(&self.s);
        out[64] = self.v;
        out
    }

    /// `0x`-prefixed hex of [`to_bytes`](Self::to_bytes).
    pub fn to_hex(&self) -> String {
        format!("0x{}", hex::encode(self.to_bytes()))
    }

    pub fn r(&self) -> &[u8; 32] {
        &self.r
    }

    pub fn s(&self) -> &[u8; 32] {
        &self.s
    }

    /// The canonical recovery discriminator, `0` or `1`.
    pub fn v(&self) -> u8 {
        self.v
    }
}

/// Folds the `{27, 28}` convention onto `{0, 1}`.
fn canonical_recovery_id(v: u8) -> Result<u8, SignatureError> {
    match v {
        0 | 1 => Ok(v),
        v if v == LEGACY_RECOVERY_OFFSET || v == LEGACY_RECOVERY_OFFSET + 1 => {
            Ok(v - LEGACY_RECOVERY_OFFSET)
        }
        other => Err(SignatureError::Malformed(format!(
            "recovery discriminator {} out of range",
            other
        ))),
    }
}

impl fmt::Debug for RecoverableSignature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "RecoverableSignature({})", self.to_hex())
    }
}

impl Serialize for RecoverableSignature {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_hex())
    }
}

impl<'de> Deserialize<'de> for RecoverableSignature {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        RecoverableSignature::from_hex(&s).map_err(serde::de::Error::custom)
    }
}

// ---------------------------------------------------------------------------
// Schemes
// ---------------------------------------------------------------------------

/// A capability that recovers the signing address of a digest.
pub trait SignatureScheme: Send + Sync {
    /// Recovers the address that produced `signature` over `digest`.
    ///
    /// Implementations do not need to reject the zero address; callers go
    /// through [`recover_signer`], which does.
    fn recover(
        &self,
        signature: &RecoverableSignature,
        digest: &Digest,
    ) -> Result<Address, SignatureError>;
}

/// Production recovery: secp256k1 ECDSA over the signed-message prehash.
#[derive(Debug, Clone, Copy, Default)]
pub struct Secp256k1Scheme;

impl SignatureScheme for Secp256k1Scheme {
    fn recover(
        &self,
        signature: &RecoverableSignature,
        digest: &Digest,
    ) -> Result<Address, SignatureError> {
        let mut rs = [0u8; 64];
        rs[..32].copy_from_slice(signature.r());
        rs[32..].copy_from_slice(signature.s());

        // Zero or out-of-range scalars recover to nobody.
        let mut ecdsa_sig =
            EcdsaSignature::from_slice(&rs).map_err(|_| SignatureError::ZeroRecovery)?;
        let mut recovery_id = RecoveryId::from_byte(signature.v())
            .ok_or_else(|| SignatureError::Malformed("recovery discriminator".into()))?;

        if let Some(normalized) = ecdsa_sig.normalize_s() {
            ecdsa_sig = normalized;
            recovery_id = RecoveryId::new(!recovery_id.is_y_odd(), recovery_id.is_x_reduced());
        }

        let prehash = signed_message_hash(digest);
        let verifying_key = VerifyingKey::recover_from_prehash(&prehash, &ecdsa_sig, recovery_id)
            .map_err(|_| SignatureError::ZeroRecovery)?;

        let public_key = PublicKey::from(&verifying_key);
        let point = public_key.to_encoded_point(false);
        Ok(Address::from_public_key_body(&point.as_bytes()[1..]))
    }
}

/// Deterministic stand-in for tests.
///
/// [`MockScheme::sign`] packs the signer into `r` and the digest into `s`.
/// Recovery against the same digest yields the signer; against any other
/// digest it yields an unrelated address, the way a real signature over
/// different terms would.
#[derive(Debug, Clone, Copy, Default)]
pub struct MockScheme;

impl MockScheme {
    /// Produces a mock signature by `signer` over `digest`.
    pub fn sign(signer: &Address, digest: &Digest) -> RecoverableSignature {
        let mut r = [0u8; 32];
        r[12..].copy_from_slice(signer.as_bytes());
        RecoverableSignature {
            r,
            s: *digest.as_bytes(),
            v: 0,
        }
    }
}

impl SignatureScheme for MockScheme {
    fn recover(
        &self,
        signature: &RecoverableSignature,
        digest: &Digest,
    ) -> Result<Address, SignatureError> {
        if signature.s() == digest.as_bytes() {
            let mut bytes = [0u8; 20];
            bytes.copy_from_slice(&signature.r()[12..]);
            Ok(Address::from_bytes(bytes))
        } else {
            let mut body = [0u8; 64];
            body[..32].copy_from_slice(signature.r());
            body[32..].copy_from_slice(signature.s());
            Ok(Address::from_public_key_body(&body))
        }
    }
}

/// Recovers the signer of `digest`, rejecting the null identifier.
pub fn recover_signer<S: SignatureScheme + ?Sized>(
    scheme: &S,
    signature: &RecoverableSignature,
    digest: &Digest,
) -> Result<Address, SignatureError> {
    let signer = scheme.recover(signature, digest)?;
    if signer.is_zero() {
        tracing::debug!(digest = %digest, "signature recovered to the zero address");
        return Err(SignatureError::ZeroRecovery);
    }
    Ok(signer)
}
