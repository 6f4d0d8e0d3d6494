//! # Hashing Utilities
//!
//! Two hash functions, two jobs:
//!
//! - **Keccak-256**: everything that crosses the signing boundary. Terms
//!   digests, the signed-message prehash, address derivation. Off-line
//!   signing tools already speak Keccak, so the verifier does too.
//!
//! - **BLAKE3**: internal commitments that nobody signs, like the audit
//!   root over loan records. Faster, and nothing external needs to agree.

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use sha3::{Digest as _, Keccak256};
use std::fmt;

use crate::config::{DIGEST_LENGTH, SIGNED_MESSAGE_PREFIX};

/// A 32-byte digest: the object that is actually signed and verified.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct Digest([u8; DIGEST_LENGTH]);

impl Digest {
    /// Wraps raw digest bytes.
    pub const fn from_bytes(bytes: [u8; DIGEST_LENGTH]) -> Self {
        Self(bytes)
    }

    /// Returns the raw bytes.
    pub fn as_bytes(&self) -> &[u8; DIGEST_LENGTH] {
        &self.0
    }

    /// `0x`-prefixed lowercase hex.
    pub fn to_hex(&self) -> String {
        format!("0x{}", hex::encode(self.0))
    }

    /// Parses a digest from hex, with or without `0x`.
    pub fn from_hex(s: &str) -> Result<Self, hex::FromHexError> {
        let bytes = hex::decode(s.strip_prefix("0x").unwrap_or(s))?;
        if bytes.len() != DIGEST_LENGTH {
            return Err(hex::FromHexError::InvalidStringLength);
        }
        let mut arr = [0u8; DIGEST_LENGTH];
        arr.copy_from_slice(&bytes);
        Ok(Self(arr))
    }
}

impl fmt::Debug for Digest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Digest({})", self.to_hex())
    }
}

impl fmt::Display for Digest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

impl Serialize for Digest {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_hex())
    }
}

impl<'de> Deserialize<'de> for Digest {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        Digest::from_hex(&s).map_err(serde::de::Error::custom)
    }
}

/// Compute the Keccak-256 hash of the input data.
///
/// This is the original Keccak padding, not NIST SHA3-256. The two differ
/// in a single domain byte and produce unrelated outputs, and every EVM
/// tool uses Keccak.
///
/// # Example
///
/// ```
/// use pawnda_protocol::crypto::keccak256;
///
/// let hash = keccak256(b"pawnda");
/// assert_eq!(hash.len(), 32);
/// ```
pub fn keccak256(data: &[u8]) -> [u8; 32] {
    let mut hasher = Keccak256::new();
    hasher.update(data);
    let result = hasher.finalize();
    let mut output = [0u8; 32];
    output.copy_from_slice(&result);
    output
}

/// Hash multiple byte slices together without concatenating them first.
pub fn keccak256_multi(parts: &[&[u8]]) -> [u8; 32] {
    let mut hasher = Keccak256::new();
    for part in parts {
        hasher.update(part);
    }
    let result = hasher.finalize();
    let mut output = [0u8; 32];
    output.copy_from_slice(&result);
    output
}

/// The ECDSA prehash for a signed digest under the personal-message
/// convention: `keccak256("\x19Ethereum Signed Message:\n32" ‖ digest)`.
///
/// Wallets refuse to sign raw 32-byte hashes without this prefix, so the
/// verifier recovers over the prefixed form.
pub fn signed_message_hash(digest: &Digest) -> [u8; 32] {
    keccak256_multi(&[SIGNED_MESSAGE_PREFIX, digest.as_bytes()])
}

/// Compute the BLAKE3 hash of the input data.
pub fn blake3_hash(data: &[u8]) -> [u8; 32] {
    *blake3::hash(data).as_bytes()
}

/// Hash multiple byte slices together with BLAKE3.
pub fn blake3_hash_multi(parts: &[&[u8]]) -> [u8; 32] {
    let mut hasher = blake3::Hasher::new();
    for part in parts {
        hasher.update(part);
    }
    *hasher.finalize().as_bytes()
}

/// Compute a binary Merkle root over leaf hashes using BLAKE3.
///
/// An odd node at the end of a level is paired with itself. A single leaf
/// is also paired with itself, so the root is always a hash output and
/// never a raw leaf. An empty input returns all zeros.
pub fn merkle_root(leaves: &[[u8; 32]]) -> [u8; 32] {
    if leaves.is_empty() {
        return [0u8; 32];
    }

    let mut current_level: Vec<[u8; 32]> = leaves.to_vec();

    if current_level.len() == 1 {
        return blake3_hash_multi(&[current_level[0].as_slice(), current_level[0].as_slice()]);
    }

    while current_level.len() > 1 {
        let mut next_level = Vec::with_capacity((current_level.len() + 1) / 2);

        for chunk in current_level.chunks(2) {
            let left = &chunk[0];
            let right = if chunk.len() == 2 { &chunk[1] } else { &chunk[0] };
            next_level.push(blake3_hash_multi(&[left.as_slice(), right.as_slice()]));
        }

        current_level = next_level;
    }

    current_level[0]
}
