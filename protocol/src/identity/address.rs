//! # Addresses
//!
//! A Pawnda address is the 20-byte identifier of an account or an asset
//! contract. Account addresses are derived from secp256k1 public keys the
//! same way EVM chains do it:
//!
//! ```text
//! uncompressed_pubkey (65 bytes, 0x04 ‖ X ‖ Y)
//!     -> keccak256(X ‖ Y) -> 32 bytes
//!     -> last 20 bytes
//! ```
//!
//! so a key held in any Ethereum wallet maps to the same identity here.
//! Contract addresses for in-process assets are derived from a label with
//! [`Address::from_label`].

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

use crate::config::ADDRESS_LENGTH;
use crate::crypto::hash::keccak256;

/// Errors from parsing an address string.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AddressError {
    /// The string is not valid hex.
    #[error("invalid hex in address: {0}")]
    InvalidHex(String),

    /// The decoded bytes are not exactly 20 bytes long.
    #[error("invalid address length: expected 20 bytes, got {0}")]
    InvalidLength(usize),
}

/// A 20-byte account or contract identifier.
///
/// `Address::ZERO` is the null identifier. It is never a legitimate signer
/// and, in positional terms, stands for "no broker".
#[derive(Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Address([u8; ADDRESS_LENGTH]);

impl Address {
    /// The null identifier.
    pub const ZERO: Address = Address([0u8; ADDRESS_LENGTH]);

    /// Wraps raw address bytes.
    pub const fn from_bytes(bytes: [u8; ADDRESS_LENGTH]) -> Self {
        Self(bytes)
    }

    /// Returns the raw bytes.
    pub fn as_bytes(&self) -> &[u8; ADDRESS_LENGTH] {
        &self.0
    }

    /// Returns `true` for the null identifier.
    pub fn is_zero(&self) -> bool {
        self.0 == [0u8; ADDRESS_LENGTH]
    }

    /// Derives an address from the 64-byte `X ‖ Y` body of an uncompressed
    /// secp256k1 public key.
    pub fn from_public_key_body(xy: &[u8]) -> Self {
        let hash = keccak256(xy);
        let mut bytes = [0u8; ADDRESS_LENGTH];
        bytes.copy_from_slice(&hash[32 - ADDRESS_LENGTH..]);
        Self(bytes)
    }

    /// Derives a deterministic address from a human-readable label.
    ///
    /// Used to give in-process asset contracts stable identities, e.g.
    /// `Address::from_label("pawnda.development.token")`.
    pub fn from_label(label: &str) -> Self {
        Self::from_public_key_body(label.as_bytes())
    }

    /// Lowercase `0x`-prefixed hex.
    pub fn to_hex(&self) -> String {
        format!("0x{}", hex::encode(self.0))
    }

    /// Mixed-case checksummed hex (EIP-55).
    ///
    /// Each hex letter is uppercased when the matching nibble of
    /// `keccak256(lowercase_hex)` is ≥ 8. Parsing accepts any casing; this
    /// is for display to humans who paste addresses around.
    pub fn to_checksum_hex(&self) -> String {
        let lower = hex::encode(self.0);
        let hash = keccak256(lower.as_bytes());
        let mut out = String::with_capacity(2 + lower.len());
        out.push_str("0x");
        for (i, ch) in lower.chars().enumerate() {
            let byte = hash[i / 2];
            let nibble = if i % 2 == 0 { byte >> 4 } else { byte & 0x0f };
            if ch.is_ascii_alphabetic() && nibble >= 8 {
                out.push(ch.to_ascii_uppercase());
            } else {
                out.push(ch);
            }
        }
        out
    }

    /// Parses an address from hex, with or without the `0x` prefix.
    pub fn from_hex(s: &str) -> Result<Self, AddressError> {
        let trimmed = s
            .strip_prefix("0x")
            .or_else(|| s.strip_prefix("0X"))
            .unwrap_or(s);
        let bytes = hex::decode(trimmed).map_err(|e| AddressError::InvalidHex(e.to_string()))?;
        if bytes.len() != ADDRESS_LENGTH {
            return Err(AddressError::InvalidLength(bytes.len()));
        }
        let mut arr = [0u8; ADDRESS_LENGTH];
        arr.copy_from_slice(&bytes);
        Ok(Self(arr))
    }
}

impl fmt::Debug for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Address({})", self.to_hex())
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

impl FromStr for Address {
    type Err = AddressError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_hex(s)
    }
}

impl From<[u8; ADDRESS_LENGTH]> for Address {
    fn from(bytes: [u8; ADDRESS_LENGTH]) -> Self {
        Self(bytes)
    }
}

impl Serialize for Address {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_hex())
    }
}

impl<'de> Deserialize<'de> for Address {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        Address::from_hex(&s).map_err(serde::de::Error::custom)
    }
}
