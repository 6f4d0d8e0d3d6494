//! # Protocol Configuration & Constants
//!
//! Every magic number in Pawnda lives here. The values in the "Terms
//! Encoding" and "Cryptographic Parameters" sections are part of the signed
//! wire format: independent signing tools reproduce digests from them
//! byte-for-byte, so they never change within a protocol version.

// ---------------------------------------------------------------------------
// Protocol Version
// ---------------------------------------------------------------------------

/// The full protocol version string.
pub const PROTOCOL_VERSION: &str = "0.1.0";

// ---------------------------------------------------------------------------
// Terms Encoding
// ---------------------------------------------------------------------------

/// Domain tag prepended to every canonical terms encoding. Bumping the
/// trailing version invalidates every outstanding off-line signature.
pub const TERMS_DOMAIN_TAG: &[u8] = b"pawnda/loan-terms/v1";

/// Domain tag for a payer's repayment authorization.
pub const REPAYMENT_DOMAIN_TAG: &[u8] = b"pawnda/repayment/v1";

/// Type tag for a 20-byte address field.
pub const TAG_ADDRESS: u8 = 0xA0;

/// Type tag for an unsigned integer field, encoded as 32 bytes big-endian.
pub const TAG_UINT: u8 = 0x10;

/// Type tag for a list header, followed by a 4-byte big-endian element count.
pub const TAG_LIST: u8 = 0x4C;

/// Width of an encoded unsigned integer. Matches a 256-bit machine word so
/// that EVM-side tooling can reproduce the encoding with `abi.encode`-style
/// padding.
pub const UINT_ENCODED_LENGTH: usize = 32;

// ---------------------------------------------------------------------------
// Cryptographic Parameters
// ---------------------------------------------------------------------------

/// secp256k1 ECDSA with public key recovery.
pub const SIGNING_ALGORITHM: &str = "secp256k1-ECDSA";

/// Account and contract identifier length in bytes.
pub const ADDRESS_LENGTH: usize = 20;

/// Digest length in bytes. Keccak-256 output.
pub const DIGEST_LENGTH: usize = 32;

/// Recoverable signature length: `r` (32) ‖ `s` (32) ‖ `v` (1).
pub const SIGNATURE_LENGTH: usize = 65;

/// Secret key length in bytes.
pub const SECRET_KEY_LENGTH: usize = 32;

/// Offset some client libraries add to the recovery discriminator
/// (`v ∈ {27, 28}` instead of `{0, 1}`).
pub const LEGACY_RECOVERY_OFFSET: u8 = 27;

/// Prefix of the personal-message convention used when a digest is signed:
/// the ECDSA prehash is `keccak256(prefix ‖ digest)`.
pub const SIGNED_MESSAGE_PREFIX: &[u8] = b"\x19Ethereum Signed Message:\n32";

// ---------------------------------------------------------------------------
// Loan Parameters
// ---------------------------------------------------------------------------

/// Rates are expressed in basis points: parts per 10 000.
pub const BASIS_POINTS_DENOMINATOR: u128 = 10_000;

/// Upper bound on a loan rate (100%).
pub const MAX_RATE_BPS: u32 = 10_000;

/// Upper bound on the number of collateral items a single loan may pledge.
/// Keeps the encoded list count well inside its 4-byte header.
pub const MAX_COLLATERAL_ITEMS: usize = 256;

/// Number of decimal places in the fixture currency. Amounts such as
/// `100 × 10^18` are the usual way principal is quoted.
pub const CURRENCY_DECIMALS: u8 = 18;

// ---------------------------------------------------------------------------
// Network Parameters
// ---------------------------------------------------------------------------

/// Local development network. Fixture assets are deployed at startup.
pub const NETWORK_DEVELOPMENT: &str = "development";

/// Public test network.
pub const NETWORK_TESTNET: &str = "testnet";

/// Production network.
pub const NETWORK_MAINNET: &str = "mainnet";

/// Default HTTP API port.
pub const DEFAULT_RPC_PORT: u16 = 8545;

/// Default Prometheus metrics port.
pub const DEFAULT_METRICS_PORT: u16 = 9615;

// ---------------------------------------------------------------------------
// Utility
// ---------------------------------------------------------------------------

/// Returns `true` if the network name is one we know how to run.
pub fn is_known_network(name: &str) -> bool {
    matches!(name, NETWORK_DEVELOPMENT | NETWORK_TESTNET | NETWORK_MAINNET)
}

/// Whether fixture assets (the faucet token and collectible) are deployed
/// on this network. Only the development network gets free money.
pub fn deploys_fixture_assets(name: &str) -> bool {
    name == NETWORK_DEVELOPMENT
}
