//! Integration tests for off-line signing and signer recovery.
//!
//! These go through the public API only, the way a client tool would:
//! build terms, hash them, sign with a wallet key, ship the 65-byte
//! signature around as hex, and recover the signer on the other side.

use pawnda_protocol::crypto::hash::{keccak256, Digest};
use pawnda_protocol::crypto::keys::SigningKeypair;
use pawnda_protocol::crypto::signatures::{
    recover_signer, MockScheme, RecoverableSignature, Secp256k1Scheme, SignatureError,
};
use pawnda_protocol::identity::Address;
use pawnda_protocol::terms::{get_signer, hash_terms, CollateralItem, LoanTerms};

// ---------------------------------------------------------------------------
// Test Helpers
// ---------------------------------------------------------------------------

const BORROWER_KEY: &str = "0xb8590d1d80f33d27ad26331a6126987d728897a0f92581c280236ffae1568c0e";
const ONE_TOKEN: u128 = 1_000_000_000_000_000_000;

fn borrower() -> SigningKeypair {
    SigningKeypair::from_hex(BORROWER_KEY).expect("fixture key")
}

fn terms_for(borrower: Address) -> LoanTerms {
    LoanTerms {
        borrower,
        broker: None,
        currency: Address::from_label("pawnda.development.token"),
        collateral: vec![CollateralItem::new(
            Address::from_label("pawnda.development.nifties"),
            0,
        )],
        borrower_nonce: 0,
        broker_nonce: 0,
        amount: 100 * ONE_TOKEN,
        rate: 10_000,
        deadline: 1_700_604_800,
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[test]
fn borrower_signature_recovers_borrower() {
    let kp = borrower();
    let terms = terms_for(kp.address());

    let signature = kp.sign_digest(&hash_terms(&terms)).unwrap();
    let signer = get_signer(&Secp256k1Scheme, &signature, &terms).unwrap();

    assert_eq!(signer, terms.borrower, "signer is not the borrower");
}

#[test]
fn signature_survives_hex_transport_in_either_convention() {
    let kp = borrower();
    let terms = terms_for(kp.address());
    let signature = kp.sign_digest(&hash_terms(&terms)).unwrap();

    // Canonical v.
    let wire = signature.to_hex();
    let parsed = RecoverableSignature::from_hex(&wire).unwrap();
    assert_eq!(
        get_signer(&Secp256k1Scheme, &parsed, &terms).unwrap(),
        kp.address()
    );

    // Wallet-style v = 27/28.
    let mut legacy = signature.to_bytes();
    legacy[64] += 27;
    let parsed = RecoverableSignature::from_hex(&hex::encode(legacy)).unwrap();
    assert_eq!(parsed.v(), signature.v());
    assert_eq!(
        get_signer(&Secp256k1Scheme, &parsed, &terms).unwrap(),
        kp.address()
    );
}

#[test]
fn someone_elses_signature_does_not_recover_borrower() {
    let kp = borrower();
    let impostor = SigningKeypair::generate();
    let terms = terms_for(kp.address());

    let signature = impostor.sign_digest(&hash_terms(&terms)).unwrap();
    let signer = get_signer(&Secp256k1Scheme, &signature, &terms).unwrap();

    assert_eq!(signer, impostor.address());
    assert_ne!(signer, terms.borrower);
}

#[test]
fn signature_over_other_terms_does_not_transfer() {
    let kp = borrower();
    let terms = terms_for(kp.address());
    let signature = kp.sign_digest(&hash_terms(&terms)).unwrap();

    let mut bigger = terms.clone();
    bigger.amount = 1_000 * ONE_TOKEN;

    match get_signer(&Secp256k1Scheme, &signature, &bigger) {
        Ok(signer) => assert_ne!(signer, kp.address()),
        Err(e) => assert_eq!(e, SignatureError::ZeroRecovery),
    }
}

#[test]
fn truncated_signature_is_malformed() {
    let kp = borrower();
    let terms = terms_for(kp.address());
    let bytes = kp.sign_digest(&hash_terms(&terms)).unwrap().to_bytes();

    assert!(matches!(
        RecoverableSignature::from_bytes(&bytes[..64]),
        Err(SignatureError::Malformed(_))
    ));
}

#[test]
fn mock_and_real_schemes_agree_on_the_signer() {
    let kp = borrower();
    let terms = terms_for(kp.address());
    let digest = hash_terms(&terms);

    let real = kp.sign_digest(&digest).unwrap();
    let mock = MockScheme::sign(&kp.address(), &digest);

    assert_eq!(
        recover_signer(&Secp256k1Scheme, &real, &digest).unwrap(),
        recover_signer(&MockScheme, &mock, &digest).unwrap()
    );
}

#[test]
fn terms_json_roundtrip_preserves_digest() {
    let terms = terms_for(borrower().address());
    let json = serde_json::to_string(&terms).unwrap();
    let back: LoanTerms = serde_json::from_str(&json).unwrap();
    assert_eq!(hash_terms(&back), hash_terms(&terms));
}

#[test]
fn digest_is_not_raw_keccak_of_fields() {
    // The domain tag is part of the preimage.
    let terms = terms_for(borrower().address());
    let untagged = keccak256(&terms.canonical_bytes()[b"pawnda/loan-terms/v1".len()..]);
    assert_ne!(hash_terms(&terms), Digest::from_bytes(untagged));
}
