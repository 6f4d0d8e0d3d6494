//! Terminal walkthrough of a full Pawnda loan.
//!
//! A borrower pledges two collectibles, signs the terms with a real
//! secp256k1 key, a lender funds the loan, and the borrower pays it back in
//! two installments until the collateral comes home.
//!
//! Run with:
//!   cargo run -p pawnda-contracts --example lifecycle

use std::sync::Arc;
use std::time::Instant;

use parking_lot::Mutex;

use pawnda_contracts::{
    AssetEscrow, CollectibleRegistry, FungibleCurrency, FungibleToken, LoanLedger,
    NonFungibleCollateral,
};
use pawnda_protocol::crypto::keys::SigningKeypair;
use pawnda_protocol::crypto::Digest;
use pawnda_protocol::identity::Address;
use pawnda_protocol::terms::{hash_terms, CollateralItem, LoanTerms};

// ---------------------------------------------------------------------------
// ANSI color constants
// ---------------------------------------------------------------------------

const RESET: &str = "\x1b[0m";
const BOLD: &str = "\x1b[1m";
const DIM: &str = "\x1b[2m";

const GREEN: &str = "\x1b[32m";
const YELLOW: &str = "\x1b[33m";
const BLUE: &str = "\x1b[34m";
const MAGENTA: &str = "\x1b[35m";
const CYAN: &str = "\x1b[36m";
const WHITE: &str = "\x1b[37m";

const ONE_TOKEN: u128 = 1_000_000_000_000_000_000;

// ---------------------------------------------------------------------------
// Display helpers
// ---------------------------------------------------------------------------

fn section(num: u32, title: &str) {
    println!();
    println!(
        "{BOLD}{CYAN}===[{YELLOW} Step {num} {CYAN}]========================================{RESET}"
    );
    println!("{BOLD}{WHITE}  {title}{RESET}");
}

fn success(text: &str) {
    println!("{GREEN}  [OK] {text}{RESET}");
}

fn info(label: &str, value: &str) {
    println!("{WHITE}  {BOLD}{label}:{RESET} {YELLOW}{value}{RESET}");
}

fn timing(label: &str, elapsed: std::time::Duration) {
    let ms = elapsed.as_secs_f64() * 1000.0;
    println!("{DIM}{MAGENTA}  [{label}: {ms:.2} ms]{RESET}");
}

/// Formats base units as whole tokens with two decimals.
fn tokens(amount: u128) -> String {
    let whole = amount / ONE_TOKEN;
    let cents = (amount % ONE_TOKEN) / (ONE_TOKEN / 100);
    format!("{whole}.{cents:02} DUM")
}

fn balance_row(name: &str, balance: u128, color: &str) {
    println!(
        "  {color}{BOLD}{name:<10}{RESET}  {WHITE}{:>16}{RESET}",
        tokens(balance)
    );
}

fn balances(token: &Mutex<FungibleToken>, parties: &[(&str, Address, &str)]) {
    let token = token.lock();
    for (name, address, color) in parties {
        balance_row(name, token.balance_of(address), color);
    }
}

// ---------------------------------------------------------------------------
// Main
// ---------------------------------------------------------------------------

fn main() {
    let demo_start = Instant::now();

    // -----------------------------------------------------------------------
    // Step 1: Parties
    // -----------------------------------------------------------------------

    section(1, "Parties and fixture assets");

    let borrower_key = SigningKeypair::generate();
    let borrower = borrower_key.address();
    let lender = Address::from_label("lender");
    let custodian = Address::from_label("pawnda-custodian");

    let token = Arc::new(Mutex::new(FungibleToken::new(
        Address::from_label("dummy-token"),
        "Dummy Token",
        "DUM",
    )));
    let nifties = Arc::new(Mutex::new(CollectibleRegistry::new(
        Address::from_label("dummy-nifties"),
        "Dummy Nifties",
    )));

    let mut escrow = AssetEscrow::new();
    let token_address = escrow.register_currency(Arc::clone(&token));
    let nifties_address = escrow.register_collateral(Arc::clone(&nifties));
    let mut ledger = LoanLedger::new(custodian, escrow);

    info("Borrower", &borrower.to_checksum_hex());
    info("Lender", &lender.to_checksum_hex());
    info("Custodian", &custodian.to_checksum_hex());
    success("Ledger ready");

    // -----------------------------------------------------------------------
    // Step 2: Faucets and approvals
    // -----------------------------------------------------------------------

    section(2, "Faucet claims and approvals");

    let pledged: Vec<u128> = {
        let mut nifties = nifties.lock();
        let ids = vec![
            nifties.claim_free_nifty(&borrower).expect("nifty faucet"),
            nifties.claim_free_nifty(&borrower).expect("nifty faucet"),
        ];
        nifties.set_approval_for_all(&borrower, &custodian, true);
        ids
    };
    {
        let mut token = token.lock();
        token
            .claim_free_tokens(&lender, 1_000 * ONE_TOKEN)
            .expect("token faucet");
        token
            .claim_free_tokens(&borrower, 10 * ONE_TOKEN)
            .expect("token faucet");
        token.approve(&lender, &custodian, 1_000 * ONE_TOKEN);
        token.approve(&borrower, &custodian, 1_000 * ONE_TOKEN);
    }
    info("Nifties pledged", &format!("{pledged:?}"));

    let parties = [
        ("Borrower", borrower, BLUE),
        ("Lender", lender, GREEN),
        ("Custodian", custodian, MAGENTA),
    ];
    balances(&token, &parties);

    // -----------------------------------------------------------------------
    // Step 3: Sign the terms
    // -----------------------------------------------------------------------

    section(3, "Borrower signs the loan terms");

    let terms = LoanTerms {
        borrower,
        broker: None,
        currency: token_address,
        collateral: pledged
            .iter()
            .map(|&id| CollateralItem::new(nifties_address, id))
            .collect(),
        borrower_nonce: 0,
        broker_nonce: 0,
        amount: 100 * ONE_TOKEN,
        rate: 500,
        deadline: 1_900_000_000,
    };

    let t = Instant::now();
    let digest = hash_terms(&terms);
    let signature = borrower_key.sign_digest(&digest).expect("signing");
    timing("hash + sign", t.elapsed());

    info("Terms digest", &digest.to_hex());
    info("Signature", &signature.to_hex());

    // -----------------------------------------------------------------------
    // Step 4: Create the loan
    // -----------------------------------------------------------------------

    section(4, "Lender funds the loan");

    let t = Instant::now();
    let loan_id = ledger
        .create_loan(lender, &terms, &signature, None)
        .expect("loan creation");
    timing("create_loan", t.elapsed());

    let due = ledger.get_due_amount(loan_id).expect("loan exists");
    info("Loan id", &loan_id.to_string());
    info("Debt", &tokens(due));
    balances(&token, &parties);
    success("Collateral escrowed and principal delivered");

    // -----------------------------------------------------------------------
    // Step 5: Repay
    // -----------------------------------------------------------------------

    section(5, "Borrower repays in two installments");

    let first = due / 2;
    let remaining = ledger
        .pay_back_loan(borrower, loan_id, first)
        .expect("first installment");
    info("Paid", &tokens(first));
    info("Remaining", &tokens(remaining));

    let remaining = ledger
        .pay_back_loan(borrower, loan_id, remaining)
        .expect("final installment");
    info("Remaining", &tokens(remaining));

    let loan = ledger.get_loan(loan_id).expect("loan exists");
    info("Status", &loan.status.to_string());
    {
        let nifties = nifties.lock();
        for id in &pledged {
            let back = nifties.owner_of(*id) == Some(borrower);
            info(&format!("Nifty #{id} returned"), &back.to_string());
        }
    }
    balances(&token, &parties);

    // -----------------------------------------------------------------------
    // Summary
    // -----------------------------------------------------------------------

    println!();
    for event in ledger.events() {
        println!("{DIM}  {event:?}{RESET}");
    }
    info("State root", &Digest::from_bytes(ledger.state_root()).to_hex());
    timing("total", demo_start.elapsed());
}
