//! # CLI Interface
//!
//! Command-line structure for `pawnda-node`, built with `clap` derive.
//! Every `run` option can also come from a `PAWNDA_*` environment variable.

use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

use pawnda_protocol::config::{DEFAULT_METRICS_PORT, DEFAULT_RPC_PORT, NETWORK_DEVELOPMENT};

/// Pawnda lending ledger node.
///
/// Serves the loan ledger over HTTP, exposes Prometheus metrics, and ships
/// the off-line tools borrowers and brokers use to hash and sign terms.
#[derive(Parser, Debug)]
#[command(
    name = "pawnda-node",
    about = "Pawnda peer-to-peer lending ledger node",
    version,
    propagate_version = true
)]
pub struct PawndaNodeCli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Start the ledger and serve the HTTP API.
    Run(RunArgs),
    /// Generate a secp256k1 key and print it with its address.
    Keygen,
    /// Print the canonical digest of a terms file.
    HashTerms(TermsArgs),
    /// Sign the digest of a terms file with a secret key.
    SignTerms(SignTermsArgs),
    /// Sign a repayment authorization for an open loan.
    SignRepayment(SignRepaymentArgs),
    /// Print the address that produced a signature over a terms file.
    Recover(RecoverArgs),
    /// Print version information and exit.
    Version,
}

/// Arguments for the `run` subcommand.
#[derive(Args, Debug)]
pub struct RunArgs {
    /// Port for the HTTP API.
    #[arg(long, env = "PAWNDA_RPC_PORT", default_value_t = DEFAULT_RPC_PORT)]
    pub rpc_port: u16,

    /// Port for the Prometheus metrics endpoint.
    #[arg(long, env = "PAWNDA_METRICS_PORT", default_value_t = DEFAULT_METRICS_PORT)]
    pub metrics_port: u16,

    /// Network name: development, testnet or mainnet.
    ///
    /// Only `development` deploys the faucet token and collectible.
    #[arg(long, env = "PAWNDA_NETWORK", default_value = NETWORK_DEVELOPMENT)]
    pub network: String,

    /// Hex-encoded secp256k1 secret key that names the custodian address.
    ///
    /// A fresh key is generated when omitted, which gives the custodian a
    /// new address on every start.
    #[arg(long, env = "PAWNDA_CUSTODIAN_KEY", hide_env_values = true)]
    pub custodian_key: Option<String>,

    /// Log output format: `pretty` or `json`.
    #[arg(long, env = "PAWNDA_LOG_FORMAT", default_value = "pretty")]
    pub log_format: String,
}

/// A JSON terms file.
#[derive(Args, Debug)]
pub struct TermsArgs {
    #[arg(long)]
    pub terms: PathBuf,
}

#[derive(Args, Debug)]
pub struct SignTermsArgs {
    #[arg(long)]
    pub terms: PathBuf,

    /// Hex-encoded secp256k1 secret key.
    #[arg(long, env = "PAWNDA_SIGNING_KEY", hide_env_values = true)]
    pub key: String,
}

#[derive(Args, Debug)]
pub struct SignRepaymentArgs {
    #[arg(long)]
    pub loan_id: u64,

    /// Amount to pay, in the currency's smallest unit.
    #[arg(long)]
    pub amount: u128,

    /// Debt outstanding before this payment, as `GET /loans/:id/due` reports.
    #[arg(long)]
    pub outstanding: u128,

    /// Hex-encoded secp256k1 secret key of the payer.
    #[arg(long, env = "PAWNDA_SIGNING_KEY", hide_env_values = true)]
    pub key: String,
}

#[derive(Args, Debug)]
pub struct RecoverArgs {
    #[arg(long)]
    pub terms: PathBuf,

    /// 65-byte `r || s || v` signature in hex.
    #[arg(long)]
    pub signature: String,
}
