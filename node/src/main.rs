// Copyright (c) 2026 Pawnda Contributors. MIT License.
// See LICENSE for details.

//! # Pawnda Node
//!
//! Entry point for the `pawnda-node` binary. Parses CLI arguments,
//! initializes logging and metrics, and serves the loan ledger over HTTP.
//!
//! Subcommands:
//!
//! - `run`: start the ledger, the HTTP API and the metrics endpoint
//! - `keygen`: generate a secp256k1 key
//! - `hash-terms`: print the canonical digest of a terms file
//! - `sign-terms`: sign a terms file as borrower, broker or lender
//! - `sign-repayment`: authorize a repayment
//! - `recover`: print who signed a terms file
//! - `version`: print build version information

mod api;
mod cli;
mod logging;
mod metrics;

use anyhow::{bail, Context, Result};
use clap::Parser;
use std::path::Path;
use std::sync::Arc;
use tokio::signal;
use tokio::sync::RwLock;

use pawnda_contracts::{AssetEscrow, LoanLedger};
use pawnda_protocol::config;
use pawnda_protocol::crypto::{RecoverableSignature, Secp256k1Scheme, SigningKeypair};
use pawnda_protocol::terms::{self, LoanTerms};

use cli::{Commands, PawndaNodeCli};
use logging::LogFormat;
use metrics::NodeMetrics;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = PawndaNodeCli::parse();

    match cli.command {
        Commands::Run(args) => run_node(args).await,
        Commands::Keygen => keygen(),
        Commands::HashTerms(args) => hash_terms(args),
        Commands::SignTerms(args) => sign_terms(args),
        Commands::SignRepayment(args) => sign_repayment(args),
        Commands::Recover(args) => recover(args),
        Commands::Version => {
            print_version();
            Ok(())
        }
    }
}

/// Starts the ledger, the API server and the metrics endpoint.
async fn run_node(args: cli::RunArgs) -> Result<()> {
    logging::init_logging(
        logging::DEFAULT_DIRECTIVES,
        LogFormat::from_str_lossy(&args.log_format),
    )
    .context("failed to initialize logging")?;

    if !config::is_known_network(&args.network) {
        bail!(
            "unknown network {:?}: expected {}, {} or {}",
            args.network,
            config::NETWORK_DEVELOPMENT,
            config::NETWORK_TESTNET,
            config::NETWORK_MAINNET,
        );
    }

    // --- Custodian ---
    let custodian_key = match &args.custodian_key {
        Some(hex_key) => {
            SigningKeypair::from_hex(hex_key).context("invalid --custodian-key")?
        }
        None => {
            tracing::warn!("no custodian key configured, generating an ephemeral one");
            SigningKeypair::generate()
        }
    };
    let custodian = custodian_key.address();

    tracing::info!(
        rpc_port = args.rpc_port,
        metrics_port = args.metrics_port,
        network = %args.network,
        custodian = %custodian,
        "starting pawnda-node"
    );

    // --- Ledger and fixture assets ---
    let mut ledger = LoanLedger::new(custodian, AssetEscrow::new());
    let devnet = if config::deploys_fixture_assets(&args.network) {
        Some(api::DevnetAssets::deploy(&mut ledger))
    } else {
        tracing::warn!(
            network = %args.network,
            "no asset contracts registered; every loan will fail with an unknown asset"
        );
        None
    };

    // --- Metrics ---
    let node_metrics = Arc::new(NodeMetrics::new().context("failed to register metrics")?);

    // --- Application state ---
    let app_state = api::AppState {
        version: format!(
            "{} (protocol {})",
            env!("CARGO_PKG_VERSION"),
            config::PROTOCOL_VERSION,
        ),
        network: args.network.clone(),
        ledger: Arc::new(RwLock::new(ledger)),
        devnet,
        metrics: Arc::clone(&node_metrics),
    };

    // --- API server ---
    let api_router = api::create_router(app_state);
    let api_addr = format!("0.0.0.0:{}", args.rpc_port);
    let api_listener = tokio::net::TcpListener::bind(&api_addr)
        .await
        .with_context(|| format!("failed to bind API listener on {}", api_addr))?;
    tracing::info!("API server listening on {}", api_addr);

    // --- Metrics server ---
    let metrics_router = axum::Router::new()
        .route("/metrics", axum::routing::get(metrics::metrics_handler))
        .with_state(Arc::clone(&node_metrics));
    let metrics_addr = format!("0.0.0.0:{}", args.metrics_port);
    let metrics_listener = tokio::net::TcpListener::bind(&metrics_addr)
        .await
        .with_context(|| format!("failed to bind metrics listener on {}", metrics_addr))?;
    tracing::info!("Metrics server listening on {}", metrics_addr);

    // --- Serve ---
    tokio::select! {
        res = axum::serve(api_listener, api_router) => {
            if let Err(e) = res {
                tracing::error!("API server error: {}", e);
            }
        }
        res = axum::serve(metrics_listener, metrics_router) => {
            if let Err(e) = res {
                tracing::error!("Metrics server error: {}", e);
            }
        }
        _ = shutdown_signal() => {
            tracing::info!("shutdown signal received");
        }
    }

    tracing::info!("pawnda-node stopped");
    Ok(())
}

/// Prints a fresh secret key and its address.
fn keygen() -> Result<()> {
    let keypair = SigningKeypair::generate();
    println!("secret  : {}", keypair.secret_key_hex());
    println!("address : {}", keypair.address().to_checksum_hex());
    Ok(())
}

fn hash_terms(args: cli::TermsArgs) -> Result<()> {
    let terms = read_terms(&args.terms)?;
    println!("{}", terms::hash_terms(&terms));
    Ok(())
}

fn sign_terms(args: cli::SignTermsArgs) -> Result<()> {
    let terms = read_terms(&args.terms)?;
    let keypair = SigningKeypair::from_hex(&args.key).context("invalid --key")?;
    if keypair.address() != terms.borrower && Some(keypair.address()) != terms.broker {
        eprintln!("{} is not named in these terms; signing as lender", keypair.address());
    }

    let signature = keypair
        .sign_digest(&terms::hash_terms(&terms))
        .context("signing failed")?;
    println!("{}", signature.to_hex());
    Ok(())
}

fn sign_repayment(args: cli::SignRepaymentArgs) -> Result<()> {
    let keypair = SigningKeypair::from_hex(&args.key).context("invalid --key")?;
    let digest = terms::hash_repayment(args.loan_id, args.amount, args.outstanding);
    let signature = keypair.sign_digest(&digest).context("signing failed")?;
    println!("payer     : {}", keypair.address().to_checksum_hex());
    println!("signature : {}", signature.to_hex());
    Ok(())
}

fn recover(args: cli::RecoverArgs) -> Result<()> {
    let terms = read_terms(&args.terms)?;
    let signature =
        RecoverableSignature::from_hex(&args.signature).context("invalid --signature")?;
    let signer = terms::get_signer(&Secp256k1Scheme, &signature, &terms)
        .context("signature recovery failed")?;
    println!("{}", signer.to_checksum_hex());
    Ok(())
}

/// Reads and parses a JSON terms file.
fn read_terms(path: &Path) -> Result<LoanTerms> {
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read terms file {}", path.display()))?;
    serde_json::from_str(&raw)
        .with_context(|| format!("failed to parse terms file {}", path.display()))
}

/// Prints version information to stdout.
fn print_version() {
    println!("pawnda-node {}", env!("CARGO_PKG_VERSION"));
    println!("protocol    {}", config::PROTOCOL_VERSION);
    println!("signing     {}", config::SIGNING_ALGORITHM);
}

/// Waits for SIGINT (Ctrl+C) or SIGTERM, whichever comes first.
///
/// On non-Unix platforms, only Ctrl+C is supported. If a handler cannot be
/// installed the corresponding branch never completes.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!("failed to install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                tracing::error!("failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }
}
