//! # Structured Logging
//!
//! Installs the `tracing` subscriber: pretty or JSON lines, filtered by
//! `RUST_LOG` when set. Output goes to stderr so stdout stays clean for the
//! signing tools (`hash-terms`, `sign-terms`, `recover`), whose output is
//! meant to be piped.

use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Default directives when `RUST_LOG` is unset.
pub const DEFAULT_DIRECTIVES: &str =
    "pawnda_node=info,pawnda_contracts=info,pawnda_protocol=info,tower_http=debug";

/// Log output format.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    /// Human-readable, colored output.
    Pretty,
    /// One JSON object per line.
    Json,
}

impl LogFormat {
    /// Accepts "json" or "pretty" (case-insensitive). Anything else is
    /// `Pretty`.
    pub fn from_str_lossy(s: &str) -> Self {
        match s.to_lowercase().as_str() {
            "json" => LogFormat::Json,
            _ => LogFormat::Pretty,
        }
    }
}

/// Installs the global subscriber.
///
/// `default_directives` is used when `RUST_LOG` is unset, e.g.
///
/// ```text
/// RUST_LOG=pawnda_contracts=debug,tower_http=info
/// ```
///
/// Fails if a global subscriber is already installed.
pub fn init_logging(
    default_directives: &str,
    format: LogFormat,
) -> Result<(), tracing_subscriber::util::TryInitError> {
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_directives));

    match format {
        LogFormat::Pretty => tracing_subscriber::registry()
            .with(env_filter)
            .with(
                fmt::layer()
                    .with_writer(std::io::stderr)
                    .with_target(true)
                    .with_file(true)
                    .with_line_number(true),
            )
            .try_init()?,
        LogFormat::Json => tracing_subscriber::registry()
            .with(env_filter)
            .with(
                fmt::layer()
                    .json()
                    .with_writer(std::io::stderr)
                    .with_target(true),
            )
            .try_init()?,
    }

    tracing::debug!(?format, "logging initialized");
    Ok(())
}
