//! # Prometheus Metrics
//!
//! Ledger counters scraped at `/metrics` on the metrics port. Everything is
//! registered in a dedicated [`prometheus::Registry`] under the `pawnda`
//! namespace.

use axum::http::StatusCode;
use axum::response::IntoResponse;
use prometheus::{
    Encoder, Histogram, HistogramOpts, IntCounter, IntCounterVec, IntGauge, Opts, Registry,
    TextEncoder,
};
use std::sync::Arc;

/// Metric handles shared by the API handlers.
#[derive(Clone)]
pub struct NodeMetrics {
    registry: Registry,
    pub loans_created_total: IntCounter,
    pub repayments_total: IntCounter,
    pub loans_closed_total: IntCounter,
    /// Loans currently carrying debt.
    pub open_loans: IntGauge,
    /// Rejected ledger operations, labelled by error kind
    /// (`validation`, `signature`, `state`, `transfer`).
    pub rejected_operations_total: IntCounterVec,
    /// Wall time of `create_loan` and `pay_back_loan`, lock wait included.
    pub operation_latency_seconds: Histogram,
}

impl NodeMetrics {
    /// Creates and registers all metrics. Call once at startup.
    pub fn new() -> Result<Self, prometheus::Error> {
        let registry = Registry::new_custom(Some("pawnda".into()), None)?;

        let loans_created_total =
            IntCounter::new("loans_created_total", "Total number of loans created")?;
        registry.register(Box::new(loans_created_total.clone()))?;

        let repayments_total = IntCounter::new(
            "repayments_total",
            "Total number of accepted repayments, partial or full",
        )?;
        registry.register(Box::new(repayments_total.clone()))?;

        let loans_closed_total = IntCounter::new(
            "loans_closed_total",
            "Total number of loans repaid in full",
        )?;
        registry.register(Box::new(loans_closed_total.clone()))?;

        let open_loans = IntGauge::new("open_loans", "Number of loans with outstanding debt")?;
        registry.register(Box::new(open_loans.clone()))?;

        let rejected_operations_total = IntCounterVec::new(
            Opts::new(
                "rejected_operations_total",
                "Ledger operations rejected, by error kind",
            ),
            &["kind"],
        )?;
        registry.register(Box::new(rejected_operations_total.clone()))?;

        let operation_latency_seconds = Histogram::with_opts(
            HistogramOpts::new(
                "operation_latency_seconds",
                "Latency of state-changing ledger operations in seconds",
            )
            .buckets(vec![0.0001, 0.0005, 0.001, 0.005, 0.01, 0.05, 0.1, 0.5, 1.0]),
        )?;
        registry.register(Box::new(operation_latency_seconds.clone()))?;

        Ok(Self {
            registry,
            loans_created_total,
            repayments_total,
            loans_closed_total,
            open_loans,
            rejected_operations_total,
            operation_latency_seconds,
        })
    }

    /// Counts one rejected operation of the given kind.
    pub fn record_rejection(&self, kind: &str) {
        self.rejected_operations_total
            .with_label_values(&[kind])
            .inc();
    }

    /// Encodes every registered metric in the Prometheus text format.
    pub fn encode(&self) -> Result<String, prometheus::Error> {
        let encoder = TextEncoder::new();
        let metric_families = self.registry.gather();
        let mut buffer = Vec::new();
        encoder.encode(&metric_families, &mut buffer)?;
        String::from_utf8(buffer).map_err(|e| prometheus::Error::Msg(e.to_string()))
    }
}

pub type SharedMetrics = Arc<NodeMetrics>;

/// `GET /metrics`.
pub async fn metrics_handler(
    axum::extract::State(metrics): axum::extract::State<SharedMetrics>,
) -> impl IntoResponse {
    match metrics.encode() {
        Ok(body) => (
            StatusCode::OK,
            [("content-type", "text/plain; version=0.0.4; charset=utf-8")],
            body,
        )
            .into_response(),
        Err(e) => {
            tracing::error!(error = %e, "failed to encode metrics");
            (StatusCode::INTERNAL_SERVER_ERROR, "metrics encoding failed").into_response()
        }
    }
}
