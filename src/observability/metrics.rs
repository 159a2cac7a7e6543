//! Self metrics of the exporter, recorded through the `metrics` facade.
//!
//! These describe the poll loop itself (poll outcomes, fetch retries, series
//! churn) and are appended to `/metrics` after the scraped series.

use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use std::sync::OnceLock;
use tracing::{info, warn};

use crate::pipeline::ReconcileReport;

static HANDLE: OnceLock<PrometheusHandle> = OnceLock::new();

/// Prefix every self metric name with `finops_exporter_`
macro_rules! exporter_metric {
    (counter, $name:literal) => {
        concat!("finops_exporter_", $name, "_total")
    };
    (histogram, $name:literal) => {
        concat!("finops_exporter_", $name)
    };
    (gauge, $name:literal) => {
        concat!("finops_exporter_", $name)
    };
}

/// Outcome label of `finops_exporter_polls_total`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PollOutcome {
    Success,
    ConfigError,
    NormalizationError,
    ReconciliationError,
}

impl PollOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            PollOutcome::Success => "success",
            PollOutcome::ConfigError => "config_error",
            PollOutcome::NormalizationError => "normalization_error",
            PollOutcome::ReconciliationError => "reconciliation_error",
        }
    }
}

/// Install the Prometheus recorder. Idempotent; without a recorder all
/// recording calls are no-ops.
pub fn init() {
    if HANDLE.get().is_some() {
        return;
    }
    match PrometheusBuilder::new().install_recorder() {
        Ok(handle) => {
            if HANDLE.set(handle).is_ok() {
                register_metrics();
                info!("Self metrics recorder installed");
            }
        }
        Err(e) => warn!("Failed to install self metrics recorder: {}", e),
    }
}

/// Render self metrics in the Prometheus text format, empty when the
/// recorder is not installed.
pub fn render() -> String {
    HANDLE.get().map(PrometheusHandle::render).unwrap_or_default()
}

fn register_metrics() {
    use metrics::{counter, gauge, histogram};

    let _ = counter!(exporter_metric!(counter, "polls"), "outcome" => PollOutcome::Success.as_str());
    let _ = counter!(exporter_metric!(counter, "fetch_retries"));
    let _ = counter!(exporter_metric!(counter, "rows_skipped"));
    let _ = counter!(exporter_metric!(counter, "series_created"));
    let _ = counter!(exporter_metric!(counter, "series_evicted"));
    let _ = gauge!(exporter_metric!(gauge, "series_active"));
    let _ = histogram!(exporter_metric!(histogram, "poll_duration_seconds"));
}

pub struct PollMetrics;

impl PollMetrics {
    pub fn record_poll(outcome: PollOutcome, duration_secs: f64) {
        ::metrics::counter!(exporter_metric!(counter, "polls"), "outcome" => outcome.as_str())
            .increment(1);
        ::metrics::histogram!(exporter_metric!(histogram, "poll_duration_seconds"))
            .record(duration_secs);
    }

    pub fn record_fetch_retry() {
        ::metrics::counter!(exporter_metric!(counter, "fetch_retries")).increment(1);
    }

    pub fn record_reconcile(report: &ReconcileReport, active_series: usize) {
        ::metrics::counter!(exporter_metric!(counter, "series_created"))
            .increment(report.created as u64);
        ::metrics::counter!(exporter_metric!(counter, "series_evicted"))
            .increment(report.evicted as u64);
        ::metrics::counter!(exporter_metric!(counter, "rows_skipped"))
            .increment(report.skipped as u64);
        ::metrics::gauge!(exporter_metric!(gauge, "series_active")).set(active_series as f64);
    }
}
