use parking_lot::RwLock;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, error, info, info_span, Instrument};

use crate::app::ports::FetchPort;
use crate::config::{Config, ExporterConfig};
use crate::constants::RETRY_DELAY_SECS;
use crate::error::{ExporterError, Result};
use crate::observability::{PollMetrics, PollOutcome};
use crate::pipeline::{normalize_response, MetricCache, MetricRegistry, ReconcileReport};

/// Cache shared between the poll loop (writer) and the exposition handler
/// (reader).
pub type SharedCache<R> = Arc<RwLock<MetricCache<R>>>;

/// Result of one successful poll.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CycleOutcome {
    pub rows: usize,
    pub report: ReconcileReport,
}

/// Map a failed poll onto its outcome label. Configuration-stage failures
/// retry after the short fixed delay; the rest wait for the next interval.
pub fn classify(err: &ExporterError) -> PollOutcome {
    match err {
        ExporterError::Normalization(_) => PollOutcome::NormalizationError,
        ExporterError::Reconciliation(_) | ExporterError::Registry(_) => {
            PollOutcome::ReconciliationError
        }
        ExporterError::Config(_)
        | ExporterError::Toml(_)
        | ExporterError::Io(_)
        | ExporterError::Http(_) => PollOutcome::ConfigError,
    }
}

/// The poll loop: load config, fetch, normalize, reconcile, sleep.
pub struct PollUseCase<R: MetricRegistry> {
    config_path: PathBuf,
    fetcher: Box<dyn FetchPort>,
    cache: SharedCache<R>,
}

impl<R> PollUseCase<R>
where
    R: MetricRegistry + Send + Sync,
    R::Gauge: Send + Sync,
{
    pub fn new(config_path: PathBuf, fetcher: Box<dyn FetchPort>, cache: SharedCache<R>) -> Self {
        Self {
            config_path,
            fetcher,
            cache,
        }
    }

    pub fn cache(&self) -> &SharedCache<R> {
        &self.cache
    }

    /// Run one poll with the configuration currently on disk.
    pub async fn run_cycle(&self) -> Result<CycleOutcome> {
        let config = Config::load(&self.config_path)?;
        self.poll(&config.exporter).await
    }

    /// Fetch, normalize and reconcile once. The cache's write lock is only
    /// taken for the reconciliation itself.
    pub async fn poll(&self, config: &ExporterConfig) -> Result<CycleOutcome> {
        let raw = self.fetcher.fetch(config).await?;
        let record = normalize_response(&raw, config)?;
        let rows = record.rows().len();
        info!(rows, columns = record.header().len(), "Normalized payload");

        let (report, active) = {
            let mut cache = self.cache.write();
            let report = cache.reconcile(&record, config)?;
            (report, cache.len())
        };
        PollMetrics::record_reconcile(&report, active);

        Ok(CycleOutcome { rows, report })
    }

    /// Poll forever. No error ends the loop.
    pub async fn run(&self) {
        let retry_delay = Duration::from_secs(RETRY_DELAY_SECS);
        let mut cycle: u64 = 0;

        loop {
            cycle += 1;
            let started = Instant::now();

            let config = match Config::load(&self.config_path) {
                Ok(config) => config.exporter,
                Err(e) => {
                    error!("Error while parsing configuration, trying again in {:?}: {}", retry_delay, e);
                    PollMetrics::record_poll(PollOutcome::ConfigError, started.elapsed().as_secs_f64());
                    tokio::time::sleep(retry_delay).await;
                    continue;
                }
            };

            let span = info_span!("poll_cycle", cycle, metric_type = %config.metric_type);
            let result = self.poll(&config).instrument(span).await;
            let elapsed = started.elapsed().as_secs_f64();

            match result {
                Ok(outcome) => {
                    info!(cycle, rows = outcome.rows, elapsed_secs = elapsed, "Poll completed");
                    PollMetrics::record_poll(PollOutcome::Success, elapsed);
                }
                Err(e) => {
                    let outcome = classify(&e);
                    error!(cycle, outcome = outcome.as_str(), "Poll failed: {}", e);
                    PollMetrics::record_poll(outcome, elapsed);
                    if outcome == PollOutcome::ConfigError {
                        tokio::time::sleep(retry_delay).await;
                        continue;
                    }
                }
            }

            debug!("Polling interval set to {:?}, starting sleep...", config.polling_interval);
            tokio::time::sleep(config.polling_interval).await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{NormalizationError, ReconciliationError};

    #[test]
    fn test_classify_by_stage() {
        assert_eq!(
            classify(&ExporterError::Config("x".to_string())),
            PollOutcome::ConfigError
        );
        assert_eq!(
            classify(&ExporterError::Normalization(NormalizationError::SchemaError(
                "x".to_string()
            ))),
            PollOutcome::NormalizationError
        );
        assert_eq!(
            classify(&ExporterError::Reconciliation(
                ReconciliationError::MissingGenericSchema
            )),
            PollOutcome::ReconciliationError
        );
    }
}
