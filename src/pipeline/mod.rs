// Poll pipeline: payload normalization, then metric reconciliation

pub mod metrics_cache;
pub mod normalize;

pub use metrics_cache::{MetricCache, MetricRegistry, PrometheusRegistry, ReconcileReport};
pub use normalize::{normalize_response, RawResponse, TabularRecord};
