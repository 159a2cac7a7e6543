//! Registry bindings the metric cache materializes gauges into.

use prometheus::{Encoder, Gauge, Opts, Registry, TextEncoder};
use std::collections::{BTreeMap, HashMap};

use crate::error::RegistryError;

/// A pull-based registry holding one gauge per live series.
///
/// Gauges are created with their constant labels fixed at registration time
/// and are only ever updated in place or unregistered.
pub trait MetricRegistry {
    type Gauge;

    fn register_gauge(
        &mut self,
        name: &str,
        help: &str,
        labels: &BTreeMap<String, String>,
    ) -> Result<Self::Gauge, RegistryError>;

    fn unregister_gauge(&mut self, gauge: &Self::Gauge) -> Result<(), RegistryError>;

    fn set(&mut self, gauge: &Self::Gauge, value: f64);
}

/// Binding onto a `prometheus::Registry`, exposed in text format on `/metrics`.
#[derive(Clone, Default)]
pub struct PrometheusRegistry {
    registry: Registry,
}

impl PrometheusRegistry {
    pub fn new() -> Self {
        Self {
            registry: Registry::new(),
        }
    }

    pub fn inner(&self) -> &Registry {
        &self.registry
    }

    /// Encode every registered series in the Prometheus text format.
    pub fn render(&self) -> Result<String, RegistryError> {
        let families = self.registry.gather();
        let mut buffer = Vec::new();
        TextEncoder::new()
            .encode(&families, &mut buffer)
            .map_err(|e| RegistryError::Encoding(e.to_string()))?;
        String::from_utf8(buffer).map_err(|e| RegistryError::Encoding(e.to_string()))
    }
}

impl MetricRegistry for PrometheusRegistry {
    type Gauge = Gauge;

    fn register_gauge(
        &mut self,
        name: &str,
        help: &str,
        labels: &BTreeMap<String, String>,
    ) -> Result<Gauge, RegistryError> {
        let const_labels: HashMap<String, String> = labels
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect();
        let opts = Opts::new(name, help).const_labels(const_labels);
        let gauge = Gauge::with_opts(opts).map_err(|e| RegistryError::Registration(e.to_string()))?;
        self.registry
            .register(Box::new(gauge.clone()))
            .map_err(|e| RegistryError::Registration(e.to_string()))?;
        Ok(gauge)
    }

    fn unregister_gauge(&mut self, gauge: &Gauge) -> Result<(), RegistryError> {
        self.registry
            .unregister(Box::new(gauge.clone()))
            .map_err(|e| RegistryError::Unregistration(e.to_string()))
    }

    fn set(&mut self, gauge: &Gauge, value: f64) {
        gauge.set(value);
    }
}
