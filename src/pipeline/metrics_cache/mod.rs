//! Mark-and-sweep reconciliation of normalized rows into registered gauges.
//!
//! Every poll marks the series it sees; series not seen by the end of the
//! poll are unregistered. A series is identified by its [`identity_key`],
//! so an unchanged row keeps its gauge across polls and only the value moves.

pub mod registry;

use std::collections::{BTreeMap, HashMap};
use tracing::{debug, info, warn};

use crate::config::{ExporterConfig, MetricType};
use crate::constants::{
    COST_METRIC_NAME, COST_VALUE_COLUMN, IDENTITY_KEY_DELIMITER, INTERNAL_COLUMN_PREFIX,
    RESOURCE_NAME_COLUMN_INDEX, RESOURCE_VALUE_COLUMN_INDEX, SERIES_HELP,
};
use crate::error::{ReconciliationError, RowError};
use crate::pipeline::normalize::TabularRecord;

pub use registry::{MetricRegistry, PrometheusRegistry};

/// Counts from one reconciliation pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReconcileReport {
    pub created: usize,
    pub updated: usize,
    pub evicted: usize,
    pub skipped: usize,
}

struct CacheEntry<G> {
    gauge: G,
    metric_name: String,
    value: f64,
    seen: bool,
}

fn is_excluded(metric_type: MetricType, column: &str) -> bool {
    metric_type == MetricType::Cost && column.starts_with(INTERNAL_COLUMN_PREFIX)
}

/// Join the row's cells into the key that identifies its series. Under the
/// cost type, columns prefixed `x_` do not take part.
pub fn identity_key(header: &[String], row: &[String], metric_type: MetricType) -> String {
    header
        .iter()
        .zip(row)
        .filter(|(column, _)| !is_excluded(metric_type, column))
        .map(|(_, cell)| cell.as_str())
        .collect::<Vec<_>>()
        .join(IDENTITY_KEY_DELIMITER)
}

/// Flatten a serialized tag map (`{"a"="b","c"="d"}`) into `a:b;c:d`.
pub fn flatten_tags(value: &str) -> String {
    value
        .chars()
        .filter(|c| !matches!(c, '{' | '}' | '"'))
        .map(|c| match c {
            '=' => ':',
            ',' => ';',
            other => other,
        })
        .collect()
}

/// Constant labels for a new series: one per column, minus excluded ones.
pub fn build_labels(
    header: &[String],
    row: &[String],
    metric_type: MetricType,
) -> BTreeMap<String, String> {
    header
        .iter()
        .zip(row)
        .filter(|(column, _)| !is_excluded(metric_type, column))
        .map(|(column, cell)| {
            let value = if column.contains("Tags") {
                flatten_tags(cell)
            } else {
                cell.clone()
            };
            (column.clone(), value)
        })
        .collect()
}

/// Where to read the value from and what to call the series.
#[derive(Debug, Clone, PartialEq, Eq)]
struct ValueSchema {
    value_index: usize,
    generic_name: Option<String>,
}

impl ValueSchema {
    fn resolve(
        record: &TabularRecord,
        config: &ExporterConfig,
    ) -> Result<Self, ReconciliationError> {
        match config.metric_type {
            MetricType::Cost => record
                .column_index(COST_VALUE_COLUMN)
                .map(|value_index| Self {
                    value_index,
                    generic_name: None,
                })
                .ok_or_else(|| ReconciliationError::ValueColumnNotFound {
                    column: COST_VALUE_COLUMN.to_string(),
                }),
            MetricType::Resource => Ok(Self {
                value_index: RESOURCE_VALUE_COLUMN_INDEX,
                generic_name: None,
            }),
            MetricType::Generic => {
                let generic = config
                    .generic
                    .as_ref()
                    .ok_or(ReconciliationError::MissingGenericSchema)?;
                match (generic.value_column_index, &generic.metric_name) {
                    (Some(value_index), Some(name)) if !name.trim().is_empty() => Ok(Self {
                        value_index,
                        generic_name: Some(name.clone()),
                    }),
                    _ => Err(ReconciliationError::MissingGenericSchema),
                }
            }
        }
    }

    fn metric_name(&self, metric_type: MetricType, row: &[String]) -> String {
        match metric_type {
            MetricType::Cost => COST_METRIC_NAME.to_string(),
            MetricType::Resource => row
                .get(RESOURCE_NAME_COLUMN_INDEX)
                .map(|name| name.to_lowercase().replace(' ', "_"))
                .unwrap_or_default(),
            MetricType::Generic => self.generic_name.clone().unwrap_or_default(),
        }
    }

    fn parse_value(&self, row: &[String]) -> Result<f64, RowError> {
        let raw = row
            .get(self.value_index)
            .ok_or(RowError::ValueColumnOutOfRange {
                index: self.value_index,
                len: row.len(),
            })?;
        raw.trim()
            .parse::<f64>()
            .map_err(|_| RowError::UnparsableValue { value: raw.clone() })
    }
}

/// Identity key → live gauge, owning the registry the gauges live in.
pub struct MetricCache<R: MetricRegistry> {
    registry: R,
    entries: HashMap<String, CacheEntry<R::Gauge>>,
}

impl<R: MetricRegistry> MetricCache<R> {
    pub fn new(registry: R) -> Self {
        Self {
            registry,
            entries: HashMap::new(),
        }
    }

    pub fn registry(&self) -> &R {
        &self.registry
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn contains(&self, key: &str) -> bool {
        self.entries.contains_key(key)
    }

    pub fn gauge(&self, key: &str) -> Option<&R::Gauge> {
        self.entries.get(key).map(|entry| &entry.gauge)
    }

    pub fn value(&self, key: &str) -> Option<f64> {
        self.entries.get(key).map(|entry| entry.value)
    }

    pub fn metric_name(&self, key: &str) -> Option<&str> {
        self.entries.get(key).map(|entry| entry.metric_name.as_str())
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.entries.keys().map(String::as_str)
    }

    /// Apply one poll's record: update or create a gauge per row, then sweep
    /// everything this poll did not touch.
    ///
    /// Fails without touching the cache when no value column can be
    /// determined. Rows that cannot be materialized are skipped.
    pub fn reconcile(
        &mut self,
        record: &TabularRecord,
        config: &ExporterConfig,
    ) -> Result<ReconcileReport, ReconciliationError> {
        let schema = ValueSchema::resolve(record, config)?;
        let metric_type = config.metric_type;
        let header = record.header();
        let mut report = ReconcileReport::default();

        info!(
            rows = record.rows().len(),
            metric_type = %metric_type,
            "Analyzing records"
        );

        for row in record.rows() {
            let key = identity_key(header, row, metric_type);
            let outcome = if self.entries.contains_key(&key) {
                self.update(&key, row, &schema)
            } else {
                self.create(key.clone(), header, row, &schema, metric_type)
            };

            match outcome {
                Ok(true) => report.created += 1,
                Ok(false) => report.updated += 1,
                Err(e) => {
                    warn!(key = %key, error = %e, "Skipping record for this iteration");
                    report.skipped += 1;
                }
            }
        }

        report.evicted = self.sweep();
        info!(
            created = report.created,
            updated = report.updated,
            evicted = report.evicted,
            skipped = report.skipped,
            active = self.entries.len(),
            "Reconciled metric cache"
        );
        Ok(report)
    }

    /// Returns `Ok(false)` on update.
    fn update(&mut self, key: &str, row: &[String], schema: &ValueSchema) -> Result<bool, RowError> {
        let value = schema.parse_value(row)?;
        if let Some(entry) = self.entries.get_mut(key) {
            self.registry.set(&entry.gauge, value);
            entry.value = value;
            entry.seen = true;
        }
        Ok(false)
    }

    /// Returns `Ok(true)` once the new gauge is registered.
    fn create(
        &mut self,
        key: String,
        header: &[String],
        row: &[String],
        schema: &ValueSchema,
        metric_type: MetricType,
    ) -> Result<bool, RowError> {
        let value = schema.parse_value(row)?;
        let labels = build_labels(header, row, metric_type);
        let metric_name = schema.metric_name(metric_type, row);

        let gauge = self
            .registry
            .register_gauge(&metric_name, SERIES_HELP, &labels)
            .map_err(|e| RowError::Registration(e.to_string()))?;
        self.registry.set(&gauge, value);
        debug!(key = %key, metric = %metric_name, "Registered new series");

        self.entries.insert(
            key,
            CacheEntry {
                gauge,
                metric_name,
                value,
                seen: true,
            },
        );
        Ok(true)
    }

    /// Unregister entries not seen since the last sweep and reset the marks
    /// on the rest. Returns the number of evicted entries.
    pub fn sweep(&mut self) -> usize {
        let stale: Vec<String> = self
            .entries
            .iter()
            .filter(|(_, entry)| !entry.seen)
            .map(|(key, _)| key.clone())
            .collect();

        for key in &stale {
            if let Some(entry) = self.entries.remove(key) {
                if let Err(e) = self.registry.unregister_gauge(&entry.gauge) {
                    warn!(key = %key, error = %e, "Failed to unregister stale series");
                }
                debug!(key = %key, metric = %entry.metric_name, "Evicted stale series");
            }
        }

        for entry in self.entries.values_mut() {
            entry.seen = false;
        }
        stale.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::error::RegistryError;

    /// Registry double recording every call; gauges are plain ids.
    #[derive(Default)]
    struct RecordingRegistry {
        next_id: usize,
        live: BTreeMap<usize, (String, BTreeMap<String, String>)>,
        values: HashMap<usize, f64>,
        registrations: usize,
        unregistered: Vec<usize>,
    }

    impl MetricRegistry for RecordingRegistry {
        type Gauge = usize;

        fn register_gauge(
            &mut self,
            name: &str,
            _help: &str,
            labels: &BTreeMap<String, String>,
        ) -> Result<usize, RegistryError> {
            if name.is_empty() {
                return Err(RegistryError::Registration("empty name".to_string()));
            }
            self.next_id += 1;
            self.registrations += 1;
            self.live
                .insert(self.next_id, (name.to_string(), labels.clone()));
            Ok(self.next_id)
        }

        fn unregister_gauge(&mut self, gauge: &usize) -> Result<(), RegistryError> {
            self.live.remove(gauge);
            self.unregistered.push(*gauge);
            Ok(())
        }

        fn set(&mut self, gauge: &usize, value: f64) {
            self.values.insert(*gauge, value);
        }
    }

    fn config(toml: &str) -> ExporterConfig {
        Config::from_toml_str(toml).unwrap().exporter
    }

    fn cost_config() -> ExporterConfig {
        config(
            r#"
            [exporter]
            metric_type = "cost"
            [exporter.api]
            path = "/focus.csv"
            "#,
        )
    }

    fn generic_config() -> ExporterConfig {
        config(
            r#"
            [exporter]
            metric_type = "generic"
            [exporter.api]
            path = "/data.json"
            [exporter.generic]
            value_column_index = 1
            metric_name = "reading"
            "#,
        )
    }

    fn record(header: &[&str], rows: &[&[&str]]) -> TabularRecord {
        TabularRecord::new(
            header.iter().map(|s| s.to_string()).collect(),
            rows.iter()
                .map(|r| r.iter().map(|s| s.to_string()).collect())
                .collect(),
        )
    }

    fn strings(values: &[&str]) -> Vec<String> {
        values.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_identity_key_excludes_internal_columns_only_for_cost() {
        let header = strings(&["ServiceName", "x_Internal", "BilledCost"]);
        let row = strings(&["vm", "secret", "1.5"]);
        assert_eq!(identity_key(&header, &row, MetricType::Cost), "vm 1.5");
        assert_eq!(
            identity_key(&header, &row, MetricType::Generic),
            "vm secret 1.5"
        );
    }

    #[test]
    fn test_flatten_tags() {
        assert_eq!(
            flatten_tags(r#"{"env"="prod","team"="ops"}"#),
            "env:prod;team:ops"
        );
        assert_eq!(flatten_tags("env=prod;team=ops"), "env:prod;team:ops");
    }

    #[test]
    fn test_cost_labels_drop_internal_and_flatten_tags() {
        let header = strings(&["ServiceName", "x_Hidden", "Tags", "BilledCost"]);
        let row = strings(&["vm", "h", "env=prod;team=ops", "2"]);
        let labels = build_labels(&header, &row, MetricType::Cost);
        assert_eq!(labels.len(), 3);
        assert_eq!(labels["Tags"], "env:prod;team:ops");
        assert!(!labels.contains_key("x_Hidden"));
    }

    #[test]
    fn test_creates_then_updates_in_place() {
        let mut cache = MetricCache::new(RecordingRegistry::default());
        let cfg = cost_config();
        let first = record(&["ServiceName", "x_Run", "BilledCost"], &[&["vm", "1", "1.5"]]);
        let report = cache.reconcile(&first, &cfg).unwrap();
        assert_eq!(report.created, 1);

        // x_ column changes do not change identity under cost
        let second = record(&["ServiceName", "x_Run", "BilledCost"], &[&["vm", "2", "1.5"]]);
        let report = cache.reconcile(&second, &cfg).unwrap();
        assert_eq!(report, ReconcileReport { updated: 1, ..Default::default() });
        assert_eq!(cache.registry().registrations, 1);
        assert_eq!(cache.metric_name("vm 1.5"), Some("billed_cost"));
    }

    #[test]
    fn test_mark_and_sweep_reuses_and_evicts() {
        let mut cache = MetricCache::new(RecordingRegistry::default());
        let cfg = generic_config();

        cache
            .reconcile(&record(&["name", "v"], &[&["A", "1"], &["B", "2"]]), &cfg)
            .unwrap();
        let a = *cache.gauge("A 1").unwrap();
        let b = *cache.gauge("B 2").unwrap();

        let report = cache
            .reconcile(&record(&["name", "v"], &[&["B", "2"], &["C", "3"]]), &cfg)
            .unwrap();

        let mut keys: Vec<&str> = cache.keys().collect();
        keys.sort();
        assert_eq!(keys, ["B 2", "C 3"]);
        assert_eq!(*cache.gauge("B 2").unwrap(), b);
        assert_eq!(cache.registry().unregistered, vec![a]);
        assert_eq!(cache.registry().live.len(), 2);
        assert_eq!(
            report,
            ReconcileReport {
                created: 1,
                updated: 1,
                evicted: 1,
                skipped: 0
            }
        );
    }

    #[test]
    fn test_unparsable_value_skips_row_only() {
        let mut cache = MetricCache::new(RecordingRegistry::default());
        let report = cache
            .reconcile(
                &record(&["name", "v"], &[&["A", "N/A"], &["B", "2"]]),
                &generic_config(),
            )
            .unwrap();
        assert_eq!(report.skipped, 1);
        assert_eq!(report.created, 1);
        assert_eq!(cache.len(), 1);
        assert!(cache.contains("B 2"));
        assert_eq!(cache.value("B 2"), Some(2.0));
    }

    #[test]
    fn test_missing_cost_column_aborts_without_sweeping() {
        let mut cache = MetricCache::new(RecordingRegistry::default());
        let cfg = cost_config();
        cache
            .reconcile(&record(&["Service", "BilledCost"], &[&["vm", "1"]]), &cfg)
            .unwrap();

        let err = cache
            .reconcile(&record(&["Service", "Amount"], &[&["vm", "1"]]), &cfg)
            .unwrap_err();
        assert_eq!(
            err,
            ReconciliationError::ValueColumnNotFound {
                column: "BilledCost".to_string()
            }
        );
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn test_generic_requires_schema() {
        let mut cache = MetricCache::new(RecordingRegistry::default());
        let cfg = config(
            r#"
            [exporter]
            metric_type = "generic"
            [exporter.api]
            path = "/data.json"
            [exporter.generic]
            value_column_index = 1
            "#,
        );
        let err = cache
            .reconcile(&record(&["a", "b"], &[&["x", "1"]]), &cfg)
            .unwrap_err();
        assert_eq!(err, ReconciliationError::MissingGenericSchema);
    }

    #[test]
    fn test_resource_name_comes_from_second_column() {
        let mut cache = MetricCache::new(RecordingRegistry::default());
        let cfg = config(
            r#"
            [exporter]
            metric_type = "resource"
            [exporter.api]
            path = "/metrics.json"
            "#,
        );
        let rec = record(
            &["ResourceId", "metricName", "timestamp", "average", "unit"],
            &[&["vm-1", "Percentage CPU", "2024-05-01T10:00:00Z", "12.5", "Percent"]],
        );
        cache.reconcile(&rec, &cfg).unwrap();
        let (name, labels) = cache.registry().live.values().next().unwrap();
        assert_eq!(name, "percentage_cpu");
        assert_eq!(labels["unit"], "Percent");
    }

    #[test]
    fn test_short_row_is_skipped() {
        let mut cache = MetricCache::new(RecordingRegistry::default());
        let cfg = config(
            r#"
            [exporter]
            metric_type = "generic"
            [exporter.api]
            path = "/data.json"
            [exporter.generic]
            value_column_index = 5
            metric_name = "reading"
            "#,
        );
        let report = cache
            .reconcile(&record(&["a", "b"], &[&["x", "1"]]), &cfg)
            .unwrap();
        assert_eq!(report.skipped, 1);
        assert!(cache.is_empty());
    }

    #[test]
    fn test_empty_record_evicts_everything_for_generic() {
        let mut cache = MetricCache::new(RecordingRegistry::default());
        let cfg = generic_config();
        cache
            .reconcile(&record(&["name", "v"], &[&["A", "1"]]), &cfg)
            .unwrap();
        let report = cache.reconcile(&TabularRecord::empty(), &cfg).unwrap();
        assert_eq!(report.evicted, 1);
        assert!(cache.is_empty());
    }
}
