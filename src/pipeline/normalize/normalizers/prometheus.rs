//! Prometheus HTTP API query results (`/api/v1/query`, `/api/v1/query_range`).

use serde::Deserialize;
use serde_json::Value;
use std::collections::{BTreeMap, BTreeSet};
use tracing::debug;

use crate::config::ExporterConfig;
use crate::error::NormalizationError;
use crate::pipeline::normalize::sanitize::sanitize_labels_reserving;
use crate::pipeline::normalize::value::{format_epoch, format_number};
use crate::pipeline::normalize::{Normalizer, TabularRecord};

#[derive(Debug, Deserialize)]
struct QueryResponse {
    status: String,
    data: QueryData,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct QueryData {
    result_type: String,
    #[serde(default)]
    result: Vec<QueryResult>,
}

#[derive(Debug, Deserialize)]
struct QueryResult {
    #[serde(default)]
    metric: BTreeMap<String, String>,
    #[serde(default)]
    value: Vec<Value>,
    #[serde(default)]
    values: Vec<Vec<Value>>,
}

/// Trailing columns appended after the label columns.
const SAMPLE_COLUMNS: [&str; 2] = ["value", "timestamp"];

fn not_prometheus(reason: impl Into<String>) -> NormalizationError {
    NormalizationError::NotPrometheusFormat(reason.into())
}

/// Sample timestamp cell: epoch numbers become RFC-3339, strings pass through.
fn render_timestamp(ts: &Value) -> String {
    match ts {
        Value::String(s) => s.clone(),
        Value::Number(n) => format_epoch(n).unwrap_or_else(|| n.to_string()),
        other => other.to_string(),
    }
}

fn render_sample_value(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Number(n) => format_number(n),
        other => other.to_string(),
    }
}

/// One row per sample: matrix results emit a row per `[ts, value]` pair,
/// vector results a single row. Label columns come first, sorted by their
/// sanitized name, then `value` and `timestamp`.
pub struct PrometheusNormalizer;

impl PrometheusNormalizer {
    fn parse(bytes: &[u8]) -> Result<QueryResponse, NormalizationError> {
        let response: QueryResponse =
            serde_json::from_slice(bytes).map_err(|e| not_prometheus(e.to_string()))?;

        if response.status != "success" {
            return Err(not_prometheus(format!("status is '{}'", response.status)));
        }
        match response.data.result_type.as_str() {
            "vector" | "matrix" => {}
            other => return Err(not_prometheus(format!("unsupported resultType '{other}'"))),
        }
        if response.data.result.is_empty() {
            return Err(not_prometheus("empty result set"));
        }
        Ok(response)
    }
}

impl Normalizer for PrometheusNormalizer {
    fn name(&self) -> &'static str {
        "prometheus"
    }

    fn normalize(
        &self,
        bytes: &[u8],
        _config: &ExporterConfig,
    ) -> Result<TabularRecord, NormalizationError> {
        let response = Self::parse(bytes)?;
        let results = &response.data.result;

        let labels: BTreeSet<&str> = results
            .iter()
            .flat_map(|r| r.metric.keys().map(String::as_str))
            .collect();
        let names = sanitize_labels_reserving(labels.iter().copied(), &SAMPLE_COLUMNS);

        // (column name, original label), ordered by column name
        let mut columns: Vec<(&str, &str)> = names
            .iter()
            .map(|(label, column)| (column.as_str(), label.as_str()))
            .collect();
        columns.sort_unstable();

        let mut header: Vec<String> = columns.iter().map(|(c, _)| c.to_string()).collect();
        header.extend(SAMPLE_COLUMNS.iter().map(|c| c.to_string()));

        let mut rows = Vec::new();
        for result in results {
            let mut emit = |ts: &Value, value: &Value| {
                let mut row: Vec<String> = columns
                    .iter()
                    .map(|(_, label)| result.metric.get(*label).cloned().unwrap_or_default())
                    .collect();
                row.push(render_sample_value(value));
                row.push(render_timestamp(ts));
                rows.push(row);
            };

            if !result.values.is_empty() {
                for pair in result.values.iter().filter(|p| p.len() == 2) {
                    emit(&pair[0], &pair[1]);
                }
            } else if result.value.len() == 2 {
                emit(&result.value[0], &result.value[1]);
            }
        }

        debug!(
            result_type = %response.data.result_type,
            series = results.len(),
            samples = rows.len(),
            "Converted Prometheus query result"
        );
        Ok(TabularRecord::new(header, rows))
    }
}
