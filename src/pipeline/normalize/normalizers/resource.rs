use serde::Deserialize;
use serde_json::Value;
use tracing::debug;

use crate::config::ExporterConfig;
use crate::constants::RESOURCE_ID_VARIABLE;
use crate::error::NormalizationError;
use crate::pipeline::normalize::value::{normalize_rfc3339, Quantity};
use crate::pipeline::normalize::{Normalizer, TabularRecord};

pub const RESOURCE_HEADER: [&str; 5] = ["ResourceId", "metricName", "timestamp", "average", "unit"];

#[derive(Debug, Deserialize)]
struct MetricsResponse {
    #[serde(default)]
    value: Vec<MetricSeries>,
}

#[derive(Debug, Deserialize)]
struct MetricSeries {
    #[serde(default)]
    name: MetricName,
    #[serde(default)]
    unit: String,
    #[serde(default)]
    timeseries: Vec<Timeseries>,
}

#[derive(Debug, Default, Deserialize)]
struct MetricName {
    #[serde(default)]
    value: String,
}

#[derive(Debug, Deserialize)]
struct Timeseries {
    #[serde(default)]
    data: Vec<DataPoint>,
}

#[derive(Debug, Deserialize)]
struct DataPoint {
    #[serde(rename = "timeStamp", alias = "timestamp", default)]
    time_stamp: Option<String>,
    #[serde(default)]
    average: Option<Value>,
}

/// Flattens a resource metrics response (`value` → `timeseries` → `data`)
/// into one row per data point. `ResourceId` comes from the poll's
/// additional variables.
pub struct ResourceTimeseriesNormalizer;

impl Normalizer for ResourceTimeseriesNormalizer {
    fn name(&self) -> &'static str {
        "resource_timeseries"
    }

    fn normalize(
        &self,
        bytes: &[u8],
        config: &ExporterConfig,
    ) -> Result<TabularRecord, NormalizationError> {
        let response: MetricsResponse = serde_json::from_slice(bytes)?;
        let resource_id = config
            .additional_variables
            .get(RESOURCE_ID_VARIABLE)
            .cloned()
            .unwrap_or_default();

        let mut rows = Vec::new();
        for series in &response.value {
            for timeseries in &series.timeseries {
                for point in &timeseries.data {
                    let timestamp = point
                        .time_stamp
                        .as_deref()
                        .and_then(normalize_rfc3339)
                        .unwrap_or_default();
                    let average = point
                        .average
                        .as_ref()
                        .and_then(Quantity::from_json)
                        .map(|q| q.to_canonical_string())
                        .unwrap_or_else(|| "0".to_string());
                    rows.push(vec![
                        resource_id.clone(),
                        series.name.value.clone(),
                        timestamp,
                        average,
                        series.unit.clone(),
                    ]);
                }
            }
        }

        debug!(
            series = response.value.len(),
            points = rows.len(),
            "Flattened resource timeseries"
        );
        let header = RESOURCE_HEADER.iter().map(|h| h.to_string()).collect();
        Ok(TabularRecord::new(header, rows))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;

    fn config() -> ExporterConfig {
        Config::from_toml_str(
            r#"
            [exporter]
            metric_type = "resource"
            [exporter.api]
            path = "/metrics.json"
            [exporter.additional_variables]
            ResourceId = "/subscriptions/1234/vm-1"
            "#,
        )
        .unwrap()
        .exporter
    }

    const PAYLOAD: &str = r#"{
        "value": [{
            "name": {"value": "Percentage CPU"},
            "unit": "Percent",
            "timeseries": [{
                "data": [
                    {"timeStamp": "2024-05-01T10:00:00Z", "average": 12.5},
                    {"timeStamp": "2024-05-01T10:01:00Z", "average": "3.25"},
                    {"timeStamp": "2024-05-01T10:02:00Z"}
                ]
            }]
        }]
    }"#;

    #[test]
    fn test_one_row_per_data_point() {
        let out = ResourceTimeseriesNormalizer
            .normalize(PAYLOAD.as_bytes(), &config())
            .unwrap();
        assert_eq!(out.header(), RESOURCE_HEADER);
        assert_eq!(out.rows().len(), 3);
        assert_eq!(
            out.rows()[0],
            [
                "/subscriptions/1234/vm-1",
                "Percentage CPU",
                "2024-05-01T10:00:00Z",
                "12.5",
                "Percent"
            ]
        );
        assert_eq!(out.rows()[1][3], "3.25");
        assert_eq!(out.rows()[2][3], "0");
    }

    #[test]
    fn test_no_series_keeps_header() {
        let out = ResourceTimeseriesNormalizer
            .normalize(br#"{"value": []}"#, &config())
            .unwrap();
        assert_eq!(out.header().len(), 5);
        assert!(out.rows().is_empty());
    }

    #[test]
    fn test_malformed_json_fails() {
        let err = ResourceTimeseriesNormalizer
            .normalize(b"[1, 2", &config())
            .unwrap_err();
        assert!(matches!(err, NormalizationError::MalformedJson(_)));
    }
}
