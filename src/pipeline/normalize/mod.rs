pub mod dispatch;
pub mod normalizers;
pub mod sanitize;
pub mod value;

use tracing::debug;

use crate::config::ExporterConfig;
use crate::error::NormalizationError;

pub use dispatch::{normalize_response, resolve, PayloadFormat, RawResponse, Resolution};
pub use normalizers::{
    CsvNormalizer, FocusNormalizer, GenericJsonNormalizer, PrometheusNormalizer,
    ResourceTimeseriesNormalizer,
};

/// One poll's observations as a uniform table.
///
/// Every row has exactly as many cells as the header. An empty record has no
/// header and no rows.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TabularRecord {
    header: Vec<String>,
    rows: Vec<Vec<String>>,
}

impl TabularRecord {
    pub fn new(header: Vec<String>, rows: Vec<Vec<String>>) -> Self {
        debug_assert!(rows.iter().all(|r| r.len() == header.len()));
        Self { header, rows }
    }

    pub fn empty() -> Self {
        Self::default()
    }

    pub fn header(&self) -> &[String] {
        &self.header
    }

    pub fn rows(&self) -> &[Vec<String>] {
        &self.rows
    }

    pub fn is_empty(&self) -> bool {
        self.header.is_empty() && self.rows.is_empty()
    }

    /// Case-insensitive header lookup.
    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.header.iter().position(|h| h.eq_ignore_ascii_case(name))
    }

    /// Render as CSV text, header first, without a trailing newline.
    pub fn to_csv(&self) -> Result<String, csv::Error> {
        if self.is_empty() {
            return Ok(String::new());
        }
        let mut writer = csv::WriterBuilder::new().from_writer(Vec::new());
        writer.write_record(&self.header)?;
        for row in &self.rows {
            writer.write_record(row)?;
        }
        let bytes = writer
            .into_inner()
            .map_err(|e| csv::Error::from(e.into_error()))?;
        Ok(String::from_utf8_lossy(&bytes).trim_end_matches('\n').to_string())
    }
}

/// Converts one input representation into a [`TabularRecord`].
pub trait Normalizer {
    /// Short name used in logs.
    fn name(&self) -> &'static str;

    fn normalize(
        &self,
        bytes: &[u8],
        config: &ExporterConfig,
    ) -> Result<TabularRecord, NormalizationError>;
}

/// The closed set of normalizers the dispatcher can pick from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NormalizerVariant {
    Csv,
    GenericJson,
    Focus,
    ResourceTimeseries,
    /// Prometheus query result, falling back to generic JSON inference when
    /// the payload is not one.
    PrometheusQuery,
}

impl NormalizerVariant {
    pub fn normalize(
        &self,
        bytes: &[u8],
        config: &ExporterConfig,
    ) -> Result<TabularRecord, NormalizationError> {
        match self {
            NormalizerVariant::Csv => CsvNormalizer.normalize(bytes, config),
            NormalizerVariant::GenericJson => GenericJsonNormalizer.normalize(bytes, config),
            NormalizerVariant::Focus => FocusNormalizer.normalize(bytes, config),
            NormalizerVariant::ResourceTimeseries => {
                ResourceTimeseriesNormalizer.normalize(bytes, config)
            }
            NormalizerVariant::PrometheusQuery => {
                match PrometheusNormalizer.normalize(bytes, config) {
                    Err(NormalizationError::NotPrometheusFormat(reason)) => {
                        debug!(
                            "Prometheus parsing failed ({}), trying generic JSON parser",
                            reason
                        );
                        GenericJsonNormalizer.normalize(bytes, config)
                    }
                    other => other,
                }
            }
        }
    }
}
