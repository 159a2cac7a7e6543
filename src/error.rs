use thiserror::Error;

/// Failures turning a payload into a tabular record.
#[derive(Error, Debug)]
pub enum NormalizationError {
    #[error("malformed CSV: {0}")]
    MalformedCsv(#[from] csv::Error),

    #[error("JSON decoding failed: {0}")]
    MalformedJson(#[from] serde_json::Error),

    #[error("unsupported JSON layout: {0}")]
    SchemaError(String),

    #[error("not a Prometheus query result: {0}")]
    NotPrometheusFormat(String),

    #[error("gzip decompression failed: {0}")]
    Decompression(#[source] std::io::Error),
}

/// Failures that make a whole reconciliation pass impossible.
#[derive(Error, Debug, PartialEq, Eq)]
pub enum ReconciliationError {
    #[error("value column '{column}' not found in header")]
    ValueColumnNotFound { column: String },

    #[error("generic metric type requires value_column_index and metric_name")]
    MissingGenericSchema,
}

/// A single row that could not be materialised. Never aborts a poll.
#[derive(Error, Debug, PartialEq, Eq)]
pub enum RowError {
    #[error("value '{value}' is not a number")]
    UnparsableValue { value: String },

    #[error("value column {index} out of range for row of {len} columns")]
    ValueColumnOutOfRange { index: usize, len: usize },

    #[error("could not register series: {0}")]
    Registration(String),
}

/// Errors raised by a metric registry binding.
#[derive(Error, Debug, PartialEq, Eq)]
pub enum RegistryError {
    #[error("registration failed: {0}")]
    Registration(String),

    #[error("unregistration failed: {0}")]
    Unregistration(String),

    #[error("encoding failed: {0}")]
    Encoding(String),
}

#[derive(Error, Debug)]
pub enum ExporterError {
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("TOML deserialization failed: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error(transparent)]
    Normalization(#[from] NormalizationError),

    #[error(transparent)]
    Reconciliation(#[from] ReconciliationError),

    #[error(transparent)]
    Registry(#[from] RegistryError),
}

pub type Result<T> = std::result::Result<T, ExporterError>;
