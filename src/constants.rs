/// Content-representation labels recognised by the format dispatcher.
/// Matching is by substring against the lower-cased `Content-Type` header.
pub const CONTENT_TYPE_CSV: &str = "text/csv";
pub const CONTENT_TYPE_JSON: &str = "application/json";
pub const CONTENT_TYPE_OCTET: &str = "application/octet-stream";
pub const CONTENT_TYPE_BINARY: &str = "binary/octet-stream";

/// Columns whose header starts with this prefix are provider extensions and
/// do not take part in cost-series identity.
pub const INTERNAL_COLUMN_PREFIX: &str = "x_";

/// Separator used when joining row values into an identity key
pub const IDENTITY_KEY_DELIMITER: &str = " ";

/// Header looked up (case-insensitively) to find the value of cost rows
pub const COST_VALUE_COLUMN: &str = "BilledCost";

/// Metric name used for every cost series
pub const COST_METRIC_NAME: &str = "billed_cost";

/// Help text attached to every exported series. The registry rejects empty
/// help and requires it to be identical for all series of one name.
pub const SERIES_HELP: &str = "Value scraped from the configured FinOps source";

/// Position of `average` in the resource-timeseries header
pub const RESOURCE_VALUE_COLUMN_INDEX: usize = 3;

/// Position of `metricName` in the resource-timeseries header
pub const RESOURCE_NAME_COLUMN_INDEX: usize = 1;

/// Fixed delay used for configuration and fetch retries
pub const RETRY_DELAY_SECS: u64 = 5;

// Process defaults
pub const DEFAULT_CONFIG_PATH: &str = "/config/config.toml";
pub const DEFAULT_LISTEN_ADDR: &str = "0.0.0.0:2112";
pub const DEFAULT_LOG_FILTER: &str = "finops_exporter=info";

/// Additional variable holding the resource id stamped on resource-timeseries rows
pub const RESOURCE_ID_VARIABLE: &str = "ResourceId";
