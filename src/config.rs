use once_cell::sync::Lazy;
use regex::{Captures, Regex};
use serde::{Deserialize, Deserializer};
use std::collections::HashMap;
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

use crate::error::{ExporterError, Result};

static VARIABLE_PATTERN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"<([^<>]*)>").expect("variable pattern is a valid regex"));

/// Top-level poll configuration document.
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub exporter: ExporterConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ExporterConfig {
    pub metric_type: MetricType,
    #[serde(
        default = "default_polling_interval",
        deserialize_with = "deserialize_duration"
    )]
    pub polling_interval: Duration,
    pub api: ApiConfig,
    #[serde(default)]
    pub generic: Option<GenericConfig>,
    #[serde(default)]
    pub additional_variables: HashMap<String, String>,
}

/// Upstream request description. `path` doubles as the sniffing hint for
/// payloads served with a generic content type.
#[derive(Debug, Clone, Deserialize)]
pub struct ApiConfig {
    pub path: String,
    #[serde(default = "default_verb")]
    pub verb: String,
    #[serde(default)]
    pub headers: Vec<String>,
    #[serde(default)]
    pub payload: Option<String>,
    #[serde(default)]
    pub server_url: Option<String>,
    #[serde(default)]
    pub endpoint_ref: Option<PathBuf>,
}

/// Schema for `generic` metric types. Both fields are required at
/// reconciliation time; they are optional here so a missing field surfaces
/// as a reconciliation error rather than a config parse failure.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct GenericConfig {
    #[serde(default)]
    pub value_column_index: Option<usize>,
    #[serde(default)]
    pub metric_name: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MetricType {
    Cost,
    Resource,
    Generic,
}

impl MetricType {
    pub fn as_str(&self) -> &'static str {
        match self {
            MetricType::Cost => "cost",
            MetricType::Resource => "resource",
            MetricType::Generic => "generic",
        }
    }
}

impl fmt::Display for MetricType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for MetricType {
    type Err = ExporterError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "cost" => Ok(MetricType::Cost),
            "resource" => Ok(MetricType::Resource),
            "generic" => Ok(MetricType::Generic),
            other => Err(ExporterError::Config(format!("unknown metric type: {other}"))),
        }
    }
}

impl<'de> Deserialize<'de> for MetricType {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        raw.parse().map_err(serde::de::Error::custom)
    }
}

fn default_verb() -> String {
    "GET".to_string()
}

fn default_polling_interval() -> Duration {
    Duration::from_secs(60)
}

fn deserialize_duration<'de, D: Deserializer<'de>>(
    deserializer: D,
) -> std::result::Result<Duration, D::Error> {
    let raw = String::deserialize(deserializer)?;
    parse_duration(&raw).map_err(serde::de::Error::custom)
}

impl Config {
    /// Read and parse the configuration file, then expand `<variable>`
    /// placeholders in the API path.
    pub fn load(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path).map_err(|e| {
            ExporterError::Config(format!(
                "Failed to read config file '{}': {}",
                path.display(),
                e
            ))
        })?;
        Self::from_toml_str(&content)
    }

    pub fn from_toml_str(content: &str) -> Result<Self> {
        let mut config: Config = toml::from_str(content)?;
        config.exporter.api.path =
            replace_variables(&config.exporter.api.path, &config.exporter.additional_variables);
        Ok(config)
    }
}

/// Replace every `<name>` with the matching additional variable. A value that
/// is written entirely in upper case names an environment variable whose
/// content is used instead. Unknown names expand to the empty string.
pub fn replace_variables(text: &str, variables: &HashMap<String, String>) -> String {
    VARIABLE_PATTERN
        .replace_all(text, |caps: &Captures| {
            let value = variables.get(&caps[1]).cloned().unwrap_or_default();
            if is_env_reference(&value) {
                std::env::var(&value).unwrap_or_default()
            } else {
                value
            }
        })
        .into_owned()
}

fn is_env_reference(value: &str) -> bool {
    value.chars().any(|c| c.is_ascii_alphabetic())
        && value
            .chars()
            .all(|c| c.is_ascii_uppercase() || c.is_ascii_digit() || c == '_')
}

/// Parse a Go-style duration string such as `30s`, `1h30m` or `1.5h`.
pub fn parse_duration(input: &str) -> Result<Duration> {
    let s = input.trim();
    if s == "0" {
        return Ok(Duration::ZERO);
    }
    if s.is_empty() {
        return Err(ExporterError::Config("empty duration".to_string()));
    }

    let invalid = || ExporterError::Config(format!("invalid duration: {input}"));
    let mut total_nanos: f64 = 0.0;
    let mut rest = s;
    while !rest.is_empty() {
        let number_len = rest
            .find(|c: char| !(c.is_ascii_digit() || c == '.'))
            .ok_or_else(invalid)?;
        if number_len == 0 {
            return Err(invalid());
        }
        let value: f64 = rest[..number_len].parse().map_err(|_| invalid())?;
        rest = &rest[number_len..];

        let unit_len = rest
            .find(|c: char| c.is_ascii_digit() || c == '.')
            .unwrap_or(rest.len());
        let nanos_per_unit = match &rest[..unit_len] {
            "ns" => 1.0,
            "us" | "µs" => 1e3,
            "ms" => 1e6,
            "s" => 1e9,
            "m" => 60.0 * 1e9,
            "h" => 3600.0 * 1e9,
            _ => return Err(invalid()),
        };
        rest = &rest[unit_len..];
        total_nanos += value * nanos_per_unit;
    }

    Ok(Duration::from_nanos(total_nanos.round() as u64))
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"
        [exporter]
        metric_type = "Generic"
        polling_interval = "1m30s"

        [exporter.api]
        path = "/api/v1/query?query=<QUERY>&sub=<sub>"
        server_url = "http://prometheus:9090"

        [exporter.generic]
        value_column_index = 2
        metric_name = "cpu_usage"

        [exporter.additional_variables]
        QUERY = "up"
        sub = "abc"
    "#;

    #[test]
    fn test_parses_full_document() {
        let config = Config::from_toml_str(SAMPLE).unwrap();
        let exporter = config.exporter;
        assert_eq!(exporter.metric_type, MetricType::Generic);
        assert_eq!(exporter.polling_interval, Duration::from_secs(90));
        assert_eq!(exporter.api.verb, "GET");
        assert_eq!(exporter.api.path, "/api/v1/query?query=up&sub=abc");
        let generic = exporter.generic.unwrap();
        assert_eq!(generic.value_column_index, Some(2));
        assert_eq!(generic.metric_name.as_deref(), Some("cpu_usage"));
    }

    #[test]
    fn test_metric_type_is_case_insensitive() {
        assert_eq!("COST".parse::<MetricType>().unwrap(), MetricType::Cost);
        assert_eq!("Resource".parse::<MetricType>().unwrap(), MetricType::Resource);
        assert!("gauge".parse::<MetricType>().is_err());
    }

    #[test]
    fn test_unknown_metric_type_fails_to_load() {
        let doc = SAMPLE.replace("\"Generic\"", "\"histogram\"");
        assert!(Config::from_toml_str(&doc).is_err());
    }

    #[test]
    fn test_uppercase_variable_reads_environment() {
        std::env::set_var("FINOPS_EXPORTER_TEST_SUBSCRIPTION", "sub-42");
        let mut vars = HashMap::new();
        vars.insert(
            "subscription".to_string(),
            "FINOPS_EXPORTER_TEST_SUBSCRIPTION".to_string(),
        );
        vars.insert("group".to_string(), "rg-main".to_string());

        let out = replace_variables("/subs/<subscription>/groups/<group>/<missing>", &vars);
        assert_eq!(out, "/subs/sub-42/groups/rg-main/");
    }

    #[test]
    fn test_parse_duration_forms() {
        assert_eq!(parse_duration("30s").unwrap(), Duration::from_secs(30));
        assert_eq!(parse_duration("1h0m0s").unwrap(), Duration::from_secs(3600));
        assert_eq!(parse_duration("1.5h").unwrap(), Duration::from_secs(5400));
        assert_eq!(parse_duration("250ms").unwrap(), Duration::from_millis(250));
        assert_eq!(parse_duration("0").unwrap(), Duration::ZERO);
        assert!(parse_duration("10").is_err());
        assert!(parse_duration("5d").is_err());
        assert!(parse_duration("").is_err());
    }
}
