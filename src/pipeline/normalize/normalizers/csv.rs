use tracing::debug;

use crate::config::ExporterConfig;
use crate::error::NormalizationError;
use crate::pipeline::normalize::dispatch::strip_bom;
use crate::pipeline::normalize::{Normalizer, TabularRecord};

/// CSV passthrough: first record is the header, the rest are data rows.
///
/// Quoting is lenient (stray quotes inside unquoted fields are kept as
/// text); rows of inconsistent width are rejected.
pub struct CsvNormalizer;

impl Normalizer for CsvNormalizer {
    fn name(&self) -> &'static str {
        "csv"
    }

    fn normalize(
        &self,
        bytes: &[u8],
        _config: &ExporterConfig,
    ) -> Result<TabularRecord, NormalizationError> {
        let bytes = strip_bom(bytes);
        let mut reader = csv::ReaderBuilder::new()
            .has_headers(false)
            .flexible(false)
            .from_reader(bytes);

        let mut records = reader.records();
        let header: Vec<String> = match records.next() {
            Some(first) => first?.iter().map(str::to_string).collect(),
            None => return Ok(TabularRecord::empty()),
        };

        let mut rows = Vec::new();
        for record in records {
            rows.push(record?.iter().map(str::to_string).collect());
        }

        debug!(columns = header.len(), rows = rows.len(), "Parsed CSV payload");
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
            metric_type = "cost"
            [exporter.api]
            path = "/export.csv"
            "#,
        )
        .unwrap()
        .exporter
    }

    #[test]
    fn test_parses_header_and_rows() {
        let out = CsvNormalizer
            .normalize(b"\xef\xbb\xbfService,BilledCost\nvm,1.5\ndisk,0.25\n", &config())
            .unwrap();
        assert_eq!(out.header(), ["Service", "BilledCost"]);
        assert_eq!(out.rows().len(), 2);
        assert_eq!(out.rows()[1], ["disk", "0.25"]);
    }

    #[test]
    fn test_lenient_quotes() {
        let out = CsvNormalizer
            .normalize(b"name,note\na,say \"hi\" there\nb,\"quoted, with comma\"", &config())
            .unwrap();
        assert_eq!(out.rows()[0][1], "say \"hi\" there");
        assert_eq!(out.rows()[1][1], "quoted, with comma");
    }

    #[test]
    fn test_inconsistent_rows_are_malformed() {
        let err = CsvNormalizer
            .normalize(b"a,b\n1,2,3\n", &config())
            .unwrap_err();
        assert!(matches!(err, NormalizationError::MalformedCsv(_)));
    }

    #[test]
    fn test_empty_payload_is_empty_record() {
        let out = CsvNormalizer.normalize(b"", &config()).unwrap();
        assert!(out.is_empty());
    }
}
