use serde_json::{Map, Value};
use std::collections::BTreeSet;
use tracing::{debug, warn};

use crate::config::ExporterConfig;
use crate::error::NormalizationError;
use crate::pipeline::normalize::value::render_json_value;
use crate::pipeline::normalize::{Normalizer, TabularRecord};

/// Infers a table from an array of flat objects.
///
/// Accepts either a top-level array or an object whose first array-valued
/// property (in document order) holds the objects. The header is the sorted
/// union of all keys; absent keys render as empty cells.
pub struct GenericJsonNormalizer;

impl GenericJsonNormalizer {
    fn extract_objects(root: &Value) -> Result<Vec<&Map<String, Value>>, NormalizationError> {
        match root {
            Value::Array(items) => items
                .iter()
                .map(|item| {
                    item.as_object().ok_or_else(|| {
                        NormalizationError::SchemaError(
                            "top-level array contains a non-object element".to_string(),
                        )
                    })
                })
                .collect(),
            Value::Object(wrapper) => {
                for (key, value) in wrapper {
                    let Some(items) = value.as_array() else {
                        continue;
                    };
                    let objects: Vec<&Map<String, Value>> =
                        items.iter().filter_map(Value::as_object).collect();
                    if items.is_empty() || !objects.is_empty() {
                        debug!(wrapper = %key, records = objects.len(), "Using wrapped array");
                        return Ok(objects);
                    }
                }
                Err(NormalizationError::SchemaError(
                    "no array of objects found in top-level object".to_string(),
                ))
            }
            _ => Err(NormalizationError::SchemaError(
                "expected an array of objects or an object wrapping one".to_string(),
            )),
        }
    }
}

impl Normalizer for GenericJsonNormalizer {
    fn name(&self) -> &'static str {
        "generic_json"
    }

    fn normalize(
        &self,
        bytes: &[u8],
        _config: &ExporterConfig,
    ) -> Result<TabularRecord, NormalizationError> {
        let root: Value = serde_json::from_slice(bytes)?;
        let objects = Self::extract_objects(&root)?;

        if objects.is_empty() {
            warn!("JSON contains no records");
            return Ok(TabularRecord::empty());
        }

        let header: Vec<String> = objects
            .iter()
            .flat_map(|obj| obj.keys().cloned())
            .collect::<BTreeSet<String>>()
            .into_iter()
            .collect();

        let rows = objects
            .iter()
            .map(|obj| {
                header
                    .iter()
                    .map(|key| obj.get(key).map(render_json_value).unwrap_or_default())
                    .collect()
            })
            .collect();

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
            metric_type = "generic"
            [exporter.api]
            path = "/data.json"
            "#,
        )
        .unwrap()
        .exporter
    }

    fn csv(input: &str) -> Result<String, NormalizationError> {
        GenericJsonNormalizer
            .normalize(input.as_bytes(), &config())
            .map(|r| r.to_csv().unwrap())
    }

    #[test]
    fn test_simple_two_rows() {
        let out = csv(r#"[{"test":"name","value":0.34},{"test":"name2","value":1.40}]"#).unwrap();
        assert_eq!(out, "test,value\nname,0.34\nname2,1.4");
    }

    #[test]
    fn test_header_is_sorted_union_with_blanks() {
        let out = csv(r#"[{"foo":"bar","count":10},{"zeta":true,"foo":null}]"#).unwrap();
        assert_eq!(out, "count,foo,zeta\n10,bar,\n,,true");
    }

    #[test]
    fn test_empty_array_is_empty_record() {
        assert_eq!(csv("[]").unwrap(), "");
    }

    #[test]
    fn test_wrapper_matches_bare_array() {
        let bare = csv(r#"[{"test":"name","value":0.34},{"test":"name2","value":1.40}]"#).unwrap();
        let wrapped = csv(
            r#"{"randomwrapper":[{"test":"name","value":0.34},{"test":"name2","value":1.40}],"toplevellabel":"value"}"#,
        )
        .unwrap();
        assert_eq!(bare, wrapped);
        assert_eq!(csv(r#"{"items": []}"#).unwrap(), "");
    }

    #[test]
    fn test_first_array_of_objects_wins() {
        let out = csv(r#"{"numbers":[1,2],"first":[{"a":1}],"second":[{"b":2}]}"#).unwrap();
        assert_eq!(out, "a\n1");
    }

    #[test]
    fn test_object_without_array_is_schema_error() {
        let err = csv(r#"{"random":"value","empty":"test"}"#).unwrap_err();
        assert!(matches!(err, NormalizationError::SchemaError(_)));
    }

    #[test]
    fn test_invalid_json_is_malformed() {
        let err = csv("{not json").unwrap_err();
        assert!(matches!(err, NormalizationError::MalformedJson(_)));
    }

    #[test]
    fn test_nested_values_are_stringified() {
        let out = csv(r#"[{"name":"a","meta":{"k":"v"},"list":[1,2]}]"#).unwrap();
        assert_eq!(out, "list,meta,name\n\"[1,2]\",\"{\"\"k\"\":\"\"v\"\"}\",a");
    }
}
