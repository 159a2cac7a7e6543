//! FOCUS 1.0 cost export (`items[].spec.focusSpec`) rendered with a fixed
//! column layout.

use serde_json::{Map, Value};
use tracing::debug;

use crate::config::ExporterConfig;
use crate::error::NormalizationError;
use crate::pipeline::normalize::value::{normalize_rfc3339, Quantity};
use crate::pipeline::normalize::{Normalizer, TabularRecord};

/// How a FOCUS field is rendered into a cell.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValueKind {
    String,
    Integer,
    Quantity,
    Timestamp,
    TagList,
}

/// Column order of the cost table. Field names are the header; the JSON key
/// is the same name with a lower-case first letter.
pub const FOCUS_SCHEMA: &[(&str, ValueKind)] = &[
    ("AvailabilityZone", ValueKind::String),
    ("BilledCost", ValueKind::Quantity),
    ("BillingAccountId", ValueKind::String),
    ("BillingAccountName", ValueKind::String),
    ("BillingAccountType", ValueKind::String),
    ("BillingCurrency", ValueKind::String),
    ("BillingPeriodEnd", ValueKind::Timestamp),
    ("BillingPeriodStart", ValueKind::Timestamp),
    ("CapacityReservationId", ValueKind::String),
    ("CapacityReservationStatus", ValueKind::String),
    ("ChargeCategory", ValueKind::String),
    ("ChargeClass", ValueKind::String),
    ("ChargeDescription", ValueKind::String),
    ("ChargeFrequency", ValueKind::String),
    ("ChargePeriodEnd", ValueKind::Timestamp),
    ("ChargePeriodStart", ValueKind::Timestamp),
    ("CommitmentDiscountCategory", ValueKind::String),
    ("CommitmentDiscountId", ValueKind::String),
    ("CommitmentDiscountName", ValueKind::String),
    ("CommitmentDiscountQuantity", ValueKind::Quantity),
    ("CommitmentDiscountStatus", ValueKind::String),
    ("CommitmentDiscountType", ValueKind::String),
    ("CommitmentDiscountUnit", ValueKind::String),
    ("ConsumedQuantity", ValueKind::Quantity),
    ("ConsumedUnit", ValueKind::String),
    ("ContractedCost", ValueKind::Quantity),
    ("ContractedUnitPrice", ValueKind::Quantity),
    ("EffectiveCost", ValueKind::Quantity),
    ("InvoiceIssuerName", ValueKind::String),
    ("ListCost", ValueKind::Quantity),
    ("ListUnitPrice", ValueKind::Quantity),
    ("PricingCategory", ValueKind::String),
    ("PricingQuantity", ValueKind::Quantity),
    ("PricingUnit", ValueKind::String),
    ("ProviderName", ValueKind::String),
    ("PublisherName", ValueKind::String),
    ("RegionId", ValueKind::String),
    ("RegionName", ValueKind::String),
    ("ResourceId", ValueKind::String),
    ("ResourceName", ValueKind::String),
    ("ResourceType", ValueKind::String),
    ("ServiceCategory", ValueKind::String),
    ("ServiceName", ValueKind::String),
    ("SkuId", ValueKind::String),
    ("SkuPriceId", ValueKind::String),
    ("SubAccountId", ValueKind::String),
    ("SubAccountName", ValueKind::String),
    ("SubAccountType", ValueKind::String),
    ("UsageQuantity", ValueKind::Integer),
    ("Tags", ValueKind::TagList),
];

fn json_key(field: &str) -> String {
    let mut chars = field.chars();
    match chars.next() {
        Some(first) => first.to_ascii_lowercase().to_string() + chars.as_str(),
        None => String::new(),
    }
}

/// Render one field per its declared kind. Anything absent or of an
/// unexpected shape becomes an empty cell.
pub fn render_field(kind: ValueKind, value: Option<&Value>) -> String {
    let Some(value) = value else {
        return String::new();
    };
    match kind {
        ValueKind::String => value.as_str().map(str::to_string).unwrap_or_default(),
        ValueKind::Integer => value
            .as_i64()
            .map(|i| i.to_string())
            .or_else(|| value.as_str().and_then(|s| s.parse::<i64>().ok()).map(|i| i.to_string()))
            .unwrap_or_default(),
        ValueKind::Quantity => Quantity::from_json(value)
            .map(|q| q.to_canonical_string())
            .unwrap_or_default(),
        ValueKind::Timestamp => value.as_str().and_then(normalize_rfc3339).unwrap_or_default(),
        ValueKind::TagList => render_tags(value),
    }
}

fn render_tags(value: &Value) -> String {
    let Some(tags) = value.as_array() else {
        return String::new();
    };
    tags.iter()
        .filter_map(Value::as_object)
        .map(|tag| {
            let key = tag.get("key").and_then(Value::as_str).unwrap_or_default();
            let value = tag.get("value").and_then(Value::as_str).unwrap_or_default();
            format!("{key}={value}")
        })
        .collect::<Vec<_>>()
        .join(";")
}

pub struct FocusNormalizer;

impl FocusNormalizer {
    fn focus_spec(item: &Value) -> Option<&Map<String, Value>> {
        item.get("spec")?.get("focusSpec")?.as_object()
    }
}

impl Normalizer for FocusNormalizer {
    fn name(&self) -> &'static str {
        "focus"
    }

    fn normalize(
        &self,
        bytes: &[u8],
        _config: &ExporterConfig,
    ) -> Result<TabularRecord, NormalizationError> {
        let root: Value = serde_json::from_slice(bytes)?;
        let root = root.as_object().ok_or_else(|| {
            NormalizationError::SchemaError("FOCUS export must be a JSON object".to_string())
        })?;

        let items = root
            .get("items")
            .and_then(Value::as_array)
            .map(Vec::as_slice)
            .unwrap_or_default();
        if items.is_empty() {
            return Ok(TabularRecord::empty());
        }

        let keys: Vec<String> = FOCUS_SCHEMA.iter().map(|(field, _)| json_key(field)).collect();
        let empty = Map::new();
        let rows: Vec<Vec<String>> = items
            .iter()
            .map(|item| {
                let spec = Self::focus_spec(item).unwrap_or(&empty);
                FOCUS_SCHEMA
                    .iter()
                    .zip(&keys)
                    .map(|((_, kind), key)| render_field(*kind, spec.get(key)))
                    .collect()
            })
            .collect();

        let header = FOCUS_SCHEMA.iter().map(|(field, _)| field.to_string()).collect();
        debug!(rows = rows.len(), "Rendered FOCUS cost records");
        Ok(TabularRecord::new(header, rows))
    }
}
