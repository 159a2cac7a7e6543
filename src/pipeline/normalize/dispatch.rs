//! Representation detection: which normalizer applies to a response.
//!
//! Resolution is a pure function of the declared content type and the request
//! path. The content type is matched against a fixed priority table; generic
//! octet-stream types (and anything unrecognised) fall back to sniffing the
//! path for `csv` / `json`, and `binary/octet-stream` additionally honours a
//! `.gz` path by gunzipping before sniffing.

use flate2::read::GzDecoder;
use std::io::Read;
use tracing::{debug, info, warn};

use super::{NormalizerVariant, TabularRecord};
use crate::config::{ExporterConfig, MetricType};
use crate::constants::{
    CONTENT_TYPE_BINARY, CONTENT_TYPE_CSV, CONTENT_TYPE_JSON, CONTENT_TYPE_OCTET,
};
use crate::error::NormalizationError;

const UTF8_BOM: &[u8] = b"\xef\xbb\xbf";

/// One upstream response, as handed to the dispatcher.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawResponse {
    pub bytes: Vec<u8>,
    /// Lower-cased `Content-Type` header, empty when absent.
    pub declared_representation: String,
    /// The request path, used for content sniffing.
    pub source_path_hint: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PayloadFormat {
    Csv,
    Json,
}

/// Handler chosen from the content-type table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Route {
    Csv,
    Json,
    OctetFallback,
    BinaryFallback,
}

const ROUTES: [(&str, Route); 4] = [
    (CONTENT_TYPE_CSV, Route::Csv),
    (CONTENT_TYPE_JSON, Route::Json),
    (CONTENT_TYPE_OCTET, Route::OctetFallback),
    (CONTENT_TYPE_BINARY, Route::BinaryFallback),
];

/// Outcome of resolving a response's representation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Resolution {
    pub format: PayloadFormat,
    pub gzip: bool,
}

/// Look the label up in the priority table. Unknown labels behave like a
/// generic octet stream.
pub fn route_for_label(label: &str) -> Route {
    let label = label.to_ascii_lowercase();
    ROUTES
        .iter()
        .find(|(content_type, _)| label.contains(content_type))
        .map(|(_, route)| *route)
        .unwrap_or(Route::OctetFallback)
}

/// Infer the format from the path. Defaults to CSV.
pub fn sniff_path(path_hint: &str) -> PayloadFormat {
    let path = path_hint.to_ascii_lowercase();
    if path.contains("csv") {
        PayloadFormat::Csv
    } else if path.contains("json") {
        PayloadFormat::Json
    } else {
        PayloadFormat::Csv
    }
}

pub fn resolve(label: &str, path_hint: &str) -> Resolution {
    match route_for_label(label) {
        Route::Csv => Resolution {
            format: PayloadFormat::Csv,
            gzip: false,
        },
        Route::Json => Resolution {
            format: PayloadFormat::Json,
            gzip: false,
        },
        Route::OctetFallback => Resolution {
            format: sniff_path(path_hint),
            gzip: false,
        },
        Route::BinaryFallback => Resolution {
            format: sniff_path(path_hint),
            gzip: path_hint.to_ascii_lowercase().contains(".gz"),
        },
    }
}

/// Pick the normalizer for a payload format under the configured metric type.
pub fn select_normalizer(format: PayloadFormat, metric_type: MetricType) -> NormalizerVariant {
    match (format, metric_type) {
        (PayloadFormat::Csv, _) => NormalizerVariant::Csv,
        (PayloadFormat::Json, MetricType::Cost) => NormalizerVariant::Focus,
        (PayloadFormat::Json, MetricType::Resource) => NormalizerVariant::ResourceTimeseries,
        (PayloadFormat::Json, MetricType::Generic) => NormalizerVariant::PrometheusQuery,
    }
}

pub fn gunzip(bytes: &[u8]) -> Result<Vec<u8>, NormalizationError> {
    let mut decoder = GzDecoder::new(bytes);
    let mut out = Vec::new();
    decoder
        .read_to_end(&mut out)
        .map_err(NormalizationError::Decompression)?;
    Ok(out)
}

pub fn strip_bom(bytes: &[u8]) -> &[u8] {
    bytes.strip_prefix(UTF8_BOM).unwrap_or(bytes)
}

/// Resolve, decompress and normalize one response.
pub fn normalize_response(
    raw: &RawResponse,
    config: &ExporterConfig,
) -> Result<TabularRecord, NormalizationError> {
    let route = route_for_label(&raw.declared_representation);
    let resolution = resolve(&raw.declared_representation, &raw.source_path_hint);
    match route {
        Route::Csv | Route::Json => {
            info!(content_type = %raw.declared_representation, "Detected {:?} content-type", resolution.format)
        }
        Route::OctetFallback | Route::BinaryFallback => warn!(
            content_type = %raw.declared_representation,
            path = %raw.source_path_hint,
            "Generic Content-Type: inferred {:?} from URL (gzip: {})",
            resolution.format,
            resolution.gzip
        ),
    }

    let decompressed;
    let payload = if resolution.gzip {
        decompressed = gunzip(&raw.bytes)?;
        debug!(
            compressed = raw.bytes.len(),
            decompressed = decompressed.len(),
            "Decompressed gzip payload"
        );
        strip_bom(&decompressed)
    } else {
        strip_bom(&raw.bytes)
    };

    let variant = select_normalizer(resolution.format, config.metric_type);
    debug!(?variant, bytes = payload.len(), "Normalizing payload");
    variant.normalize(payload, config)
}
