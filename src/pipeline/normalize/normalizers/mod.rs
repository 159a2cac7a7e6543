pub mod csv;
pub mod focus;
pub mod generic_json;
pub mod prometheus;
pub mod resource;

pub use self::csv::CsvNormalizer;
pub use focus::FocusNormalizer;
pub use generic_json::GenericJsonNormalizer;
pub use prometheus::PrometheusNormalizer;
pub use resource::ResourceTimeseriesNormalizer;
