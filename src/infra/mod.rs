pub mod endpoint;
pub mod http_client;

pub use endpoint::{Endpoint, EndpointResolver};
pub use http_client::ReqwestFetcher;
