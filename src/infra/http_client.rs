use async_trait::async_trait;
use reqwest::header::{CONTENT_LENGTH, CONTENT_TYPE};
use reqwest::{Method, StatusCode};
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::app::ports::FetchPort;
use crate::config::ExporterConfig;
use crate::constants::RETRY_DELAY_SECS;
use crate::error::{ExporterError, Result};
use crate::infra::endpoint::{Endpoint, EndpointResolver};
use crate::observability::PollMetrics;
use crate::pipeline::RawResponse;

/// Split a `Name: value` header line.
pub fn parse_header(line: &str) -> Option<(&str, &str)> {
    let (name, value) = line.split_once(':')?;
    let name = name.trim();
    if name.is_empty() {
        return None;
    }
    Some((name, value.trim()))
}

pub fn request_url(endpoint: &Endpoint, path: &str) -> String {
    let base = endpoint.server_url.trim_end_matches('/');
    if path.is_empty() || path.starts_with('/') {
        format!("{base}{path}")
    } else {
        format!("{base}/{path}")
    }
}

/// HTTP fetcher retrying until the source answers 200.
///
/// Transport errors and non-200 responses are logged, then the endpoint is
/// resolved again and the request repeated after a fixed delay.
pub struct ReqwestFetcher {
    client: reqwest::Client,
    retry_delay: Duration,
}

impl Default for ReqwestFetcher {
    fn default() -> Self {
        Self::new()
    }
}

impl ReqwestFetcher {
    pub fn new() -> Self {
        Self::with_retry_delay(Duration::from_secs(RETRY_DELAY_SECS))
    }

    pub fn with_retry_delay(retry_delay: Duration) -> Self {
        Self {
            client: reqwest::Client::new(),
            retry_delay,
        }
    }

    fn build_request(
        &self,
        config: &ExporterConfig,
        endpoint: &Endpoint,
        method: &Method,
    ) -> reqwest::RequestBuilder {
        let api = &config.api;
        let url = request_url(endpoint, &api.path);
        let mut request = self.client.request(method.clone(), &url);

        for line in &api.headers {
            match parse_header(line) {
                Some((name, value)) => request = request.header(name, value),
                None => warn!(header = %line, "Ignoring malformed header"),
            }
        }
        if let Some(token) = &endpoint.bearer_token {
            request = request.bearer_auth(token);
        }
        if let Some(payload) = api.payload.as_ref().filter(|p| !p.is_empty()) {
            request = request.body(payload.clone());
        }
        debug!(%method, %url, "Built upstream request");
        request
    }
}

#[async_trait]
impl FetchPort for ReqwestFetcher {
    async fn fetch(&self, config: &ExporterConfig) -> Result<RawResponse> {
        let method = Method::from_bytes(config.api.verb.to_ascii_uppercase().as_bytes())
            .map_err(|_| ExporterError::Config(format!("invalid HTTP verb: {}", config.api.verb)))?;
        let mut endpoint = EndpointResolver::resolve(&config.api, &config.additional_variables)?;

        loop {
            let response = self.build_request(config, &endpoint, &method).send().await;
            match response {
                Ok(resp) if resp.status() == StatusCode::OK => {
                    let headers = resp.headers().clone();
                    let content_type = headers
                        .get(CONTENT_TYPE)
                        .and_then(|v| v.to_str().ok())
                        .unwrap_or_default()
                        .to_ascii_lowercase();
                    let content_length = headers
                        .get(CONTENT_LENGTH)
                        .and_then(|v| v.to_str().ok())
                        .unwrap_or_default()
                        .to_string();

                    match resp.bytes().await {
                        Ok(bytes) => {
                            debug!(%content_type, %content_length, bytes = bytes.len(), "Received upstream response");
                            return Ok(RawResponse {
                                bytes: bytes.to_vec(),
                                declared_representation: content_type,
                                source_path_hint: config.api.path.clone(),
                            });
                        }
                        Err(e) => warn!("Failed to read response body: {}", e),
                    }
                }
                Ok(resp) => {
                    let status = resp.status();
                    let body = resp.text().await.unwrap_or_default();
                    warn!(status = status.as_u16(), body = %body, "Received non-200 status code");
                }
                Err(e) => warn!("Request failed: {}", e),
            }

            PollMetrics::record_fetch_retry();
            warn!("Retrying connection in {:?}...", self.retry_delay);
            tokio::time::sleep(self.retry_delay).await;

            info!("Resolving endpoint again...");
            match EndpointResolver::resolve(&config.api, &config.additional_variables) {
                Ok(fresh) => endpoint = fresh,
                Err(e) => warn!("Endpoint resolution failed, keeping previous endpoint: {}", e),
            }
        }
    }
}
