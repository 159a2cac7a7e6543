use serde::Deserialize;
use std::collections::HashMap;
use std::fs;

use crate::config::{replace_variables, ApiConfig};
use crate::error::{ExporterError, Result};

/// Where and how to reach the upstream source.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Endpoint {
    pub server_url: String,
    pub bearer_token: Option<String>,
}

/// Contents of an `endpoint_ref` file.
#[derive(Debug, Deserialize)]
struct EndpointRef {
    server_url: String,
    #[serde(default)]
    token: Option<String>,
    #[serde(default)]
    token_env: Option<String>,
}

/// Resolves the upstream endpoint from the API config.
///
/// An inline `server_url` wins over `endpoint_ref`. The referenced file is
/// read on every call so rotated credentials are picked up on retry.
pub struct EndpointResolver;

impl EndpointResolver {
    pub fn resolve(api: &ApiConfig, variables: &HashMap<String, String>) -> Result<Endpoint> {
        if let Some(url) = api.server_url.as_deref().filter(|u| !u.trim().is_empty()) {
            return Ok(Endpoint {
                server_url: replace_variables(url, variables),
                bearer_token: None,
            });
        }

        let path = api.endpoint_ref.as_ref().ok_or_else(|| {
            ExporterError::Config("api.server_url or api.endpoint_ref is required".to_string())
        })?;
        let content = fs::read_to_string(path).map_err(|e| {
            ExporterError::Config(format!(
                "Failed to read endpoint ref '{}': {}",
                path.display(),
                e
            ))
        })?;
        let reference: EndpointRef = toml::from_str(&content)?;

        let bearer_token = match (reference.token, reference.token_env) {
            (Some(token), _) => Some(token),
            (None, Some(var)) => std::env::var(&var).ok(),
            (None, None) => None,
        };

        Ok(Endpoint {
            server_url: replace_variables(&reference.server_url, variables),
            bearer_token,
        })
    }
}
