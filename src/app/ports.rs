use async_trait::async_trait;

use crate::config::ExporterConfig;
use crate::error::Result;
use crate::pipeline::RawResponse;

/// Retrieves one upstream response for a poll.
///
/// Implementations own their retry policy; an error means the poll cannot
/// proceed at all.
#[async_trait]
pub trait FetchPort: Send + Sync {
    async fn fetch(&self, config: &ExporterConfig) -> Result<RawResponse>;
}
