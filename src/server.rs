use axum::{
    http::{header, StatusCode},
    response::{IntoResponse, Json},
    routing::get,
    Extension, Router,
};
use hyper::Server;
use std::net::SocketAddr;
use tracing::{error, info};

use crate::app::SharedCache;
use crate::observability;
use crate::pipeline::PrometheusRegistry;

const TEXT_FORMAT: &str = "text/plain; version=0.0.4; charset=utf-8";

/// Health check endpoint
pub async fn health(Extension(cache): Extension<SharedCache<PrometheusRegistry>>) -> impl IntoResponse {
    let series = cache.read().len();
    Json(serde_json::json!({
        "status": "healthy",
        "service": "finops_exporter",
        "version": env!("CARGO_PKG_VERSION"),
        "series": series
    }))
}

/// Scraped series followed by the exporter's own metrics. The read lock is
/// held while gathering so a scrape never sees a half-applied poll.
pub async fn render_metrics(
    Extension(cache): Extension<SharedCache<PrometheusRegistry>>,
) -> impl IntoResponse {
    let rendered = {
        let cache = cache.read();
        cache.registry().render()
    };

    match rendered {
        Ok(mut body) => {
            body.push_str(&observability::render());
            (StatusCode::OK, [(header::CONTENT_TYPE, TEXT_FORMAT)], body).into_response()
        }
        Err(e) => {
            error!("Failed to encode metrics: {}", e);
            (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()).into_response()
        }
    }
}

pub fn create_server(cache: SharedCache<PrometheusRegistry>) -> Router {
    Router::new()
        .route("/metrics", get(render_metrics))
        .route("/health", get(health))
        .layer(Extension(cache))
}

/// Serve `/metrics` and `/health` until the process exits.
pub async fn start_server(
    cache: SharedCache<PrometheusRegistry>,
    addr: SocketAddr,
) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let app = create_server(cache);

    info!("Metrics endpoint: http://{}/metrics", addr);
    Server::bind(&addr).serve(app.into_make_service()).await?;

    Ok(())
}
