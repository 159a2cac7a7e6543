use anyhow::Context;
use clap::Parser;
use parking_lot::RwLock;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{error, info};

use finops_exporter::app::PollUseCase;
use finops_exporter::constants::{DEFAULT_CONFIG_PATH, DEFAULT_LISTEN_ADDR};
use finops_exporter::infra::ReqwestFetcher;
use finops_exporter::logging;
use finops_exporter::observability;
use finops_exporter::pipeline::{MetricCache, PrometheusRegistry};
use finops_exporter::server;

#[derive(Parser)]
#[command(name = "finops_exporter")]
#[command(about = "Republishes a polled cost or metrics endpoint as Prometheus gauges")]
#[command(version)]
struct Cli {
    /// Poll configuration file, re-read before every poll
    #[arg(long, env = "FINOPS_EXPORTER_CONFIG", default_value = DEFAULT_CONFIG_PATH)]
    config: PathBuf,

    /// Address the /metrics endpoint listens on
    #[arg(long, env = "FINOPS_EXPORTER_LISTEN", default_value = DEFAULT_LISTEN_ADDR)]
    listen: SocketAddr,

    /// Directory for daily-rotated JSON logs; console only when unset
    #[arg(long, env = "FINOPS_EXPORTER_LOG_DIR")]
    log_dir: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv::dotenv().ok();
    let cli = Cli::parse();

    let _guard = logging::init_logging(cli.log_dir.as_deref());
    observability::init();

    info!(config = %cli.config.display(), listen = %cli.listen, "Starting finops_exporter");

    let cache = Arc::new(RwLock::new(MetricCache::new(PrometheusRegistry::new())));
    let poller = PollUseCase::new(
        cli.config.clone(),
        Box::new(ReqwestFetcher::new()),
        cache.clone(),
    );
    let mut poll_task = tokio::spawn(async move { poller.run().await });

    tokio::select! {
        served = server::start_server(cache, cli.listen) => {
            poll_task.abort();
            if let Err(e) = &served {
                error!("Metrics server stopped: {}", e);
            }
            served
                .map_err(|e| anyhow::anyhow!(e))
                .context("metrics server failed")
        }
        joined = &mut poll_task => {
            match &joined {
                Err(e) if e.is_panic() => error!("Poller panicked: {}", e),
                Err(e) => error!("Poller stopped: {}", e),
                Ok(()) => error!("Poller exited"),
            }
            Err(anyhow::anyhow!("poll loop terminated, shutting down"))
        }
    }
}
