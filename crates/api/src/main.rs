//! Sensor Data Service entry point
//!
//! Usage: `driver-monitor [config.toml]`

use api::{init_logging, metrics::init_metrics, run_server, ServiceConfig};
use tracing::{info, warn};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let path = std::env::args().nth(1);
    let config = ServiceConfig::load(path.as_deref())?;
    init_logging(config.log_format)?;

    info!("=== Driver Monitor v{} ===", env!("CARGO_PKG_VERSION"));

    let metrics = match init_metrics() {
        Ok(handle) => Some(handle),
        Err(e) => {
            warn!("Metrics disabled: {}", e);
            None
        }
    };

    run_server(&config, metrics).await
}
