//! OBD-II Report - Main Entry Point

use anyhow::Context;
use obd_session::{init_logging, DiagnosticSession, SessionConfig};
use tracing::{error, info};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = SessionConfig::load().context("Failed to load configuration")?;
    init_logging(&config.log_level, config.log_json).context("Failed to set tracing subscriber")?;

    info!("=== OBD-II Report v{} ===", env!("CARGO_PKG_VERSION"));
    info!("Opening adapter on {}", config.port.device);

    let mut session = DiagnosticSession::open(&config)
        .await
        .with_context(|| format!("Failed to open adapter on {:?}", config.port.device))?;

    let report = session.create_report().await;
    if let Err(e) = session.close().await {
        error!("Failed to close adapter: {}", e);
    }

    println!("{}", report.context("Failed to create report")?);
    Ok(())
}
