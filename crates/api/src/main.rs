//! Status Sentinel - Main Entry Point

use anyhow::Context;
use api::rate_limit::create_governor_config;
use api::{build_services, create_router, init_logging, install_metrics, AppState, Settings};
use scheduler::MonitorScheduler;
use std::net::SocketAddr;
use std::sync::Arc;
use tracing::{error, info};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let settings = Settings::load().context("invalid configuration")?;
    init_logging(&settings)?;

    info!("=== Status Sentinel v{} ===", env!("CARGO_PKG_VERSION"));
    info!("Monitoring {} every {}s", settings.service_name, settings.scheduler.interval_secs);

    let metrics = install_metrics()?;
    let services = build_services(&settings)?;

    let scheduler = Arc::new(MonitorScheduler::new(
        services.pipeline.clone(),
        settings.scheduler.clone(),
    ));
    let monitor = {
        let scheduler = scheduler.clone();
        tokio::spawn(async move { scheduler.run().await })
    };

    let state = Arc::new(AppState::new(
        services.pipeline,
        services.store,
        services.presence,
        Some(metrics),
        settings.service_name.clone(),
    ));
    let app = create_router(state, create_governor_config(&settings.diagnose_rate_limit)?);

    info!("Starting API server on {}", settings.listen_addr);
    let listener = tokio::net::TcpListener::bind(&settings.listen_addr)
        .await
        .with_context(|| format!("failed to bind {}", settings.listen_addr))?;

    axum::serve(listener, app.into_make_service_with_connect_info::<SocketAddr>())
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    scheduler.stop();
    if let Err(e) = monitor.await {
        error!("Scheduler task ended abnormally: {}", e);
    }
    info!("Shutdown complete");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        error!("Failed to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
    info!("Shutdown signal received");
}
