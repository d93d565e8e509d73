use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::Context;

use remindd_api::app::{build_app, services::Runtime};
use remindd_infra::AppConfig;
use remindd_infra::jobs::FileJobStore;
use remindd_infra::sessions::SimulatedTransport;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    remindd_observability::init();

    let config = AppConfig::from_env().context("invalid configuration")?;
    tracing::info!(
        port = config.port,
        reminders_db = %config.reminders_db_path.display(),
        sessions_dir = %config.sessions_dir.display(),
        interval_secs = config.scheduler_interval.as_secs(),
        "starting reminder service"
    );

    let store = Arc::new(FileJobStore::new(config.reminders_db_path.clone()));
    let transport = Arc::new(SimulatedTransport::new(config.simulated_pairing_delay));
    let addr = SocketAddr::from(([0, 0, 0, 0], config.port));

    let runtime = Runtime::start(config, store, transport);
    let app = build_app(runtime.services.clone());

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind {addr}"))?;
    tracing::info!(addr = %listener.local_addr()?, "listening");

    let services = runtime.services.clone();
    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            shutdown_signal().await;
            // Status streams never end on their own.
            services.close_streams();
        })
        .await
        .context("http server error")?;

    runtime.shutdown().await;
    tracing::info!("shutdown complete");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "failed to listen for ctrl-c");
        std::future::pending::<()>().await;
    }
    tracing::info!("shutdown requested");
}
