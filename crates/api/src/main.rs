use std::sync::Arc;

use anyhow::Context;

use crawlnet_api::app;
use crawlnet_api::config::ApiConfig;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    crawlnet_observability::init();

    let config = ApiConfig::from_env()?;
    let services = Arc::new(app::services::build_services(&config)?);
    let router = app::build_app(services.clone());

    let listener = tokio::net::TcpListener::bind(config.bind_addr)
        .await
        .with_context(|| format!("failed to bind {}", config.bind_addr))?;

    tracing::info!(
        addr = %listener.local_addr()?,
        results_dir = %config.crawler.results_dir.display(),
        persist_jobs = config.crawler.persist_jobs,
        "listening"
    );

    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("server error")?;

    services.shutdown().await;
    tracing::info!("shut down");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "failed to listen for ctrl-c");
        std::future::pending::<()>().await;
    }
}
