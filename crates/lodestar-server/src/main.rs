use lodestar::prelude::*;
use tracing_subscriber::EnvFilter;

/// Resolves on Ctrl-C, or never if the handler cannot be installed.
async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "cannot listen for Ctrl-C, running until killed");
        std::future::pending::<()>().await;
    }
    tracing::info!("Ctrl-C received");
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let config = HubConfig::from_env()?;
    tracing::info!(
        bind = %config.bind_addr,
        hot_ttl_secs = config.hot_ttl.as_secs(),
        cold_store = ?config.cold_store,
        "starting lodestar hub"
    );

    let server = HubServer::builder().config(config).build().await?;
    server.run_until(shutdown_signal()).await?;
    Ok(())
}
