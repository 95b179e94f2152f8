#![forbid(unsafe_code)]

use anyhow::Result;
use clap::Parser;
use sigrelay::config::{Args, ServerConfig};
use sigrelay::http::{start_http_server, HttpState};
use sigrelay::run_with_shutdown;
use sigrelay::server::ServerState;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::sync::watch;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();

    let args = Args::parse();
    let config: ServerConfig = args.into();

    if let Err(e) = config.validate() {
        anyhow::bail!("configuration error: {}", e);
    }

    let state = Arc::new(ServerState::new(config.clone()));

    let listener = TcpListener::bind(config.listen).await?;
    info!("bound to {}", config.listen);
    info!(cors_origin = %config.cors_origin, "permitted origin");

    let http_state = HttpState::new(Arc::clone(&state));
    tokio::spawn({
        let http_state = http_state.clone();
        async move {
            if let Err(e) = start_http_server(config.http_addr, http_state).await {
                warn!("http server error: {}", e);
            }
        }
    });

    let (shutdown_tx, shutdown_rx) = watch::channel(());
    let server = tokio::spawn(run_with_shutdown(listener, state, shutdown_rx));

    tokio::signal::ctrl_c().await?;
    info!("received shutdown signal");
    http_state.set_ready(false);
    drop(shutdown_tx);

    match server.await {
        Ok(Err(e)) => tracing::error!("server error: {}", e),
        Err(e) => tracing::error!("server task failed: {}", e),
        Ok(Ok(())) => {}
    }

    Ok(())
}
