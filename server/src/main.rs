//! RSVP ledger HTTP server.
//!
//! Run with: `cargo run --bin rsvp-server`
//! Configure through environment variables (or a `.env` file); see
//! [`rsvp_server::config`].

use anyhow::Context;
use rsvp_server::config::Config;
use rsvp_server::{build_app, build_metrics, build_store, init_tracing, shutdown_signal};
use std::time::Duration;
use tokio::sync::oneshot;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment variables from .env file (if present)
    let _ = dotenvy::dotenv();

    let config = Config::from_env();
    init_tracing(&config.server.log_level)?;

    tracing::info!(
        backend = ?config.ledger.backend,
        address = %config.bind_address(),
        "Starting RSVP ledger server"
    );

    let metrics = build_metrics(&config)?;
    let store = build_store(&config).await?;
    let app = build_app(&config, store, metrics);

    let addr = config.bind_address();
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind {addr}"))?;
    tracing::info!(address = %addr, "Server listening");

    let (stop_tx, stop_rx) = oneshot::channel::<()>();
    let server = tokio::spawn(async move {
        axum::serve(listener, app)
            .with_graceful_shutdown(async move {
                let _ = stop_rx.await;
            })
            .await
    });

    shutdown_signal().await;
    let _ = stop_tx.send(());

    let grace = Duration::from_secs(config.server.shutdown_timeout);
    match tokio::time::timeout(grace, server).await {
        Ok(joined) => joined
            .context("Server task panicked")?
            .context("Server error")?,
        Err(_) => tracing::warn!(
            timeout_secs = grace.as_secs(),
            "In-flight requests did not finish before the shutdown timeout"
        ),
    }

    tracing::info!("Server stopped");
    Ok(())
}
