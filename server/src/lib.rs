//! RSVP ledger server wiring.
//!
//! [`build_store`] picks the ledger backend from configuration,
//! [`build_app`] puts the HTTP router in front of it. `main.rs` only adds
//! process concerns (environment, tracing, signals).

pub mod config;

use anyhow::Context;
use axum::Router;
use config::{Config, LedgerBackend};
use rsvp_core::LedgerStore;
use rsvp_postgres::PostgresLedgerStore;
use rsvp_runtime::RegistrationService;
use rsvp_runtime::metrics::MetricsExporter;
use rsvp_web::{AppState, build_router};
use std::sync::Arc;
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

/// Install the global tracing subscriber.
///
/// `RUST_LOG` wins over `default_filter`.
///
/// # Errors
///
/// Returns error if a subscriber is already installed.
pub fn init_tracing(default_filter: &str) -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter)),
        )
        .with(tracing_subscriber::fmt::layer().with_target(true))
        .try_init()
        .context("Failed to install tracing subscriber")
}

/// Open the configured ledger store.
///
/// # Errors
///
/// Returns error if the Postgres pool cannot be created or migrations fail.
pub async fn build_store(config: &Config) -> anyhow::Result<Arc<dyn LedgerStore>> {
    match config.ledger.backend {
        LedgerBackend::Memory => {
            tracing::warn!("Using in-memory ledger; registrations are lost on restart");
            Ok(rsvp_testing::in_memory_ledger_with(
                config.ledger.retry_policy(),
            ))
        }
        LedgerBackend::Postgres => {
            tracing::info!(
                host = config.postgres.url.split('@').next_back().unwrap_or("unknown"),
                "Connecting to PostgreSQL"
            );
            let store = PostgresLedgerStore::connect(&config.postgres.pool_settings())
                .await
                .context("Failed to connect to PostgreSQL")?;
            if config.ledger.run_migrations {
                store.migrate().await.context("Failed to run migrations")?;
            }
            Ok(Arc::new(store))
        }
    }
}

/// Install the Prometheus recorder when metrics are enabled.
///
/// # Errors
///
/// Returns error if the exporter cannot be built.
pub fn build_metrics(config: &Config) -> anyhow::Result<MetricsExporter> {
    let mut exporter = MetricsExporter::new();
    if config.server.metrics_enabled {
        exporter
            .install()
            .context("Failed to install metrics exporter")?;
    }
    Ok(exporter)
}

/// Build the HTTP application over `store`.
pub fn build_app(config: &Config, store: Arc<dyn LedgerStore>, metrics: MetricsExporter) -> Router {
    let service = RegistrationService::new(store, config.ledger.operation_timeout());
    tracing::info!(
        operation_timeout_ms = config.ledger.operation_timeout_ms,
        backend = ?config.ledger.backend,
        "Registration service ready"
    );
    build_router(AppState::new(service).with_metrics(metrics))
}

/// Resolves on Ctrl+C or SIGTERM.
pub async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {
            tracing::info!("Received Ctrl+C signal, shutting down gracefully...");
        },
        () = terminate => {
            tracing::info!("Received SIGTERM signal, shutting down gracefully...");
        },
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use axum::{
        body::Body,
        http::{Request, StatusCode},
    };
    use std::collections::HashMap;
    use tower::ServiceExt;

    fn memory_config() -> Config {
        let vars: HashMap<&str, &str> =
            HashMap::from([("LEDGER_BACKEND", "memory"), ("METRICS_ENABLED", "false")]);
        Config::from_lookup(|key| vars.get(key).map(|v| (*v).to_string()))
    }

    #[tokio::test]
    async fn memory_backend_serves_requests() {
        let config = memory_config();
        let store = build_store(&config).await.unwrap();
        let metrics = build_metrics(&config).unwrap();
        let app = build_app(&config, store, metrics);

        let owner = rsvp_core::UserId::new();
        let response = app
            .clone()
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri("/api/events")
                    .header(rsvp_web::USER_ID_HEADER, owner.to_string())
                    .header("content-type", "application/json")
                    .body(Body::from(r#"{"capacity": 1}"#))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::CREATED);

        let response = app
            .oneshot(Request::builder().uri("/ready").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn disabled_metrics_are_not_served() {
        let config = memory_config();
        let store = build_store(&config).await.unwrap();
        let app = build_app(&config, store, build_metrics(&config).unwrap());

        let response = app
            .oneshot(Request::builder().uri("/metrics").body(Body::empty()).unwrap())
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }
}
