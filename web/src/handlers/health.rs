//! Health and metrics endpoints.
//!
//! Used by load balancers and monitoring systems.

use crate::error::AppError;
use crate::state::AppState;
use axum::{
    Json,
    extract::State,
    http::{StatusCode, header},
    response::IntoResponse,
};
use rsvp_runtime::{HealthReport, HealthStatus};

/// Liveness probe.
///
/// Returns 200 OK while the process runs. Does NOT check the store.
///
/// # Endpoint
///
/// ```text
/// GET /health
/// ```
#[allow(clippy::unused_async)]
pub async fn health_check() -> (StatusCode, &'static str) {
    (StatusCode::OK, "ok")
}

/// Readiness probe: pings the ledger store.
///
/// # Status Codes
///
/// - 200 OK: Healthy or Degraded
/// - 503 Service Unavailable: Unhealthy
///
/// # Endpoint
///
/// ```text
/// GET /ready
/// ```
///
/// # Response
///
/// ```json
/// {
///   "status": "healthy",
///   "checks": [{"component": "ledger_store", "status": "healthy", "metadata": [["latency", "1ms"]]}],
///   "timestamp": "2025-01-01T00:00:00Z"
/// }
/// ```
pub async fn readiness(State(state): State<AppState>) -> (StatusCode, Json<HealthReport>) {
    let report = HealthReport::new(vec![state.service().health().await]);

    let status = match report.status {
        HealthStatus::Healthy | HealthStatus::Degraded => StatusCode::OK,
        HealthStatus::Unhealthy => StatusCode::SERVICE_UNAVAILABLE,
    };

    (status, Json(report))
}

/// Prometheus metrics in text exposition format.
///
/// # Errors
///
/// 404 when the server runs with metrics disabled.
///
/// # Endpoint
///
/// ```text
/// GET /metrics
/// ```
#[allow(clippy::unused_async)]
pub async fn metrics(State(state): State<AppState>) -> Result<impl IntoResponse, AppError> {
    let body = state.metrics().render().ok_or_else(|| {
        AppError::new(
            StatusCode::NOT_FOUND,
            "Metrics are disabled".to_string(),
            "METRICS_DISABLED".to_string(),
        )
    })?;

    Ok((
        [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
        body,
    ))
}
