//! Prometheus metrics for the registration ledger.
//!
//! Counters and histograms are recorded through the `metrics` facade; the
//! Prometheus exporter renders them for the `/metrics` endpoint.
//!
//! # Example
//!
//! ```rust,no_run
//! use rsvp_runtime::metrics::MetricsExporter;
//!
//! # fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let mut exporter = MetricsExporter::new();
//! exporter.install()?;
//!
//! let body = exporter.render().unwrap_or_default();
//! # Ok(())
//! # }
//! ```

use metrics::{describe_counter, describe_histogram};
use metrics_exporter_prometheus::{Matcher, PrometheusBuilder, PrometheusHandle};
use rsvp_core::{RegistrationOutcome, UnregistrationOutcome};
use std::time::Duration;
use thiserror::Error;

pub use metrics::{counter, histogram};

/// Errors from metrics operations.
#[derive(Error, Debug)]
pub enum MetricsError {
    /// Failed to build metrics exporter
    #[error("Failed to build metrics exporter: {0}")]
    Build(String),
    /// Failed to install metrics exporter
    #[error("Failed to install metrics exporter: {0}")]
    Install(String),
}

/// Installs the global Prometheus recorder and renders its output.
#[derive(Clone, Default)]
pub struct MetricsExporter {
    handle: Option<PrometheusHandle>,
}

impl std::fmt::Debug for MetricsExporter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MetricsExporter")
            .field("installed", &self.handle.is_some())
            .finish()
    }
}

impl MetricsExporter {
    /// Create an exporter with no recorder installed.
    #[must_use]
    pub const fn new() -> Self {
        Self { handle: None }
    }

    /// Register metric descriptions and install the Prometheus recorder.
    ///
    /// # Errors
    ///
    /// Returns error if the exporter cannot be built or installed.
    ///
    /// # Note
    ///
    /// If a recorder is already installed (e.g. by another test in the same
    /// process) this logs a warning and leaves [`render`](Self::render)
    /// returning `None`.
    pub fn install(&mut self) -> Result<(), MetricsError> {
        register_metrics();

        let builder = PrometheusBuilder::new()
            .set_buckets_for_metric(
                Matcher::Suffix("duration_seconds".to_string()),
                &[
                    0.0005, 0.001, 0.0025, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5,
                ],
            )
            .map_err(|e| MetricsError::Build(e.to_string()))?;

        match builder.install_recorder() {
            Ok(handle) => {
                self.handle = Some(handle);
                tracing::info!("Prometheus metrics recorder installed");
                Ok(())
            }
            Err(e) => {
                let err_msg = e.to_string();
                if err_msg.contains("already initialized") {
                    tracing::warn!(
                        "Metrics recorder already initialized, skipping re-initialization"
                    );
                    Ok(())
                } else {
                    Err(MetricsError::Install(err_msg))
                }
            }
        }
    }

    /// Get the metrics handle for rendering.
    #[must_use]
    pub const fn handle(&self) -> Option<&PrometheusHandle> {
        self.handle.as_ref()
    }

    /// Render current metrics in Prometheus text format.
    ///
    /// Returns `None` if this exporter did not install the recorder.
    #[must_use]
    pub fn render(&self) -> Option<String> {
        self.handle.as_ref().map(PrometheusHandle::render)
    }
}

/// Register all metric descriptions.
pub fn register_metrics() {
    describe_counter!(
        "rsvp_registrations_total",
        "Register calls by outcome (registered, full, duplicate, not_found, error)"
    );
    describe_counter!(
        "rsvp_unregistrations_total",
        "Unregister calls by outcome (unregistered, not_registered, not_found, error)"
    );
    describe_counter!(
        "rsvp_store_errors_total",
        "Store failures surfaced to callers, by operation"
    );
    describe_counter!(
        "rsvp_cas_conflicts_total",
        "Compare-and-swap rounds lost to a concurrent writer"
    );
    describe_counter!(
        "rsvp_timeouts_reconciled_total",
        "Timed-out mutations resolved by re-reading membership"
    );
    describe_histogram!(
        "rsvp_store_operation_duration_seconds",
        "Time spent in the ledger store per operation"
    );
}

/// Ledger metrics recorder.
pub struct LedgerMetrics;

impl LedgerMetrics {
    /// Record a completed register call.
    pub fn record_registration(outcome: &RegistrationOutcome, duration: Duration) {
        counter!("rsvp_registrations_total", "outcome" => outcome.label()).increment(1);
        Self::record_duration("register", duration);
    }

    /// Record a completed unregister call.
    pub fn record_unregistration(outcome: &UnregistrationOutcome, duration: Duration) {
        counter!("rsvp_unregistrations_total", "outcome" => outcome.label()).increment(1);
        Self::record_duration("unregister", duration);
    }

    /// Record time spent in the store for `operation`.
    pub fn record_duration(operation: &'static str, duration: Duration) {
        histogram!("rsvp_store_operation_duration_seconds", "operation" => operation)
            .record(duration.as_secs_f64());
    }

    /// Record a store failure surfaced to the caller.
    pub fn record_store_error(operation: &'static str) {
        counter!("rsvp_store_errors_total", "operation" => operation).increment(1);
        match operation {
            "register" => {
                counter!("rsvp_registrations_total", "outcome" => "error").increment(1);
            }
            "unregister" => {
                counter!("rsvp_unregistrations_total", "outcome" => "error").increment(1);
            }
            _ => {}
        }
    }

    /// Record a lost compare-and-swap round.
    pub fn record_conflict() {
        counter!("rsvp_cas_conflicts_total").increment(1);
    }

    /// Record how a timed-out mutation was resolved.
    pub fn record_reconciliation(operation: &'static str, resolution: &'static str) {
        counter!(
            "rsvp_timeouts_reconciled_total",
            "operation" => operation,
            "resolution" => resolution
        )
        .increment(1);
    }
}
