//! Application state for Axum handlers.

use rsvp_runtime::RegistrationService;
use rsvp_runtime::metrics::MetricsExporter;

/// Application state shared across all HTTP handlers.
#[derive(Clone, Debug)]
pub struct AppState {
    service: RegistrationService,
    metrics: MetricsExporter,
}

impl AppState {
    /// State serving `service` with no metrics exporter.
    #[must_use]
    pub const fn new(service: RegistrationService) -> Self {
        Self {
            service,
            metrics: MetricsExporter::new(),
        }
    }

    /// Serve `/metrics` from `metrics`.
    #[must_use]
    pub fn with_metrics(mut self, metrics: MetricsExporter) -> Self {
        self.metrics = metrics;
        self
    }

    /// The registration service.
    #[must_use]
    pub const fn service(&self) -> &RegistrationService {
        &self.service
    }

    /// The metrics exporter.
    #[must_use]
    pub const fn metrics(&self) -> &MetricsExporter {
        &self.metrics
    }
}
