//! # RSVP Runtime
//!
//! Runtime pieces around the registration ledger:
//!
//! - [`RegistrationService`]: the front door used by the HTTP layer. Bounds
//!   every store call with a timeout and reconciles timed-out mutations by
//!   re-reading membership.
//! - [`OptimisticLedger`]: turns a versioned compare-and-swap store into a
//!   full [`LedgerStore`](rsvp_core::LedgerStore) by retrying lost races.
//! - [`retry`], [`metrics`], [`health`]: supporting infrastructure.
//!
//! ## Example
//!
//! ```ignore
//! use rsvp_runtime::{OptimisticLedger, RegistrationService, retry::RetryPolicy};
//! use rsvp_testing::InMemoryLedgerStore;
//! use std::{sync::Arc, time::Duration};
//!
//! let ledger = OptimisticLedger::new(InMemoryLedgerStore::new(), RetryPolicy::default());
//! let service = RegistrationService::new(Arc::new(ledger), Duration::from_secs(2));
//!
//! let outcome = service.register(event_id, user_id).await?;
//! ```

/// Health checks for the ledger store
pub mod health;

/// Prometheus metrics for observability
pub mod metrics;

/// Optimistic concurrency adapter over versioned stores
pub mod optimistic;

/// Retry logic with exponential backoff
pub mod retry;

/// Timeout-bounded registration service
pub mod service;

pub use health::{HealthCheck, HealthReport, HealthStatus};
pub use optimistic::OptimisticLedger;
pub use service::{DEFAULT_OPERATION_TIMEOUT, RegistrationService};
