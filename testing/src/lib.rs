//! # RSVP Testing
//!
//! Testing utilities for the registration ledger.
//!
//! This crate provides:
//! - [`InMemoryLedgerStore`]: versioned in-memory record store
//! - [`FaultyLedgerStore`]: decorator that injects latency and failures
//! - [`LedgerTest`]: Given-When-Then helper for ledger stores
//! - [`properties`]: proptest strategies for capacities and operation sequences
//!
//! ## Example
//!
//! ```
//! use rsvp_core::{Capacity, EventId, UserId};
//! use rsvp_testing::in_memory_ledger;
//!
//! # tokio_test::block_on(async {
//! let ledger = in_memory_ledger();
//! let event = EventId::new();
//! ledger.open_event(event, UserId::new(), Capacity::bounded(2)).await.unwrap();
//!
//! let outcome = ledger.register(event, UserId::new()).await.unwrap();
//! assert!(outcome.is_registered());
//! # });
//! ```

use rsvp_core::LedgerStore;
use rsvp_runtime::OptimisticLedger;
use rsvp_runtime::retry::RetryPolicy;
use std::sync::Arc;
use std::time::Duration;

pub mod faulty;
pub mod memory;
pub mod properties;

pub use faulty::FaultyLedgerStore;
pub use ledger_test::{CommandResult, LedgerCommand, LedgerTest};
pub use memory::InMemoryLedgerStore;

/// Retry policy that tolerates heavy contention in stress tests.
#[must_use]
pub fn contention_policy() -> RetryPolicy {
    RetryPolicy::builder()
        .max_retries(10_000)
        .initial_delay(Duration::from_micros(50))
        .max_delay(Duration::from_millis(2))
        .build()
}

/// A ready-to-use in-memory ledger with [`contention_policy`].
#[must_use]
pub fn in_memory_ledger() -> Arc<dyn LedgerStore> {
    in_memory_ledger_with(contention_policy())
}

/// An in-memory ledger retrying conflicts according to `policy`.
#[must_use]
pub fn in_memory_ledger_with(policy: RetryPolicy) -> Arc<dyn LedgerStore> {
    Arc::new(OptimisticLedger::new(InMemoryLedgerStore::new(), policy))
}

/// Install a test-friendly tracing subscriber once per process.
///
/// Honors `RUST_LOG`; safe to call from every test.
pub fn init_test_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}
