//! # RSVP Core
//!
//! Domain types and store abstractions for a capacity-bounded event
//! registration ledger.
//!
//! Each event owns a set of registered users and an optional capacity. The
//! ledger guarantees that, under any interleaving of concurrent requests,
//! the attendee count never exceeds the capacity and no user is registered
//! twice for the same event.
//!
//! ## Layout
//!
//! - [`types`]: identifiers and [`Capacity`]
//! - [`version`]: record versions for optimistic concurrency
//! - [`ledger`]: [`Attendance`], the pure per-event decision logic
//! - [`outcome`]: structured results of every operation
//! - [`store`]: the [`LedgerStore`] and [`VersionedLedgerStore`] traits
//!
//! ## Example
//!
//! ```
//! use rsvp_core::{Attendance, Capacity, EventId, RejectionReason, UserId};
//!
//! let mut event = Attendance::open(EventId::new(), UserId::new(), Capacity::bounded(1));
//! let alice = UserId::new();
//!
//! assert!(event.register(alice).is_registered());
//! assert_eq!(event.register(alice).reason(), Some(RejectionReason::Duplicate));
//! assert_eq!(event.register(UserId::new()).reason(), Some(RejectionReason::Full));
//! ```

pub mod ledger;
pub mod outcome;
pub mod store;
pub mod types;
pub mod version;

pub use ledger::Attendance;
pub use outcome::{
    CapacityChange, CloseOutcome, RegistrationOutcome, RegistrationResult, RejectionReason,
    UnregistrationOutcome,
};
pub use store::{LedgerError, LedgerStore, StoreFuture, VersionedLedgerStore};
pub use types::{Capacity, EventId, ParseIdError, UserId};
pub use version::Version;
