//! Ledger store traits and errors.
//!
//! Two abstractions live here:
//!
//! - [`LedgerStore`]: the operation-level contract. Every registration or
//!   unregistration is a single atomic check-and-mutate against one event's
//!   record. The Postgres store implements it directly with conditional
//!   updates.
//! - [`VersionedLedgerStore`]: a lower-level record store with optimistic
//!   concurrency. `OptimisticLedger` (in `rsvp-runtime`) turns any such store
//!   into a [`LedgerStore`] by retrying a load/decide/compare-and-swap loop.
//!
//! # Dyn Compatibility
//!
//! Both traits return `Pin<Box<dyn Future>>` instead of using `async fn` so
//! services and HTTP state can hold an `Arc<dyn LedgerStore>`.

use crate::ledger::Attendance;
use crate::outcome::{CapacityChange, CloseOutcome, RegistrationOutcome, UnregistrationOutcome};
use crate::types::{Capacity, EventId, UserId};
use crate::version::Version;
use std::future::Future;
use std::pin::Pin;
use thiserror::Error;

/// Boxed future returned by the store traits.
pub type StoreFuture<'a, T> = Pin<Box<dyn Future<Output = Result<T, LedgerError>> + Send + 'a>>;

/// Infrastructure failures of a ledger store.
///
/// Business rejections (full, duplicate, unknown event) are not errors; see
/// [`crate::outcome`].
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum LedgerError {
    /// An event with this identifier is already open.
    #[error("Event already exists: {0}")]
    AlreadyExists(EventId),

    /// The record changed (or vanished) between read and write.
    #[error("Concurrency conflict on event {event_id}: expected version {expected}")]
    ConcurrencyConflict {
        /// The event whose record moved.
        event_id: EventId,
        /// The version the writer read.
        expected: Version,
    },

    /// The store could not be reached or did not answer in time.
    ///
    /// The caller cannot tell whether the operation took effect.
    #[error("Store unavailable: {0}")]
    StoreUnavailable(String),

    /// The store answered with an error.
    #[error("Database error: {0}")]
    DatabaseError(String),
}

impl LedgerError {
    /// Whether retrying the same operation may succeed.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::ConcurrencyConflict { .. } | Self::StoreUnavailable(_)
        )
    }

    /// Whether this is an optimistic concurrency conflict.
    #[must_use]
    pub const fn is_conflict(&self) -> bool {
        matches!(self, Self::ConcurrencyConflict { .. })
    }
}

/// Atomic registration operations over a set of event ledgers.
///
/// # Atomicity
///
/// `register` and `unregister` must each be indistinguishable from a single
/// indivisible step on the event's record: under any interleaving of
/// concurrent calls, the attendee count never exceeds the capacity and a user
/// appears at most once. Calls on different events do not contend.
///
/// # Errors
///
/// Every operation returns [`LedgerError::StoreUnavailable`] or
/// [`LedgerError::DatabaseError`] when the backing store fails. In that case
/// the operation may or may not have been applied.
pub trait LedgerStore: Send + Sync {
    /// Open a new event with an empty attendee set.
    ///
    /// Fails with [`LedgerError::AlreadyExists`] if the identifier is taken.
    fn open_event(
        &self,
        event_id: EventId,
        owner: UserId,
        capacity: Capacity,
    ) -> StoreFuture<'_, Attendance>;

    /// Add `user` to the event if they are not already registered and a seat
    /// is free.
    fn register(&self, event_id: EventId, user: UserId) -> StoreFuture<'_, RegistrationOutcome>;

    /// Remove `user` from the event if present.
    fn unregister(&self, event_id: EventId, user: UserId)
    -> StoreFuture<'_, UnregistrationOutcome>;

    /// Change the event's capacity on behalf of `requester`.
    ///
    /// The new bound must be owned by the requester and admit the current
    /// attendee count.
    fn set_capacity(
        &self,
        event_id: EventId,
        requester: UserId,
        capacity: Capacity,
    ) -> StoreFuture<'_, CapacityChange>;

    /// Delete the event and its attendee set on behalf of `requester`.
    fn close_event(&self, event_id: EventId, requester: UserId) -> StoreFuture<'_, CloseOutcome>;

    /// Snapshot of the event's record, or `None` if it does not exist.
    fn attendance(&self, event_id: EventId) -> StoreFuture<'_, Option<Attendance>>;

    /// Cheap liveness probe of the backing store.
    fn ping(&self) -> StoreFuture<'_, ()>;
}

/// Versioned record storage with optimistic concurrency control.
///
/// Each event's record carries a [`Version`] that advances on every write.
/// Writers quote the version they read and lose the race with
/// [`LedgerError::ConcurrencyConflict`] if anyone else committed first.
pub trait VersionedLedgerStore: Send + Sync {
    /// Insert a new record and return its starting version.
    ///
    /// A record reopened under a removed event's id never starts at a
    /// version that the removed record held. Fails with [`LedgerError::AlreadyExists`] if the event is present.
    fn insert(&self, attendance: Attendance) -> StoreFuture<'_, Version>;

    /// Current version and record, or `None` if the event does not exist.
    fn load(&self, event_id: EventId) -> StoreFuture<'_, Option<(Version, Attendance)>>;

    /// Replace the record if it is still at `expected`.
    ///
    /// Returns the new version. Fails with
    /// [`LedgerError::ConcurrencyConflict`] if the record moved on or was
    /// removed.
    fn compare_and_swap(
        &self,
        expected: Version,
        attendance: Attendance,
    ) -> StoreFuture<'_, Version>;

    /// Delete the record if it is still at `expected`.
    fn remove(&self, event_id: EventId, expected: Version) -> StoreFuture<'_, ()>;

    /// Cheap liveness probe of the backing store.
    fn ping(&self) -> StoreFuture<'_, ()>;
}
