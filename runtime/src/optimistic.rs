//! Ledger operations over a versioned record store.
//!
//! [`OptimisticLedger`] turns any [`VersionedLedgerStore`] into a
//! [`LedgerStore`]. Each mutation is a loop of:
//!
//! 1. load `(version, attendance)`
//! 2. decide with the pure [`Attendance`] logic
//! 3. write back only if the record is still at `version`
//!
//! A lost race surfaces as [`LedgerError::ConcurrencyConflict`] and the whole
//! round is retried with backoff, so every retry re-evaluates capacity and
//! membership against fresh state. Rejections are returned without writing.
//! Running out of retries is reported as [`LedgerError::StoreUnavailable`];
//! conflicts never escape this type.

use crate::metrics::LedgerMetrics;
use crate::retry::{RetryPolicy, retry_with_predicate};
use rsvp_core::{
    Attendance, Capacity, CapacityChange, CloseOutcome, EventId, LedgerError, LedgerStore,
    RegistrationOutcome, StoreFuture, UnregistrationOutcome, UserId, VersionedLedgerStore,
};

/// What a decision wants done with the loaded record.
enum Step<T> {
    /// Nothing to write; return the value.
    Done(T),
    /// Replace the record, then return the value.
    Write(Attendance, T),
    /// Delete the record, then return the value.
    Remove(T),
}

/// [`LedgerStore`] built from a compare-and-swap record store.
///
/// # Example
///
/// ```ignore
/// use rsvp_runtime::{OptimisticLedger, retry::RetryPolicy};
/// use rsvp_testing::InMemoryLedgerStore;
///
/// let ledger = OptimisticLedger::new(InMemoryLedgerStore::new(), RetryPolicy::default());
/// ```
#[derive(Debug)]
pub struct OptimisticLedger<S> {
    store: S,
    policy: RetryPolicy,
}

impl<S: VersionedLedgerStore> OptimisticLedger<S> {
    /// Wrap `store`, retrying lost races according to `policy`.
    #[must_use]
    pub const fn new(store: S, policy: RetryPolicy) -> Self {
        Self { store, policy }
    }

    /// The underlying record store.
    #[must_use]
    pub const fn store(&self) -> &S {
        &self.store
    }

    /// The retry policy applied to conflicts.
    #[must_use]
    pub const fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    async fn mutate<T, F>(&self, event_id: EventId, missing: T, decide: F) -> Result<T, LedgerError>
    where
        T: Clone + Send + Sync,
        F: Fn(Attendance) -> Step<T> + Sync,
    {
        let store = &self.store;
        let missing = &missing;
        let decide = &decide;

        let result = retry_with_predicate(
            self.policy.clone(),
            move || attempt(store, event_id, missing, decide),
            |err: &LedgerError| {
                if err.is_conflict() {
                    LedgerMetrics::record_conflict();
                    true
                } else {
                    false
                }
            },
        )
        .await;

        result.map_err(|err| match err {
            LedgerError::ConcurrencyConflict { .. } => {
                tracing::warn!(
                    %event_id,
                    max_retries = self.policy.max_retries,
                    "Gave up after repeated concurrency conflicts"
                );
                LedgerError::StoreUnavailable(format!(
                    "event {event_id} is under heavy contention; retries exhausted"
                ))
            }
            other => other,
        })
    }
}

/// One load/decide/write round.
async fn attempt<S, T, F>(
    store: &S,
    event_id: EventId,
    missing: &T,
    decide: &F,
) -> Result<T, LedgerError>
where
    S: VersionedLedgerStore,
    T: Clone,
    F: Fn(Attendance) -> Step<T>,
{
    let Some((version, current)) = store.load(event_id).await? else {
        return Ok(missing.clone());
    };

    match decide(current) {
        Step::Done(value) => Ok(value),
        Step::Write(next, value) => {
            store.compare_and_swap(version, next).await?;
            Ok(value)
        }
        Step::Remove(value) => {
            store.remove(event_id, version).await?;
            Ok(value)
        }
    }
}

impl<S: VersionedLedgerStore> LedgerStore for OptimisticLedger<S> {
    fn open_event(
        &self,
        event_id: EventId,
        owner: UserId,
        capacity: Capacity,
    ) -> StoreFuture<'_, Attendance> {
        Box::pin(async move {
            let attendance = Attendance::open(event_id, owner, capacity);
            self.store.insert(attendance.clone()).await?;
            Ok(attendance)
        })
    }

    fn register(&self, event_id: EventId, user: UserId) -> StoreFuture<'_, RegistrationOutcome> {
        Box::pin(async move {
            self.mutate(event_id, RegistrationOutcome::NOT_FOUND, move |mut attendance| {
                let outcome = attendance.register(user);
                if outcome.is_registered() {
                    Step::Write(attendance, outcome)
                } else {
                    Step::Done(outcome)
                }
            })
            .await
        })
    }

    fn unregister(
        &self,
        event_id: EventId,
        user: UserId,
    ) -> StoreFuture<'_, UnregistrationOutcome> {
        Box::pin(async move {
            self.mutate(event_id, UnregistrationOutcome::NotFound, move |mut attendance| {
                if attendance.unregister(user) {
                    let attendees_count = attendance.count();
                    Step::Write(
                        attendance,
                        UnregistrationOutcome::Unregistered { attendees_count },
                    )
                } else {
                    Step::Done(UnregistrationOutcome::NotRegistered {
                        attendees_count: attendance.count(),
                    })
                }
            })
            .await
        })
    }

    fn set_capacity(
        &self,
        event_id: EventId,
        requester: UserId,
        capacity: Capacity,
    ) -> StoreFuture<'_, CapacityChange> {
        Box::pin(async move {
            self.mutate(event_id, CapacityChange::NotFound, move |mut attendance| {
                match attendance.change_capacity(requester, capacity) {
                    CapacityChange::Changed(updated) => {
                        Step::Write(attendance, CapacityChange::Changed(updated))
                    }
                    rejected => Step::Done(rejected),
                }
            })
            .await
        })
    }

    fn close_event(&self, event_id: EventId, requester: UserId) -> StoreFuture<'_, CloseOutcome> {
        Box::pin(async move {
            self.mutate(event_id, CloseOutcome::NotFound, move |attendance| {
                if attendance.is_owned_by(requester) {
                    Step::Remove(CloseOutcome::Closed)
                } else {
                    Step::Done(CloseOutcome::NotOwner)
                }
            })
            .await
        })
    }

    fn attendance(&self, event_id: EventId) -> StoreFuture<'_, Option<Attendance>> {
        Box::pin(async move {
            Ok(self
                .store
                .load(event_id)
                .await?
                .map(|(_, attendance)| attendance))
        })
    }

    fn ping(&self) -> StoreFuture<'_, ()> {
        self.store.ping()
    }
}
