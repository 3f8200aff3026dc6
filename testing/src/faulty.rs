//! Fault-injecting ledger store.
//!
//! Wraps any [`LedgerStore`] and makes it slow or unreliable on demand, for
//! exercising timeout reconciliation and error mapping.

use rsvp_core::{
    Attendance, Capacity, CapacityChange, CloseOutcome, EventId, LedgerError, LedgerStore,
    RegistrationOutcome, StoreFuture, UnregistrationOutcome, UserId,
};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

#[derive(Debug, Default)]
struct Faults {
    offline: bool,
    fail_reads: bool,
    delay_before_commit: Option<Duration>,
    delay_after_commit: Option<Duration>,
    fail_next: usize,
    failure: Option<LedgerError>,
}

/// What a single mutation should suffer.
struct MutationPlan {
    before: Option<Duration>,
    after: Option<Duration>,
}

/// [`LedgerStore`] decorator with switchable faults.
///
/// - `set_offline`: every call fails with `StoreUnavailable`
/// - `fail_reads`: `attendance` fails with `StoreUnavailable`
/// - `delay_before_commit`: mutations sleep before reaching the inner store,
///   so a caller that gives up early leaves no trace
/// - `delay_after_commit`: mutations are applied, then sleep before
///   returning, so a caller that gives up early misses a committed change
/// - `fail_next`: the next `n` mutations fail with the given error
///
/// Reads are never delayed.
///
/// # Example
///
/// ```
/// use rsvp_testing::{FaultyLedgerStore, in_memory_ledger};
/// use std::time::Duration;
///
/// let store = FaultyLedgerStore::new(in_memory_ledger());
/// store.delay_after_commit(Duration::from_millis(200));
/// ```
pub struct FaultyLedgerStore {
    inner: Arc<dyn LedgerStore>,
    faults: Mutex<Faults>,
}

impl std::fmt::Debug for FaultyLedgerStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FaultyLedgerStore")
            .field("faults", &self.faults)
            .finish_non_exhaustive()
    }
}

impl FaultyLedgerStore {
    /// Wrap `inner` with no faults enabled.
    #[must_use]
    pub fn new(inner: Arc<dyn LedgerStore>) -> Self {
        Self {
            inner,
            faults: Mutex::new(Faults::default()),
        }
    }

    /// The wrapped store, bypassing all faults.
    #[must_use]
    pub fn inner(&self) -> &Arc<dyn LedgerStore> {
        &self.inner
    }

    /// Fail every call while `offline` is set.
    pub fn set_offline(&self, offline: bool) {
        self.with_faults(|faults| faults.offline = offline);
    }

    /// Fail attendance reads while `fail` is set.
    pub fn fail_reads(&self, fail: bool) {
        self.with_faults(|faults| faults.fail_reads = fail);
    }

    /// Sleep for `delay` before each mutation reaches the inner store.
    pub fn delay_before_commit(&self, delay: Duration) {
        self.with_faults(|faults| faults.delay_before_commit = Some(delay));
    }

    /// Sleep for `delay` after each mutation has been applied.
    pub fn delay_after_commit(&self, delay: Duration) {
        self.with_faults(|faults| faults.delay_after_commit = Some(delay));
    }

    /// Fail the next `count` mutations with `error`.
    pub fn fail_next(&self, count: usize, error: LedgerError) {
        self.with_faults(|faults| {
            faults.fail_next = count;
            faults.failure = Some(error);
        });
    }

    /// Disable every fault.
    pub fn clear_faults(&self) {
        self.with_faults(|faults| *faults = Faults::default());
    }

    fn with_faults<T>(&self, f: impl FnOnce(&mut Faults) -> T) -> T {
        let mut faults = self.faults.lock().unwrap_or_else(PoisonError::into_inner);
        f(&mut faults)
    }

    fn plan_mutation(&self) -> Result<MutationPlan, LedgerError> {
        self.with_faults(|faults| {
            if faults.offline {
                return Err(offline());
            }
            if faults.fail_next > 0 {
                faults.fail_next -= 1;
                return Err(faults
                    .failure
                    .clone()
                    .unwrap_or_else(|| LedgerError::StoreUnavailable("injected".to_string())));
            }
            Ok(MutationPlan {
                before: faults.delay_before_commit,
                after: faults.delay_after_commit,
            })
        })
    }

    async fn mutation<T>(&self, call: StoreFuture<'_, T>) -> Result<T, LedgerError> {
        let plan = self.plan_mutation()?;

        if let Some(delay) = plan.before {
            tokio::time::sleep(delay).await;
        }
        let result = call.await;
        if let Some(delay) = plan.after {
            tokio::time::sleep(delay).await;
        }
        result
    }

    fn check_read(&self) -> Result<(), LedgerError> {
        self.with_faults(|faults| {
            if faults.offline || faults.fail_reads {
                Err(offline())
            } else {
                Ok(())
            }
        })
    }
}

fn offline() -> LedgerError {
    LedgerError::StoreUnavailable("connection refused".to_string())
}

impl LedgerStore for FaultyLedgerStore {
    fn open_event(
        &self,
        event_id: EventId,
        owner: UserId,
        capacity: Capacity,
    ) -> StoreFuture<'_, Attendance> {
        Box::pin(self.mutation(self.inner.open_event(event_id, owner, capacity)))
    }

    fn register(&self, event_id: EventId, user: UserId) -> StoreFuture<'_, RegistrationOutcome> {
        Box::pin(self.mutation(self.inner.register(event_id, user)))
    }

    fn unregister(
        &self,
        event_id: EventId,
        user: UserId,
    ) -> StoreFuture<'_, UnregistrationOutcome> {
        Box::pin(self.mutation(self.inner.unregister(event_id, user)))
    }

    fn set_capacity(
        &self,
        event_id: EventId,
        requester: UserId,
        capacity: Capacity,
    ) -> StoreFuture<'_, CapacityChange> {
        Box::pin(self.mutation(self.inner.set_capacity(event_id, requester, capacity)))
    }

    fn close_event(&self, event_id: EventId, requester: UserId) -> StoreFuture<'_, CloseOutcome> {
        Box::pin(self.mutation(self.inner.close_event(event_id, requester)))
    }

    fn attendance(&self, event_id: EventId) -> StoreFuture<'_, Option<Attendance>> {
        Box::pin(async move {
            self.check_read()?;
            self.inner.attendance(event_id).await
        })
    }

    fn ping(&self) -> StoreFuture<'_, ()> {
        Box::pin(async move {
            self.with_faults(|faults| if faults.offline { Err(offline()) } else { Ok(()) })?;
            self.inner.ping().await
        })
    }
}
