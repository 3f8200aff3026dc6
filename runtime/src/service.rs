//! The registration front door.
//!
//! [`RegistrationService`] bounds every store call with a timeout and folds
//! store failures into [`LedgerError::StoreUnavailable`].
//!
//! # Timed-out mutations
//!
//! When `register` or `unregister` times out the caller cannot know whether
//! the store applied it. The service never retries the mutation. It re-reads
//! the event instead:
//!
//! | operation    | user present after timeout | user absent          | event gone  |
//! |--------------|----------------------------|----------------------|-------------|
//! | `register`   | registered, current count  | `StoreUnavailable`   | `NotFound`  |
//! | `unregister` | `StoreUnavailable`         | unregistered, count  | `NotFound`  |
//!
//! If the re-read also fails the call fails with `StoreUnavailable`.
//!
//! Membership alone cannot tell this call's insert from an earlier one, so a
//! timed-out `register` by a user who was already registered reports
//! `Registered` rather than `Duplicate`. Either way the user holds a seat.
//! A `StoreUnavailable` after a timeout means the mutation was not observed,
//! not that it can never land: a dropped database call may still commit.

use crate::health::{HealthCheck, check_store};
use crate::metrics::LedgerMetrics;
use rsvp_core::{
    Attendance, Capacity, CapacityChange, CloseOutcome, EventId, LedgerError, LedgerStore,
    RegistrationOutcome, StoreFuture, UnregistrationOutcome, UserId,
};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::time::timeout;

/// Default bound on a single store call.
pub const DEFAULT_OPERATION_TIMEOUT: Duration = Duration::from_secs(2);

/// Timeout-bounded access to a [`LedgerStore`].
#[derive(Clone)]
pub struct RegistrationService {
    store: Arc<dyn LedgerStore>,
    operation_timeout: Duration,
}

impl std::fmt::Debug for RegistrationService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RegistrationService")
            .field("operation_timeout", &self.operation_timeout)
            .finish_non_exhaustive()
    }
}

impl RegistrationService {
    /// Create a service over `store` with the given per-call timeout.
    #[must_use]
    pub fn new(store: Arc<dyn LedgerStore>, operation_timeout: Duration) -> Self {
        Self {
            store,
            operation_timeout,
        }
    }

    /// The per-call timeout.
    #[must_use]
    pub const fn operation_timeout(&self) -> Duration {
        self.operation_timeout
    }

    /// Register `user` for `event_id`.
    ///
    /// # Errors
    ///
    /// [`LedgerError::StoreUnavailable`] when the store fails or times out
    /// and the outcome cannot be confirmed.
    #[tracing::instrument(skip_all, fields(event_id = %event_id, user_id = %user))]
    pub async fn register(
        &self,
        event_id: EventId,
        user: UserId,
    ) -> Result<RegistrationOutcome, LedgerError> {
        let started = Instant::now();

        match timeout(self.operation_timeout, self.store.register(event_id, user)).await {
            Ok(Ok(outcome)) => {
                LedgerMetrics::record_registration(&outcome, started.elapsed());
                tracing::debug!(
                    outcome = outcome.label(),
                    attendees_count = outcome.attendees_count(),
                    "Registration decided"
                );
                Ok(outcome)
            }
            Ok(Err(e)) => Err(Self::store_failure("register", e)),
            Err(_) => {
                tracing::warn!(
                    timeout_ms = self.operation_timeout.as_millis(),
                    "Register timed out, checking membership"
                );
                let outcome = match self.reread(event_id).await {
                    Ok(Some(attendance)) if attendance.contains(user) => {
                        LedgerMetrics::record_reconciliation("register", "present");
                        RegistrationOutcome::Registered {
                            attendees_count: attendance.count(),
                        }
                    }
                    Ok(Some(_)) => {
                        LedgerMetrics::record_reconciliation("register", "absent");
                        return Err(Self::store_failure(
                            "register",
                            LedgerError::StoreUnavailable(
                                "register timed out and could not be confirmed".to_string(),
                            ),
                        ));
                    }
                    Ok(None) => {
                        LedgerMetrics::record_reconciliation("register", "not_found");
                        RegistrationOutcome::NOT_FOUND
                    }
                    Err(e) => {
                        LedgerMetrics::record_reconciliation("register", "unknown");
                        return Err(Self::store_failure("register", e));
                    }
                };
                LedgerMetrics::record_registration(&outcome, started.elapsed());
                Ok(outcome)
            }
        }
    }

    /// Remove `user` from `event_id`.
    ///
    /// Removing a user who is not registered succeeds without change.
    ///
    /// # Errors
    ///
    /// [`LedgerError::StoreUnavailable`] when the store fails or times out
    /// and the outcome cannot be confirmed.
    #[tracing::instrument(skip_all, fields(event_id = %event_id, user_id = %user))]
    pub async fn unregister(
        &self,
        event_id: EventId,
        user: UserId,
    ) -> Result<UnregistrationOutcome, LedgerError> {
        let started = Instant::now();

        match timeout(self.operation_timeout, self.store.unregister(event_id, user)).await {
            Ok(Ok(outcome)) => {
                LedgerMetrics::record_unregistration(&outcome, started.elapsed());
                tracing::debug!(
                    outcome = outcome.label(),
                    attendees_count = outcome.attendees_count(),
                    "Unregistration decided"
                );
                Ok(outcome)
            }
            Ok(Err(e)) => Err(Self::store_failure("unregister", e)),
            Err(_) => {
                tracing::warn!(
                    timeout_ms = self.operation_timeout.as_millis(),
                    "Unregister timed out, checking membership"
                );
                let outcome = match self.reread(event_id).await {
                    Ok(Some(attendance)) if attendance.contains(user) => {
                        LedgerMetrics::record_reconciliation("unregister", "present");
                        return Err(Self::store_failure(
                            "unregister",
                            LedgerError::StoreUnavailable(
                                "unregister timed out and could not be confirmed".to_string(),
                            ),
                        ));
                    }
                    Ok(Some(attendance)) => {
                        LedgerMetrics::record_reconciliation("unregister", "absent");
                        UnregistrationOutcome::Unregistered {
                            attendees_count: attendance.count(),
                        }
                    }
                    Ok(None) => {
                        LedgerMetrics::record_reconciliation("unregister", "not_found");
                        UnregistrationOutcome::NotFound
                    }
                    Err(e) => {
                        LedgerMetrics::record_reconciliation("unregister", "unknown");
                        return Err(Self::store_failure("unregister", e));
                    }
                };
                LedgerMetrics::record_unregistration(&outcome, started.elapsed());
                Ok(outcome)
            }
        }
    }

    /// Open a new event owned by `owner`.
    ///
    /// # Errors
    ///
    /// [`LedgerError::AlreadyExists`] if the id is taken,
    /// [`LedgerError::StoreUnavailable`] on store failure.
    #[tracing::instrument(skip_all, fields(event_id = %event_id, owner = %owner, capacity = %capacity))]
    pub async fn open_event(
        &self,
        event_id: EventId,
        owner: UserId,
        capacity: Capacity,
    ) -> Result<Attendance, LedgerError> {
        let attendance = self
            .bounded("open_event", self.store.open_event(event_id, owner, capacity))
            .await?;
        tracing::info!("Event opened");
        Ok(attendance)
    }

    /// Change an event's capacity on behalf of `requester`.
    ///
    /// # Errors
    ///
    /// [`LedgerError::StoreUnavailable`] on store failure or timeout.
    #[tracing::instrument(skip_all, fields(event_id = %event_id, requester = %requester, capacity = %capacity))]
    pub async fn set_capacity(
        &self,
        event_id: EventId,
        requester: UserId,
        capacity: Capacity,
    ) -> Result<CapacityChange, LedgerError> {
        self.bounded(
            "set_capacity",
            self.store.set_capacity(event_id, requester, capacity),
        )
        .await
    }

    /// Delete an event on behalf of `requester`.
    ///
    /// # Errors
    ///
    /// [`LedgerError::StoreUnavailable`] on store failure or timeout.
    #[tracing::instrument(skip_all, fields(event_id = %event_id, requester = %requester))]
    pub async fn close_event(
        &self,
        event_id: EventId,
        requester: UserId,
    ) -> Result<CloseOutcome, LedgerError> {
        self.bounded("close_event", self.store.close_event(event_id, requester))
            .await
    }

    /// Current attendance of `event_id`, or `None` if it does not exist.
    ///
    /// # Errors
    ///
    /// [`LedgerError::StoreUnavailable`] on store failure or timeout.
    pub async fn attendance(&self, event_id: EventId) -> Result<Option<Attendance>, LedgerError> {
        self.bounded("attendance", self.store.attendance(event_id))
            .await
    }

    /// Readiness check of the backing store.
    pub async fn health(&self) -> HealthCheck {
        check_store(self.store.as_ref(), self.operation_timeout).await
    }

    async fn bounded<T>(
        &self,
        operation: &'static str,
        call: StoreFuture<'_, T>,
    ) -> Result<T, LedgerError> {
        let started = Instant::now();
        let result = timeout(self.operation_timeout, call).await;
        LedgerMetrics::record_duration(operation, started.elapsed());

        match result {
            Ok(Ok(value)) => Ok(value),
            Ok(Err(e)) => Err(Self::store_failure(operation, e)),
            Err(_) => Err(Self::store_failure(
                operation,
                LedgerError::StoreUnavailable(format!(
                    "{operation} timed out after {}ms",
                    self.operation_timeout.as_millis()
                )),
            )),
        }
    }

    async fn reread(&self, event_id: EventId) -> Result<Option<Attendance>, LedgerError> {
        match timeout(self.operation_timeout, self.store.attendance(event_id)).await {
            Ok(result) => result,
            Err(_) => Err(LedgerError::StoreUnavailable(
                "membership check timed out".to_string(),
            )),
        }
    }

    fn store_failure(operation: &'static str, err: LedgerError) -> LedgerError {
        if let LedgerError::AlreadyExists(_) = err {
            return err;
        }

        LedgerMetrics::record_store_error(operation);
        tracing::warn!(operation, error = %err, "Ledger store call failed");

        match err {
            LedgerError::StoreUnavailable(_) => err,
            other => LedgerError::StoreUnavailable(other.to_string()),
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use rsvp_core::RejectionReason;
    use rsvp_testing::{FaultyLedgerStore, in_memory_ledger};

    const TIMEOUT: Duration = Duration::from_millis(50);
    const SLOW: Duration = Duration::from_millis(300);

    async fn setup(capacity: Capacity) -> (RegistrationService, Arc<FaultyLedgerStore>, EventId) {
        let faulty = Arc::new(FaultyLedgerStore::new(in_memory_ledger()));
        let service = RegistrationService::new(faulty.clone(), TIMEOUT);
        let event = EventId::new();
        service
            .open_event(event, UserId::new(), capacity)
            .await
            .unwrap();
        (service, faulty, event)
    }

    #[tokio::test]
    async fn register_and_unregister_pass_through() {
        let (service, _, event) = setup(Capacity::bounded(2)).await;
        let user = UserId::new();

        assert_eq!(
            service.register(event, user).await.unwrap(),
            RegistrationOutcome::Registered { attendees_count: 1 }
        );
        assert_eq!(
            service.unregister(event, user).await.unwrap(),
            UnregistrationOutcome::Unregistered { attendees_count: 0 }
        );
        assert_eq!(
            service.unregister(event, user).await.unwrap(),
            UnregistrationOutcome::NotRegistered { attendees_count: 0 }
        );
    }

    #[tokio::test]
    async fn open_twice_keeps_already_exists() {
        let (service, _, event) = setup(Capacity::Unbounded).await;

        let err = service
            .open_event(event, UserId::new(), Capacity::Unbounded)
            .await
            .unwrap_err();
        assert_eq!(err, LedgerError::AlreadyExists(event));
    }

    #[tokio::test]
    async fn timed_out_register_that_committed_is_reported_registered() {
        let (service, faulty, event) = setup(Capacity::bounded(3)).await;
        faulty.delay_after_commit(SLOW);

        let outcome = service.register(event, UserId::new()).await.unwrap();

        assert_eq!(outcome, RegistrationOutcome::Registered { attendees_count: 1 });
    }

    #[tokio::test]
    async fn timed_out_register_of_existing_member_reports_registered() {
        let (service, faulty, event) = setup(Capacity::bounded(3)).await;
        let user = UserId::new();
        service.register(event, user).await.unwrap();
        faulty.delay_before_commit(SLOW);

        let outcome = service.register(event, user).await.unwrap();

        assert_eq!(outcome, RegistrationOutcome::Registered { attendees_count: 1 });
    }

    #[tokio::test]
    async fn timed_out_register_that_never_ran_is_unavailable() {
        let (service, faulty, event) = setup(Capacity::bounded(3)).await;
        faulty.delay_before_commit(SLOW);
        let user = UserId::new();

        let err = service.register(event, user).await.unwrap_err();

        assert!(
            matches!(&err, LedgerError::StoreUnavailable(msg) if msg.contains("could not be confirmed"))
        );
        faulty.clear_faults();
        let attendance = service.attendance(event).await.unwrap().unwrap();
        assert!(!attendance.contains(user));
    }

    #[tokio::test]
    async fn timed_out_register_on_missing_event_is_not_found() {
        let faulty = Arc::new(FaultyLedgerStore::new(in_memory_ledger()));
        let service = RegistrationService::new(faulty.clone(), TIMEOUT);
        faulty.delay_before_commit(SLOW);

        let outcome = service.register(EventId::new(), UserId::new()).await.unwrap();

        assert_eq!(outcome.reason(), Some(RejectionReason::NotFound));
    }

    #[tokio::test]
    async fn failed_membership_check_is_unavailable() {
        let (service, faulty, event) = setup(Capacity::bounded(3)).await;
        faulty.delay_after_commit(SLOW);
        faulty.fail_reads(true);

        let err = service.register(event, UserId::new()).await.unwrap_err();

        assert!(matches!(err, LedgerError::StoreUnavailable(_)));
    }

    #[tokio::test]
    async fn timed_out_unregister_reconciles_on_membership() {
        let (service, faulty, event) = setup(Capacity::bounded(3)).await;
        let user = UserId::new();
        service.register(event, user).await.unwrap();

        faulty.delay_before_commit(SLOW);
        let err = service.unregister(event, user).await.unwrap_err();
        assert!(
            matches!(&err, LedgerError::StoreUnavailable(msg) if msg.contains("could not be confirmed"))
        );

        faulty.clear_faults();
        faulty.delay_after_commit(SLOW);
        let outcome = service.unregister(event, user).await.unwrap();
        assert_eq!(
            outcome,
            UnregistrationOutcome::Unregistered { attendees_count: 0 }
        );
    }

    #[tokio::test]
    async fn store_errors_fold_into_unavailable() {
        let (service, faulty, event) = setup(Capacity::bounded(3)).await;
        faulty.fail_next(1, LedgerError::DatabaseError("deadlock detected".to_string()));

        let err = service.register(event, UserId::new()).await.unwrap_err();

        assert!(matches!(err, LedgerError::StoreUnavailable(msg) if msg.contains("deadlock")));
    }

    #[tokio::test]
    async fn offline_store_fails_every_operation() {
        let (service, faulty, event) = setup(Capacity::bounded(3)).await;
        faulty.set_offline(true);
        let user = UserId::new();

        assert!(service.register(event, user).await.is_err());
        assert!(service.unregister(event, user).await.is_err());
        assert!(service.attendance(event).await.is_err());
        assert!(
            service
                .set_capacity(event, user, Capacity::Unbounded)
                .await
                .is_err()
        );
        assert!(service.close_event(event, user).await.is_err());
        assert!(service.health().await.status.is_unhealthy());
    }
}
