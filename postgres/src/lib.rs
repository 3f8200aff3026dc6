//! `PostgreSQL` ledger store.
//!
//! One row per event in `event_ledgers`, attendees kept as a `UUID[]` in
//! registration order. Registration and unregistration are single conditional
//! `UPDATE` statements: the membership and capacity checks are part of the
//! `WHERE` clause, so Postgres re-evaluates them against the latest row version
//! when concurrent writers queue on the row lock. No application-side locking
//! or retry loop is needed.
//!
//! When a conditional write matches no row, a follow-up read classifies the
//! rejection (unknown event, duplicate, full). That read only labels the
//! rejection; it never changes state.
//!
//! # Example
//!
//! ```ignore
//! use rsvp_postgres::{PoolSettings, PostgresLedgerStore};
//!
//! let store = PostgresLedgerStore::connect(&PoolSettings::new("postgres://localhost/rsvp")).await?;
//! store.migrate().await?;
//! ```

use metrics::counter;
use rsvp_core::{
    Attendance, Capacity, CapacityChange, CloseOutcome, EventId, LedgerError, LedgerStore,
    RegistrationOutcome, RejectionReason, StoreFuture, UnregistrationOutcome, UserId,
};
use sqlx::PgPool;
use sqlx::postgres::{PgConnectOptions, PgPoolOptions};
use std::str::FromStr;
use std::time::Duration;
use uuid::Uuid;

/// Connection pool settings for [`PostgresLedgerStore::connect`].
#[derive(Debug, Clone)]
pub struct PoolSettings {
    /// `postgres://` connection URL
    pub url: String,
    /// Upper bound on pooled connections
    pub max_connections: u32,
    /// Connections kept open while idle
    pub min_connections: u32,
    /// How long to wait for a free connection before giving up
    pub acquire_timeout: Duration,
    /// Close connections idle for longer than this
    pub idle_timeout: Option<Duration>,
    /// Server-side `statement_timeout` applied to every session
    pub statement_timeout: Option<Duration>,
}

impl PoolSettings {
    /// Settings with the default pool shape for `url`.
    #[must_use]
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            max_connections: 10,
            min_connections: 1,
            acquire_timeout: Duration::from_secs(5),
            idle_timeout: Some(Duration::from_secs(600)),
            statement_timeout: Some(Duration::from_secs(5)),
        }
    }
}

/// Row shape of `event_ledgers` as read back by the store.
type LedgerRow = (Uuid, Uuid, Option<i64>, Vec<Uuid>);

/// `PostgreSQL`-backed [`LedgerStore`].
#[derive(Clone, Debug)]
pub struct PostgresLedgerStore {
    pool: PgPool,
}

impl PostgresLedgerStore {
    /// Wrap an existing connection pool.
    #[must_use]
    pub const fn from_pool(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Open a connection pool with `settings`.
    ///
    /// # Errors
    ///
    /// Returns [`LedgerError::DatabaseError`] for a malformed URL and
    /// [`LedgerError::StoreUnavailable`] if no connection can be made.
    pub async fn connect(settings: &PoolSettings) -> Result<Self, LedgerError> {
        let mut options = PgConnectOptions::from_str(&settings.url)
            .map_err(|e| LedgerError::DatabaseError(format!("Invalid database URL: {e}")))?;
        if let Some(timeout) = settings.statement_timeout {
            options = options.options([("statement_timeout", timeout.as_millis().to_string())]);
        }

        let pool = PgPoolOptions::new()
            .max_connections(settings.max_connections)
            .min_connections(settings.min_connections)
            .acquire_timeout(settings.acquire_timeout)
            .idle_timeout(settings.idle_timeout)
            .connect_with(options)
            .await
            .map_err(|e| map_sqlx_error("connect", e))?;

        tracing::info!(
            max_connections = settings.max_connections,
            "Connected to PostgreSQL ledger store"
        );
        Ok(Self::from_pool(pool))
    }

    /// The underlying pool.
    #[must_use]
    pub const fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Run the embedded migrations.
    ///
    /// # Errors
    ///
    /// Returns [`LedgerError::DatabaseError`] if a migration fails.
    pub async fn migrate(&self) -> Result<(), LedgerError> {
        sqlx::migrate!("./migrations")
            .run(&self.pool)
            .await
            .map_err(|e| LedgerError::DatabaseError(format!("Migration failed: {e}")))?;
        tracing::info!("Ledger migrations applied");
        Ok(())
    }

    async fn open_event_impl(
        &self,
        event_id: EventId,
        owner: UserId,
        capacity: Capacity,
    ) -> Result<Attendance, LedgerError> {
        let inserted: Option<(Uuid,)> = sqlx::query_as(
            r"
            INSERT INTO event_ledgers (event_id, owner_id, capacity)
            VALUES ($1, $2, $3)
            ON CONFLICT (event_id) DO NOTHING
            RETURNING event_id
            ",
        )
        .bind(event_id.as_uuid())
        .bind(owner.as_uuid())
        .bind(capacity.limit().map(i64::from))
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| map_sqlx_error("open_event", e))?;

        match inserted {
            Some(_) => Ok(Attendance::open(event_id, owner, capacity)),
            None => Err(LedgerError::AlreadyExists(event_id)),
        }
    }

    async fn register_impl(
        &self,
        event_id: EventId,
        user: UserId,
    ) -> Result<RegistrationOutcome, LedgerError> {
        let admitted: Option<(i32,)> = sqlx::query_as(
            r"
            UPDATE event_ledgers
            SET attendees = array_append(attendees, $2),
                updated_at = now()
            WHERE event_id = $1
              AND NOT ($2 = ANY(attendees))
              AND (capacity IS NULL OR cardinality(attendees) < capacity)
            RETURNING cardinality(attendees)
            ",
        )
        .bind(event_id.as_uuid())
        .bind(user.as_uuid())
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| map_sqlx_error("register", e))?;

        if let Some((count,)) = admitted {
            return Ok(RegistrationOutcome::Registered {
                attendees_count: count_from_row(count)?,
            });
        }

        let current: Option<(bool, i32)> = sqlx::query_as(
            "SELECT $2 = ANY(attendees), cardinality(attendees) FROM event_ledgers WHERE event_id = $1",
        )
        .bind(event_id.as_uuid())
        .bind(user.as_uuid())
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| map_sqlx_error("register", e))?;

        Ok(match current {
            None => RegistrationOutcome::NOT_FOUND,
            Some((member, count)) => RegistrationOutcome::Rejected {
                reason: if member {
                    RejectionReason::Duplicate
                } else {
                    RejectionReason::Full
                },
                attendees_count: count_from_row(count)?,
            },
        })
    }

    async fn unregister_impl(
        &self,
        event_id: EventId,
        user: UserId,
    ) -> Result<UnregistrationOutcome, LedgerError> {
        let removed: Option<(i32,)> = sqlx::query_as(
            r"
            UPDATE event_ledgers
            SET attendees = array_remove(attendees, $2),
                updated_at = now()
            WHERE event_id = $1
              AND $2 = ANY(attendees)
            RETURNING cardinality(attendees)
            ",
        )
        .bind(event_id.as_uuid())
        .bind(user.as_uuid())
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| map_sqlx_error("unregister", e))?;

        if let Some((count,)) = removed {
            return Ok(UnregistrationOutcome::Unregistered {
                attendees_count: count_from_row(count)?,
            });
        }

        let current: Option<(i32,)> =
            sqlx::query_as("SELECT cardinality(attendees) FROM event_ledgers WHERE event_id = $1")
                .bind(event_id.as_uuid())
                .fetch_optional(&self.pool)
                .await
                .map_err(|e| map_sqlx_error("unregister", e))?;

        Ok(match current {
            None => UnregistrationOutcome::NotFound,
            Some((count,)) => UnregistrationOutcome::NotRegistered {
                attendees_count: count_from_row(count)?,
            },
        })
    }

    async fn set_capacity_impl(
        &self,
        event_id: EventId,
        requester: UserId,
        capacity: Capacity,
    ) -> Result<CapacityChange, LedgerError> {
        let changed: Option<LedgerRow> = sqlx::query_as(
            r"
            UPDATE event_ledgers
            SET capacity = $3,
                updated_at = now()
            WHERE event_id = $1
              AND owner_id = $2
              AND ($3::BIGINT IS NULL OR cardinality(attendees) <= $3::BIGINT)
            RETURNING event_id, owner_id, capacity, attendees
            ",
        )
        .bind(event_id.as_uuid())
        .bind(requester.as_uuid())
        .bind(capacity.limit().map(i64::from))
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| map_sqlx_error("set_capacity", e))?;

        if let Some(row) = changed {
            return Ok(CapacityChange::Changed(attendance_from_row(row)?));
        }

        let current: Option<(Uuid, i32)> = sqlx::query_as(
            "SELECT owner_id, cardinality(attendees) FROM event_ledgers WHERE event_id = $1",
        )
        .bind(event_id.as_uuid())
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| map_sqlx_error("set_capacity", e))?;

        Ok(match current {
            None => CapacityChange::NotFound,
            Some((owner, _)) if owner != *requester.as_uuid() => CapacityChange::NotOwner,
            Some((_, count)) => CapacityChange::BelowAttendance {
                attendees_count: count_from_row(count)?,
            },
        })
    }

    async fn close_event_impl(
        &self,
        event_id: EventId,
        requester: UserId,
    ) -> Result<CloseOutcome, LedgerError> {
        let deleted = sqlx::query("DELETE FROM event_ledgers WHERE event_id = $1 AND owner_id = $2")
            .bind(event_id.as_uuid())
            .bind(requester.as_uuid())
            .execute(&self.pool)
            .await
            .map_err(|e| map_sqlx_error("close_event", e))?;

        if deleted.rows_affected() > 0 {
            return Ok(CloseOutcome::Closed);
        }

        let exists: Option<(Uuid,)> =
            sqlx::query_as("SELECT owner_id FROM event_ledgers WHERE event_id = $1")
                .bind(event_id.as_uuid())
                .fetch_optional(&self.pool)
                .await
                .map_err(|e| map_sqlx_error("close_event", e))?;

        Ok(if exists.is_some() {
            CloseOutcome::NotOwner
        } else {
            CloseOutcome::NotFound
        })
    }

    async fn attendance_impl(&self, event_id: EventId) -> Result<Option<Attendance>, LedgerError> {
        let row: Option<LedgerRow> = sqlx::query_as(
            "SELECT event_id, owner_id, capacity, attendees FROM event_ledgers WHERE event_id = $1",
        )
        .bind(event_id.as_uuid())
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| map_sqlx_error("attendance", e))?;

        row.map(attendance_from_row).transpose()
    }

    async fn ping_impl(&self) -> Result<(), LedgerError> {
        sqlx::query("SELECT 1")
            .execute(&self.pool)
            .await
            .map_err(|e| map_sqlx_error("ping", e))?;
        Ok(())
    }
}

impl LedgerStore for PostgresLedgerStore {
    fn open_event(
        &self,
        event_id: EventId,
        owner: UserId,
        capacity: Capacity,
    ) -> StoreFuture<'_, Attendance> {
        Box::pin(self.open_event_impl(event_id, owner, capacity))
    }

    fn register(&self, event_id: EventId, user: UserId) -> StoreFuture<'_, RegistrationOutcome> {
        Box::pin(self.register_impl(event_id, user))
    }

    fn unregister(
        &self,
        event_id: EventId,
        user: UserId,
    ) -> StoreFuture<'_, UnregistrationOutcome> {
        Box::pin(self.unregister_impl(event_id, user))
    }

    fn set_capacity(
        &self,
        event_id: EventId,
        requester: UserId,
        capacity: Capacity,
    ) -> StoreFuture<'_, CapacityChange> {
        Box::pin(self.set_capacity_impl(event_id, requester, capacity))
    }

    fn close_event(&self, event_id: EventId, requester: UserId) -> StoreFuture<'_, CloseOutcome> {
        Box::pin(self.close_event_impl(event_id, requester))
    }

    fn attendance(&self, event_id: EventId) -> StoreFuture<'_, Option<Attendance>> {
        Box::pin(self.attendance_impl(event_id))
    }

    fn ping(&self) -> StoreFuture<'_, ()> {
        Box::pin(self.ping_impl())
    }
}

fn count_from_row(count: i32) -> Result<u32, LedgerError> {
    u32::try_from(count)
        .map_err(|_| LedgerError::DatabaseError(format!("Invalid attendee count: {count}")))
}

fn capacity_from_row(capacity: Option<i64>) -> Result<Capacity, LedgerError> {
    match capacity {
        None => Ok(Capacity::Unbounded),
        Some(limit) => u32::try_from(limit)
            .map(Capacity::Bounded)
            .map_err(|_| LedgerError::DatabaseError(format!("Invalid capacity: {limit}"))),
    }
}

fn attendance_from_row(
    (event_id, owner, capacity, attendees): LedgerRow,
) -> Result<Attendance, LedgerError> {
    Ok(Attendance::restore(
        EventId::from_uuid(event_id),
        UserId::from_uuid(owner),
        capacity_from_row(capacity)?,
        attendees.into_iter().map(UserId::from_uuid),
    ))
}

/// SQLSTATE codes that mean "try again later" rather than "bad request".
const TRANSIENT_SQLSTATES: &[&str] = &[
    "57014", // query_canceled (statement_timeout)
    "57P01", // admin_shutdown
    "57P03", // cannot_connect_now
    "53300", // too_many_connections
];

fn map_sqlx_error(operation: &'static str, error: sqlx::Error) -> LedgerError {
    let transient = match &error {
        sqlx::Error::PoolTimedOut
        | sqlx::Error::PoolClosed
        | sqlx::Error::Io(_)
        | sqlx::Error::Tls(_)
        | sqlx::Error::WorkerCrashed => true,
        sqlx::Error::Database(db) => db
            .code()
            .is_some_and(|code| TRANSIENT_SQLSTATES.contains(&code.as_ref())),
        _ => false,
    };

    counter!("rsvp_postgres_errors_total", "operation" => operation).increment(1);
    tracing::warn!(operation, error = %error, transient, "Ledger query failed");

    if transient {
        LedgerError::StoreUnavailable(format!("{operation}: {error}"))
    } else {
        LedgerError::DatabaseError(format!("{operation}: {error}"))
    }
}
