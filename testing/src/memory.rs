//! In-memory versioned ledger store.
//!
//! Each event's record sits behind its own mutex, so writers to different
//! events never contend. The map lock is only held to find or insert a
//! record, never across a decision.
//!
//! Removed records are evicted from the map. Versions are never reused for
//! the same id: a reopened event starts above every version the store has
//! retired, so a writer holding a snapshot of the removed event cannot
//! swap it onto the new one.

use rsvp_core::{Attendance, EventId, LedgerError, StoreFuture, Version, VersionedLedgerStore};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, RwLock};

/// A record and its version. `attendance` is `None` once removed.
#[derive(Debug)]
struct Slot {
    version: Version,
    attendance: Option<Attendance>,
}

type SlotRef = Arc<Mutex<Slot>>;

/// Versioned, HashMap-backed record store for fast, deterministic tests.
///
/// Wrap it in `OptimisticLedger` to get a full `LedgerStore`.
///
/// # Example
///
/// ```
/// use rsvp_core::{Attendance, Capacity, EventId, UserId, Version, VersionedLedgerStore};
/// use rsvp_testing::InMemoryLedgerStore;
///
/// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let store = InMemoryLedgerStore::new();
/// let event = Attendance::open(EventId::new(), UserId::new(), Capacity::bounded(10));
///
/// let version = store.insert(event.clone()).await?;
/// assert_eq!(version, Version::INITIAL);
/// # Ok(())
/// # }
/// ```
#[derive(Clone, Debug, Default)]
pub struct InMemoryLedgerStore {
    events: Arc<RwLock<HashMap<EventId, SlotRef>>>,
    /// Starting version for newly inserted records; above every retired one.
    next_initial: Arc<AtomicU64>,
}

impl InMemoryLedgerStore {
    /// Create a new empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of live events.
    ///
    /// # Errors
    ///
    /// Returns [`LedgerError::StoreUnavailable`] if a lock was poisoned.
    pub fn len(&self) -> Result<usize, LedgerError> {
        let events = self.events.read().map_err(|_| poisoned())?;
        let mut live = 0;
        for slot in events.values() {
            if slot.lock().map_err(|_| poisoned())?.attendance.is_some() {
                live += 1;
            }
        }
        Ok(live)
    }

    /// Whether the store holds no live events.
    ///
    /// # Errors
    ///
    /// Returns [`LedgerError::StoreUnavailable`] if a lock was poisoned.
    pub fn is_empty(&self) -> Result<bool, LedgerError> {
        self.len().map(|len| len == 0)
    }

    fn slot(&self, event_id: EventId) -> Result<Option<SlotRef>, LedgerError> {
        let events = self.events.read().map_err(|_| poisoned())?;
        Ok(events.get(&event_id).cloned())
    }

    fn insert_now(&self, attendance: Attendance) -> Result<Version, LedgerError> {
        let event_id = attendance.event_id();
        let mut events = self.events.write().map_err(|_| poisoned())?;

        if let Some(existing) = events.get(&event_id) {
            let mut slot = existing.lock().map_err(|_| poisoned())?;
            if slot.attendance.is_some() {
                return Err(LedgerError::AlreadyExists(event_id));
            }
            // Removal has not evicted this tombstone yet.
            slot.version = slot.version.next();
            slot.attendance = Some(attendance);
            return Ok(slot.version);
        }

        let version = Version::new(self.next_initial.load(Ordering::Acquire));
        events.insert(
            event_id,
            Arc::new(Mutex::new(Slot {
                version,
                attendance: Some(attendance),
            })),
        );
        Ok(version)
    }

    fn load_now(&self, event_id: EventId) -> Result<Option<(Version, Attendance)>, LedgerError> {
        let Some(slot) = self.slot(event_id)? else {
            return Ok(None);
        };
        let slot = slot.lock().map_err(|_| poisoned())?;
        Ok(slot
            .attendance
            .as_ref()
            .map(|attendance| (slot.version, attendance.clone())))
    }

    fn swap_now(&self, expected: Version, attendance: Attendance) -> Result<Version, LedgerError> {
        let event_id = attendance.event_id();
        let conflict = LedgerError::ConcurrencyConflict { event_id, expected };

        let Some(slot) = self.slot(event_id)? else {
            return Err(conflict);
        };
        let mut slot = slot.lock().map_err(|_| poisoned())?;

        if slot.attendance.is_none() || slot.version != expected {
            return Err(conflict);
        }

        slot.version = slot.version.next();
        slot.attendance = Some(attendance);
        Ok(slot.version)
    }

    fn remove_now(&self, event_id: EventId, expected: Version) -> Result<(), LedgerError> {
        let conflict = LedgerError::ConcurrencyConflict { event_id, expected };

        let Some(slot_ref) = self.slot(event_id)? else {
            return Err(conflict);
        };

        {
            let mut slot = slot_ref.lock().map_err(|_| poisoned())?;
            if slot.attendance.is_none() || slot.version != expected {
                return Err(conflict);
            }
            slot.version = slot.version.next();
            slot.attendance = None;
            self.next_initial
                .fetch_max(slot.version.next().value(), Ordering::AcqRel);
        }

        let mut events = self.events.write().map_err(|_| poisoned())?;
        let still_tombstoned = match events.get(&event_id) {
            Some(current) if Arc::ptr_eq(current, &slot_ref) => {
                current.lock().map_err(|_| poisoned())?.attendance.is_none()
            }
            _ => false,
        };
        if still_tombstoned {
            events.remove(&event_id);
        }
        Ok(())
    }
}

fn poisoned() -> LedgerError {
    LedgerError::StoreUnavailable("in-memory ledger lock poisoned".to_string())
}

impl VersionedLedgerStore for InMemoryLedgerStore {
    fn insert(&self, attendance: Attendance) -> StoreFuture<'_, Version> {
        Box::pin(async move { self.insert_now(attendance) })
    }

    fn load(&self, event_id: EventId) -> StoreFuture<'_, Option<(Version, Attendance)>> {
        Box::pin(async move { self.load_now(event_id) })
    }

    fn compare_and_swap(
        &self,
        expected: Version,
        attendance: Attendance,
    ) -> StoreFuture<'_, Version> {
        Box::pin(async move { self.swap_now(expected, attendance) })
    }

    fn remove(&self, event_id: EventId, expected: Version) -> StoreFuture<'_, ()> {
        Box::pin(async move { self.remove_now(event_id, expected) })
    }

    fn ping(&self) -> StoreFuture<'_, ()> {
        Box::pin(async move {
            self.events.read().map_err(|_| poisoned())?;
            Ok(())
        })
    }
}
