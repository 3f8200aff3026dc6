//! The per-event registration ledger.
//!
//! [`Attendance`] is the event aggregate as far as registration is concerned:
//! owner, capacity and the ordered set of registered users. Its methods are
//! pure decisions over one snapshot of the record. Stores make them atomic,
//! either by running them inside a compare-and-swap loop over a versioned
//! record or by expressing the same predicate as a single conditional
//! update.
//!
//! # Decision order
//!
//! A registration is checked for membership before capacity, so a user who
//! is already in a full event is told `Duplicate`, not `Full`.

use crate::outcome::{CapacityChange, RegistrationOutcome, RejectionReason};
use crate::types::{Capacity, EventId, UserId};
use serde::Serialize;

/// Registration state of a single event.
///
/// # Invariants
///
/// - `attendees` contains no duplicates.
/// - `capacity.admits(attendees.len())` holds after every method returns.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct Attendance {
    event_id: EventId,
    owner: UserId,
    capacity: Capacity,
    attendees: Vec<UserId>,
}

impl Attendance {
    /// A freshly opened event with nobody registered.
    #[must_use]
    pub const fn open(event_id: EventId, owner: UserId, capacity: Capacity) -> Self {
        Self {
            event_id,
            owner,
            capacity,
            attendees: Vec::new(),
        }
    }

    /// Rebuild a record read back from storage.
    ///
    /// Repeated identifiers are collapsed to their first occurrence so the
    /// uniqueness invariant holds even for hand-edited rows.
    #[must_use]
    pub fn restore(
        event_id: EventId,
        owner: UserId,
        capacity: Capacity,
        attendees: impl IntoIterator<Item = UserId>,
    ) -> Self {
        let mut unique: Vec<UserId> = Vec::new();
        for user in attendees {
            if !unique.contains(&user) {
                unique.push(user);
            }
        }

        Self {
            event_id,
            owner,
            capacity,
            attendees: unique,
        }
    }

    /// The event this record belongs to.
    #[must_use]
    pub const fn event_id(&self) -> EventId {
        self.event_id
    }

    /// The user who opened the event.
    #[must_use]
    pub const fn owner(&self) -> UserId {
        self.owner
    }

    /// Current capacity.
    #[must_use]
    pub const fn capacity(&self) -> Capacity {
        self.capacity
    }

    /// Registered users in registration order.
    #[must_use]
    pub fn attendees(&self) -> &[UserId] {
        &self.attendees
    }

    /// Number of registered users.
    #[must_use]
    pub fn count(&self) -> u32 {
        u32::try_from(self.attendees.len()).unwrap_or(u32::MAX)
    }

    /// Seats left, or `None` when unbounded.
    #[must_use]
    pub fn remaining(&self) -> Option<u32> {
        self.capacity
            .limit()
            .map(|limit| limit.saturating_sub(self.count()))
    }

    /// Whether `user` is registered.
    #[must_use]
    pub fn contains(&self, user: UserId) -> bool {
        self.attendees.contains(&user)
    }

    /// Whether `user` owns the event.
    #[must_use]
    pub fn is_owned_by(&self, user: UserId) -> bool {
        self.owner == user
    }

    /// Decide a registration and apply it to this snapshot.
    ///
    /// Leaves the record untouched on rejection.
    pub fn register(&mut self, user: UserId) -> RegistrationOutcome {
        if self.contains(user) {
            return RegistrationOutcome::Rejected {
                reason: RejectionReason::Duplicate,
                attendees_count: self.count(),
            };
        }

        if !self.capacity.has_room_for(self.attendees.len()) {
            return RegistrationOutcome::Rejected {
                reason: RejectionReason::Full,
                attendees_count: self.count(),
            };
        }

        self.attendees.push(user);
        RegistrationOutcome::Registered {
            attendees_count: self.count(),
        }
    }

    /// Remove `user`, returning whether anything changed.
    pub fn unregister(&mut self, user: UserId) -> bool {
        let before = self.attendees.len();
        self.attendees.retain(|attendee| *attendee != user);
        self.attendees.len() != before
    }

    /// Decide an owner's capacity change and apply it to this snapshot.
    ///
    /// Never reports [`CapacityChange::NotFound`]; that is the store's call.
    pub fn change_capacity(&mut self, requester: UserId, capacity: Capacity) -> CapacityChange {
        if !self.is_owned_by(requester) {
            return CapacityChange::NotOwner;
        }

        if !capacity.admits(self.attendees.len()) {
            return CapacityChange::BelowAttendance {
                attendees_count: self.count(),
            };
        }

        self.capacity = capacity;
        CapacityChange::Changed(self.clone())
    }
}
