//! Identifier and capacity value types.
//!
//! Event and user identifiers are UUID newtypes so the two can never be
//! swapped at a call site. `Capacity` models the "unbounded" sentinel as an
//! enum variant rather than a magic number.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;
use uuid::Uuid;

/// Error returned when parsing an identifier from external input.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("Invalid {kind} id: {input}")]
pub struct ParseIdError {
    kind: &'static str,
    input: String,
}

/// Unique identifier of an event.
///
/// # Examples
///
/// ```
/// use rsvp_core::types::EventId;
///
/// let id = EventId::new();
/// let parsed: EventId = id.to_string().parse().unwrap();
/// assert_eq!(id, parsed);
/// ```
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EventId(Uuid);

impl EventId {
    /// Creates a new random `EventId`.
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Create an `EventId` from a `Uuid`.
    #[must_use]
    pub const fn from_uuid(uuid: Uuid) -> Self {
        Self(uuid)
    }

    /// Get the inner UUID.
    #[must_use]
    pub const fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl Default for EventId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for EventId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for EventId {
    type Err = ParseIdError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Uuid::parse_str(s).map(Self).map_err(|_| ParseIdError {
            kind: "event",
            input: s.to_string(),
        })
    }
}

/// Stable identifier of an authenticated user.
///
/// The identity provider vouches for this value; the ledger never
/// re-validates it.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UserId(Uuid);

impl UserId {
    /// Creates a new random `UserId`.
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Create a `UserId` from a `Uuid`.
    #[must_use]
    pub const fn from_uuid(uuid: Uuid) -> Self {
        Self(uuid)
    }

    /// Get the inner UUID.
    #[must_use]
    pub const fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl Default for UserId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for UserId {
    type Err = ParseIdError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Uuid::parse_str(s).map(Self).map_err(|_| ParseIdError {
            kind: "user",
            input: s.to_string(),
        })
    }
}

/// Maximum number of attendees an event admits.
///
/// Serialized as an optional integer: `null` means unbounded.
///
/// # Examples
///
/// ```
/// use rsvp_core::types::Capacity;
///
/// let capacity = Capacity::bounded(2);
/// assert!(capacity.has_room_for(1));
/// assert!(!capacity.has_room_for(2));
/// assert!(Capacity::Unbounded.has_room_for(usize::MAX - 1));
/// ```
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "Option<u32>", into = "Option<u32>")]
pub enum Capacity {
    /// At most this many attendees.
    Bounded(u32),
    /// No upper bound.
    Unbounded,
}

impl Capacity {
    /// Capacity bounded at `limit` attendees.
    #[must_use]
    pub const fn bounded(limit: u32) -> Self {
        Self::Bounded(limit)
    }

    /// The bound, or `None` when unbounded.
    #[must_use]
    pub const fn limit(self) -> Option<u32> {
        match self {
            Self::Bounded(limit) => Some(limit),
            Self::Unbounded => None,
        }
    }

    /// Whether one more attendee fits when `current` are already registered.
    #[must_use]
    pub const fn has_room_for(self, current: usize) -> bool {
        match self {
            Self::Bounded(limit) => current < limit as usize,
            Self::Unbounded => true,
        }
    }

    /// Whether `count` attendees satisfy this bound.
    #[must_use]
    pub const fn admits(self, count: usize) -> bool {
        match self {
            Self::Bounded(limit) => count <= limit as usize,
            Self::Unbounded => true,
        }
    }
}

impl From<Option<u32>> for Capacity {
    fn from(limit: Option<u32>) -> Self {
        limit.map_or(Self::Unbounded, Self::Bounded)
    }
}

impl From<Capacity> for Option<u32> {
    fn from(capacity: Capacity) -> Self {
        capacity.limit()
    }
}

impl fmt::Display for Capacity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Bounded(limit) => write!(f, "{limit}"),
            Self::Unbounded => write!(f, "unbounded"),
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn event_id_parse_rejects_garbage() {
        let err = "not-a-uuid".parse::<EventId>().unwrap_err();
        assert!(err.to_string().contains("event"));
        assert!(err.to_string().contains("not-a-uuid"));
    }

    #[test]
    fn user_id_display_round_trips() {
        let id = UserId::new();
        assert_eq!(id.to_string().parse::<UserId>(), Ok(id));
    }

    #[test]
    fn zero_capacity_has_no_room() {
        assert!(!Capacity::bounded(0).has_room_for(0));
        assert!(Capacity::bounded(0).admits(0));
    }

    #[test]
    fn capacity_admits_exact_bound() {
        let capacity = Capacity::bounded(3);
        assert!(capacity.admits(3));
        assert!(!capacity.admits(4));
        assert!(!capacity.has_room_for(3));
    }

    #[test]
    fn capacity_serializes_as_optional_integer() {
        assert_eq!(serde_json::to_string(&Capacity::bounded(5)).unwrap(), "5");
        assert_eq!(serde_json::to_string(&Capacity::Unbounded).unwrap(), "null");

        let parsed: Capacity = serde_json::from_str("null").unwrap();
        assert_eq!(parsed, Capacity::Unbounded);
        let parsed: Capacity = serde_json::from_str("12").unwrap();
        assert_eq!(parsed, Capacity::bounded(12));
    }
}
