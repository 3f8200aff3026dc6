//! Structured results of ledger operations.
//!
//! Expected negative outcomes (event full, duplicate registration, unknown
//! event, caller not the owner) are values of these enums. Only
//! infrastructure failures travel through [`LedgerError`](crate::store::LedgerError).

use crate::ledger::Attendance;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Why a registration was refused.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RejectionReason {
    /// The attendee set is already at capacity.
    Full,
    /// The user is already registered.
    Duplicate,
    /// The event does not exist.
    NotFound,
}

impl RejectionReason {
    /// Wire name of the reason.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Full => "full",
            Self::Duplicate => "duplicate",
            Self::NotFound => "not_found",
        }
    }
}

impl fmt::Display for RejectionReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Result of a `register` call.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RegistrationOutcome {
    /// The user was added.
    Registered {
        /// Attendee count after the insertion.
        attendees_count: u32,
    },
    /// Nothing changed.
    Rejected {
        /// Why the registration was refused.
        reason: RejectionReason,
        /// Attendee count observed by the decision (0 for unknown events).
        attendees_count: u32,
    },
}

impl RegistrationOutcome {
    /// Rejection for an event that does not exist.
    pub const NOT_FOUND: Self = Self::Rejected {
        reason: RejectionReason::NotFound,
        attendees_count: 0,
    };

    /// Whether the user was registered by this call.
    #[must_use]
    pub const fn is_registered(&self) -> bool {
        matches!(self, Self::Registered { .. })
    }

    /// Attendee count reported alongside the outcome.
    #[must_use]
    pub const fn attendees_count(&self) -> u32 {
        match self {
            Self::Registered { attendees_count } | Self::Rejected { attendees_count, .. } => {
                *attendees_count
            }
        }
    }

    /// The rejection reason, if any.
    #[must_use]
    pub const fn reason(&self) -> Option<RejectionReason> {
        match self {
            Self::Registered { .. } => None,
            Self::Rejected { reason, .. } => Some(*reason),
        }
    }

    /// Short label used for metrics and logs.
    #[must_use]
    pub const fn label(&self) -> &'static str {
        match self {
            Self::Registered { .. } => "registered",
            Self::Rejected { reason, .. } => reason.as_str(),
        }
    }
}

/// Result of an `unregister` call.
///
/// Removing a user who is not registered is a successful no-op; only an
/// unknown event is reported as a failure.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum UnregistrationOutcome {
    /// The user was removed.
    Unregistered {
        /// Attendee count after the removal.
        attendees_count: u32,
    },
    /// The user was not registered; nothing changed.
    NotRegistered {
        /// Current attendee count.
        attendees_count: u32,
    },
    /// The event does not exist.
    NotFound,
}

impl UnregistrationOutcome {
    /// Whether the call succeeded (removal or no-op).
    #[must_use]
    pub const fn is_success(&self) -> bool {
        !matches!(self, Self::NotFound)
    }

    /// Attendee count reported alongside the outcome.
    #[must_use]
    pub const fn attendees_count(&self) -> u32 {
        match self {
            Self::Unregistered { attendees_count } | Self::NotRegistered { attendees_count } => {
                *attendees_count
            }
            Self::NotFound => 0,
        }
    }

    /// Short label used for metrics and logs.
    #[must_use]
    pub const fn label(&self) -> &'static str {
        match self {
            Self::Unregistered { .. } => "unregistered",
            Self::NotRegistered { .. } => "not_registered",
            Self::NotFound => "not_found",
        }
    }
}

/// Result of an owner changing an event's capacity.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum CapacityChange {
    /// The new capacity is in effect.
    Changed(Attendance),
    /// The requester does not own the event.
    NotOwner,
    /// More users are registered than the requested bound allows.
    BelowAttendance {
        /// Current attendee count.
        attendees_count: u32,
    },
    /// The event does not exist.
    NotFound,
}

/// Result of an owner deleting an event.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CloseOutcome {
    /// The event and its attendee set were discarded.
    Closed,
    /// The requester does not own the event.
    NotOwner,
    /// The event does not exist.
    NotFound,
}

/// Wire shape shared by `register` and `unregister` responses.
///
/// ```json
/// {"success": false, "attendeesCount": 2, "reason": "full"}
/// ```
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RegistrationResult {
    /// Whether the request took effect (or was an accepted no-op).
    pub success: bool,
    /// Attendee count after the request.
    pub attendees_count: u32,
    /// Why the request failed, when it did.
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub reason: Option<RejectionReason>,
}

impl From<RegistrationOutcome> for RegistrationResult {
    fn from(outcome: RegistrationOutcome) -> Self {
        Self {
            success: outcome.is_registered(),
            attendees_count: outcome.attendees_count(),
            reason: outcome.reason(),
        }
    }
}

impl From<UnregistrationOutcome> for RegistrationResult {
    fn from(outcome: UnregistrationOutcome) -> Self {
        Self {
            success: outcome.is_success(),
            attendees_count: outcome.attendees_count(),
            reason: (!outcome.is_success()).then_some(RejectionReason::NotFound),
        }
    }
}
