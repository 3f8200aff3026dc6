//! Register and unregister endpoints.
//!
//! Both answer with a [`RegistrationResult`] body, including on rejection, so
//! clients always learn the attendee count the decision saw.

use crate::error::AppError;
use crate::extractors::{Caller, CorrelationId};
use crate::state::AppState;
use axum::{
    Json,
    extract::{Path, State},
    http::StatusCode,
};
use rsvp_core::{EventId, RegistrationOutcome, RegistrationResult, RejectionReason};

/// Status code for a registration decision.
const fn registration_status(outcome: &RegistrationOutcome) -> StatusCode {
    match outcome.reason() {
        None => StatusCode::OK,
        Some(RejectionReason::Full | RejectionReason::Duplicate) => StatusCode::CONFLICT,
        Some(RejectionReason::NotFound) => StatusCode::NOT_FOUND,
    }
}

/// Register the caller for an event.
///
/// # Endpoint
///
/// ```text
/// POST /api/events/:id/register
/// ```
///
/// # Response
///
/// - 200 `{"success": true, "attendeesCount": 3}`
/// - 409 `{"success": false, "attendeesCount": 50, "reason": "full"}`
/// - 409 `{"success": false, "attendeesCount": 3, "reason": "duplicate"}`
/// - 404 `{"success": false, "attendeesCount": 0, "reason": "not_found"}`
///
/// # Errors
///
/// 503 when the store is unavailable and the outcome is unknown.
pub async fn register(
    State(state): State<AppState>,
    Caller(user): Caller,
    correlation_id: CorrelationId,
    Path(event_id): Path<EventId>,
) -> Result<(StatusCode, Json<RegistrationResult>), AppError> {
    let outcome = state.service().register(event_id, user).await?;

    tracing::info!(
        correlation_id = %correlation_id.0,
        event_id = %event_id,
        user_id = %user,
        outcome = outcome.label(),
        attendees_count = outcome.attendees_count(),
        "Registration handled"
    );

    Ok((registration_status(&outcome), Json(outcome.into())))
}

/// Remove the caller from an event.
///
/// Unregistering when not registered succeeds without change.
///
/// # Endpoint
///
/// ```text
/// POST /api/events/:id/unregister
/// ```
///
/// # Response
///
/// - 200 `{"success": true, "attendeesCount": 2}`
/// - 404 `{"success": false, "attendeesCount": 0, "reason": "not_found"}`
///
/// # Errors
///
/// 503 when the store is unavailable and the outcome is unknown.
pub async fn unregister(
    State(state): State<AppState>,
    Caller(user): Caller,
    correlation_id: CorrelationId,
    Path(event_id): Path<EventId>,
) -> Result<(StatusCode, Json<RegistrationResult>), AppError> {
    let outcome = state.service().unregister(event_id, user).await?;

    tracing::info!(
        correlation_id = %correlation_id.0,
        event_id = %event_id,
        user_id = %user,
        outcome = outcome.label(),
        "Unregistration handled"
    );

    let status = if outcome.is_success() {
        StatusCode::OK
    } else {
        StatusCode::NOT_FOUND
    };
    Ok((status, Json(outcome.into())))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejections_map_to_conflict_or_not_found() {
        let full = RegistrationOutcome::Rejected {
            reason: RejectionReason::Full,
            attendees_count: 2,
        };
        let duplicate = RegistrationOutcome::Rejected {
            reason: RejectionReason::Duplicate,
            attendees_count: 2,
        };

        assert_eq!(
            registration_status(&RegistrationOutcome::Registered { attendees_count: 1 }),
            StatusCode::OK
        );
        assert_eq!(registration_status(&full), StatusCode::CONFLICT);
        assert_eq!(registration_status(&duplicate), StatusCode::CONFLICT);
        assert_eq!(
            registration_status(&RegistrationOutcome::NOT_FOUND),
            StatusCode::NOT_FOUND
        );
    }
}
