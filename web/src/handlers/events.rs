//! Event lifecycle endpoints: open, read, resize, close.

use crate::error::AppError;
use crate::extractors::Caller;
use crate::state::AppState;
use axum::{
    Json,
    extract::{Path, State},
    http::StatusCode,
};
use rsvp_core::{Attendance, Capacity, CapacityChange, CloseOutcome, EventId, UserId};
use serde::{Deserialize, Serialize};

/// Body of `POST /api/events`.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OpenEventRequest {
    /// Identifier to use; a random one is generated when absent.
    pub event_id: Option<EventId>,
    /// Seat limit; absent or `null` means unbounded.
    pub capacity: Option<u32>,
}

/// Body of `PUT /api/events/:id/capacity`.
#[derive(Debug, Deserialize)]
pub struct CapacityRequest {
    /// New seat limit; `null` means unbounded.
    pub capacity: Option<u32>,
}

/// Wire view of an event's attendance.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AttendanceView {
    /// The event
    pub event_id: EventId,
    /// Who opened it
    pub owner: UserId,
    /// Seat limit, `null` when unbounded
    pub capacity: Option<u32>,
    /// Registered users in registration order
    pub attendees: Vec<UserId>,
    /// `attendees.len()`
    pub attendees_count: u32,
    /// Free seats, `null` when unbounded
    pub remaining: Option<u32>,
}

impl From<&Attendance> for AttendanceView {
    fn from(attendance: &Attendance) -> Self {
        Self {
            event_id: attendance.event_id(),
            owner: attendance.owner(),
            capacity: attendance.capacity().limit(),
            attendees: attendance.attendees().to_vec(),
            attendees_count: attendance.count(),
            remaining: attendance.remaining(),
        }
    }
}

fn capacity_from(limit: Option<u32>) -> Capacity {
    limit.map_or(Capacity::Unbounded, Capacity::bounded)
}

/// Open a new event owned by the caller.
///
/// # Endpoint
///
/// ```text
/// POST /api/events
/// {"eventId": "...", "capacity": 50}
/// ```
///
/// # Errors
///
/// 409 if the id is taken, 503 if the store is unavailable.
pub async fn open_event(
    State(state): State<AppState>,
    Caller(owner): Caller,
    Json(request): Json<OpenEventRequest>,
) -> Result<(StatusCode, Json<AttendanceView>), AppError> {
    let event_id = request.event_id.unwrap_or_default();
    let attendance = state
        .service()
        .open_event(event_id, owner, capacity_from(request.capacity))
        .await?;

    Ok((StatusCode::CREATED, Json(AttendanceView::from(&attendance))))
}

/// Current attendance of an event.
///
/// # Endpoint
///
/// ```text
/// GET /api/events/:id/attendance
/// ```
///
/// # Errors
///
/// 404 if the event does not exist, 503 if the store is unavailable.
pub async fn attendance(
    State(state): State<AppState>,
    Path(event_id): Path<EventId>,
) -> Result<Json<AttendanceView>, AppError> {
    let attendance = state
        .service()
        .attendance(event_id)
        .await?
        .ok_or_else(|| AppError::not_found("Event", event_id))?;

    Ok(Json(AttendanceView::from(&attendance)))
}

/// Change an event's capacity. Owner only.
///
/// # Endpoint
///
/// ```text
/// PUT /api/events/:id/capacity
/// {"capacity": 10}
/// ```
///
/// # Errors
///
/// 403 for a non-owner, 409 when more users are registered than the new
/// bound, 404 for an unknown event, 503 if the store is unavailable.
pub async fn set_capacity(
    State(state): State<AppState>,
    Caller(requester): Caller,
    Path(event_id): Path<EventId>,
    Json(request): Json<CapacityRequest>,
) -> Result<Json<AttendanceView>, AppError> {
    let change = state
        .service()
        .set_capacity(event_id, requester, capacity_from(request.capacity))
        .await?;

    match change {
        CapacityChange::Changed(attendance) => Ok(Json(AttendanceView::from(&attendance))),
        CapacityChange::NotOwner => Err(AppError::forbidden(
            "Only the event owner can change its capacity",
        )),
        CapacityChange::BelowAttendance { attendees_count } => Err(AppError::conflict(
            format!("{attendees_count} users are registered, capacity cannot go below that"),
            "BELOW_ATTENDANCE",
        )),
        CapacityChange::NotFound => Err(AppError::not_found("Event", event_id)),
    }
}

/// Delete an event and its attendee list. Owner only.
///
/// # Endpoint
///
/// ```text
/// DELETE /api/events/:id
/// ```
///
/// # Errors
///
/// 403 for a non-owner, 404 for an unknown event, 503 if the store is
/// unavailable.
pub async fn close_event(
    State(state): State<AppState>,
    Caller(requester): Caller,
    Path(event_id): Path<EventId>,
) -> Result<StatusCode, AppError> {
    match state.service().close_event(event_id, requester).await? {
        CloseOutcome::Closed => Ok(StatusCode::NO_CONTENT),
        CloseOutcome::NotOwner => Err(AppError::forbidden("Only the event owner can close it")),
        CloseOutcome::NotFound => Err(AppError::not_found("Event", event_id)),
    }
}
