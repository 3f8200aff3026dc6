//! Custom Axum extractors.
//!
//! - `Caller`: the verified user making the request, from `X-User-Id`
//! - `CorrelationId`: the request's correlation ID
//!
//! # Examples
//!
//! ```ignore
//! async fn handler(
//!     State(state): State<AppState>,
//!     Caller(user): Caller,
//!     correlation_id: CorrelationId,
//! ) -> Result<Json<RegistrationResult>, AppError> {
//!     tracing::info!(correlation_id = %correlation_id.0, user_id = %user, "Registering");
//!     ...
//! }
//! ```

use crate::error::AppError;
use crate::middleware::CORRELATION_ID_HEADER;
use axum::{async_trait, extract::FromRequestParts, http::request::Parts};
use rsvp_core::UserId;
use uuid::Uuid;

/// Header carrying the caller's identity.
///
/// Set by the authenticating proxy in front of this service; its value is
/// trusted as-is.
pub const USER_ID_HEADER: &str = "X-User-Id";

/// The user on whose behalf the request is made.
///
/// Rejects with 401 when `X-User-Id` is missing or not a UUID.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Caller(pub UserId);

#[async_trait]
impl<S> FromRequestParts<S> for Caller
where
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let header = parts
            .headers
            .get(USER_ID_HEADER)
            .ok_or_else(|| AppError::unauthorized(format!("Missing {USER_ID_HEADER} header")))?;

        header
            .to_str()
            .ok()
            .and_then(|value| value.parse::<UserId>().ok())
            .map(Self)
            .ok_or_else(|| AppError::unauthorized(format!("Malformed {USER_ID_HEADER} header")))
    }
}

/// Correlation ID for request tracing.
///
/// Prefers the ID stored by the correlation middleware, then the
/// `X-Correlation-ID` header, and generates a new UUID v4 otherwise.
#[derive(Debug, Clone, Copy)]
pub struct CorrelationId(pub Uuid);

#[async_trait]
impl<S> FromRequestParts<S> for CorrelationId
where
    S: Send + Sync,
{
    type Rejection = std::convert::Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        if let Some(id) = parts.extensions.get::<Self>() {
            return Ok(*id);
        }

        let correlation_id = parts
            .headers
            .get(CORRELATION_ID_HEADER)
            .and_then(|v| v.to_str().ok())
            .and_then(|s| Uuid::parse_str(s).ok())
            .unwrap_or_else(Uuid::new_v4);

        Ok(Self(correlation_id))
    }
}
