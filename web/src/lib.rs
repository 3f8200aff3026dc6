//! Axum HTTP surface for the RSVP ledger.
//!
//! Handlers are thin: extract the caller and path, call the
//! [`RegistrationService`](rsvp_runtime::RegistrationService), map the
//! structured outcome to a status code. Identity comes from the `X-User-Id`
//! header set by the authenticating proxy in front of this service.
//!
//! # Routes
//!
//! | Method   | Path                          | Handler                               |
//! |----------|-------------------------------|---------------------------------------|
//! | `POST`   | `/api/events`                 | [`handlers::events::open_event`]      |
//! | `GET`    | `/api/events/:id/attendance`  | [`handlers::events::attendance`]      |
//! | `PUT`    | `/api/events/:id/capacity`    | [`handlers::events::set_capacity`]    |
//! | `DELETE` | `/api/events/:id`             | [`handlers::events::close_event`]     |
//! | `POST`   | `/api/events/:id/register`    | [`handlers::registrations::register`] |
//! | `POST`   | `/api/events/:id/unregister`  | [`handlers::registrations::unregister`] |
//! | `GET`    | `/health`                     | [`handlers::health::health_check`]    |
//! | `GET`    | `/ready`                      | [`handlers::health::readiness`]       |
//! | `GET`    | `/metrics`                    | [`handlers::health::metrics`]         |
//!
//! # Example
//!
//! ```ignore
//! use rsvp_web::{AppState, build_router};
//!
//! let app = build_router(AppState::new(service).with_metrics(exporter));
//! axum::serve(listener, app).await?;
//! ```

pub mod error;
pub mod extractors;
pub mod handlers;
pub mod middleware;
pub mod state;

pub use error::AppError;
pub use extractors::{Caller, CorrelationId, USER_ID_HEADER};
pub use middleware::{CORRELATION_ID_HEADER, correlation_id_layer};
pub use state::AppState;

use axum::{
    Router,
    routing::{delete, get, post, put},
};
use tower_http::trace::TraceLayer;

/// Build the application router over `state`.
pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/api/events", post(handlers::events::open_event))
        .route("/api/events/:id", delete(handlers::events::close_event))
        .route(
            "/api/events/:id/attendance",
            get(handlers::events::attendance),
        )
        .route(
            "/api/events/:id/capacity",
            put(handlers::events::set_capacity),
        )
        .route(
            "/api/events/:id/register",
            post(handlers::registrations::register),
        )
        .route(
            "/api/events/:id/unregister",
            post(handlers::registrations::unregister),
        )
        .route("/health", get(handlers::health::health_check))
        .route("/ready", get(handlers::health::readiness))
        .route("/metrics", get(handlers::health::metrics))
        .with_state(state)
        .layer(TraceLayer::new_for_http())
        .layer(correlation_id_layer())
}
