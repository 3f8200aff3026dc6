//! HTTP request handlers.

pub mod events;
pub mod health;
pub mod registrations;

pub use health::health_check;
