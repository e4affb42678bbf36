//! Portfolio Booking Service
//!
//! Backend of the appointment feature of a portfolio site. It offers
//! bookable time slots for a day and turns a chosen slot into a Google
//! Calendar event with a Meet link.
//!
//! # Modules
//!
//! - `services::time_slots`: candidate slot generation for a day
//! - `services::availability`: overlap filtering against busy calendar events
//! - `services::booking`: booking confirmation with a last-moment conflict re-check
//! - `client`: the `CalendarSource` trait and its Google Calendar implementation
//! - `auth`: parsing of the stored OAuth token and per-request token refresh
//!
//! # Availability
//!
//! Slots are `MEETING_DURATION` minutes long and start within business hours
//! in the configured time zone. For the current day, slots begin at the next
//! slot boundary after "now". Any slot overlapping a busy calendar event is
//! removed; a slot that only touches an event at its start or end is kept.

pub mod auth;
pub mod client;
pub mod config;
pub mod error;
pub mod handlers;
pub mod models;
pub mod routes;
pub mod services;


// Re-export the main API types for ease of use
pub use client::{CalendarSource, GoogleCalendarClient};
pub use config::AppConfig;
pub use error::AppError;
pub use handlers::api::AppState;
pub use routes::create_router;
