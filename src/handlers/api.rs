use axum::{
    extract::{rejection::JsonRejection, Json as ExtractJson, Query, State},
    http::StatusCode,
    response::Json,
};
use chrono::{DateTime, NaiveDate, Utc};
use std::sync::Arc;
use tracing::{info, warn};

use crate::client::CalendarSource;
use crate::config::AppConfig;
use crate::error::{AppError, Result};
use crate::models::booking::{BookingConfirmation, BookingRequest};
use crate::models::common::DateQuery;
use crate::models::slot::AvailabilityResponse;
use crate::services::availability::compute_availability;
use crate::services::booking::{book_appointment as confirm_booking, BookingContext};
use crate::services::booking_log::BookingLog;
use crate::services::notifier::Notifier;

// AppState struct containing shared resources
pub struct AppState {
    pub config: AppConfig,
    pub calendar: Arc<dyn CalendarSource>,
    pub notifier: Arc<dyn Notifier>,
    pub booking_log: Option<Arc<BookingLog>>,
    pub clock: fn() -> DateTime<Utc>,
}

impl AppState {
    pub fn now(&self) -> DateTime<Utc> {
        (self.clock)()
    }
}

fn parse_date(query: &DateQuery) -> Result<NaiveDate> {
    let raw = query
        .date
        .as_deref()
        .map(str::trim)
        .filter(|d| !d.is_empty())
        .ok_or_else(|| AppError::InvalidInput("Date parameter is required".to_string()))?;

    NaiveDate::parse_from_str(raw, "%Y-%m-%d").map_err(|_| {
        AppError::InvalidInput(format!("Invalid date '{}', expected YYYY-MM-DD", raw))
    })
}

// Available slots for a day
pub async fn get_availability(
    State(state): State<Arc<AppState>>,
    Query(query): Query<DateQuery>,
) -> Result<Json<AvailabilityResponse>> {
    let date = parse_date(&query)?;
    info!("Received availability request for {}", date);

    let result = compute_availability(
        state.calendar.as_ref(),
        &state.config.scheduling,
        date,
        state.now(),
    )
    .await?;

    Ok(Json(result.into()))
}

// Booking submission endpoint
pub async fn book_appointment(
    State(state): State<Arc<AppState>>,
    payload: std::result::Result<ExtractJson<BookingRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<BookingConfirmation>)> {
    let ExtractJson(request) = payload.map_err(|rejection| {
        warn!("Rejected booking payload: {}", rejection.body_text());
        AppError::InvalidInput(format!("Invalid booking request: {}", rejection.body_text()))
    })?;

    let ctx = BookingContext {
        calendar: state.calendar.as_ref(),
        notifier: state.notifier.as_ref(),
        booking_log: state.booking_log.as_deref(),
        scheduling: &state.config.scheduling,
        owner: &state.config.owner,
    };

    let confirmation = confirm_booking(&ctx, &request, state.now()).await?;
    Ok((StatusCode::CREATED, Json(confirmation)))
}
