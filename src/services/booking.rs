use chrono::{DateTime, Utc};
use rand::RngCore;
use tracing::{debug, error, info, warn};

use crate::client::CalendarSource;
use crate::config::{OwnerContact, SchedulingConfig};
use crate::error::{AppError, Result};
use crate::models::booking::{Appointment, BookingConfirmation, BookingRequest, ValidatedBooking};
use crate::models::calendar::NewCalendarEvent;
use crate::models::slot::AvailabilityRequest;
use crate::services::availability::{fetch_busy_intervals, find_conflict};
use crate::services::booking_log::{BookingLog, BookingRecord};
use crate::services::notifier::{owner_notice, requester_notice, Notifier};
use crate::services::time_slots::{generate_candidate_slots, local_date};

/// Collaborators a booking needs besides the request itself.
pub struct BookingContext<'a> {
    pub calendar: &'a dyn CalendarSource,
    pub notifier: &'a dyn Notifier,
    pub booking_log: Option<&'a BookingLog>,
    pub scheduling: &'a SchedulingConfig,
    pub owner: &'a OwnerContact,
}

// Random id that lets the calendar deduplicate conference creation
fn conference_request_id() -> String {
    let mut bytes = [0u8; 16];
    rand::thread_rng().fill_bytes(&mut bytes);
    hex::encode(bytes)
}

// The booking must name a slot the generator offers right now for its local day.
fn ensure_offered(booking: &ValidatedBooking, config: &SchedulingConfig, now: DateTime<Utc>) -> Result<()> {
    let date = local_date(config.timezone, booking.slot.start());
    let request = AvailabilityRequest::new(date, config.slot_duration_minutes, now)?;
    let offered = generate_candidate_slots(&request, &config.business_hours, config.timezone)?;

    if offered.contains(&booking.slot) {
        return Ok(());
    }

    debug!(
        "Requested {} - {} is not among the {} slots offered for {}",
        booking.slot.start(),
        booking.slot.end(),
        offered.len(),
        date
    );
    Err(AppError::InvalidInput(
        "The requested time is not a bookable slot".to_string(),
    ))
}

/// Confirm a booking.
///
/// The slot is validated, re-checked against a fresh read of the calendar
/// and then inserted. A conflict found by the re-check is reported as
/// [`AppError::SlotUnavailable`] and is not retried. Notices and the booking
/// log are written afterwards; their failures never fail the booking.
pub async fn book_appointment(
    ctx: &BookingContext<'_>,
    request: &BookingRequest,
    now: DateTime<Utc>,
) -> Result<BookingConfirmation> {
    let booking = request.validate()?;
    ensure_offered(&booking, ctx.scheduling, now)?;

    info!(
        "Booking request from {} for {} - {}",
        booking.email,
        booking.slot.start(),
        booking.slot.end()
    );

    let busy = fetch_busy_intervals(
        ctx.calendar,
        ctx.scheduling,
        booking.slot.start(),
        booking.slot.end(),
    )
    .await?;

    if let Some(conflict) = find_conflict(&booking.slot, &busy) {
        warn!(
            "Slot {} - {} was taken by an event from {} to {}",
            booking.slot.start(),
            booking.slot.end(),
            conflict.start(),
            conflict.end()
        );
        return Err(AppError::SlotUnavailable);
    }

    let event = NewCalendarEvent::with_meet_link(
        booking.subject.clone(),
        booking
            .description
            .clone()
            .unwrap_or_else(|| format!("Appointment with {}", booking.name)),
        booking.slot.start(),
        booking.slot.end(),
        booking.email.clone(),
        conference_request_id(),
    );

    let created = tokio::time::timeout(
        ctx.scheduling.calendar_timeout,
        ctx.calendar.insert_event(&event),
    )
    .await
    .map_err(|_| AppError::UpstreamTimeout)?
    .map_err(|e| {
        error!("Failed to create appointment: {}", e);
        AppError::from(e)
    })?;

    info!("Created calendar event {} for {}", created.id, booking.email);

    let appointment = Appointment {
        id: created.id,
        summary: booking.subject.clone(),
        start: booking.slot.start(),
        end: booking.slot.end(),
        meet_link: created.hangout_link,
        html_link: created.html_link,
    };

    send_notices(ctx, &booking, &appointment).await;
    record_booking(ctx.booking_log, &booking, &appointment, now);

    Ok(BookingConfirmation {
        message: "Appointment created successfully".to_string(),
        appointment,
    })
}

async fn send_notices(ctx: &BookingContext<'_>, booking: &ValidatedBooking, appointment: &Appointment) {
    let tz = ctx.scheduling.timezone;
    let to_requester = requester_notice(booking, appointment, ctx.owner, tz);
    let to_owner = owner_notice(booking, appointment, ctx.owner, tz);

    let owner_delivery = async {
        match &to_owner {
            Some(notice) => ctx.notifier.send(notice).await,
            None => Ok(()),
        }
    };

    let delivery = async { futures::join!(ctx.notifier.send(&to_requester), owner_delivery) };

    let Ok((requester_result, owner_result)) =
        tokio::time::timeout(ctx.scheduling.calendar_timeout, delivery).await
    else {
        warn!(
            "Notices for appointment {} not delivered within {:?}",
            appointment.id, ctx.scheduling.calendar_timeout
        );
        return;
    };

    if let Err(e) = requester_result {
        warn!("Could not notify {}: {}", to_requester.to, e);
    }
    if let Err(e) = owner_result {
        warn!("Could not notify the owner: {}", e);
    }
}

fn record_booking(
    log: Option<&BookingLog>,
    booking: &ValidatedBooking,
    appointment: &Appointment,
    now: DateTime<Utc>,
) {
    if let Some(log) = log {
        if let Err(e) = log.append(&BookingRecord::new(booking, appointment, now)) {
            error!("Failed to store booking record: {}", e);
        }
    }
}
