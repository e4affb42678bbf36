use chrono::{DateTime, Duration, NaiveDate, NaiveDateTime, NaiveTime, TimeZone, Timelike, Utc};
use chrono_tz::Tz;
use tracing::debug;

use crate::config::BusinessHours;
use crate::error::{AppError, Result};
use crate::models::slot::{AvailabilityRequest, TimeSlot};

// Resolve a local wall-clock time to an instant. Ambiguous times take the
// earliest instant; times inside a DST gap are pushed past the gap.
pub fn resolve_local(tz: Tz, naive: NaiveDateTime) -> DateTime<Tz> {
    if let Some(instant) = tz.from_local_datetime(&naive).earliest() {
        return instant;
    }

    naive
        .checked_add_signed(Duration::hours(1))
        .and_then(|later| tz.from_local_datetime(&later).earliest())
        .unwrap_or_else(|| tz.from_utc_datetime(&naive))
}

/// Midnight at the start of `date` in the reference zone.
pub fn start_of_day(tz: Tz, date: NaiveDate) -> DateTime<Tz> {
    resolve_local(tz, date.and_time(NaiveTime::MIN))
}

/// Last millisecond of `date` in the reference zone; the inclusive bound for slot starts.
///
/// `None` when the following midnight is past the last representable date.
pub fn end_of_day(tz: Tz, date: NaiveDate) -> Option<DateTime<Tz>> {
    let next_midnight = date
        .and_time(NaiveTime::MIN)
        .checked_add_signed(Duration::days(1))?;
    let naive = next_midnight.checked_sub_signed(Duration::milliseconds(1))?;
    match tz.from_local_datetime(&naive).latest() {
        Some(instant) => Some(instant),
        None => Some(resolve_local(tz, naive)),
    }
}

fn out_of_range(date: NaiveDate) -> AppError {
    AppError::InvalidInput(format!("Date {} is outside the supported range", date))
}

/// Window of calendar events that can affect the slots of `date`: the whole
/// day plus `duration` into the next one, for slots that cross midnight.
pub fn busy_window(
    tz: Tz,
    date: NaiveDate,
    duration: Duration,
) -> Result<(DateTime<Utc>, DateTime<Utc>)> {
    let from = start_of_day(tz, date);
    let next_day = date.succ_opt().ok_or_else(|| out_of_range(date))?;
    let to = start_of_day(tz, next_day)
        .checked_add_signed(duration)
        .ok_or_else(|| out_of_range(date))?;
    Ok((from.with_timezone(&Utc), to.with_timezone(&Utc)))
}

/// Round `instant` up so its minute is the next multiple of `duration_minutes`.
///
/// Seconds and sub-seconds are zeroed. An instant already on a boundary is
/// returned unchanged.
pub fn round_to_next_slot<Z: TimeZone>(instant: DateTime<Z>, duration_minutes: u32) -> DateTime<Z> {
    let remainder = instant.minute() % duration_minutes;
    let seconds = i64::from(instant.second());
    let nanos = i64::from(instant.nanosecond());

    if remainder == 0 && seconds == 0 && nanos == 0 {
        return instant;
    }

    let truncated = instant - Duration::seconds(seconds) - Duration::nanoseconds(nanos);
    truncated + Duration::minutes(i64::from(duration_minutes - remainder))
}

/// Enumerate every slot of `request.date` that starts within business hours.
///
/// When the date is today in `tz`, slots start at `now` rounded up to the next
/// boundary. Days before today produce nothing. The last slot of the day may
/// end after midnight. Slots follow each other at exactly the slot duration,
/// so every slot stays on the grid anchored at the first one.
///
/// Dates whose day cannot be represented in full are rejected as invalid input.
pub fn generate_candidate_slots(
    request: &AvailabilityRequest,
    hours: &BusinessHours,
    tz: Tz,
) -> Result<Vec<TimeSlot>> {
    let step = request.duration();
    let today = request.now.with_timezone(&tz).date_naive();

    if request.date < today {
        debug!("Requested date {} is before today ({}), no slots", request.date, today);
        return Ok(Vec::new());
    }

    let day_end = end_of_day(tz, request.date).ok_or_else(|| out_of_range(request.date))?;
    let first = if request.date == today {
        round_to_next_slot(request.now.with_timezone(&tz), request.duration_minutes())
    } else {
        start_of_day(tz, request.date)
    };

    let mut slots = Vec::new();
    let mut candidate = first;

    while candidate <= day_end {
        let Some(next) = candidate.checked_add_signed(step) else {
            break;
        };
        if hours.contains_hour(candidate.hour()) {
            slots.push(TimeSlot::new(candidate.with_timezone(&Utc), step));
        }
        candidate = next;
    }

    debug!(
        "Generated {} candidate slots of {} minutes for {}",
        slots.len(),
        request.duration_minutes(),
        request.date
    );

    Ok(slots)
}

/// The local calendar day on which `instant` falls.
pub fn local_date(tz: Tz, instant: DateTime<Utc>) -> NaiveDate {
    instant.with_timezone(&tz).date_naive()
}
