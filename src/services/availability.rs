use chrono::{DateTime, NaiveDate, Utc};
use chrono_tz::Tz;
use tracing::{debug, info, warn};

use crate::client::CalendarSource;
use crate::config::{FallbackPolicy, SchedulingConfig};
use crate::error::{AppError, Result};
use crate::models::calendar::{CalendarEvent, EventTime};
use crate::models::slot::{AvailabilityRequest, AvailabilityResult, BusyInterval, TimeSlot};
use crate::services::time_slots::{busy_window, generate_candidate_slots, start_of_day};

/// Whether `slot` collides with `busy`.
///
/// A slot conflicts when it starts inside the busy interval, ends inside it,
/// or fully contains it. Touching endpoints do not conflict.
pub fn overlaps(slot: &TimeSlot, busy: &BusyInterval) -> bool {
    let (s, e) = (slot.start(), slot.end());
    let (bs, be) = (busy.start(), busy.end());

    (s >= bs && s < be) || (e > bs && e <= be) || (s <= bs && e >= be)
}

/// First busy interval `slot` collides with, if any.
pub fn find_conflict<'a>(slot: &TimeSlot, busy: &'a [BusyInterval]) -> Option<&'a BusyInterval> {
    busy.iter().find(|interval| overlaps(slot, interval))
}

/// Keep only the slots that collide with none of `busy`, preserving order.
pub fn filter_available(candidates: Vec<TimeSlot>, busy: &[BusyInterval]) -> Vec<TimeSlot> {
    candidates
        .into_iter()
        .filter(|slot| find_conflict(slot, busy).is_none())
        .collect()
}

fn event_instant(time: &EventTime, tz: Tz) -> Option<DateTime<Utc>> {
    match (time.date_time, time.date) {
        (Some(instant), _) => Some(instant),
        (None, Some(date)) => Some(start_of_day(tz, date).with_timezone(&Utc)),
        (None, None) => None,
    }
}

/// Convert calendar events into busy intervals.
///
/// Cancelled and transparent events are skipped, as are events with missing
/// or inverted times. All-day events span local midnights in `tz`.
pub fn busy_intervals_from_events(events: &[CalendarEvent], tz: Tz) -> Vec<BusyInterval> {
    let mut intervals = Vec::with_capacity(events.len());

    for event in events {
        if event.is_cancelled() || event.is_transparent() {
            continue;
        }

        let start = event.start.as_ref().and_then(|t| event_instant(t, tz));
        let end = event.end.as_ref().and_then(|t| event_instant(t, tz));

        let (Some(start), Some(end)) = (start, end) else {
            warn!("Skipping calendar event {:?} without usable start/end", event.id);
            continue;
        };

        match BusyInterval::new(start, end) {
            Ok(interval) => intervals.push(interval),
            Err(e) => warn!("Skipping malformed calendar event {:?}: {}", event.id, e),
        }
    }

    intervals
}

/// Fetch the busy intervals between `from` and `to`, bounded by the calendar timeout.
pub async fn fetch_busy_intervals(
    calendar: &dyn CalendarSource,
    config: &SchedulingConfig,
    from: DateTime<Utc>,
    to: DateTime<Utc>,
) -> Result<Vec<BusyInterval>> {
    let events = tokio::time::timeout(config.calendar_timeout, calendar.list_events(from, to))
        .await
        .map_err(|_| AppError::UpstreamTimeout)??;

    let busy = busy_intervals_from_events(&events, config.timezone);
    debug!(
        "Calendar returned {} events between {} and {}, {} of them busy",
        events.len(),
        from,
        to,
        busy.len()
    );

    Ok(busy)
}

/// Compute the bookable slots of `date`.
///
/// Calendar failures follow `config.fallback`: either they are returned to
/// the caller, or the unfiltered candidates are returned with
/// `calendar_checked` unset.
pub async fn compute_availability(
    calendar: &dyn CalendarSource,
    config: &SchedulingConfig,
    date: NaiveDate,
    now: DateTime<Utc>,
) -> Result<AvailabilityResult> {
    let request = AvailabilityRequest::new(date, config.slot_duration_minutes, now)?;
    let candidates = generate_candidate_slots(&request, &config.business_hours, config.timezone)?;

    if candidates.is_empty() {
        info!("No candidate slots for {}", date);
        return Ok(AvailabilityResult {
            slots: candidates,
            calendar_checked: true,
        });
    }

    let (from, to) = busy_window(config.timezone, date, request.duration())?;

    match fetch_busy_intervals(calendar, config, from, to).await {
        Ok(busy) => {
            let slots = filter_available(candidates, &busy);
            info!("Found {} available slots for {}", slots.len(), date);
            Ok(AvailabilityResult {
                slots,
                calendar_checked: true,
            })
        }
        Err(e) if config.fallback == FallbackPolicy::Unfiltered => {
            warn!(
                "Calendar unavailable ({}), returning {} unfiltered slots for {}",
                e,
                candidates.len(),
                date
            );
            Ok(AvailabilityResult {
                slots: candidates,
                calendar_checked: false,
            })
        }
        Err(e) => Err(e),
    }
}
