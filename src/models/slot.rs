use chrono::{DateTime, Duration, NaiveDate, Utc};
use serde::Serialize;

use crate::error::{AppError, Result};

/// Longest slot the generator accepts, one full day.
pub const MAX_SLOT_MINUTES: u32 = 24 * 60;

/// A fixed-length candidate appointment interval.
///
/// Slots are only built through [`TimeSlot::new`], so `end` is always
/// `start + duration`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct TimeSlot {
    start: DateTime<Utc>,
    end: DateTime<Utc>,
}

impl TimeSlot {
    pub fn new(start: DateTime<Utc>, duration: Duration) -> Self {
        Self {
            start,
            end: start + duration,
        }
    }

    pub fn start(&self) -> DateTime<Utc> {
        self.start
    }

    pub fn end(&self) -> DateTime<Utc> {
        self.end
    }

    pub fn duration(&self) -> Duration {
        self.end - self.start
    }
}

/// An existing calendar commitment that blocks availability.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BusyInterval {
    start: DateTime<Utc>,
    end: DateTime<Utc>,
}

impl BusyInterval {
    /// Intervals that end at or before their start are malformed and rejected.
    pub fn new(start: DateTime<Utc>, end: DateTime<Utc>) -> Result<Self> {
        if end <= start {
            return Err(AppError::InvalidInput(format!(
                "Busy interval ends ({}) at or before it starts ({})",
                end, start
            )));
        }
        Ok(Self { start, end })
    }

    pub fn start(&self) -> DateTime<Utc> {
        self.start
    }

    pub fn end(&self) -> DateTime<Utc> {
        self.end
    }
}

/// Inputs of a single availability computation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AvailabilityRequest {
    pub date: NaiveDate,
    duration_minutes: u32,
    pub now: DateTime<Utc>,
}

impl AvailabilityRequest {
    pub fn new(date: NaiveDate, duration_minutes: u32, now: DateTime<Utc>) -> Result<Self> {
        validate_duration(duration_minutes)?;
        Ok(Self {
            date,
            duration_minutes,
            now,
        })
    }

    pub fn duration_minutes(&self) -> u32 {
        self.duration_minutes
    }

    pub fn duration(&self) -> Duration {
        Duration::minutes(i64::from(self.duration_minutes))
    }
}

pub fn validate_duration(duration_minutes: u32) -> Result<()> {
    if duration_minutes == 0 || duration_minutes > MAX_SLOT_MINUTES {
        return Err(AppError::InvalidInput(format!(
            "Slot duration must be between 1 and {} minutes, got {}",
            MAX_SLOT_MINUTES, duration_minutes
        )));
    }
    Ok(())
}

/// Slots left after conflict filtering, plus whether the calendar was consulted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AvailabilityResult {
    pub slots: Vec<TimeSlot>,
    pub calendar_checked: bool,
}

// Wire format of the availability endpoint
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AvailabilityResponse {
    pub available_slots: Vec<TimeSlot>,
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    pub calendar_unavailable: bool,
}

impl From<AvailabilityResult> for AvailabilityResponse {
    fn from(result: AvailabilityResult) -> Self {
        Self {
            available_slots: result.slots,
            calendar_unavailable: !result.calendar_checked,
        }
    }
}
