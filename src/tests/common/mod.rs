use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, TimeZone, Utc};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use crate::client::{CalendarError, CalendarSource};
use crate::config::{
    AppConfig, BusinessHours, FallbackPolicy, GoogleConfig, OwnerContact, SchedulingConfig,
};
use crate::handlers::api::AppState;
use crate::models::calendar::{CalendarEvent, CreatedEvent, EventTime, NewCalendarEvent};
use crate::models::slot::BusyInterval;
use crate::services::booking_log::BookingLog;
use crate::services::notifier::{LogNotifier, Notifier};

pub const MEET_LINK: &str = "https://meet.google.com/abc-defg-hij";

pub fn utc(year: i32, month: u32, day: u32, hour: u32, minute: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(year, month, day, hour, minute, 0).unwrap()
}

pub fn date(year: i32, month: u32, day: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(year, month, day).unwrap()
}

/// "Now" used by router tests: early morning of 2024-06-10, UTC.
pub fn fixed_now() -> DateTime<Utc> {
    utc(2024, 6, 10, 6, 0)
}

pub fn scheduling(duration_minutes: u32) -> SchedulingConfig {
    SchedulingConfig {
        slot_duration_minutes: duration_minutes,
        business_hours: BusinessHours::new(9, 24).unwrap(),
        timezone: chrono_tz::Tz::UTC,
        fallback: FallbackPolicy::Fail,
        calendar_timeout: Duration::from_secs(5),
    }
}

pub fn test_config(fallback: FallbackPolicy) -> AppConfig {
    AppConfig {
        port: 0,
        scheduling: SchedulingConfig {
            fallback,
            ..scheduling(30)
        },
        google: GoogleConfig {
            client_id: None,
            client_secret: None,
            token_json: r#"{"access_token":"test"}"#.to_string(),
            calendar_id: "primary".to_string(),
            api_endpoint: "http://127.0.0.1:9".to_string(),
            token_endpoint: "http://127.0.0.1:9/token".to_string(),
        },
        owner: OwnerContact {
            name: Some("Jordan Example".to_string()),
            email: Some("owner@example.com".to_string()),
        },
        notify_webhook_url: None,
        booking_log_path: None,
    }
}

pub fn busy(start: DateTime<Utc>, end: DateTime<Utc>) -> BusyInterval {
    BusyInterval::new(start, end).unwrap()
}

pub fn event(id: &str, start: DateTime<Utc>, end: DateTime<Utc>) -> CalendarEvent {
    CalendarEvent {
        id: Some(id.to_string()),
        status: Some("confirmed".to_string()),
        transparency: None,
        start: Some(EventTime::at(start)),
        end: Some(EventTime::at(end)),
    }
}

pub fn app_state(
    config: AppConfig,
    calendar: Arc<dyn CalendarSource>,
    notifier: Arc<dyn Notifier>,
    booking_log: Option<Arc<BookingLog>>,
) -> Arc<AppState> {
    Arc::new(AppState {
        config,
        calendar,
        notifier,
        booking_log,
        clock: fixed_now,
    })
}

pub fn log_notifier() -> Arc<dyn Notifier> {
    Arc::new(LogNotifier)
}

/// In-memory calendar: inserted events become busy for later listings.
#[derive(Default)]
pub struct FakeCalendar {
    events: Mutex<Vec<CalendarEvent>>,
    inserted: Mutex<Vec<NewCalendarEvent>>,
}

impl FakeCalendar {
    pub fn with_events(events: Vec<CalendarEvent>) -> Self {
        Self {
            events: Mutex::new(events),
            inserted: Mutex::new(Vec::new()),
        }
    }

    pub fn inserted(&self) -> Vec<NewCalendarEvent> {
        self.inserted.lock().unwrap().clone()
    }
}

#[async_trait]
impl CalendarSource for FakeCalendar {
    async fn list_events(
        &self,
        time_min: DateTime<Utc>,
        time_max: DateTime<Utc>,
    ) -> Result<Vec<CalendarEvent>, CalendarError> {
        let events = self.events.lock().unwrap();
        Ok(events
            .iter()
            .filter(|event| {
                let start = event.start.as_ref().and_then(|t| t.date_time);
                let end = event.end.as_ref().and_then(|t| t.date_time);
                match (start, end) {
                    (Some(start), Some(end)) => start < time_max && end > time_min,
                    _ => true,
                }
            })
            .cloned()
            .collect())
    }

    async fn insert_event(&self, new_event: &NewCalendarEvent) -> Result<CreatedEvent, CalendarError> {
        let mut events = self.events.lock().unwrap();
        let id = format!("evt-{}", events.len() + 1);

        events.push(CalendarEvent {
            id: Some(id.clone()),
            status: Some("confirmed".to_string()),
            transparency: None,
            start: Some(new_event.start.clone()),
            end: Some(new_event.end.clone()),
        });
        self.inserted.lock().unwrap().push(new_event.clone());

        Ok(CreatedEvent {
            id,
            status: Some("confirmed".to_string()),
            html_link: Some("https://calendar.google.com/event?eid=test".to_string()),
            hangout_link: Some(MEET_LINK.to_string()),
        })
    }

    async fn check_access(&self) -> Result<bool, CalendarError> {
        Ok(true)
    }
}
