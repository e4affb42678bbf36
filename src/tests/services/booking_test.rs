use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use reqwest::StatusCode;
use std::sync::Mutex;
use std::time::{Duration as StdDuration, Instant};
use tempfile::tempdir;

use crate::client::{CalendarError, MockCalendarSource};
use crate::config::{FallbackPolicy, OwnerContact, SchedulingConfig};
use crate::error::AppError;
use crate::models::booking::BookingRequest;
use crate::models::calendar::CreatedEvent;
use crate::services::booking::{book_appointment, BookingContext};
use crate::services::booking_log::BookingLog;
use crate::services::notifier::{MockNotifier, Notice, Notifier, NotifyError};
use crate::tests::common::{event, scheduling, utc, MEET_LINK};

#[derive(Default)]
struct RecordingNotifier {
    sent: Mutex<Vec<Notice>>,
}

impl RecordingNotifier {
    fn sent(&self) -> Vec<Notice> {
        self.sent.lock().unwrap().clone()
    }
}

#[async_trait]
impl Notifier for RecordingNotifier {
    async fn send(&self, notice: &Notice) -> Result<(), NotifyError> {
        self.sent.lock().unwrap().push(notice.clone());
        Ok(())
    }
}

// Relay that never answers
struct StalledNotifier;

#[async_trait]
impl Notifier for StalledNotifier {
    async fn send(&self, _notice: &Notice) -> Result<(), NotifyError> {
        tokio::time::sleep(StdDuration::from_secs(60)).await;
        Ok(())
    }
}

fn owner() -> OwnerContact {
    OwnerContact {
        name: Some("Jordan Example".to_string()),
        email: Some("owner@example.com".to_string()),
    }
}

fn request(start: DateTime<Utc>, end: DateTime<Utc>) -> BookingRequest {
    BookingRequest {
        name: Some("Ada Lovelace".to_string()),
        email: Some("ada@example.com".to_string()),
        subject: Some("Project chat".to_string()),
        description: Some("Talk about the analytical engine".to_string()),
        start_time: Some(start),
        end_time: Some(end),
    }
}

fn ten_o_clock() -> BookingRequest {
    request(utc(2024, 6, 10, 10, 0), utc(2024, 6, 10, 10, 30))
}

fn created(id: &str) -> CreatedEvent {
    CreatedEvent {
        id: id.to_string(),
        status: Some("confirmed".to_string()),
        html_link: Some(format!("https://calendar.google.com/event?eid={}", id)),
        hangout_link: Some(MEET_LINK.to_string()),
    }
}

fn before_the_day() -> DateTime<Utc> {
    utc(2024, 6, 1, 0, 0)
}

fn context<'a>(
    calendar: &'a MockCalendarSource,
    notifier: &'a dyn Notifier,
    booking_log: Option<&'a BookingLog>,
    scheduling: &'a SchedulingConfig,
    owner: &'a OwnerContact,
) -> BookingContext<'a> {
    BookingContext {
        calendar,
        notifier,
        booking_log,
        scheduling,
        owner,
    }
}

#[tokio::test]
async fn test_book_free_slot() {
    let mut calendar = MockCalendarSource::new();
    calendar
        .expect_list_events()
        .withf(|from, to| *from == utc(2024, 6, 10, 10, 0) && *to == utc(2024, 6, 10, 10, 30))
        .times(1)
        .returning(|_, _| Ok(Vec::new()));
    calendar
        .expect_insert_event()
        .withf(|event| {
            event.summary == "Project chat"
                && event.description == "Talk about the analytical engine"
                && event.start.date_time == Some(utc(2024, 6, 10, 10, 0))
                && event.end.date_time == Some(utc(2024, 6, 10, 10, 30))
                && event.attendees.len() == 1
                && event.attendees[0].email == "ada@example.com"
                && event.conference_data.create_request.conference_solution_key.type_ == "hangoutsMeet"
                && event.conference_data.create_request.request_id.len() == 32
        })
        .times(1)
        .returning(|_| Ok(created("evt-1")));

    let notifier = RecordingNotifier::default();
    let config = scheduling(30);
    let owner = owner();
    let ctx = context(&calendar, &notifier, None, &config, &owner);

    let confirmation = book_appointment(&ctx, &ten_o_clock(), before_the_day())
        .await
        .unwrap();

    assert_eq!(confirmation.message, "Appointment created successfully");
    assert_eq!(confirmation.appointment.id, "evt-1");
    assert_eq!(confirmation.appointment.summary, "Project chat");
    assert_eq!(confirmation.appointment.start, utc(2024, 6, 10, 10, 0));
    assert_eq!(confirmation.appointment.end, utc(2024, 6, 10, 10, 30));
    assert_eq!(confirmation.appointment.meet_link.as_deref(), Some(MEET_LINK));

    let mut recipients: Vec<String> = notifier.sent().into_iter().map(|n| n.to).collect();
    recipients.sort();
    assert_eq!(recipients, vec!["ada@example.com", "owner@example.com"]);
}

#[tokio::test]
async fn test_booking_without_description_gets_default() {
    let mut calendar = MockCalendarSource::new();
    calendar.expect_list_events().returning(|_, _| Ok(Vec::new()));
    calendar
        .expect_insert_event()
        .withf(|event| event.description == "Appointment with Ada Lovelace")
        .times(1)
        .returning(|_| Ok(created("evt-2")));

    let notifier = RecordingNotifier::default();
    let config = scheduling(30);
    let owner = owner();
    let ctx = context(&calendar, &notifier, None, &config, &owner);

    let mut req = ten_o_clock();
    req.description = Some("   ".to_string());

    let confirmation = book_appointment(&ctx, &req, before_the_day()).await.unwrap();
    assert_eq!(confirmation.appointment.id, "evt-2");
}

#[tokio::test]
async fn test_conflicting_slot_is_rejected() {
    let mut calendar = MockCalendarSource::new();
    calendar.expect_list_events().times(1).returning(|_, _| {
        Ok(vec![event(
            "taken",
            utc(2024, 6, 10, 10, 15),
            utc(2024, 6, 10, 10, 45),
        )])
    });
    calendar.expect_insert_event().never();

    let mut notifier = MockNotifier::new();
    notifier.expect_send().never();

    let config = scheduling(30);
    let owner = owner();
    let ctx = context(&calendar, &notifier, None, &config, &owner);

    let result = book_appointment(&ctx, &ten_o_clock(), before_the_day()).await;

    let err = result.unwrap_err();
    assert!(matches!(err, AppError::SlotUnavailable));
    assert_eq!(err.status(), StatusCode::CONFLICT);
}

#[tokio::test]
async fn test_adjacent_event_does_not_block() {
    let mut calendar = MockCalendarSource::new();
    calendar.expect_list_events().returning(|_, _| {
        Ok(vec![
            event("before", utc(2024, 6, 10, 9, 30), utc(2024, 6, 10, 10, 0)),
            event("after", utc(2024, 6, 10, 10, 30), utc(2024, 6, 10, 11, 0)),
        ])
    });
    calendar
        .expect_insert_event()
        .times(1)
        .returning(|_| Ok(created("evt-3")));

    let notifier = RecordingNotifier::default();
    let config = scheduling(30);
    let owner = owner();
    let ctx = context(&calendar, &notifier, None, &config, &owner);

    assert!(book_appointment(&ctx, &ten_o_clock(), before_the_day())
        .await
        .is_ok());
}

#[tokio::test]
async fn test_invalid_requests_never_reach_the_calendar() {
    let calendar = MockCalendarSource::new();
    let notifier = RecordingNotifier::default();
    let config = scheduling(30);
    let owner = owner();
    let ctx = context(&calendar, &notifier, None, &config, &owner);

    let mut missing_name = ten_o_clock();
    missing_name.name = None;

    let mut missing_end = ten_o_clock();
    missing_end.end_time = None;

    let mut bad_email = ten_o_clock();
    bad_email.email = Some("not-an-email".to_string());

    let inverted = request(utc(2024, 6, 10, 10, 30), utc(2024, 6, 10, 10, 0));
    let off_grid = request(utc(2024, 6, 10, 10, 10), utc(2024, 6, 10, 10, 40));
    let wrong_length = request(utc(2024, 6, 10, 10, 0), utc(2024, 6, 10, 11, 0));
    let before_hours = request(utc(2024, 6, 10, 8, 0), utc(2024, 6, 10, 8, 30));

    for req in [
        missing_name,
        missing_end,
        bad_email,
        inverted,
        off_grid,
        wrong_length,
        before_hours,
    ] {
        let result = book_appointment(&ctx, &req, before_the_day()).await;
        assert!(
            matches!(result, Err(AppError::InvalidInput(_))),
            "expected invalid input for {:?}",
            req
        );
    }

    assert!(notifier.sent().is_empty());
}

#[tokio::test]
async fn test_missing_fields_message_lists_them() {
    let calendar = MockCalendarSource::new();
    let notifier = RecordingNotifier::default();
    let config = scheduling(30);
    let owner = owner();
    let ctx = context(&calendar, &notifier, None, &config, &owner);

    let err = book_appointment(&ctx, &BookingRequest::default(), before_the_day())
        .await
        .unwrap_err();

    assert_eq!(err.code(), "invalid_input");
    assert!(err.to_string().contains("name, email, subject, startTime, and endTime"));
}

#[tokio::test]
async fn test_slot_in_the_past_is_rejected() {
    let calendar = MockCalendarSource::new();
    let notifier = RecordingNotifier::default();
    let config = scheduling(30);
    let owner = owner();
    let ctx = context(&calendar, &notifier, None, &config, &owner);

    let result = book_appointment(&ctx, &ten_o_clock(), utc(2024, 6, 10, 12, 0)).await;
    assert!(matches!(result, Err(AppError::InvalidInput(_))));
}

#[tokio::test]
async fn test_slot_on_last_representable_day_is_rejected() {
    let calendar = MockCalendarSource::new();
    let notifier = RecordingNotifier::default();
    let config = scheduling(30);
    let owner = owner();
    let ctx = context(&calendar, &notifier, None, &config, &owner);

    let start = NaiveDate::MAX.and_hms_opt(10, 0, 0).unwrap().and_utc();
    let end = NaiveDate::MAX.and_hms_opt(10, 30, 0).unwrap().and_utc();

    let result = book_appointment(&ctx, &request(start, end), before_the_day()).await;
    assert!(matches!(result, Err(AppError::InvalidInput(_))));
}

#[tokio::test]
async fn test_notification_failure_does_not_fail_booking() {
    let mut calendar = MockCalendarSource::new();
    calendar.expect_list_events().returning(|_, _| Ok(Vec::new()));
    calendar
        .expect_insert_event()
        .returning(|_| Ok(created("evt-4")));

    let mut notifier = MockNotifier::new();
    notifier
        .expect_send()
        .times(2)
        .returning(|_| Err(NotifyError::Delivery("smtp down".to_string())));

    let config = scheduling(30);
    let owner = owner();
    let ctx = context(&calendar, &notifier, None, &config, &owner);

    let confirmation = book_appointment(&ctx, &ten_o_clock(), before_the_day())
        .await
        .unwrap();
    assert_eq!(confirmation.appointment.id, "evt-4");
}

#[tokio::test]
async fn test_stalled_notifier_does_not_hold_the_booking() {
    let mut calendar = MockCalendarSource::new();
    calendar.expect_list_events().returning(|_, _| Ok(Vec::new()));
    calendar
        .expect_insert_event()
        .times(1)
        .returning(|_| Ok(created("evt-7")));

    let mut config = scheduling(30);
    config.calendar_timeout = StdDuration::from_millis(50);
    let owner = owner();
    let ctx = context(&calendar, &StalledNotifier, None, &config, &owner);

    let started = Instant::now();
    let confirmation = book_appointment(&ctx, &ten_o_clock(), before_the_day())
        .await
        .unwrap();

    assert_eq!(confirmation.appointment.id, "evt-7");
    assert!(started.elapsed() < StdDuration::from_secs(5));
}

#[tokio::test]
async fn test_owner_without_email_only_notifies_requester() {
    let mut calendar = MockCalendarSource::new();
    calendar.expect_list_events().returning(|_, _| Ok(Vec::new()));
    calendar
        .expect_insert_event()
        .returning(|_| Ok(created("evt-5")));

    let mut notifier = MockNotifier::new();
    notifier
        .expect_send()
        .withf(|notice| notice.to == "ada@example.com")
        .times(1)
        .returning(|_| Ok(()));

    let config = scheduling(30);
    let owner = OwnerContact::default();
    let ctx = context(&calendar, &notifier, None, &config, &owner);

    assert!(book_appointment(&ctx, &ten_o_clock(), before_the_day())
        .await
        .is_ok());
}

#[tokio::test]
async fn test_insert_failure_is_upstream_error() {
    let mut calendar = MockCalendarSource::new();
    calendar.expect_list_events().returning(|_, _| Ok(Vec::new()));
    calendar.expect_insert_event().returning(|_| {
        Err(CalendarError::Status {
            status: StatusCode::FORBIDDEN,
            body: "insufficient permissions".to_string(),
        })
    });

    let mut notifier = MockNotifier::new();
    notifier.expect_send().never();

    let config = scheduling(30);
    let owner = owner();
    let ctx = context(&calendar, &notifier, None, &config, &owner);

    let err = book_appointment(&ctx, &ten_o_clock(), before_the_day())
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::UpstreamUnavailable(_)));
    assert_eq!(err.status(), StatusCode::BAD_GATEWAY);
}

#[tokio::test]
async fn test_recheck_failure_is_never_ignored() {
    let mut calendar = MockCalendarSource::new();
    calendar.expect_list_events().returning(|_, _| {
        Err(CalendarError::Status {
            status: StatusCode::SERVICE_UNAVAILABLE,
            body: String::new(),
        })
    });
    calendar.expect_insert_event().never();

    let notifier = RecordingNotifier::default();
    let mut config = scheduling(30);
    config.fallback = FallbackPolicy::Unfiltered;
    let owner = owner();
    let ctx = context(&calendar, &notifier, None, &config, &owner);

    let result = book_appointment(&ctx, &ten_o_clock(), before_the_day()).await;
    assert!(matches!(result, Err(AppError::UpstreamUnavailable(_))));
}

#[tokio::test]
async fn test_confirmed_booking_is_logged() {
    let dir = tempdir().unwrap();
    let log = BookingLog::new(dir.path().join("bookings.csv")).unwrap();

    let mut calendar = MockCalendarSource::new();
    calendar.expect_list_events().returning(|_, _| Ok(Vec::new()));
    calendar
        .expect_insert_event()
        .returning(|_| Ok(created("evt-6")));

    let notifier = RecordingNotifier::default();
    let config = scheduling(30);
    let owner = owner();
    let ctx = context(&calendar, &notifier, Some(&log), &config, &owner);

    book_appointment(&ctx, &ten_o_clock(), before_the_day())
        .await
        .unwrap();

    let record = log.find_by_event_id("evt-6").unwrap().unwrap();
    assert_eq!(record.email, "ada@example.com");
    assert_eq!(record.start_time, "2024-06-10T10:00:00+00:00");
    assert_eq!(record.meet_link, MEET_LINK);
    assert_eq!(record.created_at, before_the_day().to_rfc3339());
}
