use async_trait::async_trait;
use chrono_tz::Tz;
use reqwest::Client;
use serde::Serialize;
use thiserror::Error;
use tracing::info;

use crate::config::OwnerContact;
use crate::models::booking::{Appointment, ValidatedBooking};

#[derive(Debug, Error)]
pub enum NotifyError {
    #[error("Notification delivery failed: {0}")]
    Delivery(String),
}

/// A message to one recipient about a booking.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Notice {
    pub to: String,
    pub subject: String,
    pub body: String,
}

/// Delivers booking notices. Delivery is best-effort; callers log failures.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn send(&self, notice: &Notice) -> Result<(), NotifyError>;
}

/// Notifier that only writes notices to the log
pub struct LogNotifier;

#[async_trait]
impl Notifier for LogNotifier {
    async fn send(&self, notice: &Notice) -> Result<(), NotifyError> {
        info!("Notice for {}: {}", notice.to, notice.subject);
        Ok(())
    }
}

/// Notifier that POSTs each notice as JSON to a relay endpoint
pub struct WebhookNotifier {
    client: Client,
    url: String,
}

impl WebhookNotifier {
    pub fn new(client: Client, url: String) -> Self {
        Self { client, url }
    }
}

#[async_trait]
impl Notifier for WebhookNotifier {
    async fn send(&self, notice: &Notice) -> Result<(), NotifyError> {
        let res = self
            .client
            .post(&self.url)
            .json(notice)
            .send()
            .await
            .map_err(|e| NotifyError::Delivery(e.to_string()))?;

        if !res.status().is_success() {
            return Err(NotifyError::Delivery(format!(
                "relay returned {}",
                res.status()
            )));
        }

        info!("Delivered notice '{}' to {}", notice.subject, notice.to);
        Ok(())
    }
}

// Date, time range and meeting link, in the owner's time zone
fn schedule_lines(appointment: &Appointment, tz: Tz) -> String {
    let start = appointment.start.with_timezone(&tz);
    let end = appointment.end.with_timezone(&tz);

    let mut lines = format!(
        "Date: {}\nTime: {} - {} ({})\n",
        start.format("%A, %B %-d, %Y"),
        start.format("%H:%M"),
        end.format("%H:%M"),
        tz.name(),
    );
    if let Some(link) = &appointment.meet_link {
        lines.push_str(&format!("Meeting link: {}\n", link));
    }
    lines
}

/// Confirmation sent to the person who booked.
pub fn requester_notice(
    booking: &ValidatedBooking,
    appointment: &Appointment,
    owner: &OwnerContact,
    tz: Tz,
) -> Notice {
    Notice {
        to: booking.email.clone(),
        subject: format!("Appointment Confirmation: {}", booking.subject),
        body: format!(
            "Hello {},\n\nYour appointment has been scheduled successfully.\n\nSubject: {}\n{}\nBest regards,\n{}\n",
            booking.name,
            booking.subject,
            schedule_lines(appointment, tz),
            owner.display_name()
        ),
    }
}

/// Notice sent to the site owner, if an owner address is configured.
pub fn owner_notice(
    booking: &ValidatedBooking,
    appointment: &Appointment,
    owner: &OwnerContact,
    tz: Tz,
) -> Option<Notice> {
    let to = owner.email.clone()?;

    let mut body = format!(
        "Hello {},\n\nA new appointment has been scheduled with you.\n\nContact: {} ({})\nSubject: {}\n{}",
        owner.display_name(),
        booking.name,
        booking.email,
        booking.subject,
        schedule_lines(appointment, tz)
    );
    if let Some(description) = &booking.description {
        body.push_str(&format!("\nDescription:\n{}\n", description));
    }

    Some(Notice {
        to,
        subject: format!("New Appointment: {}", booking.subject),
        body,
    })
}
