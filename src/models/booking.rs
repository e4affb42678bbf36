use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{AppError, Result};
use crate::models::slot::TimeSlot;

/// Booking form as submitted by the site visitor.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BookingRequest {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub subject: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub start_time: Option<DateTime<Utc>>,
    #[serde(default)]
    pub end_time: Option<DateTime<Utc>>,
}

/// A booking request whose fields have all been checked.
#[derive(Debug, Clone, PartialEq)]
pub struct ValidatedBooking {
    pub name: String,
    pub email: String,
    pub subject: String,
    pub description: Option<String>,
    pub slot: TimeSlot,
}

fn required(value: &Option<String>) -> Option<String> {
    value
        .as_deref()
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
}

fn looks_like_email(email: &str) -> bool {
    if email.contains(char::is_whitespace) {
        return false;
    }

    match email.split_once('@') {
        Some((local, domain)) => {
            !local.is_empty()
                && domain.contains('.')
                && !domain.starts_with('.')
                && !domain.ends_with('.')
        }
        None => false,
    }
}

impl BookingRequest {
    pub fn validate(&self) -> Result<ValidatedBooking> {
        let name = required(&self.name);
        let email = required(&self.email);
        let subject = required(&self.subject);

        let (Some(name), Some(email), Some(subject), Some(start), Some(end)) =
            (name, email, subject, self.start_time, self.end_time)
        else {
            return Err(AppError::InvalidInput(
                "Missing required fields. Please provide name, email, subject, startTime, and endTime."
                    .to_string(),
            ));
        };

        if !looks_like_email(&email) {
            return Err(AppError::InvalidInput(format!(
                "'{}' is not a valid email address",
                email
            )));
        }

        if end <= start {
            return Err(AppError::InvalidInput(
                "endTime must be after startTime".to_string(),
            ));
        }

        Ok(ValidatedBooking {
            name,
            email,
            subject,
            description: required(&self.description),
            slot: TimeSlot::new(start, end - start),
        })
    }
}

/// The calendar appointment created for a confirmed booking.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Appointment {
    pub id: String,
    pub summary: String,
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub meet_link: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub html_link: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BookingConfirmation {
    pub message: String,
    pub appointment: Appointment,
}
