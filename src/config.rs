use std::env;
use std::str::FromStr;
use std::time::Duration;

use chrono_tz::Tz;
use dotenv::dotenv;
use tracing::info;

use crate::error::{AppError, Result};
use crate::models::slot::validate_duration;

pub const DEFAULT_SLOT_MINUTES: u32 = 30;
pub const DEFAULT_BUSINESS_HOURS_START: u32 = 9;
pub const DEFAULT_BUSINESS_HOURS_END: u32 = 24;
pub const DEFAULT_CALENDAR_API_ENDPOINT: &str = "https://www.googleapis.com/calendar/v3";
pub const DEFAULT_TOKEN_ENDPOINT: &str = "https://oauth2.googleapis.com/token";

/// Hours of the day during which slots may start.
///
/// The lower bound is inclusive and the upper bound exclusive; an upper bound
/// of 24 means "through the end of the day".
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BusinessHours {
    start_hour: u32,
    end_hour: u32,
}

impl BusinessHours {
    pub fn new(start_hour: u32, end_hour: u32) -> Result<Self> {
        if start_hour > 23 || end_hour > 24 || start_hour >= end_hour {
            return Err(AppError::Config(format!(
                "Invalid business hours {}-{}: expected 0 <= start < end <= 24",
                start_hour, end_hour
            )));
        }
        Ok(Self {
            start_hour,
            end_hour,
        })
    }

    pub fn start_hour(&self) -> u32 {
        self.start_hour
    }

    pub fn end_hour(&self) -> u32 {
        self.end_hour
    }

    pub fn contains_hour(&self, hour: u32) -> bool {
        hour >= self.start_hour && hour < self.end_hour
    }
}

impl Default for BusinessHours {
    fn default() -> Self {
        Self {
            start_hour: DEFAULT_BUSINESS_HOURS_START,
            end_hour: DEFAULT_BUSINESS_HOURS_END,
        }
    }
}

/// What the availability endpoint does when the calendar cannot be read.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FallbackPolicy {
    /// Report the failure to the caller.
    #[default]
    Fail,
    /// Return the generated slots unfiltered, flagged as unverified.
    Unfiltered,
}

impl FromStr for FallbackPolicy {
    type Err = AppError;

    fn from_str(value: &str) -> Result<Self> {
        match value.trim().to_lowercase().as_str() {
            "fail" | "none" => Ok(FallbackPolicy::Fail),
            "unfiltered" => Ok(FallbackPolicy::Unfiltered),
            other => Err(AppError::Config(format!(
                "Unknown AVAILABILITY_FALLBACK '{}', expected 'fail' or 'unfiltered'",
                other
            ))),
        }
    }
}

/// Settings that drive slot generation and filtering.
#[derive(Debug, Clone, PartialEq)]
pub struct SchedulingConfig {
    pub slot_duration_minutes: u32,
    pub business_hours: BusinessHours,
    pub timezone: Tz,
    pub fallback: FallbackPolicy,
    pub calendar_timeout: Duration,
}

impl Default for SchedulingConfig {
    fn default() -> Self {
        Self {
            slot_duration_minutes: DEFAULT_SLOT_MINUTES,
            business_hours: BusinessHours::default(),
            timezone: Tz::UTC,
            fallback: FallbackPolicy::default(),
            calendar_timeout: Duration::from_secs(10),
        }
    }
}

impl SchedulingConfig {
    /// Server-side bound for a whole request: the three sequential
    /// calendar-bounded waits of a booking plus slack, at least 30 seconds.
    pub fn request_timeout(&self) -> Duration {
        let booking_path = self.calendar_timeout * 3 + Duration::from_secs(5);
        booking_path.max(Duration::from_secs(30))
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct GoogleConfig {
    pub client_id: Option<String>,
    pub client_secret: Option<String>,
    pub token_json: String,
    pub calendar_id: String,
    pub api_endpoint: String,
    pub token_endpoint: String,
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct OwnerContact {
    pub name: Option<String>,
    pub email: Option<String>,
}

impl OwnerContact {
    pub fn display_name(&self) -> &str {
        self.name.as_deref().unwrap_or("Portfolio Owner")
    }
}

/// Complete service configuration, read once at startup.
#[derive(Debug, Clone, PartialEq)]
pub struct AppConfig {
    pub port: u16,
    pub scheduling: SchedulingConfig,
    pub google: GoogleConfig,
    pub owner: OwnerContact,
    pub notify_webhook_url: Option<String>,
    pub booking_log_path: Option<String>,
}

fn parse_var<T: FromStr>(key: &str, raw: Option<String>, default: T) -> Result<T> {
    match raw {
        Some(value) => value
            .trim()
            .parse::<T>()
            .map_err(|_| AppError::Config(format!("{} has an invalid value '{}'", key, value))),
        None => Ok(default),
    }
}

impl AppConfig {
    /// Load configuration from the process environment (and `.env`, if present).
    pub fn from_env() -> Result<Self> {
        dotenv().ok();
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Build configuration from an arbitrary key lookup. Empty values count as unset.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let slot_duration_minutes =
            parse_var("MEETING_DURATION", get("MEETING_DURATION"), DEFAULT_SLOT_MINUTES)?;
        validate_duration(slot_duration_minutes)
            .map_err(|e| AppError::Config(format!("MEETING_DURATION: {}", e)))?;

        let business_hours = BusinessHours::new(
            parse_var(
                "BUSINESS_HOURS_START",
                get("BUSINESS_HOURS_START"),
                DEFAULT_BUSINESS_HOURS_START,
            )?,
            parse_var(
                "BUSINESS_HOURS_END",
                get("BUSINESS_HOURS_END"),
                DEFAULT_BUSINESS_HOURS_END,
            )?,
        )?;

        let timezone = match get("TIMEZONE") {
            Some(name) => name
                .trim()
                .parse::<Tz>()
                .map_err(|_| AppError::Config(format!("Unknown TIMEZONE '{}'", name)))?,
            None => Tz::UTC,
        };

        let fallback = match get("AVAILABILITY_FALLBACK") {
            Some(value) => value.parse::<FallbackPolicy>()?,
            None => FallbackPolicy::default(),
        };

        let timeout_secs: u64 =
            parse_var("CALENDAR_TIMEOUT_SECS", get("CALENDAR_TIMEOUT_SECS"), 10)?;
        if timeout_secs == 0 {
            return Err(AppError::Config(
                "CALENDAR_TIMEOUT_SECS must be positive".to_string(),
            ));
        }

        let token_json = get("GOOGLE_TOKEN_JSON").ok_or_else(|| {
            AppError::Config("GOOGLE_TOKEN_JSON must be set in environment".to_string())
        })?;

        let google = GoogleConfig {
            client_id: get("GOOGLE_CLIENT_ID"),
            client_secret: get("GOOGLE_CLIENT_SECRET"),
            token_json,
            calendar_id: get("GOOGLE_CALENDAR_ID").unwrap_or_else(|| "primary".to_string()),
            api_endpoint: get("GOOGLE_CALENDAR_API_ENDPOINT")
                .unwrap_or_else(|| DEFAULT_CALENDAR_API_ENDPOINT.to_string()),
            token_endpoint: get("GOOGLE_TOKEN_ENDPOINT")
                .unwrap_or_else(|| DEFAULT_TOKEN_ENDPOINT.to_string()),
        };

        let config = Self {
            port: parse_var("PORT", get("PORT"), 3000)?,
            scheduling: SchedulingConfig {
                slot_duration_minutes,
                business_hours,
                timezone,
                fallback,
                calendar_timeout: Duration::from_secs(timeout_secs),
            },
            google,
            owner: OwnerContact {
                name: get("OWNER_NAME"),
                email: get("OWNER_EMAIL"),
            },
            notify_webhook_url: get("NOTIFY_WEBHOOK_URL"),
            booking_log_path: get("BOOKING_LOG_PATH"),
        };

        info!(
            "Scheduling {}-minute slots between {}:00 and {}:00 ({}), fallback policy {:?}",
            config.scheduling.slot_duration_minutes,
            business_hours.start_hour(),
            business_hours.end_hour(),
            config.scheduling.timezone,
            config.scheduling.fallback
        );

        Ok(config)
    }
}
