use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use reqwest::{Client, StatusCode};
use serde::Deserialize;
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::auth::{CredentialError, GoogleAuth, GoogleToken};
use crate::config::GoogleConfig;
use crate::models::calendar::{CalendarEvent, CreatedEvent, NewCalendarEvent};

// Upper bound on pages fetched for a single listing
const MAX_PAGES: usize = 10;

#[derive(Debug, Error)]
pub enum CalendarError {
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Calendar API returned {status}: {body}")]
    Status { status: StatusCode, body: String },

    #[error("Credentials unusable: {0}")]
    Credentials(#[from] CredentialError),
}

/// The external calendar the service reads busy times from and writes bookings to.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait CalendarSource: Send + Sync {
    /// All events overlapping `[time_min, time_max)`, recurring events expanded.
    async fn list_events(
        &self,
        time_min: DateTime<Utc>,
        time_max: DateTime<Utc>,
    ) -> Result<Vec<CalendarEvent>, CalendarError>;

    /// Create an event and return what the calendar stored.
    async fn insert_event(&self, event: &NewCalendarEvent) -> Result<CreatedEvent, CalendarError>;

    /// Whether the configured credentials can currently read the calendar.
    async fn check_access(&self) -> Result<bool, CalendarError>;
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct EventsPage {
    #[serde(default)]
    items: Vec<CalendarEvent>,
    #[serde(default)]
    next_page_token: Option<String>,
}

/// Client for the Google Calendar v3 REST API
pub struct GoogleCalendarClient {
    client: Client,
    auth: GoogleAuth,
    endpoint: String,
    calendar_id: String,
}

impl GoogleCalendarClient {
    /// Build a client from configuration, parsing the stored token blob.
    pub fn new(client: Client, config: &GoogleConfig) -> Result<Self, CredentialError> {
        let token = GoogleToken::parse(&config.token_json)?;
        if token.refresh_token.is_none() {
            warn!("Google token has no refresh_token; requests will fail once it expires");
        }

        let auth = GoogleAuth::new(
            client.clone(),
            token,
            config.client_id.clone(),
            config.client_secret.clone(),
            config.token_endpoint.clone(),
        );

        Ok(Self {
            client,
            auth,
            endpoint: config.api_endpoint.trim_end_matches('/').to_string(),
            calendar_id: config.calendar_id.clone(),
        })
    }

    fn events_url(&self) -> String {
        format!("{}/calendars/{}/events", self.endpoint, self.calendar_id)
    }

    async fn bearer(&self) -> Result<String, CalendarError> {
        Ok(self.auth.access_token(Utc::now()).await?)
    }

    async fn check_status(res: reqwest::Response) -> Result<reqwest::Response, CalendarError> {
        let status = res.status();
        if status.is_success() {
            return Ok(res);
        }
        let body = res.text().await.unwrap_or_default();
        Err(CalendarError::Status { status, body })
    }
}

#[async_trait]
impl CalendarSource for GoogleCalendarClient {
    async fn list_events(
        &self,
        time_min: DateTime<Utc>,
        time_max: DateTime<Utc>,
    ) -> Result<Vec<CalendarEvent>, CalendarError> {
        let token = self.bearer().await?;
        let url = self.events_url();
        let time_min = time_min.to_rfc3339_opts(SecondsFormat::Millis, true);
        let time_max = time_max.to_rfc3339_opts(SecondsFormat::Millis, true);

        info!("Listing calendar events between {} and {}", time_min, time_max);

        let mut events = Vec::new();
        let mut page_token: Option<String> = None;

        for _ in 0..MAX_PAGES {
            let mut query = vec![
                ("timeMin", time_min.clone()),
                ("timeMax", time_max.clone()),
                ("singleEvents", "true".to_string()),
                ("orderBy", "startTime".to_string()),
                ("maxResults", "250".to_string()),
            ];
            if let Some(page) = &page_token {
                query.push(("pageToken", page.clone()));
            }

            let res = self
                .client
                .get(&url)
                .bearer_auth(&token)
                .query(&query)
                .send()
                .await?;
            debug!("Events page received with status: {}", res.status());

            let page = Self::check_status(res).await?.json::<EventsPage>().await?;
            events.extend(page.items);

            match page.next_page_token {
                Some(next) => page_token = Some(next),
                None => return Ok(events),
            }
        }

        warn!(
            "Stopped listing events after {} pages, results may be incomplete",
            MAX_PAGES
        );
        Ok(events)
    }

    async fn insert_event(&self, event: &NewCalendarEvent) -> Result<CreatedEvent, CalendarError> {
        let token = self.bearer().await?;

        info!(
            "Inserting calendar event '{}' from {:?} to {:?}",
            event.summary, event.start.date_time, event.end.date_time
        );

        let res = self
            .client
            .post(self.events_url())
            .bearer_auth(&token)
            .query(&[("conferenceDataVersion", "1"), ("sendUpdates", "all")])
            .json(event)
            .send()
            .await?;
        info!("Insert response received with status: {}", res.status());

        let created = Self::check_status(res).await?.json::<CreatedEvent>().await?;
        Ok(created)
    }

    async fn check_access(&self) -> Result<bool, CalendarError> {
        let token = match self.auth.access_token(Utc::now()).await {
            Ok(token) => token,
            Err(e) => {
                warn!("Could not obtain an access token: {}", e);
                return Ok(false);
            }
        };

        let res = self
            .client
            .get(format!("{}/users/me/calendarList", self.endpoint))
            .bearer_auth(&token)
            .query(&[("maxResults", "1")])
            .send()
            .await?;

        let status = res.status();
        debug!("Calendar access check returned {}", status);

        if status.is_success() {
            Ok(true)
        } else if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
            Ok(false)
        } else {
            let body = res.text().await.unwrap_or_default();
            Err(CalendarError::Status { status, body })
        }
    }
}
