use base64::engine::{general_purpose, Engine};
use chrono::{DateTime, Utc};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;
use tracing::{debug, info};

// Nesting depth at which a token blob stops being unwrapped
const MAX_NESTING: usize = 3;

// Tokens this close to expiry are refreshed before use
const EXPIRY_MARGIN_MS: i64 = 60_000;

#[derive(Debug, Error)]
pub enum CredentialError {
    #[error("Token blob is not in a recognised format")]
    Unrecognised,

    #[error("Token blob has no access_token")]
    MissingAccessToken,

    #[error("Token refresh failed: {0}")]
    Refresh(String),
}

/// OAuth token as stored by the consent flow.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GoogleToken {
    #[serde(default)]
    pub access_token: String,
    #[serde(default)]
    pub refresh_token: Option<String>,
    /// Expiry as Unix milliseconds.
    #[serde(default)]
    pub expiry_date: Option<i64>,
    #[serde(default)]
    pub token_type: Option<String>,
    #[serde(default)]
    pub scope: Option<String>,
}

impl GoogleToken {
    /// Parse a stored token blob.
    ///
    /// Accepted forms, tried in order: a JSON object; a JSON string holding
    /// one of these forms (a few levels deep); text with an embedded
    /// `{"access_token"...}` object; base64 of any of these.
    pub fn parse(raw: &str) -> Result<Self, CredentialError> {
        Self::parse_nested(raw, 0)
    }

    fn parse_nested(raw: &str, depth: usize) -> Result<Self, CredentialError> {
        if depth > MAX_NESTING {
            return Err(CredentialError::Unrecognised);
        }

        let raw = raw.trim();

        match serde_json::from_str::<Value>(raw) {
            Ok(Value::Object(map)) => return Self::from_object(Value::Object(map)),
            Ok(Value::String(inner)) => return Self::parse_nested(&inner, depth + 1),
            Ok(_) => return Err(CredentialError::Unrecognised),
            Err(_) => {}
        }

        if let Some(embedded) = extract_embedded_object(raw) {
            debug!("Token blob parsed from embedded object");
            if let Ok(Value::Object(map)) = serde_json::from_str::<Value>(embedded) {
                return Self::from_object(Value::Object(map));
            }
        }

        match general_purpose::STANDARD.decode(raw) {
            Ok(bytes) => match String::from_utf8(bytes) {
                Ok(decoded) => Self::parse_nested(&decoded, depth + 1),
                Err(_) => Err(CredentialError::Unrecognised),
            },
            Err(_) => Err(CredentialError::Unrecognised),
        }
    }

    fn from_object(value: Value) -> Result<Self, CredentialError> {
        let token: GoogleToken =
            serde_json::from_value(value).map_err(|_| CredentialError::Unrecognised)?;
        if token.access_token.trim().is_empty() {
            return Err(CredentialError::MissingAccessToken);
        }
        Ok(token)
    }

    /// True when the token has a known expiry that is past (or nearly past) `now`.
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        match self.expiry_date {
            Some(expiry) => now.timestamp_millis() + EXPIRY_MARGIN_MS >= expiry,
            None => false,
        }
    }
}

fn extract_embedded_object(raw: &str) -> Option<&str> {
    let start = raw.find(r#"{"access_token""#)?;
    let end = raw.rfind('}')?;
    (end > start).then(|| &raw[start..=end])
}

#[derive(Debug, Deserialize)]
struct RefreshResponse {
    access_token: String,
}

/// Credentials used to authorise calendar requests.
///
/// The stored token is never mutated; when it has expired a fresh access
/// token is obtained for the current request only.
#[derive(Debug, Clone)]
pub struct GoogleAuth {
    client: Client,
    token: GoogleToken,
    client_id: Option<String>,
    client_secret: Option<String>,
    token_endpoint: String,
}

impl GoogleAuth {
    pub fn new(
        client: Client,
        token: GoogleToken,
        client_id: Option<String>,
        client_secret: Option<String>,
        token_endpoint: String,
    ) -> Self {
        Self {
            client,
            token,
            client_id,
            client_secret,
            token_endpoint,
        }
    }

    pub fn token(&self) -> &GoogleToken {
        &self.token
    }

    /// Access token valid at `now`, refreshing it if it has expired and a
    /// refresh token plus client credentials are available.
    pub async fn access_token(&self, now: DateTime<Utc>) -> Result<String, CredentialError> {
        if !self.token.is_expired(now) {
            return Ok(self.token.access_token.clone());
        }

        let (Some(refresh_token), Some(client_id), Some(client_secret)) = (
            self.token.refresh_token.as_deref(),
            self.client_id.as_deref(),
            self.client_secret.as_deref(),
        ) else {
            debug!("Stored access token has expired and cannot be refreshed, using it anyway");
            return Ok(self.token.access_token.clone());
        };

        info!("Refreshing expired Google access token");

        let params = [
            ("grant_type", "refresh_token"),
            ("refresh_token", refresh_token),
            ("client_id", client_id),
            ("client_secret", client_secret),
        ];

        let res = self
            .client
            .post(&self.token_endpoint)
            .form(&params)
            .send()
            .await
            .map_err(|e| CredentialError::Refresh(e.to_string()))?;

        if !res.status().is_success() {
            return Err(CredentialError::Refresh(format!(
                "token endpoint returned {}",
                res.status()
            )));
        }

        let refreshed = res
            .json::<RefreshResponse>()
            .await
            .map_err(|e| CredentialError::Refresh(e.to_string()))?;

        Ok(refreshed.access_token)
    }
}
