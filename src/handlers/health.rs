use axum::{extract::State, response::Json};
use serde::Serialize;
use std::sync::Arc;
use tracing::{info, warn};

use crate::handlers::api::AppState;

// Health check endpoint
pub async fn health_check() -> &'static str {
    "OK"
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CalendarHealth {
    pub calendar_accessible: bool,
}

// Reports whether the configured credentials can read the calendar
pub async fn calendar_health(State(state): State<Arc<AppState>>) -> Json<CalendarHealth> {
    let calendar_accessible = match tokio::time::timeout(
        state.config.scheduling.calendar_timeout,
        state.calendar.check_access(),
    )
    .await
    {
        Ok(Ok(accessible)) => accessible,
        Ok(Err(e)) => {
            warn!("Calendar access check failed: {}", e);
            false
        }
        Err(_) => {
            warn!("Calendar access check timed out");
            false
        }
    };

    info!("Calendar accessible: {}", calendar_accessible);
    Json(CalendarHealth {
        calendar_accessible,
    })
}
