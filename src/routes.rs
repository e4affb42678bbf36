use axum::{
    error_handling::HandleErrorLayer,
    routing::{get, post},
    Router,
};
use std::sync::Arc;
use std::time::Duration;
use tower::ServiceBuilder;
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};

use crate::error::handle_layer_error;
use crate::handlers::api::{book_appointment, get_availability, AppState};
use crate::handlers::health::{calendar_health, health_check};

// Upper bound on requests handled at once
const MAX_CONCURRENT_REQUESTS: usize = 64;

pub fn create_router(app_state: Arc<AppState>) -> Router {
    let health_routes = Router::new()
        .route("/health", get(health_check))
        .route("/api/calendar/health", get(calendar_health));

    let calendar_routes = Router::new()
        .route("/api/calendar/availability", get(get_availability))
        .route("/api/calendar/book", post(book_appointment));

    Router::new()
        .merge(health_routes)
        .merge(calendar_routes)
        .with_state(app_state)
}

/// Wrap `router` in the serving middleware: load shedding, a concurrency
/// limit, a whole-request timeout, tracing and CORS. Middleware failures are
/// answered with the same JSON error body as handler errors.
pub fn with_middleware(router: Router, request_timeout: Duration) -> Router {
    router.layer(
        ServiceBuilder::new()
            .layer(HandleErrorLayer::new(handle_layer_error))
            .load_shed()
            .concurrency_limit(MAX_CONCURRENT_REQUESTS)
            .timeout(request_timeout)
            .layer(TraceLayer::new_for_http())
            .layer(CorsLayer::new().allow_origin(Any).allow_methods(Any).allow_headers(Any)),
    )
}
