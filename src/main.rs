use std::net::SocketAddr;
use std::process::ExitCode;
use std::sync::Arc;

use chrono::Utc;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use portfolio_booking_service::{
    create_router,
    routes::with_middleware,
    services::{
        booking_log::BookingLog,
        notifier::{LogNotifier, Notifier, WebhookNotifier},
    },
    AppConfig, AppState, GoogleCalendarClient,
};

async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("Failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received interrupt signal, starting graceful shutdown");
        },
        _ = terminate => {
            info!("Received terminate signal, starting graceful shutdown");
        },
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    // Initialize tracing for logging
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let config = match AppConfig::from_env() {
        Ok(config) => config,
        Err(e) => {
            error!("Failed to load configuration: {}", e);
            return ExitCode::FAILURE;
        }
    };

    #[cfg(feature = "sentry-monitoring")]
    let _sentry = std::env::var("SENTRY_DSN").ok().map(|dsn| {
        info!("Sentry error tracking enabled");
        sentry::init((
            dsn,
            sentry::ClientOptions {
                release: sentry::release_name!(),
                ..Default::default()
            },
        ))
    });

    let http = match reqwest::Client::builder()
        .timeout(config.scheduling.calendar_timeout)
        .build()
    {
        Ok(http) => http,
        Err(e) => {
            error!("Failed to build HTTP client: {}", e);
            return ExitCode::FAILURE;
        }
    };

    // Initialize the Google Calendar client
    let calendar = match GoogleCalendarClient::new(http.clone(), &config.google) {
        Ok(calendar) => calendar,
        Err(e) => {
            error!("Failed to load Google credentials: {}", e);
            return ExitCode::FAILURE;
        }
    };
    info!("Google Calendar client initialized for calendar '{}'", config.google.calendar_id);

    let notifier: Arc<dyn Notifier> = match &config.notify_webhook_url {
        Some(url) => {
            info!("Booking notices will be relayed to {}", url);
            Arc::new(WebhookNotifier::new(http.clone(), url.clone()))
        }
        None => {
            info!("No NOTIFY_WEBHOOK_URL set - booking notices are only logged");
            Arc::new(LogNotifier)
        }
    };

    let booking_log = match &config.booking_log_path {
        Some(path) => match BookingLog::new(path) {
            Ok(log) => {
                info!("Booking log initialized at {}", path);
                Some(Arc::new(log))
            }
            Err(e) => {
                error!("Failed to open booking log {}: {}", path, e);
                return ExitCode::FAILURE;
            }
        },
        None => None,
    };

    let addr = SocketAddr::from(([0, 0, 0, 0], config.port));

    // Create shared application state
    let app_state = Arc::new(AppState {
        config,
        calendar: Arc::new(calendar),
        notifier,
        booking_log,
        clock: Utc::now,
    });

    let request_timeout = app_state.config.scheduling.request_timeout();
    let app = with_middleware(create_router(app_state), request_timeout);
    info!("Requests time out after {:?}", request_timeout);

    info!("Server listening on {}", addr);

    let listener = match tokio::net::TcpListener::bind(&addr).await {
        Ok(listener) => listener,
        Err(e) => {
            error!("Failed to bind to {}: {}", addr, e);
            return ExitCode::FAILURE;
        }
    };

    info!("Server is ready to accept connections");
    if let Err(e) = axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
    {
        error!("Server error: {}", e);
        return ExitCode::FAILURE;
    }

    info!("Server has been gracefully shut down");
    ExitCode::SUCCESS
}
