//! Structured logging configuration.
//!
//! `tracing-subscriber` with an `EnvFilter`; library crates that log through
//! the `log` facade are picked up by the subscriber's `log` bridge.

use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

/// Filter used when `RUST_LOG` is unset
pub const DEFAULT_FILTER: &str = "info,live_match=info,sqlx=warn,hyper=warn";

/// Initialize structured logging
///
/// Log levels come from `RUST_LOG`, defaulting to [`DEFAULT_FILTER`].
/// Colors are disabled when `NO_COLOR` is set.
///
/// # Example
///
/// ```no_run
/// use lm_server::logging;
///
/// #[tokio::main]
/// async fn main() {
///     logging::init();
///     tracing::info!("Server starting");
/// }
/// ```
pub fn init() {
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER));

    let fmt_layer = tracing_subscriber::fmt::layer()
        .with_target(true)
        .with_ansi(std::env::var_os("NO_COLOR").is_none())
        .with_file(true)
        .with_line_number(true);

    tracing_subscriber::registry()
        .with(env_filter)
        .with(fmt_layer)
        .init();

    tracing::info!("Structured logging initialized");
}

/// Log security event with structured data
///
/// # Arguments
///
/// * `event_type` - Type of security event
/// * `user_id` - Optional user ID
/// * `message` - Event message
///
/// # Example
///
/// ```
/// use lm_server::logging::log_security_event;
///
/// log_security_event("premium_required", Some(123), "Live mode needs premium");
/// ```
pub fn log_security_event(event_type: &str, user_id: Option<i64>, message: &str) {
    tracing::warn!(
        event_type = event_type,
        user_id = user_id,
        "SECURITY: {}",
        message
    );
}

/// Log API request/response
///
/// Requests slower than a second are logged at warn level.
pub fn log_api_request(method: &str, path: &str, status_code: u16, duration_ms: u64) {
    if duration_ms > 1000 {
        tracing::warn!(
            http_method = method,
            http_path = path,
            http_status = status_code,
            duration_ms = duration_ms,
            "Slow API request"
        );
    } else {
        tracing::info!(
            http_method = method,
            http_path = path,
            http_status = status_code,
            duration_ms = duration_ms,
            "API request completed"
        );
    }
}
