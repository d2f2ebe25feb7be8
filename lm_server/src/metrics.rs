//! Prometheus metrics for the live-match server.
//!
//! Metrics are exposed in Prometheus text format for scraping when
//! `METRICS_BIND` is set. Recording is always safe: without an installed
//! exporter the `metrics` macros are no-ops.
//!
//! # Metrics Categories
//!
//! - **HTTP Metrics**: Request counts and duration per route
//! - **WebSocket Metrics**: Event stream connections and messages
//! - **Live Metrics**: Session and match events seen on the event bus
//! - **Access Metrics**: Eligibility gate rejections
//!
//! # Example Usage
//!
//! ```rust,no_run
//! use lm_server::metrics;
//! use std::net::SocketAddr;
//!
//! let addr: SocketAddr = "127.0.0.1:9090".parse().unwrap();
//! metrics::init_metrics(addr).unwrap();
//!
//! metrics::http_requests_total("POST", "/session/start", 201);
//! ```

use live_match::events::EventBus;
use metrics_exporter_prometheus::PrometheusBuilder;
use std::net::SocketAddr;
use tokio::{sync::broadcast::error::RecvError, task::JoinHandle};

/// Initialize Prometheus metrics exporter.
///
/// Metrics will be available at `http://<addr>/metrics`.
///
/// # Errors
///
/// Returns a message when the exporter cannot be installed
pub fn init_metrics(addr: SocketAddr) -> Result<(), String> {
    PrometheusBuilder::new()
        .with_http_listener(addr)
        .install()
        .map_err(|e| format!("Failed to install Prometheus exporter: {}", e))
}

// ============================================================================
// HTTP Metrics
// ============================================================================

/// Record HTTP request.
///
/// `path` should be the matched route, not the raw URI.
pub fn http_requests_total(method: &str, path: &str, status: u16) {
    metrics::counter!("http_requests_total",
        "method" => method.to_string(),
        "path" => path.to_string(),
        "status" => status.to_string()
    )
    .increment(1);
}

/// Record HTTP request duration in milliseconds.
pub fn http_request_duration_ms(method: &str, path: &str, duration_ms: f64) {
    metrics::histogram!("http_request_duration_ms",
        "method" => method.to_string(),
        "path" => path.to_string()
    )
    .record(duration_ms);
}

// ============================================================================
// WebSocket Metrics
// ============================================================================

/// Track an opened event stream.
pub fn websocket_connected() {
    metrics::counter!("websocket_connections_total").increment(1);
    metrics::gauge!("websocket_connections_active").increment(1.0);
}

/// Track a closed event stream.
pub fn websocket_disconnected() {
    metrics::gauge!("websocket_connections_active").decrement(1.0);
}

pub fn websocket_messages_sent() {
    metrics::counter!("websocket_messages_sent").increment(1);
}

pub fn websocket_messages_received() {
    metrics::counter!("websocket_messages_received").increment(1);
}

// ============================================================================
// Live Metrics
// ============================================================================

/// Count a live event by kind.
pub fn live_events_total(kind: &'static str) {
    metrics::counter!("live_events_total", "kind" => kind).increment(1);
}

/// Count an eligibility gate rejection by code.
pub fn eligibility_rejections_total(code: &'static str) {
    metrics::counter!("eligibility_rejections_total", "code" => code).increment(1);
}

/// Count every event published on `bus` until it closes
pub fn spawn_event_metrics(bus: &EventBus) -> JoinHandle<()> {
    let mut events = bus.subscribe();
    tokio::spawn(async move {
        loop {
            match events.recv().await {
                Ok(event) => live_events_total(event.kind()),
                Err(RecvError::Lagged(skipped)) => {
                    tracing::warn!(skipped, "Event metrics subscriber lagged");
                }
                Err(RecvError::Closed) => break,
            }
        }
    })
}
