//! Metrics collection and exposition.
//!
//! # Responsibilities
//! - Count dispatch outcomes and error-routing results
//! - Track open WebSocket sessions
//! - Expose a Prometheus-compatible scrape endpoint
//!
//! # Metrics
//! - `websocket_plus_messages_total` (counter): inbound messages by outcome
//! - `websocket_plus_unhandled_errors_total` (counter): errors no recovery method took, by kind
//! - `websocket_plus_recovered_errors_total` (counter): errors a recovery method took, by kind
//! - `websocket_plus_active_sessions` (gauge): currently open sessions
//!
//! # Design Decisions
//! - Recording is a no-op until a recorder is installed, so the dispatch
//!   core and tests never depend on the exporter
//! - The exporter listens on its own address, separate from the WebSocket listener

use std::net::SocketAddr;

use metrics::{counter, gauge};
use metrics_exporter_prometheus::PrometheusBuilder;

pub const MESSAGES_TOTAL: &str = "websocket_plus_messages_total";
pub const UNHANDLED_ERRORS_TOTAL: &str = "websocket_plus_unhandled_errors_total";
pub const RECOVERED_ERRORS_TOTAL: &str = "websocket_plus_recovered_errors_total";
pub const ACTIVE_SESSIONS: &str = "websocket_plus_active_sessions";

/// Install the global Prometheus recorder with an HTTP listener on `addr`.
///
/// Must run inside a Tokio runtime. Failure is logged and leaves metrics disabled.
pub fn init_metrics(addr: SocketAddr) {
    match PrometheusBuilder::new().with_http_listener(addr).install() {
        Ok(()) => tracing::info!(address = %addr, "Metrics exporter listening"),
        Err(e) => {
            tracing::error!(address = %addr, error = %e, "Failed to install metrics exporter")
        }
    }
}

/// Count one inbound message by its dispatch outcome.
pub fn record_message(outcome: &'static str) {
    counter!(MESSAGES_TOTAL, "outcome" => outcome).increment(1);
}

pub fn record_unhandled_error(kind: &'static str) {
    counter!(UNHANDLED_ERRORS_TOTAL, "kind" => kind).increment(1);
}

pub fn record_recovered_error(kind: &'static str) {
    counter!(RECOVERED_ERRORS_TOTAL, "kind" => kind).increment(1);
}

pub fn session_opened() {
    gauge!(ACTIVE_SESSIONS).increment(1.0);
}

pub fn session_closed() {
    gauge!(ACTIVE_SESSIONS).decrement(1.0);
}
