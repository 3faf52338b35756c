//! Observability subsystem.
//!
//! # Data Flow
//! ```text
//! dispatch / transport produce:
//!     → logging.rs (structured log events: session, key, method, error)
//!     → metrics.rs (outcome counters, active-session gauge)
//!
//! Consumers:
//!     → stdout (text or JSON)
//!     → Metrics endpoint (Prometheus scrape)
//! ```
//!
//! # Design Decisions
//! - Structured logging (JSON) for machine parsing
//! - Every log line about a message carries `remote@id` of its session
//! - Metrics are cheap (atomic increments)

pub mod logging;
pub mod metrics;
