//! Observability subsystem.
//!
//! # Data Flow
//! ```text
//! Relay core and HTTP server produce:
//!     → logging.rs (structured log events via tracing)
//!     → metrics.rs (counters, gauges)
//!
//! Consumers:
//!     → stdout
//!     → Metrics endpoint (Prometheus scrape, optional)
//! ```
//!
//! # Design Decisions
//! - Structured fields on every log line (subscriber id, attempt, delay)
//! - Metrics are cheap (atomic increments) and safe to call without a recorder

pub mod logging;
pub mod metrics;
