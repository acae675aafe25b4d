//! Observability subsystem.
//!
//! # Data Flow
//! ```text
//! Dispatch produces:
//!     → logging.rs (structured log events inside a per-request span)
//!     → metrics.rs (request counters, latency histogram, fault/timeout counters)
//!
//! Consumers:
//!     → stdout (pretty or JSON)
//!     → Metrics endpoint (Prometheus scrape)
//! ```
//!
//! # Design Decisions
//! - Structured logging (JSON) for machine parsing
//! - Request ID is a field on the request span, so every event carries it
//! - Metrics are cheap (atomic increments)

pub mod logging;
pub mod metrics;
