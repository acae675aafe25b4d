//! Resilience subsystem.
//!
//! # Data Flow
//! ```text
//! Resolved request (Context with chain + deadline)
//!     → supervisor.rs (spawn chain, race against deadline)
//!     → Completed | Panicked | TimedOut
//!     → exactly one committed reply
//! ```
//!
//! # Design Decisions
//! - Every request has a deadline; there is no unbounded execution path
//! - A failing request never affects another request or the process
//! - Supervision is per request; no shared state between supervisors

pub mod supervisor;

pub use supervisor::execute;
