//! Resilience subsystem.
//!
//! # Data Flow
//! ```text
//! Upstream link closes:
//!     → backoff.rs (how long to wait, or give up)
//!     → upstream link sleeps on a single deadline, then reconnects
//! ```
//!
//! # Design Decisions
//! - Exactly one pending reconnect; a new schedule replaces the old one
//! - The attempt counter only resets after a successful subscription
//! - Exhausting the budget is terminal for the link, not for the process

pub mod backoff;

pub use backoff::{calculate_backoff, ReconnectPolicy};
