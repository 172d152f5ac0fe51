//! AIS feed relay library.
//!
//! One upstream WebSocket feed of vessel position reports, re-exposed to any
//! number of downstream WebSocket subscribers.

pub mod config;
pub mod http;
pub mod lifecycle;
pub mod observability;
pub mod relay;
pub mod resilience;

pub use config::schema::RelayConfig;
pub use http::RelayServer;
pub use lifecycle::Shutdown;
pub use relay::{Broadcaster, RelayState, SubscriberRegistry, UpstreamHandle, UpstreamLink};
