//! Relay core: one upstream feed fanned out to many subscribers.
//!
//! # Data Flow
//! ```text
//! Upstream feed (wss)
//!     → upstream.rs (connect, subscribe, read frames, backoff-reconnect)
//!     → broadcaster.rs (serialize once, queue per subscriber)
//!     → registry.rs (bounded queue per downstream connection)
//!     → http/websocket.rs writer task → subscriber socket
//!
//! state.rs is written by the upstream link and read by /health.
//! ```
//!
//! # Design Decisions
//! - Payloads are forwarded opaquely inside `{"type":"ais-data","data":...}`
//! - Delivery is fire-and-forget; a subscriber that cannot keep up is dropped
//! - Per-subscriber FIFO holds because the link broadcasts from one task

pub mod broadcaster;
pub mod event;
pub mod registry;
pub mod state;
pub mod subscription;
pub mod upstream;

pub use broadcaster::{BroadcastReport, Broadcaster};
pub use event::{FeedStatus, RelayEvent};
pub use registry::{DeliveryError, Subscriber, SubscriberHandle, SubscriberId, SubscriberRegistry};
pub use state::{LinkState, RelayState, StatusSnapshot};
pub use subscription::{BoundingBox, SubscriptionMessage};
pub use upstream::{UpstreamError, UpstreamHandle, UpstreamLink};
