//! Best-effort fan-out to every registered subscriber.

use std::net::SocketAddr;
use std::sync::Arc;

use axum::extract::ws::Utf8Bytes;

use crate::observability::metrics;
use crate::relay::event::{FeedStatus, RelayEvent};
use crate::relay::registry::{SubscriberHandle, SubscriberId, SubscriberRegistry};
use crate::relay::state::RelayState;

/// Outcome of one broadcast.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BroadcastReport {
    /// Frames queued.
    pub sent: usize,
    /// Subscribers that failed and were dropped.
    pub failed: usize,
}

impl BroadcastReport {
    pub fn attempts(&self) -> usize {
        self.sent + self.failed
    }
}

/// Pushes relay events to the subscriber registry.
#[derive(Debug)]
pub struct Broadcaster {
    registry: Arc<SubscriberRegistry>,
    state: Arc<RelayState>,
}

impl Broadcaster {
    pub fn new(registry: Arc<SubscriberRegistry>, state: Arc<RelayState>) -> Self {
        Self { registry, state }
    }

    pub fn registry(&self) -> &Arc<SubscriberRegistry> {
        &self.registry
    }

    pub fn state(&self) -> &Arc<RelayState> {
        &self.state
    }

    pub fn subscriber_count(&self) -> usize {
        self.registry.len()
    }

    /// Register a subscriber and greet it with the current upstream status.
    pub fn register(&self, addr: Option<SocketAddr>) -> SubscriberHandle {
        let (_, handle) = self.registry.register(addr, |clients| {
            let greeting = RelayEvent::Status {
                status: if self.state.upstream_connected() {
                    FeedStatus::Connected
                } else {
                    FeedStatus::Disconnected
                },
                message: "Connected to relay server".to_string(),
                clients: Some(clients),
            };
            match serde_json::to_string(&greeting) {
                Ok(json) => Some(Utf8Bytes::from(json)),
                Err(e) => {
                    tracing::error!(error = %e, "Failed to encode initial status");
                    None
                }
            }
        });

        tracing::info!(
            subscriber = %handle.id,
            addr = ?addr,
            total = self.registry.len(),
            "Subscriber registered"
        );
        handle
    }

    pub fn unregister(&self, id: &SubscriberId) {
        if self.registry.unregister(id) {
            tracing::info!(subscriber = %id, remaining = self.registry.len(), "Subscriber removed");
        }
    }

    /// Serialize once and queue the frame for every open subscriber.
    ///
    /// Per-subscriber failures are logged, counted and the subscriber is
    /// dropped; nothing propagates to the caller.
    pub fn broadcast(&self, event: &RelayEvent) -> BroadcastReport {
        let mut report = BroadcastReport::default();
        if self.registry.is_empty() {
            return report;
        }

        let frame = match serde_json::to_string(event) {
            Ok(json) => Utf8Bytes::from(json),
            Err(e) => {
                tracing::error!(error = %e, "Failed to encode relay event");
                return report;
            }
        };

        let mut dead = Vec::new();
        for subscriber in self.registry.snapshot() {
            if !subscriber.is_open() {
                dead.push(subscriber.id());
                continue;
            }
            match subscriber.try_deliver(frame.clone()) {
                Ok(()) => report.sent += 1,
                Err(e) => {
                    tracing::warn!(subscriber = %subscriber.id(), error = %e, "Error sending to subscriber");
                    subscriber.mark_closed();
                    dead.push(subscriber.id());
                    report.failed += 1;
                }
            }
        }

        for id in &dead {
            self.unregister(id);
        }

        if report.failed > 0 {
            tracing::warn!(sent = report.sent, failed = report.failed, "Broadcast had failures");
        }
        metrics::record_broadcast(report.sent, report.failed);
        report
    }

    /// Close every subscriber queue (shutdown path).
    pub fn close_all(&self) -> usize {
        let closed = self.registry.close_all();
        tracing::info!(closed, "Closed all subscribers");
        closed
    }
}
