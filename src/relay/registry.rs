//! Registry of downstream subscribers.
//!
//! # Responsibilities
//! - Hand out a bounded frame queue per accepted connection
//! - Track liveness so dead subscribers can be dropped lazily
//! - Provide a stable snapshot for broadcasting while connections come and go
//!
//! # Design Decisions
//! - `DashMap` so accept/disconnect never contends with a whole-map lock
//! - Broadcast iterates a cloned snapshot, never the live map
//! - Dropping a subscriber drops its sender, which ends its writer task

use std::net::SocketAddr;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use axum::extract::ws::Utf8Bytes;
use dashmap::DashMap;
use thiserror::Error;
use tokio::sync::mpsc;
use uuid::Uuid;

use crate::observability::metrics;

/// Unique subscriber identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriberId(Uuid);

impl SubscriberId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for SubscriberId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for SubscriberId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Why a frame could not be queued for a subscriber.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum DeliveryError {
    #[error("subscriber connection is closed")]
    Closed,

    #[error("subscriber send queue is full")]
    QueueFull,
}

/// One downstream connection as seen by the broadcaster.
///
/// The sender lives behind a lock so that closing is a barrier: once
/// [`Subscriber::mark_closed`] returns, no further frame can be queued.
#[derive(Debug)]
pub struct Subscriber {
    id: SubscriberId,
    addr: Option<SocketAddr>,
    tx: Mutex<Option<mpsc::Sender<Utf8Bytes>>>,
}

impl Subscriber {
    pub fn id(&self) -> SubscriberId {
        self.id
    }

    pub fn addr(&self) -> Option<SocketAddr> {
        self.addr
    }

    fn sender(&self) -> MutexGuard<'_, Option<mpsc::Sender<Utf8Bytes>>> {
        self.tx.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn is_open(&self) -> bool {
        self.sender().as_ref().is_some_and(|tx| !tx.is_closed())
    }

    /// Drop the sender, ending the subscriber's queue after what is buffered.
    pub fn mark_closed(&self) {
        self.sender().take();
    }

    /// Queue a frame without waiting.
    pub fn try_deliver(&self, frame: Utf8Bytes) -> Result<(), DeliveryError> {
        let guard = self.sender();
        let tx = guard.as_ref().ok_or(DeliveryError::Closed)?;
        tx.try_send(frame).map_err(|e| match e {
            mpsc::error::TrySendError::Full(_) => DeliveryError::QueueFull,
            mpsc::error::TrySendError::Closed(_) => DeliveryError::Closed,
        })
    }
}

/// Receiving half handed to the connection that owns the socket.
#[derive(Debug)]
pub struct SubscriberHandle {
    pub id: SubscriberId,
    pub frames: mpsc::Receiver<Utf8Bytes>,
}

/// Set of live subscribers.
#[derive(Debug)]
pub struct SubscriberRegistry {
    subscribers: DashMap<SubscriberId, Arc<Subscriber>>,
    queue_capacity: usize,
}

impl SubscriberRegistry {
    pub fn new(queue_capacity: usize) -> Self {
        Self {
            subscribers: DashMap::new(),
            queue_capacity: queue_capacity.max(1),
        }
    }

    /// Add a subscriber and return its queue.
    ///
    /// `greeting` is queued before the subscriber becomes visible to
    /// broadcasts, so it is always the first frame on the queue. It receives
    /// the subscriber count including the new one.
    pub fn register<F>(&self, addr: Option<SocketAddr>, greeting: F) -> (Arc<Subscriber>, SubscriberHandle)
    where
        F: FnOnce(usize) -> Option<Utf8Bytes>,
    {
        let id = SubscriberId::new();
        let (tx, frames) = mpsc::channel(self.queue_capacity);
        let subscriber = Arc::new(Subscriber {
            id,
            addr,
            tx: Mutex::new(Some(tx)),
        });

        if let Some(frame) = greeting(self.subscribers.len() + 1) {
            if let Err(e) = subscriber.try_deliver(frame) {
                tracing::warn!(subscriber = %id, error = %e, "Failed to queue initial status");
            }
        }

        self.subscribers.insert(id, subscriber.clone());
        metrics::record_subscribers(self.subscribers.len());
        (subscriber, SubscriberHandle { id, frames })
    }

    /// Remove a subscriber. Returns false when it was already gone.
    pub fn unregister(&self, id: &SubscriberId) -> bool {
        match self.subscribers.remove(id) {
            Some((_, subscriber)) => {
                subscriber.mark_closed();
                metrics::record_subscribers(self.subscribers.len());
                true
            }
            None => false,
        }
    }

    pub fn get(&self, id: &SubscriberId) -> Option<Arc<Subscriber>> {
        self.subscribers.get(id).map(|r| r.value().clone())
    }

    pub fn len(&self) -> usize {
        self.subscribers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.subscribers.is_empty()
    }

    /// Clone out the current members; shard locks are released on return.
    pub fn snapshot(&self) -> Vec<Arc<Subscriber>> {
        self.subscribers.iter().map(|r| r.value().clone()).collect()
    }

    /// Drop every subscriber, closing their queues.
    pub fn close_all(&self) -> usize {
        let ids: Vec<SubscriberId> = self.subscribers.iter().map(|r| *r.key()).collect();
        ids.iter().filter(|id| self.unregister(id)).count()
    }
}
