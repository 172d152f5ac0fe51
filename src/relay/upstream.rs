//! Upstream feed connection.
//!
//! # Responsibilities
//! - Connect to the feed and send the subscription message
//! - Forward every inbound frame to the broadcaster as an opaque payload
//! - Reconnect after a close according to the [`ReconnectPolicy`]
//! - Stop deterministically on request
//!
//! # Design Decisions
//! - The link is a single task; open/message/error/close are handled one at
//!   a time, each including its full fan-out, before the next frame is read
//! - Control (`connect`, `stop`) arrives over a channel and is processed
//!   between events, so a pending reconnect is a single deadline that `stop`
//!   replaces rather than races
//! - A failed handshake counts as a close and goes through the same backoff

use std::sync::Arc;
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use thiserror::Error;
use tokio::net::TcpStream;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio::time::{self, Instant};
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
use tokio_tungstenite::tungstenite::protocol::CloseFrame;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};

use crate::config::UpstreamConfig;
use crate::observability::metrics;
use crate::relay::broadcaster::Broadcaster;
use crate::relay::event::{FeedStatus, RelayEvent};
use crate::relay::state::{LinkState, RelayState};
use crate::relay::subscription::SubscriptionMessage;
use crate::resilience::ReconnectPolicy;

type FeedStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Close code reported when the socket ends without a close frame.
const ABNORMAL_CLOSURE: u16 = 1006;
/// Close frame received without a status code.
const NO_STATUS_RECEIVED: u16 = 1005;
/// How long to wait for the peer to finish a close it started.
const CLOSE_HANDSHAKE_TIMEOUT: Duration = Duration::from_secs(2);

/// Errors raised while opening the upstream connection.
#[derive(Debug, Error)]
pub enum UpstreamError {
    #[error("handshake timed out after {0:?}")]
    HandshakeTimeout(Duration),

    #[error("websocket error: {0}")]
    WebSocket(#[from] tokio_tungstenite::tungstenite::Error),

    #[error("failed to encode subscription: {0}")]
    Encode(#[from] serde_json::Error),
}

enum Command {
    Connect,
    Stop(oneshot::Sender<()>),
}

/// What the link task is doing right now.
enum Phase {
    Idle,
    Connecting,
    Open(Box<FeedStream>),
    Backoff(Instant),
    Exhausted,
}

/// The single outbound connection to the feed.
pub struct UpstreamLink {
    config: UpstreamConfig,
    policy: ReconnectPolicy,
    broadcaster: Arc<Broadcaster>,
    state: Arc<RelayState>,
    commands: mpsc::Receiver<Command>,
    attempts: u32,
    log_every: u64,
}

impl UpstreamLink {
    /// Spawn the link task. It stays idle until [`UpstreamHandle::connect`].
    pub fn spawn(
        config: UpstreamConfig,
        policy: ReconnectPolicy,
        broadcaster: Arc<Broadcaster>,
        log_every: u64,
    ) -> UpstreamHandle {
        let (tx, commands) = mpsc::channel(8);
        let state = broadcaster.state().clone();
        let link = Self {
            config,
            policy,
            broadcaster,
            state: state.clone(),
            commands,
            attempts: 0,
            log_every: log_every.max(1),
        };
        let task = tokio::spawn(link.run());
        UpstreamHandle {
            commands: tx,
            state,
            task: std::sync::Mutex::new(Some(task)),
        }
    }

    async fn run(mut self) {
        let mut phase = Phase::Idle;

        loop {
            phase = match phase {
                Phase::Idle | Phase::Exhausted => match self.commands.recv().await {
                    Some(Command::Connect) => Phase::Connecting,
                    Some(Command::Stop(ack)) => return self.finish(None, ack).await,
                    None => return,
                },

                Phase::Connecting => {
                    self.state.set_link_state(LinkState::Connecting);
                    tracing::info!(
                        url = %self.config.url,
                        attempt = self.attempts + 1,
                        "Connecting to upstream feed"
                    );
                    tokio::select! {
                        command = self.commands.recv() => match command {
                            Some(Command::Stop(ack)) => return self.finish(None, ack).await,
                            // Already connecting; restart the attempt.
                            Some(Command::Connect) => Phase::Connecting,
                            None => return,
                        },
                        result = open_feed(&self.config) => match result {
                            Ok(stream) => self.on_open(stream).await,
                            Err(e) => {
                                tracing::error!(error = %e, "Failed to connect to upstream feed");
                                self.on_error();
                                self.on_close(ABNORMAL_CLOSURE, "connect failed")
                            }
                        },
                    }
                }

                Phase::Open(mut stream) => {
                    tokio::select! {
                        command = self.commands.recv() => match command {
                            Some(Command::Stop(ack)) => return self.finish(Some(stream), ack).await,
                            Some(Command::Connect) => Phase::Open(stream),
                            None => return self.close_stream(&mut stream).await,
                        },
                        frame = stream.next() => match frame {
                            Some(Ok(Message::Text(text))) => {
                                self.on_message(text.as_str());
                                Phase::Open(stream)
                            }
                            Some(Ok(Message::Binary(bytes))) => {
                                self.on_message(&String::from_utf8_lossy(&bytes));
                                Phase::Open(stream)
                            }
                            Some(Ok(Message::Close(frame))) => {
                                let (code, reason) = frame
                                    .map(|f| (u16::from(f.code), f.reason.to_string()))
                                    .unwrap_or((NO_STATUS_RECEIVED, String::new()));
                                complete_close_handshake(&mut stream).await;
                                self.on_close(code, &reason)
                            }
                            Some(Ok(_)) => Phase::Open(stream),
                            Some(Err(e)) => {
                                tracing::error!(error = %e, "Upstream feed error");
                                self.on_error();
                                self.on_close(ABNORMAL_CLOSURE, &e.to_string())
                            }
                            None => self.on_close(ABNORMAL_CLOSURE, ""),
                        },
                    }
                }

                Phase::Backoff(deadline) => {
                    tokio::select! {
                        command = self.commands.recv() => match command {
                            Some(Command::Stop(ack)) => return self.finish(None, ack).await,
                            Some(Command::Connect) => Phase::Connecting,
                            None => return,
                        },
                        _ = time::sleep_until(deadline) => Phase::Connecting,
                    }
                }
            };
        }
    }

    /// Send the subscription; the link only counts as connected once it is written.
    async fn on_open(&mut self, mut stream: FeedStream) -> Phase {
        let subscription = SubscriptionMessage::from_config(&self.config);
        let sent = match subscription.to_json() {
            Ok(json) => stream.send(Message::text(json)).await.map_err(UpstreamError::from),
            Err(e) => Err(UpstreamError::from(e)),
        };

        if let Err(e) = sent {
            tracing::error!(error = %e, "Failed to send subscription");
            self.on_error();
            return self.on_close(ABNORMAL_CLOSURE, "subscription failed");
        }

        tracing::info!(
            boxes = subscription.bounding_boxes.len(),
            types = ?subscription.filter_message_types,
            "Connected to upstream feed, subscription sent"
        );
        self.attempts = 0;
        self.state.set_reconnect_attempts(0);
        self.state.set_link_state(LinkState::Connected);
        self.broadcaster
            .broadcast(&RelayEvent::status(FeedStatus::Connected, "Connected to AISStream"));
        Phase::Open(Box::new(stream))
    }

    fn on_message(&self, payload: &str) {
        let count = self.state.record_message();
        metrics::record_upstream_message();

        self.broadcaster.broadcast(&RelayEvent::data(payload));

        if count % self.log_every == 0 {
            tracing::info!(
                messages = count,
                subscribers = self.broadcaster.subscriber_count(),
                "Upstream progress"
            );
        }
    }

    fn on_error(&self) {
        self.broadcaster
            .broadcast(&RelayEvent::status(FeedStatus::Error, "AISStream connection error"));
    }

    /// Drop the connection and schedule the next attempt, if any remain.
    fn on_close(&mut self, code: u16, reason: &str) -> Phase {
        tracing::warn!(
            code,
            reason = if reason.is_empty() { "no reason" } else { reason },
            "Upstream feed closed"
        );
        self.state.set_link_state(LinkState::Disconnected);
        self.broadcaster.broadcast(&RelayEvent::status(
            FeedStatus::Disconnected,
            "Disconnected from AISStream",
        ));

        match self.policy.next_delay(self.attempts) {
            Some(delay) => {
                self.attempts = self.attempts.saturating_add(1);
                self.state.set_reconnect_attempts(self.attempts);
                self.state.set_link_state(LinkState::ReconnectScheduled);
                metrics::record_reconnect_scheduled();
                tracing::info!(
                    delay_ms = delay.as_millis() as u64,
                    attempt = self.attempts,
                    max_attempts = ?self.policy.max_attempts(),
                    "Reconnect scheduled"
                );
                Phase::Backoff(Instant::now() + delay)
            }
            None => {
                tracing::error!(
                    attempts = self.attempts,
                    "Max reconnection attempts reached, giving up on upstream feed"
                );
                self.state.set_link_state(LinkState::Exhausted);
                Phase::Exhausted
            }
        }
    }

    async fn finish(&self, stream: Option<Box<FeedStream>>, ack: oneshot::Sender<()>) {
        if let Some(mut stream) = stream {
            self.close_stream(&mut stream).await;
        }
        self.state.set_link_state(LinkState::Stopped);
        tracing::info!("Upstream link stopped");
        let _ = ack.send(());
    }

    async fn close_stream(&self, stream: &mut FeedStream) {
        let frame = CloseFrame {
            code: CloseCode::Normal,
            reason: "Relay shutting down".into(),
        };
        if let Err(e) = stream.close(Some(frame)).await {
            tracing::debug!(error = %e, "Error closing upstream connection");
        }
    }
}

/// Reply to a close started by the feed and wait for the socket to end.
///
/// tungstenite queues the close reply on receipt and only writes it on the
/// next read or flush.
async fn complete_close_handshake(stream: &mut FeedStream) {
    let drain = async {
        while let Some(Ok(_)) = stream.next().await {}
    };
    if time::timeout(CLOSE_HANDSHAKE_TIMEOUT, drain).await.is_err() {
        tracing::debug!("Upstream feed did not finish the close handshake in time");
    }
}

async fn open_feed(config: &UpstreamConfig) -> Result<FeedStream, UpstreamError> {
    let timeout = Duration::from_secs(config.handshake_timeout_secs);
    let (stream, _response) = time::timeout(timeout, tokio_tungstenite::connect_async(config.url.as_str()))
        .await
        .map_err(|_| UpstreamError::HandshakeTimeout(timeout))??;
    Ok(stream)
}

/// Control handle for the link task.
pub struct UpstreamHandle {
    commands: mpsc::Sender<Command>,
    state: Arc<RelayState>,
    task: std::sync::Mutex<Option<JoinHandle<()>>>,
}

impl UpstreamHandle {
    /// Start (or restart) a connection attempt. Also the way out of `Exhausted`.
    pub async fn connect(&self) {
        if self.commands.send(Command::Connect).await.is_err() {
            tracing::warn!("Upstream link already stopped, connect ignored");
        }
    }

    /// Cancel any pending reconnect and close the connection. Idempotent.
    ///
    /// Once this returns no further connection attempt will be made.
    pub async fn stop(&self) {
        let (ack, done) = oneshot::channel();
        if self.commands.send(Command::Stop(ack)).await.is_ok() {
            let _ = done.await;
        }
        let task = self.task.lock().ok().and_then(|mut task| task.take());
        if let Some(task) = task {
            let _ = task.await;
        }
    }

    pub fn state(&self) -> LinkState {
        self.state.link_state()
    }

    pub fn reconnect_attempts(&self) -> u32 {
        self.state.reconnect_attempts()
    }
}
