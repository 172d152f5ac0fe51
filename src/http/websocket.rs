//! Downstream WebSocket subscribers.
//!
//! # Responsibilities
//! - Register each upgraded connection with the broadcaster
//! - Drain the subscriber queue into the socket, with keep-alive pings
//! - Unregister on close or error
//!
//! # Data Flow
//! ```text
//! Broadcaster ── bounded queue ──→ writer task ──→ Client
//! Client ──→ reader task (logged, otherwise ignored)
//! ```

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use axum::extract::ws::{close_code, CloseFrame, Message, WebSocket};
use futures_util::{SinkExt, StreamExt};

use crate::relay::{Broadcaster, SubscriberHandle};

/// Serve one subscriber until either side goes away.
pub async fn serve_subscriber(
    socket: WebSocket,
    addr: Option<SocketAddr>,
    broadcaster: Arc<Broadcaster>,
    ping_interval: Duration,
) {
    let SubscriberHandle { id, mut frames } = broadcaster.register(addr);
    let (mut sink, mut stream) = socket.split();

    let mut writer = tokio::spawn(async move {
        let mut ping = tokio::time::interval(ping_interval);
        ping.tick().await;

        loop {
            tokio::select! {
                frame = frames.recv() => match frame {
                    Some(text) => {
                        if sink.send(Message::Text(text)).await.is_err() {
                            break;
                        }
                    }
                    None => {
                        // Dropped by the registry: shutdown or too slow.
                        let close = CloseFrame {
                            code: close_code::NORMAL,
                            reason: "Subscription closed".into(),
                        };
                        let _ = sink.send(Message::Close(Some(close))).await;
                        break;
                    }
                },
                _ = ping.tick() => {
                    if sink.send(Message::Ping(Vec::new().into())).await.is_err() {
                        break;
                    }
                    tracing::trace!(subscriber = %id, "Sent ping");
                }
            }
        }
    });

    let mut reader = tokio::spawn(async move {
        while let Some(message) = stream.next().await {
            match message {
                Ok(Message::Text(text)) => {
                    tracing::debug!(subscriber = %id, message = %text.as_str(), "Received from subscriber");
                }
                Ok(Message::Close(frame)) => {
                    let code = frame.as_ref().map(|f| f.code);
                    let reason = frame.map(|f| f.reason.to_string()).unwrap_or_default();
                    tracing::info!(subscriber = %id, code = ?code, reason = %reason, "Subscriber closed connection");
                    break;
                }
                Ok(_) => {}
                Err(e) => {
                    tracing::warn!(subscriber = %id, error = %e, "Subscriber connection error");
                    break;
                }
            }
        }
    });

    tokio::select! {
        _ = &mut writer => reader.abort(),
        _ = &mut reader => writer.abort(),
    }

    broadcaster.unregister(&id);
}
