//! Shared utilities for integration tests.

#![allow(dead_code)]

use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use ais_relay::config::UpstreamConfig;
use ais_relay::relay::{Broadcaster, RelayState, SubscriberRegistry, UpstreamHandle, UpstreamLink};
use ais_relay::resilience::ReconnectPolicy;
use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpListener;
use tokio::sync::{mpsc, oneshot, Mutex};
use tokio_tungstenite::tungstenite::Message;

pub const TEST_API_KEY: &str = "test-key";

enum FeedCommand {
    Send(String),
    Close,
}

/// One upstream connection as seen by the mock feed.
pub struct FeedSession {
    /// First text frame the relay sent.
    pub subscription: String,
    commands: mpsc::UnboundedSender<FeedCommand>,
    closed: Option<oneshot::Receiver<Option<u16>>>,
    acknowledged: Option<oneshot::Receiver<bool>>,
}

impl FeedSession {
    pub fn send(&self, text: impl Into<String>) {
        let _ = self.commands.send(FeedCommand::Send(text.into()));
    }

    /// Close from the feed side.
    pub fn close(&self) {
        let _ = self.commands.send(FeedCommand::Close);
    }

    /// Close from the feed side and report whether the relay answered with
    /// a close frame instead of dropping the socket.
    pub async fn close_acknowledged(&mut self) -> bool {
        self.close();
        let Some(acknowledged) = self.acknowledged.take() else {
            return false;
        };
        matches!(
            tokio::time::timeout(Duration::from_secs(5), acknowledged).await,
            Ok(Ok(true))
        )
    }

    /// Wait for the relay to close this connection; yields its close code.
    pub async fn closed_by_relay(&mut self) -> Option<u16> {
        let closed = self.closed.take()?;
        tokio::time::timeout(Duration::from_secs(5), closed)
            .await
            .ok()?
            .ok()?
    }
}

/// A programmable stand-in for the upstream feed.
pub struct MockFeed {
    pub addr: SocketAddr,
    accepted: Arc<AtomicUsize>,
    accepting: Arc<AtomicBool>,
    sessions: Mutex<mpsc::UnboundedReceiver<FeedSession>>,
}

impl MockFeed {
    pub async fn start() -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let accepted = Arc::new(AtomicUsize::new(0));
        let accepting = Arc::new(AtomicBool::new(true));
        let (session_tx, sessions) = mpsc::unbounded_channel();

        let counter = accepted.clone();
        let gate = accepting.clone();
        tokio::spawn(async move {
            while let Ok((socket, _)) = listener.accept().await {
                counter.fetch_add(1, Ordering::SeqCst);
                if !gate.load(Ordering::SeqCst) {
                    drop(socket);
                    continue;
                }
                let session_tx = session_tx.clone();
                tokio::spawn(async move {
                    let Ok(mut ws) = tokio_tungstenite::accept_async(socket).await else {
                        return;
                    };
                    let subscription = match ws.next().await {
                        Some(Ok(Message::Text(text))) => text.to_string(),
                        _ => return,
                    };

                    let (tx, mut commands) = mpsc::unbounded_channel();
                    let (closed_tx, closed) = oneshot::channel();
                    let mut closed_tx = Some(closed_tx);
                    let (acknowledged_tx, acknowledged) = oneshot::channel();
                    let mut acknowledged_tx = Some(acknowledged_tx);
                    let _ = session_tx.send(FeedSession {
                        subscription,
                        commands: tx,
                        closed: Some(closed),
                        acknowledged: Some(acknowledged),
                    });

                    loop {
                        tokio::select! {
                            command = commands.recv() => match command {
                                Some(FeedCommand::Send(text)) => {
                                    if ws.send(Message::text(text)).await.is_err() {
                                        break;
                                    }
                                }
                                Some(FeedCommand::Close) | None => {
                                    let _ = ws.close(None).await;
                                    let replied = loop {
                                        match ws.next().await {
                                            Some(Ok(Message::Close(_))) => break true,
                                            Some(Ok(_)) => continue,
                                            _ => break false,
                                        }
                                    };
                                    if let Some(tx) = acknowledged_tx.take() {
                                        let _ = tx.send(replied);
                                    }
                                    break;
                                }
                            },
                            message = ws.next() => match message {
                                Some(Ok(Message::Close(frame))) => {
                                    if let Some(tx) = closed_tx.take() {
                                        let _ = tx.send(frame.map(|f| u16::from(f.code)));
                                    }
                                    break;
                                }
                                Some(Ok(_)) => {}
                                _ => break,
                            },
                        }
                    }
                });
            }
        });

        Self {
            addr,
            accepted,
            accepting,
            sessions: Mutex::new(sessions),
        }
    }

    pub fn url(&self) -> String {
        format!("ws://{}", self.addr)
    }

    /// TCP connections accepted so far, including refused ones.
    pub fn accepted(&self) -> usize {
        self.accepted.load(Ordering::SeqCst)
    }

    /// When false, connections are dropped before the handshake.
    pub fn set_accepting(&self, accepting: bool) {
        self.accepting.store(accepting, Ordering::SeqCst);
    }

    pub async fn next_session(&self) -> FeedSession {
        tokio::time::timeout(Duration::from_secs(5), self.sessions.lock().await.recv())
            .await
            .expect("timed out waiting for upstream session")
            .expect("mock feed stopped")
    }
}

pub fn upstream_config(url: String) -> UpstreamConfig {
    UpstreamConfig {
        url,
        api_key: TEST_API_KEY.to_string(),
        handshake_timeout_secs: 2,
        ..UpstreamConfig::default()
    }
}

pub fn broadcaster() -> Arc<Broadcaster> {
    Arc::new(Broadcaster::new(
        Arc::new(SubscriberRegistry::new(1024)),
        Arc::new(RelayState::new()),
    ))
}

pub fn spawn_link(url: String, policy: ReconnectPolicy) -> (Arc<Broadcaster>, UpstreamHandle) {
    let broadcaster = broadcaster();
    let handle = UpstreamLink::spawn(upstream_config(url), policy, broadcaster.clone(), 100);
    (broadcaster, handle)
}

/// Address nobody is listening on.
pub async fn unused_addr() -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    listener.local_addr().unwrap()
}

/// Poll `condition` until it holds or `timeout` passes.
pub async fn wait_until<F>(timeout: Duration, mut condition: F) -> bool
where
    F: FnMut() -> bool,
{
    let deadline = tokio::time::Instant::now() + timeout;
    while tokio::time::Instant::now() < deadline {
        if condition() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    condition()
}

pub fn parse(text: &str) -> serde_json::Value {
    serde_json::from_str(text).unwrap()
}
