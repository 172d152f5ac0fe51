//! HTTP server setup and configuration.
//!
//! # Responsibilities
//! - Create Axum Router with all handlers
//! - Upgrade downstream WebSocket connections into subscribers
//! - Serve `/health` and the `/status` page
//! - Wire up middleware (tracing, CORS)
//! - Drain on shutdown signal

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use axum::{
    extract::{
        rejection::ExtensionRejection,
        ws::{rejection::WebSocketUpgradeRejection, WebSocketUpgrade},
        ConnectInfo, State,
    },
    http::HeaderMap,
    response::{IntoResponse, Response},
    routing::get,
    Router,
};
use tokio::net::TcpListener;
use tokio::sync::broadcast;
use tower_http::{cors::CorsLayer, trace::TraceLayer};

use crate::config::RelayConfig;
use crate::http::{status, websocket};
use crate::relay::Broadcaster;

/// Application state injected into handlers.
#[derive(Clone)]
pub struct AppState {
    pub broadcaster: Arc<Broadcaster>,
    pub ping_interval: Duration,
}

/// HTTP/WebSocket front of the relay.
pub struct RelayServer {
    router: Router,
    config: RelayConfig,
}

impl RelayServer {
    pub fn new(config: RelayConfig, broadcaster: Arc<Broadcaster>) -> Self {
        let state = AppState {
            broadcaster,
            ping_interval: Duration::from_secs(config.downstream.ping_interval_secs),
        };
        Self {
            router: Self::build_router(state),
            config,
        }
    }

    /// Build the Axum router with all middleware layers.
    pub fn build_router(state: AppState) -> Router {
        Router::new()
            .route("/", get(root_handler))
            .route("/ws", get(ws_handler))
            .route("/health", get(health_handler))
            .route("/status", get(status_handler))
            .with_state(state)
            .layer(CorsLayer::permissive())
            .layer(TraceLayer::new_for_http())
    }

    /// Run the server until the shutdown receiver fires.
    pub async fn run(
        self,
        listener: TcpListener,
        mut shutdown: broadcast::Receiver<()>,
    ) -> Result<(), std::io::Error> {
        let addr = listener.local_addr()?;
        tracing::info!(address = %addr, "Relay server listening");

        let app = self.router.into_make_service_with_connect_info::<SocketAddr>();
        axum::serve(listener, app)
            .with_graceful_shutdown(async move {
                let _ = shutdown.recv().await;
                tracing::info!("HTTP server draining");
            })
            .await?;

        tracing::info!("HTTP server stopped");
        Ok(())
    }

    pub fn config(&self) -> &RelayConfig {
        &self.config
    }
}

fn upgrade(ws: WebSocketUpgrade, addr: Option<SocketAddr>, state: AppState) -> Response {
    ws.on_upgrade(move |socket| {
        websocket::serve_subscriber(socket, addr, state.broadcaster, state.ping_interval)
    })
}

/// `/` doubles as the WebSocket endpoint and the status page.
async fn root_handler(
    ws: Result<WebSocketUpgrade, WebSocketUpgradeRejection>,
    connect_info: Result<ConnectInfo<SocketAddr>, ExtensionRejection>,
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Response {
    match ws {
        Ok(ws) => upgrade(ws, connect_info.ok().map(|ConnectInfo(addr)| addr), state),
        Err(_) => status::status_page(&state.broadcaster, &headers).into_response(),
    }
}

async fn ws_handler(
    ws: WebSocketUpgrade,
    connect_info: Result<ConnectInfo<SocketAddr>, ExtensionRejection>,
    State(state): State<AppState>,
) -> Response {
    upgrade(ws, connect_info.ok().map(|ConnectInfo(addr)| addr), state)
}

async fn health_handler(State(state): State<AppState>) -> impl IntoResponse {
    status::health_report(&state.broadcaster)
}

async fn status_handler(State(state): State<AppState>, headers: HeaderMap) -> impl IntoResponse {
    status::status_page(&state.broadcaster, &headers)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::relay::{LinkState, RelayState, SubscriberRegistry};
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use tower::ServiceExt;

    fn state() -> AppState {
        AppState {
            broadcaster: Arc::new(Broadcaster::new(
                Arc::new(SubscriberRegistry::new(8)),
                Arc::new(RelayState::new()),
            )),
            ping_interval: Duration::from_secs(30),
        }
    }

    async fn body_json(response: Response) -> serde_json::Value {
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn test_health_reports_counts() {
        let state = state();
        state.broadcaster.state().record_message();
        let _subscriber = state.broadcaster.register(None);

        let response = RelayServer::build_router(state)
            .oneshot(Request::get("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let body = body_json(response).await;
        assert_eq!(body["status"], "ok");
        assert_eq!(body["clients"], 1);
        assert_eq!(body["messageCount"], 1);
        assert_eq!(body["aisConnected"], false);
        assert_eq!(body["upstreamState"], "disconnected");
    }

    #[tokio::test]
    async fn test_health_fails_when_exhausted() {
        let state = state();
        state.broadcaster.state().set_link_state(LinkState::Exhausted);

        let response = RelayServer::build_router(state)
            .oneshot(Request::get("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(body_json(response).await["status"], "exhausted");
    }

    #[tokio::test]
    async fn test_plain_get_on_root_renders_status_page() {
        let response = RelayServer::build_router(state())
            .oneshot(
                Request::get("/")
                    .header("host", "relay.example.com")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let html = String::from_utf8(bytes.to_vec()).unwrap();
        assert!(html.contains("AIS Stream Relay Server"));
        assert!(html.contains("wss://relay.example.com/"));
        assert!(html.contains("Running"));
        assert!(html.contains("Use this URL in your frontend application"));
    }

    #[tokio::test]
    async fn test_unknown_path_is_404() {
        let response = RelayServer::build_router(state())
            .oneshot(Request::get("/nope").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }
}
