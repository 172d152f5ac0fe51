//! Read-only status reporting: `/health` JSON and the `/status` page.

use axum::http::{header, HeaderMap, StatusCode};
use axum::response::Html;
use axum::Json;

use crate::relay::{Broadcaster, StatusSnapshot};

/// JSON health report. 503 once the upstream link has given up.
pub fn health_report(broadcaster: &Broadcaster) -> (StatusCode, Json<StatusSnapshot>) {
    let snapshot = broadcaster.state().snapshot(broadcaster.subscriber_count());
    let code = if snapshot.status == "ok" {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };
    (code, Json(snapshot))
}

/// Auto-refreshing HTML page with the same figures.
pub fn status_page(broadcaster: &Broadcaster, headers: &HeaderMap) -> Html<String> {
    let snapshot = broadcaster.state().snapshot(broadcaster.subscriber_count());
    let host = headers
        .get(header::HOST)
        .and_then(|v| v.to_str().ok())
        .unwrap_or("localhost");

    let (link_class, link_label) = if snapshot.ais_connected {
        ("connected", "Connected".to_string())
    } else {
        ("disconnected", format!("{:?}", snapshot.upstream_state))
    };

    Html(format!(
        r#"<!DOCTYPE html>
<html>
<head>
  <title>AIS Relay Server</title>
  <meta http-equiv="refresh" content="5">
  <style>
    body {{ font-family: Arial; padding: 20px; background: #1a1a1a; color: #fff; }}
    .status {{ padding: 15px; background: #2a2a2a; border-radius: 8px; margin: 10px 0; }}
    .connected {{ color: #00ff00; }}
    .disconnected {{ color: #ff0000; }}
    code {{ background: #333; padding: 2px 6px; border-radius: 3px; }}
  </style>
</head>
<body>
  <h1>AIS Stream Relay Server</h1>
  <div class="status">
    <strong>Status:</strong> <span class="connected">Running</span><br>
    <strong>Connected Clients:</strong> {clients}<br>
    <strong>AIS Connection:</strong> <span class="{link_class}">{link_label}</span><br>
    <strong>Reconnect Attempts:</strong> {attempts}<br>
    <strong>Messages Processed:</strong> {messages}<br>
    <strong>Uptime:</strong> {uptime}s
  </div>
  <p>WebSocket endpoint: <code>wss://{host}/</code></p>
  <p>Use this URL in your frontend application.</p>
  <p><small>Auto-refreshing every 5 seconds</small></p>
</body>
</html>
"#,
        clients = snapshot.clients,
        attempts = snapshot.reconnect_attempts,
        messages = snapshot.message_count,
        uptime = snapshot.uptime,
    ))
}
