//! Configuration schema definitions.
//!
//! This module defines the complete configuration structure for the relay.
//! All types derive Serde traits for deserialization from config files.

use serde::{Deserialize, Serialize};

use crate::relay::subscription::BoundingBox;

/// Root configuration for the relay.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct RelayConfig {
    /// Listener configuration for downstream subscribers.
    pub listener: ListenerConfig,

    /// Upstream feed connection and subscription parameters.
    pub upstream: UpstreamConfig,

    /// Reconnect policy for the upstream link.
    pub reconnect: ReconnectConfig,

    /// Per-subscriber delivery settings.
    pub downstream: DownstreamConfig,

    /// Observability settings.
    pub observability: ObservabilityConfig,
}

/// Listener configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ListenerConfig {
    /// Bind address (e.g., "0.0.0.0:10000").
    pub bind_address: String,
}

impl Default for ListenerConfig {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0:10000".to_string(),
        }
    }
}

/// Upstream feed configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct UpstreamConfig {
    /// WebSocket endpoint of the feed (ws:// or wss://).
    pub url: String,

    /// API key sent in the subscription message.
    pub api_key: String,

    /// Geographic regions to subscribe to.
    pub bounding_boxes: Vec<BoundingBox>,

    /// Message types the feed should deliver.
    pub filter_message_types: Vec<String>,

    /// Upper bound on the opening handshake, in seconds.
    pub handshake_timeout_secs: u64,
}

impl Default for UpstreamConfig {
    fn default() -> Self {
        Self {
            url: "wss://stream.aisstream.io/v0/stream".to_string(),
            api_key: String::new(),
            bounding_boxes: vec![BoundingBox::new([51.0, -11.0], [56.0, -5.0])],
            filter_message_types: vec!["PositionReport".to_string()],
            handshake_timeout_secs: 10,
        }
    }
}

/// How reconnect delays grow.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum ReconnectStrategy {
    /// `min(base * 2^attempts, max)`, bounded by `max_attempts`.
    #[default]
    Exponential,
    /// `base` every time, retried forever.
    Fixed,
}

/// Reconnect configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ReconnectConfig {
    pub strategy: ReconnectStrategy,

    /// Base delay in milliseconds.
    pub base_delay_ms: u64,

    /// Maximum delay for exponential backoff in milliseconds.
    pub max_delay_ms: u64,

    /// Consecutive reconnects scheduled before giving up (exponential only).
    pub max_attempts: u32,

    /// Random extra delay as a fraction of the computed delay (0.0 disables).
    pub jitter_ratio: f64,
}

impl Default for ReconnectConfig {
    fn default() -> Self {
        Self {
            strategy: ReconnectStrategy::Exponential,
            base_delay_ms: 5_000,
            max_delay_ms: 60_000,
            max_attempts: 10,
            jitter_ratio: 0.0,
        }
    }
}

/// Downstream subscriber settings.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct DownstreamConfig {
    /// Frames buffered per subscriber before it is considered dead.
    pub send_queue_capacity: usize,

    /// Keep-alive ping interval in seconds.
    pub ping_interval_secs: u64,
}

impl Default for DownstreamConfig {
    fn default() -> Self {
        Self {
            send_queue_capacity: 256,
            ping_interval_secs: 30,
        }
    }
}

/// Observability configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Log level (trace, debug, info, warn, error).
    pub log_level: String,

    /// Enable metrics endpoint.
    pub metrics_enabled: bool,

    /// Metrics endpoint bind address.
    pub metrics_address: String,

    /// Emit a progress log line every N upstream messages.
    pub log_every_n_messages: u64,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            metrics_enabled: false,
            metrics_address: "0.0.0.0:9090".to_string(),
            log_every_n_messages: 100,
        }
    }
}
