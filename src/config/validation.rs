//! Configuration validation.
//!
//! # Responsibilities
//! - Semantic validation (serde handles syntactic)
//! - Validate value ranges (delays > 0, coordinates on the globe)
//! - Check addresses and the upstream URL parse
//!
//! # Design Decisions
//! - Returns all validation errors, not just first
//! - Validation is pure function: RelayConfig → Result<(), Vec<ValidationError>>
//! - Runs before any upstream connection is attempted

use std::net::SocketAddr;

use thiserror::Error;
use url::Url;

use crate::config::schema::{ReconnectStrategy, RelayConfig};

/// A single semantic problem with the configuration.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ValidationError {
    #[error("upstream.api_key must not be empty")]
    MissingApiKey,

    #[error("upstream.url {url:?} is invalid: {reason}")]
    InvalidUpstreamUrl { url: String, reason: String },

    #[error("upstream.bounding_boxes must contain at least one region")]
    NoBoundingBoxes,

    #[error("upstream.bounding_boxes[{index}] has out-of-range coordinates")]
    InvalidBoundingBox { index: usize },

    #[error("upstream.filter_message_types must not be empty")]
    NoMessageTypes,

    #[error("upstream.filter_message_types[{index}] is blank")]
    BlankMessageType { index: usize },

    #[error("{field} {value:?} is not a valid socket address")]
    InvalidAddress { field: &'static str, value: String },

    #[error("{field} must be greater than zero")]
    Zero { field: &'static str },

    #[error("reconnect.max_delay_ms ({max}) is below reconnect.base_delay_ms ({base})")]
    DelayRange { base: u64, max: u64 },

    #[error("reconnect.jitter_ratio {0} must be within [0, 1]")]
    JitterRange(f64),
}

/// Validate a parsed configuration.
pub fn validate_config(config: &RelayConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    let upstream = &config.upstream;
    if upstream.api_key.trim().is_empty() {
        errors.push(ValidationError::MissingApiKey);
    }

    match Url::parse(&upstream.url) {
        Ok(url) if matches!(url.scheme(), "ws" | "wss") => {}
        Ok(url) => errors.push(ValidationError::InvalidUpstreamUrl {
            url: upstream.url.clone(),
            reason: format!("unsupported scheme {:?}", url.scheme()),
        }),
        Err(e) => errors.push(ValidationError::InvalidUpstreamUrl {
            url: upstream.url.clone(),
            reason: e.to_string(),
        }),
    }

    if upstream.bounding_boxes.is_empty() {
        errors.push(ValidationError::NoBoundingBoxes);
    }
    for (index, bbox) in upstream.bounding_boxes.iter().enumerate() {
        if !bbox.is_valid() {
            errors.push(ValidationError::InvalidBoundingBox { index });
        }
    }

    if upstream.filter_message_types.is_empty() {
        errors.push(ValidationError::NoMessageTypes);
    }
    for (index, message_type) in upstream.filter_message_types.iter().enumerate() {
        if message_type.trim().is_empty() {
            errors.push(ValidationError::BlankMessageType { index });
        }
    }

    if upstream.handshake_timeout_secs == 0 {
        errors.push(ValidationError::Zero { field: "upstream.handshake_timeout_secs" });
    }

    if config.listener.bind_address.parse::<SocketAddr>().is_err() {
        errors.push(ValidationError::InvalidAddress {
            field: "listener.bind_address",
            value: config.listener.bind_address.clone(),
        });
    }

    let reconnect = &config.reconnect;
    if reconnect.base_delay_ms == 0 {
        errors.push(ValidationError::Zero { field: "reconnect.base_delay_ms" });
    }
    if reconnect.strategy == ReconnectStrategy::Exponential {
        if reconnect.max_delay_ms < reconnect.base_delay_ms {
            errors.push(ValidationError::DelayRange {
                base: reconnect.base_delay_ms,
                max: reconnect.max_delay_ms,
            });
        }
        if reconnect.max_attempts == 0 {
            errors.push(ValidationError::Zero { field: "reconnect.max_attempts" });
        }
    }
    if !(0.0..=1.0).contains(&reconnect.jitter_ratio) {
        errors.push(ValidationError::JitterRange(reconnect.jitter_ratio));
    }

    if config.downstream.send_queue_capacity == 0 {
        errors.push(ValidationError::Zero { field: "downstream.send_queue_capacity" });
    }
    if config.downstream.ping_interval_secs == 0 {
        errors.push(ValidationError::Zero { field: "downstream.ping_interval_secs" });
    }

    let observability = &config.observability;
    if observability.log_every_n_messages == 0 {
        errors.push(ValidationError::Zero { field: "observability.log_every_n_messages" });
    }
    if observability.metrics_enabled
        && observability.metrics_address.parse::<SocketAddr>().is_err()
    {
        errors.push(ValidationError::InvalidAddress {
            field: "observability.metrics_address",
            value: observability.metrics_address.clone(),
        });
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}
