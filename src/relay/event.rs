//! Events pushed to downstream subscribers.

use serde::{Deserialize, Serialize};

/// Upstream link status as reported to subscribers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FeedStatus {
    Connected,
    Disconnected,
    Error,
}

/// A single frame of the downstream protocol.
///
/// ```text
/// {"type":"status","status":"connected","message":"Connected to AISStream"}
/// {"type":"ais-data","data":"<raw upstream text>"}
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum RelayEvent {
    #[serde(rename = "status")]
    Status {
        status: FeedStatus,
        message: String,
        /// Only set on the greeting sent to a newly registered subscriber.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        clients: Option<usize>,
    },

    /// Opaque upstream payload, never parsed.
    #[serde(rename = "ais-data")]
    Data { data: String },
}

impl RelayEvent {
    pub fn status(status: FeedStatus, message: impl Into<String>) -> Self {
        Self::Status {
            status,
            message: message.into(),
            clients: None,
        }
    }

    pub fn data(payload: impl Into<String>) -> Self {
        Self::Data {
            data: payload.into(),
        }
    }
}
