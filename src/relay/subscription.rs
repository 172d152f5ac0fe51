//! Upstream subscription message.

use serde::{Deserialize, Serialize};

use crate::config::UpstreamConfig;

/// A geographic region given by two `[lat, lon]` corners.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BoundingBox(pub [[f64; 2]; 2]);

impl BoundingBox {
    pub fn new(corner_a: [f64; 2], corner_b: [f64; 2]) -> Self {
        Self([corner_a, corner_b])
    }

    /// True when both corners lie on the globe.
    pub fn is_valid(&self) -> bool {
        self.0.iter().all(|[lat, lon]| {
            (-90.0..=90.0).contains(lat) && (-180.0..=180.0).contains(lon)
        })
    }
}

/// First frame sent on every upstream connection.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct SubscriptionMessage {
    #[serde(rename = "APIKey")]
    pub api_key: String,
    pub bounding_boxes: Vec<BoundingBox>,
    pub filter_message_types: Vec<String>,
}

impl SubscriptionMessage {
    pub fn from_config(config: &UpstreamConfig) -> Self {
        Self {
            api_key: config.api_key.clone(),
            bounding_boxes: config.bounding_boxes.clone(),
            filter_message_types: config.filter_message_types.clone(),
        }
    }

    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}
