/// Push-feed wire format and message classification

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Heartbeat cadence while a feed connection is up
pub const HEARTBEAT_INTERVAL_MS: u64 = 5_000;

/// The heartbeat frame exactly as it goes over the wire
pub const HEARTBEAT_FRAME: &str = r#"{"type":"heartbeat","message":"ping","data":null}"#;

/// JSON envelope used by the push feed: `{type, message, data}`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeedEnvelope {
    #[serde(rename = "type")]
    pub kind: String,
    pub message: String,
    #[serde(default)]
    pub data: Option<Value>,
}

impl FeedEnvelope {
    /// The literal heartbeat frame: `{"type":"heartbeat","message":"ping","data":null}`
    pub fn heartbeat() -> Self {
        Self {
            kind: "heartbeat".to_string(),
            message: "ping".to_string(),
            data: None,
        }
    }

    /// A message is a success signal iff type == "message", message ==
    /// "success", and data is non-null.
    pub fn is_success(&self) -> bool {
        self.kind == "message" && self.message == "success" && self.data.is_some()
    }

    /// Defensive parse: empty or unparsable payloads are "no update",
    /// never an error.
    pub fn parse(raw: &str) -> Option<Self> {
        if raw.trim().is_empty() {
            return None;
        }
        serde_json::from_str(raw).ok()
    }

    /// Extract the payload of a success message, if any
    pub fn success_payload(raw: &str) -> Option<Value> {
        let envelope = Self::parse(raw)?;
        if envelope.is_success() {
            envelope.data
        } else {
            None
        }
    }
}
