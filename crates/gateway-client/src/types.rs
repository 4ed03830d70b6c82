//! Gateway request and response types.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Tri-state connection status derived from a gateway status response.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConnectionState {
    Connected,
    Connecting,
    Disconnected,
}

impl ConnectionState {
    pub fn as_str(&self) -> &'static str {
        match self {
            ConnectionState::Connected => "connected",
            ConnectionState::Connecting => "connecting",
            ConnectionState::Disconnected => "disconnected",
        }
    }
}

/// Parsed status of one instance.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StatusReport {
    pub state: ConnectionState,
    pub logged_in: bool,
    pub jid: Option<String>,
    /// Status string as the gateway reported it, lowercased.
    pub raw_status: Option<String>,
    /// Connected phone, digits only.
    pub phone: Option<String>,
    pub avatar_url: Option<String>,
}

impl StatusReport {
    /// Report used when the gateway could not be reached.
    pub fn unreachable() -> Self {
        Self {
            state: ConnectionState::Disconnected,
            logged_in: false,
            jid: None,
            raw_status: None,
            phone: None,
            avatar_url: None,
        }
    }
}

/// Result of a connect call.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ConnectOutcome {
    /// Renderable QR image URI, when the gateway returned one inline.
    pub qr_code: Option<String>,
    pub status: StatusReport,
}

/// Body of a text send.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct SendTextRequest {
    /// Destination phone or JID.
    pub number: String,
    pub text: String,
    /// Gateway message id to quote.
    #[serde(rename = "replyid", skip_serializing_if = "Option::is_none")]
    pub reply_id: Option<String>,
    /// Tenant automation tag echoed back on the webhook.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub track_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub track_source: Option<String>,
}

impl SendTextRequest {
    pub fn new(number: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            number: number.into(),
            text: text.into(),
            ..Default::default()
        }
    }

    /// Quote an earlier message.
    pub fn reply_to(mut self, gateway_message_id: impl Into<String>) -> Self {
        self.reply_id = Some(gateway_message_id.into());
        self
    }

    /// Tag the send so the echoed webhook is recognised as our own automation.
    pub fn with_track_id(mut self, track_id: impl Into<String>) -> Self {
        self.track_id = Some(track_id.into());
        self.track_source = Some("bridge".to_string());
        self
    }
}

/// Result of a send.
#[derive(Debug, Clone, PartialEq)]
pub struct SentMessage {
    /// Gateway message id, when the response carried one.
    pub message_id: Option<String>,
    pub raw: Value,
}

/// Result of a gateway health probe.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct HealthReport {
    pub healthy: bool,
    /// HTTP status, absent when no response arrived.
    pub status: Option<u16>,
    pub latency_ms: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_send_text_request_serialization() {
        let req = SendTextRequest::new("5511999998888", "hello").reply_to("ABC");
        let value = serde_json::to_value(&req).unwrap();
        assert_eq!(
            value,
            json!({"number": "5511999998888", "text": "hello", "replyid": "ABC"})
        );
    }

    #[test]
    fn test_track_id_sets_source() {
        let req = SendTextRequest::new("1", "x").with_track_id("trk");
        let value = serde_json::to_value(&req).unwrap();
        assert_eq!(value["track_id"], "trk");
        assert_eq!(value["track_source"], "bridge");
    }
}
