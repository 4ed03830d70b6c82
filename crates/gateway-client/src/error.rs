//! Error types for gateway-client.

use thiserror::Error;

/// Errors that can occur when talking to the WhatsApp gateway.
#[derive(Debug, Error)]
pub enum GatewayError {
    /// HTTP request failed.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// JSON serialization/deserialization failed.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// No usable base URL or token.
    #[error("Invalid configuration: {0}")]
    Configuration(String),

    /// Gateway answered with a non-success status.
    #[error("Gateway returned {status}: {body}")]
    Status { status: u16, body: String },

    /// No QR code could be obtained from any endpoint.
    #[error("QR code unavailable")]
    QrUnavailable,

    /// Every candidate endpoint was tried and none succeeded.
    #[error("All gateway endpoints failed: {0}")]
    AllEndpointsFailed(String),

    /// Response parsed but lacked the expected field.
    #[error("Unexpected gateway response: {0}")]
    UnexpectedResponse(String),
}
