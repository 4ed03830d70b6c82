//! Error types for crm-client.

use thiserror::Error;

/// Errors that can occur when calling the CRM API.
#[derive(Debug, Error)]
pub enum CrmError {
    /// HTTP request failed.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// JSON serialization/deserialization failed.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// API answered with a non-success status.
    #[error("CRM API error ({status}): {body}")]
    Api { status: u16, body: String },

    /// The refresh-token grant was rejected.
    #[error("Token refresh failed: {0}")]
    TokenRefresh(String),

    /// Contact creation hit an existing contact.
    #[error("Contact already exists: {contact_id}")]
    DuplicateContact { contact_id: String },

    /// Missing credentials or base URL.
    #[error("Invalid configuration: {0}")]
    Configuration(String),
}

impl CrmError {
    /// Whether a retry may succeed (429, 5xx or a transport failure).
    pub fn is_transient(&self) -> bool {
        match self {
            CrmError::Http(e) => e.is_timeout() || e.is_connect() || e.is_request(),
            CrmError::Api { status, .. } => *status == 429 || *status >= 500,
            _ => false,
        }
    }
}

/// Result type alias for CRM operations.
pub type Result<T> = std::result::Result<T, CrmError>;
