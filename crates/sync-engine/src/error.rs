//! Error types for sync operations.

use crm_client::CrmError;
use database::DatabaseError;
use gateway_client::GatewayError;
use thiserror::Error;

/// Errors that can occur while syncing or routing messages.
#[derive(Debug, Error)]
pub enum SyncError {
    /// No connected instance is linked to the location.
    #[error("no connected instance for location {0}")]
    NoInstanceAvailable(String),

    /// The CRM rejected the refresh-token grant.
    #[error("token refresh failed: {0}")]
    TokenRefresh(String),

    /// Missing credentials, base URL or other setup.
    #[error("configuration error: {0}")]
    Configuration(String),

    /// No message map entry for the given id.
    #[error("message not found: {0}")]
    MessageNotFound(String),

    /// The message has no gateway id yet.
    #[error("message {0} is not mapped to a gateway message")]
    NotMappedToGateway(String),

    /// Edits are only allowed shortly after sending.
    #[error("edit window expired: message is {age_minutes} minutes old")]
    EditWindowExpired { age_minutes: i64 },

    /// Missing or malformed request fields.
    #[error("invalid request: {0}")]
    InvalidRequest(String),

    /// A referenced instance or location does not exist.
    #[error("not found: {0}")]
    NotFound(String),

    /// The caller may not act on the resource.
    #[error("forbidden: {0}")]
    Forbidden(String),

    #[error("gateway error: {0}")]
    Gateway(#[from] GatewayError),

    #[error("CRM error: {0}")]
    Crm(#[from] CrmError),

    #[error("database error: {0}")]
    Database(#[from] DatabaseError),
}

impl SyncError {
    /// Whether the error means "the thing asked for does not exist".
    pub fn is_not_found(&self) -> bool {
        matches!(
            self,
            SyncError::MessageNotFound(_)
                | SyncError::NotMappedToGateway(_)
                | SyncError::NotFound(_)
                | SyncError::Database(DatabaseError::NotFound { .. })
        )
    }
}

/// Result type alias for sync operations.
pub type Result<T> = std::result::Result<T, SyncError>;
