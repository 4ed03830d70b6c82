//! Database models.

use serde::{Deserialize, Serialize};
use sqlx::types::Json;
use sqlx::FromRow;

/// A platform account that owns instances and CRM credentials.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, FromRow)]
pub struct Tenant {
    /// Tenant identifier.
    pub id: String,
    /// Display name.
    pub name: String,
    /// Access role (`member` or `admin`).
    pub role: String,
    /// Opaque tag that marks messages sent by this tenant's own automation.
    pub track_id: Option<String>,
    /// Default gateway base URL for this tenant's instances.
    pub gateway_base_url: Option<String>,
    /// Gateway admin token.
    pub gateway_admin_token: Option<String>,
    /// CRM OAuth client id (falls back to the platform credential when absent).
    pub oauth_client_id: Option<String>,
    /// CRM OAuth client secret.
    pub oauth_client_secret: Option<String>,
    /// Language used for annotations (`pt`, `en`, `es`).
    pub language: String,
    /// Creation time, unix milliseconds.
    pub created_at: i64,
}

impl Tenant {
    /// Whether this tenant carries the admin role.
    pub fn is_admin(&self) -> bool {
        self.role == "admin"
    }
}

/// A CRM sub-account (location) with its OAuth tokens.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, FromRow)]
pub struct Location {
    /// Row id.
    pub id: i64,
    /// CRM location identifier.
    pub location_id: String,
    /// Owning tenant.
    pub tenant_id: String,
    pub access_token: Option<String>,
    pub refresh_token: Option<String>,
    /// Access token expiry, unix seconds.
    pub expires_at: Option<i64>,
    /// Public token for unauthenticated embed access.
    pub embed_token: Option<String>,
    /// Mirrored rows share reads with the owner row but never receive writes.
    pub is_mirror: bool,
    pub created_at: i64,
}

impl Location {
    /// Whether both OAuth tokens are present.
    pub fn has_oauth(&self) -> bool {
        self.access_token.as_deref().is_some_and(|t| !t.is_empty())
            && self.refresh_token.as_deref().is_some_and(|t| !t.is_empty())
    }
}

/// Connection state of an instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type)]
#[sqlx(rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum InstanceStatus {
    Connected,
    Connecting,
    Disconnected,
}

impl InstanceStatus {
    /// Database and wire representation.
    pub fn as_str(&self) -> &'static str {
        match self {
            InstanceStatus::Connected => "connected",
            InstanceStatus::Connecting => "connecting",
            InstanceStatus::Disconnected => "disconnected",
        }
    }
}

/// A WhatsApp connection tracked by the bridge.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, FromRow)]
pub struct Instance {
    pub id: String,
    pub tenant_id: String,
    /// Linked CRM location, if any.
    pub location_id: Option<String>,
    /// Human-readable name shown in switch annotations.
    pub name: String,
    /// Gateway authentication token (also identifies inbound webhooks).
    pub gateway_token: String,
    /// Per-instance gateway base URL override.
    pub gateway_base_url: Option<String>,
    pub status: InstanceStatus,
    /// Connected phone number, digits only.
    pub phone: Option<String>,
    pub avatar_url: Option<String>,
    /// CRM user that contacts are auto-assigned to.
    pub assigned_user_id: Option<String>,
    pub webhook_url: Option<String>,
    pub ignore_groups: bool,
    /// Whether this instance runs on the shared/official gateway.
    pub is_official: bool,
    pub created_at: i64,
}

/// Cross-system identifier bridge for one message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, FromRow)]
pub struct MessageMapEntry {
    /// CRM message id (unique).
    pub ghl_message_id: String,
    /// Gateway message id, once known.
    pub gateway_message_id: Option<String>,
    pub location_id: String,
    pub contact_id: Option<String>,
    pub instance_id: Option<String>,
    pub message_text: String,
    /// `text` or `media`.
    pub message_type: String,
    pub from_me: bool,
    pub reactions: Json<Vec<String>>,
    pub is_deleted: bool,
    pub is_edited: bool,
    /// Original send time, unix milliseconds.
    pub original_timestamp: i64,
    pub created_at: i64,
}

/// Data needed to create a message map entry.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct NewMessageMapEntry {
    pub ghl_message_id: String,
    pub gateway_message_id: Option<String>,
    pub location_id: String,
    pub contact_id: Option<String>,
    pub instance_id: Option<String>,
    pub message_text: String,
    pub message_type: String,
    pub from_me: bool,
    pub original_timestamp: i64,
}

/// Stored "last instance used" association for a lead.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, FromRow)]
pub struct ContactInstancePreference {
    pub id: i64,
    pub location_id: String,
    pub contact_id: Option<String>,
    /// Lead phone, digits only.
    pub lead_phone: Option<String>,
    pub instance_id: String,
    pub created_at: i64,
    pub updated_at: i64,
}

/// Secondary index from CRM contact id to phone.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, FromRow)]
pub struct ContactPhone {
    pub contact_id: String,
    pub location_id: String,
    pub phone: String,
    pub updated_at: i64,
}
