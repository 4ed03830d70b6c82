//! CRM request and response types.

use serde::{Deserialize, Serialize};

/// Successful refresh-token grant.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct TokenGrant {
    pub access_token: String,
    pub refresh_token: String,
    /// Lifetime in seconds.
    pub expires_in: i64,
    #[serde(default, rename = "locationId")]
    pub location_id: Option<String>,
}

/// A CRM contact, reduced to the fields the bridge reads.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase", default)]
pub struct Contact {
    pub id: String,
    pub location_id: Option<String>,
    pub phone: Option<String>,
    pub email: Option<String>,
    pub first_name: Option<String>,
    pub name: Option<String>,
    pub assigned_to: Option<String>,
    pub tags: Vec<String>,
}

/// Body of a contact creation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct NewContact {
    pub location_id: String,
    pub phone: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    /// Group chats stash the full group JID here so it stays searchable.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub tags: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source: Option<String>,
}

/// Partial contact update.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct ContactUpdate {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub assigned_to: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub profile_photo: Option<String>,
}

impl ContactUpdate {
    pub fn is_empty(&self) -> bool {
        self.assigned_to.is_none() && self.profile_photo.is_none()
    }
}

/// A conversation message to sync into the CRM.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct CrmMessage {
    pub contact_id: String,
    pub message: String,
    /// Public media URLs.
    pub attachments: Vec<String>,
    /// Gateway message id, stored by the CRM as the external id.
    pub alt_id: Option<String>,
    /// CRM user the message is attributed to (outbound only).
    pub user_id: Option<String>,
}

impl CrmMessage {
    pub fn text(contact_id: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            contact_id: contact_id.into(),
            message: message.into(),
            ..Default::default()
        }
    }
}

/// Wire body for the conversation message endpoints.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct MessageBody<'a> {
    #[serde(rename = "type")]
    pub kind: &'a str,
    pub contact_id: &'a str,
    pub message: &'a str,
    #[serde(skip_serializing_if = "no_attachments")]
    pub attachments: &'a [String],
    #[serde(skip_serializing_if = "Option::is_none")]
    pub conversation_provider_id: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub alt_id: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_id: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub direction: Option<&'a str>,
}

fn no_attachments(attachments: &&[String]) -> bool {
    attachments.is_empty()
}

/// Ids returned after a message was stored.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SentCrmMessage {
    pub message_id: String,
    #[serde(default)]
    pub conversation_id: Option<String>,
}
