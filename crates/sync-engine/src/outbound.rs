//! Relay of CRM-typed messages to WhatsApp.

use database::{ledger, message_map, phone, NewMessageMapEntry};
use gateway_client::SendTextRequest;
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::{debug, error, info};

use crate::engine::SyncEngine;
use crate::error::{Result, SyncError};

/// Outbound message event posted by the CRM conversation provider.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CrmOutboundMessage {
    pub location_id: String,
    pub contact_id: String,
    pub message_id: String,
    #[serde(default, alias = "body")]
    pub message: String,
    pub phone: Option<String>,
    #[serde(default)]
    pub attachments: Vec<String>,
    pub user_id: Option<String>,
}

/// Result of relaying one CRM message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RelayOutcome {
    Ignored { reason: &'static str },
    Relayed {
        instance_id: String,
        gateway_message_id: Option<String>,
    },
}

impl RelayOutcome {
    pub fn to_json(&self) -> Value {
        match self {
            RelayOutcome::Ignored { reason } => json!({
                "received": true,
                "ignored": true,
                "reason": reason,
            }),
            RelayOutcome::Relayed {
                instance_id,
                gateway_message_id,
            } => json!({
                "received": true,
                "success": true,
                "instanceId": instance_id,
                "gatewayMessageId": gateway_message_id,
            }),
        }
    }
}

fn relay_text(message: &CrmOutboundMessage) -> String {
    let mut parts: Vec<&str> = Vec::new();
    if !message.message.trim().is_empty() {
        parts.push(message.message.trim());
    }
    parts.extend(message.attachments.iter().map(String::as_str));
    parts.join("\n")
}

impl SyncEngine {
    /// Send a message typed in the CRM through the lead's instance.
    ///
    /// Each CRM message is relayed once. The send carries no track id, so
    /// the gateway echo is dropped on the inbound side.
    pub async fn relay_outbound(&self, message: &CrmOutboundMessage) -> Result<RelayOutcome> {
        if message.location_id.is_empty() || message.contact_id.is_empty() || message.message_id.is_empty() {
            return Err(SyncError::InvalidRequest(
                "locationId, contactId and messageId are required".to_string(),
            ));
        }

        let text = relay_text(message);
        if text.is_empty() {
            return Ok(RelayOutcome::Ignored {
                reason: "empty message",
            });
        }

        let key = format!("ghl:{}", message.message_id);
        if !ledger::claim(self.database().pool(), &key).await? {
            debug!(message_id = %message.message_id, "CRM message already relayed");
            return Ok(RelayOutcome::Ignored {
                reason: "already relayed",
            });
        }

        match self.send_relay(message, text).await {
            Ok(outcome) => Ok(outcome),
            Err(e) => {
                error!(message_id = %message.message_id, error = %e, "Relay failed");
                self.release_claim(&key).await;
                Err(e)
            }
        }
    }

    async fn send_relay(&self, message: &CrmOutboundMessage, text: String) -> Result<RelayOutcome> {
        let lead_phone = match message.phone.as_deref().map(phone::normalize).filter(|p| !p.is_empty()) {
            Some(p) => p,
            None => self.lead_phone(&message.location_id, &message.contact_id).await?,
        };

        let inst = self
            .resolver()
            .resolve(&message.location_id, Some(&message.contact_id), Some(&lead_phone))
            .await?;
        let config = self.gateway_config(&inst).await?;

        let sent = self
            .gateway()
            .send_text(&config, &SendTextRequest::new(lead_phone, text.clone()))
            .await?;

        message_map::upsert_entry(
            self.database().pool(),
            &NewMessageMapEntry {
                ghl_message_id: message.message_id.clone(),
                gateway_message_id: sent.message_id.clone(),
                location_id: message.location_id.clone(),
                contact_id: Some(message.contact_id.clone()),
                instance_id: Some(inst.id.clone()),
                message_text: text,
                message_type: if message.attachments.is_empty() { "text" } else { "media" }.to_string(),
                from_me: true,
                original_timestamp: database::now_millis(),
            },
        )
        .await?;

        info!(
            message_id = %message.message_id,
            instance_id = %inst.id,
            "Relayed CRM message to WhatsApp"
        );

        Ok(RelayOutcome::Relayed {
            instance_id: inst.id,
            gateway_message_id: sent.message_id,
        })
    }
}
