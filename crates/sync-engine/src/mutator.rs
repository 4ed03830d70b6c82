//! CRM-initiated message actions (CRM -> gateway).
//!
//! Every action is keyed by the CRM message id and goes through the message
//! map. Edit, react and reply fail hard when the gateway call fails; delete
//! proceeds locally regardless.

use broadcaster::LiveEvent;
use database::{
    instance, ledger, location, message_map, now_millis, phone, tenant, Instance,
    MessageMapEntry, NewMessageMapEntry, Tenant,
};
use gateway_client::{user_jid, GatewayConfig, SendTextRequest};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tracing::{debug, info, warn};

use crate::config::EDIT_WINDOW_MILLIS;
use crate::engine::SyncEngine;
use crate::error::{Result, SyncError};
use crate::format::{deleted_note, edit_annotation, reply_context};

/// Default page size of `list-states`.
const DEFAULT_LIST_LIMIT: i64 = 100;

/// An action on the message-state endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(tag = "action", rename_all = "kebab-case", rename_all_fields = "camelCase")]
pub enum MessageAction {
    /// Record or complete a map entry.
    Map {
        ghl_message_id: String,
        location_id: String,
        gateway_message_id: Option<String>,
        contact_id: Option<String>,
        instance_id: Option<String>,
        #[serde(default)]
        message_text: String,
        message_type: Option<String>,
        #[serde(default)]
        from_me: bool,
        timestamp: Option<i64>,
    },
    Edit {
        ghl_message_id: String,
        new_text: String,
    },
    React {
        ghl_message_id: String,
        emoji: String,
    },
    Delete {
        ghl_message_id: String,
        #[serde(default)]
        from_me: bool,
    },
    Reply {
        ghl_message_id: String,
        text: String,
        contact_id: Option<String>,
        contact_phone: Option<String>,
    },
    Lookup {
        ghl_message_id: Option<String>,
        gateway_message_id: Option<String>,
    },
    ListStates {
        location_id: Option<String>,
        contact_id: Option<String>,
        #[serde(default)]
        ghl_message_ids: Vec<String>,
        limit: Option<i64>,
    },
}

impl MessageAction {
    /// Parse a request body. Unknown actions and missing fields are
    /// [`SyncError::InvalidRequest`].
    pub fn from_value(body: Value) -> Result<Self> {
        serde_json::from_value(body).map_err(|e| SyncError::InvalidRequest(e.to_string()))
    }

    pub fn name(&self) -> &'static str {
        match self {
            MessageAction::Map { .. } => "map",
            MessageAction::Edit { .. } => "edit",
            MessageAction::React { .. } => "react",
            MessageAction::Delete { .. } => "delete",
            MessageAction::Reply { .. } => "reply",
            MessageAction::Lookup { .. } => "lookup",
            MessageAction::ListStates { .. } => "list-states",
        }
    }
}

/// State of one message as UIs see it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MessageState {
    pub ghl_message_id: String,
    pub gateway_message_id: Option<String>,
    pub location_id: String,
    pub contact_id: Option<String>,
    pub message_text: String,
    pub from_me: bool,
    pub reactions: Vec<String>,
    pub is_edited: bool,
    pub is_deleted: bool,
    pub original_timestamp: i64,
}

impl From<MessageMapEntry> for MessageState {
    fn from(entry: MessageMapEntry) -> Self {
        Self {
            ghl_message_id: entry.ghl_message_id,
            gateway_message_id: entry.gateway_message_id,
            location_id: entry.location_id,
            contact_id: entry.contact_id,
            message_text: entry.message_text,
            from_me: entry.from_me,
            reactions: entry.reactions.0,
            is_edited: entry.is_edited,
            is_deleted: entry.is_deleted,
            original_timestamp: entry.original_timestamp,
        }
    }
}

/// Result of a reply.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReplyOutcome {
    pub instance_id: String,
    pub gateway_message_id: Option<String>,
    /// CRM id of the annotation that represents the reply.
    pub ghl_message_id: Option<String>,
}

fn required<'a>(value: &'a str, field: &str) -> Result<&'a str> {
    let value = value.trim();
    if value.is_empty() {
        return Err(SyncError::InvalidRequest(format!("{field} is required")));
    }
    Ok(value)
}

/// Whether a message sent at `original_timestamp` may still be edited.
pub fn check_edit_window(original_timestamp: i64, now: i64) -> Result<()> {
    let age = now - original_timestamp;
    if age >= EDIT_WINDOW_MILLIS {
        return Err(SyncError::EditWindowExpired {
            age_minutes: age / 60_000,
        });
    }
    Ok(())
}

impl SyncEngine {
    /// Run a message-state action and render its response body.
    pub async fn apply_action(&self, action: MessageAction) -> Result<Value> {
        debug!(action = action.name(), "Applying message action");

        match action {
            MessageAction::Map {
                ghl_message_id,
                location_id,
                gateway_message_id,
                contact_id,
                instance_id,
                message_text,
                message_type,
                from_me,
                timestamp,
            } => {
                let entry = NewMessageMapEntry {
                    ghl_message_id: required(&ghl_message_id, "ghlMessageId")?.to_string(),
                    gateway_message_id,
                    location_id: required(&location_id, "locationId")?.to_string(),
                    contact_id,
                    instance_id,
                    message_text,
                    message_type: message_type.unwrap_or_else(|| "text".to_string()),
                    from_me,
                    original_timestamp: timestamp.unwrap_or_else(now_millis),
                };
                message_map::upsert_entry(self.database().pool(), &entry).await?;
                Ok(json!({ "success": true, "ghlMessageId": entry.ghl_message_id }))
            }
            MessageAction::Edit {
                ghl_message_id,
                new_text,
            } => {
                let state = self.edit_message(&ghl_message_id, &new_text).await?;
                Ok(json!({ "success": true, "message": state }))
            }
            MessageAction::React {
                ghl_message_id,
                emoji,
            } => {
                let state = self.react_to_message(&ghl_message_id, &emoji).await?;
                Ok(json!({ "success": true, "message": state }))
            }
            MessageAction::Delete {
                ghl_message_id,
                from_me,
            } => {
                let state = self.delete_message(&ghl_message_id, from_me).await?;
                Ok(json!({ "success": true, "message": state }))
            }
            MessageAction::Reply {
                ghl_message_id,
                text,
                contact_id,
                contact_phone,
            } => {
                let outcome = self
                    .reply_to_message(
                        &ghl_message_id,
                        &text,
                        contact_id.as_deref(),
                        contact_phone.as_deref(),
                    )
                    .await?;
                Ok(json!({ "success": true, "reply": outcome }))
            }
            MessageAction::Lookup {
                ghl_message_id,
                gateway_message_id,
            } => {
                let state = self
                    .lookup_message(ghl_message_id.as_deref(), gateway_message_id.as_deref())
                    .await?;
                Ok(json!({ "success": true, "message": state }))
            }
            MessageAction::ListStates {
                location_id,
                contact_id,
                ghl_message_ids,
                limit,
            } => {
                let states = self
                    .list_message_states(
                        location_id.as_deref(),
                        contact_id.as_deref(),
                        &ghl_message_ids,
                        limit,
                    )
                    .await?;
                Ok(json!({ "success": true, "states": states }))
            }
        }
    }

    async fn entry(&self, ghl_message_id: &str) -> Result<MessageMapEntry> {
        let id = required(ghl_message_id, "ghlMessageId")?;
        message_map::get_by_ghl_id(self.database().pool(), id)
            .await?
            .ok_or_else(|| SyncError::MessageNotFound(id.to_string()))
    }

    async fn reload(&self, ghl_message_id: &str) -> Result<MessageState> {
        Ok(self.entry(ghl_message_id).await?.into())
    }

    /// The instance that carried a message, or the resolved one when the
    /// entry does not record it.
    async fn instance_for_entry(&self, entry: &MessageMapEntry) -> Result<Instance> {
        if let Some(id) = entry.instance_id.as_deref() {
            match instance::get_instance(self.database().pool(), id).await {
                Ok(found) => return Ok(found),
                Err(e) => debug!(instance_id = id, error = %e, "Recorded instance unavailable"),
            }
        }
        self.resolver()
            .resolve(&entry.location_id, entry.contact_id.as_deref(), None)
            .await
    }

    async fn location_owner(&self, location_id: &str) -> Result<Tenant> {
        let loc = location::get_location(self.database().pool(), location_id).await?;
        Ok(tenant::get_tenant(self.database().pool(), &loc.tenant_id).await?)
    }

    async fn contact_phone_for(&self, entry: &MessageMapEntry) -> Result<String> {
        let Some(contact_id) = entry.contact_id.as_deref() else {
            return Err(SyncError::InvalidRequest(format!(
                "message {} has no contact",
                entry.ghl_message_id
            )));
        };
        self.lead_phone(&entry.location_id, contact_id).await
    }

    async fn post_note(&self, location_id: &str, contact_id: &str, text: &str) -> Result<String> {
        let token = self.tokens().token_for_location(location_id).await?;
        let sent = self.crm().send_internal_note(&token, contact_id, text).await?;
        Ok(sent.message_id)
    }

    async fn entry_gateway(&self, entry: &MessageMapEntry) -> Result<(Instance, GatewayConfig)> {
        let inst = self.instance_for_entry(entry).await?;
        let config = self.gateway_config(&inst).await?;
        Ok((inst, config))
    }

    /// Edit a message sent from the CRM.
    pub async fn edit_message(&self, ghl_message_id: &str, new_text: &str) -> Result<MessageState> {
        let new_text = required(new_text, "newText")?;
        let entry = self.entry(ghl_message_id).await?;
        check_edit_window(entry.original_timestamp, now_millis())?;

        let pool = self.database().pool();
        if let Some(gateway_id) = entry.gateway_message_id.as_deref() {
            // The gateway echoes the edit back as a webhook, possibly before
            // the call below returns.
            let key = format!("edit:{gateway_id}");
            let claimed = ledger::claim(pool, &key).await?;
            let edited = async {
                let (_, config) = self.entry_gateway(&entry).await?;
                self.gateway().edit_message(&config, gateway_id, new_text).await?;
                Ok::<(), SyncError>(())
            }
            .await;
            if let Err(e) = edited {
                if claimed {
                    self.release_claim(&key).await;
                }
                return Err(e);
            }
        }

        message_map::mark_edited(pool, &entry.ghl_message_id, new_text).await?;

        if entry.message_text != new_text {
            if let Some(contact_id) = entry.contact_id.as_deref() {
                let note = edit_annotation(&entry.message_text, new_text);
                if let Err(e) = self.post_note(&entry.location_id, contact_id, &note).await {
                    warn!(ghl_message_id = %entry.ghl_message_id, error = %e, "Edit note failed");
                }
            }
        }

        info!(ghl_message_id = %entry.ghl_message_id, "Message edited");
        self.reload(&entry.ghl_message_id).await
    }

    /// React to a message from the CRM. Replaces the stored reactions.
    pub async fn react_to_message(&self, ghl_message_id: &str, emoji: &str) -> Result<MessageState> {
        let emoji = required(emoji, "emoji")?;
        let entry = self.entry(ghl_message_id).await?;
        let gateway_id = entry
            .gateway_message_id
            .clone()
            .ok_or_else(|| SyncError::NotMappedToGateway(entry.ghl_message_id.clone()))?;

        let pool = self.database().pool();
        let key = format!("react:{gateway_id}:{emoji}:me");
        let claimed = ledger::claim(pool, &key).await?;
        let reacted = async {
            let jid = user_jid(&self.contact_phone_for(&entry).await?);
            let (_, config) = self.entry_gateway(&entry).await?;
            self.gateway().react(&config, &jid, &gateway_id, emoji).await?;
            Ok::<(), SyncError>(())
        }
        .await;
        if let Err(e) = reacted {
            if claimed {
                self.release_claim(&key).await;
            }
            return Err(e);
        }

        let reactions = vec![emoji.to_string()];
        message_map::replace_reactions(pool, &entry.ghl_message_id, &reactions).await?;

        self.broadcaster().publish(LiveEvent::Reaction {
            location_id: entry.location_id.clone(),
            ghl_message_id: Some(entry.ghl_message_id.clone()),
            gateway_message_id: gateway_id,
            emoji: emoji.to_string(),
            from_me: true,
            reactions,
        });

        self.reload(&entry.ghl_message_id).await
    }

    /// Delete a message from the CRM.
    ///
    /// The gateway revoke is attempted only for our own messages and may
    /// fail; the local soft delete always happens.
    pub async fn delete_message(&self, ghl_message_id: &str, from_me: bool) -> Result<MessageState> {
        let entry = self.entry(ghl_message_id).await?;
        let pool = self.database().pool();

        if let (true, Some(gateway_id)) = (from_me, entry.gateway_message_id.as_deref()) {
            ledger::claim(pool, &format!("delete:{gateway_id}")).await?;
            let revoked = async {
                let jid = user_jid(&self.contact_phone_for(&entry).await?);
                let (_, config) = self.entry_gateway(&entry).await?;
                self.gateway().delete_message(&config, &jid, gateway_id).await?;
                Ok::<(), SyncError>(())
            }
            .await;
            if let Err(e) = revoked {
                warn!(ghl_message_id = %entry.ghl_message_id, error = %e, "Gateway delete failed, deleting locally");
            }
        }

        message_map::mark_deleted(pool, &entry.ghl_message_id).await?;

        if let Some(contact_id) = entry.contact_id.as_deref() {
            let note = match self.location_owner(&entry.location_id).await {
                Ok(owner) => deleted_note(Self::language_of(&owner), &entry.message_text),
                Err(_) => deleted_note(Default::default(), &entry.message_text),
            };
            if let Err(e) = self.post_note(&entry.location_id, contact_id, &note).await {
                warn!(ghl_message_id = %entry.ghl_message_id, error = %e, "Delete note failed");
            }
        }

        self.broadcaster().publish(LiveEvent::Delete {
            location_id: entry.location_id.clone(),
            ghl_message_id: Some(entry.ghl_message_id.clone()),
            gateway_message_id: entry.gateway_message_id.clone().unwrap_or_default(),
            original_text: entry.message_text.clone(),
            from_me,
        });

        info!(ghl_message_id = %entry.ghl_message_id, "Message deleted");
        self.reload(&entry.ghl_message_id).await
    }

    /// Reply to a message on WhatsApp, quoting it.
    pub async fn reply_to_message(
        &self,
        ghl_message_id: &str,
        text: &str,
        contact_id: Option<&str>,
        contact_phone: Option<&str>,
    ) -> Result<ReplyOutcome> {
        let text = required(text, "text")?;
        let entry = self.entry(ghl_message_id).await?;
        let gateway_id = entry
            .gateway_message_id
            .clone()
            .ok_or_else(|| SyncError::NotMappedToGateway(entry.ghl_message_id.clone()))?;

        let contact_id = contact_id
            .filter(|c| !c.trim().is_empty())
            .or(entry.contact_id.as_deref())
            .map(str::to_string);
        let lead_phone = match contact_phone.map(phone::normalize).filter(|p| !p.is_empty()) {
            Some(p) => p,
            None => self.contact_phone_for(&entry).await?,
        };

        let inst = self
            .resolver()
            .resolve(&entry.location_id, contact_id.as_deref(), Some(&lead_phone))
            .await?;
        let config = self.gateway_config(&inst).await?;

        // No track id: the echo of this send must not come back as a message.
        let request = SendTextRequest::new(lead_phone.clone(), text).reply_to(gateway_id);
        let sent = self.gateway().send_text(&config, &request).await?;

        let mut note_id = None;
        if let Some(contact_id) = contact_id.as_deref() {
            let owner = self.location_owner(&entry.location_id).await?;
            let note = format!(
                "{}{}",
                reply_context(Self::language_of(&owner), &entry.message_text),
                text
            );
            match self.post_note(&entry.location_id, contact_id, &note).await {
                Ok(id) => note_id = Some(id),
                Err(e) => warn!(ghl_message_id = %entry.ghl_message_id, error = %e, "Reply note failed"),
            }
        }

        if let Some(note_id) = note_id.as_deref() {
            message_map::upsert_entry(
                self.database().pool(),
                &NewMessageMapEntry {
                    ghl_message_id: note_id.to_string(),
                    gateway_message_id: sent.message_id.clone(),
                    location_id: entry.location_id.clone(),
                    contact_id: contact_id.clone(),
                    instance_id: Some(inst.id.clone()),
                    message_text: text.to_string(),
                    message_type: "text".to_string(),
                    from_me: true,
                    original_timestamp: now_millis(),
                },
            )
            .await?;
        }

        info!(ghl_message_id = %entry.ghl_message_id, instance_id = %inst.id, "Reply sent");
        Ok(ReplyOutcome {
            instance_id: inst.id,
            gateway_message_id: sent.message_id,
            ghl_message_id: note_id,
        })
    }

    /// Find a message by either id.
    pub async fn lookup_message(
        &self,
        ghl_message_id: Option<&str>,
        gateway_message_id: Option<&str>,
    ) -> Result<MessageState> {
        let pool = self.database().pool();
        let found = match (
            ghl_message_id.filter(|id| !id.is_empty()),
            gateway_message_id.filter(|id| !id.is_empty()),
        ) {
            (Some(id), _) => message_map::get_by_ghl_id(pool, id).await?,
            (None, Some(id)) => message_map::get_by_gateway_id(pool, id).await?,
            (None, None) => {
                return Err(SyncError::InvalidRequest(
                    "ghlMessageId or gatewayMessageId is required".to_string(),
                ))
            }
        };

        found.map(MessageState::from).ok_or_else(|| {
            SyncError::MessageNotFound(
                ghl_message_id.or(gateway_message_id).unwrap_or_default().to_string(),
            )
        })
    }

    /// States of several messages: explicit CRM ids, or a conversation.
    pub async fn list_message_states(
        &self,
        location_id: Option<&str>,
        contact_id: Option<&str>,
        ghl_message_ids: &[String],
        limit: Option<i64>,
    ) -> Result<Vec<MessageState>> {
        let pool = self.database().pool();
        let entries = if !ghl_message_ids.is_empty() {
            message_map::list_by_ghl_ids(pool, ghl_message_ids).await?
        } else {
            match (location_id, contact_id) {
                (Some(location_id), Some(contact_id)) => {
                    let limit = limit.filter(|l| *l > 0).unwrap_or(DEFAULT_LIST_LIMIT);
                    message_map::list_for_contact(pool, location_id, contact_id, limit).await?
                }
                _ => {
                    return Err(SyncError::InvalidRequest(
                        "ghlMessageIds or locationId and contactId are required".to_string(),
                    ))
                }
            }
        };

        Ok(entries.into_iter().map(MessageState::from).collect())
    }
}
