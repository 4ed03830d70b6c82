//! Inbound webhook processing (gateway -> CRM).

use broadcaster::LiveEvent;
use crm_client::{ContactUpdate, CrmError, CrmMessage, NewContact};
use database::{
    contact_phone, instance, ledger, location, message_map, tenant, DatabaseError, Instance,
    NewMessageMapEntry, Tenant,
};
use serde::Serialize;
use serde_json::{json, Value};
use sha2::{Digest, Sha256};
use tracing::{debug, error, info, warn};

use crate::classifier::{classify, DeleteEvent, EditEvent, NewMessageEvent, ReactionEvent, WebhookEvent};
use crate::engine::SyncEngine;
use crate::error::{Result, SyncError};
use crate::format::{deleted_note, edit_annotation, group_header, phone_tag, reply_context};

/// Tag put on contacts created for WhatsApp groups.
pub const GROUP_CONTACT_TAG: &str = "whatsapp-group";

/// Source recorded on contacts the bridge creates.
const CONTACT_SOURCE: &str = "whatsapp";

/// Width of the content-signature time bucket.
const SIGNATURE_BUCKET_MILLIS: i64 = 60_000;

/// Which side a synced message belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    Inbound,
    Outbound,
}

impl Direction {
    pub fn as_str(&self) -> &'static str {
        match self {
            Direction::Inbound => "inbound",
            Direction::Outbound => "outbound",
        }
    }
}

/// Who originated a synced message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageSource {
    /// The lead wrote it.
    Lead,
    /// Typed on the connected phone.
    Phone,
    /// Sent by the tenant's own automation (matching track id).
    Agent,
}

impl MessageSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            MessageSource::Lead => "lead",
            MessageSource::Phone => "phone",
            MessageSource::Agent => "agent",
        }
    }
}

/// What happened to one webhook delivery.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WebhookOutcome {
    /// Acknowledged and dropped.
    Ignored { reason: String },
    /// Acted upon.
    Processed {
        kind: &'static str,
        direction: Option<Direction>,
        source: Option<MessageSource>,
        ghl_message_id: Option<String>,
    },
}

impl WebhookOutcome {
    pub fn ignored(reason: impl Into<String>) -> Self {
        WebhookOutcome::Ignored {
            reason: reason.into(),
        }
    }

    fn handled(kind: &'static str, ghl_message_id: Option<String>) -> Self {
        WebhookOutcome::Processed {
            kind,
            direction: None,
            source: None,
            ghl_message_id,
        }
    }

    pub fn is_ignored(&self) -> bool {
        matches!(self, WebhookOutcome::Ignored { .. })
    }

    /// Acknowledgment body returned to the gateway.
    pub fn to_json(&self) -> Value {
        match self {
            WebhookOutcome::Ignored { reason } => json!({
                "received": true,
                "ignored": true,
                "reason": reason,
            }),
            WebhookOutcome::Processed {
                kind,
                direction,
                source,
                ghl_message_id,
            } => {
                let mut body = json!({
                    "received": true,
                    "processed": true,
                    "type": kind,
                    "success": true,
                });
                if let Some(direction) = direction {
                    body["direction"] = json!(direction.as_str());
                }
                if let Some(source) = source {
                    body["source"] = json!(source.as_str());
                }
                if let Some(id) = ghl_message_id {
                    body["messageId"] = json!(id);
                }
                body
            }
        }
    }
}

/// Dedup key of a new message.
///
/// With a gateway message id the key is scoped to the instance token, so two
/// instances in the same chat each process the message once. Without one a
/// content signature bucketed to the minute is used; an identical text sent
/// twice within the same minute is treated as a replay.
pub fn message_dedup_key(token: &str, event: &NewMessageEvent) -> String {
    if let Some(id) = event.message_id.as_deref() {
        return format!("{token}:{id}");
    }

    let sender = event.member_phone.as_deref().unwrap_or(&event.chat_jid);
    let media_url = event.media.as_ref().and_then(|m| m.url.as_deref()).unwrap_or_default();
    let media_kind = event.media.as_ref().map(|m| m.kind.as_str()).unwrap_or_default();
    let bucket = (event.timestamp_ms / SIGNATURE_BUCKET_MILLIS).to_string();

    let mut hasher = Sha256::new();
    for part in [
        token,
        sender,
        if event.from_me { "1" } else { "0" },
        if event.is_group { "1" } else { "0" },
        event.phone.as_str(),
        event.text.as_deref().unwrap_or_default(),
        media_url,
        media_kind,
        bucket.as_str(),
    ] {
        hasher.update(part.as_bytes());
        hasher.update(b"|");
    }

    format!("sig:{token}:{}", hex::encode(hasher.finalize()))
}

/// Best-effort contact enrichment run after routing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Enrichment {
    ContactPhone,
    Preference,
    ProfilePhoto,
    Tag,
    Assign,
}

impl Enrichment {
    const ALL: [Enrichment; 5] = [
        Enrichment::ContactPhone,
        Enrichment::Preference,
        Enrichment::ProfilePhoto,
        Enrichment::Tag,
        Enrichment::Assign,
    ];
}

struct SyncContext<'a> {
    token: &'a str,
    location_id: &'a str,
    contact_id: &'a str,
    instance: &'a Instance,
    event: &'a NewMessageEvent,
}

impl SyncEngine {
    /// Process one gateway webhook delivery.
    ///
    /// Classification outcomes never error; only failures of the final CRM
    /// send (or storage) do, and those leave the event claimable again.
    pub async fn process_webhook(&self, payload: &Value) -> Result<WebhookOutcome> {
        self.maybe_cleanup().await;

        let event = classify(payload);
        debug!(kind = event.kind(), "Classified webhook");

        match event {
            WebhookEvent::Receipt => Ok(WebhookOutcome::ignored("receipt")),
            WebhookEvent::Ignored { reason } => {
                debug!(reason, "Ignoring webhook");
                Ok(WebhookOutcome::ignored(reason))
            }
            WebhookEvent::Reaction(reaction) => self.handle_reaction(reaction).await,
            WebhookEvent::Edit(edit) => self.handle_edit(edit).await,
            WebhookEvent::Delete(delete) => self.handle_delete(delete).await,
            WebhookEvent::NewMessage(message) => self.handle_new_message(*message).await,
        }
    }

    async fn handle_reaction(&self, reaction: ReactionEvent) -> Result<WebhookOutcome> {
        let pool = self.database().pool();
        let Some(entry) = message_map::get_by_gateway_id(pool, &reaction.target_id).await? else {
            debug!(target_id = %reaction.target_id, "Reaction to unmapped message");
            return Ok(WebhookOutcome::ignored("reaction target not mapped"));
        };

        let key = format!(
            "react:{}:{}:{}",
            reaction.target_id, reaction.emoji, reaction.actor
        );
        if !ledger::claim(pool, &key).await? {
            return Ok(WebhookOutcome::ignored("reaction already processed"));
        }

        let reactions =
            message_map::append_reaction(pool, &entry.ghl_message_id, &reaction.emoji).await?;

        self.broadcaster().publish(LiveEvent::Reaction {
            location_id: entry.location_id.clone(),
            ghl_message_id: Some(entry.ghl_message_id.clone()),
            gateway_message_id: reaction.target_id.clone(),
            emoji: reaction.emoji.clone(),
            from_me: reaction.from_me,
            reactions,
        });

        info!(ghl_message_id = %entry.ghl_message_id, emoji = %reaction.emoji, "Reaction synced");
        Ok(WebhookOutcome::handled("reaction", Some(entry.ghl_message_id)))
    }

    async fn handle_edit(&self, edit: EditEvent) -> Result<WebhookOutcome> {
        let pool = self.database().pool();
        let key = format!("edit:{}", edit.original_id);
        if !ledger::claim(pool, &key).await? {
            debug!(original_id = %edit.original_id, "Edit already claimed");
            return Ok(WebhookOutcome::ignored("edit already processed"));
        }

        let Some(entry) = message_map::get_by_gateway_id(pool, &edit.original_id).await? else {
            debug!(original_id = %edit.original_id, "Edit of unmapped message");
            self.release_claim(&key).await;
            return Ok(WebhookOutcome::ignored("edit target not mapped"));
        };

        if edit.from_me {
            message_map::mark_edited(pool, &entry.ghl_message_id, &edit.new_text).await?;
            self.broadcaster().publish(LiveEvent::Edit {
                location_id: entry.location_id.clone(),
                ghl_message_id: Some(entry.ghl_message_id.clone()),
                gateway_message_id: edit.original_id.clone(),
                original_text: entry.message_text.clone(),
                new_text: edit.new_text.clone(),
                from_me: true,
            });
            return Ok(WebhookOutcome::handled("edit", Some(entry.ghl_message_id)));
        }

        let Some(contact_id) = entry.contact_id.as_deref() else {
            warn!(ghl_message_id = %entry.ghl_message_id, "Edited message has no contact");
            message_map::mark_edited(pool, &entry.ghl_message_id, &edit.new_text).await?;
            return Ok(WebhookOutcome::handled("edit", Some(entry.ghl_message_id)));
        };

        let annotation = edit_annotation(&entry.message_text, &edit.new_text);
        let sent = async {
            let token = self.tokens().token_for_location(&entry.location_id).await?;
            let sent = self
                .crm()
                .send_inbound_message(&token, &CrmMessage::text(contact_id, annotation))
                .await?;
            Ok::<_, SyncError>(sent)
        }
        .await;

        match sent {
            Ok(sent) => {
                // Stored text stays the original until the annotation lands.
                message_map::mark_edited(pool, &entry.ghl_message_id, &edit.new_text).await?;
                info!(ghl_message_id = %entry.ghl_message_id, "Edit annotated in CRM");
                Ok(WebhookOutcome::handled("edit", Some(sent.message_id)))
            }
            Err(e) => {
                error!(ghl_message_id = %entry.ghl_message_id, error = %e, "Edit annotation failed");
                self.release_claim(&key).await;
                Err(e)
            }
        }
    }

    async fn handle_delete(&self, delete: DeleteEvent) -> Result<WebhookOutcome> {
        let pool = self.database().pool();
        let key = format!("delete:{}", delete.target_id);
        if !ledger::claim(pool, &key).await? {
            return Ok(WebhookOutcome::ignored("delete already processed"));
        }

        let Some(entry) = message_map::get_by_gateway_id(pool, &delete.target_id).await? else {
            debug!(target_id = %delete.target_id, "Delete of unmapped message");
            self.release_claim(&key).await;
            return Ok(WebhookOutcome::ignored("delete target not mapped"));
        };

        message_map::mark_deleted(pool, &entry.ghl_message_id).await?;

        self.broadcaster().publish(LiveEvent::Delete {
            location_id: entry.location_id.clone(),
            ghl_message_id: Some(entry.ghl_message_id.clone()),
            gateway_message_id: delete.target_id.clone(),
            original_text: entry.message_text.clone(),
            from_me: delete.from_me,
        });

        if !delete.from_me {
            if let Some(contact_id) = entry.contact_id.as_deref() {
                if let Err(e) = self
                    .post_deleted_note(&entry.location_id, contact_id, &entry.message_text)
                    .await
                {
                    warn!(ghl_message_id = %entry.ghl_message_id, error = %e, "Delete note failed");
                }
            }
        }

        info!(ghl_message_id = %entry.ghl_message_id, "Delete synced");
        Ok(WebhookOutcome::handled("delete", Some(entry.ghl_message_id)))
    }

    async fn post_deleted_note(&self, location_id: &str, contact_id: &str, original: &str) -> Result<()> {
        let pool = self.database().pool();
        let loc = location::get_location(pool, location_id).await?;
        let owner = tenant::get_tenant(pool, &loc.tenant_id).await?;
        let credentials = self.tokens().credentials_for(&owner)?;
        let token = self.tokens().valid_token(&loc, &credentials).await?;
        let note = deleted_note(Self::language_of(&owner), original);
        self.crm().send_internal_note(&token, contact_id, &note).await?;
        Ok(())
    }

    async fn handle_new_message(&self, event: NewMessageEvent) -> Result<WebhookOutcome> {
        if event.was_sent_by_api && event.track_id.is_none() {
            debug!(message_id = ?event.message_id, "Dropping API echo without track id");
            return Ok(WebhookOutcome::ignored("api message without track id"));
        }

        let Some(token) = event.token.clone() else {
            return Ok(WebhookOutcome::ignored("missing instance token"));
        };

        let key = message_dedup_key(&token, &event);
        if !ledger::claim(self.database().pool(), &key).await? {
            debug!(key = %key, "Duplicate delivery");
            return Ok(WebhookOutcome::ignored("duplicate delivery"));
        }

        match self.sync_new_message(&token, &event).await {
            Ok(outcome) => Ok(outcome),
            Err(e) => {
                error!(message_id = ?event.message_id, error = %e, "Message sync failed");
                self.release_claim(&key).await;
                Err(e)
            }
        }
    }

    async fn sync_new_message(&self, token: &str, event: &NewMessageEvent) -> Result<WebhookOutcome> {
        let pool = self.database().pool();

        let Some(inst) = instance::find_by_token(pool, token).await? else {
            debug!("Webhook from unknown instance token");
            return Ok(WebhookOutcome::ignored("unknown instance"));
        };
        let Some(location_id) = inst.location_id.clone() else {
            return Ok(WebhookOutcome::ignored("instance not linked to a location"));
        };
        let loc = match location::get_location(pool, &location_id).await {
            Ok(loc) => loc,
            Err(DatabaseError::NotFound { .. }) => {
                return Ok(WebhookOutcome::ignored("location not installed"));
            }
            Err(e) => return Err(e.into()),
        };
        if !loc.has_oauth() {
            debug!(location_id = %location_id, "Location has no OAuth tokens");
            return Ok(WebhookOutcome::ignored("location not authorized"));
        }
        if event.is_group && inst.ignore_groups {
            return Ok(WebhookOutcome::ignored("groups ignored"));
        }

        let owner = tenant::get_tenant(pool, &inst.tenant_id).await?;
        let agent_message = match event.track_id.as_deref() {
            Some(track_id) if owner.track_id.as_deref() == Some(track_id) => true,
            Some(_) => {
                debug!(instance_id = %inst.id, "Dropping message with foreign track id");
                return Ok(WebhookOutcome::ignored("track id mismatch"));
            }
            None => false,
        };
        let direction = if event.from_me || agent_message {
            Direction::Outbound
        } else {
            Direction::Inbound
        };
        let source = match (direction, agent_message) {
            (Direction::Inbound, _) => MessageSource::Lead,
            (Direction::Outbound, true) => MessageSource::Agent,
            (Direction::Outbound, false) => MessageSource::Phone,
        };

        let credentials = self.tokens().credentials_for(&owner)?;
        let crm_token = self.tokens().valid_token(&loc, &credentials).await?;
        let contact_id = self.resolve_contact(&crm_token, &location_id, event).await?;

        let ctx = SyncContext {
            token: &crm_token,
            location_id: &location_id,
            contact_id: &contact_id,
            instance: &inst,
            event,
        };
        for task in Enrichment::ALL {
            if let Err(e) = self.enrich(task, &ctx).await {
                warn!(?task, contact_id = %contact_id, error = %e, "Enrichment failed");
            }
        }

        let attachments = self.resolve_media(&inst, &owner, event).await;

        let quoted = match (direction, event.quoted_id.as_deref()) {
            (Direction::Inbound, Some(quoted_id)) => {
                message_map::get_by_gateway_id(pool, quoted_id).await?
            }
            _ => None,
        };
        let quoted_text = quoted
            .as_ref()
            .map(|entry| entry.message_text.clone())
            .filter(|text| !text.is_empty())
            .or_else(|| event.quoted_text.clone());

        let text = event.text.clone().unwrap_or_default();
        let body = match direction {
            Direction::Outbound => text.clone(),
            Direction::Inbound => {
                let mut body = String::new();
                if let Some(quoted_text) = quoted_text.as_deref() {
                    body.push_str(&reply_context(Self::language_of(&owner), quoted_text));
                }
                if event.is_group {
                    body.push_str(&group_header(
                        event.member_phone.as_deref().unwrap_or_default(),
                        event.sender_name.as_deref().unwrap_or_default(),
                    ));
                    body.push('\n');
                }
                body.push_str(&text);
                body
            }
        };

        let message = CrmMessage {
            contact_id: contact_id.clone(),
            message: body,
            attachments,
            alt_id: event.message_id.clone(),
            user_id: match direction {
                Direction::Outbound => inst.assigned_user_id.clone(),
                Direction::Inbound => None,
            },
        };
        let sent = match direction {
            Direction::Outbound => self.crm().send_outbound_message(&crm_token, &message).await?,
            Direction::Inbound => self.crm().send_inbound_message(&crm_token, &message).await?,
        };

        if let Some(original) = quoted.as_ref() {
            self.broadcaster().publish(LiveEvent::Reply {
                location_id: location_id.clone(),
                original_ghl_message_id: original.ghl_message_id.clone(),
                reply_ghl_message_id: Some(sent.message_id.clone()),
                quoted_text: quoted_text.clone().unwrap_or_default(),
            });
        }

        message_map::upsert_entry(
            pool,
            &NewMessageMapEntry {
                ghl_message_id: sent.message_id.clone(),
                gateway_message_id: event.message_id.clone(),
                location_id: location_id.clone(),
                contact_id: Some(contact_id.clone()),
                instance_id: Some(inst.id.clone()),
                message_text: text,
                message_type: if event.media.is_some() { "media" } else { "text" }.to_string(),
                from_me: direction == Direction::Outbound,
                original_timestamp: event.timestamp_ms,
            },
        )
        .await?;

        info!(
            instance_id = %inst.id,
            contact_id = %contact_id,
            ghl_message_id = %sent.message_id,
            direction = direction.as_str(),
            "Message synced"
        );

        Ok(WebhookOutcome::Processed {
            kind: "message",
            direction: Some(direction),
            source: Some(source),
            ghl_message_id: Some(sent.message_id),
        })
    }

    /// Find or create the CRM contact for the chat.
    ///
    /// Groups are keyed by their JID in the email field, with a pseudo-phone
    /// since the phone field cannot hold a group id.
    async fn resolve_contact(
        &self,
        token: &str,
        location_id: &str,
        event: &NewMessageEvent,
    ) -> Result<String> {
        let crm = self.crm();

        let new_contact = if event.is_group {
            if let Some(existing) = crm.find_contact_by_email(token, location_id, &event.chat_jid).await? {
                return Ok(existing.id);
            }
            NewContact {
                location_id: location_id.to_string(),
                phone: format!("+{}", event.phone),
                name: event.group_name.clone(),
                email: Some(event.chat_jid.clone()),
                tags: vec![GROUP_CONTACT_TAG.to_string()],
                source: Some(CONTACT_SOURCE.to_string()),
            }
        } else {
            let phone = format!("+{}", event.phone);
            if let Some(existing) = crm.find_contact_by_phone(token, location_id, &phone).await? {
                return Ok(existing.id);
            }
            NewContact {
                location_id: location_id.to_string(),
                phone,
                name: if event.from_me { None } else { event.sender_name.clone() },
                source: Some(CONTACT_SOURCE.to_string()),
                ..Default::default()
            }
        };

        match crm.create_contact(token, &new_contact).await {
            Ok(created) => {
                info!(contact_id = %created.id, location_id, "Created CRM contact");
                Ok(created.id)
            }
            Err(CrmError::DuplicateContact { contact_id }) => {
                debug!(contact_id = %contact_id, "Reusing duplicate contact");
                Ok(contact_id)
            }
            Err(e) => Err(e.into()),
        }
    }

    async fn enrich(&self, task: Enrichment, ctx: &SyncContext<'_>) -> Result<()> {
        let pool = self.database().pool();
        let event = ctx.event;

        match task {
            Enrichment::ContactPhone if !event.is_group => {
                contact_phone::upsert_contact_phone(pool, ctx.contact_id, ctx.location_id, &event.phone)
                    .await?;
            }
            Enrichment::Preference if !event.is_group => {
                let canonical =
                    contact_phone::canonical_contact_for_phone(pool, ctx.location_id, &event.phone)
                        .await?
                        .unwrap_or_else(|| ctx.contact_id.to_string());
                self.switcher()
                    .set_preferred_instance(
                        ctx.location_id,
                        &ctx.instance.id,
                        Some(&canonical),
                        Some(&event.phone),
                    )
                    .await?;
            }
            Enrichment::ProfilePhoto => {
                if let Some(photo) = event.profile_photo.as_deref() {
                    let update = ContactUpdate {
                        profile_photo: Some(photo.to_string()),
                        ..Default::default()
                    };
                    self.crm().update_contact(ctx.token, ctx.contact_id, &update).await?;
                }
            }
            Enrichment::Tag => {
                if let Some(phone) = ctx.instance.phone.as_deref().filter(|p| !p.is_empty()) {
                    self.crm()
                        .add_tags(ctx.token, ctx.contact_id, &[phone_tag(phone)])
                        .await?;
                }
            }
            Enrichment::Assign => {
                if let Some(user) = ctx.instance.assigned_user_id.as_deref() {
                    let update = ContactUpdate {
                        assigned_to: Some(user.to_string()),
                        ..Default::default()
                    };
                    self.crm().update_contact(ctx.token, ctx.contact_id, &update).await?;
                }
            }
            _ => {}
        }

        Ok(())
    }

    /// Public URLs for the message media. Falls back to the gateway URL.
    async fn resolve_media(&self, inst: &Instance, owner: &Tenant, event: &NewMessageEvent) -> Vec<String> {
        let Some(media) = event.media.as_ref() else {
            return Vec::new();
        };

        let downloaded = match (event.message_id.as_deref(), self.gateway_config_for(inst, owner)) {
            (Some(message_id), Ok(config)) => {
                match self.gateway().download_media(&config, message_id).await {
                    Ok(url) => Some(url),
                    Err(e) => {
                        warn!(message_id, error = %e, "Media download failed, forwarding original URL");
                        None
                    }
                }
            }
            _ => None,
        };

        downloaded.or_else(|| media.url.clone()).into_iter().collect()
    }

    pub(crate) async fn release_claim(&self, key: &str) {
        if let Err(e) = ledger::release(self.database().pool(), key).await {
            warn!(key, error = %e, "Failed to release dedup claim");
        }
    }
}
