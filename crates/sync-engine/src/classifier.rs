//! Webhook event classification.
//!
//! Gateway payload shapes overlap, so classification is ordered and the first
//! match wins: receipt, reaction, edit, delete, non-message, then new message.
//! The classifier is pure; it only extracts fields and never touches storage.

use gateway_client::alias::{first_bool, first_i64, first_present, first_str};
use gateway_client::GROUP_JID_SUFFIX;
use serde_json::Value;

/// Event type fields at the payload root.
const EVENT_TYPE_FIELDS: &[&str] = &["EventType", "eventType", "event_type", "event", "type"];

/// Where the message object lives.
const MESSAGE_OBJECT_FIELDS: &[&str] = &["message", "data"];

const TOKEN_FIELDS: &[&str] = &["token", "instanceToken", "instance.token", "instance_token"];

const RECEIPT_STATE_FIELDS: &[&str] = &[
    "state",
    "event.Type",
    "event.type",
    "message.status",
    "data.status",
    "status",
];

const RECEIPT_STATES: &[&str] = &["delivered", "read", "seen", "played", "delivery", "read_self"];

const INNER_TYPE_FIELDS: &[&str] = &["messageType", "type", "message_type"];

const MESSAGE_ID_FIELDS: &[&str] = &["messageid", "messageId", "key.id", "id"];

const REACTION_TARGET_FIELDS: &[&str] = &[
    "reaction",
    "content.key.ID",
    "content.key.id",
    "reactionMessage.key.id",
    "reactionMessage.key.ID",
];

const REACTION_EMOJI_FIELDS: &[&str] = &["text", "content.text", "reactionMessage.text", "emoji"];

const EDIT_EVENT_TYPES: &[&str] = &["messages.edit", "message.edit", "messages_edit"];

const EDIT_TARGET_FIELDS: &[&str] = &[
    "edited",
    "content.key.ID",
    "content.key.id",
    "protocolMessage.key.id",
    "editedMessageId",
];

const EDIT_TEXT_FIELDS: &[&str] = &[
    "content.editedMessage.conversation",
    "content.editedMessage.extendedTextMessage.text",
    "content.editedMessage.Message.conversation",
    "protocolMessage.editedMessage.conversation",
    "editedText",
    "text",
    "content.text",
    "content",
];

const DELETE_EVENT_TYPES: &[&str] = &[
    "messages.delete",
    "message.delete",
    "messages_delete",
    "messages.revoke",
    "message.revoke",
];

const DELETE_FLAG_FIELDS: &[&str] = &["deleted", "revoked", "isDeleted", "isRevoked"];

const DELETE_TARGET_FIELDS: &[&str] = &[
    "content.key.ID",
    "content.key.id",
    "protocolMessage.key.id",
    "deletedMessageId",
    "messageid",
    "messageId",
    "key.id",
    "id",
];

/// Protocol-message type code of an edit.
const PROTOCOL_EDIT: i64 = 14;

/// Protocol-message type code of a revoke.
const PROTOCOL_REVOKE: i64 = 0;

const FROM_ME_FIELDS: &[&str] = &["fromMe", "key.fromMe", "from_me"];

const CHAT_JID_FIELDS: &[&str] = &["chatid", "chatId", "key.remoteJid", "remoteJid"];

const ROOT_CHAT_JID_FIELDS: &[&str] = &["chat.wa_chatid", "chat.id", "chatid"];

const SENDER_FIELDS: &[&str] = &["sender_pn", "senderPn", "participant_pn", "sender", "participant", "key.participant"];

const SENDER_NAME_FIELDS: &[&str] = &["senderName", "pushName", "notifyName"];

const GROUP_NAME_FIELDS: &[&str] = &["groupName", "group_name"];

const ROOT_CHAT_NAME_FIELDS: &[&str] = &["chat.name", "chat.wa_name", "chat.wa_contactName"];

const WAS_SENT_BY_API_FIELDS: &[&str] = &["wasSentByApi", "sentByApi", "was_sent_by_api"];

const TRACK_ID_FIELDS: &[&str] = &["track_id", "trackId"];

const TEXT_FIELDS: &[&str] = &[
    "text",
    "content.text",
    "content.conversation",
    "content",
    "body",
    "caption",
    "content.caption",
];

const MEDIA_TYPE_FIELDS: &[&str] = &["mediaType", "media_type"];

const MEDIA_URL_FIELDS: &[&str] = &["fileURL", "fileUrl", "mediaUrl", "content.URL", "content.url", "url"];

const MEDIA_KINDS: &[&str] = &["image", "video", "audio", "ptt", "document", "sticker", "myaudio"];

const QUOTED_ID_FIELDS: &[&str] = &[
    "quoted",
    "quotedMsgId",
    "content.contextInfo.stanzaID",
    "content.contextInfo.stanzaId",
    "contextInfo.stanzaId",
];

const QUOTED_TEXT_FIELDS: &[&str] = &[
    "content.contextInfo.quotedMessage.conversation",
    "content.contextInfo.quotedMessage.extendedTextMessage.text",
    "quotedText",
];

const TIMESTAMP_FIELDS: &[&str] = &["messageTimestamp", "timestamp", "t"];

const PROFILE_PHOTO_FIELDS: &[&str] = &["chat.imagePreview", "chat.image", "message.senderProfilePic"];

/// Longest pseudo-phone synthesized for a group.
const GROUP_PSEUDO_PHONE_DIGITS: usize = 15;

/// A reaction to an earlier message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReactionEvent {
    pub token: Option<String>,
    pub target_id: String,
    pub emoji: String,
    pub from_me: bool,
    /// Who reacted: `me` for our own number, else the sender.
    pub actor: String,
}

/// An edit of an earlier message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EditEvent {
    pub token: Option<String>,
    pub original_id: String,
    pub new_text: String,
    pub from_me: bool,
}

/// A delete/revoke of an earlier message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeleteEvent {
    pub token: Option<String>,
    pub target_id: String,
    pub from_me: bool,
}

/// Media attached to a message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MediaRef {
    /// `image`, `audio`, ...
    pub kind: String,
    /// Gateway-internal URL, possibly not fetchable by the CRM.
    pub url: Option<String>,
}

/// A regular message with everything the pipeline needs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewMessageEvent {
    pub token: Option<String>,
    pub message_id: Option<String>,
    pub chat_jid: String,
    /// Routable phone of the chat (digits). Synthesized for groups.
    pub phone: String,
    pub from_me: bool,
    pub was_sent_by_api: bool,
    pub track_id: Option<String>,
    pub is_group: bool,
    pub group_name: Option<String>,
    /// Member phone inside a group.
    pub member_phone: Option<String>,
    pub sender_name: Option<String>,
    pub text: Option<String>,
    pub media: Option<MediaRef>,
    pub quoted_id: Option<String>,
    pub quoted_text: Option<String>,
    pub timestamp_ms: i64,
    pub profile_photo: Option<String>,
}

impl NewMessageEvent {
    /// Text or media present.
    pub fn has_content(&self) -> bool {
        self.text.is_some() || self.media.is_some()
    }
}

/// Outcome of classifying one webhook payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WebhookEvent {
    Receipt,
    Reaction(ReactionEvent),
    Edit(EditEvent),
    Delete(DeleteEvent),
    Ignored { reason: &'static str },
    NewMessage(Box<NewMessageEvent>),
}

impl WebhookEvent {
    pub fn kind(&self) -> &'static str {
        match self {
            WebhookEvent::Receipt => "receipt",
            WebhookEvent::Reaction(_) => "reaction",
            WebhookEvent::Edit(_) => "edit",
            WebhookEvent::Delete(_) => "delete",
            WebhookEvent::Ignored { .. } => "ignored",
            WebhookEvent::NewMessage(_) => "message",
        }
    }
}

/// Digits of a JID's user part (`5511...:12@s.whatsapp.net` -> `5511...`).
pub fn jid_digits(jid: &str) -> String {
    jid.split(['@', ':'])
        .next()
        .unwrap_or_default()
        .chars()
        .filter(char::is_ascii_digit)
        .collect()
}

/// Pseudo-phone for a group: the leading digits of its id.
pub fn group_pseudo_phone(group_jid: &str) -> String {
    jid_digits(group_jid)
        .chars()
        .take(GROUP_PSEUDO_PHONE_DIGITS)
        .collect()
}

fn lower(value: Option<String>) -> String {
    value.unwrap_or_default().to_ascii_lowercase()
}

/// Look in the message object first, then at the root.
fn msg_str(msg: &Value, root: &Value, fields: &[&str]) -> Option<String> {
    first_str(msg, fields).or_else(|| first_str(root, fields))
}

fn msg_bool(msg: &Value, root: &Value, fields: &[&str]) -> Option<bool> {
    first_bool(msg, fields).or_else(|| first_bool(root, fields))
}

fn protocol_code(msg: &Value, inner_type: &str) -> Option<i64> {
    if inner_type == "protocolmessage" {
        first_i64(msg, &["content.type", "content.Type", "protocolMessage.type"])
    } else {
        first_i64(msg, &["protocolMessage.type"])
    }
}

/// Classify a gateway webhook payload.
pub fn classify(payload: &Value) -> WebhookEvent {
    let event_type = lower(first_str(payload, EVENT_TYPE_FIELDS));
    let msg = first_present(payload, MESSAGE_OBJECT_FIELDS)
        .filter(|v| v.is_object())
        .unwrap_or(&Value::Null);
    let token = first_str(payload, TOKEN_FIELDS);
    let inner_type = lower(first_str(msg, INNER_TYPE_FIELDS));
    let from_me = msg_bool(msg, payload, FROM_ME_FIELDS).unwrap_or(false);

    // 1. Receipts
    let receipt_state = lower(first_str(payload, RECEIPT_STATE_FIELDS));
    let root_type = lower(first_str(payload, &["type", "event.Type"]));
    if (event_type == "messages_update" && RECEIPT_STATES.contains(&receipt_state.as_str()))
        || root_type == "readreceipt"
        || event_type == "readreceipt"
    {
        return WebhookEvent::Receipt;
    }

    // 2. Reactions
    // Protocol messages (edits, revokes) carry `content.key` too, so an
    // untyped payload only counts its nested key when it is not one of them.
    let protocol = protocol_code(msg, &inner_type);
    let edited_field = first_str(msg, &["edited"]);
    let typed_reaction = inner_type == "reactionmessage" || inner_type == "reaction";
    let flagged = DELETE_FLAG_FIELDS
        .iter()
        .any(|field| first_bool(msg, &[field]) == Some(true));
    let maybe_protocol = inner_type == "protocolmessage"
        || protocol.is_some()
        || flagged
        || edited_field.is_some()
        || EDIT_EVENT_TYPES.contains(&event_type.as_str())
        || DELETE_EVENT_TYPES.contains(&event_type.as_str());
    let reaction_target = if typed_reaction {
        first_str(msg, REACTION_TARGET_FIELDS)
    } else if maybe_protocol {
        first_str(msg, &["reaction"])
    } else {
        first_str(msg, &["reaction"]).or_else(|| {
            first_str(msg, REACTION_EMOJI_FIELDS)
                .and_then(|_| first_str(msg, &REACTION_TARGET_FIELDS[1..]))
        })
    };
    if typed_reaction || reaction_target.is_some() {
        let Some(target_id) = reaction_target else {
            return WebhookEvent::Ignored {
                reason: "reaction without target",
            };
        };
        let Some(emoji) = first_str(msg, REACTION_EMOJI_FIELDS) else {
            return WebhookEvent::Ignored {
                reason: "reaction removed",
            };
        };
        let actor = if from_me {
            "me".to_string()
        } else {
            msg_str(msg, payload, SENDER_FIELDS)
                .or_else(|| msg_str(msg, payload, CHAT_JID_FIELDS))
                .map(|s| jid_digits(&s))
                .unwrap_or_default()
        };
        return WebhookEvent::Reaction(ReactionEvent {
            token,
            target_id,
            emoji,
            from_me,
            actor,
        });
    }

    // 3. Edits
    if EDIT_EVENT_TYPES.contains(&event_type.as_str())
        || protocol == Some(PROTOCOL_EDIT)
        || edited_field.is_some()
    {
        let Some(original_id) = edited_field.or_else(|| first_str(msg, EDIT_TARGET_FIELDS)) else {
            return WebhookEvent::Ignored {
                reason: "edit without original id",
            };
        };
        let Some(new_text) = first_str(msg, EDIT_TEXT_FIELDS) else {
            return WebhookEvent::Ignored {
                reason: "edit without text",
            };
        };
        return WebhookEvent::Edit(EditEvent {
            token,
            original_id,
            new_text,
            from_me,
        });
    }

    // 4. Deletes
    if flagged
        || DELETE_EVENT_TYPES.contains(&event_type.as_str())
        || protocol == Some(PROTOCOL_REVOKE)
    {
        let Some(target_id) = first_str(msg, DELETE_TARGET_FIELDS) else {
            return WebhookEvent::Ignored {
                reason: "delete without target",
            };
        };
        return WebhookEvent::Delete(DeleteEvent {
            token,
            target_id,
            from_me,
        });
    }

    // 5. Anything that is not a message
    if !event_type.contains("message") {
        return WebhookEvent::Ignored {
            reason: "not a message event",
        };
    }

    // 6. New message
    match extract_new_message(msg, payload, token, from_me) {
        Some(event) => WebhookEvent::NewMessage(Box::new(event)),
        None => WebhookEvent::Ignored {
            reason: "incomplete payload",
        },
    }
}

fn extract_new_message(
    msg: &Value,
    root: &Value,
    token: Option<String>,
    from_me: bool,
) -> Option<NewMessageEvent> {
    // The chat JID is routable; `sender` may be an internal linked id.
    let chat_jid = first_str(msg, CHAT_JID_FIELDS).or_else(|| first_str(root, ROOT_CHAT_JID_FIELDS))?;
    let is_group = chat_jid.ends_with(GROUP_JID_SUFFIX) || first_bool(msg, &["isGroup"]) == Some(true);

    let phone = if is_group {
        group_pseudo_phone(&chat_jid)
    } else {
        jid_digits(&chat_jid)
    };
    if phone.is_empty() {
        return None;
    }

    let inner_type = lower(first_str(msg, INNER_TYPE_FIELDS));
    let media_kind = first_str(msg, MEDIA_TYPE_FIELDS)
        .map(|k| k.to_ascii_lowercase())
        .filter(|k| MEDIA_KINDS.iter().any(|m| k.contains(m)))
        .or_else(|| {
            MEDIA_KINDS
                .iter()
                .find(|m| inner_type.contains(*m))
                .map(|m| m.to_string())
        });
    let media = media_kind.map(|kind| MediaRef {
        kind,
        url: first_str(msg, MEDIA_URL_FIELDS),
    });

    let member_phone = if is_group {
        first_str(msg, SENDER_FIELDS)
            .filter(|s| !s.ends_with("@lid"))
            .map(|s| jid_digits(&s))
            .filter(|d| !d.is_empty())
    } else {
        None
    };

    let group_name = if is_group {
        first_str(msg, GROUP_NAME_FIELDS).or_else(|| first_str(root, ROOT_CHAT_NAME_FIELDS))
    } else {
        None
    };

    let timestamp_ms = first_i64(msg, TIMESTAMP_FIELDS)
        .map(|t| if t < 100_000_000_000 { t * 1000 } else { t })
        .unwrap_or_else(database::now_millis);

    let event = NewMessageEvent {
        token,
        message_id: first_str(msg, MESSAGE_ID_FIELDS),
        chat_jid,
        phone,
        from_me,
        was_sent_by_api: msg_bool(msg, root, WAS_SENT_BY_API_FIELDS).unwrap_or(false),
        track_id: msg_str(msg, root, TRACK_ID_FIELDS),
        is_group,
        group_name,
        member_phone,
        sender_name: first_str(msg, SENDER_NAME_FIELDS),
        text: first_str(msg, TEXT_FIELDS),
        media,
        quoted_id: first_str(msg, QUOTED_ID_FIELDS),
        quoted_text: first_str(msg, QUOTED_TEXT_FIELDS),
        timestamp_ms,
        profile_photo: first_str(root, PROFILE_PHOTO_FIELDS),
    };

    event.has_content().then_some(event)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn new_message(payload: Value) -> NewMessageEvent {
        match classify(&payload) {
            WebhookEvent::NewMessage(event) => *event,
            other => panic!("expected new message, got {other:?}"),
        }
    }

    #[test]
    fn test_read_receipt() {
        let payload = json!({"EventType": "messages_update", "state": "Read", "token": "t"});
        assert_eq!(classify(&payload), WebhookEvent::Receipt);
        assert_eq!(classify(&json!({"type": "ReadReceipt"})), WebhookEvent::Receipt);
    }

    #[test]
    fn test_reaction_by_type() {
        let payload = json!({
            "EventType": "messages",
            "token": "tok1",
            "message": {
                "messageType": "ReactionMessage",
                "reaction": "ABC",
                "text": "👍",
                "fromMe": false,
                "sender": "5511999998888@s.whatsapp.net"
            }
        });
        match classify(&payload) {
            WebhookEvent::Reaction(r) => {
                assert_eq!(r.target_id, "ABC");
                assert_eq!(r.emoji, "👍");
                assert_eq!(r.actor, "5511999998888");
                assert_eq!(r.token.as_deref(), Some("tok1"));
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn test_reaction_from_nested_key() {
        let payload = json!({
            "EventType": "messages",
            "message": {"content": {"key": {"ID": "XYZ"}, "text": "❤️"}, "fromMe": true}
        });
        match classify(&payload) {
            WebhookEvent::Reaction(r) => {
                assert_eq!(r.target_id, "XYZ");
                assert_eq!(r.actor, "me");
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn test_reaction_from_reaction_message_key() {
        let payload = json!({
            "EventType": "messages",
            "message": {
                "reactionMessage": {"key": {"id": "TARGET9"}, "text": "😂"},
                "sender": "5511988887777@s.whatsapp.net"
            }
        });
        match classify(&payload) {
            WebhookEvent::Reaction(r) => {
                assert_eq!(r.target_id, "TARGET9");
                assert_eq!(r.emoji, "😂");
                assert_eq!(r.actor, "5511988887777");
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn test_nested_key_with_protocol_code_is_not_a_reaction() {
        let payload = json!({
            "EventType": "messages",
            "message": {
                "protocolMessage": {"type": 0, "key": {"id": "GONE3"}},
                "content": {"key": {"ID": "GONE3"}, "text": "x"}
            }
        });
        match classify(&payload) {
            WebhookEvent::Delete(d) => assert_eq!(d.target_id, "GONE3"),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn test_empty_reaction_is_ignored() {
        let payload = json!({
            "EventType": "messages",
            "message": {"messageType": "ReactionMessage", "reaction": "ABC", "text": ""}
        });
        assert!(matches!(classify(&payload), WebhookEvent::Ignored { .. }));
    }

    #[test]
    fn test_edit_by_event_type() {
        let payload = json!({
            "EventType": "messages.edit",
            "message": {"edited": "ORIG1", "text": "fixed typo", "fromMe": false}
        });
        assert_eq!(
            classify(&payload),
            WebhookEvent::Edit(EditEvent {
                token: None,
                original_id: "ORIG1".to_string(),
                new_text: "fixed typo".to_string(),
                from_me: false,
            })
        );
    }

    #[test]
    fn test_edit_by_protocol_code() {
        let payload = json!({
            "EventType": "messages",
            "message": {
                "messageType": "ProtocolMessage",
                "content": {
                    "type": 14,
                    "key": {"ID": "ORIG2"},
                    "editedMessage": {"conversation": "new text"}
                }
            }
        });
        match classify(&payload) {
            WebhookEvent::Edit(e) => {
                assert_eq!(e.original_id, "ORIG2");
                assert_eq!(e.new_text, "new text");
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn test_delete_by_protocol_code() {
        let payload = json!({
            "EventType": "messages",
            "message": {
                "messageType": "ProtocolMessage",
                "content": {"type": 0, "key": {"ID": "GONE1"}},
                "fromMe": false
            }
        });
        match classify(&payload) {
            WebhookEvent::Delete(d) => assert_eq!(d.target_id, "GONE1"),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn test_delete_by_flag() {
        let payload = json!({
            "EventType": "messages.update",
            "message": {"messageid": "GONE2", "revoked": true}
        });
        match classify(&payload) {
            WebhookEvent::Delete(d) => assert_eq!(d.target_id, "GONE2"),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn test_non_message_event_ignored() {
        let payload = json!({"EventType": "connection", "instance": {"status": "open"}});
        assert!(matches!(classify(&payload), WebhookEvent::Ignored { .. }));
    }

    #[test]
    fn test_new_inbound_text() {
        let event = new_message(json!({
            "EventType": "messages",
            "message": {
                "messageid": "ABC123",
                "fromMe": false,
                "content": "Hi there",
                "chatid": "5511999998888@s.whatsapp.net"
            },
            "token": "tok1"
        }));
        assert_eq!(event.message_id.as_deref(), Some("ABC123"));
        assert_eq!(event.phone, "5511999998888");
        assert_eq!(event.text.as_deref(), Some("Hi there"));
        assert!(!event.from_me);
        assert!(!event.is_group);
    }

    #[test]
    fn test_chat_jid_preferred_over_sender() {
        let event = new_message(json!({
            "EventType": "messages",
            "message": {
                "text": "hey",
                "chatid": "5511999998888@s.whatsapp.net",
                "sender": "123456789@lid"
            }
        }));
        assert_eq!(event.phone, "5511999998888");
    }

    #[test]
    fn test_group_message_fields() {
        let event = new_message(json!({
            "EventType": "messages",
            "message": {
                "messageid": "G1",
                "text": "hello group",
                "chatid": "120363025246125486@g.us",
                "sender": "5511988887777@s.whatsapp.net",
                "senderName": "Ana",
                "groupName": "Sales Team",
                "isGroup": true
            }
        }));
        assert!(event.is_group);
        assert_eq!(event.phone, "120363025246125");
        assert_eq!(event.member_phone.as_deref(), Some("5511988887777"));
        assert_eq!(event.sender_name.as_deref(), Some("Ana"));
        assert_eq!(event.group_name.as_deref(), Some("Sales Team"));
    }

    #[test]
    fn test_api_flags_and_media() {
        let event = new_message(json!({
            "EventType": "messages",
            "message": {
                "messageid": "M9",
                "chatid": "5511999998888@s.whatsapp.net",
                "messageType": "ImageMessage",
                "fileURL": "https://gw.internal/enc/abc",
                "wasSentByApi": true,
                "track_id": "agent-7",
                "fromMe": true,
                "messageTimestamp": 1_700_000_000
            }
        }));
        assert!(event.was_sent_by_api);
        assert_eq!(event.track_id.as_deref(), Some("agent-7"));
        assert_eq!(event.media.as_ref().map(|m| m.kind.as_str()), Some("image"));
        assert_eq!(event.timestamp_ms, 1_700_000_000_000);
    }

    #[test]
    fn test_missing_content_is_incomplete() {
        let payload = json!({
            "EventType": "messages",
            "message": {"messageid": "X", "chatid": "5511999998888@s.whatsapp.net"}
        });
        assert_eq!(
            classify(&payload),
            WebhookEvent::Ignored {
                reason: "incomplete payload"
            }
        );
    }

    #[test]
    fn test_missing_sender_is_incomplete() {
        let payload = json!({"EventType": "messages", "message": {"text": "orphan"}});
        assert!(matches!(classify(&payload), WebhookEvent::Ignored { .. }));
    }
}
