//! CRM-initiated actions and the gateway echoes they cause.

mod common;

use common::*;
use database::{contact_phone, ledger};
use mock_upstreams::{FakeCrm, FakeGateway, GatewayCall};
use serde_json::json;
use sync_engine::{MessageAction, SyncError};

async fn bridge_with_lead() -> Bridge {
    bridge_with_lead_on(FakeGateway::new()).await
}

async fn bridge_with_lead_on(gateway: FakeGateway) -> Bridge {
    let bridge = Bridge::with(gateway, FakeCrm::new()).await;
    contact_phone::upsert_contact_phone(bridge.db().pool(), "contact-lead", "L1", "5511999998888")
        .await
        .unwrap();
    bridge
}

fn webhook(message: serde_json::Value) -> serde_json::Value {
    json!({"EventType": "messages", "token": "tok1", "message": message})
}

#[tokio::test]
async fn test_edit_rejected_after_window() {
    let bridge = bridge_with_lead().await;
    bridge.map_entry("ghl-1", "GW1", "old text", minutes_ago(16)).await;

    let err = bridge.engine.edit_message("ghl-1", "new text").await.unwrap_err();
    assert!(matches!(err, SyncError::EditWindowExpired { age_minutes: 16 }));
    assert!(bridge.gateway.calls().is_empty());
    assert_eq!(bridge.entry("ghl-1").await.message_text, "old text");
}

#[tokio::test]
async fn test_edit_within_window_reaches_gateway() {
    let bridge = bridge_with_lead().await;
    bridge.map_entry("ghl-1", "GW1", "old text", minutes_ago(14)).await;

    let state = bridge.engine.edit_message("ghl-1", "new text").await.unwrap();
    assert!(state.is_edited);
    assert_eq!(state.message_text, "new text");

    assert_eq!(
        bridge.gateway.calls(),
        vec![GatewayCall::EditMessage {
            token: "tok1".to_string(),
            message_id: "GW1".to_string(),
            text: "new text".to_string(),
        }]
    );
    let notes = bridge.crm.internal_notes();
    assert_eq!(notes.len(), 1);
    assert_eq!(notes[0].1, "old text│✏️edited\n-----\nnew text");
}

#[tokio::test]
async fn test_edit_echo_not_synced_back() {
    let bridge = bridge_with_lead().await;
    bridge.map_entry("ghl-1", "GW1", "old text", minutes_ago(1)).await;
    bridge.engine.edit_message("ghl-1", "new text").await.unwrap();

    let echo = json!({
        "EventType": "messages.edit",
        "token": "tok1",
        "message": {"edited": "GW1", "text": "new text", "fromMe": true}
    });
    let outcome = bridge.engine.process_webhook(&echo).await.unwrap();

    assert!(outcome.is_ignored());
    assert_eq!(bridge.crm.message_count(), 0);
}

#[tokio::test]
async fn test_failed_gateway_edit_changes_nothing() {
    let bridge = bridge_with_lead_on(FakeGateway::new().failing_edits()).await;
    bridge.map_entry("ghl-1", "GW1", "old text", minutes_ago(1)).await;

    let err = bridge.engine.edit_message("ghl-1", "new text").await.unwrap_err();
    assert!(matches!(err, SyncError::Gateway(_)));
    assert!(!bridge.entry("ghl-1").await.is_edited);
    assert!(!ledger::is_claimed(bridge.db().pool(), "edit:GW1").await.unwrap());
}

#[tokio::test]
async fn test_failed_gateway_react_releases_echo_key() {
    let bridge = bridge_with_lead_on(FakeGateway::new().failing_reacts()).await;
    bridge.map_entry("ghl-1", "GW1", "hello", minutes_ago(1)).await;

    let err = bridge.engine.react_to_message("ghl-1", "👍").await.unwrap_err();
    assert!(matches!(err, SyncError::Gateway(_)));
    assert!(!ledger::is_claimed(bridge.db().pool(), "react:GW1:👍:me").await.unwrap());
    assert!(bridge.entry("ghl-1").await.reactions.0.is_empty());
}

#[tokio::test]
async fn test_second_crm_edit_still_suppresses_echo() {
    let bridge = bridge_with_lead().await;
    bridge.map_entry("ghl-1", "GW1", "v1", minutes_ago(1)).await;
    bridge.engine.edit_message("ghl-1", "v2").await.unwrap();
    bridge.engine.edit_message("ghl-1", "v3").await.unwrap();

    assert!(ledger::is_claimed(bridge.db().pool(), "edit:GW1").await.unwrap());
    assert_eq!(bridge.entry("ghl-1").await.message_text, "v3");
    assert_eq!(bridge.crm.internal_notes().len(), 2);
}

#[tokio::test]
async fn test_crm_react_replaces_webhook_reactions() {
    let bridge = bridge_with_lead().await;
    bridge.map_entry("ghl-1", "GW1", "hello", minutes_ago(1)).await;
    for emoji in ["😂", "🔥"] {
        let payload = webhook(json!({
            "messageType": "ReactionMessage",
            "reaction": "GW1",
            "text": emoji,
            "sender": "5511999998888@s.whatsapp.net"
        }));
        bridge.engine.process_webhook(&payload).await.unwrap();
    }
    assert_eq!(bridge.entry("ghl-1").await.reactions.0.len(), 2);

    let state = bridge.engine.react_to_message("ghl-1", "👍").await.unwrap();
    assert_eq!(state.reactions, vec!["👍".to_string()]);
    assert!(bridge.gateway.calls().contains(&GatewayCall::React {
        token: "tok1".to_string(),
        jid: "5511999998888@s.whatsapp.net".to_string(),
        message_id: "GW1".to_string(),
        emoji: "👍".to_string(),
    }));

    let echo = webhook(json!({
        "messageType": "ReactionMessage",
        "reaction": "GW1",
        "text": "👍",
        "fromMe": true
    }));
    assert!(bridge.engine.process_webhook(&echo).await.unwrap().is_ignored());
    assert_eq!(bridge.entry("ghl-1").await.reactions.0, vec!["👍".to_string()]);
}

#[tokio::test]
async fn test_react_requires_gateway_mapping() {
    let bridge = bridge_with_lead().await;
    bridge
        .engine
        .apply_action(
            MessageAction::from_value(json!({
                "action": "map",
                "ghlMessageId": "ghl-draft",
                "locationId": "L1",
                "contactId": "contact-lead",
                "messageText": "not sent yet"
            }))
            .unwrap(),
        )
        .await
        .unwrap();

    let err = bridge.engine.react_to_message("ghl-draft", "👍").await.unwrap_err();
    assert!(matches!(err, SyncError::NotMappedToGateway(_)));
    assert!(bridge.gateway.calls().is_empty());
}

#[tokio::test]
async fn test_crm_delete_revokes_and_swallows_echo() {
    let bridge = bridge_with_lead().await;
    bridge.map_entry("ghl-1", "GW1", "wrong chat", minutes_ago(1)).await;

    let state = bridge.engine.delete_message("ghl-1", true).await.unwrap();
    assert!(state.is_deleted);
    assert!(bridge.gateway.calls().contains(&GatewayCall::DeleteMessage {
        token: "tok1".to_string(),
        jid: "5511999998888@s.whatsapp.net".to_string(),
        message_id: "GW1".to_string(),
    }));

    let echo = webhook(json!({
        "messageType": "ProtocolMessage",
        "content": {"type": 0, "key": {"ID": "GW1"}},
        "fromMe": true
    }));
    assert!(bridge.engine.process_webhook(&echo).await.unwrap().is_ignored());
    assert_eq!(bridge.crm.internal_notes().len(), 1);
}

#[tokio::test]
async fn test_delete_survives_gateway_failure() {
    let bridge = bridge_with_lead_on(FakeGateway::new().failing_deletes()).await;
    bridge.map_entry("ghl-1", "GW1", "wrong chat", minutes_ago(1)).await;

    let state = bridge.engine.delete_message("ghl-1", true).await.unwrap();
    assert!(state.is_deleted);
    assert!(bridge.entry("ghl-1").await.is_deleted);
}

#[tokio::test]
async fn test_reply_quotes_and_maps_annotation() {
    let bridge = bridge_with_lead().await;
    bridge.map_entry("ghl-1", "GW1", "Is Friday ok?", minutes_ago(30)).await;

    let outcome = bridge
        .engine
        .reply_to_message("ghl-1", "Friday works", None, None)
        .await
        .unwrap();
    assert_eq!(outcome.instance_id, "i1");
    assert_eq!(outcome.gateway_message_id.as_deref(), Some("gw-out-1"));

    let sent = bridge.gateway.sent_texts();
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].number, "5511999998888");
    assert_eq!(sent[0].reply_id.as_deref(), Some("GW1"));
    assert_eq!(sent[0].track_id, None);

    let notes = bridge.crm.internal_notes();
    assert_eq!(notes[0].1, "↩️ Replying to: 'Is Friday ok?'\n-----\nFriday works");

    let note_id = outcome.ghl_message_id.unwrap();
    let mapped = bridge.entry_by_gateway_id("gw-out-1").await.unwrap();
    assert_eq!(mapped.ghl_message_id, note_id);
    assert!(mapped.from_me);

    let echo = webhook(json!({
        "messageid": "gw-out-1",
        "fromMe": true,
        "wasSentByApi": true,
        "text": "Friday works",
        "chatid": "5511999998888@s.whatsapp.net"
    }));
    assert!(bridge.engine.process_webhook(&echo).await.unwrap().is_ignored());
    assert_eq!(bridge.crm.message_count(), 0);
}

#[tokio::test]
async fn test_lookup_and_list_through_actions() {
    let bridge = bridge_with_lead().await;
    bridge.map_entry("ghl-1", "GW1", "first", minutes_ago(3)).await;
    bridge.map_entry("ghl-2", "GW2", "second", minutes_ago(2)).await;

    let found = bridge
        .engine
        .apply_action(
            MessageAction::from_value(json!({"action": "lookup", "gatewayMessageId": "GW2"})).unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(found["message"]["ghlMessageId"], json!("ghl-2"));

    let listed = bridge
        .engine
        .apply_action(
            MessageAction::from_value(json!({
                "action": "list-states",
                "ghlMessageIds": ["ghl-1", "ghl-2", "ghl-missing"]
            }))
            .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(listed["states"].as_array().map(Vec::len), Some(2));

    let missing = bridge.engine.lookup_message(Some("ghl-missing"), None).await.unwrap_err();
    assert!(missing.is_not_found());
}

#[test]
fn test_unknown_action_is_invalid_request() {
    let err = MessageAction::from_value(json!({"action": "forward", "ghlMessageId": "x"})).unwrap_err();
    assert!(matches!(err, SyncError::InvalidRequest(_)));
}
