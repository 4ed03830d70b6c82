//! HTTP-level tests for the CRM client against a mock server.

use std::time::Duration;

use crm_client::{
    ContactUpdate, Crm, CrmClient, CrmConfig, CrmError, CrmMessage, NewContact, OAuthCredentials,
    RetryPolicy,
};
use serde_json::json;
use wiremock::matchers::{body_json, body_string_contains, header, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn client(server: &MockServer) -> CrmClient {
    let mut config = CrmConfig::new(server.uri());
    config.conversation_provider_id = Some("prov-1".to_string());
    CrmClient::new(config).unwrap().with_retry_policy(RetryPolicy {
        max_attempts: 3,
        base_delay: Duration::from_millis(5),
        max_delay: Duration::from_millis(20),
    })
}

mod oauth_tests {
    use super::*;

    #[tokio::test]
    async fn test_refresh_token_form_grant() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/oauth/token"))
            .and(body_string_contains("grant_type=refresh_token"))
            .and(body_string_contains("refresh_token=r-old"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "access_token": "a-new",
                "refresh_token": "r-new",
                "expires_in": 86399
            })))
            .mount(&server)
            .await;

        let grant = client(&server)
            .refresh_token(&OAuthCredentials::new("cid", "secret"), "r-old")
            .await
            .unwrap();
        assert_eq!(grant.access_token, "a-new");
        assert_eq!(grant.expires_in, 86399);
    }

    #[tokio::test]
    async fn test_refresh_rejection_is_token_error_without_retry() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/oauth/token"))
            .respond_with(ResponseTemplate::new(503))
            .expect(1)
            .mount(&server)
            .await;

        let err = client(&server)
            .refresh_token(&OAuthCredentials::new("cid", "secret"), "r-old")
            .await
            .unwrap_err();
        assert!(matches!(err, CrmError::TokenRefresh(_)));
    }
}

mod contact_tests {
    use super::*;

    #[tokio::test]
    async fn test_find_contact_by_phone() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/contacts/search/duplicate"))
            .and(query_param("locationId", "L1"))
            .and(query_param("number", "+5511999998888"))
            .and(header("Authorization", "Bearer tkn"))
            .and(header("Version", "2021-07-28"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(json!({"contact": {"id": "c1", "phone": "+5511999998888"}})),
            )
            .mount(&server)
            .await;

        let contact = client(&server)
            .find_contact_by_phone("tkn", "L1", "+5511999998888")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(contact.id, "c1");
    }

    #[tokio::test]
    async fn test_find_contact_missing() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/contacts/search/duplicate"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"contact": null})))
            .mount(&server)
            .await;

        let found = client(&server)
            .find_contact_by_email("tkn", "L1", "120363@g.us")
            .await
            .unwrap();
        assert!(found.is_none());
    }

    #[tokio::test]
    async fn test_create_contact_duplicate_carries_existing_id() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/contacts/"))
            .respond_with(ResponseTemplate::new(400).set_body_json(json!({
                "statusCode": 400,
                "message": "This location does not allow duplicated contacts.",
                "meta": {"contactId": "existing-7"}
            })))
            .mount(&server)
            .await;

        let new = NewContact {
            location_id: "L1".to_string(),
            phone: "+5511999998888".to_string(),
            ..Default::default()
        };
        let err = client(&server).create_contact("tkn", &new).await.unwrap_err();
        match err {
            CrmError::DuplicateContact { contact_id } => assert_eq!(contact_id, "existing-7"),
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_update_contact_sends_only_set_fields() {
        let server = MockServer::start().await;
        Mock::given(method("PUT"))
            .and(path("/contacts/c1"))
            .and(body_json(json!({"assignedTo": "user-1"})))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"succeded": true})))
            .expect(1)
            .mount(&server)
            .await;

        let update = ContactUpdate {
            assigned_to: Some("user-1".to_string()),
            profile_photo: None,
        };
        client(&server).update_contact("tkn", "c1", &update).await.unwrap();
    }
}

mod message_tests {
    use super::*;

    #[tokio::test]
    async fn test_inbound_message_body() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/conversations/messages/inbound"))
            .and(body_json(json!({
                "type": "SMS",
                "contactId": "c1",
                "message": "Hi there",
                "conversationProviderId": "prov-1",
                "altId": "ABC123"
            })))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(json!({"conversationId": "conv1", "messageId": "ghl-1"})),
            )
            .mount(&server)
            .await;

        let mut message = CrmMessage::text("c1", "Hi there");
        message.alt_id = Some("ABC123".to_string());
        let sent = client(&server)
            .send_inbound_message("tkn", &message)
            .await
            .unwrap();
        assert_eq!(sent.message_id, "ghl-1");
        assert_eq!(sent.conversation_id.as_deref(), Some("conv1"));
    }

    #[tokio::test]
    async fn test_outbound_retries_on_429_then_succeeds() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/conversations/messages/outbound"))
            .respond_with(ResponseTemplate::new(429).insert_header("retry-after", "0"))
            .up_to_n_times(2)
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/conversations/messages/outbound"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"messageId": "ghl-2"})))
            .mount(&server)
            .await;

        let sent = client(&server)
            .send_outbound_message("tkn", &CrmMessage::text("c1", "from phone"))
            .await
            .unwrap();
        assert_eq!(sent.message_id, "ghl-2");
    }

    #[tokio::test]
    async fn test_gives_up_after_three_attempts() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/conversations/messages/inbound"))
            .respond_with(ResponseTemplate::new(502))
            .expect(3)
            .mount(&server)
            .await;

        let err = client(&server)
            .send_inbound_message("tkn", &CrmMessage::text("c1", "x"))
            .await
            .unwrap_err();
        assert!(matches!(err, CrmError::Api { status: 502, .. }));
    }

    #[tokio::test]
    async fn test_unauthorized_is_not_retried() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/conversations/messages"))
            .respond_with(ResponseTemplate::new(401))
            .expect(1)
            .mount(&server)
            .await;

        let err = client(&server)
            .send_internal_note("tkn", "c1", "note")
            .await
            .unwrap_err();
        assert!(matches!(err, CrmError::Api { status: 401, .. }));
    }
}
