//! CRM REST client.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, Method};
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::{json, Value};
use tracing::{debug, info};

use crate::config::{CrmConfig, OAuthCredentials};
use crate::error::{CrmError, Result};
use crate::retry::{send_with_retry, RetryPolicy};
use crate::types::{
    Contact, ContactUpdate, CrmMessage, MessageBody, NewContact, SentCrmMessage, TokenGrant,
};

/// Message channel type used for synced WhatsApp traffic.
const MESSAGE_TYPE: &str = "SMS";

/// Message type rendered as an internal note on the conversation.
const INTERNAL_NOTE_TYPE: &str = "InternalComment";

/// Operations the bridge needs from the CRM.
///
/// Every call except the token grant takes the location's bearer token.
#[async_trait]
pub trait Crm: Send + Sync {
    /// Exchange a refresh token for a new token pair. Never retried.
    async fn refresh_token(
        &self,
        credentials: &OAuthCredentials,
        refresh_token: &str,
    ) -> Result<TokenGrant>;

    async fn find_contact_by_phone(
        &self,
        token: &str,
        location_id: &str,
        phone: &str,
    ) -> Result<Option<Contact>>;

    async fn find_contact_by_email(
        &self,
        token: &str,
        location_id: &str,
        email: &str,
    ) -> Result<Option<Contact>>;

    /// Create a contact. A duplicate surfaces as [`CrmError::DuplicateContact`]
    /// carrying the existing id.
    async fn create_contact(&self, token: &str, contact: &NewContact) -> Result<Contact>;

    async fn get_contact(&self, token: &str, contact_id: &str) -> Result<Contact>;

    async fn update_contact(
        &self,
        token: &str,
        contact_id: &str,
        update: &ContactUpdate,
    ) -> Result<()>;

    async fn add_tags(&self, token: &str, contact_id: &str, tags: &[String]) -> Result<()>;

    /// Store a message from the lead.
    async fn send_inbound_message(&self, token: &str, message: &CrmMessage)
        -> Result<SentCrmMessage>;

    /// Record a message already delivered by the gateway. The CRM does not
    /// fire its own outbound webhook for these.
    async fn send_outbound_message(
        &self,
        token: &str,
        message: &CrmMessage,
    ) -> Result<SentCrmMessage>;

    /// Post an internal note on the contact's conversation.
    async fn send_internal_note(
        &self,
        token: &str,
        contact_id: &str,
        text: &str,
    ) -> Result<SentCrmMessage>;
}

/// reqwest-backed [`Crm`].
#[derive(Clone)]
pub struct CrmClient {
    http: Client,
    config: CrmConfig,
    retry: RetryPolicy,
}

impl CrmClient {
    pub fn new(config: CrmConfig) -> Result<Self> {
        let http = Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .map_err(CrmError::Http)?;
        Ok(Self {
            http,
            config,
            retry: RetryPolicy::default(),
        })
    }

    /// Replace the retry policy.
    pub fn with_retry_policy(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn config(&self) -> &CrmConfig {
        &self.config
    }

    /// Authenticated call with retry. Returns the parsed body.
    async fn execute<B: Serialize + Sync>(
        &self,
        token: &str,
        method: Method,
        path: &str,
        query: &[(&str, &str)],
        body: Option<&B>,
    ) -> Result<Value> {
        let url = self.config.url(path);
        debug!(%method, %url, "CRM request");

        let response = send_with_retry(&self.retry, || {
            let mut request = self
                .http
                .request(method.clone(), &url)
                .bearer_auth(token)
                .header("Version", &self.config.api_version)
                .header("Accept", "application/json")
                .query(query);
            if let Some(body) = body {
                request = request.json(body);
            }
            request.send()
        })
        .await?;

        let status = response.status();
        let text = response.text().await?;
        if !status.is_success() {
            return Err(CrmError::Api {
                status: status.as_u16(),
                body: text,
            });
        }
        if text.trim().is_empty() {
            return Ok(Value::Null);
        }
        Ok(serde_json::from_str(&text)?)
    }

    async fn search_duplicate(
        &self,
        token: &str,
        location_id: &str,
        field: &str,
        value: &str,
    ) -> Result<Option<Contact>> {
        let body = self
            .execute::<()>(
                token,
                Method::GET,
                "/contacts/search/duplicate",
                &[("locationId", location_id), (field, value)],
                None,
            )
            .await?;
        match body.get("contact") {
            Some(Value::Object(_)) => Ok(Some(parse_field(&body, "contact")?)),
            _ => Ok(None),
        }
    }

    async fn post_message(
        &self,
        token: &str,
        path: &str,
        body: &MessageBody<'_>,
    ) -> Result<SentCrmMessage> {
        let response = self.execute(token, Method::POST, path, &[], Some(body)).await?;
        parse_sent(&response)
    }

    fn message_body<'a>(
        &'a self,
        message: &'a CrmMessage,
        direction: Option<&'a str>,
    ) -> MessageBody<'a> {
        MessageBody {
            kind: MESSAGE_TYPE,
            contact_id: &message.contact_id,
            message: &message.message,
            attachments: &message.attachments,
            conversation_provider_id: self.config.conversation_provider_id.as_deref(),
            alt_id: message.alt_id.as_deref(),
            user_id: message.user_id.as_deref(),
            direction,
        }
    }
}

#[async_trait]
impl Crm for CrmClient {
    async fn refresh_token(
        &self,
        credentials: &OAuthCredentials,
        refresh_token: &str,
    ) -> Result<TokenGrant> {
        let url = self.config.url("/oauth/token");
        let form = [
            ("client_id", credentials.client_id.as_str()),
            ("client_secret", credentials.client_secret.as_str()),
            ("grant_type", "refresh_token"),
            ("refresh_token", refresh_token),
            ("user_type", "Location"),
        ];

        let response = self
            .http
            .post(&url)
            .header("Accept", "application/json")
            .form(&form)
            .send()
            .await
            .map_err(|e| CrmError::TokenRefresh(e.to_string()))?;

        let status = response.status();
        let text = response.text().await.unwrap_or_default();
        if !status.is_success() {
            return Err(CrmError::TokenRefresh(format!("{}: {}", status.as_u16(), text)));
        }

        let grant: TokenGrant = serde_json::from_str(&text)
            .map_err(|e| CrmError::TokenRefresh(format!("unreadable grant: {e}")))?;
        info!(expires_in = grant.expires_in, "CRM token refreshed");
        Ok(grant)
    }

    async fn find_contact_by_phone(
        &self,
        token: &str,
        location_id: &str,
        phone: &str,
    ) -> Result<Option<Contact>> {
        self.search_duplicate(token, location_id, "number", phone).await
    }

    async fn find_contact_by_email(
        &self,
        token: &str,
        location_id: &str,
        email: &str,
    ) -> Result<Option<Contact>> {
        self.search_duplicate(token, location_id, "email", email).await
    }

    async fn create_contact(&self, token: &str, contact: &NewContact) -> Result<Contact> {
        match self
            .execute(token, Method::POST, "/contacts/", &[], Some(contact))
            .await
        {
            Ok(body) => parse_field(&body, "contact"),
            Err(CrmError::Api { status, body }) => match duplicate_contact_id(&body) {
                Some(contact_id) => Err(CrmError::DuplicateContact { contact_id }),
                None => Err(CrmError::Api { status, body }),
            },
            Err(e) => Err(e),
        }
    }

    async fn get_contact(&self, token: &str, contact_id: &str) -> Result<Contact> {
        let body = self
            .execute::<()>(token, Method::GET, &format!("/contacts/{contact_id}"), &[], None)
            .await?;
        parse_field(&body, "contact")
    }

    async fn update_contact(
        &self,
        token: &str,
        contact_id: &str,
        update: &ContactUpdate,
    ) -> Result<()> {
        self.execute(
            token,
            Method::PUT,
            &format!("/contacts/{contact_id}"),
            &[],
            Some(update),
        )
        .await?;
        Ok(())
    }

    async fn add_tags(&self, token: &str, contact_id: &str, tags: &[String]) -> Result<()> {
        self.execute(
            token,
            Method::POST,
            &format!("/contacts/{contact_id}/tags"),
            &[],
            Some(&json!({ "tags": tags })),
        )
        .await?;
        Ok(())
    }

    async fn send_inbound_message(
        &self,
        token: &str,
        message: &CrmMessage,
    ) -> Result<SentCrmMessage> {
        let body = self.message_body(message, None);
        self.post_message(token, "/conversations/messages/inbound", &body)
            .await
    }

    async fn send_outbound_message(
        &self,
        token: &str,
        message: &CrmMessage,
    ) -> Result<SentCrmMessage> {
        let body = self.message_body(message, Some("outbound"));
        self.post_message(token, "/conversations/messages/outbound", &body)
            .await
    }

    async fn send_internal_note(
        &self,
        token: &str,
        contact_id: &str,
        text: &str,
    ) -> Result<SentCrmMessage> {
        let body = MessageBody {
            kind: INTERNAL_NOTE_TYPE,
            contact_id,
            message: text,
            attachments: &[],
            conversation_provider_id: None,
            alt_id: None,
            user_id: None,
            direction: None,
        };
        self.post_message(token, "/conversations/messages", &body).await
    }
}

impl std::fmt::Debug for CrmClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CrmClient")
            .field("api_url", &self.config.api_url)
            .field("retry", &self.retry)
            .finish()
    }
}

fn parse_field<T: DeserializeOwned>(body: &Value, field: &str) -> Result<T> {
    let value = body.get(field).cloned().unwrap_or_else(|| body.clone());
    Ok(serde_json::from_value(value)?)
}

fn parse_sent(body: &Value) -> Result<SentCrmMessage> {
    let message_id = ["messageId", "msgId", "id"]
        .iter()
        .find_map(|key| body.get(*key).and_then(Value::as_str))
        .ok_or_else(|| CrmError::Api {
            status: 200,
            body: format!("no message id in response: {body}"),
        })?;
    Ok(SentCrmMessage {
        message_id: message_id.to_string(),
        conversation_id: body
            .get("conversationId")
            .and_then(Value::as_str)
            .map(str::to_string),
    })
}

/// Existing contact id from a duplicate-contact error payload.
pub fn duplicate_contact_id(body: &str) -> Option<String> {
    let value: Value = serde_json::from_str(body).ok()?;
    value
        .pointer("/meta/contactId")
        .or_else(|| value.pointer("/meta/contact/id"))
        .and_then(Value::as_str)
        .map(str::to_string)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_duplicate_contact_id() {
        let body = r#"{"statusCode":400,"message":"duplicated contacts","meta":{"contactId":"c-9"}}"#;
        assert_eq!(duplicate_contact_id(body).as_deref(), Some("c-9"));
        assert_eq!(duplicate_contact_id(r#"{"message":"bad"}"#), None);
        assert_eq!(duplicate_contact_id("not json"), None);
    }

    #[test]
    fn test_parse_sent_aliases() {
        let sent = parse_sent(&json!({"msgId": "m1"})).unwrap();
        assert_eq!(sent.message_id, "m1");
        assert!(parse_sent(&json!({})).is_err());
    }
}
