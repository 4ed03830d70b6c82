//! Fake CRM - an in-memory contact book and message log.

use std::sync::Mutex;

use async_trait::async_trait;
use crm_client::{
    Contact, ContactUpdate, Crm, CrmError, CrmMessage, NewContact, OAuthCredentials, Result,
    SentCrmMessage, TokenGrant,
};

use crate::lock;

/// One recorded CRM call. `token` is the bearer token used.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CrmCall {
    RefreshToken { client_id: String, refresh_token: String },
    FindContactByPhone { token: String, location_id: String, phone: String },
    FindContactByEmail { token: String, location_id: String, email: String },
    CreateContact { token: String, contact: NewContact },
    GetContact { token: String, contact_id: String },
    UpdateContact { token: String, contact_id: String, update: ContactUpdate },
    AddTags { token: String, contact_id: String, tags: Vec<String> },
    Inbound { token: String, message: CrmMessage },
    Outbound { token: String, message: CrmMessage },
    InternalNote { token: String, contact_id: String, text: String },
}

#[derive(Debug)]
struct State {
    calls: Vec<CrmCall>,
    contacts: Vec<Contact>,
    grant: Option<TokenGrant>,
    duplicate_on_create: Option<String>,
    fail_sends: bool,
    fail_updates: bool,
    next_message: u64,
    next_contact: u64,
}

/// In-memory [`Crm`].
#[derive(Debug)]
pub struct FakeCrm {
    state: Mutex<State>,
}

impl Default for FakeCrm {
    fn default() -> Self {
        Self::new()
    }
}

fn digits(s: &str) -> String {
    s.chars().filter(char::is_ascii_digit).collect()
}

impl FakeCrm {
    /// An empty CRM that accepts everything and rejects token refreshes.
    pub fn new() -> Self {
        Self {
            state: Mutex::new(State {
                calls: Vec::new(),
                contacts: Vec::new(),
                grant: None,
                duplicate_on_create: None,
                fail_sends: false,
                fail_updates: false,
                next_message: 1,
                next_contact: 1,
            }),
        }
    }

    /// Grant returned by `refresh_token`.
    pub fn with_token_grant(self, grant: TokenGrant) -> Self {
        lock(&self.state).grant = Some(grant);
        self
    }

    /// Seed an existing contact.
    pub fn with_contact(self, contact: Contact) -> Self {
        lock(&self.state).contacts.push(contact);
        self
    }

    /// Make contact creation report a duplicate of `contact_id`.
    pub fn with_duplicate_on_create(self, contact_id: impl Into<String>) -> Self {
        lock(&self.state).duplicate_on_create = Some(contact_id.into());
        self
    }

    pub fn failing_sends(self) -> Self {
        lock(&self.state).fail_sends = true;
        self
    }

    /// Toggle send failures on a shared fake.
    pub fn set_failing_sends(&self, fail: bool) {
        lock(&self.state).fail_sends = fail;
    }

    pub fn failing_updates(self) -> Self {
        lock(&self.state).fail_updates = true;
        self
    }

    pub fn calls(&self) -> Vec<CrmCall> {
        lock(&self.state).calls.clone()
    }

    pub fn contacts(&self) -> Vec<Contact> {
        lock(&self.state).contacts.clone()
    }

    pub fn inbound_messages(&self) -> Vec<CrmMessage> {
        self.collect(|call| match call {
            CrmCall::Inbound { message, .. } => Some(message.clone()),
            _ => None,
        })
    }

    pub fn outbound_messages(&self) -> Vec<CrmMessage> {
        self.collect(|call| match call {
            CrmCall::Outbound { message, .. } => Some(message.clone()),
            _ => None,
        })
    }

    /// `(contact_id, text)` of every internal note.
    pub fn internal_notes(&self) -> Vec<(String, String)> {
        self.collect(|call| match call {
            CrmCall::InternalNote {
                contact_id, text, ..
            } => Some((contact_id.clone(), text.clone())),
            _ => None,
        })
    }

    pub fn created_contacts(&self) -> Vec<NewContact> {
        self.collect(|call| match call {
            CrmCall::CreateContact { contact, .. } => Some(contact.clone()),
            _ => None,
        })
    }

    /// Number of messages stored in either direction.
    pub fn message_count(&self) -> usize {
        self.inbound_messages().len() + self.outbound_messages().len()
    }

    fn collect<T>(&self, pick: impl Fn(&CrmCall) -> Option<T>) -> Vec<T> {
        lock(&self.state).calls.iter().filter_map(pick).collect()
    }

    fn record(&self, call: CrmCall) {
        lock(&self.state).calls.push(call);
    }

    fn store_message(&self) -> Result<SentCrmMessage> {
        let mut state = lock(&self.state);
        if state.fail_sends {
            return Err(CrmError::Api {
                status: 500,
                body: "fake CRM send failure".to_string(),
            });
        }
        let id = state.next_message;
        state.next_message += 1;
        Ok(SentCrmMessage {
            message_id: format!("ghl-{id}"),
            conversation_id: Some("conv-1".to_string()),
        })
    }
}

#[async_trait]
impl Crm for FakeCrm {
    async fn refresh_token(
        &self,
        credentials: &OAuthCredentials,
        refresh_token: &str,
    ) -> Result<TokenGrant> {
        self.record(CrmCall::RefreshToken {
            client_id: credentials.client_id.clone(),
            refresh_token: refresh_token.to_string(),
        });
        lock(&self.state)
            .grant
            .clone()
            .ok_or_else(|| CrmError::TokenRefresh("fake CRM has no grant".to_string()))
    }

    async fn find_contact_by_phone(
        &self,
        token: &str,
        location_id: &str,
        phone: &str,
    ) -> Result<Option<Contact>> {
        self.record(CrmCall::FindContactByPhone {
            token: token.to_string(),
            location_id: location_id.to_string(),
            phone: phone.to_string(),
        });
        let wanted = digits(phone);
        Ok(lock(&self.state)
            .contacts
            .iter()
            .find(|c| c.phone.as_deref().map(digits).as_deref() == Some(wanted.as_str()))
            .cloned())
    }

    async fn find_contact_by_email(
        &self,
        token: &str,
        location_id: &str,
        email: &str,
    ) -> Result<Option<Contact>> {
        self.record(CrmCall::FindContactByEmail {
            token: token.to_string(),
            location_id: location_id.to_string(),
            email: email.to_string(),
        });
        Ok(lock(&self.state)
            .contacts
            .iter()
            .find(|c| c.email.as_deref() == Some(email))
            .cloned())
    }

    async fn create_contact(&self, token: &str, contact: &NewContact) -> Result<Contact> {
        self.record(CrmCall::CreateContact {
            token: token.to_string(),
            contact: contact.clone(),
        });
        let mut state = lock(&self.state);
        if let Some(contact_id) = state.duplicate_on_create.clone() {
            return Err(CrmError::DuplicateContact { contact_id });
        }
        let created = Contact {
            id: format!("contact-{}", state.next_contact),
            location_id: Some(contact.location_id.clone()),
            phone: Some(contact.phone.clone()),
            email: contact.email.clone(),
            name: contact.name.clone(),
            tags: contact.tags.clone(),
            ..Default::default()
        };
        state.next_contact += 1;
        state.contacts.push(created.clone());
        Ok(created)
    }

    async fn get_contact(&self, token: &str, contact_id: &str) -> Result<Contact> {
        self.record(CrmCall::GetContact {
            token: token.to_string(),
            contact_id: contact_id.to_string(),
        });
        lock(&self.state)
            .contacts
            .iter()
            .find(|c| c.id == contact_id)
            .cloned()
            .ok_or_else(|| CrmError::Api {
                status: 404,
                body: format!("contact {contact_id} not found"),
            })
    }

    async fn update_contact(
        &self,
        token: &str,
        contact_id: &str,
        update: &ContactUpdate,
    ) -> Result<()> {
        self.record(CrmCall::UpdateContact {
            token: token.to_string(),
            contact_id: contact_id.to_string(),
            update: update.clone(),
        });
        let mut state = lock(&self.state);
        if state.fail_updates {
            return Err(CrmError::Api {
                status: 500,
                body: "fake CRM update failure".to_string(),
            });
        }
        if let Some(contact) = state.contacts.iter_mut().find(|c| c.id == contact_id) {
            if let Some(user) = &update.assigned_to {
                contact.assigned_to = Some(user.clone());
            }
        }
        Ok(())
    }

    async fn add_tags(&self, token: &str, contact_id: &str, tags: &[String]) -> Result<()> {
        self.record(CrmCall::AddTags {
            token: token.to_string(),
            contact_id: contact_id.to_string(),
            tags: tags.to_vec(),
        });
        Ok(())
    }

    async fn send_inbound_message(
        &self,
        token: &str,
        message: &CrmMessage,
    ) -> Result<SentCrmMessage> {
        self.record(CrmCall::Inbound {
            token: token.to_string(),
            message: message.clone(),
        });
        self.store_message()
    }

    async fn send_outbound_message(
        &self,
        token: &str,
        message: &CrmMessage,
    ) -> Result<SentCrmMessage> {
        self.record(CrmCall::Outbound {
            token: token.to_string(),
            message: message.clone(),
        });
        self.store_message()
    }

    async fn send_internal_note(
        &self,
        token: &str,
        contact_id: &str,
        text: &str,
    ) -> Result<SentCrmMessage> {
        self.record(CrmCall::InternalNote {
            token: token.to_string(),
            contact_id: contact_id.to_string(),
            text: text.to_string(),
        });
        self.store_message()
    }
}
