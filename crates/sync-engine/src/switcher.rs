//! Lead-to-instance routing preferences.
//!
//! A preference row has no single natural key: the phone is durable across
//! CRM contact churn but not always known, while the contact id is always
//! known but may change. Writes therefore walk [`MatchStrategy::ORDER`] and
//! stop at the first strategy that lands.

use std::sync::Arc;

use broadcaster::{Broadcaster, LiveEvent};
use crm_client::Crm;
use database::{contact_phone, instance, location, phone, preference, tenant, Database, DatabaseError};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::error::{Result, SyncError};
use crate::format::{switch_note, Language};
use crate::token::TokenManager;

/// One way of persisting a preference.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchStrategy {
    /// Update the row whose phone shares a suffix with the lead's.
    PhoneSuffix,
    /// Update the row keyed by the contact id.
    ContactId,
    /// Insert a new row.
    Insert,
    /// Upsert keyed by the contact id, after an insert conflict.
    ContactUpsert,
}

impl MatchStrategy {
    /// Order in which strategies are tried.
    pub const ORDER: [MatchStrategy; 4] = [
        MatchStrategy::PhoneSuffix,
        MatchStrategy::ContactId,
        MatchStrategy::Insert,
        MatchStrategy::ContactUpsert,
    ];
}

/// Body of a switch request from the CRM-side switcher UI.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SwitchRequest {
    pub instance_id: String,
    pub location_id: String,
    pub contact_id: Option<String>,
    pub phone: Option<String>,
    pub conversation_id: Option<String>,
    pub previous_instance_name: Option<String>,
    pub new_instance_name: Option<String>,
}

/// Result of a switch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SwitchOutcome {
    pub success: bool,
    pub instance_id: String,
    pub strategy: MatchStrategy,
    /// Whether a switch note was posted to the conversation.
    pub annotated: bool,
}

/// Reads and writes routing preferences.
#[derive(Clone)]
pub struct SwitcherStore {
    db: Database,
    crm: Arc<dyn Crm>,
    tokens: TokenManager,
    broadcaster: Broadcaster,
}

impl SwitcherStore {
    pub fn new(
        db: Database,
        crm: Arc<dyn Crm>,
        tokens: TokenManager,
        broadcaster: Broadcaster,
    ) -> Self {
        Self {
            db,
            crm,
            tokens,
            broadcaster,
        }
    }

    /// Preferred instance id for a lead, phone first.
    ///
    /// Without an explicit phone the contact's mapped phone is used.
    pub async fn preferred_instance(
        &self,
        location_id: &str,
        contact_id: Option<&str>,
        phone: Option<&str>,
    ) -> Result<Option<String>> {
        let pool = self.db.pool();

        let lead_phone = match phone.map(phone::normalize).filter(|p| !p.is_empty()) {
            Some(p) => Some(p),
            None => match contact_id {
                Some(contact_id) => contact_phone::get_phone(pool, contact_id).await?,
                None => None,
            },
        };

        if let Some(lead_phone) = lead_phone.as_deref() {
            if let Some(row) = preference::find_by_phone(pool, location_id, lead_phone).await? {
                return Ok(Some(row.instance_id));
            }
        }

        if let Some(contact_id) = contact_id {
            if let Some(row) = preference::find_by_contact(pool, location_id, contact_id).await? {
                return Ok(Some(row.instance_id));
            }
        }

        Ok(None)
    }

    /// Persist the preferred instance for a lead.
    ///
    /// Returns the strategy that stored it. Extra rows for the same phone are
    /// collapsed onto the oldest afterwards, which keeps `instance_id`.
    pub async fn set_preferred_instance(
        &self,
        location_id: &str,
        instance_id: &str,
        contact_id: Option<&str>,
        phone: Option<&str>,
    ) -> Result<MatchStrategy> {
        let digits = phone.map(phone::normalize).filter(|p| !p.is_empty());
        if contact_id.is_none() && digits.is_none() {
            return Err(SyncError::InvalidRequest(
                "contactId or phone is required".to_string(),
            ));
        }

        let mut stored = None;
        for strategy in MatchStrategy::ORDER {
            if self
                .try_strategy(strategy, location_id, instance_id, contact_id, digits.as_deref())
                .await?
            {
                stored = Some(strategy);
                break;
            }
        }
        let strategy = stored.ok_or_else(|| {
            SyncError::InvalidRequest("preference could not be stored".to_string())
        })?;

        if let Some(digits) = digits.as_deref() {
            let pruned =
                preference::prune_phone_duplicates(self.db.pool(), location_id, digits, instance_id)
                    .await?;
            if pruned > 0 {
                debug!(location_id, pruned, "Pruned duplicate preference rows");
            }
        }

        debug!(location_id, instance_id, ?strategy, "Stored preference");
        Ok(strategy)
    }

    async fn try_strategy(
        &self,
        strategy: MatchStrategy,
        location_id: &str,
        instance_id: &str,
        contact_id: Option<&str>,
        digits: Option<&str>,
    ) -> Result<bool> {
        let pool = self.db.pool();
        match strategy {
            MatchStrategy::PhoneSuffix => match digits {
                Some(digits) => {
                    Ok(preference::update_by_phone(pool, location_id, digits, instance_id).await?)
                }
                None => Ok(false),
            },
            MatchStrategy::ContactId => match contact_id {
                Some(contact_id) => Ok(preference::update_by_contact(
                    pool,
                    location_id,
                    contact_id,
                    instance_id,
                    digits,
                )
                .await?),
                None => Ok(false),
            },
            MatchStrategy::Insert => {
                match preference::insert_preference(pool, location_id, instance_id, contact_id, digits)
                    .await
                {
                    Ok(()) => Ok(true),
                    Err(DatabaseError::AlreadyExists { .. }) => Ok(false),
                    Err(e) => Err(e.into()),
                }
            }
            MatchStrategy::ContactUpsert => match contact_id {
                Some(contact_id) => {
                    preference::upsert_by_contact(pool, location_id, contact_id, instance_id, digits)
                        .await?;
                    Ok(true)
                }
                None => Ok(false),
            },
        }
    }

    /// Handle a switch from the CRM-side UI.
    ///
    /// Stores the preference, then posts a switch note and publishes a live
    /// event when the instance name actually changed. The note is
    /// best-effort.
    pub async fn switch_instance(&self, request: &SwitchRequest) -> Result<SwitchOutcome> {
        if request.instance_id.trim().is_empty() || request.location_id.trim().is_empty() {
            return Err(SyncError::InvalidRequest(
                "instanceId and locationId are required".to_string(),
            ));
        }

        let pool = self.db.pool();
        let target = instance::get_instance(pool, &request.instance_id)
            .await
            .map_err(|e| match e {
                DatabaseError::NotFound { .. } => {
                    SyncError::NotFound(format!("instance {}", request.instance_id))
                }
                other => other.into(),
            })?;
        if target.location_id.as_deref() != Some(request.location_id.as_str()) {
            return Err(SyncError::InvalidRequest(format!(
                "instance {} is not linked to location {}",
                request.instance_id, request.location_id
            )));
        }

        let strategy = self
            .set_preferred_instance(
                &request.location_id,
                &request.instance_id,
                request.contact_id.as_deref(),
                request.phone.as_deref(),
            )
            .await?;

        info!(
            location_id = %request.location_id,
            instance_id = %request.instance_id,
            ?strategy,
            "Instance switched"
        );

        let renamed = match (
            request.previous_instance_name.as_deref(),
            request.new_instance_name.as_deref(),
        ) {
            (Some(previous), Some(next)) => !previous.trim().is_empty() && previous != next,
            _ => false,
        };

        let mut annotated = false;
        if renamed {
            annotated = self.post_switch_note(request).await;
            self.broadcaster.publish(LiveEvent::InstanceSwitch {
                location_id: request.location_id.clone(),
                contact_id: request.contact_id.clone(),
                instance_id: request.instance_id.clone(),
                previous_instance_name: request.previous_instance_name.clone(),
                new_instance_name: request.new_instance_name.clone(),
            });
        }

        Ok(SwitchOutcome {
            success: true,
            instance_id: request.instance_id.clone(),
            strategy,
            annotated,
        })
    }

    async fn post_switch_note(&self, request: &SwitchRequest) -> bool {
        let Some(contact_id) = request.contact_id.as_deref() else {
            return false;
        };

        let result = async {
            let loc = location::get_location(self.db.pool(), &request.location_id).await?;
            let owner = tenant::get_tenant(self.db.pool(), &loc.tenant_id).await?;
            let credentials = self.tokens.credentials_for(&owner)?;
            let token = self.tokens.valid_token(&loc, &credentials).await?;
            let note = switch_note(
                Language::from_code(&owner.language),
                request.previous_instance_name.as_deref().unwrap_or_default(),
                request.new_instance_name.as_deref().unwrap_or_default(),
            );
            self.crm.send_internal_note(&token, contact_id, &note).await?;
            Ok::<(), SyncError>(())
        }
        .await;

        match result {
            Ok(()) => true,
            Err(e) => {
                warn!(location_id = %request.location_id, error = %e, "Switch note failed");
                false
            }
        }
    }

    /// Resolve an embed token to its CRM location id.
    pub async fn location_for_embed_token(&self, embed_token: &str) -> Result<String> {
        location::find_by_embed_token(self.db.pool(), embed_token)
            .await?
            .map(|loc| loc.location_id)
            .ok_or_else(|| SyncError::NotFound("embed token".to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::*;
    use mock_upstreams::FakeCrm;

    async fn store(db: &Database, crm: Arc<FakeCrm>) -> SwitcherStore {
        let tokens = TokenManager::new(db.clone(), crm.clone(), Some(platform_credentials()));
        SwitcherStore::new(db.clone(), crm, tokens, Broadcaster::new())
    }

    #[tokio::test]
    async fn test_strategy_cascade() {
        let db = test_db().await;
        let store = store(&db, Arc::new(FakeCrm::new())).await;

        let first = store
            .set_preferred_instance("L1", "i1", Some("c1"), Some("5511999998888"))
            .await
            .unwrap();
        assert_eq!(first, MatchStrategy::Insert);

        let by_phone = store
            .set_preferred_instance("L1", "i2", Some("c2"), Some("11999998888"))
            .await
            .unwrap();
        assert_eq!(by_phone, MatchStrategy::PhoneSuffix);

        let by_contact = store
            .set_preferred_instance("L1", "i3", Some("c1"), None)
            .await
            .unwrap();
        assert_eq!(by_contact, MatchStrategy::ContactId);
    }

    #[tokio::test]
    async fn test_switch_survives_pruning_of_older_short_form_row() {
        let db = test_db().await;
        let store = store(&db, Arc::new(FakeCrm::new())).await;
        preference::insert_preference(db.pool(), "L1", "i1", Some("c1"), Some("551199998888"))
            .await
            .unwrap();
        preference::insert_preference(db.pool(), "L1", "i1", Some("c2"), Some("5511999998888"))
            .await
            .unwrap();

        let strategy = store
            .set_preferred_instance("L1", "i2", Some("c2"), Some("5511999998888"))
            .await
            .unwrap();
        assert_eq!(strategy, MatchStrategy::PhoneSuffix);

        let preferred = store
            .preferred_instance("L1", Some("c2"), Some("5511999998888"))
            .await
            .unwrap();
        assert_eq!(preferred.as_deref(), Some("i2"));
        let rows = preference::list_by_phone(db.pool(), "L1", "5511999998888").await.unwrap();
        assert_eq!(rows.len(), 1);
    }

    #[tokio::test]
    async fn test_phone_lookup_ignores_country_code() {
        let db = test_db().await;
        let store = store(&db, Arc::new(FakeCrm::new())).await;
        store
            .set_preferred_instance("L1", "i2", None, Some("5511999998888"))
            .await
            .unwrap();

        let with_cc = store.preferred_instance("L1", None, Some("5511999998888")).await.unwrap();
        let without_cc = store.preferred_instance("L1", None, Some("11999998888")).await.unwrap();
        assert_eq!(with_cc.as_deref(), Some("i2"));
        assert_eq!(with_cc, without_cc);
    }

    #[tokio::test]
    async fn test_phone_beats_contact_on_read() {
        let db = test_db().await;
        let store = store(&db, Arc::new(FakeCrm::new())).await;
        store.set_preferred_instance("L1", "by-contact", Some("c1"), None).await.unwrap();
        store
            .set_preferred_instance("L1", "by-phone", Some("c9"), Some("5511999998888"))
            .await
            .unwrap();
        contact_phone::upsert_contact_phone(db.pool(), "c1", "L1", "5511999998888")
            .await
            .unwrap();

        let found = store.preferred_instance("L1", Some("c1"), None).await.unwrap();
        assert_eq!(found.as_deref(), Some("by-phone"));
    }

    #[tokio::test]
    async fn test_requires_contact_or_phone() {
        let db = test_db().await;
        let store = store(&db, Arc::new(FakeCrm::new())).await;
        let err = store.set_preferred_instance("L1", "i1", None, None).await.unwrap_err();
        assert!(matches!(err, SyncError::InvalidRequest(_)));
    }

    #[tokio::test]
    async fn test_switch_posts_note_and_event() {
        let db = test_db().await;
        seed_tenant(&db, "t1").await;
        seed_location(&db, "L1", "t1", Some(far_future())).await;
        seed_instance(&db, "i2", "t1", "L1", 1).await;
        let crm = Arc::new(FakeCrm::new());
        let store = store(&db, crm.clone()).await;
        let mut events = store.broadcaster.subscribe_location("L1");

        let outcome = store
            .switch_instance(&SwitchRequest {
                instance_id: "i2".to_string(),
                location_id: "L1".to_string(),
                contact_id: Some("c1".to_string()),
                previous_instance_name: Some("Sales".to_string()),
                new_instance_name: Some("Support".to_string()),
                ..Default::default()
            })
            .await
            .unwrap();

        assert!(outcome.annotated);
        let notes = crm.internal_notes();
        assert_eq!(notes.len(), 1);
        assert!(notes[0].1.contains("Sales → Support"));
        assert_eq!(events.recv().await.map(|e| e.kind()), Some("instance_switch"));
    }

    #[tokio::test]
    async fn test_switch_without_rename_is_silent() {
        let db = test_db().await;
        seed_tenant(&db, "t1").await;
        seed_location(&db, "L1", "t1", Some(far_future())).await;
        seed_instance(&db, "i2", "t1", "L1", 1).await;
        let crm = Arc::new(FakeCrm::new());
        let store = store(&db, crm.clone()).await;

        let outcome = store
            .switch_instance(&SwitchRequest {
                instance_id: "i2".to_string(),
                location_id: "L1".to_string(),
                contact_id: Some("c1".to_string()),
                previous_instance_name: Some("Sales".to_string()),
                new_instance_name: Some("Sales".to_string()),
                ..Default::default()
            })
            .await
            .unwrap();

        assert!(!outcome.annotated);
        assert!(crm.internal_notes().is_empty());
    }

    #[tokio::test]
    async fn test_switch_rejects_foreign_instance() {
        let db = test_db().await;
        seed_tenant(&db, "t1").await;
        seed_instance(&db, "i2", "t1", "L2", 1).await;
        let store = store(&db, Arc::new(FakeCrm::new())).await;

        let err = store
            .switch_instance(&SwitchRequest {
                instance_id: "i2".to_string(),
                location_id: "L1".to_string(),
                contact_id: Some("c1".to_string()),
                ..Default::default()
            })
            .await
            .unwrap_err();
        assert!(matches!(err, SyncError::InvalidRequest(_)));

        let missing = store
            .switch_instance(&SwitchRequest {
                instance_id: "nope".to_string(),
                location_id: "L1".to_string(),
                contact_id: Some("c1".to_string()),
                ..Default::default()
            })
            .await
            .unwrap_err();
        assert!(missing.is_not_found());
    }
}
