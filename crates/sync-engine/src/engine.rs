//! The sync engine that ties storage, both upstreams and the event bus
//! together.

use std::sync::Arc;

use broadcaster::Broadcaster;
use crm_client::Crm;
use database::{contact_phone, phone, tenant, Database, Instance, Tenant};
use gateway_client::{resolve_base_url, Gateway, GatewayConfig};

use crate::config::EngineConfig;
use crate::error::{Result, SyncError};
use crate::format::Language;
use crate::resolver::InstanceResolver;
use crate::switcher::SwitcherStore;
use crate::token::TokenManager;

/// Coordinates message sync between the WhatsApp gateway and the CRM.
///
/// The engine is cheap to clone and holds no per-request state; every
/// operation reads current rows and coordinates through the database.
#[derive(Clone)]
pub struct SyncEngine {
    db: Database,
    gateway: Arc<dyn Gateway>,
    crm: Arc<dyn Crm>,
    broadcaster: Broadcaster,
    config: EngineConfig,
    resolver: InstanceResolver,
    tokens: TokenManager,
    switcher: SwitcherStore,
}

impl SyncEngine {
    pub fn new(
        db: Database,
        gateway: Arc<dyn Gateway>,
        crm: Arc<dyn Crm>,
        broadcaster: Broadcaster,
        config: EngineConfig,
    ) -> Self {
        let resolver = InstanceResolver::new(db.clone());
        let tokens = TokenManager::new(db.clone(), crm.clone(), config.platform_credentials.clone());
        let switcher = SwitcherStore::new(db.clone(), crm.clone(), tokens.clone(), broadcaster.clone());

        Self {
            db,
            gateway,
            crm,
            broadcaster,
            config,
            resolver,
            tokens,
            switcher,
        }
    }

    pub fn database(&self) -> &Database {
        &self.db
    }

    pub fn gateway(&self) -> &dyn Gateway {
        self.gateway.as_ref()
    }

    pub fn crm(&self) -> &dyn Crm {
        self.crm.as_ref()
    }

    pub fn broadcaster(&self) -> &Broadcaster {
        &self.broadcaster
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn resolver(&self) -> &InstanceResolver {
        &self.resolver
    }

    pub fn tokens(&self) -> &TokenManager {
        &self.tokens
    }

    pub fn switcher(&self) -> &SwitcherStore {
        &self.switcher
    }

    /// Gateway connection settings for an instance.
    ///
    /// Base URL precedence: instance override, tenant default, engine default.
    pub async fn gateway_config(&self, instance: &Instance) -> Result<GatewayConfig> {
        let owner = tenant::get_tenant(self.db.pool(), &instance.tenant_id).await?;
        Ok(self.gateway_config_for(instance, &owner)?)
    }

    pub(crate) fn gateway_config_for(
        &self,
        instance: &Instance,
        owner: &Tenant,
    ) -> std::result::Result<GatewayConfig, gateway_client::GatewayError> {
        let tenant_default = owner
            .gateway_base_url
            .as_deref()
            .filter(|url| !url.trim().is_empty())
            .or(self.config.gateway_default_url.as_deref());
        let base_url = resolve_base_url(instance.gateway_base_url.as_deref(), tenant_default)?;

        let config = GatewayConfig::new(base_url, instance.gateway_token.clone());
        Ok(match owner.gateway_admin_token.as_deref() {
            Some(admin) if !admin.is_empty() => config.with_admin_token(admin),
            _ => config,
        })
    }

    /// Phone of a contact, from the mapping or else the CRM.
    ///
    /// A phone learned from the CRM is stored in the mapping.
    pub(crate) async fn lead_phone(&self, location_id: &str, contact_id: &str) -> Result<String> {
        let pool = self.db.pool();
        if let Some(phone) = contact_phone::get_phone(pool, contact_id).await? {
            return Ok(phone);
        }

        let token = self.tokens.token_for_location(location_id).await?;
        let contact = self.crm.get_contact(&token, contact_id).await?;
        let digits = contact.phone.as_deref().map(phone::normalize).unwrap_or_default();
        if digits.is_empty() {
            return Err(SyncError::InvalidRequest(format!(
                "no phone known for contact {contact_id}"
            )));
        }

        contact_phone::upsert_contact_phone(pool, contact_id, location_id, &digits).await?;
        Ok(digits)
    }

    /// Language for annotations shown to the tenant.
    pub(crate) fn language_of(owner: &Tenant) -> Language {
        Language::from_code(&owner.language)
    }
}
