//! OAuth token management for CRM calls.

use std::sync::Arc;

use crm_client::{Crm, OAuthCredentials};
use database::{location, tenant, Database, Location, Tenant};
use tracing::{info, warn};

use crate::error::{Result, SyncError};

/// Tokens expiring within this many seconds are refreshed before use.
pub const REFRESH_MARGIN_SECS: i64 = 3600;

/// Whether a token with the given expiry must be refreshed at `now_secs`.
///
/// An unknown expiry is treated as expired.
pub fn needs_refresh(expires_at: Option<i64>, now_secs: i64) -> bool {
    match expires_at {
        Some(expires_at) => expires_at - now_secs < REFRESH_MARGIN_SECS,
        None => true,
    }
}

/// Supplies valid bearer tokens, refreshing them proactively.
#[derive(Clone)]
pub struct TokenManager {
    db: Database,
    crm: Arc<dyn Crm>,
    platform_credentials: Option<OAuthCredentials>,
}

impl TokenManager {
    pub fn new(
        db: Database,
        crm: Arc<dyn Crm>,
        platform_credentials: Option<OAuthCredentials>,
    ) -> Self {
        Self {
            db,
            crm,
            platform_credentials,
        }
    }

    /// OAuth client credentials for a tenant.
    ///
    /// Tenants without their own app fall back to the platform credentials.
    pub fn credentials_for(&self, tenant: &Tenant) -> Result<OAuthCredentials> {
        OAuthCredentials::from_parts(
            tenant.oauth_client_id.as_deref(),
            tenant.oauth_client_secret.as_deref(),
        )
        .or_else(|| self.platform_credentials.clone())
        .ok_or_else(|| {
            SyncError::Configuration(format!("no OAuth credentials for tenant {}", tenant.id))
        })
    }

    /// Return the stored access token, refreshing it first when it is about
    /// to expire. Refreshed tokens are persisted on the location.
    pub async fn valid_token(
        &self,
        location: &Location,
        credentials: &OAuthCredentials,
    ) -> Result<String> {
        let (Some(access_token), Some(refresh_token)) = (
            location.access_token.as_deref().filter(|t| !t.is_empty()),
            location.refresh_token.as_deref().filter(|t| !t.is_empty()),
        ) else {
            return Err(SyncError::Configuration(format!(
                "location {} has no OAuth tokens",
                location.location_id
            )));
        };

        let now_secs = chrono::Utc::now().timestamp();
        if !needs_refresh(location.expires_at, now_secs) {
            return Ok(access_token.to_string());
        }

        info!(location_id = %location.location_id, "Refreshing CRM access token");
        let grant = self
            .crm
            .refresh_token(credentials, refresh_token)
            .await
            .map_err(|e| {
                warn!(location_id = %location.location_id, error = %e, "Token refresh failed");
                SyncError::TokenRefresh(e.to_string())
            })?;

        location::update_tokens(
            self.db.pool(),
            &location.location_id,
            &grant.access_token,
            &grant.refresh_token,
            now_secs + grant.expires_in,
        )
        .await?;

        Ok(grant.access_token)
    }

    /// Valid token for a CRM location, using its owning tenant's credentials.
    pub async fn token_for_location(&self, location_id: &str) -> Result<String> {
        let location = location::get_location(self.db.pool(), location_id).await?;
        let tenant = tenant::get_tenant(self.db.pool(), &location.tenant_id).await?;
        let credentials = self.credentials_for(&tenant)?;
        self.valid_token(&location, &credentials).await
    }
}
