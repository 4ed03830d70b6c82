//! Configuration for the CRM client.

use std::env;

use crate::error::CrmError;

/// Default CRM REST base URL.
pub const DEFAULT_API_URL: &str = "https://services.leadconnectorhq.com";

/// API version sent in the `Version` header.
pub const DEFAULT_API_VERSION: &str = "2021-07-28";

/// OAuth client credential pair.
#[derive(Clone, PartialEq, Eq)]
pub struct OAuthCredentials {
    pub client_id: String,
    pub client_secret: String,
}

impl OAuthCredentials {
    pub fn new(client_id: impl Into<String>, client_secret: impl Into<String>) -> Self {
        Self {
            client_id: client_id.into(),
            client_secret: client_secret.into(),
        }
    }

    /// Build from optional parts; both must be non-empty.
    pub fn from_parts(client_id: Option<&str>, client_secret: Option<&str>) -> Option<Self> {
        match (client_id, client_secret) {
            (Some(id), Some(secret)) if !id.trim().is_empty() && !secret.trim().is_empty() => {
                Some(Self::new(id.trim(), secret.trim()))
            }
            _ => None,
        }
    }
}

impl std::fmt::Debug for OAuthCredentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OAuthCredentials")
            .field("client_id", &self.client_id)
            .field("client_secret", &"<redacted>")
            .finish()
    }
}

/// Configuration for [`CrmClient`](crate::CrmClient).
#[derive(Debug, Clone)]
pub struct CrmConfig {
    /// CRM REST base URL (no trailing slash).
    pub api_url: String,

    /// Value of the `Version` header.
    pub api_version: String,

    /// Conversation provider id stamped on synced messages.
    pub conversation_provider_id: Option<String>,

    /// Platform-level marketplace app credentials, used when a tenant has none.
    pub platform_credentials: Option<OAuthCredentials>,
}

impl Default for CrmConfig {
    fn default() -> Self {
        Self {
            api_url: DEFAULT_API_URL.to_string(),
            api_version: DEFAULT_API_VERSION.to_string(),
            conversation_provider_id: None,
            platform_credentials: None,
        }
    }
}

impl CrmConfig {
    /// Configuration pointing at a custom base URL.
    pub fn new(api_url: impl Into<String>) -> Self {
        Self {
            api_url: api_url.into().trim_end_matches('/').to_string(),
            ..Self::default()
        }
    }

    /// Create configuration from environment variables.
    ///
    /// Optional environment variables:
    /// - `CRM_API_URL` - REST base URL (default: https://services.leadconnectorhq.com)
    /// - `CRM_API_VERSION` - `Version` header (default: 2021-07-28)
    /// - `CRM_CONVERSATION_PROVIDER_ID` - provider id for synced messages
    /// - `CRM_CLIENT_ID` / `CRM_CLIENT_SECRET` - platform OAuth credentials
    pub fn from_env() -> Result<Self, CrmError> {
        let api_url = env::var("CRM_API_URL").unwrap_or_else(|_| DEFAULT_API_URL.to_string());
        if !api_url.starts_with("http") {
            return Err(CrmError::Configuration(format!(
                "CRM_API_URL must be an http(s) URL, got {api_url}"
            )));
        }

        let api_version =
            env::var("CRM_API_VERSION").unwrap_or_else(|_| DEFAULT_API_VERSION.to_string());

        let conversation_provider_id = env::var("CRM_CONVERSATION_PROVIDER_ID")
            .ok()
            .filter(|v| !v.trim().is_empty());

        let platform_credentials = OAuthCredentials::from_parts(
            env::var("CRM_CLIENT_ID").ok().as_deref(),
            env::var("CRM_CLIENT_SECRET").ok().as_deref(),
        );

        Ok(Self {
            api_url: api_url.trim_end_matches('/').to_string(),
            api_version,
            conversation_provider_id,
            platform_credentials,
        })
    }

    pub fn url(&self, path: &str) -> String {
        format!("{}{}", self.api_url, path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_credentials_require_both_parts() {
        assert!(OAuthCredentials::from_parts(Some("id"), None).is_none());
        assert!(OAuthCredentials::from_parts(Some("id"), Some(" ")).is_none());
        assert_eq!(
            OAuthCredentials::from_parts(Some("id"), Some("secret")),
            Some(OAuthCredentials::new("id", "secret"))
        );
    }

    #[test]
    fn test_debug_redacts_secret() {
        let rendered = format!("{:?}", OAuthCredentials::new("id", "hunter2"));
        assert!(!rendered.contains("hunter2"));
    }

    #[test]
    fn test_new_trims_trailing_slash() {
        assert_eq!(CrmConfig::new("http://crm.local/").url("/contacts/"), "http://crm.local/contacts/");
    }
}
