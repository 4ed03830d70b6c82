//! Configuration types for gateway-client.

use crate::error::GatewayError;

/// Where and how to reach one gateway instance.
#[derive(Debug, Clone)]
pub struct GatewayConfig {
    /// Base URL of the gateway server (no trailing slash).
    pub base_url: String,
    /// Instance token sent in the `token` header.
    pub token: String,
    /// Admin token for instance-management calls, if any.
    pub admin_token: Option<String>,
}

impl GatewayConfig {
    /// Create a configuration for an instance.
    pub fn new(base_url: impl Into<String>, token: impl Into<String>) -> Self {
        Self {
            base_url: trim_base_url(&base_url.into()),
            token: token.into(),
            admin_token: None,
        }
    }

    /// Attach an admin token.
    pub fn with_admin_token(mut self, admin_token: impl Into<String>) -> Self {
        self.admin_token = Some(admin_token.into());
        self
    }

    /// Absolute URL of a gateway path.
    pub fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }
}

fn trim_base_url(url: &str) -> String {
    url.trim().trim_end_matches('/').to_string()
}

/// Pick the gateway base URL for an instance.
///
/// The instance-level override wins, then the tenant default. Blank values
/// count as absent.
pub fn resolve_base_url(
    instance_override: Option<&str>,
    tenant_default: Option<&str>,
) -> Result<String, GatewayError> {
    [instance_override, tenant_default]
        .into_iter()
        .flatten()
        .map(trim_base_url)
        .find(|url| !url.is_empty())
        .ok_or_else(|| GatewayError::Configuration("no gateway base URL configured".to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_instance_override_wins() {
        let url = resolve_base_url(Some("https://a.example/"), Some("https://b.example")).unwrap();
        assert_eq!(url, "https://a.example");
    }

    #[test]
    fn test_tenant_default_used_when_override_blank() {
        let url = resolve_base_url(Some("  "), Some("https://b.example")).unwrap();
        assert_eq!(url, "https://b.example");
    }

    #[test]
    fn test_missing_base_url_is_configuration_error() {
        let err = resolve_base_url(None, None).unwrap_err();
        assert!(matches!(err, GatewayError::Configuration(_)));
    }

    #[test]
    fn test_url_join() {
        let config = GatewayConfig::new("https://gw.example/", "tok");
        assert_eq!(config.url("/instance/status"), "https://gw.example/instance/status");
    }
}
