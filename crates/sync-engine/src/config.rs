//! Engine configuration.

use std::env;

use crm_client::OAuthCredentials;

/// Default probability of running cleanup on an inbound webhook.
pub const DEFAULT_CLEANUP_SAMPLE_RATE: f64 = 0.01;

/// Default message map retention.
pub const DEFAULT_RETENTION_DAYS: i64 = 30;

/// Edits are accepted while the message is younger than this.
pub const EDIT_WINDOW_MILLIS: i64 = 15 * 60 * 1000;

/// Configuration for [`SyncEngine`](crate::SyncEngine).
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Gateway base URL used when neither instance nor tenant set one.
    pub gateway_default_url: Option<String>,

    /// Webhook URL registered on instances when the caller gives none.
    pub public_webhook_url: Option<String>,

    /// Marketplace app credentials for tenants without their own.
    pub platform_credentials: Option<OAuthCredentials>,

    /// Probability (0.0 - 1.0) of running cleanup per inbound webhook.
    pub cleanup_sample_rate: f64,

    /// Message map entries older than this many days are purged.
    pub message_retention_days: i64,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            gateway_default_url: None,
            public_webhook_url: None,
            platform_credentials: None,
            cleanup_sample_rate: DEFAULT_CLEANUP_SAMPLE_RATE,
            message_retention_days: DEFAULT_RETENTION_DAYS,
        }
    }
}

impl EngineConfig {
    /// Create configuration from environment variables.
    ///
    /// Optional environment variables:
    /// - `GATEWAY_DEFAULT_URL` - fallback gateway base URL
    /// - `PUBLIC_WEBHOOK_URL` - default webhook URL for instances
    /// - `CLEANUP_SAMPLE_RATE` - cleanup probability (default: 0.01)
    /// - `MESSAGE_RETENTION_DAYS` - message map retention (default: 30)
    ///
    /// Platform credentials come from the CRM client configuration.
    pub fn from_env() -> Self {
        let non_empty = |name: &str| env::var(name).ok().filter(|v| !v.trim().is_empty());

        let cleanup_sample_rate = env::var("CLEANUP_SAMPLE_RATE")
            .ok()
            .and_then(|v| v.parse::<f64>().ok())
            .filter(|rate| (0.0..=1.0).contains(rate))
            .unwrap_or(DEFAULT_CLEANUP_SAMPLE_RATE);

        let message_retention_days = env::var("MESSAGE_RETENTION_DAYS")
            .ok()
            .and_then(|v| v.parse().ok())
            .filter(|days: &i64| *days > 0)
            .unwrap_or(DEFAULT_RETENTION_DAYS);

        Self {
            gateway_default_url: non_empty("GATEWAY_DEFAULT_URL"),
            public_webhook_url: non_empty("PUBLIC_WEBHOOK_URL"),
            platform_credentials: None,
            cleanup_sample_rate,
            message_retention_days,
        }
    }

    pub fn with_platform_credentials(mut self, credentials: Option<OAuthCredentials>) -> Self {
        self.platform_credentials = credentials;
        self
    }
}
